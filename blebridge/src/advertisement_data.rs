use std::collections::{BTreeMap, HashMap};

use btuuid::BluetoothUuid;
use serde::{Deserialize, Serialize};

use crate::util::{parse_uuid, to_bluetooth_uuid};

/// Data included in a Bluetooth advertisement or scan response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AdvertisementData {
    /// The (possibly shortened) local name of the device (CSS §A.1.2)
    pub local_name: Option<String>,
    /// Manufacturer specific data (CSS §A.1.4)
    pub manufacturer_data: Option<ManufacturerData>,
    /// Service associated data (CSS §A.1.11)
    pub service_data: HashMap<BluetoothUuid, Vec<u8>>,
    /// Advertised GATT service UUIDs (CSS §A.1.1)
    pub service_uuids: Vec<BluetoothUuid>,
    /// Transmitted power level (CSS §A.1.5)
    pub tx_power_level: Option<i16>,
    /// Whether the advertising packet was connectable, when the platform reports it
    pub is_connectable: Option<bool>,
    /// Advertising flags (CSS §A.1.3)
    pub flags: Option<u8>,
}

/// Manufacturer specific data included in Bluetooth advertisements. See the Bluetooth Core Specification Supplement
/// §A.1.4 for details.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ManufacturerData {
    /// Company identifier (defined [here](https://www.bluetooth.com/specifications/assigned-numbers/company-identifiers/))
    pub company_id: u16,
    /// Manufacturer specific data
    pub data: Vec<u8>,
}

impl ManufacturerData {
    fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let (id, data) = bytes.split_first_chunk::<2>()?;
        Some(ManufacturerData {
            company_id: u16::from_le_bytes(*id),
            data: data.to_vec(),
        })
    }
}

/// The advertisement dictionary reported by platforms that parse advertisements natively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawAdvertisementData {
    #[serde(
        rename = "kCBAdvDataLocalName",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub local_name: Option<String>,
    #[serde(
        rename = "kCBAdvDataChannel",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub channel: Option<i32>,
    #[serde(
        rename = "kCBAdvDataIsConnectable",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub is_connectable: Option<bool>,
    #[serde(
        rename = "kCBAdvDataTxPowerLevel",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub tx_power_level: Option<i16>,
    #[serde(
        rename = "kCBAdvDataServiceUUIDs",
        default,
        skip_serializing_if = "Vec::is_empty"
    )]
    pub service_uuids: Vec<String>,
    #[serde(
        rename = "kCBAdvDataManufacturerData",
        default,
        with = "crate::util::base64_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub manufacturer_data: Option<Vec<u8>>,
    #[serde(
        rename = "kCBAdvDataServiceData",
        default,
        with = "crate::util::base64_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub service_data: BTreeMap<String, Vec<u8>>,
}

impl AdvertisementData {
    pub fn from_raw(raw: &RawAdvertisementData) -> Self {
        let service_uuids = raw
            .service_uuids
            .iter()
            .filter_map(|uuid| parse_uuid(uuid))
            .map(|uuid| to_bluetooth_uuid(&uuid))
            .collect();

        let service_data = raw
            .service_data
            .iter()
            .filter_map(|(uuid, data)| {
                parse_uuid(uuid).map(|uuid| (to_bluetooth_uuid(&uuid), data.clone()))
            })
            .collect();

        AdvertisementData {
            local_name: raw.local_name.clone(),
            manufacturer_data: raw
                .manufacturer_data
                .as_deref()
                .and_then(ManufacturerData::from_bytes),
            service_data,
            service_uuids,
            tx_power_level: raw.tx_power_level,
            is_connectable: raw.is_connectable,
            flags: None,
        }
    }

    /// Parses the AD structures of a raw advertising or scan response payload.
    ///
    /// Parsing stops at the first zero-length structure (padding) or at a structure that runs
    /// past the end of the record.
    pub fn from_scan_record(record: &[u8]) -> Self {
        let mut data = AdvertisementData::default();
        let mut rest = record;

        while let Some((&len, tail)) = rest.split_first() {
            let len = usize::from(len);
            if len == 0 || tail.len() < len {
                break;
            }
            let (field, next) = tail.split_at(len);
            rest = next;

            let (ad_type, payload) = (field[0], &field[1..]);
            match ad_type {
                0x01 => data.flags = payload.first().copied(),
                0x02 | 0x03 => data.service_uuids.extend(uuid_list(payload, 2)),
                0x04 | 0x05 => data.service_uuids.extend(uuid_list(payload, 4)),
                0x06 | 0x07 => data.service_uuids.extend(uuid_list(payload, 16)),
                0x08 if data.local_name.is_none() => {
                    data.local_name = Some(String::from_utf8_lossy(payload).into_owned())
                }
                0x09 => data.local_name = Some(String::from_utf8_lossy(payload).into_owned()),
                0x0a => data.tx_power_level = payload.first().map(|&b| i16::from(b as i8)),
                0x16 => data.service_data.extend(service_data(payload, 2)),
                0x20 => data.service_data.extend(service_data(payload, 4)),
                0x21 => data.service_data.extend(service_data(payload, 16)),
                0xff => data.manufacturer_data = ManufacturerData::from_bytes(payload),
                _ => {}
            }
        }

        data
    }
}

/// Splits a list of little-endian UUIDs of `width` bytes. A trailing partial UUID is ignored.
fn uuid_list(payload: &[u8], width: usize) -> impl Iterator<Item = BluetoothUuid> + '_ {
    payload
        .chunks_exact(width)
        .filter_map(|chunk| BluetoothUuid::from_le_slice(chunk).ok())
}

fn service_data(payload: &[u8], width: usize) -> Option<(BluetoothUuid, Vec<u8>)> {
    let (uuid, data) = payload.split_at_checked(width)?;
    let uuid = BluetoothUuid::from_le_slice(uuid).ok()?;
    Some((uuid, data.to_vec()))
}
