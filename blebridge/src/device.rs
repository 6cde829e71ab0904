use serde::{Deserialize, Serialize};

use crate::advertisement_data::{AdvertisementData, RawAdvertisementData};
use crate::error::{Error, ErrorKind};
use crate::handle::DeviceHandle;

/// A device reported by [`Ble::start_scan`](crate::Ble::start_scan).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Uniquely identifies the device; its format depends on the host platform.
    pub address: String,
    /// Signal strength in dBm.
    pub rssi: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// The raw advertisement payload. Not available on every platform.
    #[serde(
        default,
        with = "crate::util::base64_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub scan_record: Option<Vec<u8>>,
    #[serde(
        rename = "advertisementData",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub raw_advertisement_data: Option<RawAdvertisementData>,
}

impl DeviceInfo {
    /// Returns the advertisement, preferring the platform's own parse over the raw scan record.
    pub fn advertisement_data(&self) -> Option<AdvertisementData> {
        match (&self.raw_advertisement_data, &self.scan_record) {
            (Some(raw), _) => Some(AdvertisementData::from_raw(raw)),
            (None, Some(record)) => Some(AdvertisementData::from_scan_record(record)),
            (None, None) => None,
        }
    }
}

/// A connection state change reported to the continuation passed to
/// [`Ble::connect`](crate::Ble::connect).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectInfo {
    pub device_handle: DeviceHandle,
    pub state: ConnectionState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
#[repr(i32)]
pub enum ConnectionState {
    Disconnected = 0,
    Connecting = 1,
    Connected = 2,
    Disconnecting = 3,
}

impl TryFrom<i32> for ConnectionState {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ConnectionState::Disconnected),
            1 => Ok(ConnectionState::Connecting),
            2 => Ok(ConnectionState::Connected),
            3 => Ok(ConnectionState::Disconnecting),
            _ => Err(Error::with_message(
                ErrorKind::InvalidResponse,
                format!("unknown connection state {value}"),
            )),
        }
    }
}

impl From<ConnectionState> for i32 {
    fn from(state: ConnectionState) -> Self {
        state as i32
    }
}
