use bitflags::bitflags;
use btuuid::BluetoothUuid;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::descriptor::{CLIENT_CHARACTERISTIC_CONFIGURATION, Descriptor};
use crate::error::{Error, ErrorKind};
use crate::handle::CharacteristicHandle;
use crate::util::to_bluetooth_uuid;

/// A GATT characteristic of a remote device.
///
/// `descriptors` is empty unless the characteristic came from
/// [`Ble::read_all_service_data`](crate::Ble::read_all_service_data).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Characteristic {
    pub handle: CharacteristicHandle,
    #[serde(with = "crate::util::uuid_text")]
    pub uuid: Uuid,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub write_type: WriteType,
    #[serde(default)]
    pub descriptors: Vec<Descriptor>,
}

impl Characteristic {
    pub fn bluetooth_uuid(&self) -> BluetoothUuid {
        to_bluetooth_uuid(&self.uuid)
    }

    pub fn descriptor(&self, uuid: &BluetoothUuid) -> Option<&Descriptor> {
        self.descriptors
            .iter()
            .find(|descriptor| &descriptor.bluetooth_uuid() == uuid)
    }

    /// The Client Characteristic Configuration descriptor, which some devices require to be
    /// written before they send notifications.
    pub fn client_configuration(&self) -> Option<&Descriptor> {
        self.descriptor(&CLIENT_CHARACTERISTIC_CONFIGURATION)
    }
}

bitflags! {
    /// Access permissions of a characteristic or descriptor.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(from = "u32", into = "u32")]
    pub struct Permissions: u32 {
        const READ = 1;
        const READ_ENCRYPTED = 2;
        const READ_ENCRYPTED_MITM = 4;
        const WRITE = 16;
        const WRITE_ENCRYPTED = 32;
        const WRITE_ENCRYPTED_MITM = 64;
        const WRITE_SIGNED = 128;
        const WRITE_SIGNED_MITM = 256;
    }
}

impl From<u32> for Permissions {
    fn from(bits: u32) -> Self {
        Self::from_bits_retain(bits)
    }
}

impl From<Permissions> for u32 {
    fn from(permissions: Permissions) -> Self {
        permissions.bits()
    }
}

bitflags! {
    /// The operations a characteristic supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    #[serde(from = "u32", into = "u32")]
    pub struct Properties: u32 {
        const BROADCAST = 1;
        const READ = 2;
        const WRITE_NO_RESPONSE = 4;
        const WRITE = 8;
        const NOTIFY = 16;
        const INDICATE = 32;
        const SIGNED_WRITE = 64;
        const EXTENDED_PROPS = 128;
    }
}

impl From<u32> for Properties {
    fn from(bits: u32) -> Self {
        Self::from_bits_retain(bits)
    }
}

impl From<Properties> for u32 {
    fn from(properties: Properties) -> Self {
        properties.bits()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
#[repr(i32)]
pub enum WriteType {
    NoResponse = 1,
    #[default]
    Default = 2,
    Signed = 4,
}

impl TryFrom<i32> for WriteType {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(WriteType::NoResponse),
            2 => Ok(WriteType::Default),
            4 => Ok(WriteType::Signed),
            _ => Err(Error::with_message(
                ErrorKind::InvalidResponse,
                format!("unknown write type {value}"),
            )),
        }
    }
}

impl From<WriteType> for i32 {
    fn from(write_type: WriteType) -> Self {
        write_type as i32
    }
}
