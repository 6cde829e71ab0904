use btuuid::BluetoothUuid;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::characteristic::Characteristic;
use crate::error::{Error, ErrorKind};
use crate::handle::ServiceHandle;
use crate::util::to_bluetooth_uuid;

/// A GATT service of a remote device.
///
/// `characteristics` is empty unless the service came from
/// [`Ble::read_all_service_data`](crate::Ble::read_all_service_data).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    pub handle: ServiceHandle,
    #[serde(with = "crate::util::uuid_text")]
    pub uuid: Uuid,
    #[serde(rename = "type", alias = "serviceType", default)]
    pub service_type: ServiceType,
    #[serde(default)]
    pub characteristics: Vec<Characteristic>,
}

impl Service {
    pub fn bluetooth_uuid(&self) -> BluetoothUuid {
        to_bluetooth_uuid(&self.uuid)
    }

    pub fn is_primary(&self) -> bool {
        self.service_type == ServiceType::Primary
    }

    pub fn characteristic(&self, uuid: &BluetoothUuid) -> Option<&Characteristic> {
        self.characteristics
            .iter()
            .find(|characteristic| &characteristic.bluetooth_uuid() == uuid)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i32", into = "i32")]
#[repr(i32)]
pub enum ServiceType {
    #[default]
    Primary = 0,
    Secondary = 1,
}

impl TryFrom<i32> for ServiceType {
    type Error = Error;

    fn try_from(value: i32) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(ServiceType::Primary),
            1 => Ok(ServiceType::Secondary),
            _ => Err(Error::with_message(
                ErrorKind::InvalidResponse,
                format!("unknown service type {value}"),
            )),
        }
    }
}

impl From<ServiceType> for i32 {
    fn from(service_type: ServiceType) -> Self {
        service_type as i32
    }
}
