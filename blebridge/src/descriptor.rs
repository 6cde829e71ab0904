use btuuid::BluetoothUuid;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::characteristic::Permissions;
use crate::handle::DescriptorHandle;
use crate::util::to_bluetooth_uuid;

pub const CHARACTERISTIC_EXTENDED_PROPERTIES: BluetoothUuid = BluetoothUuid::from_u16(0x2900);
pub const CHARACTERISTIC_USER_DESCRIPTION: BluetoothUuid = BluetoothUuid::from_u16(0x2901);
pub const CLIENT_CHARACTERISTIC_CONFIGURATION: BluetoothUuid = BluetoothUuid::from_u16(0x2902);

/// Value to write to the Client Characteristic Configuration descriptor to enable notifications.
pub const ENABLE_NOTIFICATION_VALUE: [u8; 2] = [0x01, 0x00];
/// Value to write to the Client Characteristic Configuration descriptor to enable indications.
pub const ENABLE_INDICATION_VALUE: [u8; 2] = [0x02, 0x00];

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    pub handle: DescriptorHandle,
    #[serde(with = "crate::util::uuid_text")]
    pub uuid: Uuid,
    #[serde(default)]
    pub permissions: Permissions,
}

impl Descriptor {
    pub fn bluetooth_uuid(&self) -> BluetoothUuid {
        to_bluetooth_uuid(&self.uuid)
    }
}
