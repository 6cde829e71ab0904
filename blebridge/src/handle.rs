use serde::{Deserialize, Serialize};
use serde_json::Value;

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl From<i64> for $name {
            fn from(value: i64) -> Self {
                Self(value)
            }
        }

        impl From<$name> for Value {
            fn from(handle: $name) -> Self {
                Value::from(handle.0)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

handle!(
    /// A connected device. Valid until it is closed or the device disconnects.
    DeviceHandle
);
handle!(
    /// A service, meaningful only together with the [`DeviceHandle`] it was reported for.
    ServiceHandle
);
handle!(
    /// A characteristic, meaningful only together with the [`DeviceHandle`] it was reported for.
    CharacteristicHandle
);
handle!(
    /// A descriptor, meaningful only together with the [`DeviceHandle`] it was reported for.
    DescriptorHandle
);
handle!(
    /// A characteristic or descriptor hosted by the local GATT server.
    AttributeHandle
);
handle!(
    /// A pending read or write request received by the local GATT server.
    RequestId
);
