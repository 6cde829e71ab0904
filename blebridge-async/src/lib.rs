//! An asynchronous wrapper for the `blebridge` crate.
//!
//! This crate provides `async` functions and streams on top of the callback API of
//! [`blebridge::Ble`]. Futures complete when the bridge replies; they are driven by whatever
//! single-threaded executor the host uses (`serial_executor`, a current-thread `tokio`
//! runtime, or `futures_lite::future::block_on`).
//!
//! See the `examples` directory for more complete usage examples.

mod central;
mod device;
pub mod error;
mod server;
mod topology;
mod util;

pub use blebridge::{
    AdvertiseData, AdvertiseSettings, AttributeHandle, Characteristic, CharacteristicHandle,
    Config, ConnectionState, Descriptor, DescriptorHandle, DeviceHandle, DeviceInfo,
    GattSettings, RequestId, ServerEvent, Service, ServiceHandle, advertisement_data, codec, sim,
};
pub use central::*;
pub use device::*;
pub use server::*;
