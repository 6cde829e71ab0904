//! A typed Bluetooth Low Energy API over an asynchronous native plugin bridge.
//!
//! Hosts such as hybrid-app shells expose Bluetooth through a plugin that accepts commands by
//! name with a JSON argument list and answers through success and failure continuations. This
//! crate wraps that channel (the [`Bridge`] trait) in a typed API: [`Ble`] issues scanning,
//! connection, GATT client, GATT server and advertising commands and decodes their replies into
//! the types in this crate.
//!
//! [`Ble::read_all_service_data`] assembles a device's full service, characteristic and
//! descriptor tree from the per-level queries the bridge offers.
//!
//! For tests and demos, [`sim::SimulatedBridge`] answers commands from a script. The
//! `blebridge-async` crate provides `async` functions and streams on top of this one.

pub mod advertisement_data;
mod advertiser;
mod ble;
mod bridge;
mod characteristic;
pub mod codec;
mod config;
mod descriptor;
mod device;
pub mod error;
mod handle;
mod server;
mod service;
pub mod sim;
mod topology;
mod util;

pub use advertiser::*;
pub use ble::Ble;
pub use bridge::*;
pub use characteristic::*;
pub use config::Config;
pub use descriptor::*;
pub use device::*;
pub use error::{Error, ErrorKind, Result};
pub use handle::*;
pub use server::*;
pub use service::*;
pub use util::{to_bluetooth_uuid, to_uuid};

pub use btuuid::BluetoothUuid;
