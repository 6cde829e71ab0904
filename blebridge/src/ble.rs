//! The application's interface to the native Bluetooth LE plugin.

use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::bridge::{Bridge, Reply};
use crate::characteristic::Characteristic;
use crate::config::Config;
use crate::descriptor::Descriptor;
use crate::device::{ConnectInfo, DeviceInfo};
use crate::error::{Error, Result};
use crate::handle::{CharacteristicHandle, DescriptorHandle, DeviceHandle, ServiceHandle};
use crate::service::Service;
use crate::util::{decode_bytes, encode_bytes};

/// Issues Bluetooth LE commands over a [`Bridge`] and decodes their replies.
///
/// Every method forwards to exactly one bridge command and relays its outcome to the supplied
/// continuations; arguments are not validated locally. Cloning a `Ble` is cheap and yields a
/// handle to the same bridge.
#[derive(Clone)]
pub struct Ble {
    inner: Rc<BleInner>,
}

struct BleInner {
    bridge: Box<dyn Bridge>,
    config: Config,
}

impl std::fmt::Debug for Ble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ble")
            .field("config", &self.inner.config)
            .finish()
    }
}

impl Ble {
    pub fn new(bridge: impl Bridge + 'static) -> Self {
        Self::with_config(bridge, Config::default())
    }

    pub fn with_config(bridge: impl Bridge + 'static, config: Config) -> Self {
        Ble {
            inner: Rc::new(BleInner {
                bridge: Box::new(bridge),
                config,
            }),
        }
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Starts scanning for devices. `on_device` is called for every advertisement until
    /// [`stop_scan()`][Self::stop_scan] is called.
    pub fn start_scan(
        &self,
        on_device: impl FnMut(DeviceInfo) + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        self.subscribe("startScan", Vec::new(), json, on_device, fail);
    }

    pub fn stop_scan(&self) {
        self.invoke("stopScan", Vec::new(), Reply::none());
    }

    /// Connects to the device at `address`. `on_state` is called on every connection state
    /// change; the first call carries the [`DeviceHandle`] used by all other device commands.
    pub fn connect(
        &self,
        address: &str,
        on_state: impl FnMut(ConnectInfo) + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        self.subscribe("connect", vec![Value::from(address)], json, on_state, fail);
    }

    /// Closes the connection and frees native resources. Does not notify the `connect`
    /// continuation.
    pub fn close(&self, device: DeviceHandle) {
        self.invoke("close", vec![device.into()], Reply::none());
    }

    pub fn rssi(
        &self,
        device: DeviceHandle,
        win: impl FnOnce(i32) + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        self.request("rssi", vec![device.into()], json, win, fail);
    }

    pub fn services(
        &self,
        device: DeviceHandle,
        win: impl FnOnce(Vec<Service>) + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        self.request("services", vec![device.into()], json, win, fail);
    }

    pub fn characteristics(
        &self,
        device: DeviceHandle,
        service: ServiceHandle,
        win: impl FnOnce(Vec<Characteristic>) + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        let args = vec![device.into(), service.into()];
        self.request("characteristics", args, json, win, fail);
    }

    pub fn descriptors(
        &self,
        device: DeviceHandle,
        characteristic: CharacteristicHandle,
        win: impl FnOnce(Vec<Descriptor>) + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        let args = vec![device.into(), characteristic.into()];
        self.request("descriptors", args, json, win, fail);
    }

    pub fn read_characteristic(
        &self,
        device: DeviceHandle,
        characteristic: CharacteristicHandle,
        win: impl FnOnce(Vec<u8>) + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        let args = vec![device.into(), characteristic.into()];
        self.request("readCharacteristic", args, decode_bytes, win, fail);
    }

    pub fn read_descriptor(
        &self,
        device: DeviceHandle,
        descriptor: DescriptorHandle,
        win: impl FnOnce(Vec<u8>) + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        let args = vec![device.into(), descriptor.into()];
        self.request("readDescriptor", args, decode_bytes, win, fail);
    }

    pub fn write_characteristic(
        &self,
        device: DeviceHandle,
        characteristic: CharacteristicHandle,
        data: &[u8],
        win: impl FnOnce() + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        let args = vec![device.into(), characteristic.into(), encode_bytes(data)];
        self.request("writeCharacteristic", args, unit, |()| win(), fail);
    }

    pub fn write_descriptor(
        &self,
        device: DeviceHandle,
        descriptor: DescriptorHandle,
        data: &[u8],
        win: impl FnOnce() + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        let args = vec![device.into(), descriptor.into(), encode_bytes(data)];
        self.request("writeDescriptor", args, unit, |()| win(), fail);
    }

    /// Requests notification of changes to a characteristic's value. `on_data` is called with
    /// every new value until [`disable_notification()`][Self::disable_notification] is called.
    pub fn enable_notification(
        &self,
        device: DeviceHandle,
        characteristic: CharacteristicHandle,
        on_data: impl FnMut(Vec<u8>) + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        let args = vec![device.into(), characteristic.into()];
        self.subscribe("enableNotification", args, decode_bytes, on_data, fail);
    }

    pub fn disable_notification(
        &self,
        device: DeviceHandle,
        characteristic: CharacteristicHandle,
        win: impl FnOnce() + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        let args = vec![device.into(), characteristic.into()];
        self.request("disableNotification", args, unit, |()| win(), fail);
    }

    /// Asks the native side to convert `i` to a one-byte array and return it.
    pub fn test_char_conversion(&self, i: u8, win: impl FnOnce(Vec<u8>) + 'static) {
        self.request(
            "testCharConversion",
            vec![Value::from(i)],
            decode_bytes,
            win,
            |error| debug!(%error, "testCharConversion failed"),
        );
    }

    /// Resets the platform's Bluetooth system. This stops scanning and drops every connection.
    pub fn reset(&self, win: impl FnOnce() + 'static, fail: impl FnOnce(Error) + 'static) {
        self.request("reset", Vec::new(), unit, |()| win(), fail);
    }

    pub(crate) fn invoke(&self, action: &'static str, args: Vec<Value>, reply: Reply) {
        let service = &self.inner.config.service;
        trace!(service = %service, action, "invoking bridge command");
        self.inner.bridge.invoke(service, action, args, reply);
    }

    /// Issues a one-shot command. Replies after the first are ignored.
    pub(crate) fn request<T: 'static>(
        &self,
        action: &'static str,
        args: Vec<Value>,
        decode: impl Fn(Value) -> Result<T> + 'static,
        win: impl FnOnce(T) + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        let mut pending = Some((win, fail));
        let reply = Reply::new(move |outcome| {
            let Some((win, fail)) = pending.take() else {
                debug!(action, "ignoring repeated reply to a one-shot command");
                return;
            };
            match settle(action, outcome, &decode) {
                Ok(value) => win(value),
                Err(error) => fail(error),
            }
        });
        self.invoke(action, args, reply);
    }

    /// Issues a subscription command. Values are delivered until the first failure. A value
    /// that does not decode is logged and skipped; it does not end the subscription.
    pub(crate) fn subscribe<T: 'static>(
        &self,
        action: &'static str,
        args: Vec<Value>,
        decode: impl Fn(Value) -> Result<T> + 'static,
        mut on_value: impl FnMut(T) + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        let mut fail = Some(fail);
        let reply = Reply::new(move |outcome| match outcome {
            Ok(_) if fail.is_none() => debug!(action, "ignoring value after subscription failed"),
            Ok(value) => match decode(value) {
                Ok(value) => on_value(value),
                Err(error) => warn!(action, %error, "skipping undecodable subscription value"),
            },
            Err(value) => match fail.take() {
                Some(fail) => fail(Error::from_native(value)),
                None => debug!(action, %value, "ignoring failure after subscription failed"),
            },
        });
        self.invoke(action, args, reply);
    }
}

fn settle<T>(
    action: &str,
    outcome: std::result::Result<Value, Value>,
    decode: &impl Fn(Value) -> Result<T>,
) -> Result<T> {
    match outcome {
        Ok(value) => decode(value).inspect_err(|error| {
            warn!(action, %error, "bridge reply did not decode");
        }),
        Err(value) => Err(Error::from_native(value)),
    }
}

pub(crate) fn json<T: DeserializeOwned>(value: Value) -> Result<T> {
    Ok(serde_json::from_value(value)?)
}

pub(crate) fn unit(_value: Value) -> Result<()> {
    Ok(())
}
