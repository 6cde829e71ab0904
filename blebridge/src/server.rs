//! The GATT server role: publishing local services and answering remote requests.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;
use uuid::Uuid;

use crate::ble::{Ble, json, unit};
use crate::characteristic::{Permissions, Properties, WriteType};
use crate::error::{Error, ErrorKind, Result};
use crate::handle::{AttributeHandle, DeviceHandle, RequestId};
use crate::service::ServiceType;
use crate::util::encode_bytes;

/// The services published by [`Ble::start_gatt_server`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GattSettings {
    pub services: Vec<GattService>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GattService {
    #[serde(with = "crate::util::uuid_text")]
    pub uuid: Uuid,
    #[serde(rename = "type", default)]
    pub service_type: ServiceType,
    #[serde(default)]
    pub characteristics: Vec<GattCharacteristic>,
}

impl GattService {
    pub fn new(uuid: Uuid) -> Self {
        GattService {
            uuid,
            service_type: ServiceType::Primary,
            characteristics: Vec::new(),
        }
    }

    pub fn with_characteristic(mut self, characteristic: GattCharacteristic) -> Self {
        self.characteristics.push(characteristic);
        self
    }
}

/// A characteristic published by the local GATT server.
///
/// `handle` identifies the characteristic in requests and in [`Ble::notify`]. It is assigned
/// automatically when left unset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GattCharacteristic {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<AttributeHandle>,
    #[serde(with = "crate::util::uuid_text")]
    pub uuid: Uuid,
    #[serde(default)]
    pub permissions: Permissions,
    #[serde(default)]
    pub properties: Properties,
    #[serde(default)]
    pub write_type: WriteType,
    #[serde(default)]
    pub descriptors: Vec<GattDescriptor>,
}

impl GattCharacteristic {
    pub fn new(uuid: Uuid, properties: Properties, permissions: Permissions) -> Self {
        GattCharacteristic {
            handle: None,
            uuid,
            permissions,
            properties,
            write_type: WriteType::Default,
            descriptors: Vec::new(),
        }
    }

    pub fn with_handle(mut self, handle: AttributeHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn with_descriptor(mut self, descriptor: GattDescriptor) -> Self {
        self.descriptors.push(descriptor);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GattDescriptor {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handle: Option<AttributeHandle>,
    #[serde(with = "crate::util::uuid_text")]
    pub uuid: Uuid,
    #[serde(default)]
    pub permissions: Permissions,
}

impl GattDescriptor {
    pub fn new(uuid: Uuid, permissions: Permissions) -> Self {
        GattDescriptor {
            handle: None,
            uuid,
            permissions,
        }
    }
}

impl GattSettings {
    fn handles_mut(&mut self) -> impl Iterator<Item = &mut Option<AttributeHandle>> {
        self.services
            .iter_mut()
            .flat_map(|service| service.characteristics.iter_mut())
            .flat_map(|characteristic| {
                std::iter::once(&mut characteristic.handle).chain(
                    characteristic
                        .descriptors
                        .iter_mut()
                        .map(|descriptor| &mut descriptor.handle),
                )
            })
    }

    /// Gives every characteristic and descriptor without a handle a unique one, numbered after
    /// the largest handle already present.
    ///
    /// Fails with [`ErrorKind::InvalidArgument`] if two attributes share an explicit handle or
    /// the numbering would overflow; nothing is assigned in that case.
    pub fn assign_handles(&mut self) -> Result<()> {
        let mut seen = HashSet::new();
        for handle in self.handles_mut().filter_map(|handle| *handle) {
            if !seen.insert(handle) {
                return Err(Error::with_message(
                    ErrorKind::InvalidArgument,
                    format!("attribute handle {handle} is used more than once"),
                ));
            }
        }

        let mut next = seen.iter().map(|handle| handle.0).max().unwrap_or(0);
        let unassigned = self.handles_mut().filter(|handle| handle.is_none()).count();
        let last = i64::try_from(unassigned)
            .ok()
            .and_then(|count| next.checked_add(count));
        if last.is_none() {
            return Err(Error::with_message(
                ErrorKind::InvalidArgument,
                format!("no attribute handles left above {next}"),
            ));
        }
        for handle in self.handles_mut().filter(|handle| handle.is_none()) {
            next += 1;
            *handle = Some(AttributeHandle(next));
        }
        Ok(())
    }
}

/// An event reported by the running GATT server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "name", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// The server is running. Reported once, before any other event.
    Started,
    ConnectionStateChange {
        device_handle: DeviceHandle,
        connected: bool,
    },
    ReadRequest {
        device_handle: DeviceHandle,
        request_id: RequestId,
        handle: AttributeHandle,
    },
    WriteRequest {
        device_handle: DeviceHandle,
        request_id: RequestId,
        handle: AttributeHandle,
        #[serde(with = "crate::util::base64_bytes")]
        data: Vec<u8>,
    },
}

/// Receives the events of a running GATT server.
///
/// Every read and write request must be answered with [`Ble::send_response`].
#[allow(unused_variables)]
pub trait GattServerDelegate {
    /// A remote device connected (`connected == true`) or disconnected. The handle is valid
    /// for [`Ble::close`] and [`Ble::notify`] only while the device is connected.
    fn did_change_connection_state(&self, ble: &Ble, device: DeviceHandle, connected: bool) {}

    fn did_receive_read_request(
        &self,
        ble: &Ble,
        device: DeviceHandle,
        request: RequestId,
        attribute: AttributeHandle,
    ) {
    }

    fn did_receive_write_request(
        &self,
        ble: &Ble,
        device: DeviceHandle,
        request: RequestId,
        attribute: AttributeHandle,
        data: Vec<u8>,
    ) {
    }
}

impl Ble {
    /// Starts the GATT server with the services in `settings`.
    ///
    /// Attribute handles are assigned first (see [`GattSettings::assign_handles`]); if that
    /// fails, `fail` is called and the bridge is not contacted. `win` is called once the server
    /// is running, after which events are routed to `delegate` until the server stops.
    pub fn start_gatt_server(
        &self,
        mut settings: GattSettings,
        delegate: impl GattServerDelegate + 'static,
        win: impl FnOnce() + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        if let Err(error) = settings.assign_handles() {
            return fail(error);
        }
        let settings = match serde_json::to_value(&settings) {
            Ok(settings) => settings,
            Err(error) => {
                return fail(Error::with_message(ErrorKind::InvalidArgument, error.to_string()));
            }
        };

        let ble = self.clone();
        let mut win = Some(win);
        self.subscribe(
            "startGattServer",
            vec![settings],
            json,
            move |event: ServerEvent| match event {
                ServerEvent::Started => match win.take() {
                    Some(win) => win(),
                    None => debug!("GATT server reported started twice"),
                },
                ServerEvent::ConnectionStateChange {
                    device_handle,
                    connected,
                } => delegate.did_change_connection_state(&ble, device_handle, connected),
                ServerEvent::ReadRequest {
                    device_handle,
                    request_id,
                    handle,
                } => delegate.did_receive_read_request(&ble, device_handle, request_id, handle),
                ServerEvent::WriteRequest {
                    device_handle,
                    request_id,
                    handle,
                    data,
                } => delegate.did_receive_write_request(
                    &ble,
                    device_handle,
                    request_id,
                    handle,
                    data,
                ),
            },
            fail,
        );
    }

    /// Stops the GATT server. This also stops advertising and disconnects every client.
    pub fn stop_gatt_server(&self, win: impl FnOnce() + 'static, fail: impl FnOnce(Error) + 'static) {
        self.request("stopGattServer", Vec::new(), unit, |()| win(), fail);
    }

    /// Answers a read or write request. `data` is required for reads and may be `None` for
    /// writes.
    pub fn send_response(
        &self,
        device: DeviceHandle,
        request: RequestId,
        data: Option<&[u8]>,
        win: impl FnOnce() + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        let data = data.map_or(Value::Null, encode_bytes);
        let args = vec![device.into(), request.into(), data];
        self.request("sendResponse", args, unit, |()| win(), fail);
    }

    /// Tells a connected client that a characteristic's value changed.
    pub fn notify(
        &self,
        device: DeviceHandle,
        characteristic: AttributeHandle,
        data: &[u8],
        win: impl FnOnce() + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        let args = vec![device.into(), characteristic.into(), encode_bytes(data)];
        self.request("notify", args, unit, |()| win(), fail);
    }
}
