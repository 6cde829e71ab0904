use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use blebridge::{
    Ble, Characteristic, CharacteristicHandle, ConnectionState, Descriptor, DescriptorHandle,
    DeviceHandle, Service, ServiceHandle,
};
use futures_channel::mpsc;
use futures_util::{Stream, StreamExt};
use tracing::debug;

use crate::central::Connection;
use crate::error::Result;
use crate::topology::read_service_tree;
use crate::util::{BroadcastReceiver, call, stream};

/// A connected device.
///
/// Clones refer to the same connection. The connection stays open until
/// [`close()`][Self::close] is called.
#[derive(Clone)]
pub struct DeviceAsync {
    ble: Ble,
    handle: DeviceHandle,
    connection: Rc<Connection>,
}

impl std::fmt::Debug for DeviceAsync {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceAsync")
            .field("handle", &self.handle)
            .field("state", &self.connection.state.get())
            .finish()
    }
}

impl DeviceAsync {
    pub(crate) fn new(ble: Ble, handle: DeviceHandle, connection: Rc<Connection>) -> Self {
        DeviceAsync {
            ble,
            handle,
            connection,
        }
    }

    pub fn handle(&self) -> DeviceHandle {
        self.handle
    }

    /// The most recently reported connection state.
    pub fn state(&self) -> ConnectionState {
        self.connection.state.get()
    }

    /// Returns a stream of connection state changes reported after this call.
    pub fn state_updates(&self) -> BroadcastReceiver<ConnectionState> {
        self.connection.updates.new_receiver()
    }

    /// Closes the connection and frees its native resources.
    pub fn close(self) {
        self.ble.close(self.handle);
    }

    pub async fn rssi(&self) -> Result<i32> {
        call(|win, fail| self.ble.rssi(self.handle, win, fail)).await
    }

    /// Returns the device's services, without their characteristics.
    pub async fn services(&self) -> Result<Vec<Service>> {
        call(|win, fail| self.ble.services(self.handle, win, fail)).await
    }

    pub async fn characteristics(&self, service: ServiceHandle) -> Result<Vec<Characteristic>> {
        call(|win, fail| self.ble.characteristics(self.handle, service, win, fail)).await
    }

    pub async fn descriptors(&self, characteristic: CharacteristicHandle) -> Result<Vec<Descriptor>> {
        call(|win, fail| self.ble.descriptors(self.handle, characteristic, win, fail)).await
    }

    /// Reads every service, characteristic and descriptor of the device.
    ///
    /// Characteristic lists are fetched concurrently for all services, and descriptor lists
    /// for all characteristics of a service as soon as that service's list arrives. The first
    /// failure is returned and the remaining queries are abandoned.
    pub async fn read_all_service_data(&self) -> Result<Vec<Service>> {
        read_service_tree(&self.ble, self.handle).await
    }

    pub async fn read_characteristic(&self, characteristic: CharacteristicHandle) -> Result<Vec<u8>> {
        call(|win, fail| {
            self.ble
                .read_characteristic(self.handle, characteristic, win, fail)
        })
        .await
    }

    pub async fn read_descriptor(&self, descriptor: DescriptorHandle) -> Result<Vec<u8>> {
        call(|win, fail| self.ble.read_descriptor(self.handle, descriptor, win, fail)).await
    }

    pub async fn write_characteristic(
        &self,
        characteristic: CharacteristicHandle,
        data: &[u8],
    ) -> Result<()> {
        call(|win, fail| {
            self.ble
                .write_characteristic(self.handle, characteristic, data, move || win(()), fail)
        })
        .await
    }

    pub async fn write_descriptor(&self, descriptor: DescriptorHandle, data: &[u8]) -> Result<()> {
        call(|win, fail| {
            self.ble
                .write_descriptor(self.handle, descriptor, data, move || win(()), fail)
        })
        .await
    }

    /// Enables notifications for `characteristic` and returns the notified values as a stream.
    ///
    /// Dropping the stream disables notifications.
    pub fn notifications(&self, characteristic: CharacteristicHandle) -> Notifications {
        let (mut on_data, on_fail, receiver) = stream();
        self.ble.enable_notification(
            self.handle,
            characteristic,
            move |data| {
                on_data(data);
            },
            on_fail,
        );
        Notifications {
            receiver,
            ble: self.ble.clone(),
            device: self.handle,
            characteristic,
        }
    }
}

/// Values notified for one characteristic. See [`DeviceAsync::notifications()`].
#[derive(Debug)]
pub struct Notifications {
    receiver: mpsc::UnboundedReceiver<Result<Vec<u8>>>,
    ble: Ble,
    device: DeviceHandle,
    characteristic: CharacteristicHandle,
}

impl Stream for Notifications {
    type Item = Result<Vec<u8>>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.receiver.poll_next_unpin(cx)
    }
}

impl Drop for Notifications {
    fn drop(&mut self) {
        let (device, characteristic) = (self.device, self.characteristic);
        self.ble.disable_notification(
            device,
            characteristic,
            || {},
            move |error| debug!(%device, %characteristic, %error, "failed to disable notifications"),
        );
    }
}
