use std::cell::Cell;
use std::ops::Deref;
use std::rc::Rc;

use blebridge::{Ble, Bridge, Config, ConnectInfo, ConnectionState, DeviceHandle, DeviceInfo, Service};
use futures_channel::{mpsc, oneshot};
use tracing::debug;

use crate::device::DeviceAsync;
use crate::error::{Error, ErrorKind, Result};
use crate::topology::read_service_tree;
use crate::util::{BroadcastSender, broadcast, call, defer, stream};

/// An asynchronous wrapper around [`Ble`].
///
/// The callback API stays available through `Deref`.
#[derive(Debug, Clone)]
pub struct BleAsync {
    inner: Ble,
}

impl Deref for BleAsync {
    type Target = Ble;

    fn deref(&self) -> &Self::Target {
        &self.inner
    }
}

impl From<Ble> for BleAsync {
    fn from(inner: Ble) -> Self {
        Self { inner }
    }
}

impl BleAsync {
    pub fn new(bridge: impl Bridge + 'static) -> Self {
        Ble::new(bridge).into()
    }

    pub fn with_config(bridge: impl Bridge + 'static, config: Config) -> Self {
        Ble::with_config(bridge, config).into()
    }

    /// Starts scanning and returns the discovered devices as a stream.
    ///
    /// Dropping the receiver stops the scan when the next device is reported. A scan failure is
    /// the last item of the stream.
    pub fn scan(&self) -> mpsc::UnboundedReceiver<Result<DeviceInfo>> {
        let (mut on_device, on_fail, receiver) = stream();
        let ble = self.inner.clone();
        self.inner.start_scan(
            move |device| {
                if !on_device(device) {
                    debug!("scan receiver dropped, stopping scan");
                    ble.stop_scan();
                }
            },
            on_fail,
        );
        receiver
    }

    /// Connects to the device at `address` and waits until the connection is established.
    ///
    /// Fails with [`ErrorKind::NotConnected`] if the device disconnects first. If the returned
    /// future is dropped, the device handle is closed, either at once or as soon as the native
    /// side reports it.
    pub async fn connect(&self, address: &str) -> Result<DeviceAsync> {
        let connection = Rc::new(Connection::new(self.inner.config().event_capacity));
        let (sender, receiver) = oneshot::channel();
        connection.pending.set(Some(sender));

        let on_state = connection.clone();
        let on_fail = connection.clone();
        let ble = self.inner.clone();
        self.inner.connect(
            address,
            move |info| on_state.update(&ble, info),
            move |error| on_fail.fail(error.into()),
        );

        let guard = defer(|| connection.abandon(&self.inner));

        let handle = receiver.await??;
        guard.defuse();
        Ok(DeviceAsync::new(self.inner.clone(), handle, connection))
    }

    /// Reads the full service tree of a connected device. See
    /// [`DeviceAsync::read_all_service_data()`].
    pub async fn read_all_service_data(&self, device: DeviceHandle) -> Result<Vec<Service>> {
        read_service_tree(&self.inner, device).await
    }

    pub async fn test_char_conversion(&self, i: u8) -> Result<Vec<u8>> {
        // The callback form has no failure continuation; a failed conversion never resolves
        // `win`, so a dropped sender surfaces as `Canceled`.
        let (sender, receiver) = oneshot::channel();
        self.inner.test_char_conversion(i, move |value| {
            let _ = sender.send(value);
        });
        Ok(receiver.await?)
    }

    pub async fn reset(&self) -> Result<()> {
        call(|win, fail| self.inner.reset(move || win(()), fail)).await
    }
}

/// Connection state shared by a [`DeviceAsync`] and the `connect` subscription.
pub(crate) struct Connection {
    pub(crate) handle: Cell<Option<DeviceHandle>>,
    pub(crate) state: Cell<ConnectionState>,
    pending: Cell<Option<oneshot::Sender<Result<DeviceHandle>>>>,
    abandoned: Cell<bool>,
    pub(crate) updates: BroadcastSender<ConnectionState>,
}

impl Connection {
    fn new(capacity: usize) -> Self {
        Connection {
            handle: Cell::new(None),
            state: Cell::new(ConnectionState::Connecting),
            pending: Cell::new(None),
            abandoned: Cell::new(false),
            updates: broadcast(capacity),
        }
    }

    fn update(&self, ble: &Ble, info: ConnectInfo) {
        debug!(device = %info.device_handle, state = ?info.state, "connection state changed");
        if self.abandoned.get() {
            if self.handle.replace(Some(info.device_handle)).is_none() {
                debug!(device = %info.device_handle, "connect abandoned, closing late device");
                ble.close(info.device_handle);
            }
            return;
        }
        self.handle.set(Some(info.device_handle));
        self.state.set(info.state);

        match info.state {
            ConnectionState::Connected => self.settle(Ok(info.device_handle)),
            ConnectionState::Disconnected => self.settle(Err(ErrorKind::NotConnected.into())),
            ConnectionState::Connecting | ConnectionState::Disconnecting => {}
        }
        let _ = self.updates.try_broadcast(info.state);
    }

    fn fail(&self, error: Error) {
        debug!(%error, "connection failed");
        self.state.set(ConnectionState::Disconnected);
        self.settle(Err(error));
        let _ = self.updates.try_broadcast(ConnectionState::Disconnected);
    }

    /// Gives up on the connection. A handle already reported is closed now; one reported later
    /// is closed when it arrives.
    fn abandon(&self, ble: &Ble) {
        self.abandoned.set(true);
        if let Some(handle) = self.handle.get() {
            debug!(device = %handle, "connect abandoned, closing device");
            ble.close(handle);
        }
    }

    fn settle(&self, result: Result<DeviceHandle>) {
        if let Some(sender) = self.pending.take() {
            let _ = sender.send(result);
        }
    }
}
