use std::cell::Cell;
use std::rc::Rc;

use blebridge::{
    AdvertiseSettings, AttributeHandle, Ble, DeviceHandle, GattServerDelegate, GattSettings,
    RequestId, ServerEvent,
};
use futures_channel::{mpsc, oneshot};
use futures_util::StreamExt;
use tracing::debug;

use crate::central::BleAsync;
use crate::error::{Error, Result};
use crate::util::call;

impl BleAsync {
    /// Starts the GATT server and waits until it is running.
    ///
    /// Connection changes and requests are delivered through
    /// [`GattServerAsync::next_event()`]. The stream ends if the server fails.
    pub async fn start_gatt_server(&self, settings: GattSettings) -> Result<GattServerAsync> {
        let (events, receiver) = mpsc::unbounded();
        let (started, on_started) = oneshot::channel();
        let started = Rc::new(Cell::new(Some(started)));
        let on_fail = started.clone();
        let closer = events.clone();

        Ble::start_gatt_server(
            self,
            settings,
            EventForwarder { events },
            move || {
                if let Some(sender) = started.take() {
                    let _ = sender.send(Ok(()));
                }
            },
            move |error| match on_fail.take() {
                Some(sender) => {
                    let _ = sender.send(Err(Error::from(error)));
                }
                None => closer.close_channel(),
            },
        );

        on_started.await??;
        Ok(GattServerAsync {
            ble: (**self).clone(),
            events: receiver,
            stopped: false,
        })
    }

    /// Starts advertising. Fails if advertising is already running.
    pub async fn start_advertise(&self, settings: &AdvertiseSettings) -> Result<()> {
        call(|win, fail| Ble::start_advertise(self, settings, move || win(()), fail)).await
    }

    pub async fn stop_advertise(&self) -> Result<()> {
        call(|win, fail| Ble::stop_advertise(self, move || win(()), fail)).await
    }
}

struct EventForwarder {
    events: mpsc::UnboundedSender<ServerEvent>,
}

impl GattServerDelegate for EventForwarder {
    fn did_change_connection_state(&self, _ble: &Ble, device: DeviceHandle, connected: bool) {
        let _ = self.events.unbounded_send(ServerEvent::ConnectionStateChange {
            device_handle: device,
            connected,
        });
    }

    fn did_receive_read_request(
        &self,
        _ble: &Ble,
        device: DeviceHandle,
        request: RequestId,
        attribute: AttributeHandle,
    ) {
        let _ = self.events.unbounded_send(ServerEvent::ReadRequest {
            device_handle: device,
            request_id: request,
            handle: attribute,
        });
    }

    fn did_receive_write_request(
        &self,
        _ble: &Ble,
        device: DeviceHandle,
        request: RequestId,
        attribute: AttributeHandle,
        data: Vec<u8>,
    ) {
        let _ = self.events.unbounded_send(ServerEvent::WriteRequest {
            device_handle: device,
            request_id: request,
            handle: attribute,
            data,
        });
    }
}

/// A running GATT server.
///
/// Dropping the server stops it, as [`stop()`][Self::stop] does, without waiting for the
/// outcome.
#[derive(Debug)]
pub struct GattServerAsync {
    ble: Ble,
    events: mpsc::UnboundedReceiver<ServerEvent>,
    stopped: bool,
}

impl GattServerAsync {
    /// Waits for the next connection change or request. Returns `None` once the server has
    /// failed.
    pub async fn next_event(&mut self) -> Option<ServerEvent> {
        self.events.next().await
    }

    /// Answers a read or write request. `data` is required for reads.
    pub async fn send_response(
        &self,
        device: DeviceHandle,
        request: RequestId,
        data: Option<&[u8]>,
    ) -> Result<()> {
        call(|win, fail| {
            self.ble
                .send_response(device, request, data, move || win(()), fail)
        })
        .await
    }

    pub async fn notify(
        &self,
        device: DeviceHandle,
        characteristic: AttributeHandle,
        data: &[u8],
    ) -> Result<()> {
        call(|win, fail| {
            self.ble
                .notify(device, characteristic, data, move || win(()), fail)
        })
        .await
    }

    /// Stops the server, which also stops advertising and disconnects every client.
    pub async fn stop(mut self) -> Result<()> {
        self.stopped = true;
        call(|win, fail| self.ble.stop_gatt_server(move || win(()), fail)).await
    }
}

impl Drop for GattServerAsync {
    fn drop(&mut self) {
        if !self.stopped {
            self.ble
                .stop_gatt_server(|| {}, |error| debug!(%error, "failed to stop GATT server"));
        }
    }
}
