//! The asynchronous request/response channel to the native Bluetooth implementation.

use std::rc::Rc;

use serde_json::Value;

/// A transport that carries commands to the native plugin and reports their outcome.
///
/// Implementations must deliver replies one at a time and never from a thread other than the
/// one that owns the [`Ble`](crate::Ble) instance. For one-shot commands exactly one of
/// [`Reply::success`] or [`Reply::failure`] is called. Subscription commands (`startScan`,
/// `connect`, `enableNotification`, `startGattServer`) may call [`Reply::success`] any number
/// of times.
pub trait Bridge {
    fn invoke(&self, service: &str, action: &str, args: Vec<Value>, reply: Reply);
}

impl<B: Bridge + ?Sized> Bridge for Rc<B> {
    fn invoke(&self, service: &str, action: &str, args: Vec<Value>, reply: Reply) {
        (**self).invoke(service, action, args, reply)
    }
}

type Handler = Box<dyn FnMut(std::result::Result<Value, Value>)>;

/// The success and failure continuations of a single bridge command.
pub struct Reply {
    handler: Option<Handler>,
}

impl std::fmt::Debug for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reply")
            .field("closed", &self.is_closed())
            .finish()
    }
}

impl Reply {
    /// Creates a reply whose continuations are both routed to `handler`.
    pub fn new(handler: impl FnMut(std::result::Result<Value, Value>) + 'static) -> Self {
        Self {
            handler: Some(Box::new(handler)),
        }
    }

    /// A reply that discards every outcome.
    pub fn none() -> Self {
        Self { handler: None }
    }

    /// Delivers a success value.
    pub fn success(&mut self, value: Value) {
        if let Some(handler) = &mut self.handler {
            handler(Ok(value));
        }
    }

    /// Delivers a failure. A failure is terminal: the reply ignores everything after it.
    pub fn failure(&mut self, error: Value) {
        if let Some(mut handler) = self.handler.take() {
            handler(Err(error));
        }
    }

    pub fn is_closed(&self) -> bool {
        self.handler.is_none()
    }
}
