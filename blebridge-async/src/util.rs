use std::cell::Cell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

use futures_channel::{mpsc, oneshot};

use crate::error::{Error, Result};

pub struct ScopeGuard<F: FnOnce()> {
    dropfn: Option<F>,
}

impl<F: FnOnce()> ScopeGuard<F> {
    pub fn defuse(mut self) {
        self.dropfn = None;
    }
}

impl<F: FnOnce()> Drop for ScopeGuard<F> {
    fn drop(&mut self) {
        if let Some(dropfn) = self.dropfn.take() {
            dropfn();
        }
    }
}

pub fn defer<F: FnOnce()>(dropfn: F) -> ScopeGuard<F> {
    ScopeGuard {
        dropfn: Some(dropfn),
    }
}

pub struct BroadcastSender<T> {
    sender: async_broadcast::Sender<T>,
    _keep_alive: async_broadcast::InactiveReceiver<T>,
}

impl<T> Deref for BroadcastSender<T> {
    type Target = async_broadcast::Sender<T>;

    fn deref(&self) -> &Self::Target {
        &self.sender
    }
}

impl<T> DerefMut for BroadcastSender<T> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.sender
    }
}

pub type BroadcastReceiver<T> = async_broadcast::Receiver<T>;

pub fn broadcast<T>(cap: usize) -> BroadcastSender<T> {
    let (mut sender, receiver) = async_broadcast::broadcast(cap);
    sender.set_overflow(true);
    BroadcastSender {
        sender,
        _keep_alive: receiver.deactivate(),
    }
}

pub type Win<T> = Box<dyn FnOnce(T)>;
pub type Fail = Box<dyn FnOnce(blebridge::Error)>;

/// Runs a one-shot callback command and waits for its outcome.
///
/// Whichever continuation fires first settles the call; a reply after the future was dropped
/// is discarded.
pub async fn call<T: 'static>(start: impl FnOnce(Win<T>, Fail)) -> Result<T> {
    let (sender, receiver) = oneshot::channel();
    let sender = Rc::new(Cell::new(Some(sender)));
    let on_fail = sender.clone();

    start(
        Box::new(move |value| {
            if let Some(sender) = sender.take() {
                let _ = sender.send(Ok(value));
            }
        }),
        Box::new(move |error| {
            if let Some(sender) = on_fail.take() {
                let _ = sender.send(Err(Error::from(error)));
            }
        }),
    );

    receiver.await?
}

/// Adapts a subscription's continuations to a stream.
///
/// The value continuation returns `false` once the receiver is gone. A failure is sent as the
/// last item and ends the stream.
pub fn stream<T: 'static>() -> (
    impl FnMut(T) -> bool + 'static,
    impl FnOnce(blebridge::Error) + 'static,
    mpsc::UnboundedReceiver<Result<T>>,
) {
    let (sender, receiver) = mpsc::unbounded();
    let sender = Rc::new(Cell::new(Some(sender)));
    let on_fail = sender.clone();

    let on_value = move |value| {
        let Some(tx) = sender.take() else {
            return false;
        };
        if tx.unbounded_send(Ok(value)).is_err() {
            return false;
        }
        sender.set(Some(tx));
        true
    };
    let on_fail = move |error: blebridge::Error| {
        if let Some(tx) = on_fail.take() {
            let _ = tx.unbounded_send(Err(error.into()));
        }
    };
    (on_value, on_fail, receiver)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use futures_lite::StreamExt;
    use futures_lite::future::block_on;

    use super::*;

    #[test]
    fn guards_run_unless_defused() {
        let ran = Cell::new(0);
        drop(defer(|| ran.set(ran.get() + 1)));
        defer(|| ran.set(ran.get() + 10)).defuse();
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn calls_settle_once() {
        let value = block_on(call(|win, fail| {
            win(5);
            fail(blebridge::Error::from_native("late".into()));
        }));
        assert_eq!(value, Ok(5));
    }

    #[test]
    fn streams_end_after_a_failure() {
        let (mut on_value, on_fail, receiver) = stream::<u8>();
        assert!(on_value(1));
        on_fail(blebridge::Error::from_native("gone".into()));
        assert!(!on_value(2));

        let items = block_on(receiver.collect::<Vec<_>>());
        assert_eq!(items.len(), 2);
        assert_eq!(items[0], Ok(1));
        assert!(items[1].is_err());
    }
}
