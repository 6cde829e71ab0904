//! An in-memory [`Bridge`] that answers commands from a script.
//!
//! `SimulatedBridge` stands in for the native plugin in tests and demos. Replies are scripted
//! per command and argument list, every invocation is recorded, and subscriptions stay open so
//! more values can be pushed with [`emit()`][SimulatedBridge::emit].
//!
//! Three delivery modes control when replies reach the caller:
//!
//! * [`immediate()`][SimulatedBridge::immediate] delivers inside `invoke`.
//! * [`queued()`][SimulatedBridge::queued] queues each reply as a separate job on a
//!   [`serial_executor::Executor`], so replies arrive later and interleave with other work.
//! * [`manual()`][SimulatedBridge::manual] holds replies until the test releases them, in any
//!   order.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use serde_json::Value;
use serial_executor::Executor;
use tracing::trace;

use crate::bridge::{Bridge, Reply};

const SUBSCRIPTIONS: &[&str] = &["startScan", "connect", "enableNotification", "startGattServer"];

/// Commands that end an open subscription, and whether the arguments must match.
const CANCELLATIONS: &[(&str, &str, bool)] = &[
    ("stopScan", "startScan", false),
    ("disableNotification", "enableNotification", true),
    ("stopGattServer", "startGattServer", false),
];

/// A single scripted reply.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(Value),
    Failure(Value),
}

impl Outcome {
    pub fn success(value: impl Into<Value>) -> Self {
        Outcome::Success(value.into())
    }

    pub fn failure(error: impl Into<Value>) -> Self {
        Outcome::Failure(error.into())
    }
}

/// A command received by the bridge.
#[derive(Debug, Clone, PartialEq)]
pub struct Invocation {
    pub service: String,
    pub action: String,
    pub args: Vec<Value>,
}

#[derive(Debug)]
enum Mode {
    Immediate,
    Queued(Executor),
    Manual,
}

type SharedReply = Rc<RefCell<Reply>>;

struct Delivery {
    action: String,
    reply: SharedReply,
    outcome: Outcome,
}

impl Delivery {
    fn run(self) {
        trace!(action = %self.action, outcome = ?self.outcome, "delivering simulated reply");
        let mut reply = self.reply.borrow_mut();
        match self.outcome {
            Outcome::Success(value) => reply.success(value),
            Outcome::Failure(error) => reply.failure(error),
        }
    }
}

struct Subscription {
    action: String,
    args: Vec<Value>,
    reply: SharedReply,
}

struct State {
    mode: Mode,
    script: RefCell<HashMap<String, VecDeque<Vec<Outcome>>>>,
    invocations: RefCell<Vec<Invocation>>,
    held: RefCell<VecDeque<Delivery>>,
    open: RefCell<Vec<Subscription>>,
}

/// A scripted, single-threaded stand-in for the native plugin.
///
/// Clones share the same script, log and subscriptions.
#[derive(Clone)]
pub struct SimulatedBridge {
    state: Rc<State>,
}

impl std::fmt::Debug for SimulatedBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedBridge")
            .field("mode", &self.state.mode)
            .field("invocations", &self.state.invocations.borrow().len())
            .field("held", &self.state.held.borrow().len())
            .finish()
    }
}

impl SimulatedBridge {
    pub fn immediate() -> Self {
        Self::with_mode(Mode::Immediate)
    }

    pub fn queued(executor: &Executor) -> Self {
        Self::with_mode(Mode::Queued(executor.clone()))
    }

    pub fn manual() -> Self {
        Self::with_mode(Mode::Manual)
    }

    fn with_mode(mode: Mode) -> Self {
        SimulatedBridge {
            state: Rc::new(State {
                mode,
                script: Default::default(),
                invocations: Default::default(),
                held: Default::default(),
                open: Default::default(),
            }),
        }
    }

    /// Scripts the reply to `action` called with exactly `args`.
    pub fn respond(&self, action: &str, args: impl IntoIterator<Item = Value>, outcome: Outcome) {
        self.respond_many(action, args, vec![outcome]);
    }

    /// Scripts a sequence of replies delivered in order to a single invocation.
    ///
    /// Scripting the same command again queues a reply set for the next invocation. The last
    /// reply set is reused for every invocation after the queue runs out. Commands without a
    /// script fail with a "no reply scripted" message.
    pub fn respond_many(
        &self,
        action: &str,
        args: impl IntoIterator<Item = Value>,
        outcomes: Vec<Outcome>,
    ) {
        let args: Vec<Value> = args.into_iter().collect();
        self.state
            .script
            .borrow_mut()
            .entry(key(action, &args))
            .or_default()
            .push_back(outcomes);
    }

    pub fn invocations(&self) -> Vec<Invocation> {
        self.state.invocations.borrow().clone()
    }

    /// Returns how many times `action` was invoked.
    pub fn count(&self, action: &str) -> usize {
        self.state
            .invocations
            .borrow()
            .iter()
            .filter(|invocation| invocation.action == action)
            .count()
    }

    /// Pushes `value` to every open subscription started by `action`. Returns how many
    /// subscriptions received it.
    pub fn emit(&self, action: &str, value: Value) -> usize {
        self.emit_matching(action, None, value)
    }

    /// Pushes `value` to the open subscriptions started by `action` with exactly `args`.
    pub fn emit_to(&self, action: &str, args: &[Value], value: Value) -> usize {
        self.emit_matching(action, Some(args), value)
    }

    pub fn is_subscribed(&self, action: &str) -> bool {
        self.state
            .open
            .borrow()
            .iter()
            .any(|sub| {
                sub.action == action
                    && sub.reply.try_borrow().map_or(true, |reply| !reply.is_closed())
            })
    }

    /// Number of replies held back in manual mode.
    pub fn pending(&self) -> usize {
        self.state.held.borrow().len()
    }

    /// Delivers the oldest held reply. Returns `false` if none was held.
    pub fn deliver_next(&self) -> bool {
        let delivery = self.state.held.borrow_mut().pop_front();
        delivery.map(Delivery::run).is_some()
    }

    /// Delivers the most recently held reply. Returns `false` if none was held.
    pub fn deliver_last(&self) -> bool {
        let delivery = self.state.held.borrow_mut().pop_back();
        delivery.map(Delivery::run).is_some()
    }

    /// Delivers held replies oldest first, including ones held while delivering.
    pub fn deliver_all(&self) -> usize {
        let mut count = 0;
        while self.deliver_next() {
            count += 1;
        }
        count
    }

    fn emit_matching(&self, action: &str, args: Option<&[Value]>, value: Value) -> usize {
        self.state
            .open
            .borrow_mut()
            .retain(|sub| sub.reply.try_borrow().map_or(true, |reply| !reply.is_closed()));

        let targets: Vec<SharedReply> = self
            .state
            .open
            .borrow()
            .iter()
            .filter(|sub| sub.action == action && args.is_none_or(|args| sub.args == args))
            .map(|sub| sub.reply.clone())
            .collect();

        let mut delivered = 0;
        for reply in &targets {
            // A reply that is mid-delivery cannot be re-entered.
            if let Ok(mut reply) = reply.try_borrow_mut() {
                reply.success(value.clone());
                delivered += 1;
            }
        }
        delivered
    }

    fn next_outcomes(&self, action: &str, args: &[Value]) -> Vec<Outcome> {
        let mut script = self.state.script.borrow_mut();
        match script.get_mut(&key(action, args)) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
            Some(queue) => queue.front().cloned().unwrap_or_default(),
            None => vec![Outcome::failure(format!("no reply scripted for {action}"))],
        }
    }

    fn cancel_subscriptions(&self, action: &str, args: &[Value]) {
        for (cancel, target, match_args) in CANCELLATIONS {
            if *cancel == action {
                self.state
                    .open
                    .borrow_mut()
                    .retain(|sub| sub.action != *target || (*match_args && sub.args != args));
            }
        }
    }
}

impl Bridge for SimulatedBridge {
    fn invoke(&self, service: &str, action: &str, args: Vec<Value>, reply: Reply) {
        trace!(service, action, ?args, "simulated bridge invoked");
        self.state.invocations.borrow_mut().push(Invocation {
            service: service.to_owned(),
            action: action.to_owned(),
            args: args.clone(),
        });

        self.cancel_subscriptions(action, &args);
        let outcomes = self.next_outcomes(action, &args);
        let reply = Rc::new(RefCell::new(reply));

        if SUBSCRIPTIONS.contains(&action) {
            self.state.open.borrow_mut().push(Subscription {
                action: action.to_owned(),
                args,
                reply: reply.clone(),
            });
        }

        let deliveries = outcomes.into_iter().map(|outcome| Delivery {
            action: action.to_owned(),
            reply: reply.clone(),
            outcome,
        });

        match &self.state.mode {
            Mode::Immediate => deliveries.for_each(Delivery::run),
            Mode::Queued(executor) => {
                for delivery in deliveries {
                    executor.exec_async(move || delivery.run());
                }
            }
            Mode::Manual => self.state.held.borrow_mut().extend(deliveries),
        }
    }
}

fn key(action: &str, args: &[Value]) -> String {
    format!("{action}{}", Value::from(args.to_vec()))
}
