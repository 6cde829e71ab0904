//! Reads a device's complete GATT tree in one call.

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use tracing::{debug, warn};

use crate::ble::Ble;
use crate::characteristic::Characteristic;
use crate::descriptor::Descriptor;
use crate::error::Error;
use crate::handle::{CharacteristicHandle, DeviceHandle, ServiceHandle};
use crate::service::Service;

impl Ble {
    /// Fetches every service of `device`, every characteristic of each service and every
    /// descriptor of each characteristic, and delivers the assembled tree to `win`.
    ///
    /// Characteristic and descriptor lists are requested as soon as their parent is known,
    /// without waiting for siblings. Services keep the order the bridge reported them in, and
    /// children are attached to the parent they were requested for regardless of the order
    /// replies arrive in.
    ///
    /// The first failed query is reported through `fail`. Queries already in flight are not
    /// cancelled, but nothing is reported after that failure.
    pub fn read_all_service_data(
        &self,
        device: DeviceHandle,
        win: impl FnOnce(Vec<Service>) + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        let aggregation = Rc::new(Aggregation {
            device,
            services: RefCell::new(Vec::new()),
            pending: JoinCounter::default(),
            completion: RefCell::new(Some(Completion {
                win: Box::new(win),
                fail: Box::new(fail),
            })),
        });

        let ble = self.clone();
        let on_fail = aggregation.clone();
        self.services(
            device,
            move |services| aggregation.on_services(&ble, services),
            move |error| on_fail.fail("services", error),
        );
    }
}

/// Counts the outstanding units of work of one aggregation.
///
/// Each service is one unit until its characteristic list arrives, at which point it is
/// replaced by one unit per characteristic. Each descriptor list completes one unit.
#[derive(Debug, Default)]
struct JoinCounter(Cell<usize>);

impl JoinCounter {
    fn start(&self, units: usize) -> bool {
        self.0.set(units);
        units == 0
    }

    /// Completes one unit after adding `spawned` new ones. Returns `true` when nothing is left.
    fn complete(&self, spawned: usize) -> bool {
        let remaining = (self.0.get() + spawned).saturating_sub(1);
        self.0.set(remaining);
        remaining == 0
    }
}

struct Completion {
    win: Box<dyn FnOnce(Vec<Service>)>,
    fail: Box<dyn FnOnce(Error)>,
}

struct Aggregation {
    device: DeviceHandle,
    services: RefCell<Vec<Service>>,
    pending: JoinCounter,
    completion: RefCell<Option<Completion>>,
}

impl Aggregation {
    fn on_services(self: &Rc<Self>, ble: &Ble, services: Vec<Service>) {
        let handles: Vec<ServiceHandle> = services.iter().map(|service| service.handle).collect();
        *self.services.borrow_mut() = services;

        // The count must be in place before the first request: an immediate bridge replies
        // from inside `characteristics()`.
        if self.pending.start(handles.len()) {
            return self.succeed();
        }

        for (index, handle) in handles.into_iter().enumerate() {
            let this = self.clone();
            let on_fail = self.clone();
            let next = ble.clone();
            ble.characteristics(
                self.device,
                handle,
                move |characteristics| this.on_characteristics(&next, index, characteristics),
                move |error| on_fail.fail("characteristics", error),
            );
        }
    }

    fn on_characteristics(
        self: &Rc<Self>,
        ble: &Ble,
        service: usize,
        characteristics: Vec<Characteristic>,
    ) {
        let handles: Vec<CharacteristicHandle> = characteristics
            .iter()
            .map(|characteristic| characteristic.handle)
            .collect();
        if let Some(parent) = self.services.borrow_mut().get_mut(service) {
            parent.characteristics = characteristics;
        }

        if self.pending.complete(handles.len()) {
            return self.succeed();
        }

        for (index, handle) in handles.into_iter().enumerate() {
            let this = self.clone();
            let on_fail = self.clone();
            ble.descriptors(
                self.device,
                handle,
                move |descriptors| this.on_descriptors(service, index, descriptors),
                move |error| on_fail.fail("descriptors", error),
            );
        }
    }

    fn on_descriptors(&self, service: usize, characteristic: usize, descriptors: Vec<Descriptor>) {
        if let Some(parent) = self
            .services
            .borrow_mut()
            .get_mut(service)
            .and_then(|service| service.characteristics.get_mut(characteristic))
        {
            parent.descriptors = descriptors;
        }

        if self.pending.complete(0) {
            self.succeed();
        }
    }

    fn succeed(&self) {
        let services = std::mem::take(&mut *self.services.borrow_mut());
        let completion = self.completion.borrow_mut().take();
        match completion {
            Some(completion) => (completion.win)(services),
            None => debug!(device = %self.device, "service tree completed after a failure"),
        }
    }

    fn fail(&self, query: &'static str, error: Error) {
        warn!(device = %self.device, query, %error, "service tree query failed");
        let completion = self.completion.borrow_mut().take();
        match completion {
            Some(completion) => (completion.fail)(error),
            None => debug!(device = %self.device, query, "suppressing failure after completion"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;

    use serde_json::json;

    use super::*;
    use crate::sim::{Outcome, SimulatedBridge};

    type Log<T> = Rc<RefCell<Vec<T>>>;

    fn read(ble: &Ble, device: i64) -> (Log<Vec<Service>>, Log<Error>) {
        let wins = Log::default();
        let fails = Log::default();
        let (w, f) = (wins.clone(), fails.clone());
        ble.read_all_service_data(
            DeviceHandle(device),
            move |services| w.borrow_mut().push(services),
            move |error| f.borrow_mut().push(error),
        );
        (wins, fails)
    }

    fn script_device_7(bridge: &SimulatedBridge) {
        bridge.respond(
            "services",
            [json!(7)],
            Outcome::success(json!([
                {"handle": 100, "uuid": "180d"},
                {"handle": 101, "uuid": "180f"},
            ])),
        );
        bridge.respond(
            "characteristics",
            [json!(7), json!(100)],
            Outcome::success(json!([{"handle": 200, "uuid": "2a37"}])),
        );
        bridge.respond("characteristics", [json!(7), json!(101)], Outcome::success(json!([])));
        bridge.respond("descriptors", [json!(7), json!(200)], Outcome::success(json!([])));
    }

    fn shape(services: &[Service]) -> Vec<(i64, Vec<(i64, Vec<i64>)>)> {
        services
            .iter()
            .map(|service| {
                let characteristics = service
                    .characteristics
                    .iter()
                    .map(|c| (c.handle.0, c.descriptors.iter().map(|d| d.handle.0).collect()))
                    .collect();
                (service.handle.0, characteristics)
            })
            .collect()
    }

    #[test]
    fn join_counter_tracks_spawned_units() {
        let counter = JoinCounter::default();
        assert!(!counter.start(2));
        assert!(!counter.complete(3));
        assert!(!counter.complete(0));
        assert!(!counter.complete(0));
        assert!(!counter.complete(0));
        assert!(counter.complete(0));
        assert!(counter.start(0));
    }

    #[test]
    fn assembles_a_small_device() {
        let bridge = SimulatedBridge::immediate();
        script_device_7(&bridge);
        let ble = Ble::new(bridge.clone());

        let (wins, fails) = read(&ble, 7);

        assert!(fails.borrow().is_empty());
        let wins = wins.borrow();
        assert_eq!(wins.len(), 1);
        assert_eq!(shape(&wins[0]), vec![(100, vec![(200, vec![])]), (101, vec![])]);
        assert_eq!(bridge.count("descriptors"), 1);
    }

    #[test]
    fn no_services_succeeds_without_nested_queries() {
        let bridge = SimulatedBridge::immediate();
        bridge.respond("services", [json!(3)], Outcome::success(json!([])));
        let ble = Ble::new(bridge.clone());

        let (wins, fails) = read(&ble, 3);

        assert_eq!(*wins.borrow(), vec![Vec::<Service>::new()]);
        assert!(fails.borrow().is_empty());
        assert_eq!(bridge.invocations().len(), 1);
    }

    #[test]
    fn reports_a_characteristic_failure_once() {
        let bridge = SimulatedBridge::immediate();
        bridge.respond("services", [json!(7)], Outcome::success(json!([{"handle": 100, "uuid": "180d"}])));
        bridge.respond(
            "characteristics",
            [json!(7), json!(100)],
            Outcome::failure(json!("TIMEOUT")),
        );
        let ble = Ble::new(bridge);

        let (wins, fails) = read(&ble, 7);

        assert!(wins.borrow().is_empty());
        let fails = fails.borrow();
        assert_eq!(fails.len(), 1);
        assert_eq!(fails[0].get_ref(), Some(&json!("TIMEOUT")));
    }

    #[test]
    fn services_failure_is_reported() {
        let bridge = SimulatedBridge::immediate();
        bridge.respond("services", [json!(7)], Outcome::failure(json!("not connected")));
        let ble = Ble::new(bridge.clone());

        let (wins, fails) = read(&ble, 7);

        assert!(wins.borrow().is_empty());
        assert_eq!(fails.borrow()[0].to_string(), "not connected");
        assert_eq!(bridge.invocations().len(), 1);
    }

    #[test]
    fn empty_characteristic_list_arriving_last_completes() {
        let bridge = SimulatedBridge::manual();
        script_device_7(&bridge);
        let ble = Ble::new(bridge.clone());
        let (wins, fails) = read(&ble, 7);

        assert!(bridge.deliver_next()); // services
        assert!(bridge.deliver_next()); // characteristics of 100
        assert!(bridge.deliver_last()); // descriptors of 200
        assert!(wins.borrow().is_empty());
        assert!(bridge.deliver_next()); // empty characteristics of 101
        assert_eq!(bridge.pending(), 0);

        assert!(fails.borrow().is_empty());
        assert_eq!(shape(&wins.borrow()[0]), vec![(100, vec![(200, vec![])]), (101, vec![])]);
    }

    #[test]
    fn late_replies_after_a_failure_are_suppressed() {
        let bridge = SimulatedBridge::manual();
        bridge.respond(
            "services",
            [json!(7)],
            Outcome::success(json!([
                {"handle": 100, "uuid": "180d"},
                {"handle": 101, "uuid": "180f"},
            ])),
        );
        bridge.respond(
            "characteristics",
            [json!(7), json!(100)],
            Outcome::success(json!([{"handle": 200, "uuid": "2a37"}])),
        );
        bridge.respond(
            "characteristics",
            [json!(7), json!(101)],
            Outcome::failure(json!("GATT_ERROR")),
        );
        bridge.respond(
            "descriptors",
            [json!(7), json!(200)],
            Outcome::failure(json!("TIMEOUT")),
        );
        let ble = Ble::new(bridge.clone());
        let (wins, fails) = read(&ble, 7);

        bridge.deliver_next();
        assert!(bridge.deliver_last()); // characteristics of 101 fail first
        assert_eq!(bridge.deliver_all(), 2);

        assert!(wins.borrow().is_empty());
        let fails = fails.borrow();
        assert_eq!(fails.len(), 1);
        assert_eq!(fails[0].to_string(), "GATT_ERROR");
    }

    #[test]
    fn children_keep_their_request_positions() {
        let bridge = SimulatedBridge::manual();
        bridge.respond(
            "services",
            [json!(1)],
            Outcome::success(json!([
                {"handle": 10, "uuid": "1800"},
                {"handle": 11, "uuid": "1801"},
            ])),
        );
        bridge.respond(
            "characteristics",
            [json!(1), json!(10)],
            Outcome::success(json!([
                {"handle": 20, "uuid": "2a00"},
                {"handle": 21, "uuid": "2a01"},
            ])),
        );
        bridge.respond(
            "characteristics",
            [json!(1), json!(11)],
            Outcome::success(json!([{"handle": 22, "uuid": "2a05"}])),
        );
        for (ch, d) in [(20, 30), (21, 31), (22, 32)] {
            bridge.respond(
                "descriptors",
                [json!(1), json!(ch)],
                Outcome::success(json!([{"handle": d, "uuid": "2902"}])),
            );
        }
        let ble = Ble::new(bridge.clone());
        let (wins, _fails) = read(&ble, 1);

        // Release every reply newest first.
        while bridge.deliver_last() {}

        assert_eq!(
            shape(&wins.borrow()[0]),
            vec![
                (10, vec![(20, vec![30]), (21, vec![31])]),
                (11, vec![(22, vec![32])]),
            ]
        );
    }
}
