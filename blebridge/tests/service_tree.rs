use std::cell::RefCell;
use std::rc::Rc;

use blebridge::sim::{Outcome, SimulatedBridge};
use blebridge::{Ble, DeviceHandle, Error, Service};
use proptest::prelude::*;
use serde_json::{Value, json};
use serial_executor::Executor;
use tracing_subscriber::EnvFilter;

const DEVICE: i64 = 9;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Descriptor counts per characteristic, per service.
type Shape = Vec<Vec<usize>>;

fn service_handle(service: usize) -> i64 {
    100 + service as i64
}

fn characteristic_handle(service: usize, characteristic: usize) -> i64 {
    1000 * (service as i64 + 1) + characteristic as i64
}

fn descriptor_handle(characteristic: i64, descriptor: usize) -> i64 {
    characteristic * 10 + descriptor as i64
}

fn script(bridge: &SimulatedBridge, shape: &Shape) {
    let services: Vec<Value> = (0..shape.len())
        .map(|s| json!({"handle": service_handle(s), "uuid": format!("{:04x}", 0x1800 + s)}))
        .collect();
    bridge.respond("services", [json!(DEVICE)], Outcome::success(Value::from(services)));

    for (s, characteristics) in shape.iter().enumerate() {
        let listed: Vec<Value> = (0..characteristics.len())
            .map(|c| json!({"handle": characteristic_handle(s, c), "uuid": "2a37", "properties": 16}))
            .collect();
        bridge.respond(
            "characteristics",
            [json!(DEVICE), json!(service_handle(s))],
            Outcome::success(Value::from(listed)),
        );

        for (c, &descriptors) in characteristics.iter().enumerate() {
            let handle = characteristic_handle(s, c);
            let listed: Vec<Value> = (0..descriptors)
                .map(|d| json!({"handle": descriptor_handle(handle, d), "uuid": "2902"}))
                .collect();
            bridge.respond(
                "descriptors",
                [json!(DEVICE), json!(handle)],
                Outcome::success(Value::from(listed)),
            );
        }
    }
}

struct Outcomes {
    wins: RefCell<Vec<Vec<Service>>>,
    fails: RefCell<Vec<Error>>,
}

fn read_all(ble: &Ble) -> Rc<Outcomes> {
    let outcomes = Rc::new(Outcomes {
        wins: RefCell::new(Vec::new()),
        fails: RefCell::new(Vec::new()),
    });
    let (on_win, on_fail) = (outcomes.clone(), outcomes.clone());
    ble.read_all_service_data(
        DeviceHandle(DEVICE),
        move |services| on_win.wins.borrow_mut().push(services),
        move |error| on_fail.fails.borrow_mut().push(error),
    );
    outcomes
}

fn assert_tree(services: &[Service], shape: &Shape) {
    assert_eq!(services.len(), shape.len());
    for (s, (service, characteristics)) in services.iter().zip(shape).enumerate() {
        assert_eq!(service.handle.0, service_handle(s));
        assert_eq!(service.characteristics.len(), characteristics.len());
        for (c, (characteristic, &descriptors)) in
            service.characteristics.iter().zip(characteristics).enumerate()
        {
            let handle = characteristic_handle(s, c);
            assert_eq!(characteristic.handle.0, handle);
            let found: Vec<i64> = characteristic.descriptors.iter().map(|d| d.handle.0).collect();
            let expected: Vec<i64> = (0..descriptors).map(|d| descriptor_handle(handle, d)).collect();
            assert_eq!(found, expected);
        }
    }
}

#[test]
fn assembles_a_large_tree_with_queued_replies() {
    init_tracing();
    let shape: Shape = (0..12)
        .map(|s| (0..s % 5).map(|c| (s + c) % 4).collect())
        .collect();

    let executor = Executor::new();
    let bridge = SimulatedBridge::queued(&executor);
    script(&bridge, &shape);
    let ble = Ble::new(bridge.clone());

    let outcomes = read_all(&ble);
    assert!(outcomes.wins.borrow().is_empty());
    executor.run_until_idle();

    assert!(outcomes.fails.borrow().is_empty());
    let wins = outcomes.wins.borrow();
    assert_eq!(wins.len(), 1);
    assert_tree(&wins[0], &shape);

    let characteristics: usize = shape.iter().map(Vec::len).sum();
    assert_eq!(bridge.count("characteristics"), shape.len());
    assert_eq!(bridge.count("descriptors"), characteristics);
}

#[test]
fn a_nested_failure_is_reported_once_with_queued_replies() {
    init_tracing();
    let shape: Shape = vec![vec![1, 2], vec![0], vec![3, 0, 1]];

    let executor = Executor::new();
    let bridge = SimulatedBridge::queued(&executor);
    // Scripted ahead of the tree so these replies are consumed first.
    bridge.respond(
        "descriptors",
        [json!(DEVICE), json!(characteristic_handle(0, 1))],
        Outcome::failure(json!("GATT_INSUFFICIENT_AUTHENTICATION")),
    );
    bridge.respond(
        "descriptors",
        [json!(DEVICE), json!(characteristic_handle(2, 0))],
        Outcome::failure(json!("TIMEOUT")),
    );
    script(&bridge, &shape);
    let ble = Ble::new(bridge.clone());

    let outcomes = read_all(&ble);
    executor.run_until_idle();

    assert!(outcomes.wins.borrow().is_empty());
    let fails = outcomes.fails.borrow();
    assert_eq!(fails.len(), 1);
    assert_eq!(fails[0].to_string(), "GATT_INSUFFICIENT_AUTHENTICATION");
    assert_eq!(bridge.count("descriptors"), 6);
}

#[test]
fn repeated_reads_return_fresh_trees() {
    let shape: Shape = vec![vec![1]];
    let bridge = SimulatedBridge::immediate();
    script(&bridge, &shape);
    let ble = Ble::new(bridge.clone());

    let first = read_all(&ble);
    let second = read_all(&ble);

    assert_eq!(*first.wins.borrow(), *second.wins.borrow());
    assert_eq!(bridge.count("services"), 2);
}

proptest! {
    #[test]
    fn every_child_lands_under_its_parent(
        shape in prop::collection::vec(prop::collection::vec(0usize..4, 0..5), 0..6),
    ) {
        let executor = Executor::new();
        let bridge = SimulatedBridge::queued(&executor);
        script(&bridge, &shape);
        let ble = Ble::new(bridge.clone());

        let outcomes = read_all(&ble);
        executor.run_until_idle();

        prop_assert!(outcomes.fails.borrow().is_empty());
        let wins = outcomes.wins.borrow();
        prop_assert_eq!(wins.len(), 1);
        assert_tree(&wins[0], &shape);
        if shape.is_empty() {
            prop_assert_eq!(bridge.invocations().len(), 1);
        }
    }
}
