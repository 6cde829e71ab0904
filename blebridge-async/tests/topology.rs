use blebridge_async::error::ErrorKind;
use blebridge_async::sim::{Outcome, SimulatedBridge};
use blebridge_async::{BleAsync, DeviceHandle, Service};
use serde_json::json;
use serial_executor::Executor;

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

fn handles(services: &[Service]) -> Vec<(i64, Vec<i64>)> {
    services
        .iter()
        .map(|service| {
            let characteristics = service.characteristics.iter().map(|c| c.handle.0).collect();
            (service.handle.0, characteristics)
        })
        .collect()
}

#[tokio::test]
async fn reads_the_service_tree() {
    let bridge = SimulatedBridge::immediate();
    script_device_7(&bridge);
    let ble = BleAsync::new(bridge);

    let services = ble.read_all_service_data(DeviceHandle(7)).await.unwrap();
    assert_eq!(handles(&services), vec![(100, vec![200]), (101, vec![])]);
    assert!(services[0].characteristics[0].descriptors.is_empty());
}

#[tokio::test]
async fn no_services_means_no_nested_queries() {
    let bridge = SimulatedBridge::immediate();
    bridge.respond("services", [json!(7)], Outcome::success(json!([])));
    let ble = BleAsync::new(bridge.clone());

    assert!(ble.read_all_service_data(DeviceHandle(7)).await.unwrap().is_empty());
    assert_eq!(bridge.invocations().len(), 1);
}

#[tokio::test]
async fn a_characteristic_timeout_fails_the_read() {
    let bridge = SimulatedBridge::immediate();
    bridge.respond("services", [json!(7)], Outcome::success(json!([{"handle": 100, "uuid": "180d"}])));
    bridge.respond(
        "characteristics",
        [json!(7), json!(100)],
        Outcome::failure("TIMEOUT"),
    );
    let ble = BleAsync::new(bridge);

    let error = ble.read_all_service_data(DeviceHandle(7)).await.unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Native);
    assert_eq!(error.to_string(), "TIMEOUT");
}

#[test]
fn queries_run_concurrently_on_a_serial_executor() {
    let executor = Executor::new();
    let bridge = SimulatedBridge::queued(&executor);
    script_device_7(&bridge);
    let ble = BleAsync::new(bridge.clone());

    let services = executor
        .run_until(async move { ble.read_all_service_data(DeviceHandle(7)).await })
        .expect("read stalled")
        .unwrap();

    assert_eq!(handles(&services), vec![(100, vec![200]), (101, vec![])]);
    let actions: Vec<String> = bridge.invocations().into_iter().map(|call| call.action).collect();
    assert_eq!(
        actions,
        ["services", "characteristics", "characteristics", "descriptors"]
    );
}

#[test]
fn only_the_first_failure_is_returned() {
    let executor = Executor::new();
    let bridge = SimulatedBridge::queued(&executor);
    bridge.respond(
        "services",
        [json!(7)],
        Outcome::success(json!([
            {"handle": 100, "uuid": "180d"},
            {"handle": 101, "uuid": "180f"},
        ])),
    );
    bridge.respond("characteristics", [json!(7), json!(100)], Outcome::failure("GATT_ERROR"));
    bridge.respond("characteristics", [json!(7), json!(101)], Outcome::failure("TIMEOUT"));
    let ble = BleAsync::new(bridge.clone());

    let result = executor.run_until(async move { ble.read_all_service_data(DeviceHandle(7)).await });
    let error = result.expect("read stalled").unwrap_err();
    assert_eq!(error.to_string(), "GATT_ERROR");

    // The abandoned query still gets its reply, which goes nowhere.
    executor.run_until_idle();
    assert!(executor.is_idle());
    assert_eq!(bridge.count("characteristics"), 2);
}
