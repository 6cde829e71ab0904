use std::error::Error;

use blebridge_async::sim::{Outcome, SimulatedBridge};
use blebridge_async::{BleAsync, codec};
use futures_lite::StreamExt;
use serde_json::json;
use serial_executor::Executor;
use tracing::info;
use tracing::metadata::LevelFilter;

fn simulated_heart_rate_monitor(bridge: &SimulatedBridge) {
    bridge.respond(
        "startScan",
        [],
        Outcome::success(json!({
            "address": "C0:FF:EE:00:00:01",
            "rssi": -58,
            "scanRecord": "AgEGBAlIUk0DAw0Y",
        })),
    );
    bridge.respond_many(
        "connect",
        [json!("C0:FF:EE:00:00:01")],
        vec![
            Outcome::success(json!({"deviceHandle": 1, "state": 1})),
            Outcome::success(json!({"deviceHandle": 1, "state": 2})),
        ],
    );
    bridge.respond(
        "services",
        [json!(1)],
        Outcome::success(json!([
            {"handle": 10, "uuid": "1800"},
            {"handle": 11, "uuid": "180d"},
        ])),
    );
    bridge.respond(
        "characteristics",
        [json!(1), json!(10)],
        Outcome::success(json!([{"handle": 20, "uuid": "2a00", "properties": 2}])),
    );
    bridge.respond(
        "characteristics",
        [json!(1), json!(11)],
        Outcome::success(json!([{"handle": 21, "uuid": "2a37", "properties": 16}])),
    );
    bridge.respond("descriptors", [json!(1), json!(20)], Outcome::success(json!([])));
    bridge.respond(
        "descriptors",
        [json!(1), json!(21)],
        Outcome::success(json!([{"handle": 30, "uuid": "2902"}])),
    );
    bridge.respond("readCharacteristic", [json!(1), json!(20)], Outcome::success("SFJN"));
}

fn main() -> Result<(), Box<dyn Error>> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .init();

    let executor = Executor::new();
    let bridge = SimulatedBridge::queued(&executor);
    simulated_heart_rate_monitor(&bridge);
    let ble = BleAsync::new(bridge);

    let task = async move {
        info!("starting scan");
        let mut scan = ble.scan();
        let Some(found) = scan.next().await else {
            return Err("scan ended".into());
        };
        let found = found?;
        drop(scan);

        let name = found
            .advertisement_data()
            .and_then(|data| data.local_name)
            .unwrap_or_else(|| String::from("(unknown)"));
        info!("found {name} at {} ({}dBm)", found.address, found.rssi);

        let device = ble.connect(&found.address).await?;
        for service in device.read_all_service_data().await? {
            info!("service {} ({:?})", service.uuid, service.bluetooth_uuid());
            for characteristic in &service.characteristics {
                info!(
                    "  characteristic {} {:?}, {} descriptor(s)",
                    characteristic.uuid,
                    characteristic.properties,
                    characteristic.descriptors.len()
                );
                if let Some(cccd) = characteristic.client_configuration() {
                    info!("    notifications configured through descriptor {}", cccd.handle);
                }
            }
        }

        let device_name = device.read_characteristic(20.into()).await?;
        info!("device name: {}", codec::bytes_to_text(&device_name));
        device.close();
        Ok::<_, Box<dyn Error>>(())
    };

    executor
        .run_until(task)
        .ok_or("the simulated bridge stopped replying")?
}
