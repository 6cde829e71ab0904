//! The peripheral advertiser.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ble::{Ble, unit};
use crate::error::{Error, ErrorKind};

/// The longest advertising time limit the platform accepts.
pub const MAX_ADVERTISE_TIMEOUT_MILLIS: u32 = 180_000;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdvertiseMode {
    #[default]
    #[serde(rename = "ADVERTISE_MODE_LOW_POWER")]
    LowPower,
    #[serde(rename = "ADVERTISE_MODE_BALANCED")]
    Balanced,
    #[serde(rename = "ADVERTISE_MODE_LOW_LATENCY")]
    LowLatency,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AdvertiseTxPower {
    #[serde(rename = "ADVERTISE_TX_POWER_ULTRA_LOW")]
    UltraLow,
    #[serde(rename = "ADVERTISE_TX_POWER_LOW")]
    Low,
    #[default]
    #[serde(rename = "ADVERTISE_TX_POWER_MEDIUM")]
    Medium,
    #[serde(rename = "ADVERTISE_TX_POWER_HIGH")]
    High,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertiseSettings {
    #[serde(default)]
    pub advertise_mode: AdvertiseMode,
    /// Whether to advertise as connectable. When unset the platform advertises as connectable
    /// only while a GATT server is running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connectable: Option<bool>,
    /// Advertising time limit; zero disables the limit. At most
    /// [`MAX_ADVERTISE_TIMEOUT_MILLIS`].
    #[serde(default)]
    pub timeout_millis: u32,
    #[serde(default)]
    pub tx_power_level: AdvertiseTxPower,
    pub broadcast_data: AdvertiseData,
    /// Sent in reply to active scans when set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scan_response_data: Option<AdvertiseData>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdvertiseData {
    #[serde(default)]
    pub include_device_name: bool,
    #[serde(default)]
    pub include_tx_power_level: bool,
    #[serde(rename = "serviceUUIDs", default, skip_serializing_if = "Vec::is_empty")]
    pub service_uuids: Vec<Uuid>,
    #[serde(
        default,
        with = "crate::util::base64_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub service_data: BTreeMap<Uuid, Vec<u8>>,
    /// Keyed by company identifier.
    #[serde(
        default,
        with = "crate::util::base64_map",
        skip_serializing_if = "BTreeMap::is_empty"
    )]
    pub manufacturer_data: BTreeMap<u16, Vec<u8>>,
}

impl Ble {
    /// Starts advertising. Fails if advertising is already running.
    pub fn start_advertise(
        &self,
        settings: &AdvertiseSettings,
        win: impl FnOnce() + 'static,
        fail: impl FnOnce(Error) + 'static,
    ) {
        if settings.timeout_millis > MAX_ADVERTISE_TIMEOUT_MILLIS {
            return fail(Error::with_message(
                ErrorKind::InvalidArgument,
                format!(
                    "advertising timeout {} ms exceeds {MAX_ADVERTISE_TIMEOUT_MILLIS} ms",
                    settings.timeout_millis
                ),
            ));
        }
        let settings = match serde_json::to_value(settings) {
            Ok(settings) => settings,
            Err(error) => {
                return fail(Error::with_message(ErrorKind::InvalidArgument, error.to_string()));
            }
        };
        self.request("startAdvertise", vec![settings], unit, |()| win(), fail);
    }

    pub fn stop_advertise(&self, win: impl FnOnce() + 'static, fail: impl FnOnce(Error) + 'static) {
        self.request("stopAdvertise", Vec::new(), unit, |()| win(), fail);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use serde_json::json;

    use super::*;
    use crate::sim::{Outcome, SimulatedBridge};
    use crate::util::parse_uuid;

    fn settings() -> AdvertiseSettings {
        let battery = parse_uuid("180f").unwrap();
        AdvertiseSettings {
            advertise_mode: AdvertiseMode::LowLatency,
            connectable: Some(true),
            timeout_millis: 30_000,
            broadcast_data: AdvertiseData {
                include_device_name: true,
                service_uuids: vec![battery],
                service_data: BTreeMap::from([(battery, vec![0x64])]),
                manufacturer_data: BTreeMap::from([(0x0059, vec![1, 2])]),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn serializes_advertise_settings() {
        assert_eq!(
            serde_json::to_value(settings()).unwrap(),
            json!({
                "advertiseMode": "ADVERTISE_MODE_LOW_LATENCY",
                "connectable": true,
                "timeoutMillis": 30000,
                "txPowerLevel": "ADVERTISE_TX_POWER_MEDIUM",
                "broadcastData": {
                    "includeDeviceName": true,
                    "includeTxPowerLevel": false,
                    "serviceUUIDs": ["0000180f-0000-1000-8000-00805f9b34fb"],
                    "serviceData": {"0000180f-0000-1000-8000-00805f9b34fb": "ZA=="},
                    "manufacturerData": {"89": "AQI="},
                },
            })
        );
    }

    #[test]
    fn starts_advertising() {
        let bridge = SimulatedBridge::immediate();
        let expected = serde_json::to_value(settings()).unwrap();
        bridge.respond("startAdvertise", [expected], Outcome::success(json!(null)));
        let ble = Ble::new(bridge.clone());

        let started = Rc::new(RefCell::new(false));
        let flag = started.clone();
        ble.start_advertise(&settings(), move || *flag.borrow_mut() = true, |e| panic!("{e}"));
        assert!(*started.borrow());
    }

    #[test]
    fn rejects_long_timeouts_before_dispatch() {
        let bridge = SimulatedBridge::immediate();
        let ble = Ble::new(bridge.clone());
        let mut settings = settings();
        settings.timeout_millis = MAX_ADVERTISE_TIMEOUT_MILLIS + 1;

        let errors = Rc::new(RefCell::new(Vec::new()));
        let sink = errors.clone();
        ble.start_advertise(&settings, || panic!("started"), move |e| sink.borrow_mut().push(e));

        assert_eq!(errors.borrow()[0].kind(), ErrorKind::InvalidArgument);
        assert!(bridge.invocations().is_empty());
    }

    #[test]
    fn the_maximum_timeout_is_accepted() {
        let bridge = SimulatedBridge::immediate();
        let ble = Ble::new(bridge.clone());
        let mut settings = settings();
        settings.timeout_millis = MAX_ADVERTISE_TIMEOUT_MILLIS;

        ble.start_advertise(&settings, || {}, |_| {});
        assert_eq!(bridge.count("startAdvertise"), 1);
    }
}
