/// Settings shared by every command issued through a [`Ble`](crate::Ble) instance.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Config {
    /// Plugin service name passed to [`Bridge::invoke`](crate::Bridge::invoke).
    pub service: String,
    /// Capacity of the broadcast channels that fan out subscription events.
    pub event_capacity: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: String::from("BLE"),
            event_capacity: 16,
        }
    }
}

impl Config {
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = service.into();
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_target_the_ble_plugin() {
        let config = Config::default();
        assert_eq!(config.service, "BLE");
        assert_eq!(config.event_capacity, 16);
    }

    #[test]
    fn event_capacity_is_never_zero() {
        let config = Config::default().with_service("BLE2").with_event_capacity(0);
        assert_eq!(config.service, "BLE2");
        assert_eq!(config.event_capacity, 1);
    }
}
