/*!
 * Host-side mirror of the device configuration.
 *
 * The store changes only when the device reports a value. Commands sent to
 * the device never touch it directly.
 */
use serde::Serialize;

use loralink_core::types::{DeviceState, StateField, WifiConnection, HTTP_WIFI_DISABLED};

use crate::protocol::{ConfigValue, InboundEvent, StatusValue};

/// Fields whose value changed while applying one event
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StateChange {
    fields: Vec<StateField>,
}

impl StateChange {
    /// Whether nothing changed
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// The changed fields, in the order they were written
    pub fn fields(&self) -> &[StateField] {
        &self.fields
    }

    /// Whether `field` changed
    pub fn contains(&self, field: StateField) -> bool {
        self.fields.contains(&field)
    }
}

/// Single source of truth for the mirrored [`DeviceState`]
#[derive(Debug, Clone)]
pub struct DeviceStateStore {
    state: DeviceState,
}

impl DeviceStateStore {
    /// Create a store seeded with `initial`
    pub fn new(initial: DeviceState) -> Self {
        Self { state: initial }
    }

    /// Borrow the current state
    pub fn state(&self) -> &DeviceState {
        &self.state
    }

    /// Copy of the current state
    pub fn snapshot(&self) -> DeviceState {
        self.state.clone()
    }

    /// Apply a classified line and report what changed.
    ///
    /// Free-text events and `post_en` leave the state untouched. A WiFi
    /// status other than connected also marks HTTP as disabled, and a later
    /// `http_status WiFi disabled` echo is ignored.
    pub fn apply(&mut self, event: &InboundEvent) -> StateChange {
        let mut change = StateChange::default();
        match event {
            InboundEvent::ConfigSync(value) => self.apply_config(value, &mut change),
            InboundEvent::StatusUpdate(StatusValue::Wifi(connection)) => {
                set(&mut self.state.wifi_connection, *connection, StateField::WifiConnection, &mut change);
                if *connection == WifiConnection::NotConnected {
                    set(
                        &mut self.state.http_status,
                        HTTP_WIFI_DISABLED.to_string(),
                        StateField::HttpStatus,
                        &mut change,
                    );
                }
            }
            InboundEvent::StatusUpdate(StatusValue::Http(text)) => {
                if text != HTTP_WIFI_DISABLED {
                    set(&mut self.state.http_status, text.clone(), StateField::HttpStatus, &mut change);
                }
            }
            InboundEvent::LoraActivity(_) | InboundEvent::RawLog(_) => {}
        }
        change
    }

    fn apply_config(&mut self, value: &ConfigValue, change: &mut StateChange) {
        let state = &mut self.state;
        match *value {
            ConfigValue::Gain(v) => set(&mut state.gain, v, StateField::Gain, change),
            ConfigValue::Frequency(v) => set(&mut state.frequency_mhz, v, StateField::Frequency, change),
            ConfigValue::SpreadingFactor(v) => {
                set(&mut state.spreading_factor, v, StateField::SpreadingFactor, change)
            }
            ConfigValue::Bandwidth(v) => set(&mut state.bandwidth, v, StateField::Bandwidth, change),
            ConfigValue::StatusEnabled(v) => {
                set(&mut state.status_enabled, v, StateField::StatusEnabled, change)
            }
            ConfigValue::StatusInterval(v) => {
                set(&mut state.status_interval, v, StateField::StatusInterval, change)
            }
            ConfigValue::WifiEnabled(v) => set(&mut state.wifi_enabled, v, StateField::WifiEnabled, change),
            ConfigValue::PostMode(v) => set(&mut state.post_mode, v, StateField::PostMode, change),
            ConfigValue::PostEnabled(_) => {}
        }
    }
}

fn set<T: PartialEq>(slot: &mut T, value: T, field: StateField, change: &mut StateChange) {
    if *slot != value {
        *slot = value;
        change.fields.push(field);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::classify;
    use loralink_core::types::{Bandwidth, PostMode, StatusInterval, HTTP_NO_DATA};

    fn store() -> DeviceStateStore {
        DeviceStateStore::new(DeviceState::default())
    }

    #[test]
    fn test_config_line_changes_one_field() {
        let mut store = store();
        let before = store.snapshot();

        let change = store.apply(&classify("gain 7"));
        assert_eq!(change.fields(), &[StateField::Gain]);

        let mut expected = before;
        expected.gain = 7;
        assert_eq!(store.snapshot(), expected);
    }

    #[test]
    fn test_every_config_field() {
        let mut store = store();
        for line in [
            "freq 869.525",
            "sf 9",
            "bw 125.00",
            "status 1",
            "interval 120",
            "wifi_en 0",
            "post_mode lora",
        ] {
            assert!(!store.apply(&classify(line)).is_empty(), "{}", line);
        }
        let state = store.state();
        assert_eq!(state.frequency_mhz, 869.525);
        assert_eq!(state.spreading_factor, 9);
        assert_eq!(state.bandwidth, Bandwidth::Khz125);
        assert!(state.status_enabled);
        assert_eq!(state.status_interval, StatusInterval::Secs120);
        assert!(!state.wifi_enabled);
        assert_eq!(state.post_mode, PostMode::OnReceive);
    }

    #[test]
    fn test_repeated_value_reports_no_change() {
        let mut store = store();
        assert!(store.apply(&classify("gain 20")).is_empty());
        assert!(store.apply(&classify("post_en 1")).is_empty());
        assert_eq!(store.snapshot(), DeviceState::default());
    }

    #[test]
    fn test_free_text_leaves_state_alone() {
        let mut store = store();
        assert!(store.apply(&classify("gain")).is_empty());
        assert!(store.apply(&classify("LoRa Received: <x>")).is_empty());
        assert_eq!(store.snapshot(), DeviceState::default());
    }

    #[test]
    fn test_wifi_down_disables_http() {
        let mut store = store();
        let change = store.apply(&classify("wifi_status 0"));
        assert!(change.contains(StateField::WifiConnection));
        assert!(change.contains(StateField::HttpStatus));
        assert_eq!(store.state().wifi_connection, WifiConnection::NotConnected);
        assert_eq!(store.state().http_status, HTTP_WIFI_DISABLED);
    }

    #[test]
    fn test_http_status_updates() {
        let mut store = store();
        store.apply(&classify("wifi_status 1"));
        assert_eq!(store.state().wifi_connection, WifiConnection::Connected);
        assert_eq!(store.state().http_status, HTTP_NO_DATA);

        store.apply(&classify("http_status 200 OK"));
        assert_eq!(store.state().http_status, "200 OK");

        assert!(store.apply(&classify("http_status WiFi disabled")).is_empty());
        assert_eq!(store.state().http_status, "200 OK");
    }
}
