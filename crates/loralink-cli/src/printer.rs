/*!
 * Terminal event sink.
 */
use std::io::Write;

use serde_json::json;

use loralink_core::types::{DeviceState, StateField};
use loralink_devices::StateChange;
use loralink_engine::{ConnectionPhase, EventSink, LogChannel, LogLine};

/// Render a single field of `state` as `name=value`
pub fn describe(state: &DeviceState, field: StateField) -> String {
    match field {
        StateField::Gain => format!("gain={} dBm", state.gain),
        StateField::Frequency => format!("freq={} MHz", state.frequency_mhz),
        StateField::SpreadingFactor => format!("sf={}", state.spreading_factor),
        StateField::Bandwidth => format!("bw={} kHz", state.bandwidth),
        StateField::StatusEnabled => format!("status={}", on_off(state.status_enabled)),
        StateField::StatusInterval => format!("interval={}s", state.status_interval),
        StateField::WifiEnabled => format!("wifi={}", on_off(state.wifi_enabled)),
        StateField::PostMode => format!("post={}", state.post_mode),
        StateField::WifiConnection => format!("wifi_link={}", state.wifi_connection),
        StateField::HttpStatus => format!("http={}", state.http_status),
    }
}

fn on_off(value: bool) -> &'static str {
    if value {
        "on"
    } else {
        "off"
    }
}

/// Every field of `state`, one per line
pub fn describe_all(state: &DeviceState) -> String {
    [
        StateField::Gain,
        StateField::Frequency,
        StateField::SpreadingFactor,
        StateField::Bandwidth,
        StateField::StatusEnabled,
        StateField::StatusInterval,
        StateField::WifiEnabled,
        StateField::PostMode,
        StateField::WifiConnection,
        StateField::HttpStatus,
    ]
    .iter()
    .map(|f| describe(state, *f))
    .collect::<Vec<_>>()
    .join("\n")
}

/// Prints events as text or as JSON lines
#[derive(Debug)]
pub struct TerminalSink<W: Write + Send> {
    out: W,
    json: bool,
    show_debug: bool,
}

impl<W: Write + Send> TerminalSink<W> {
    /// Create a sink writing to `out`
    pub fn new(out: W, json: bool, show_debug: bool) -> Self {
        Self {
            out,
            json,
            show_debug,
        }
    }

    /// Print a line that is not an engine event
    pub fn say(&mut self, text: &str) {
        if self.json {
            self.emit(json!({ "type": "message", "text": text }).to_string());
        } else {
            self.emit(text.to_string());
        }
    }

    fn emit(&mut self, line: String) {
        // stdout going away is not worth stopping the monitor for
        let _ = writeln!(self.out, "{}", line);
        let _ = self.out.flush();
    }

    /// Consume the sink and return its writer
    pub fn into_inner(self) -> W {
        self.out
    }
}

impl<W: Write + Send> EventSink for TerminalSink<W> {
    fn on_log(&mut self, line: &LogLine) {
        if line.channel == LogChannel::Debug && !self.show_debug {
            return;
        }
        let rendered = if self.json {
            json!({ "type": "log", "line": line }).to_string()
        } else if line.channel == LogChannel::Debug {
            format!("{} (debug)", line.formatted())
        } else {
            line.formatted()
        };
        self.emit(rendered);
    }

    fn on_state(&mut self, state: &DeviceState, change: &StateChange) {
        if change.is_empty() {
            return;
        }
        let rendered = if self.json {
            json!({ "type": "state", "changed": change.fields(), "state": state }).to_string()
        } else {
            let parts: Vec<String> = change.fields().iter().map(|f| describe(state, *f)).collect();
            format!("* {}", parts.join(", "))
        };
        self.emit(rendered);
    }

    fn on_phase(&mut self, phase: ConnectionPhase) {
        let rendered = if self.json {
            json!({ "type": "phase", "phase": phase }).to_string()
        } else {
            format!("-- {}", phase)
        };
        self.emit(rendered);
    }

    fn on_error(&mut self, message: &str) {
        let rendered = if self.json {
            json!({ "type": "error", "message": message }).to_string()
        } else {
            format!("!! {}", message)
        };
        self.emit(rendered);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use loralink_devices::protocol::classify;
    use loralink_devices::DeviceStateStore;

    fn output(sink: TerminalSink<Vec<u8>>) -> String {
        String::from_utf8(sink.into_inner()).unwrap()
    }

    #[test]
    fn test_text_output() {
        let mut store = DeviceStateStore::new(DeviceState::default());
        let change = store.apply(&classify("gain 7"));

        let mut sink = TerminalSink::new(Vec::new(), false, false);
        sink.on_state(store.state(), &change);
        sink.on_phase(ConnectionPhase::Ready);
        sink.on_log(&LogLine::new("RX: WiFi up", LogChannel::Debug, false));
        sink.on_error("Connection lost: read failed");

        assert_eq!(
            output(sink),
            "* gain=7 dBm\n-- ready\n!! Connection lost: read failed\n"
        );
    }

    #[test]
    fn test_json_output() {
        let mut sink = TerminalSink::new(Vec::new(), true, true);
        sink.on_phase(ConnectionPhase::Syncing);
        sink.on_log(&LogLine::new("Tx done: 40 ms", LogChannel::Main, true));

        let text = output(sink);
        let lines: Vec<serde_json::Value> = text
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["phase"], "Syncing");
        assert_eq!(lines[1]["line"]["text"], "Tx done: 40 ms");
        assert_eq!(lines[1]["line"]["activity"], true);
    }

    #[test]
    fn test_unchanged_state_is_quiet() {
        let mut sink = TerminalSink::new(Vec::new(), false, false);
        sink.on_state(&DeviceState::default(), &StateChange::default());
        assert!(output(sink).is_empty());
    }

    #[test]
    fn test_describe_all_lists_every_field() {
        let text = describe_all(&DeviceState::default());
        assert_eq!(text.lines().count(), 10);
        assert!(text.contains("bw=250 kHz"));
        assert!(text.contains("wifi_link=OFF"));
    }
}
