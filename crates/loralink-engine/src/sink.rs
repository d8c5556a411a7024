/*!
 * Presentation contract.
 *
 * An [`EventSink`] is whatever shows the device to a user. The [`EventPump`]
 * sits between the engine's event channel and the sink: it owns the
 * [`DeviceStateStore`], applies each inbound line to it and forwards the
 * result, strictly in arrival order.
 */
use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;
use tracing::trace;

use loralink_core::types::DeviceState;
use loralink_devices::protocol::{
    is_debug_related, Command, ConfigValue, InboundEvent, STATUS_QUERIES,
};
use loralink_devices::{DeviceStateStore, StateChange};

use crate::event::{ClassifiedLine, EngineEvent};
use crate::lifecycle::ConnectionPhase;

/// Which log a line belongs in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LogChannel {
    /// The main log
    Main,
    /// Device housekeeping
    Debug,
}

/// One line for a log view
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LogLine {
    /// When the line was produced
    pub timestamp: DateTime<Local>,
    /// Text to show
    pub text: String,
    /// Target log
    pub channel: LogChannel,
    /// Whether the line reports radio traffic
    pub activity: bool,
}

impl LogLine {
    /// Create a line stamped with the current local time
    pub fn new<S: Into<String>>(text: S, channel: LogChannel, activity: bool) -> Self {
        Self {
            timestamp: Local::now(),
            text: text.into(),
            channel,
            activity,
        }
    }

    /// The line as `[HH:MM:SS] text`
    pub fn formatted(&self) -> String {
        format!("[{}] {}", self.timestamp.format("%H:%M:%S"), self.text)
    }
}

/// Receives everything the user should see
pub trait EventSink: Send {
    /// A log line
    fn on_log(&mut self, line: &LogLine);

    /// The device reported a value; `change` is empty when nothing moved
    fn on_state(&mut self, state: &DeviceState, change: &StateChange);

    /// The connection changed phase
    fn on_phase(&mut self, phase: ConnectionPhase);

    /// Something failed
    fn on_error(&mut self, message: &str);
}

/// Applies engine events to a store and forwards them to a sink
#[derive(Debug)]
pub struct EventPump<S: EventSink> {
    store: DeviceStateStore,
    sink: S,
    receiver: mpsc::UnboundedReceiver<EngineEvent>,
    short_log: bool,
}

impl<S: EventSink> EventPump<S> {
    /// Create a pump seeded with `initial` state
    pub fn new(
        initial: DeviceState,
        sink: S,
        receiver: mpsc::UnboundedReceiver<EngineEvent>,
    ) -> Self {
        Self {
            store: DeviceStateStore::new(initial),
            sink,
            receiver,
            short_log: false,
        }
    }

    /// Only show radio activity in the main log
    pub fn with_short_log(mut self, short_log: bool) -> Self {
        self.short_log = short_log;
        self
    }

    /// Toggle the short log filter
    pub fn set_short_log(&mut self, short_log: bool) {
        self.short_log = short_log;
    }

    /// The mirrored device state
    pub fn store(&self) -> &DeviceStateStore {
        &self.store
    }

    /// The sink
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Mutable access to the sink
    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    /// Wait for the next event and handle it.
    ///
    /// Returns false once the engine is gone. Safe to use in `select!`.
    pub async fn step(&mut self) -> bool {
        match self.receiver.recv().await {
            Some(event) => {
                self.handle(event);
                true
            }
            None => false,
        }
    }

    /// Handle every event already queued and return how many there were
    pub fn drain(&mut self) -> usize {
        let mut handled = 0;
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    self.handle(event);
                    handled += 1;
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => return handled,
            }
        }
    }

    /// Run until the engine is dropped, then hand back the store and sink
    pub async fn run(mut self) -> (DeviceStateStore, S) {
        while self.step().await {}
        (self.store, self.sink)
    }

    /// Handle one event
    pub fn handle(&mut self, event: EngineEvent) {
        trace!("Handling {:?}", event);
        match event {
            EngineEvent::Inbound(line) => self.handle_inbound(line),
            EngineEvent::Outbound(line) => {
                let channel = if is_status_query(&line) {
                    LogChannel::Debug
                } else {
                    LogChannel::Main
                };
                self.log(LogLine::new(format!("TX: {}", line), channel, false))
            }
            EngineEvent::Phase(phase) => self.sink.on_phase(phase),
            EngineEvent::Notice(text) => self.sink.on_log(&LogLine::new(text, LogChannel::Main, false)),
            EngineEvent::ConnectionLost(reason) => {
                self.sink.on_error(&format!("Connection lost: {}", reason))
            }
        }
    }

    fn handle_inbound(&mut self, line: ClassifiedLine) {
        match &line.event {
            InboundEvent::ConfigSync(ConfigValue::PostEnabled(_)) => {
                self.log(LogLine::new(line.line, LogChannel::Debug, false));
            }
            InboundEvent::ConfigSync(_) | InboundEvent::StatusUpdate(_) => {
                let change = self.store.apply(&line.event);
                self.sink.on_state(self.store.state(), &change);
            }
            InboundEvent::LoraActivity(text) => {
                self.log(LogLine::new(text.clone(), LogChannel::Main, true));
            }
            InboundEvent::RawLog(text) => {
                let channel = if is_debug_related(text) {
                    LogChannel::Debug
                } else {
                    LogChannel::Main
                };
                self.log(LogLine::new(format!("RX: {}", text), channel, false));
            }
        }
    }

    fn log(&mut self, line: LogLine) {
        if self.short_log && line.channel == LogChannel::Main && !line.activity {
            return;
        }
        self.sink.on_log(&line);
    }
}

/// Status polls run in the background and stay out of the main log
fn is_status_query(line: &str) -> bool {
    STATUS_QUERIES
        .iter()
        .any(|query| Command::Get(*query).to_line() == line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use loralink_core::types::{StateField, WifiConnection, HTTP_WIFI_DISABLED};

    #[derive(Debug, Default)]
    struct Recorder {
        logs: Vec<LogLine>,
        states: Vec<(DeviceState, StateChange)>,
        phases: Vec<ConnectionPhase>,
        errors: Vec<String>,
    }

    impl EventSink for Recorder {
        fn on_log(&mut self, line: &LogLine) {
            self.logs.push(line.clone());
        }

        fn on_state(&mut self, state: &DeviceState, change: &StateChange) {
            self.states.push((state.clone(), change.clone()));
        }

        fn on_phase(&mut self, phase: ConnectionPhase) {
            self.phases.push(phase);
        }

        fn on_error(&mut self, message: &str) {
            self.errors.push(message.to_string());
        }
    }

    fn pump() -> (EventPump<Recorder>, mpsc::UnboundedSender<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (EventPump::new(DeviceState::default(), Recorder::default(), rx), tx)
    }

    fn inbound(line: &str) -> EngineEvent {
        EngineEvent::Inbound(ClassifiedLine::new(line))
    }

    #[test]
    fn test_config_lines_update_state() {
        let (mut pump, tx) = pump();
        tx.send(inbound("gain 7")).unwrap();
        tx.send(inbound("sf 9")).unwrap();
        assert_eq!(pump.drain(), 2);

        let sink = pump.sink();
        assert_eq!(sink.states.len(), 2);
        assert_eq!(sink.states[0].1.fields(), &[StateField::Gain]);
        assert_eq!(sink.states[1].0.spreading_factor, 9);
        assert!(sink.logs.is_empty());
        assert_eq!(pump.store().state().gain, 7);
    }

    #[test]
    fn test_each_line_reaches_the_sink_once() {
        let (mut pump, tx) = pump();
        for line in ["wifi_status 0", "LoRa Received: <hi>", "Booting...", "gain"] {
            tx.send(inbound(line)).unwrap();
        }
        pump.drain();

        let sink = pump.sink();
        assert_eq!(sink.states.len(), 1);
        assert_eq!(sink.states[0].0.wifi_connection, WifiConnection::NotConnected);
        assert_eq!(sink.states[0].0.http_status, HTTP_WIFI_DISABLED);

        let texts: Vec<&str> = sink.logs.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["LoRa Received: <hi>", "RX: Booting...", "RX: gain"]);
        assert!(sink.logs[0].activity);
    }

    #[test]
    fn test_debug_routing() {
        let (mut pump, tx) = pump();
        tx.send(inbound("WiFi connecting to lab")).unwrap();
        tx.send(inbound("post_en 1")).unwrap();
        pump.drain();

        let sink = pump.sink();
        assert!(sink.logs.iter().all(|l| l.channel == LogChannel::Debug));
        assert!(sink.states.is_empty());
    }

    #[test]
    fn test_status_polls_are_logged_to_debug() {
        let (mut pump, tx) = pump();
        tx.send(EngineEvent::Outbound("get wifi_status".into())).unwrap();
        tx.send(EngineEvent::Outbound("get http_status".into())).unwrap();
        tx.send(EngineEvent::Outbound("get wifi_en".into())).unwrap();
        pump.drain();

        let routed: Vec<(&str, LogChannel)> = pump
            .sink()
            .logs
            .iter()
            .map(|l| (l.text.as_str(), l.channel))
            .collect();
        assert_eq!(
            routed,
            vec![
                ("TX: get wifi_status", LogChannel::Debug),
                ("TX: get http_status", LogChannel::Debug),
                ("TX: get wifi_en", LogChannel::Main),
            ]
        );
    }

    #[test]
    fn test_short_log_keeps_activity_only() {
        let (pump, tx) = pump();
        let mut pump = pump.with_short_log(true);
        tx.send(inbound("Booting...")).unwrap();
        tx.send(EngineEvent::Outbound("get gain".into())).unwrap();
        tx.send(inbound("Tx done: 41 ms")).unwrap();
        tx.send(inbound("SPIFFS mounted")).unwrap();
        pump.drain();

        let texts: Vec<&str> = pump.sink().logs.iter().map(|l| l.text.as_str()).collect();
        assert_eq!(texts, vec!["Tx done: 41 ms", "RX: SPIFFS mounted"]);

        pump.set_short_log(false);
        tx.send(EngineEvent::Outbound("get sf".into())).unwrap();
        pump.drain();
        assert_eq!(pump.sink().logs.last().unwrap().text, "TX: get sf");
    }

    #[test]
    fn test_phase_notice_and_errors() {
        let (mut pump, tx) = pump();
        tx.send(EngineEvent::Phase(ConnectionPhase::Connecting)).unwrap();
        tx.send(EngineEvent::Notice("Serial port flushed, device ready".into())).unwrap();
        tx.send(EngineEvent::ConnectionLost("read failed".into())).unwrap();
        pump.drain();

        let sink = pump.sink();
        assert_eq!(sink.phases, vec![ConnectionPhase::Connecting]);
        assert_eq!(sink.logs[0].text, "Serial port flushed, device ready");
        assert_eq!(sink.errors, vec!["Connection lost: read failed"]);
    }

    #[tokio::test]
    async fn test_run_ends_with_the_engine() {
        let (pump, tx) = pump();
        tx.send(inbound("freq 869.525")).unwrap();
        drop(tx);

        let (store, sink) = pump.run().await;
        assert_eq!(store.state().frequency_mhz, 869.525);
        assert_eq!(sink.states.len(), 1);
    }

    #[test]
    fn test_formatted_line() {
        let line = LogLine::new("hello", LogChannel::Main, false);
        let formatted = line.formatted();
        assert!(formatted.starts_with('['));
        assert!(formatted.ends_with("] hello"));
    }
}
