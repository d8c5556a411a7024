/*!
 * The protocol engine.
 *
 * [`ProtocolEngine`] opens a link, lets the device settle, issues the sync
 * sequence and turns user intents into commands. Everything it observes is
 * reported as [`EngineEvent`]s on one unbounded channel whose receiver is
 * meant for a single foreground consumer, usually an
 * [`EventPump`](crate::sink::EventPump).
 *
 * Commands are fire-and-forget: replies are not correlated with the command
 * that provoked them, and the mirrored state only changes when the device
 * reports a value.
 */
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time;
use tracing::{debug, info, warn, Instrument};
use uuid::Uuid;

use loralink_core::config::{Config, TimingConfig};
use loralink_core::logging::operation_span;
use loralink_core::types::{
    validate_frequency, validate_gain, validate_spreading_factor, Bandwidth, PostMode,
    StatusInterval,
};
use loralink_devices::protocol::{Command, Flag, Query, Tuning, STATUS_QUERIES, SYNC_QUERIES};
use loralink_devices::{LinkOpener, BAUD_RATE};

use crate::error::{Error, Result};
use crate::event::EngineEvent;
use crate::lifecycle::ConnectionPhase;
use crate::poller::Poller;
use crate::reader;
use crate::session::{Session, Shared};

/// Drives one transceiver connection at a time
pub struct ProtocolEngine {
    opener: Arc<dyn LinkOpener>,
    timing: TimingConfig,
    shared: Arc<Shared>,
    poller: Poller,
}

impl fmt::Debug for ProtocolEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProtocolEngine")
            .field("opener", &self.opener)
            .field("phase", &self.phase())
            .field("timing", &self.timing)
            .finish()
    }
}

impl ProtocolEngine {
    /// Create an engine and the receiving end of its event channel
    pub fn new(
        config: &Config,
        opener: Arc<dyn LinkOpener>,
    ) -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (events, receiver) = mpsc::unbounded_channel();
        let shared = Shared::new(events);
        let engine = Self {
            opener,
            timing: config.timing.clone(),
            poller: Poller::new(shared.clone()),
            shared,
        };
        (engine, receiver)
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> ConnectionPhase {
        self.shared.phase()
    }

    /// Watch lifecycle phase changes
    pub fn subscribe_phase(&self) -> watch::Receiver<ConnectionPhase> {
        self.shared.subscribe()
    }

    /// Identifier of the open session, if any
    pub fn session_id(&self) -> Option<Uuid> {
        self.shared.current().map(|(id, _)| id)
    }

    /// The status poller
    pub fn poller(&self) -> &Poller {
        &self.poller
    }

    /// Open `port`, let the device settle, then synchronize.
    ///
    /// Fails with [`Error::InvalidState`] unless the engine is disconnected,
    /// and with [`Error::PortUnavailable`] when the port cannot be opened.
    pub async fn connect(&self, port: &str) -> Result<()> {
        self.shared.begin_connect()?;
        info!("Connecting to {} at {} baud", port, BAUD_RATE);

        let link = match self.opener.open(port, BAUD_RATE).await {
            Ok(link) => link,
            Err(e) => {
                self.shared.abort_connect();
                warn!("Could not open {}: {}", port, e);
                return Err(e.into());
            }
        };

        let session = Session::new(link.clone());
        let stop = session.stop.clone();
        let id = self.shared.attach(session)?;
        let reader = reader::spawn(
            self.shared.clone(),
            id,
            link.clone(),
            stop,
            self.timing.poll_period(),
        );
        self.shared.track_reader(id, reader);
        self.shared.notice(format!("Connected to {} at {} baud", port, BAUD_RATE));

        time::sleep(self.timing.settle()).await;
        if self.session_id() != Some(id) {
            return Err(Error::connection_lost("session ended while settling"));
        }
        if let Err(e) = link.clear() {
            let reason = format!("flush failed: {}", e);
            self.shared.lose(id, &reason);
            return Err(Error::ConnectionLost(reason));
        }
        self.shared.notice("Serial port flushed, device ready");

        self.shared.advance(id, ConnectionPhase::Syncing)?;
        self.shared.send(Some(id), &Command::Get(Query::DebugInfo)).await?;
        time::sleep(self.timing.pacing()).await;
        self.sync_session(id).await?;
        self.poller.schedule(id, Duration::ZERO);
        self.shared.advance(id, ConnectionPhase::Ready)?;

        info!("Device on {} synchronized", port);
        Ok(())
    }

    /// Close the connection.
    ///
    /// The reader is stopped first and observes the stop within one poll
    /// period; then the port is closed. Always ends in Disconnected.
    pub async fn disconnect(&self) {
        match self.shared.detach() {
            Some(mut session) => {
                let port = session.link.port().to_string();
                if let Some(reader) = session.reader.take() {
                    if let Err(e) = reader.await {
                        warn!("Reader for {} ended abnormally: {}", port, e);
                    }
                }
                session.link.close();
                self.shared.finish_disconnect();
                self.shared.notice(format!("Disconnected from {}", port));
                info!("Disconnected from {}", port);
            }
            None => self.shared.finish_disconnect(),
        }
    }

    /// Write one command to the device
    pub async fn send(&self, command: Command) -> Result<()> {
        self.shared.send(None, &command).await
    }

    async fn sync_session(&self, id: Uuid) -> Result<()> {
        async {
            for query in SYNC_QUERIES {
                self.shared.send(Some(id), &Command::Get(query)).await?;
                time::sleep(self.timing.pacing()).await;
            }
            Ok::<(), Error>(())
        }
        .instrument(operation_span("sync", "engine"))
        .await
    }

    /// Ask the device for every mirrored configuration value again
    pub async fn sync(&self) -> Result<()> {
        let (id, _) = self.shared.current().ok_or(Error::NotConnected)?;
        debug!("Re-synchronizing session {}", id);
        self.sync_session(id).await
    }

    /// Ask the device for its WiFi and HTTP status now
    pub async fn request_status(&self) -> Result<()> {
        for query in STATUS_QUERIES {
            self.send(Command::Get(query)).await?;
        }
        Ok(())
    }

    /// Set the transmit gain in dBm
    pub async fn set_gain(&self, gain: i8) -> Result<()> {
        let gain = validate_gain(gain)?;
        self.send(Command::SetUpdate(Tuning::Gain(gain))).await
    }

    /// Set the carrier frequency in MHz
    pub async fn set_frequency(&self, mhz: f64) -> Result<()> {
        let mhz = validate_frequency(mhz)?;
        self.send(Command::SetUpdate(Tuning::FrequencyMhz(mhz))).await
    }

    /// Set the spreading factor
    pub async fn set_spreading_factor(&self, sf: u8) -> Result<()> {
        let sf = validate_spreading_factor(sf)?;
        self.send(Command::SetUpdate(Tuning::SpreadingFactor(sf))).await
    }

    /// Set the channel bandwidth
    pub async fn set_bandwidth(&self, bandwidth: Bandwidth) -> Result<()> {
        self.send(Command::SetUpdate(Tuning::BandwidthKhz(bandwidth))).await
    }

    /// Turn periodic status packets on or off
    pub async fn set_status_enabled(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetFlag(Flag::Status(enabled))).await
    }

    /// Set the status packet interval
    pub async fn set_status_interval(&self, interval: StatusInterval) -> Result<()> {
        self.send(Command::SetFlag(Flag::Interval(interval))).await
    }

    /// Turn the device's WiFi on or off and re-check its status later
    pub async fn set_wifi_enabled(&self, enabled: bool) -> Result<()> {
        self.send(Command::SetFlag(Flag::WifiEnabled(enabled))).await?;
        if let Some((id, _)) = self.shared.current() {
            let delay = self.timing.wifi_recheck();
            self.shared.notice(format!(
                "WiFi {}, checking status in {} ms",
                if enabled { "enabling" } else { "disabling" },
                delay.as_millis()
            ));
            self.poller.schedule(id, delay);
        }
        Ok(())
    }

    /// Choose when the device POSTs to the server
    pub async fn set_post_mode(&self, mode: PostMode) -> Result<()> {
        self.send(Command::SetFlag(Flag::PostMode(mode))).await
    }

    /// Transmit `payload` over LoRa
    pub async fn send_data(&self, payload: &str) -> Result<()> {
        if payload.contains(['\n', '\r']) {
            return Err(Error::invalid_argument("payload must be a single line"));
        }
        self.send(Command::Data(payload.to_string())).await
    }

    /// Ask the device to dump its flash log
    pub async fn read_flash(&self) -> Result<()> {
        self.send(Command::FlashRead).await
    }
}

impl Drop for ProtocolEngine {
    fn drop(&mut self) {
        if let Some(session) = self.shared.detach() {
            session.link.close();
            self.shared.finish_disconnect();
        }
    }
}
