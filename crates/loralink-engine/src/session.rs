/*!
 * State shared by the engine, the reader task and pending polls.
 *
 * The open session and the lifecycle phase change together under one lock,
 * so a teardown triggered by the reader, a failed write or an explicit
 * disconnect is applied exactly once.
 */
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use loralink_devices::{Command, SerialLink, StopFlag};

use crate::error::{Error, Result};
use crate::event::EngineEvent;
use crate::lifecycle::ConnectionPhase;

/// One open connection
pub(crate) struct Session {
    pub(crate) id: Uuid,
    pub(crate) link: Arc<dyn SerialLink>,
    pub(crate) stop: StopFlag,
    pub(crate) reader: Option<JoinHandle<()>>,
    polls: Vec<JoinHandle<()>>,
}

impl Session {
    pub(crate) fn new(link: Arc<dyn SerialLink>) -> Self {
        Self {
            id: Uuid::new_v4(),
            link,
            stop: StopFlag::new(),
            reader: None,
            polls: Vec::new(),
        }
    }

    fn cancel_polls(&mut self) {
        for poll in self.polls.drain(..) {
            poll.abort();
        }
    }
}

#[derive(Default)]
struct Slot {
    session: Option<Session>,
}

pub(crate) struct Shared {
    slot: Mutex<Slot>,
    phase: watch::Sender<ConnectionPhase>,
    events: mpsc::UnboundedSender<EngineEvent>,
    writes: tokio::sync::Mutex<()>,
}

impl Shared {
    pub(crate) fn new(events: mpsc::UnboundedSender<EngineEvent>) -> Arc<Self> {
        let (phase, _) = watch::channel(ConnectionPhase::Disconnected);
        Arc::new(Self {
            slot: Mutex::new(Slot::default()),
            phase,
            events,
            writes: tokio::sync::Mutex::new(()),
        })
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn emit(&self, event: EngineEvent) {
        if self.events.send(event).is_err() {
            debug!("Event consumer is gone, dropping event");
        }
    }

    pub(crate) fn notice<S: Into<String>>(&self, text: S) {
        self.emit(EngineEvent::Notice(text.into()));
    }

    pub(crate) fn phase(&self) -> ConnectionPhase {
        *self.phase.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<ConnectionPhase> {
        self.phase.subscribe()
    }

    fn set_phase(&self, next: ConnectionPhase) {
        let previous = self.phase.send_replace(next);
        if previous != next {
            debug!("Phase {} -> {}", previous, next);
            self.emit(EngineEvent::Phase(next));
        }
    }

    /// Claim the lifecycle for a new connection attempt
    pub(crate) fn begin_connect(&self) -> Result<()> {
        let _slot = self.slot();
        let current = self.phase();
        if current != ConnectionPhase::Disconnected {
            return Err(Error::invalid_state(format!("cannot connect while {}", current)));
        }
        self.set_phase(ConnectionPhase::Connecting);
        Ok(())
    }

    /// Return to Disconnected after a failed open
    pub(crate) fn abort_connect(&self) {
        let slot = self.slot();
        if slot.session.is_none() {
            self.set_phase(ConnectionPhase::Disconnected);
        }
    }

    /// Install an opened session and move to Settling
    pub(crate) fn attach(&self, session: Session) -> Result<Uuid> {
        let mut slot = self.slot();
        if self.phase() != ConnectionPhase::Connecting || slot.session.is_some() {
            session.link.close();
            return Err(Error::connection_lost("disconnected while opening the port"));
        }
        let id = session.id;
        slot.session = Some(session);
        self.set_phase(ConnectionPhase::Settling);
        Ok(id)
    }

    /// Move the session `id` to `next`
    pub(crate) fn advance(&self, id: Uuid, next: ConnectionPhase) -> Result<()> {
        let slot = self.slot();
        match &slot.session {
            Some(session) if session.id == id => {}
            _ => return Err(Error::connection_lost("session ended")),
        }
        let current = self.phase();
        if !current.can_advance_to(next) {
            return Err(Error::invalid_state(format!("cannot move from {} to {}", current, next)));
        }
        self.set_phase(next);
        Ok(())
    }

    pub(crate) fn track_reader(&self, id: Uuid, reader: JoinHandle<()>) {
        let mut slot = self.slot();
        if let Some(session) = slot.session.as_mut().filter(|s| s.id == id) {
            session.reader = Some(reader);
        }
    }

    pub(crate) fn track_poll(&self, id: Uuid, poll: JoinHandle<()>) {
        let mut slot = self.slot();
        match slot.session.as_mut().filter(|s| s.id == id) {
            Some(session) => {
                session.polls.retain(|p| !p.is_finished());
                session.polls.push(poll);
            }
            None => poll.abort(),
        }
    }

    pub(crate) fn pending_polls(&self) -> usize {
        self.slot()
            .session
            .as_ref()
            .map(|s| s.polls.iter().filter(|p| !p.is_finished()).count())
            .unwrap_or(0)
    }

    pub(crate) fn current(&self) -> Option<(Uuid, Arc<dyn SerialLink>)> {
        self.slot()
            .session
            .as_ref()
            .map(|s| (s.id, s.link.clone()))
    }

    /// Take the session out for an orderly disconnect; polls are cancelled
    pub(crate) fn detach(&self) -> Option<Session> {
        let mut slot = self.slot();
        let mut session = slot.session.take();
        if let Some(session) = session.as_mut() {
            session.stop.raise();
            session.cancel_polls();
        }
        session
    }

    /// Settle on Disconnected once a detached session is closed
    pub(crate) fn finish_disconnect(&self) {
        let slot = self.slot();
        if slot.session.is_none() {
            self.set_phase(ConnectionPhase::Disconnected);
        }
    }

    /// Tear down session `id` after an I/O failure.
    ///
    /// Returns false when that session is already gone.
    pub(crate) fn lose(&self, id: Uuid, reason: &str) -> bool {
        let mut slot = self.slot();
        let mut session = match slot.session.take() {
            Some(session) if session.id == id => session,
            other => {
                slot.session = other;
                return false;
            }
        };
        warn!("Connection to {} lost: {}", session.link.port(), reason);
        session.stop.raise();
        session.cancel_polls();
        session.link.close();
        self.set_phase(ConnectionPhase::Disconnected);
        self.emit(EngineEvent::ConnectionLost(reason.to_string()));
        true
    }

    /// Write `command` to the open link.
    ///
    /// With `expected` set, the write only goes out on that session. Writes
    /// are serialized and keep caller order.
    pub(crate) async fn send(&self, expected: Option<Uuid>, command: &Command) -> Result<()> {
        let _guard = self.writes.lock().await;
        let (id, link) = match (self.current(), expected) {
            (None, _) => return Err(Error::NotConnected),
            (Some((id, _)), Some(wanted)) if id != wanted => {
                return Err(Error::connection_lost("session ended"))
            }
            (Some(current), _) => current,
        };

        let line = command.to_line();
        match link.write_line(&line) {
            Ok(()) => {
                debug!("TX: {}", line);
                self.emit(EngineEvent::Outbound(line));
                Ok(())
            }
            Err(e) => {
                let reason = format!("write of {:?} failed: {}", line, e);
                self.lose(id, &reason);
                Err(Error::ConnectionLost(reason))
            }
        }
    }
}
