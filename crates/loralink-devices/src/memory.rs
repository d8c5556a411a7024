/*!
 * In-memory serial link.
 *
 * [`MemoryLink`] behaves like a transceiver on the far end of a cable: the
 * host side reads and writes through [`SerialLink`], while a test or a
 * simulator injects inbound bytes and inspects written lines through the
 * inherent methods. [`MemoryOpener`] hands out registered links by port name.
 */
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::io;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::debug;

use crate::link::{LinkError, LinkOpener, Result, SerialLink};

#[derive(Debug, Default)]
struct Wire {
    inbound: VecDeque<u8>,
    written: Vec<String>,
    written_at: Vec<Instant>,
    cleared_at: Vec<Instant>,
    open: bool,
    unplugged: bool,
    fail_writes: bool,
    clears: usize,
    opens: usize,
}

/// A link whose far end is driven from code
pub struct MemoryLink {
    port: String,
    wire: Mutex<Wire>,
    arrived: Condvar,
}

impl fmt::Debug for MemoryLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let wire = self.wire();
        f.debug_struct("MemoryLink")
            .field("port", &self.port)
            .field("open", &wire.open)
            .field("pending", &wire.inbound.len())
            .field("written", &wire.written.len())
            .finish()
    }
}

impl MemoryLink {
    /// Create an open link
    pub fn new<S: Into<String>>(port: S) -> Arc<Self> {
        let link = Self::detached(port);
        link.wire().open = true;
        link
    }

    /// Create a link that stays closed until a [`MemoryOpener`] opens it
    pub fn detached<S: Into<String>>(port: S) -> Arc<Self> {
        Arc::new(Self {
            port: port.into(),
            wire: Mutex::new(Wire::default()),
            arrived: Condvar::new(),
        })
    }

    fn wire(&self) -> MutexGuard<'_, Wire> {
        self.wire.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Queue raw bytes for the host to read
    pub fn push_bytes(&self, bytes: &[u8]) {
        self.wire().inbound.extend(bytes.iter().copied());
        self.arrived.notify_all();
    }

    /// Queue one line for the host to read
    pub fn push_line(&self, line: &str) {
        let mut wire = self.wire();
        wire.inbound.extend(line.bytes());
        wire.inbound.push_back(b'\n');
        drop(wire);
        self.arrived.notify_all();
    }

    /// Lines written by the host so far, without terminators
    pub fn written(&self) -> Vec<String> {
        self.wire().written.clone()
    }

    /// When each line in [`MemoryLink::written`] was written
    pub fn write_times(&self) -> Vec<Instant> {
        self.wire().written_at.clone()
    }

    /// Take the written lines, leaving the log empty
    pub fn take_written(&self) -> Vec<String> {
        let mut wire = self.wire();
        wire.written_at.clear();
        std::mem::take(&mut wire.written)
    }

    /// Number of times the host cleared the buffers
    pub fn clears(&self) -> usize {
        self.wire().clears
    }

    /// When the host cleared the buffers
    pub fn clear_times(&self) -> Vec<Instant> {
        self.wire().cleared_at.clone()
    }

    /// Number of times the link was opened through a [`MemoryOpener`]
    pub fn opens(&self) -> usize {
        self.wire().opens
    }

    /// Make every following read and write fail as if the cable was pulled
    pub fn unplug(&self) {
        self.wire().unplugged = true;
        self.arrived.notify_all();
    }

    /// Undo [`MemoryLink::unplug`]
    pub fn replug(&self) {
        self.wire().unplugged = false;
    }

    /// Make writes fail while reads keep working
    pub fn fail_writes(&self, fail: bool) {
        self.wire().fail_writes = fail;
    }

    fn reopen(&self) -> Result<()> {
        let mut wire = self.wire();
        if wire.unplugged {
            return Err(LinkError::port_unavailable(&self.port, "device not present"));
        }
        if wire.open {
            return Err(LinkError::port_unavailable(&self.port, "port busy"));
        }
        wire.open = true;
        wire.opens += 1;
        Ok(())
    }
}

impl SerialLink for MemoryLink {
    fn port(&self) -> &str {
        &self.port
    }

    fn is_open(&self) -> bool {
        self.wire().open
    }

    fn read_chunk(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let deadline = Instant::now() + timeout;
        let mut wire = self.wire();
        loop {
            if wire.unplugged {
                return Err(LinkError::Io(io::Error::new(
                    io::ErrorKind::BrokenPipe,
                    "device unplugged",
                )));
            }
            if !wire.open {
                return Err(LinkError::ConnectionClosed);
            }
            if !wire.inbound.is_empty() {
                let n = buf.len().min(wire.inbound.len());
                for (slot, byte) in buf.iter_mut().zip(wire.inbound.drain(..n)) {
                    *slot = byte;
                }
                return Ok(n);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(0);
            }
            wire = self
                .arrived
                .wait_timeout(wire, deadline - now)
                .map(|(guard, _)| guard)
                .unwrap_or_else(|poisoned| poisoned.into_inner().0);
        }
    }

    fn write_line(&self, line: &str) -> Result<()> {
        let mut wire = self.wire();
        if !wire.open {
            return Err(LinkError::ConnectionClosed);
        }
        if wire.unplugged || wire.fail_writes {
            return Err(LinkError::write(format!("{}: broken pipe", self.port)));
        }
        wire.written.push(line.to_string());
        wire.written_at.push(Instant::now());
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        let mut wire = self.wire();
        if !wire.open {
            return Err(LinkError::ConnectionClosed);
        }
        wire.inbound.clear();
        wire.clears += 1;
        wire.cleared_at.push(Instant::now());
        Ok(())
    }

    fn close(&self) {
        let mut wire = self.wire();
        if wire.open {
            wire.open = false;
            debug!("Memory link {} closed", self.port);
        }
        drop(wire);
        self.arrived.notify_all();
    }
}

/// Opens [`MemoryLink`]s registered under port names
#[derive(Debug, Default)]
pub struct MemoryOpener {
    ports: Mutex<HashMap<String, Arc<MemoryLink>>>,
}

impl MemoryOpener {
    /// Create an opener with no ports
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a port and return the handle for its far end
    pub fn add_port<S: Into<String>>(&self, port: S) -> Arc<MemoryLink> {
        let port = port.into();
        let link = MemoryLink::detached(port.clone());
        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(port, link.clone());
        link
    }

    /// Names of the registered ports, sorted
    pub fn port_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }
}

#[async_trait]
impl LinkOpener for MemoryOpener {
    async fn open(&self, port: &str, baud_rate: u32) -> Result<Arc<dyn SerialLink>> {
        let link = self
            .ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(port)
            .cloned()
            .ok_or_else(|| LinkError::port_unavailable(port, "no such port"))?;
        link.reopen()?;
        debug!("Memory link {} opened at {} baud", port, baud_rate);
        Ok(link)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::BAUD_RATE;

    #[test]
    fn test_written_lines_are_recorded() {
        let link = MemoryLink::new("mem0");
        link.write_line("get gain").unwrap();
        link.write_line("flash").unwrap();
        assert_eq!(link.written(), vec!["get gain", "flash"]);
        let times = link.write_times();
        assert_eq!(times.len(), 2);
        assert!(times[0] <= times[1]);
        assert_eq!(link.take_written().len(), 2);
        assert!(link.written().is_empty());
        assert!(link.write_times().is_empty());
    }

    #[test]
    fn test_clear_drops_pending_input() {
        let link = MemoryLink::new("mem0");
        link.push_line("boot noise");
        link.clear().unwrap();
        assert_eq!(link.clears(), 1);
        assert_eq!(link.clear_times().len(), 1);

        let mut buf = [0u8; 16];
        assert_eq!(link.read_chunk(&mut buf, Duration::from_millis(5)).unwrap(), 0);
    }

    #[test]
    fn test_closed_link_rejects_io() {
        let link = MemoryLink::new("mem0");
        link.close();
        link.close();
        assert!(!link.is_open());
        assert!(matches!(link.write_line("get sf"), Err(LinkError::ConnectionClosed)));
        assert!(matches!(link.clear(), Err(LinkError::ConnectionClosed)));
    }

    #[test]
    fn test_failing_writes() {
        let link = MemoryLink::new("mem0");
        link.fail_writes(true);
        assert!(matches!(link.write_line("get sf"), Err(LinkError::Write(_))));
        link.fail_writes(false);
        assert!(link.write_line("get sf").is_ok());
    }

    #[tokio::test]
    async fn test_opener_hands_out_registered_ports() {
        let opener = MemoryOpener::new();
        let peer = opener.add_port("/dev/ttyACM0");
        assert_eq!(opener.port_names(), vec!["/dev/ttyACM0"]);

        let link = opener.open("/dev/ttyACM0", BAUD_RATE).await.unwrap();
        assert!(link.is_open());
        assert_eq!(peer.opens(), 1);

        // A second open while the first is live is refused
        assert!(matches!(
            opener.open("/dev/ttyACM0", BAUD_RATE).await,
            Err(LinkError::PortUnavailable { .. })
        ));

        link.close();
        assert!(opener.open("/dev/ttyACM0", BAUD_RATE).await.is_ok());
        assert_eq!(peer.opens(), 2);
    }

    #[test]
    fn test_opener_rejects_unknown_and_unplugged_ports() {
        let opener = MemoryOpener::new();
        let peer = opener.add_port("mem0");
        assert!(matches!(
            tokio_test::block_on(opener.open("mem1", BAUD_RATE)),
            Err(LinkError::PortUnavailable { .. })
        ));

        peer.unplug();
        assert!(tokio_test::block_on(opener.open("mem0", BAUD_RATE)).is_err());
        peer.replug();
        assert!(tokio_test::block_on(opener.open("mem0", BAUD_RATE)).is_ok());
    }
}
