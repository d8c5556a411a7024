/*!
 * `serialport`-backed link to a physical transceiver.
 */
use std::fmt;
use std::io::{self, Read, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use serialport::{ClearBuffer, DataBits, FlowControl, Parity, SerialPort, StopBits};
use tracing::{debug, info};

use crate::link::{LinkError, LinkOpener, Result, SerialLink, POLL_PERIOD};

type Port = Box<dyn SerialPort>;

/// A link over an operating-system serial port, 8N1 without flow control.
///
/// The port handle is cloned so the reader task and the command writer never
/// wait on each other.
pub struct SerialPortLink {
    port: String,
    reader: Mutex<Option<Port>>,
    writer: Mutex<Option<Port>>,
    open: AtomicBool,
}

impl fmt::Debug for SerialPortLink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SerialPortLink")
            .field("port", &self.port)
            .field("open", &self.is_open())
            .finish()
    }
}

fn guard(slot: &Mutex<Option<Port>>) -> MutexGuard<'_, Option<Port>> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SerialPortLink {
    /// Open `port` synchronously
    pub fn open(port: &str, baud_rate: u32) -> Result<Self> {
        let reader = serialport::new(port, baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .flow_control(FlowControl::None)
            .timeout(POLL_PERIOD)
            .open()
            .map_err(|e| LinkError::port_unavailable(port, e.to_string()))?;
        let writer = reader
            .try_clone()
            .map_err(|e| LinkError::port_unavailable(port, e.to_string()))?;

        info!("Opened serial port {} at {} baud", port, baud_rate);
        Ok(Self {
            port: port.to_string(),
            reader: Mutex::new(Some(reader)),
            writer: Mutex::new(Some(writer)),
            open: AtomicBool::new(true),
        })
    }
}

impl SerialLink for SerialPortLink {
    fn port(&self) -> &str {
        &self.port
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn read_chunk(&self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let mut slot = guard(&self.reader);
        let port = slot.as_mut().ok_or(LinkError::ConnectionClosed)?;
        if port.timeout() != timeout {
            port.set_timeout(timeout).map_err(io::Error::from)?;
        }
        match port.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::TimedOut => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    fn write_line(&self, line: &str) -> Result<()> {
        let mut slot = guard(&self.writer);
        let port = slot.as_mut().ok_or(LinkError::ConnectionClosed)?;
        let mut frame = Vec::with_capacity(line.len() + 1);
        frame.extend_from_slice(line.as_bytes());
        frame.push(b'\n');
        port.write_all(&frame)
            .and_then(|_| port.flush())
            .map_err(|e| LinkError::write(format!("{}: {}", self.port, e)))
    }

    fn clear(&self) -> Result<()> {
        let slot = guard(&self.writer);
        let port = slot.as_ref().ok_or(LinkError::ConnectionClosed)?;
        port.clear(ClearBuffer::All).map_err(io::Error::from)?;
        Ok(())
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            guard(&self.writer).take();
            guard(&self.reader).take();
            info!("Closed serial port {}", self.port);
        }
    }
}

/// Opens [`SerialPortLink`]s
#[derive(Debug, Default, Clone, Copy)]
pub struct SerialPortOpener;

#[async_trait]
impl LinkOpener for SerialPortOpener {
    async fn open(&self, port: &str, baud_rate: u32) -> Result<Arc<dyn SerialLink>> {
        debug!("Opening {} at {} baud", port, baud_rate);
        let name = port.to_string();
        let link = tokio::task::spawn_blocking(move || SerialPortLink::open(&name, baud_rate))
            .await
            .map_err(|e| LinkError::port_unavailable(port, e.to_string()))??;
        Ok(Arc::new(link))
    }
}
