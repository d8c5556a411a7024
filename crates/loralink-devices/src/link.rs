/*!
 * Serial link abstraction and the line reader built on it.
 *
 * A [`SerialLink`] moves raw bytes; [`Lines`] turns them into the text lines
 * the transceiver speaks. Reads never block for longer than one poll period,
 * so a raised [`StopFlag`] is noticed promptly.
 */
use std::fmt::Debug;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use thiserror::Error;
use tracing::{debug, trace};

/// Baud rate spoken by the transceiver firmware
pub const BAUD_RATE: u32 = 115_200;

/// Read timeout used by the line reader
pub const POLL_PERIOD: Duration = Duration::from_millis(100);

const READ_CHUNK: usize = 256;

/// Longest line kept in the buffer; longer input is cut into pieces of this size
pub const MAX_LINE_LEN: usize = 4096;

/// Error type for link operations
#[derive(Error, Debug)]
pub enum LinkError {
    /// The port could not be opened
    #[error("Port {port} unavailable: {reason}")]
    PortUnavailable {
        /// The port that was requested
        port: String,
        /// Why opening failed
        reason: String,
    },

    /// The link was closed
    #[error("Connection closed")]
    ConnectionClosed,

    /// A line could not be written
    #[error("Write error: {0}")]
    Write(String),

    /// I/O error while reading
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for link operations
pub type Result<T> = std::result::Result<T, LinkError>;

impl LinkError {
    /// Create a new port unavailable error
    pub fn port_unavailable<P: AsRef<str>, R: AsRef<str>>(port: P, reason: R) -> Self {
        LinkError::PortUnavailable {
            port: port.as_ref().to_string(),
            reason: reason.as_ref().to_string(),
        }
    }

    /// Create a new write error
    pub fn write<S: AsRef<str>>(msg: S) -> Self {
        LinkError::Write(msg.as_ref().to_string())
    }
}

/// A byte-level connection to one transceiver.
///
/// Implementations are shared between the reader task and the command
/// writer, so every method takes `&self`.
pub trait SerialLink: Send + Sync + Debug {
    /// Name of the underlying port
    fn port(&self) -> &str;

    /// Whether `close` has not been called yet
    fn is_open(&self) -> bool;

    /// Read whatever bytes arrive within `timeout`.
    ///
    /// Returns `Ok(0)` when nothing arrived in time.
    fn read_chunk(&self, buf: &mut [u8], timeout: Duration) -> Result<usize>;

    /// Write one line; the newline is appended here
    fn write_line(&self, line: &str) -> Result<()>;

    /// Discard anything buffered in either direction
    fn clear(&self) -> Result<()>;

    /// Release the port. Calling it again does nothing.
    fn close(&self);
}

/// Opens links by port name
#[async_trait]
pub trait LinkOpener: Send + Sync + Debug {
    /// Open `port` at `baud_rate`
    async fn open(&self, port: &str, baud_rate: u32) -> Result<Arc<dyn SerialLink>>;
}

/// Cooperative cancellation flag checked once per poll period
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// Create a lowered flag
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the reader to stop
    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested
    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Lazy sequence of text lines read from a link.
///
/// Terminators are stripped, invalid UTF-8 is replaced, surrounding
/// whitespace is trimmed and empty lines are skipped. The sequence ends when
/// the stop flag is raised or the link is closed; a read failure is yielded
/// once and then the sequence ends.
#[derive(Debug)]
pub struct Lines {
    link: Arc<dyn SerialLink>,
    stop: StopFlag,
    period: Duration,
    buffer: BytesMut,
    chunk: Vec<u8>,
    finished: bool,
}

impl Lines {
    /// Start reading lines from `link`
    pub fn new(link: Arc<dyn SerialLink>, stop: StopFlag, period: Duration) -> Result<Self> {
        if !link.is_open() {
            return Err(LinkError::ConnectionClosed);
        }
        Ok(Self {
            link,
            stop,
            period,
            buffer: BytesMut::with_capacity(READ_CHUNK * 4),
            chunk: vec![0u8; READ_CHUNK],
            finished: false,
        })
    }

    fn pop_line(&mut self) -> Option<String> {
        loop {
            let end = match self.buffer.iter().position(|&b| b == b'\n') {
                Some(pos) => pos + 1,
                None if self.buffer.len() >= MAX_LINE_LEN => {
                    debug!("No line break in {} bytes, cutting the line", MAX_LINE_LEN);
                    MAX_LINE_LEN
                }
                None => return None,
            };
            let raw = self.buffer.split_to(end);
            let line = String::from_utf8_lossy(&raw).trim().to_string();
            if !line.is_empty() {
                return Some(line);
            }
        }
    }
}

impl Iterator for Lines {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(line) = self.pop_line() {
                return Some(Ok(line));
            }
            if self.finished || self.stop.is_raised() || !self.link.is_open() {
                return None;
            }
            match self.link.read_chunk(&mut self.chunk, self.period) {
                Ok(0) => continue,
                Ok(n) => {
                    trace!("Read {} bytes from {}", n, self.link.port());
                    self.buffer.extend_from_slice(&self.chunk[..n]);
                }
                Err(LinkError::ConnectionClosed) => {
                    self.finished = true;
                    return None;
                }
                Err(e) => {
                    self.finished = true;
                    self.buffer.clear();
                    return Some(Err(e));
                }
            }
        }
    }
}
