/*!
 * Events handed from the engine to its single consumer.
 */
use serde::Serialize;

use loralink_devices::protocol::{classify, InboundEvent};

use crate::lifecycle::ConnectionPhase;

/// A received line together with its classification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ClassifiedLine {
    /// The line as received, trimmed
    pub line: String,
    /// What the line means
    pub event: InboundEvent,
}

impl ClassifiedLine {
    /// Classify `line`
    pub fn new<S: Into<String>>(line: S) -> Self {
        let line = line.into();
        let event = classify(&line);
        Self { line, event }
    }
}

/// Everything the engine reports, in the order it happened
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum EngineEvent {
    /// A line arrived from the device
    Inbound(ClassifiedLine),
    /// A command line was written to the device
    Outbound(String),
    /// The lifecycle phase changed
    Phase(ConnectionPhase),
    /// A note about the connection meant for the user
    Notice(String),
    /// The connection failed and was torn down
    ConnectionLost(String),
}
