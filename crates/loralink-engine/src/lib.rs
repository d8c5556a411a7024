/*!
 * LoRaLink Engine
 *
 * This crate drives a LoRaLink transceiver over a serial link: connection
 * lifecycle, configuration sync, status polling and user intents, plus the
 * event pump that keeps a presentation layer in step with the device.
 */

#![warn(missing_docs)]

// Re-export core types
pub use loralink_core::prelude;

pub mod engine;
pub mod error;
pub mod event;
pub mod lifecycle;
pub mod poller;
pub mod sink;

mod reader;
mod session;

pub use engine::ProtocolEngine;
pub use error::{Error, Result};
pub use event::{ClassifiedLine, EngineEvent};
pub use lifecycle::ConnectionPhase;
pub use poller::Poller;
pub use sink::{EventPump, EventSink, LogChannel, LogLine};

/// LoRaLink engine crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the engine
pub fn init() -> Result<()> {
    tracing::info!("LoRaLink Engine {} initialized", VERSION);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
