/*!
 * LoRaLink Devices
 *
 * This crate provides the serial link abstraction, its `serialport` and
 * in-memory implementations, the transceiver line protocol and the
 * host-side state mirror.
 */

#![warn(missing_docs)]

// Re-export core types
pub use loralink_core::prelude;

pub mod discovery;
pub mod link;
pub mod memory;
pub mod protocol;
pub mod store;

#[cfg(feature = "serial")]
pub mod serial;

pub use discovery::{available_ports, filter_ports, preferred_port, PortInfo};
pub use link::{
    LinkError, LinkOpener, Lines, SerialLink, StopFlag, BAUD_RATE, MAX_LINE_LEN, POLL_PERIOD,
};
pub use memory::{MemoryLink, MemoryOpener};
pub use protocol::{classify, Command, ConfigValue, Flag, InboundEvent, Query, StatusValue, Tuning};
pub use store::{DeviceStateStore, StateChange};

#[cfg(feature = "serial")]
pub use serial::{SerialPortLink, SerialPortOpener};

/// LoRaLink devices crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
