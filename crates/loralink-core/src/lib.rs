/*!
 * LoRaLink Core
 *
 * This crate provides the pieces every other LoRaLink crate builds on: the
 * mirrored device state types, layered configuration, logging setup and the
 * firmware defines reader.
 */

#![warn(missing_docs)]

pub mod config;
pub mod defines;
pub mod error;
pub mod logging;
pub mod prelude;
pub mod types;

/// LoRaLink core crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
