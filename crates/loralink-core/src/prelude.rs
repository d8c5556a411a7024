/*!
 * Prelude module for LoRaLink Core.
 *
 * This module re-exports commonly used types from the LoRaLink Core crate
 * to make them easier to import.
 */

// Re-export error types
pub use crate::error::{Error, Result};

// Re-export core types
pub use crate::types::{
    Bandwidth, DeviceState, PostMode, StateField, StatusInterval, WifiConnection,
};

// Re-export config types
pub use crate::config::{Config, ConfigBuilder, SerialConfig, TimingConfig};

// Re-export logging macros
pub use tracing::{debug, error, info, trace, warn};
