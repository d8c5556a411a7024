/*!
 * Logging functionality for LoRaLink.
 *
 * This module provides tracing setup and the spans shared by the engine and
 * the front-ends.
 */
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Initialize the logging system from the `logging` configuration section
pub fn init_from_config(config: &LoggingConfig) -> Result<()> {
    init_with_filter(&config.level)
}

/// Initialize the logging system with a specific filter.
///
/// `RUST_LOG` takes precedence over `filter` when it is set.
///
/// # Arguments
///
/// * `filter` - The log filter string (e.g., "info", "debug", "loralink_engine=trace")
pub fn init_with_filter(filter: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
        .with(filter)
        .try_init()
        .map_err(|e| Error::runtime(format!("Failed to initialize logging: {}", e)))?;

    Ok(())
}

/// A type alias for a tracing span
pub type Span = tracing::Span;

/// Create the span that wraps everything one serial session does
///
/// # Arguments
///
/// * `port` - The serial port the session is bound to
/// * `session_id` - An identifier unique to this connection
pub fn session_span(port: &str, session_id: &str) -> Span {
    tracing::info_span!("session", port = %port, id = %session_id)
}

/// Create a new span for an operation
///
/// # Arguments
///
/// * `name` - The name of the operation
/// * `component` - The component performing the operation
pub fn operation_span(name: &str, component: &str) -> Span {
    tracing::info_span!("operation", name = %name, component = %component)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_from_config() {
        // a second subscriber in the same process is refused, which is fine here
        let _ = init_from_config(&LoggingConfig::default());
    }

    #[test]
    fn test_session_span() {
        let span = session_span("/dev/ttyACM0", "abc");
        assert!(span.is_none() || span.id().is_some());
    }

    #[test]
    fn test_operation_span() {
        let span = operation_span("sync", "engine");
        assert!(span.is_none() || span.id().is_some());
    }
}
