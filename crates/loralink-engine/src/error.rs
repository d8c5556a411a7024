/*!
 * Error types for the LoRaLink engine crate.
 */
use thiserror::Error;

use loralink_devices::LinkError;

/// Error type for LoRaLink engine operations
#[derive(Error, Debug)]
pub enum Error {
    /// The serial port could not be opened
    #[error("Port {port} unavailable: {reason}")]
    PortUnavailable {
        /// The port that was requested
        port: String,
        /// Why opening failed
        reason: String,
    },

    /// No connection is open
    #[error("Not connected")]
    NotConnected,

    /// The connection failed and was torn down
    #[error("Connection lost: {0}")]
    ConnectionLost(String),

    /// The operation is not allowed in the current lifecycle phase
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// An intent argument is outside the device's domain
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Link error
    #[error("Link error: {0}")]
    Link(LinkError),

    /// Core error
    #[error("Core error: {0}")]
    Core(loralink_core::error::Error),
}

/// Result type for LoRaLink engine operations
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Create a new connection lost error
    pub fn connection_lost<S: AsRef<str>>(msg: S) -> Self {
        Error::ConnectionLost(msg.as_ref().to_string())
    }

    /// Create a new invalid state error
    pub fn invalid_state<S: AsRef<str>>(msg: S) -> Self {
        Error::InvalidState(msg.as_ref().to_string())
    }

    /// Create a new invalid argument error
    pub fn invalid_argument<S: AsRef<str>>(msg: S) -> Self {
        Error::InvalidArgument(msg.as_ref().to_string())
    }
}

impl From<LinkError> for Error {
    fn from(err: LinkError) -> Self {
        match err {
            LinkError::PortUnavailable { port, reason } => Error::PortUnavailable { port, reason },
            other => Error::Link(other),
        }
    }
}

impl From<loralink_core::error::Error> for Error {
    fn from(err: loralink_core::error::Error) -> Self {
        match err {
            loralink_core::error::Error::InvalidValue(msg) => Error::InvalidArgument(msg),
            other => Error::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_port_unavailable_keeps_its_port() {
        let err: Error = LinkError::port_unavailable("/dev/ttyACM3", "no such device").into();
        match err {
            Error::PortUnavailable { port, .. } => assert_eq!(port, "/dev/ttyACM3"),
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(Error::from(LinkError::ConnectionClosed), Error::Link(_)));
    }

    #[test]
    fn test_invalid_value_becomes_invalid_argument() {
        let err: Error = loralink_core::types::validate_gain(40).unwrap_err().into();
        assert!(matches!(err, Error::InvalidArgument(_)));
    }
}
