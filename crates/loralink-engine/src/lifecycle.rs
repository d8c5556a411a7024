/*!
 * Connection lifecycle.
 *
 * A connection moves Disconnected → Connecting → Settling → Syncing → Ready
 * and may drop back to Disconnected from any phase.
 */
use std::fmt;

use serde::{Deserialize, Serialize};

/// Where a connection is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum ConnectionPhase {
    /// No port is open
    #[default]
    Disconnected,
    /// The port is being opened
    Connecting,
    /// The port is open and the device is booting
    Settling,
    /// Configuration queries are being issued
    Syncing,
    /// The sync sequence was issued
    Ready,
}

impl ConnectionPhase {
    /// Whether moving from `self` to `next` is allowed
    pub fn can_advance_to(self, next: ConnectionPhase) -> bool {
        use ConnectionPhase::*;
        matches!(
            (self, next),
            (_, Disconnected)
                | (Disconnected, Connecting)
                | (Connecting, Settling)
                | (Settling, Syncing)
                | (Syncing, Ready)
        )
    }
}

impl fmt::Display for ConnectionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionPhase::Disconnected => "disconnected",
            ConnectionPhase::Connecting => "connecting",
            ConnectionPhase::Settling => "settling",
            ConnectionPhase::Syncing => "syncing",
            ConnectionPhase::Ready => "ready",
        };
        f.write_str(name)
    }
}
