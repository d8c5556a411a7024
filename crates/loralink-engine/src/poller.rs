/*!
 * Delayed one-shot status polls.
 *
 * A poll asks the device for `wifi_status` and then `http_status`. Polls run
 * once; nothing re-polls on a timer, so the mirrored status can go stale
 * until the next trigger. Pending polls belong to a session and are aborted
 * when it ends.
 */
use std::sync::Arc;
use std::time::Duration;

use tokio::time;
use tracing::debug;
use uuid::Uuid;

use loralink_devices::protocol::{Command, STATUS_QUERIES};

use crate::session::Shared;

/// Schedules status polls for the current session
#[derive(Clone)]
pub struct Poller {
    shared: Arc<Shared>,
}

impl std::fmt::Debug for Poller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Poller")
            .field("pending", &self.pending())
            .finish()
    }
}

impl Poller {
    pub(crate) fn new(shared: Arc<Shared>) -> Self {
        Self { shared }
    }

    /// Poll session `session` after `delay`
    pub(crate) fn schedule(&self, session: Uuid, delay: Duration) {
        let shared = self.shared.clone();
        let poll = tokio::spawn(async move {
            if !delay.is_zero() {
                time::sleep(delay).await;
            }
            for query in STATUS_QUERIES {
                if let Err(e) = shared.send(Some(session), &Command::Get(query)).await {
                    debug!("Status poll dropped: {}", e);
                    return;
                }
            }
        });
        self.shared.track_poll(session, poll);
    }

    /// Number of polls that have not run yet
    pub fn pending(&self) -> usize {
        self.shared.pending_polls()
    }
}
