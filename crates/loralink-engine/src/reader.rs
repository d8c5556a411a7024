/*!
 * Blocking reader task, one per connection.
 */
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, error, trace};
use uuid::Uuid;

use loralink_core::logging::session_span;
use loralink_devices::{Lines, SerialLink, StopFlag};

use crate::event::{ClassifiedLine, EngineEvent};
use crate::session::Shared;

/// Read lines from `link` until `stop` is raised, classifying each one.
///
/// A read failure, or the link closing underneath the reader, tears the
/// session down.
pub(crate) fn spawn(
    shared: Arc<Shared>,
    session: Uuid,
    link: Arc<dyn SerialLink>,
    stop: StopFlag,
    period: Duration,
) -> JoinHandle<()> {
    let span = session_span(link.port(), &session.to_string());
    tokio::task::spawn_blocking(move || {
        let _entered = span.enter();
        debug!("Reader started");

        let lines = match Lines::new(link, stop.clone(), period) {
            Ok(lines) => lines,
            Err(e) => {
                shared.lose(session, &e.to_string());
                return;
            }
        };

        for item in lines {
            match item {
                Ok(line) => {
                    trace!("RX: {}", line);
                    shared.emit(EngineEvent::Inbound(ClassifiedLine::new(line)));
                }
                Err(e) => {
                    error!("Read failed: {}", e);
                    shared.lose(session, &format!("read failed: {}", e));
                    return;
                }
            }
        }

        if !stop.is_raised() {
            shared.lose(session, "port closed");
        }
        debug!("Reader stopped");
    })
}
