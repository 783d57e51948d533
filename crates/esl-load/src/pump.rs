//! Event producer task
//!
//! The pump is the only concurrent piece of the engine: it blocks on the
//! transport's event reads and forwards each event, in arrival order, into a
//! bounded queue consumed by the dispatch loop. A full queue makes the pump
//! wait; nothing is dropped.

use esl_protocol::Event;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::error::TransportError;
use crate::transport::EventSource;

/// Item carried by the event queue
pub type EventItem = Result<Event, TransportError>;

/// Spawn the event producer
///
/// On a transport error the pump forwards the error once and stops. It also
/// stops when the receiving side is dropped.
pub fn spawn_event_pump<S>(
    mut source: S,
    capacity: usize,
    log_all_events: bool,
) -> (mpsc::Receiver<EventItem>, JoinHandle<()>)
where
    S: EventSource + 'static,
{
    let (tx, rx) = mpsc::channel(capacity);

    let handle = tokio::spawn(async move {
        debug!("Event pump started (queue capacity {})", capacity);
        loop {
            match source.next_event().await {
                Ok(event) => {
                    if log_all_events {
                        info!("Event!\n{}", event.pretty());
                    }
                    if tx.send(Ok(event)).await.is_err() {
                        debug!("Event queue receiver dropped, stopping pump");
                        break;
                    }
                }
                Err(e) => {
                    error!("Event read failed: {}", e);
                    let _ = tx.send(Err(e)).await;
                    break;
                }
            }
        }
    });

    (rx, handle)
}
