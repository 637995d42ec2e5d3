// Session event hub
// Explicit subscription interface for session notifications

use tokio::sync::broadcast::{self, error::RecvError, error::TryRecvError};

use super::types::SessionEvent;

/// Default number of buffered events per subscriber
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Largest accepted buffer; the channel allocates every slot up front
pub const MAX_EVENT_CAPACITY: usize = 4096;

/// Broadcasts [`SessionEvent`]s to every live subscription.
///
/// Cloning yields another handle to the same hub. Events are ephemeral: a
/// subscription only sees events emitted after it was created, and emitting
/// with no subscribers is not an error.
#[derive(Clone, Debug)]
pub struct SessionEvents {
    tx: broadcast::Sender<SessionEvent>,
}

impl SessionEvents {
    /// Capacity is clamped to `1..=MAX_EVENT_CAPACITY`
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.clamp(1, MAX_EVENT_CAPACITY));
        Self { tx }
    }

    pub fn subscribe(&self) -> SessionSubscription {
        SessionSubscription {
            rx: self.tx.subscribe(),
        }
    }

    pub fn listener_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Deliver an event, returning how many subscriptions received it
    pub(crate) fn emit(&self, event: SessionEvent) -> usize {
        let name = event.name();
        match self.tx.send(event) {
            Ok(delivered) => {
                tracing::debug!(event = name, listeners = delivered, "Session event emitted");
                delivered
            }
            Err(_) => {
                tracing::debug!(event = name, "Session event emitted with no listeners");
                0
            }
        }
    }
}

impl Default for SessionEvents {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

/// Receiving end of a [`SessionEvents`] hub
#[derive(Debug)]
pub struct SessionSubscription {
    rx: broadcast::Receiver<SessionEvent>,
}

impl SessionSubscription {
    /// Wait for the next event. Returns `None` once the hub is gone.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Session subscriber lagged, dropping old events");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    }

    /// Take an already delivered event without waiting
    pub fn try_recv(&mut self) -> Option<SessionEvent> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(TryRecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "Session subscriber lagged, dropping old events");
                }
                Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => return None,
            }
        }
    }
}
