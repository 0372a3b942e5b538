//! Domain events replacing the original board's alert side effects.
//!
//! Subscribers (a sound player, a toast, a log sink) consume these from a
//! broadcast channel; the engine never talks to an output device itself.

use tokio::sync::broadcast;

/// Capacity of the event channel. Old events are dropped for lagging
/// receivers rather than blocking the poller.
const EVENT_CHANNEL_CAPACITY: usize = 100;

/// Notification-worthy changes detected between two queue refreshes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueueEvent {
    /// A patient finished treatment since the previous refresh.
    CompletedTreatment,
    /// Consultations started after the floor was idle.
    ConsultationStarted,
}

/// Fan-out bus for [`QueueEvent`]s.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<QueueEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (tx, _rx) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<QueueEvent> {
        self.tx.subscribe()
    }

    /// Emits an event to all current subscribers. A send with no
    /// subscribers is not an error; the event is simply dropped.
    pub fn emit(&self, event: QueueEvent) {
        if self.tx.send(event).is_err() {
            tracing::trace!(?event, "no subscribers for queue event");
        }
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
