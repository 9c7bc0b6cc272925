use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;
use tracing::{debug, trace, warn};

use crate::api::RadioBackend;
use crate::error::RadioError;
use crate::events::RadioEvent;
use crate::models::QueueState;

/// Holds the client's view of the shared radio.
///
/// Two writers feed it: `refresh()` replaces the whole state from a REST
/// snapshot, and `apply()` merges one push message into the single field
/// that message owns. Every change is broadcast to subscribers.
#[derive(Clone)]
pub struct QueueStore {
    current: Arc<RwLock<QueueState>>,
    backend: Arc<dyn RadioBackend>,
    change_sender: broadcast::Sender<QueueState>,
}

impl QueueStore {
    pub fn new(backend: Arc<dyn RadioBackend>, capacity: usize) -> Self {
        let (change_tx, _) = broadcast::channel(capacity.max(1));
        Self {
            current: Arc::new(RwLock::new(QueueState::default())),
            backend,
            change_sender: change_tx,
        }
    }

    /// Get a channel for receiving every state change. Drop the receiver to unsubscribe.
    pub fn subscribe(&self) -> broadcast::Receiver<QueueState> {
        self.change_sender.subscribe()
    }

    pub fn snapshot(&self) -> QueueState {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Fetch the full state and replace the local copy wholesale.
    ///
    /// Push messages applied while the fetch was in flight are overwritten;
    /// the server is authoritative and later pushes converge again. On error
    /// the local state is left untouched.
    pub async fn refresh(&self) -> Result<QueueState, RadioError> {
        let fetched = self.backend.fetch_queue().await?;
        if !fetched.queue_excludes_current() {
            warn!("Server snapshot lists the current track in the queue as well.");
        }
        {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *guard = fetched.clone();
        }
        debug!(queued = fetched.queue.len(), "Queue state refreshed");
        self.publish(fetched.clone());
        Ok(fetched)
    }

    /// Merge a push event. Returns true if the event owned a field and was applied.
    pub fn apply(&self, event: &RadioEvent) -> bool {
        let updated = {
            let mut state = self.current.write().unwrap_or_else(PoisonError::into_inner);
            match event {
                RadioEvent::QueueUpdate(queue) => state.queue = queue.clone(),
                RadioEvent::TrackChange(track) => state.current_track = track.clone(),
                RadioEvent::ListenersUpdate(listeners) => state.listeners = *listeners,
                RadioEvent::RadioStatusChange(active) => state.is_radio_active = *active,
                RadioEvent::ServerError(_)
                | RadioEvent::Connected
                | RadioEvent::Disconnected => return false,
            }
            state.clone()
        };
        trace!(kind = event.event_type(), "Applied push update");
        self.publish(updated);
        true
    }

    /// Reset to the empty session state (e.g. on sign-out).
    pub fn clear(&self) {
        {
            let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
            *guard = QueueState::default();
        }
        self.publish(QueueState::default());
    }

    #[inline]
    fn publish(&self, state: QueueState) {
        // No subscribers is fine
        let _ = self.change_sender.send(state);
    }
}

impl std::fmt::Debug for QueueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueStore")
            .field("current", &self.snapshot())
            .finish()
    }
}
