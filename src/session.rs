use std::sync::{Arc, Mutex as StdMutex, PoisonError};

use tokio::sync::{broadcast::error::RecvError, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::api::{ApiClient, RadioBackend};
use crate::credentials::CredentialProvider;
use crate::error::RadioError;
use crate::events::RadioEvent;
use crate::gateway::QueueGateway;
use crate::models::QueueState;
use crate::playback::{AudioTransport, EndedAction, PlaybackController, PlaybackMode};
use crate::settings::Settings;
use crate::store::QueueStore;
use crate::RadioClient;

/// Wires the four components of a listening session together.
///
/// Push events flow client → store → player; a radio track that ends asks
/// the gateway to skip; every successful mutation is followed by a full
/// store refresh. Built once per session, torn down with [`RadioSession::shutdown`].
pub struct RadioSession<T: AudioTransport + 'static> {
    client: Arc<RadioClient>,
    store: QueueStore,
    gateway: QueueGateway,
    player: Arc<Mutex<PlaybackController<T>>>,
    dispatcher: StdMutex<Option<JoinHandle<()>>>,
}

impl<T: AudioTransport + 'static> RadioSession<T> {
    pub fn new(
        client: Arc<RadioClient>,
        store: QueueStore,
        gateway: QueueGateway,
        player: PlaybackController<T>,
    ) -> Self {
        Self {
            client,
            store,
            gateway,
            player: Arc::new(Mutex::new(player)),
            dispatcher: StdMutex::new(None),
        }
    }

    /// Build the production stack (REST client, WebSocket client, store,
    /// gateway and a radio-mode player) from settings.
    pub fn from_settings(
        settings: Settings,
        credentials: Arc<dyn CredentialProvider>,
        transport: T,
    ) -> Result<Self, RadioError> {
        let backend: Arc<dyn RadioBackend> = Arc::new(ApiClient::new(&settings, credentials.clone())?);
        let store = QueueStore::new(backend.clone(), settings.event_buffer_capacity);
        let gateway = QueueGateway::new(backend, credentials.clone());
        let client = Arc::new(RadioClient::new(settings, credentials));
        let player = PlaybackController::new(transport, PlaybackMode::Radio);
        Ok(Self::new(client, store, gateway, player))
    }

    pub fn client(&self) -> &Arc<RadioClient> {
        &self.client
    }

    pub fn store(&self) -> &QueueStore {
        &self.store
    }

    pub fn gateway(&self) -> &QueueGateway {
        &self.gateway
    }

    /// Shared handle to the player, for UI controls and transport signals.
    pub fn player(&self) -> Arc<Mutex<PlaybackController<T>>> {
        self.player.clone()
    }

    /// Start dispatching push events, open the connection and load the
    /// initial snapshot.
    ///
    /// A missing token only skips the live connection; the queue snapshot is
    /// still fetched since reading it is not gated.
    pub async fn start(&self) -> Result<QueueState, RadioError> {
        self.spawn_dispatcher();

        match self.client.connect().await {
            Ok(()) => {}
            Err(RadioError::MissingToken) => {
                warn!("Starting without live updates: not signed in.");
            }
            Err(e) => return Err(e),
        }

        let state = self.store.refresh().await?;
        self.player.lock().await.sync_with_queue(&state);
        info!(
            queued = state.queue.len(),
            listeners = state.listeners,
            "Radio session started"
        );
        Ok(state)
    }

    fn spawn_dispatcher(&self) {
        let mut guard = self.dispatcher.lock().unwrap_or_else(PoisonError::into_inner);
        if guard.as_ref().is_some_and(|h| !h.is_finished()) {
            return;
        }

        // Subscribe before connecting so the first events are not missed
        let mut events = self.client.event_receiver();
        let store = self.store.clone();
        let player = self.player.clone();

        *guard = Some(tokio::spawn(async move {
            debug!("Session dispatcher started.");
            loop {
                match events.recv().await {
                    Ok(event) => Self::dispatch(&store, &player, event).await,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "Dispatcher lagged behind, resynchronizing.");
                        Self::resync(&store, &player).await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            debug!("Session dispatcher finished.");
        }));
    }

    async fn dispatch(
        store: &QueueStore,
        player: &Arc<Mutex<PlaybackController<T>>>,
        event: RadioEvent,
    ) {
        match event {
            RadioEvent::Connected => {
                // Pushes sent while we were away are lost; catch up
                Self::resync(store, player).await;
            }
            RadioEvent::Disconnected => debug!("Live updates paused until reconnect."),
            RadioEvent::ServerError(message) => warn!(message = %message, "Server reported an error"),
            RadioEvent::TrackChange(_) | RadioEvent::RadioStatusChange(_) => {
                store.apply(&event);
                let snapshot = store.snapshot();
                player.lock().await.sync_with_queue(&snapshot);
            }
            RadioEvent::QueueUpdate(_) | RadioEvent::ListenersUpdate(_) => {
                store.apply(&event);
            }
        }
    }

    async fn resync(store: &QueueStore, player: &Arc<Mutex<PlaybackController<T>>>) {
        match store.refresh().await {
            Ok(state) => player.lock().await.sync_with_queue(&state),
            Err(e) => warn!(error = %e, "Queue refresh failed"),
        }
    }

    /// Report that the transport finished `track_id`.
    ///
    /// In radio mode this asks the server to advance. Listeners without admin
    /// rights cannot skip; they simply wait for the server's next TRACK_CHANGE.
    pub async fn track_ended(&self, track_id: &str) -> Result<EndedAction, RadioError> {
        let action = self.player.lock().await.on_ended(track_id);
        if action == EndedAction::RequestSkip {
            match self.gateway.skip_track().await {
                Ok(()) => {
                    let state = self.store.refresh().await?;
                    self.player.lock().await.sync_with_queue(&state);
                }
                Err(RadioError::Unauthorized(reason)) => {
                    debug!(reason = %reason, "Not skipping; waiting for the server to advance.");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(action)
    }

    /// Switch between mirroring the radio and local playback.
    pub async fn set_radio_mode(&self, enabled: bool) {
        let mode = if enabled {
            PlaybackMode::Radio
        } else {
            PlaybackMode::Local
        };
        let mut player = self.player.lock().await;
        player.set_mode(mode);
        if enabled {
            player.sync_with_queue(&self.store.snapshot());
        }
    }

    // --- Mutations, each followed by a refresh ---

    pub async fn add_to_queue(&self, track_id: &str) -> Result<QueueState, RadioError> {
        self.gateway.add_to_queue(track_id).await?;
        self.refresh_after_mutation().await
    }

    pub async fn remove_from_queue(&self, track_id: &str) -> Result<QueueState, RadioError> {
        self.gateway.remove_from_queue(track_id).await?;
        self.refresh_after_mutation().await
    }

    pub async fn skip_track(&self) -> Result<QueueState, RadioError> {
        self.gateway.skip_track().await?;
        self.refresh_after_mutation().await
    }

    pub async fn toggle_radio_status(&self) -> Result<QueueState, RadioError> {
        self.gateway.toggle_radio_status().await?;
        self.refresh_after_mutation().await
    }

    async fn refresh_after_mutation(&self) -> Result<QueueState, RadioError> {
        let state = self.store.refresh().await?;
        self.player.lock().await.sync_with_queue(&state);
        Ok(state)
    }

    /// End the session: tear down the connection and wait for the
    /// dispatcher to drain.
    pub async fn shutdown(&self) -> Result<(), RadioError> {
        info!("Shutting down radio session.");
        self.client.disconnect().await?;
        let handle = self
            .dispatcher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(handle) = handle {
            handle.await?;
        }
        Ok(())
    }
}
