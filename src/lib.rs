mod api;
pub use api::{ApiClient, RadioBackend};
mod credentials;
pub use credentials::{CredentialProvider, SessionCredentials, TokenCallback, UserProfile};
mod error;
pub use error::RadioError;
mod events;
pub use events::{decode_frame, RadioEvent};
mod gateway;
pub use gateway::QueueGateway;
mod models;
pub use models::{AddedBy, QueueState, SongUpload, Track};
mod playback;
pub use playback::{
    AudioTransport, EndedAction, PlaybackController, PlaybackMode, PlaybackState, PlayerPhase,
};
mod session;
pub use session::RadioSession;
mod settings;
pub use settings::{ReconnectPolicy, Settings};
mod state;
pub use state::{ConnectionState, ConnectionStatus};
use state::CycleOutcome;
mod store;
pub use store::QueueStore;

use futures::{SinkExt, StreamExt};
use reqwest::Url;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex, PoisonError,
};
use tokio::sync::{broadcast, mpsc, watch, Notify, RwLock};
use tokio::time::{sleep, Duration};
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, trace, warn};

const NO_TOKEN_MESSAGE: &str = "No authentication token available";
const RECONNECT_EXHAUSTED_MESSAGE: &str = "Maximum reconnection attempts reached";

/// Everything the connection manager task needs, moved into the task on spawn.
struct ConnectionManagerContext {
    ws_url: String,
    credentials: Arc<dyn CredentialProvider>,
    event_sender: broadcast::Sender<RadioEvent>,
    outbound_rx: mpsc::UnboundedReceiver<String>,
    shutdown_notify: Arc<Notify>,
    stop_signal: Arc<AtomicBool>,
    state_tx: Arc<watch::Sender<ConnectionStatus>>,
    base_backoff: Duration,
    max_backoff: Duration,
    policy: ReconnectPolicy,
}

/// Owns the single live WebSocket to the Atlantify server and turns its
/// frames into [`RadioEvent`]s.
///
/// The client attaches the current auth token to the connection URL,
/// reconnects with exponential backoff after every close, and publishes
/// its [`ConnectionStatus`] on a watch channel. Events are delivered in
/// receipt order on a broadcast channel.
///
/// # Logging
///
/// This library uses the `tracing` crate for logging. To see logs, install a
/// subscriber in your application:
/// ```no_run
/// use tracing::Level;
/// use tracing_subscriber::FmtSubscriber;
///
/// let subscriber = FmtSubscriber::builder()
///     .with_max_level(Level::DEBUG)
///     .finish();
/// tracing::subscriber::set_global_default(subscriber)
///     .expect("Failed to set tracing subscriber");
/// ```
///
/// - `TRACE`: individual frames and ignored transport signals
/// - `DEBUG`: backoff decisions, fetched snapshots
/// - `INFO`: connects, disconnects, successful mutations
/// - `WARN`: discarded frames, rejected operations, lost connections
/// - `ERROR`: failed API requests and playback failures
pub struct RadioClient {
    ws_url: String,
    settings: Settings,
    credentials: Arc<dyn CredentialProvider>,
    // Taken on teardown so every receiver observes Closed
    event_sender: Mutex<Option<broadcast::Sender<RadioEvent>>>,
    // Per-connect outbound queue into the manager task
    outbound_tx: Mutex<Option<mpsc::UnboundedSender<String>>>,
    // Flag to signal the connection manager task to stop
    stop_signal: Arc<AtomicBool>,
    management_task: RwLock<Option<tokio::task::JoinHandle<()>>>,
    shutdown_notify: Arc<Notify>,
    connection_state_tx: Arc<watch::Sender<ConnectionStatus>>,
    connection_state_rx: watch::Receiver<ConnectionStatus>,
}

impl RadioClient {
    pub fn new(settings: Settings, credentials: Arc<dyn CredentialProvider>) -> Self {
        let (event_tx, _) = broadcast::channel(settings.event_buffer_capacity.max(1));
        let (state_tx, state_rx) = watch::channel(ConnectionStatus::disconnected());

        Self {
            ws_url: settings.ws_url.clone(),
            settings,
            credentials,
            event_sender: Mutex::new(Some(event_tx)),
            outbound_tx: Mutex::new(None),
            stop_signal: Arc::new(AtomicBool::new(false)),
            management_task: RwLock::new(None),
            shutdown_notify: Arc::new(Notify::new()),
            connection_state_tx: Arc::new(state_tx),
            connection_state_rx: state_rx,
        }
    }

    /// Subscribe to push and lifecycle events. After teardown the returned
    /// receiver is already closed.
    pub fn event_receiver(&self) -> broadcast::Receiver<RadioEvent> {
        let guard = self.event_sender.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(sender) => sender.subscribe(),
            None => {
                let (closed_tx, closed_rx) = broadcast::channel(1);
                drop(closed_tx);
                closed_rx
            }
        }
    }

    /// Get the current state of the connection manager.
    pub fn status(&self) -> ConnectionStatus {
        self.connection_state_rx.borrow().clone()
    }

    /// Watch connection status changes (for advisory banners).
    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection_state_rx.clone()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Start the background connection manager.
    ///
    /// Returns once the manager is running; progress is visible through
    /// [`RadioClient::status`]. Without a token the client stays disconnected
    /// with an advisory error and nothing is attempted.
    pub async fn connect(&self) -> Result<(), RadioError> {
        if self.stop_signal.load(Ordering::SeqCst) {
            warn!("connect() called after teardown");
            return Err(RadioError::ConnectionClosed);
        }

        let mut task_guard = self.management_task.write().await;
        if task_guard.as_ref().is_some_and(|h| !h.is_finished()) {
            debug!("Connection manager already running.");
            return Ok(());
        }

        if self.credentials.token().is_none() {
            warn!("Not connecting: {}", NO_TOKEN_MESSAGE);
            self.connection_state_tx.send_replace(ConnectionStatus {
                state: ConnectionState::Disconnected,
                reconnect_attempts: 0,
                last_error: Some(NO_TOKEN_MESSAGE.to_string()),
            });
            return Err(RadioError::MissingToken);
        }

        let Some(event_sender) = self
            .event_sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
        else {
            return Err(RadioError::ConnectionClosed);
        };

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        *self.outbound_tx.lock().unwrap_or_else(PoisonError::into_inner) = Some(outbound_tx);

        let ctx = ConnectionManagerContext {
            ws_url: self.ws_url.clone(),
            credentials: self.credentials.clone(),
            event_sender,
            outbound_rx,
            shutdown_notify: self.shutdown_notify.clone(),
            stop_signal: self.stop_signal.clone(),
            state_tx: self.connection_state_tx.clone(),
            base_backoff: self.settings.base_backoff,
            max_backoff: self.settings.max_backoff,
            policy: self.settings.reconnect_policy,
        };

        info!(url = %self.ws_url, "Starting connection manager");
        *task_guard = Some(tokio::spawn(Self::run_manager(ctx)));
        Ok(())
    }

    async fn run_manager(mut ctx: ConnectionManagerContext) {
        info!("Connection manager task started.");
        let mut attempts: u32 = 0;

        loop {
            if ctx.stop_signal.load(Ordering::SeqCst) {
                info!("Connection manager task stopping due to stop signal.");
                break;
            }

            let outcome = Self::run_cycle(&mut ctx, &mut attempts).await;
            let reason = match &outcome {
                CycleOutcome::Shutdown => break,
                CycleOutcome::Lost(reason) => reason.clone(),
                CycleOutcome::NoToken => NO_TOKEN_MESSAGE.to_string(),
            };

            // Frames accepted but not written are dropped, never replayed
            while ctx.outbound_rx.try_recv().is_ok() {}

            let was_connected = ctx.state_tx.borrow().is_connected();
            if was_connected {
                let _ = ctx.event_sender.send(RadioEvent::Disconnected);
            }
            warn!(reason = %reason, attempts, "Connection lost");

            if matches!(outcome, CycleOutcome::NoToken) {
                ctx.state_tx.send_replace(ConnectionStatus {
                    state: ConnectionState::Disconnected,
                    reconnect_attempts: attempts,
                    last_error: Some(reason),
                });
                break;
            }

            if !ctx.policy.allows(attempts) {
                error!(attempts, "Giving up on reconnecting.");
                ctx.state_tx.send_replace(ConnectionStatus {
                    state: ConnectionState::Disconnected,
                    reconnect_attempts: attempts,
                    last_error: Some(RECONNECT_EXHAUSTED_MESSAGE.to_string()),
                });
                break;
            }

            let delay = calculate_backoff_delay(attempts, ctx.base_backoff, ctx.max_backoff);
            attempts = attempts.saturating_add(1);
            ctx.state_tx.send_replace(ConnectionStatus {
                state: ConnectionState::Disconnected,
                reconnect_attempts: attempts,
                last_error: Some(reason),
            });
            debug!(?delay, attempts, "Backing off before reconnecting");

            tokio::select! {
                biased;
                _ = ctx.shutdown_notify.notified() => {
                    info!("Shutdown requested while waiting to reconnect.");
                    break;
                }
                _ = sleep(delay) => {}
            }
        }

        info!("Connection manager task finished.");
    }

    /// One open-read-close cycle of the socket.
    async fn run_cycle(ctx: &mut ConnectionManagerContext, attempts: &mut u32) -> CycleOutcome {
        // Token is read per cycle so refreshed credentials apply on reconnect
        let Some(token) = ctx.credentials.token() else {
            return CycleOutcome::NoToken;
        };
        let url = match build_ws_url(&ctx.ws_url, &token) {
            Ok(url) => url,
            Err(e) => return CycleOutcome::Lost(e.to_string()),
        };

        ctx.state_tx.send_modify(|status| status.state = ConnectionState::Connecting);
        debug!(url = %ctx.ws_url, "Opening WebSocket");

        let connect_result = tokio::select! {
            biased;
            _ = ctx.shutdown_notify.notified() => {
                info!("Shutdown requested while connecting.");
                return CycleOutcome::Shutdown;
            }
            res = tokio_tungstenite::connect_async(url) => res,
        };
        let ws_stream = match connect_result {
            Ok((stream, _response)) => stream,
            Err(e) => return CycleOutcome::Lost(format!("Failed to connect: {}", e)),
        };

        *attempts = 0;
        ctx.state_tx.send_replace(ConnectionStatus {
            state: ConnectionState::Connected,
            reconnect_attempts: 0,
            last_error: None,
        });
        let _ = ctx.event_sender.send(RadioEvent::Connected);
        info!("WebSocket connected.");

        let (mut ws_tx, mut ws_rx) = ws_stream.split();
        loop {
            tokio::select! {
                biased;

                _ = ctx.shutdown_notify.notified() => {
                    info!("Shutdown requested, closing WebSocket.");
                    if let Err(e) = ws_tx.send(Message::Close(None)).await {
                        debug!(error = %e, "Close frame not delivered");
                    }
                    let _ = ws_tx.close().await;
                    return CycleOutcome::Shutdown;
                }

                Some(text) = ctx.outbound_rx.recv() => {
                    trace!(len = text.len(), "Sending frame");
                    if let Err(e) = ws_tx.send(Message::Text(text.into())).await {
                        warn!(error = %e, "Failed to send frame");
                    }
                }

                frame = ws_rx.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        trace!(len = text.as_str().len(), "Received frame");
                        if let Some(event) = decode_frame(text.as_str()) {
                            let _ = ctx.event_sender.send(event);
                        }
                    }
                    Some(Ok(Message::Binary(bytes))) => {
                        warn!(len = bytes.len(), "Discarding binary frame");
                    }
                    Some(Ok(Message::Close(close))) => {
                        let reason = close
                            .map(|c| format!("Closed by server ({}): {}", u16::from(c.code), c.reason.as_str()))
                            .unwrap_or_else(|| "Closed by server".to_string());
                        return CycleOutcome::Lost(reason);
                    }
                    Some(Ok(_)) => trace!("Control frame"),
                    Some(Err(e)) => return CycleOutcome::Lost(format!("WebSocket error: {}", e)),
                    None => return CycleOutcome::Lost("Connection closed".to_string()),
                },
            }
        }
    }

    /// Fire-and-forget control message. Dropped with a warning unless connected.
    pub fn send(&self, text: &str) {
        if !self.status().is_connected() {
            warn!("Dropping outbound message: not connected.");
            return;
        }
        let guard = self.outbound_tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) if tx.send(text.to_string()).is_ok() => {}
            _ => warn!("Dropping outbound message: connection manager not running."),
        }
    }

    // Helper to stop and await the manager task
    async fn stop_and_await_manager(&self) -> Result<(), RadioError> {
        let was_set = !self.stop_signal.swap(true, Ordering::SeqCst);
        self.shutdown_notify.notify_one();
        debug!("Stop signal sent and notification triggered for manager task.");

        let handle = {
            let mut task_guard = self.management_task.write().await;
            task_guard.take()
        };

        if let Some(h) = handle {
            if was_set {
                debug!("Awaiting management task termination...");
                h.await?;
                debug!("Management task joined.");
            }
        }
        Ok(())
    }

    /// Tear the connection down for good: close the socket, cancel any
    /// pending reconnect and drop every listener. Nothing is delivered after
    /// this returns.
    pub async fn disconnect(&self) -> Result<(), RadioError> {
        info!("Disconnecting radio client.");

        self.outbound_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let result = self.stop_and_await_manager().await;
        self.event_sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        self.connection_state_tx
            .send_replace(ConnectionStatus::disconnected());
        info!("Client disconnected.");
        result
    }
}

impl std::fmt::Debug for RadioClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RadioClient")
            .field("ws_url", &self.ws_url)
            .field("status", &self.status())
            .finish()
    }
}

// Ensure the client cleans up the background task on drop
impl Drop for RadioClient {
    fn drop(&mut self) {
        if !self.stop_signal.swap(true, Ordering::SeqCst) {
            debug!("Dropping RadioClient, signaling connection manager to stop.");
            self.shutdown_notify.notify_one();
        }
    }
}

/// Append the token as a `token` query parameter.
fn build_ws_url(base: &str, token: &str) -> Result<String, RadioError> {
    let mut url = Url::parse(base).map_err(|e| RadioError::InvalidUrl(format!("{}: {}", base, e)))?;
    url.query_pairs_mut().append_pair("token", token);
    Ok(url.into())
}

/// Reconnect delay for the given 0-based attempt:
/// `min(max, base * 2^attempts * (1 + jitter))` with `jitter` in `[0, 1)`.
pub fn backoff_delay(attempts: u32, base: Duration, max: Duration, jitter: f64) -> Duration {
    let jitter = if jitter.is_finite() {
        jitter.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let exponent = attempts.min(62) as i32;
    let secs = base.as_secs_f64() * 2f64.powi(exponent) * (1.0 + jitter);
    if !secs.is_finite() || secs >= max.as_secs_f64() {
        return max;
    }
    Duration::from_secs_f64(secs)
}

/// Helper to calculate backoff delay with jitter
fn calculate_backoff_delay(attempts: u32, base: Duration, max: Duration) -> Duration {
    backoff_delay(attempts, base, max, rand::random::<f64>())
}
