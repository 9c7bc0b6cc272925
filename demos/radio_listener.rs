use std::error::Error;
use std::sync::Arc;

use tracing::{error, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use atlantify_radio::{AudioTransport, RadioSession, SessionCredentials, Settings, UserProfile};

// Stand-in for a real audio element: only logs what it is asked to do
struct LoggingTransport;

impl AudioTransport for LoggingTransport {
    fn set_source(&mut self, url: &str) {
        info!("[audio] source = {}", url);
    }

    fn load(&mut self) {
        info!("[audio] load");
    }

    fn play(&mut self) {
        info!("[audio] play");
    }

    fn pause(&mut self) {
        info!("[audio] pause");
    }

    fn seek(&mut self, position: f64) {
        info!("[audio] seek to {:.1}s", position);
    }

    fn set_volume(&mut self, volume: f32) {
        info!("[audio] volume = {:.2}", volume);
    }

    fn set_muted(&mut self, muted: bool) {
        info!("[audio] muted = {}", muted);
    }
}

/// Follows the shared Atlantify radio and prints every queue change.
///
/// Reads `ATLANTIFY_TOKEN` (and optionally `ATLANTIFY_ADMIN=1`) plus the usual
/// connection settings from the environment or a `.env` file.
#[tokio::main]
async fn main() -> Result<(), Box<dyn Error + Send + Sync>> {
    let mut log_level = Level::INFO;
    for arg in std::env::args().skip(1) {
        match arg.as_str() {
            "--trace" | "-t" => log_level = Level::TRACE,
            "--debug" | "-d" => log_level = Level::DEBUG,
            "--warn" | "-w" => log_level = Level::WARN,
            _ => {}
        }
    }

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();
    tracing::subscriber::set_global_default(subscriber).expect("Failed to set tracing subscriber");

    let settings = Settings::from_env();
    info!("API: {}  WebSocket: {}", settings.api_url, settings.ws_url);

    let credentials = Arc::new(SessionCredentials::new());
    match std::env::var("ATLANTIFY_TOKEN") {
        Ok(token) => {
            let is_admin = std::env::var("ATLANTIFY_ADMIN").is_ok_and(|v| v == "1");
            credentials.sign_in(
                &token,
                UserProfile {
                    id: "demo".to_string(),
                    username: "radio_listener".to_string(),
                    is_admin,
                },
            );
        }
        Err(_) => warn!("ATLANTIFY_TOKEN not set; only the initial snapshot will be shown."),
    }

    let session = RadioSession::from_settings(settings, credentials, LoggingTransport)?;
    let mut changes = session.store().subscribe();

    match session.start().await {
        Ok(state) => info!(
            "Now playing: {} | {} queued | {} listening",
            state
                .current_track
                .as_ref()
                .map(|t| t.display_name())
                .unwrap_or_else(|| "nothing".to_string()),
            state.queue.len(),
            state.listeners
        ),
        Err(e) => {
            error!("Failed to start radio session: {}", e);
            return Ok(());
        }
    }

    let mut status = session.client().status_receiver();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            changed = changes.recv() => match changed {
                Ok(state) => {
                    let next = state.next_up().map(|t| t.display_name()).unwrap_or_default();
                    info!(
                        "Queue: {} tracks, next up: '{}', radio {}",
                        state.queue.len(),
                        next,
                        if state.is_radio_active { "on" } else { "off" }
                    );
                }
                Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => warn!("Skipped {} updates", n),
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            },
            Ok(()) = status.changed() => {
                let current = status.borrow_and_update().clone();
                info!(
                    "Connection {} (attempt {}){}",
                    current.state.as_str(),
                    current.reconnect_attempts,
                    current.last_error.map(|e| format!(": {}", e)).unwrap_or_default()
                );
            }
        }
    }

    session.shutdown().await?;
    info!("Bye.");
    Ok(())
}
