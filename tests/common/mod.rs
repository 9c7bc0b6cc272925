#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use atlantify_radio::{
    AudioTransport, CredentialProvider, QueueState, RadioBackend, RadioError, Track,
};
use futures::future::BoxFuture;
use futures::FutureExt;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{accept_hdr_async, WebSocketStream};

pub fn track(id: &str) -> Track {
    Track {
        id: id.to_string(),
        title: format!("Title {id}"),
        artist: "Test Artist".to_string(),
        url: format!("https://cdn.example.com/{id}.mp3"),
        duration: Some(180.0),
        added_by: None,
        added_at: None,
    }
}

// Credentials with a fixed token and capability
pub struct StaticCredentials {
    token: Option<String>,
    admin: bool,
}

impl StaticCredentials {
    pub fn admin() -> Arc<Self> {
        Arc::new(Self {
            token: Some("admin-token".to_string()),
            admin: true,
        })
    }

    pub fn listener() -> Arc<Self> {
        Arc::new(Self {
            token: Some("listener-token".to_string()),
            admin: false,
        })
    }

    pub fn anonymous() -> Arc<Self> {
        Arc::new(Self {
            token: None,
            admin: false,
        })
    }

    pub fn with(token: Option<&str>, admin: bool) -> Arc<Self> {
        Arc::new(Self {
            token: token.map(str::to_string),
            admin,
        })
    }
}

impl CredentialProvider for StaticCredentials {
    fn token(&self) -> Option<String> {
        self.token.clone()
    }

    fn is_admin(&self) -> bool {
        self.admin
    }
}

/// In-memory radio server. Records every call as "METHOD path [arg]".
#[derive(Default)]
pub struct FakeBackend {
    pub state: Mutex<QueueState>,
    pub calls: Mutex<Vec<String>>,
    pub fail_requests: AtomicBool,
}

impl FakeBackend {
    pub fn with_state(state: QueueState) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            ..Default::default()
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn set_state(&self, state: QueueState) {
        *self.state.lock().unwrap() = state;
    }

    pub fn fail(&self, fail: bool) {
        self.fail_requests.store(fail, Ordering::SeqCst);
    }

    fn record(&self, call: String) -> Result<(), RadioError> {
        self.calls.lock().unwrap().push(call);
        if self.fail_requests.load(Ordering::SeqCst) {
            Err(RadioError::ApiStatus {
                status: 503,
                body: "unavailable".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl RadioBackend for FakeBackend {
    fn fetch_queue(&self) -> BoxFuture<'_, Result<QueueState, RadioError>> {
        async move {
            self.record("GET /radio/queue".to_string())?;
            Ok(self.state.lock().unwrap().clone())
        }
        .boxed()
    }

    fn add_to_queue<'a>(&'a self, track_id: &'a str) -> BoxFuture<'a, Result<(), RadioError>> {
        async move {
            self.record(format!("POST /radio/queue {track_id}"))?;
            self.state.lock().unwrap().queue.push(track(track_id));
            Ok(())
        }
        .boxed()
    }

    fn remove_from_queue<'a>(
        &'a self,
        track_id: &'a str,
    ) -> BoxFuture<'a, Result<(), RadioError>> {
        async move {
            self.record(format!("DELETE /radio/queue/{track_id}"))?;
            self.state.lock().unwrap().queue.retain(|t| t.id != track_id);
            Ok(())
        }
        .boxed()
    }

    fn skip_track(&self) -> BoxFuture<'_, Result<(), RadioError>> {
        async move {
            self.record("POST /radio/skip".to_string())?;
            let mut state = self.state.lock().unwrap();
            state.current_track = if state.queue.is_empty() {
                None
            } else {
                Some(state.queue.remove(0))
            };
            Ok(())
        }
        .boxed()
    }

    fn toggle_radio(&self) -> BoxFuture<'_, Result<bool, RadioError>> {
        async move {
            self.record("POST /radio/toggle".to_string())?;
            let mut state = self.state.lock().unwrap();
            state.is_radio_active = !state.is_radio_active;
            Ok(state.is_radio_active)
        }
        .boxed()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TransportCall {
    SetSource(String),
    Load,
    Play,
    Pause,
    Seek(f64),
    SetVolume(f32),
    SetMuted(bool),
}

/// Transport that only records what the controller asked of it.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    pub log: Arc<Mutex<Vec<TransportCall>>>,
}

impl RecordingTransport {
    pub fn calls(&self) -> Vec<TransportCall> {
        self.log.lock().unwrap().clone()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

impl AudioTransport for RecordingTransport {
    fn set_source(&mut self, url: &str) {
        self.log.lock().unwrap().push(TransportCall::SetSource(url.to_string()));
    }

    fn load(&mut self) {
        self.log.lock().unwrap().push(TransportCall::Load);
    }

    fn play(&mut self) {
        self.log.lock().unwrap().push(TransportCall::Play);
    }

    fn pause(&mut self) {
        self.log.lock().unwrap().push(TransportCall::Pause);
    }

    fn seek(&mut self, position: f64) {
        self.log.lock().unwrap().push(TransportCall::Seek(position));
    }

    fn set_volume(&mut self, volume: f32) {
        self.log.lock().unwrap().push(TransportCall::SetVolume(volume));
    }

    fn set_muted(&mut self, muted: bool) {
        self.log.lock().unwrap().push(TransportCall::SetMuted(muted));
    }
}

pub const WAIT: Duration = Duration::from_secs(5);

pub type ServerSocket = WebSocketStream<TcpStream>;

/// Local WebSocket endpoint handing every accepted socket (and its request
/// URI) to the test.
pub struct TestServer {
    pub url: String,
    connections: mpsc::UnboundedReceiver<(ServerSocket, String)>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let (tx, rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let uri = Arc::new(Mutex::new(String::new()));
                let uri_slot = uri.clone();
                let callback = move |req: &Request, resp: Response| -> Result<Response, ErrorResponse> {
                    *uri_slot.lock().unwrap() = req.uri().to_string();
                    Ok(resp)
                };
                if let Ok(socket) = accept_hdr_async(stream, callback).await {
                    let uri = uri.lock().unwrap().clone();
                    if tx.send((socket, uri)).is_err() {
                        break;
                    }
                }
            }
        });

        Self {
            url: format!("ws://{}/ws", addr),
            connections: rx,
        }
    }

    pub async fn accept(&mut self) -> (ServerSocket, String) {
        timeout(WAIT, self.connections.recv())
            .await
            .expect("no connection within timeout")
            .expect("server stopped")
    }

    pub async fn assert_no_connection(&mut self, within: Duration) {
        assert!(
            timeout(within, self.connections.recv()).await.is_err(),
            "unexpected connection attempt"
        );
    }
}

pub fn text(frame: &str) -> Message {
    Message::Text(frame.to_string().into())
}
