use thiserror::Error;

// Basic error handling with thiserror
#[derive(Error, Debug)]
pub enum RadioError {
    #[error("HTTP request failed: {0}")]
    RequestFailed(#[from] reqwest::Error),

    #[error("JSON parsing failed: {0}")]
    ParseFailed(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("WebSocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),

    #[error("No authentication token available")]
    MissingToken,

    #[error("Not authorized: {0}")]
    Unauthorized(String),

    #[error("API request failed with HTTP {status}: {body}")]
    ApiStatus { status: u16, body: String },

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Connection explicitly closed or terminated")]
    ConnectionClosed,

    #[error("Seeking is not allowed while the radio is driving playback")]
    SeekRejected,

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Task panicked or cancelled")]
    TaskJoinError(#[from] tokio::task::JoinError),
}

// tungstenite::Error is large; keep RadioError small on the happy path
impl From<tokio_tungstenite::tungstenite::Error> for RadioError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        RadioError::WebSocket(Box::new(err))
    }
}

impl RadioError {
    /// Map a transport-level reqwest failure, folding timeouts into [`RadioError::Timeout`].
    pub(crate) fn from_request(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            RadioError::Timeout
        } else {
            RadioError::RequestFailed(err)
        }
    }
}
