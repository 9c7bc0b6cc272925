use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use reqwest::{multipart, Client, Method, RequestBuilder, Response, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::credentials::CredentialProvider;
use crate::error::RadioError;
use crate::models::{AddToQueueRequest, QueueState, SongUpload, ToggleRadioResponse, Track};
use crate::settings::Settings;

/// The radio endpoints the store and gateway depend on.
///
/// `ApiClient` is the production implementation; tests substitute fakes.
pub trait RadioBackend: Send + Sync {
    /// `GET /radio/queue`
    fn fetch_queue(&self) -> BoxFuture<'_, Result<QueueState, RadioError>>;
    /// `POST /radio/queue {trackId}`
    fn add_to_queue<'a>(&'a self, track_id: &'a str) -> BoxFuture<'a, Result<(), RadioError>>;
    /// `DELETE /radio/queue/{trackId}`
    fn remove_from_queue<'a>(&'a self, track_id: &'a str)
        -> BoxFuture<'a, Result<(), RadioError>>;
    /// `POST /radio/skip`
    fn skip_track(&self) -> BoxFuture<'_, Result<(), RadioError>>;
    /// `POST /radio/toggle`, returns the new radio status
    fn toggle_radio(&self) -> BoxFuture<'_, Result<bool, RadioError>>;
}

/// JSON-over-HTTP client for the Atlantify REST API.
pub struct ApiClient {
    client: Client,
    base_url: String,
    credentials: Arc<dyn CredentialProvider>,
}

impl ApiClient {
    pub fn new(settings: &Settings, credentials: Arc<dyn CredentialProvider>) -> Result<Self, RadioError> {
        let client = Client::builder()
            .timeout(settings.request_timeout)
            .connect_timeout(settings.request_timeout)
            .build()?;
        Ok(Self::with_client(client, &settings.api_url, credentials))
    }

    /// Use a preconfigured reqwest client for connection reuse.
    pub fn with_client(
        client: Client,
        base_url: &str,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Base URL with each segment appended percent-encoded.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, RadioError> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| RadioError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| RadioError::InvalidUrl(format!("{} cannot take a path", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn request(&self, method: Method, segments: &[&str]) -> Result<RequestBuilder, RadioError> {
        let builder = self.client.request(method, self.endpoint(segments)?);
        Ok(match self.credentials.token() {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        })
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, RadioError> {
        let response = builder.send().await.map_err(RadioError::from_request)?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                warn!(%status, "Server rejected credentials");
                Err(RadioError::Unauthorized(format!(
                    "server rejected request (HTTP {})",
                    status.as_u16()
                )))
            }
            _ => {
                error!(%status, body = %body, "API request failed");
                Err(RadioError::ApiStatus {
                    status: status.as_u16(),
                    body,
                })
            }
        }
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T, RadioError> {
        let response = self.send(builder).await?;
        let bytes = response.bytes().await.map_err(RadioError::from_request)?;
        serde_json::from_slice(&bytes).map_err(|e| {
            error!(error = %e, body = %String::from_utf8_lossy(&bytes), "Unexpected response body");
            RadioError::ParseFailed(e)
        })
    }

    // --- Song catalog ---

    /// `GET /songs`, optionally filtered by a search term.
    pub async fn list_songs(&self, search: Option<&str>) -> Result<Vec<Track>, RadioError> {
        let mut builder = self.request(Method::GET, &["songs"])?;
        if let Some(term) = search.map(str::trim).filter(|t| !t.is_empty()) {
            builder = builder.query(&[("search", term)]);
        }
        let songs: Vec<Track> = self.send_json(builder).await?;
        debug!(count = songs.len(), "Fetched song catalog");
        Ok(songs)
    }

    /// `GET /songs/{id}`
    pub async fn get_song(&self, song_id: &str) -> Result<Track, RadioError> {
        self.send_json(self.request(Method::GET, &["songs", song_id])?).await
    }

    /// `POST /songs/upload` as multipart form data.
    pub async fn upload_song(&self, upload: SongUpload) -> Result<Track, RadioError> {
        let size = upload.bytes.len();
        let file = multipart::Part::bytes(upload.bytes)
            .file_name(upload.file_name.clone())
            .mime_str(&upload.mime_type)?;
        let form = multipart::Form::new()
            .text("title", upload.title)
            .text("artist", upload.artist)
            .part("file", file);

        debug!(file = %upload.file_name, size, "Uploading song");
        let builder = self.request(Method::POST, &["songs", "upload"])?.multipart(form);
        let song: Track = self.send_json(builder).await?;
        if song.id.is_empty() {
            return Err(RadioError::InvalidResponse(
                "uploaded song came back without an id".to_string(),
            ));
        }
        Ok(song)
    }
}

impl RadioBackend for ApiClient {
    fn fetch_queue(&self) -> BoxFuture<'_, Result<QueueState, RadioError>> {
        async move {
            let state: QueueState =
                self.send_json(self.request(Method::GET, &["radio", "queue"])?).await?;
            debug!(
                queued = state.queue.len(),
                listeners = state.listeners,
                radio = state.is_radio_active,
                "Fetched radio queue"
            );
            Ok(state)
        }
        .boxed()
    }

    fn add_to_queue<'a>(&'a self, track_id: &'a str) -> BoxFuture<'a, Result<(), RadioError>> {
        async move {
            let builder = self
                .request(Method::POST, &["radio", "queue"])?
                .json(&AddToQueueRequest { track_id });
            self.send(builder).await?;
            Ok(())
        }
        .boxed()
    }

    fn remove_from_queue<'a>(
        &'a self,
        track_id: &'a str,
    ) -> BoxFuture<'a, Result<(), RadioError>> {
        async move {
            self.send(self.request(Method::DELETE, &["radio", "queue", track_id])?)
                .await?;
            Ok(())
        }
        .boxed()
    }

    fn skip_track(&self) -> BoxFuture<'_, Result<(), RadioError>> {
        async move {
            self.send(self.request(Method::POST, &["radio", "skip"])?).await?;
            Ok(())
        }
        .boxed()
    }

    fn toggle_radio(&self) -> BoxFuture<'_, Result<bool, RadioError>> {
        async move {
            let response: ToggleRadioResponse =
                self.send_json(self.request(Method::POST, &["radio", "toggle"])?).await?;
            Ok(response.is_radio_active)
        }
        .boxed()
    }
}

impl std::fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .finish()
    }
}
