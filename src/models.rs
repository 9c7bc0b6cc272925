use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who put a track on the radio queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddedBy {
    pub id: String,
    #[serde(default)]
    pub username: String,
}

/// A playable song as seen by the client.
///
/// Tracks are never patched in place: a newer payload carrying the same `id`
/// replaces the old value wholesale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Track {
    pub id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub artist: String,
    /// Playable URL; empty when the server has not attached a stream yet
    #[serde(default)]
    pub url: String,
    /// Length in seconds, unknown until the audio metadata has loaded
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub added_by: Option<AddedBy>,
    #[serde(default)]
    pub added_at: Option<DateTime<Utc>>,
}

impl Track {
    pub fn has_url(&self) -> bool {
        !self.url.trim().is_empty()
    }

    /// Human readable "Artist - Title" label used in logs.
    pub fn display_name(&self) -> String {
        match (self.artist.is_empty(), self.title.is_empty()) {
            (false, false) => format!("{} - {}", self.artist, self.title),
            (true, false) => self.title.clone(),
            _ => self.id.clone(),
        }
    }
}

// Snapshot of the shared radio
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueState {
    #[serde(default)]
    pub current_track: Option<Track>,
    #[serde(default)]
    pub queue: Vec<Track>,
    #[serde(default)]
    pub listeners: u32,
    #[serde(default)]
    pub is_radio_active: bool,
}

impl QueueState {
    /// The track that will play after the current one, if any.
    pub fn next_up(&self) -> Option<&Track> {
        self.queue.first()
    }

    pub fn contains(&self, track_id: &str) -> bool {
        self.queue.iter().any(|t| t.id == track_id)
    }

    /// Checks the server-side guarantee that the current track is not also queued.
    pub fn queue_excludes_current(&self) -> bool {
        match &self.current_track {
            Some(current) => !self.contains(&current.id),
            None => true,
        }
    }
}

// Request/response bodies for the radio endpoints
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct AddToQueueRequest<'a> {
    pub track_id: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct ToggleRadioResponse {
    pub is_radio_active: bool,
}

/// Audio file plus metadata for `POST /songs/upload`.
#[derive(Debug, Clone)]
pub struct SongUpload {
    pub title: String,
    pub artist: String,
    pub file_name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl SongUpload {
    pub fn new(title: &str, artist: &str, file_name: &str, bytes: Vec<u8>) -> Self {
        let mime_type = match file_name.rsplit('.').next().map(str::to_ascii_lowercase) {
            Some(ext) if ext == "mp3" => "audio/mpeg",
            Some(ext) if ext == "wav" => "audio/wav",
            Some(ext) if ext == "flac" => "audio/flac",
            Some(ext) if ext == "ogg" => "audio/ogg",
            Some(ext) if ext == "m4a" => "audio/mp4",
            _ => "application/octet-stream",
        };
        Self {
            title: title.to_string(),
            artist: artist.to_string(),
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            bytes,
        }
    }
}
