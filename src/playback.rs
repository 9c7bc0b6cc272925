use std::collections::VecDeque;

use tokio::sync::watch;
use tracing::{debug, error, info, trace, warn};

use crate::error::RadioError;
use crate::models::{QueueState, Track};

/// The audio resource the controller drives (an `<audio>` element, a native
/// player, ...). Only the controller may call these.
///
/// Transport signals flow back through the controller's `on_*` methods,
/// tagged with the id of the track they were produced for.
pub trait AudioTransport: Send {
    fn set_source(&mut self, url: &str);
    fn load(&mut self);
    fn play(&mut self);
    fn pause(&mut self);
    fn seek(&mut self, position: f64);
    fn set_volume(&mut self, volume: f32);
    fn set_muted(&mut self, muted: bool);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayerPhase {
    Idle,
    Loading,
    Ready,
    Playing,
    Paused,
    Error,
}

impl PlayerPhase {
    pub fn as_str(self) -> &'static str {
        match self {
            PlayerPhase::Idle => "IDLE",
            PlayerPhase::Loading => "LOADING",
            PlayerPhase::Ready => "READY",
            PlayerPhase::Playing => "PLAYING",
            PlayerPhase::Paused => "PAUSED",
            PlayerPhase::Error => "ERROR",
        }
    }
}

/// Where the desired track comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlaybackMode {
    /// Mirror the server's current track; the server owns progression
    Radio,
    /// Play locally selected tracks and the local queue
    Local,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackState {
    pub phase: PlayerPhase,
    pub track_id: Option<String>,
    pub current_time: f64,
    /// Unknown until metadata has loaded
    pub duration: Option<f64>,
    pub volume: f32,
    pub is_muted: bool,
    pub is_playing: bool,
    pub is_buffering: bool,
    /// Advisory message for the last playback failure
    pub error: Option<String>,
}

impl Default for PlaybackState {
    fn default() -> Self {
        Self {
            phase: PlayerPhase::Idle,
            track_id: None,
            current_time: 0.0,
            duration: None,
            volume: 1.0,
            is_muted: false,
            is_playing: false,
            is_buffering: false,
            error: None,
        }
    }
}

impl PlaybackState {
    /// Calculate the progress percentage (0-100)
    pub fn progress_percentage(&self) -> f64 {
        match self.duration {
            Some(duration) if duration > 0.0 => (self.current_time / duration * 100.0).min(100.0),
            _ => 0.0,
        }
    }
}

/// What the caller has to do after the transport reported the end of a track.
#[derive(Debug, Clone, PartialEq)]
pub enum EndedAction {
    /// The signal belonged to a superseded track
    Ignored,
    /// Radio mode: ask the server to advance, then wait for its TRACK_CHANGE
    RequestSkip,
    /// Local mode: the next local track was promoted and is loading
    Advanced(Track),
    /// Local mode with nothing left to play
    Stopped,
}

/// Keeps one audio transport converged on the desired track.
pub struct PlaybackController<T: AudioTransport> {
    transport: T,
    mode: PlaybackMode,
    desired: Option<Track>,
    autoplay: bool,
    local_queue: VecDeque<Track>,
    state: PlaybackState,
    state_tx: watch::Sender<PlaybackState>,
}

impl<T: AudioTransport> PlaybackController<T> {
    pub fn new(transport: T, mode: PlaybackMode) -> Self {
        let (state_tx, _) = watch::channel(PlaybackState::default());
        Self {
            transport,
            mode,
            desired: None,
            autoplay: false,
            local_queue: VecDeque::new(),
            state: PlaybackState::default(),
            state_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state_tx.subscribe()
    }

    pub fn state(&self) -> &PlaybackState {
        &self.state
    }

    pub fn mode(&self) -> PlaybackMode {
        self.mode
    }

    pub fn desired_track(&self) -> Option<&Track> {
        self.desired.as_ref()
    }

    pub fn set_mode(&mut self, mode: PlaybackMode) {
        if self.mode != mode {
            info!(?mode, "Playback mode changed");
            self.mode = mode;
        }
    }

    // --- Desired track ---

    /// Converge on `track`. A track with the id already desired is a no-op
    /// (apart from honouring a new autoplay request); `None` stops playback.
    pub fn set_desired_track(&mut self, track: Option<Track>, autoplay: bool) {
        let Some(track) = track else {
            self.stop();
            return;
        };

        if self.is_current(&track.id) {
            trace!(track_id = %track.id, "Desired track unchanged");
            if autoplay && self.state.phase == PlayerPhase::Ready {
                self.play();
            } else if autoplay && self.state.phase == PlayerPhase::Loading {
                self.autoplay = true;
            }
            return;
        }

        debug!(track = %track.display_name(), autoplay, "New desired track");
        let was_playing = self.state.is_playing;
        self.autoplay = autoplay;
        self.state.track_id = Some(track.id.clone());
        self.state.current_time = 0.0;
        self.state.duration = None;
        self.state.is_playing = false;
        self.state.error = None;

        if !track.has_url() {
            warn!(track_id = %track.id, "Desired track has no playable URL");
            if was_playing {
                self.transport.pause();
            }
            self.state.phase = PlayerPhase::Error;
            self.state.is_buffering = false;
            self.state.error = Some("track has no playable URL".to_string());
        } else {
            self.transport.set_source(&track.url);
            self.transport.load();
            self.state.phase = PlayerPhase::Loading;
            self.state.is_buffering = true;
        }

        self.desired = Some(track);
        self.publish();
    }

    /// Select and start a track locally. Leaves radio mode if it was active.
    pub fn play_track(&mut self, track: Track) {
        self.set_mode(PlaybackMode::Local);
        self.set_desired_track(Some(track), true);
    }

    /// Follow the server's current track while in radio mode.
    ///
    /// A `None` current track stops playback; no local track is picked in its
    /// place because the server will announce the next one.
    pub fn sync_with_queue(&mut self, queue: &QueueState) {
        if self.mode != PlaybackMode::Radio {
            return;
        }
        self.set_desired_track(queue.current_track.clone(), queue.is_radio_active);
    }

    fn stop(&mut self) {
        if self.desired.is_none() && self.state.phase == PlayerPhase::Idle {
            return;
        }
        debug!("Stopping playback, no desired track");
        if self.state.is_playing || self.state.phase == PlayerPhase::Loading {
            self.transport.pause();
        }
        self.desired = None;
        self.autoplay = false;
        self.state.phase = PlayerPhase::Idle;
        self.state.track_id = None;
        self.state.current_time = 0.0;
        self.state.duration = None;
        self.state.is_playing = false;
        self.state.is_buffering = false;
        self.publish();
    }

    // --- Transport controls ---

    pub fn play(&mut self) {
        match self.state.phase {
            PlayerPhase::Ready | PlayerPhase::Paused => {
                self.transport.play();
                self.state.phase = PlayerPhase::Playing;
                self.state.is_playing = true;
                self.publish();
            }
            PlayerPhase::Loading => self.autoplay = true,
            PlayerPhase::Idle if self.mode == PlaybackMode::Local => {
                // Replay the finished local track
                if let Some(track) = self.desired.take() {
                    self.set_desired_track(Some(track), true);
                }
            }
            phase => debug!(phase = phase.as_str(), "Ignoring play request"),
        }
    }

    pub fn pause(&mut self) {
        match self.state.phase {
            PlayerPhase::Playing => {
                self.transport.pause();
                self.state.phase = PlayerPhase::Paused;
                self.state.is_playing = false;
                self.publish();
            }
            PlayerPhase::Loading => self.autoplay = false,
            phase => debug!(phase = phase.as_str(), "Ignoring pause request"),
        }
    }

    pub fn toggle_play(&mut self) {
        if self.state.is_playing || (self.state.phase == PlayerPhase::Loading && self.autoplay) {
            self.pause();
        } else {
            self.play();
        }
    }

    /// Seek within the loaded track. The radio timeline is not client
    /// controlled, so this is rejected in radio mode.
    pub fn seek(&mut self, position: f64) -> Result<(), RadioError> {
        if self.mode == PlaybackMode::Radio {
            warn!(position, "Rejected seek while in radio mode");
            return Err(RadioError::SeekRejected);
        }
        if !matches!(
            self.state.phase,
            PlayerPhase::Ready | PlayerPhase::Playing | PlayerPhase::Paused
        ) || !position.is_finite()
        {
            debug!(phase = self.state.phase.as_str(), position, "Ignoring seek");
            return Ok(());
        }
        let upper = self.state.duration.unwrap_or(f64::MAX);
        let target = position.clamp(0.0, upper);
        self.transport.seek(target);
        self.state.current_time = target;
        self.publish();
        Ok(())
    }

    pub fn set_volume(&mut self, volume: f32) {
        if volume.is_nan() {
            return;
        }
        let volume = volume.clamp(0.0, 1.0);
        self.state.volume = volume;
        if !self.state.is_muted {
            self.transport.set_volume(volume);
        }
        self.publish();
    }

    /// Mute keeps `volume` untouched so unmuting restores it.
    pub fn set_muted(&mut self, muted: bool) {
        if self.state.is_muted == muted {
            return;
        }
        self.state.is_muted = muted;
        self.transport.set_muted(muted);
        if !muted {
            self.transport.set_volume(self.state.volume);
        }
        self.publish();
    }

    pub fn toggle_mute(&mut self) {
        self.set_muted(!self.state.is_muted);
    }

    // --- Local queue ---

    pub fn enqueue_local(&mut self, track: Track) {
        self.local_queue.push_back(track);
    }

    pub fn clear_local_queue(&mut self) {
        self.local_queue.clear();
    }

    pub fn local_queue(&self) -> impl Iterator<Item = &Track> {
        self.local_queue.iter()
    }

    // --- Transport signals ---

    pub fn on_metadata_loaded(&mut self, track_id: &str, duration: Option<f64>) {
        if !self.is_current(track_id) || self.state.phase != PlayerPhase::Loading {
            trace!(track_id, "Ignoring metadata for superseded load");
            return;
        }
        let fallback = self.desired.as_ref().and_then(|t| t.duration);
        self.state.duration = duration
            .filter(|d| d.is_finite() && *d >= 0.0)
            .or(fallback);
        self.state.is_buffering = false;

        if self.autoplay {
            self.transport.play();
            self.state.phase = PlayerPhase::Playing;
            self.state.is_playing = true;
        } else {
            self.state.phase = PlayerPhase::Ready;
        }
        debug!(track_id, phase = self.state.phase.as_str(), "Track metadata loaded");
        self.publish();
    }

    pub fn on_time_update(&mut self, track_id: &str, position: f64) {
        if !self.is_current(track_id) || !position.is_finite() {
            return;
        }
        if matches!(
            self.state.phase,
            PlayerPhase::Ready | PlayerPhase::Playing | PlayerPhase::Paused
        ) {
            self.state.current_time = position.max(0.0);
            self.publish();
        }
    }

    pub fn on_buffering(&mut self, track_id: &str, buffering: bool) {
        if self.is_current(track_id) && self.state.is_buffering != buffering {
            self.state.is_buffering = buffering;
            self.publish();
        }
    }

    pub fn on_ended(&mut self, track_id: &str) -> EndedAction {
        if !self.is_current(track_id) {
            trace!(track_id, "Ignoring ended signal for superseded track");
            return EndedAction::Ignored;
        }
        if self.state.phase != PlayerPhase::Playing {
            trace!(track_id, phase = self.state.phase.as_str(), "Ignoring ended signal outside playback");
            return EndedAction::Ignored;
        }
        self.state.phase = PlayerPhase::Idle;
        self.state.is_playing = false;
        self.state.is_buffering = false;
        if let Some(duration) = self.state.duration {
            self.state.current_time = duration;
        }
        self.publish();

        match self.mode {
            PlaybackMode::Radio => {
                debug!(track_id, "Radio track ended, requesting server skip");
                EndedAction::RequestSkip
            }
            PlaybackMode::Local => match self.local_queue.pop_front() {
                Some(next) => {
                    // Clear first so a repeated id still reloads
                    self.desired = None;
                    self.set_desired_track(Some(next.clone()), true);
                    EndedAction::Advanced(next)
                }
                None => EndedAction::Stopped,
            },
        }
    }

    /// Terminal for the current track; a new desired track is required to recover.
    pub fn on_error(&mut self, track_id: &str, message: &str) {
        if !self.is_current(track_id) {
            trace!(track_id, "Ignoring error for superseded track");
            return;
        }
        error!(track_id, message, "Playback failed");
        self.autoplay = false;
        self.state.phase = PlayerPhase::Error;
        self.state.is_playing = false;
        self.state.is_buffering = false;
        self.state.error = Some(message.to_string());
        self.publish();
    }

    fn is_current(&self, track_id: &str) -> bool {
        self.desired.as_ref().is_some_and(|t| t.id == track_id)
    }

    #[inline]
    fn publish(&self) {
        self.state_tx.send_replace(self.state.clone());
    }
}

impl<T: AudioTransport> std::fmt::Debug for PlaybackController<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackController")
            .field("mode", &self.mode)
            .field("state", &self.state)
            .field("local_queue", &self.local_queue.len())
            .finish()
    }
}
