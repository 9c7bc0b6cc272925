use std::{env, time::Duration};

use tracing::debug;

/// How the connection manager behaves once a socket has been lost.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconnectPolicy {
    /// Retry forever; the delay cap keeps the retry rate bounded
    Unbounded,
    /// Give up after `max_attempts` failed cycles and stay disconnected
    Limited { max_attempts: u32 },
}

impl ReconnectPolicy {
    pub(crate) fn allows(self, attempts: u32) -> bool {
        match self {
            ReconnectPolicy::Unbounded => true,
            ReconnectPolicy::Limited { max_attempts } => attempts < max_attempts,
        }
    }
}

/// Holds all tunables, read once at startup with fallbacks.
#[derive(Debug, Clone)]
pub struct Settings {
    pub api_url: String,
    pub ws_url: String,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub reconnect_policy: ReconnectPolicy,
    pub request_timeout: Duration,
    pub event_buffer_capacity: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_url: "http://localhost:3000/api".to_string(),
            ws_url: "ws://localhost:3000/ws".to_string(),
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            reconnect_policy: ReconnectPolicy::Unbounded,
            request_timeout: Duration::from_secs(10),
            event_buffer_capacity: 100,
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        // optionally load .env
        if let Ok(path) = dotenvy::dotenv() {
            debug!(path = %path.display(), "Loaded environment file");
        }

        let defaults = Settings::default();

        // helper to parse any FromStr
        fn parse<T: std::str::FromStr>(var: &str) -> Option<T> {
            env::var(var).ok().and_then(|v| v.trim().parse().ok())
        }

        let reconnect_policy = match parse::<u32>("RECONNECT_MAX_ATTEMPTS") {
            Some(max_attempts) => ReconnectPolicy::Limited { max_attempts },
            None => ReconnectPolicy::Unbounded,
        };

        Settings {
            api_url: env::var("ATLANTIFY_API_URL").unwrap_or(defaults.api_url),
            ws_url: env::var("ATLANTIFY_WS_URL").unwrap_or(defaults.ws_url),
            base_backoff: parse("RECONNECT_BASE_DELAY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.base_backoff),
            max_backoff: parse("RECONNECT_MAX_DELAY_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.max_backoff),
            reconnect_policy,
            request_timeout: parse("REQUEST_TIMEOUT_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.request_timeout),
            event_buffer_capacity: parse("EVENT_BUFFER_CAPACITY")
                .filter(|n: &usize| *n > 0)
                .unwrap_or(defaults.event_buffer_capacity),
        }
    }

    /// Builder-style override for the REST base URL.
    pub fn with_api_url(mut self, url: impl Into<String>) -> Self {
        self.api_url = url.into();
        self
    }

    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = url.into();
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_backoff = base;
        self.max_backoff = max;
        self
    }

    pub fn with_reconnect_policy(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect_policy = policy;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
