/// Lifecycle of the live push connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    pub fn as_str(self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "DISCONNECTED",
            ConnectionState::Connecting => "CONNECTING",
            ConnectionState::Connected => "CONNECTED",
        }
    }
}

/// Observable connection snapshot published by the connection manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionStatus {
    pub state: ConnectionState,
    /// Reconnection cycles since the last successful open
    pub reconnect_attempts: u32,
    /// Advisory only, for banners; never drives behaviour
    pub last_error: Option<String>,
}

impl ConnectionStatus {
    pub(crate) fn disconnected() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            reconnect_attempts: 0,
            last_error: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

// Outcome of one connection cycle inside the manager task
#[derive(Debug)]
pub(crate) enum CycleOutcome {
    /// Socket closed or failed to open; back off and retry
    Lost(String),
    /// Credentials disappeared (sign-out); stop instead of retrying
    NoToken,
    /// Teardown requested
    Shutdown,
}
