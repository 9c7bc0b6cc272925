use std::time::Duration;

use atlantify_radio::{
    backoff_delay, ConnectionState, ConnectionStatus, ReconnectPolicy, Settings,
};

const BASE: Duration = Duration::from_secs(1);
const MAX: Duration = Duration::from_secs(30);

#[test]
fn test_backoff_without_jitter_doubles() {
    assert_eq!(backoff_delay(0, BASE, MAX, 0.0), Duration::from_secs(1));
    assert_eq!(backoff_delay(1, BASE, MAX, 0.0), Duration::from_secs(2));
    assert_eq!(backoff_delay(2, BASE, MAX, 0.0), Duration::from_secs(4));
    assert_eq!(backoff_delay(3, BASE, MAX, 0.0), Duration::from_secs(8));
}

#[test]
fn test_backoff_jitter_window() {
    // Third attempt lands in [4000ms, 8000ms)
    let low = backoff_delay(2, BASE, MAX, 0.0);
    let high = backoff_delay(2, BASE, MAX, 0.999);
    assert_eq!(low, Duration::from_millis(4000));
    assert!(high > low && high < Duration::from_millis(8000));
}

#[test]
fn test_backoff_is_capped() {
    assert_eq!(backoff_delay(5, BASE, MAX, 0.0), MAX);
    // 16s * 1.9 would be 30.4s
    assert_eq!(backoff_delay(4, BASE, MAX, 0.9), MAX);
    assert_eq!(backoff_delay(1_000, BASE, MAX, 0.5), MAX);
    assert_eq!(backoff_delay(u32::MAX, BASE, MAX, 0.0), MAX);
}

#[test]
fn test_backoff_rejects_bad_jitter() {
    assert_eq!(backoff_delay(0, BASE, MAX, f64::NAN), BASE);
    assert_eq!(backoff_delay(0, BASE, MAX, -3.0), BASE);
}

#[test]
fn test_consecutive_failures_back_off_strictly_longer() {
    // Any jitter draw for attempt n is below the minimum for attempt n + 1
    let mut previous = Duration::ZERO;
    for attempts in 0..4 {
        let delay = backoff_delay(attempts, BASE, MAX, rand::random::<f64>());
        assert!(delay > previous, "{:?} <= {:?}", delay, previous);
        previous = delay;
    }
}

#[test]
fn test_settings_defaults() {
    let settings = Settings::default();
    assert_eq!(settings.api_url, "http://localhost:3000/api");
    assert_eq!(settings.ws_url, "ws://localhost:3000/ws");
    assert_eq!(settings.base_backoff, Duration::from_secs(1));
    assert_eq!(settings.max_backoff, Duration::from_secs(30));
    assert_eq!(settings.reconnect_policy, ReconnectPolicy::Unbounded);
    assert_eq!(settings.request_timeout, Duration::from_secs(10));
    assert_eq!(settings.event_buffer_capacity, 100);
}

#[test]
fn test_settings_builders() {
    let settings = Settings::default()
        .with_api_url("https://radio.example.com/api")
        .with_ws_url("wss://radio.example.com/ws")
        .with_backoff(Duration::from_millis(10), Duration::from_millis(500))
        .with_reconnect_policy(ReconnectPolicy::Limited { max_attempts: 3 })
        .with_request_timeout(Duration::from_secs(2));

    assert_eq!(settings.api_url, "https://radio.example.com/api");
    assert_eq!(settings.ws_url, "wss://radio.example.com/ws");
    assert_eq!(settings.base_backoff, Duration::from_millis(10));
    assert_eq!(settings.max_backoff, Duration::from_millis(500));
    assert_eq!(
        settings.reconnect_policy,
        ReconnectPolicy::Limited { max_attempts: 3 }
    );
    assert_eq!(settings.request_timeout, Duration::from_secs(2));
}

#[test]
fn test_settings_from_env() {
    std::env::set_var("ATLANTIFY_WS_URL", "ws://env-host/ws");
    std::env::set_var("RECONNECT_BASE_DELAY_MS", "250");
    std::env::set_var("RECONNECT_MAX_ATTEMPTS", "5");
    std::env::set_var("EVENT_BUFFER_CAPACITY", "0");

    let settings = Settings::from_env();
    assert_eq!(settings.ws_url, "ws://env-host/ws");
    assert_eq!(settings.base_backoff, Duration::from_millis(250));
    assert_eq!(
        settings.reconnect_policy,
        ReconnectPolicy::Limited { max_attempts: 5 }
    );
    // Zero is not a usable capacity
    assert_eq!(settings.event_buffer_capacity, 100);

    std::env::remove_var("ATLANTIFY_WS_URL");
    std::env::remove_var("RECONNECT_BASE_DELAY_MS");
    std::env::remove_var("RECONNECT_MAX_ATTEMPTS");
    std::env::remove_var("EVENT_BUFFER_CAPACITY");
}

#[test]
fn test_connection_state_names() {
    assert_eq!(ConnectionState::Disconnected.as_str(), "DISCONNECTED");
    assert_eq!(ConnectionState::Connecting.as_str(), "CONNECTING");
    assert_eq!(ConnectionState::Connected.as_str(), "CONNECTED");

    let status = ConnectionStatus {
        state: ConnectionState::Connected,
        reconnect_attempts: 0,
        last_error: None,
    };
    assert!(status.is_connected());
}
