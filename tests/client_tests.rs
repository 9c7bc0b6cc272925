mod common;

use std::time::Duration;

use atlantify_radio::{
    ConnectionState, RadioClient, RadioError, RadioEvent, ReconnectPolicy, Settings,
};
use common::{text, StaticCredentials, TestServer, WAIT};
use futures::{SinkExt, StreamExt};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;

fn fast_settings(url: &str) -> Settings {
    Settings::default()
        .with_ws_url(url)
        .with_backoff(Duration::from_millis(20), Duration::from_millis(200))
}

async fn next_event(events: &mut broadcast::Receiver<RadioEvent>) -> RadioEvent {
    timeout(WAIT, events.recv())
        .await
        .expect("no event within timeout")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_connect_passes_token_and_delivers_pushes() {
    let mut server = TestServer::start().await;
    let credentials = StaticCredentials::with(Some("secret token"), false);
    let client = RadioClient::new(fast_settings(&server.url), credentials);
    let mut events = client.event_receiver();

    client.connect().await.unwrap();
    let (mut socket, uri) = server.accept().await;
    assert_eq!(uri, "/ws?token=secret+token");
    assert_eq!(next_event(&mut events).await, RadioEvent::Connected);
    assert_eq!(client.status().state, ConnectionState::Connected);
    assert_eq!(client.status().last_error, None);

    socket
        .send(text(r#"{"type":"LISTENERS_UPDATE","data":{"listeners":3}}"#))
        .await
        .unwrap();
    // Ignored without changing the connection
    socket.send(text(r#"{"type":"CHAT","data":{}}"#)).await.unwrap();
    socket.send(text("garbage")).await.unwrap();
    socket
        .send(text(r#"{"type":"RADIO_STATUS_CHANGE","data":{"isRadioActive":true}}"#))
        .await
        .unwrap();

    assert_eq!(next_event(&mut events).await, RadioEvent::ListenersUpdate(3));
    assert_eq!(next_event(&mut events).await, RadioEvent::RadioStatusChange(true));
    assert!(client.status().is_connected());

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_missing_token_does_not_connect() {
    let mut server = TestServer::start().await;
    let client = RadioClient::new(fast_settings(&server.url), StaticCredentials::anonymous());

    assert!(matches!(client.connect().await, Err(RadioError::MissingToken)));
    let status = client.status();
    assert_eq!(status.state, ConnectionState::Disconnected);
    assert_eq!(
        status.last_error.as_deref(),
        Some("No authentication token available")
    );
    server.assert_no_connection(Duration::from_millis(200)).await;
}

#[tokio::test]
async fn test_reconnects_after_server_close() {
    let mut server = TestServer::start().await;
    let client = RadioClient::new(fast_settings(&server.url), StaticCredentials::listener());
    let mut events = client.event_receiver();

    client.connect().await.unwrap();
    let (mut socket, _) = server.accept().await;
    assert_eq!(next_event(&mut events).await, RadioEvent::Connected);

    socket.close(None).await.unwrap();
    assert_eq!(next_event(&mut events).await, RadioEvent::Disconnected);

    let (_socket, _) = server.accept().await;
    assert_eq!(next_event(&mut events).await, RadioEvent::Connected);
    // Counter resets once a connection opens again
    let status = client.status();
    assert_eq!(status.reconnect_attempts, 0);
    assert!(status.is_connected());

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_send_requires_connection() {
    let mut server = TestServer::start().await;
    let client = RadioClient::new(fast_settings(&server.url), StaticCredentials::listener());
    let mut events = client.event_receiver();

    // Dropped, not queued for later
    client.send("early");

    client.connect().await.unwrap();
    let (mut socket, _) = server.accept().await;
    assert_eq!(next_event(&mut events).await, RadioEvent::Connected);

    client.send(r#"{"type":"PING"}"#);
    let frame = timeout(WAIT, socket.next()).await.unwrap().unwrap().unwrap();
    assert_eq!(frame, text(r#"{"type":"PING"}"#));

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_disconnect_is_final() {
    let mut server = TestServer::start().await;
    let client = RadioClient::new(fast_settings(&server.url), StaticCredentials::listener());
    let mut events = client.event_receiver();

    client.connect().await.unwrap();
    let (mut socket, _) = server.accept().await;
    assert_eq!(next_event(&mut events).await, RadioEvent::Connected);

    client.disconnect().await.unwrap();

    // The server sees the close frame
    match timeout(WAIT, socket.next()).await.unwrap() {
        Some(Ok(Message::Close(_))) | None | Some(Err(_)) => {}
        other => panic!("Expected close, got {:?}", other),
    }

    // Listeners are released and no reconnect is scheduled
    assert!(matches!(
        timeout(WAIT, events.recv()).await.unwrap(),
        Err(broadcast::error::RecvError::Closed)
    ));
    assert_eq!(client.status().state, ConnectionState::Disconnected);
    server.assert_no_connection(Duration::from_millis(300)).await;

    assert!(matches!(client.connect().await, Err(RadioError::ConnectionClosed)));
    let mut late = client.event_receiver();
    assert!(matches!(
        late.recv().await,
        Err(broadcast::error::RecvError::Closed)
    ));
    // Sending after teardown is a harmless no-op
    client.send("ignored");
}

#[tokio::test]
async fn test_limited_policy_gives_up() {
    // Reserve a port, then free it so every attempt is refused
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let settings = fast_settings(&format!("ws://{}/ws", addr))
        .with_backoff(Duration::from_millis(5), Duration::from_millis(20))
        .with_reconnect_policy(ReconnectPolicy::Limited { max_attempts: 2 });
    let client = RadioClient::new(settings, StaticCredentials::listener());
    let mut status = client.status_receiver();

    client.connect().await.unwrap();
    let exhausted = timeout(
        WAIT,
        status.wait_for(|s| {
            s.last_error.as_deref() == Some("Maximum reconnection attempts reached")
        }),
    )
    .await
    .unwrap()
    .unwrap()
    .clone();

    assert_eq!(exhausted.state, ConnectionState::Disconnected);
    assert_eq!(exhausted.reconnect_attempts, 2);

    client.disconnect().await.unwrap();
}

#[tokio::test]
async fn test_backoff_grows_across_consecutive_failures() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    // Waits: [60,120), [120,240), [240,400], then clamped at 400
    let settings = Settings::default()
        .with_ws_url(format!("ws://{}/ws", addr))
        .with_backoff(Duration::from_millis(60), Duration::from_millis(400));
    let client = RadioClient::new(settings, StaticCredentials::listener());
    let mut status = client.status_receiver();

    client.connect().await.unwrap();
    let mut seen = Vec::new();
    for attempt in 1..=5u32 {
        let current = timeout(WAIT, status.wait_for(|s| s.reconnect_attempts == attempt))
            .await
            .unwrap()
            .unwrap()
            .clone();
        assert!(current.last_error.is_some());
        seen.push(Instant::now());
    }
    client.disconnect().await.unwrap();

    let gaps: Vec<Duration> = seen.windows(2).map(|w| w[1] - w[0]).collect();
    assert!(gaps[0] >= Duration::from_millis(55), "{:?}", gaps);
    assert!(gaps[1] >= Duration::from_millis(110), "{:?}", gaps);
    assert!(gaps[2] >= Duration::from_millis(230), "{:?}", gaps);
    assert!(gaps[1] > gaps[0] && gaps[2] > gaps[1], "{:?}", gaps);
    // Unclamped this wait would be at least 480ms
    assert!(gaps[3] >= Duration::from_millis(380), "{:?}", gaps);
    assert!(gaps[3] < Duration::from_millis(470), "{:?}", gaps);
}

#[tokio::test]
async fn test_disconnect_cancels_pending_reconnect() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    // Long backoff so the manager is parked in its reconnect wait
    let settings = Settings::default()
        .with_ws_url(format!("ws://{}/ws", addr))
        .with_backoff(Duration::from_secs(10), Duration::from_secs(30));
    let client = RadioClient::new(settings, StaticCredentials::listener());
    let mut status = client.status_receiver();

    client.connect().await.unwrap();
    timeout(WAIT, status.wait_for(|s| s.reconnect_attempts == 1))
        .await
        .unwrap()
        .unwrap();

    // Returns promptly instead of waiting out the backoff
    timeout(Duration::from_secs(2), client.disconnect())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(client.status().reconnect_attempts, 0);
}
