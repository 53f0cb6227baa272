//! HTTP host tests: requests over overlay connections reach handlers with the
//! peer identity attached.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio_util::sync::CancellationToken;

use tailnet_listener::engine::simulated::SimulatedEngine;
use tailnet_listener::http;

mod common;
use common::{Answer, ALICE_ADDR, BOB_ADDR};

async fn get_whoami(peer: std::os::unix::net::UnixStream) -> String {
    let mut stream = common::into_async(peer);
    stream
        .write_all(b"GET /whoami HTTP/1.1\r\nHost: laptop\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), stream.read_to_end(&mut response))
        .await
        .expect("response in time")
        .unwrap();
    String::from_utf8(response).unwrap()
}

#[tokio::test]
async fn test_whoami_over_overlay_connection() {
    let engine = Arc::new(SimulatedEngine::new());
    let mock = common::start_mock_localapi(&engine, Duration::ZERO).await;
    mock.answer(ALICE_ADDR, Answer::Identity(common::alice()));
    mock.answer(BOB_ADDR, Answer::Identity(common::identity("Bob", "bob@example.com", "desktop")));
    let (mut factory, adapter) = common::bind(&engine);
    let listener = adapter.listener_handle().unwrap();

    let token = CancellationToken::new();
    let server = tokio::spawn(http::serve(
        adapter,
        http::router(),
        token.clone(),
        Duration::from_secs(5),
    ));

    let alice = get_whoami(engine.dial(listener, ALICE_ADDR).unwrap()).await;
    assert!(alice.starts_with("HTTP/1.1 200"), "unexpected response: {}", alice);
    assert!(alice.contains("\"TailnetAuthentication\""));
    assert!(alice.contains("alice@example.com"));
    assert!(alice.contains("\"node\":\"laptop\""));

    let bob = get_whoami(engine.dial(listener, BOB_ADDR).unwrap()).await;
    assert!(bob.contains("bob@example.com"));
    assert!(!bob.contains("alice@example.com"));

    token.cancel();
    let result = tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("server stops")
        .unwrap();
    assert!(result.is_ok());
    factory.dispose().unwrap();
}

#[tokio::test]
async fn test_shutdown_drains_open_connection() {
    let engine = Arc::new(SimulatedEngine::new());
    let mock = common::start_mock_localapi(&engine, Duration::ZERO).await;
    mock.answer(ALICE_ADDR, Answer::Identity(common::alice()));
    let (_factory, adapter) = common::bind(&engine);
    let listener = adapter.listener_handle().unwrap();

    let token = CancellationToken::new();
    let server = tokio::spawn(http::serve(
        adapter,
        http::router(),
        token.clone(),
        Duration::from_secs(5),
    ));

    // Keep-alive connection with one completed request.
    let mut stream = common::into_async(engine.dial(listener, ALICE_ADDR).unwrap());
    stream
        .write_all(b"GET /whoami HTTP/1.1\r\nHost: laptop\r\n\r\n")
        .await
        .unwrap();
    let mut buf = vec![0u8; 4096];
    let n = tokio::time::timeout(Duration::from_secs(5), stream.read(&mut buf))
        .await
        .expect("response in time")
        .unwrap();
    assert!(String::from_utf8_lossy(&buf[..n]).starts_with("HTTP/1.1 200"));

    token.cancel();
    let result = tokio::time::timeout(Duration::from_secs(3), server)
        .await
        .expect("server drains and stops")
        .unwrap();
    assert!(result.is_ok());

    // The idle connection was closed by the graceful shutdown.
    let mut rest = Vec::new();
    tokio::time::timeout(Duration::from_secs(1), stream.read_to_end(&mut rest))
        .await
        .expect("connection closed")
        .unwrap();
}

#[tokio::test]
async fn test_serve_stops_when_session_closes() {
    let engine = Arc::new(SimulatedEngine::new());
    let _mock = common::start_mock_localapi(&engine, Duration::ZERO).await;
    let (mut factory, adapter) = common::bind(&engine);

    let server = tokio::spawn(http::serve(
        adapter,
        http::router(),
        CancellationToken::new(),
        Duration::from_secs(1),
    ));
    tokio::time::sleep(Duration::from_millis(50)).await;
    factory.dispose().unwrap();

    let result = tokio::time::timeout(Duration::from_secs(2), server)
        .await
        .expect("server stops")
        .unwrap();
    assert!(matches!(
        result,
        Err(tailnet_listener::OverlayError::InvalidHandle(_))
    ));
}
