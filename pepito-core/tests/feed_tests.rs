// ABOUTME: Integration tests for the feed client's supervising reconnect loop
// ABOUTME: A scripted transport replays failures and byte chunks under paused tokio time

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{stream, StreamExt};
use pepito_core::feed::{ByteStream, ConnectionState, FeedClient, FeedTransport, ReconnectPolicy};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::Instant;

enum Script {
    Fail(&'static str),
    Chunks(Vec<&'static str>),
}

/// Replays scripted connection outcomes; once exhausted, connections stay open and idle
struct ScriptedTransport {
    script: Mutex<VecDeque<Script>>,
    attempts: Arc<Mutex<Vec<Instant>>>,
}

impl ScriptedTransport {
    fn new(script: Vec<Script>) -> (Self, Arc<Mutex<Vec<Instant>>>) {
        let attempts = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                script: Mutex::new(script.into()),
                attempts: attempts.clone(),
            },
            attempts,
        )
    }
}

#[async_trait]
impl FeedTransport for ScriptedTransport {
    async fn connect(&self) -> Result<ByteStream> {
        self.attempts.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(Script::Fail(reason)) => anyhow::bail!(reason),
            Some(Script::Chunks(chunks)) => {
                let items: Vec<Result<Bytes>> = chunks
                    .into_iter()
                    .map(|c| Ok(Bytes::from_static(c.as_bytes())))
                    .collect();
                Ok(Box::pin(stream::iter(items)))
            }
            None => Ok(Box::pin(stream::pending())),
        }
    }

    fn endpoint(&self) -> &str {
        "scripted"
    }
}

const OUT_EVENT: &str = "data: {\"event\":\"pepito\",\"type\":\"out\",\"time\":1700000000,\"img\":\"http://x/y.png\"}\n";

#[tokio::test(start_paused = true)]
async fn test_reconnects_after_fixed_delay_then_streams() {
    let (transport, attempts) = ScriptedTransport::new(vec![
        Script::Fail("connection refused"),
        Script::Chunks(vec!["data: {\"event\":\"heartbeat\"}\n", OUT_EVENT]),
    ]);
    let client = FeedClient::new(Box::new(transport), ReconnectPolicy::default());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (mut events, handle) = client.spawn(shutdown_rx);

    let event = events.next().await.unwrap();
    assert_eq!(event.kind, "out");
    assert_eq!(event.time, 1_700_000_000);

    let attempts = attempts.lock().unwrap().clone();
    assert_eq!(attempts.len(), 2, "exactly one reconnect after the failure");
    assert!(attempts[1] - attempts[0] >= Duration::from_secs(5));

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_closed_stream_reconnects_and_parses_like_fresh_connection() {
    let (transport, attempts) = ScriptedTransport::new(vec![
        // Connection drops mid-frame; the partial line must not leak into the next connection
        Script::Chunks(vec![OUT_EVENT, "data: {\"event\":\"pep"]),
        Script::Chunks(vec![
            "data: {\"event\":\"pepito\",\"type\":\"in\",",
            "\"time\":1700000060,\"img\":\"http://x/z.png\"}\n",
        ]),
    ]);
    let client = FeedClient::new(
        Box::new(transport),
        ReconnectPolicy::fixed(Duration::from_secs(5)),
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events, handle) = client.spawn(shutdown_rx);

    let received: Vec<_> = events.take(2).collect().await;
    assert_eq!(received[0].kind, "out");
    assert_eq!(received[1].kind, "in");
    assert_eq!(received[1].img, "http://x/z.png");

    let attempts = attempts.lock().unwrap().clone();
    assert_eq!(attempts.len(), 2);
    assert!(attempts[1] - attempts[0] >= Duration::from_secs(5));

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_keeps_retrying_without_giving_up() {
    let (transport, attempts) = ScriptedTransport::new(vec![
        Script::Fail("dns"),
        Script::Fail("http 502"),
        Script::Fail("http 503"),
        Script::Fail("reset"),
    ]);
    let client = FeedClient::new(Box::new(transport), ReconnectPolicy::default());
    let mut state = client.state();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (_events, handle) = client.spawn(shutdown_rx);

    // Four failures at 0, 5, 10, 15 s; the fifth attempt (20 s) idles
    tokio::time::sleep(Duration::from_secs(21)).await;
    let attempts = attempts.lock().unwrap().clone();
    assert_eq!(attempts.len(), 5);
    for pair in attempts.windows(2) {
        assert_eq!(pair[1] - pair[0], Duration::from_secs(5));
    }
    assert!(state.borrow_and_update().is_streaming());

    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_state_reports_reconnecting_during_delay() {
    let (transport, _attempts) = ScriptedTransport::new(vec![Script::Fail("refused")]);
    let client = FeedClient::new(Box::new(transport), ReconnectPolicy::default());
    let state = client.state();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (_events, handle) = client.spawn(shutdown_rx);

    tokio::time::sleep(Duration::from_secs(1)).await;
    assert_eq!(state.borrow().label(), "reconnecting");

    // Shutdown interrupts the delay
    shutdown_tx.send(true).unwrap();
    handle.await.unwrap();
    assert_eq!(*state.borrow(), ConnectionState::Disconnected);
}

#[tokio::test(start_paused = true)]
async fn test_stops_when_consumer_goes_away() {
    let (transport, _attempts) = ScriptedTransport::new(vec![Script::Chunks(vec![
        OUT_EVENT, OUT_EVENT,
    ])]);
    let client = FeedClient::new(Box::new(transport), ReconnectPolicy::default());
    let (_shutdown_tx, shutdown_rx) = watch::channel(false);
    let (events, handle) = client.spawn(shutdown_rx);

    drop(events);
    tokio::time::timeout(Duration::from_secs(60), handle)
        .await
        .unwrap()
        .unwrap();
}
