// ABOUTME: Long-lived feed subscription with a supervising reconnect loop
// ABOUTME: Transport is a trait so tests can drive parsing with synthetic byte chunks

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use super::reconnect::{ConnectionState, ReconnectPolicy};
use super::{decode_frame, Frame, LineDecoder, RawEvent};
use crate::context::shutdown_requested;
use crate::metrics;

/// Raw body chunks of one feed connection
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

/// Decoded movement events, in feed order
pub type FeedEvents = Pin<Box<dyn Stream<Item = RawEvent> + Send>>;

/// Opens one connection to the event feed
#[async_trait]
pub trait FeedTransport: Send + Sync {
    async fn connect(&self) -> Result<ByteStream>;

    /// Where this transport connects, for logs
    fn endpoint(&self) -> &str;
}

/// HTTP(S) server-sent-events transport
pub struct HttpFeedTransport {
    client: reqwest::Client,
    url: String,
}

impl HttpFeedTransport {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("pepito/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()
            .context("Failed to build feed HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl FeedTransport for HttpFeedTransport {
    async fn connect(&self) -> Result<ByteStream> {
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .send()
            .await
            .with_context(|| format!("Failed to connect to {}", self.url))?;

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            bail!("Feed returned HTTP {}", status);
        }

        Ok(Box::pin(
            response
                .bytes_stream()
                .map(|chunk| chunk.context("Feed read failed")),
        ))
    }

    fn endpoint(&self) -> &str {
        &self.url
    }
}

/// Why a single connection stopped
#[derive(Debug)]
pub enum SessionEnd {
    /// The server ended the body
    Closed,
    /// Transport error mid-stream
    Failed(anyhow::Error),
    /// Shutdown requested or nobody is consuming events any more
    Shutdown,
}

/// Read one connection to completion, forwarding decoded events.
/// Malformed JSON lines are logged and skipped without tearing the connection
/// down; bytes that cannot be framed (invalid UTF-8, runaway lines) end it.
pub async fn run_session(
    mut stream: ByteStream,
    decoder: &mut LineDecoder,
    events: &mpsc::Sender<RawEvent>,
    shutdown: &mut watch::Receiver<bool>,
) -> SessionEnd {
    loop {
        let chunk = tokio::select! {
            chunk = stream.next() => chunk,
            _ = shutdown_requested(shutdown) => return SessionEnd::Shutdown,
        };

        let bytes = match chunk {
            Some(Ok(bytes)) => bytes,
            Some(Err(e)) => return SessionEnd::Failed(e),
            None => return SessionEnd::Closed,
        };

        let lines = match decoder.push(&bytes) {
            Ok(lines) => lines,
            Err(e) => return SessionEnd::Failed(e),
        };

        for line in lines {
            match decode_frame(&line) {
                Ok(Some(frame)) => {
                    metrics::record_feed_event(frame.kind());
                    match frame {
                        Frame::Event(event) => {
                            tracing::info!(
                                kind = %event.kind,
                                time = event.time,
                                "Received feed event"
                            );
                            if events.send(event).await.is_err() {
                                return SessionEnd::Shutdown;
                            }
                        }
                        Frame::Heartbeat => tracing::trace!("Feed heartbeat"),
                        Frame::Ignored(name) => {
                            tracing::debug!(event = %name, "Ignoring feed event")
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    metrics::record_feed_event("malformed");
                    tracing::warn!(
                        error = %format!("{e:#}"),
                        line = %line,
                        "Skipping malformed feed frame"
                    );
                }
            }
        }
    }
}

/// Supervises the feed connection: connect, stream, and on any failure wait
/// the fixed delay and start over. Runs until shutdown.
pub struct FeedClient {
    transport: Box<dyn FeedTransport>,
    policy: ReconnectPolicy,
    state: watch::Sender<ConnectionState>,
}

impl FeedClient {
    pub fn new(transport: Box<dyn FeedTransport>, policy: ReconnectPolicy) -> Self {
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            transport,
            policy,
            state,
        }
    }

    /// Observe connection state changes
    pub fn state(&self) -> watch::Receiver<ConnectionState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    /// Spawn the supervising task and return the decoded event stream
    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> (FeedEvents, JoinHandle<()>) {
        let (tx, rx) = mpsc::channel(64);
        let handle = tokio::spawn(self.run(tx, shutdown));
        (Box::pin(ReceiverStream::new(rx)), handle)
    }

    /// The reconnect loop. Returns only on shutdown or when the event
    /// receiver has been dropped.
    pub async fn run(self, events: mpsc::Sender<RawEvent>, mut shutdown: watch::Receiver<bool>) {
        let mut decoder = LineDecoder::new();
        let mut failures: u32 = 0;

        tracing::info!(endpoint = %self.transport.endpoint(), "Starting feed client");

        loop {
            self.set_state(ConnectionState::Connecting);

            let connected = tokio::select! {
                result = self.transport.connect() => result,
                _ = shutdown_requested(&mut shutdown) => break,
            };

            let end = match connected {
                Ok(stream) => {
                    failures = 0;
                    self.set_state(ConnectionState::Streaming);
                    tracing::info!(
                        endpoint = %self.transport.endpoint(),
                        "Connected to event feed"
                    );
                    run_session(stream, &mut decoder, &events, &mut shutdown).await
                }
                Err(e) => SessionEnd::Failed(e),
            };
            decoder.reset();

            let reason = match end {
                SessionEnd::Shutdown => break,
                SessionEnd::Closed => "stream closed by server".to_string(),
                SessionEnd::Failed(e) => format!("{e:#}"),
            };

            failures = failures.saturating_add(1);
            let Some(delay) = self.policy.next_delay(failures) else {
                break;
            };

            metrics::record_feed_reconnect();
            tracing::warn!(
                error = %reason,
                consecutive_failures = failures,
                delay_secs = delay.as_secs_f64(),
                "Feed connection lost, reconnecting"
            );
            self.set_state(ConnectionState::Reconnecting { delay, reason });

            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = shutdown_requested(&mut shutdown) => break,
            }
        }

        self.set_state(ConnectionState::Disconnected);
        tracing::info!("Feed client stopped");
    }
}
