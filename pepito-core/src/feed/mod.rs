// ABOUTME: Cat-door event feed: line framing, frame decoding, and the streaming client
// ABOUTME: Frames are `data: {json}` lines; partial reads are buffered until a newline arrives

pub mod client;
pub mod reconnect;

pub use client::{ByteStream, FeedClient, FeedTransport, HttpFeedTransport, SessionEnd};
pub use reconnect::{ConnectionState, ReconnectPolicy};

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Event name of movement notifications
pub const PEPITO_EVENT: &str = "pepito";
/// Event name of keep-alive frames
pub const HEARTBEAT_EVENT: &str = "heartbeat";

/// A movement event from the feed
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawEvent {
    pub event: String,
    /// "in" or "out"; other values are carried through and rejected by the translator
    #[serde(rename = "type")]
    pub kind: String,
    /// Unix seconds
    pub time: i64,
    /// Snapshot image URL
    pub img: String,
}

/// Result of decoding one line of the feed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// A well-formed movement event
    Event(RawEvent),
    /// Keep-alive
    Heartbeat,
    /// Some other event name; not an error
    Ignored(String),
}

impl Frame {
    pub fn kind(&self) -> &str {
        match self {
            Frame::Event(_) => PEPITO_EVENT,
            Frame::Heartbeat => HEARTBEAT_EVENT,
            Frame::Ignored(_) => "ignored",
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    event: String,
}

/// Decode one feed line. `Ok(None)` for lines that carry no payload
/// (blank lines, SSE comments, and non-data fields).
pub fn decode_frame(line: &str) -> Result<Option<Frame>> {
    let line = line.trim();
    if line.is_empty() || line.starts_with(':') {
        return Ok(None);
    }

    let payload = match line.strip_prefix("data:") {
        Some(rest) => rest.trim_start(),
        None if is_sse_field(line) => return Ok(None),
        None => line,
    };
    if payload.is_empty() {
        return Ok(None);
    }

    let value: serde_json::Value =
        serde_json::from_str(payload).context("Frame payload is not valid JSON")?;
    if !value.is_object() {
        bail!("Frame payload is not a JSON object");
    }

    let envelope: Envelope = serde_json::from_value(value.clone())
        .context("Frame payload has no string `event` field")?;

    match envelope.event.as_str() {
        PEPITO_EVENT => {
            let event: RawEvent =
                serde_json::from_value(value).context("Malformed pepito event")?;
            Ok(Some(Frame::Event(event)))
        }
        HEARTBEAT_EVENT => Ok(Some(Frame::Heartbeat)),
        _ => Ok(Some(Frame::Ignored(envelope.event))),
    }
}

fn is_sse_field(line: &str) -> bool {
    ["event:", "id:", "retry:"]
        .iter()
        .any(|field| line.starts_with(field))
}

/// Longest partial line held while waiting for its newline
pub const MAX_PENDING_LINE: usize = 64 * 1024;

/// Reassembles newline-delimited lines from arbitrary byte chunks.
/// Buffers bytes, not text, so a UTF-8 sequence split across reads survives.
#[derive(Debug, Default)]
pub struct LineDecoder {
    buf: Vec<u8>,
}

impl LineDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a chunk and return every line it completed.
    /// A line that is not UTF-8, or a partial line past `MAX_PENDING_LINE`,
    /// corrupts the stream and is an error.
    pub fn push(&mut self, chunk: &[u8]) -> Result<Vec<String>> {
        self.buf.extend_from_slice(chunk);

        let mut lines = Vec::new();
        while let Some(pos) = self.buf.iter().position(|&b| b == b'\n') {
            let mut line: Vec<u8> = self.buf.drain(..=pos).collect();
            line.pop();
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            let line = String::from_utf8(line).context("Feed line is not valid UTF-8")?;
            lines.push(line);
        }

        if self.buf.len() > MAX_PENDING_LINE {
            bail!(
                "Feed line exceeds {} bytes without a newline",
                MAX_PENDING_LINE
            );
        }
        Ok(lines)
    }

    /// Bytes held waiting for a newline
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    /// Drop any partial line (used when a connection is torn down)
    pub fn reset(&mut self) {
        self.buf.clear();
    }
}
