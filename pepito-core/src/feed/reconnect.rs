// ABOUTME: Fixed-delay reconnection policy and connection lifecycle for the event feed
// ABOUTME: Reconnects forever after the same delay: no growth, no retry ceiling

use std::fmt;
use std::time::Duration;

/// Default delay between a feed failure and the next connection attempt
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(5);

/// Reconnection configuration for long-lived streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    /// Delay before every reconnect attempt
    pub delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            delay: DEFAULT_RECONNECT_DELAY,
        }
    }
}

impl ReconnectPolicy {
    pub fn fixed(delay: Duration) -> Self {
        Self { delay }
    }

    /// Delay before the next attempt. Always `Some`: the feed is never given up on.
    pub fn next_delay(&self, _consecutive_failures: u32) -> Option<Duration> {
        Some(self.delay)
    }
}

/// Lifecycle of a streaming connection.
/// `Disconnected → Connecting → Streaming → Reconnecting → Connecting → …`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not started yet, or stopped by shutdown
    Disconnected,
    /// Connection attempt in flight
    Connecting,
    /// Connected and reading frames
    Streaming,
    /// Waiting out the reconnect delay after a failure
    Reconnecting { delay: Duration, reason: String },
}

impl ConnectionState {
    pub fn is_streaming(&self) -> bool {
        matches!(self, ConnectionState::Streaming)
    }

    /// Short label for logs and health output
    pub fn label(&self) -> &'static str {
        match self {
            ConnectionState::Disconnected => "disconnected",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Streaming => "streaming",
            ConnectionState::Reconnecting { .. } => "reconnecting",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionState::Reconnecting { delay, reason } => {
                write!(f, "reconnecting in {}s ({})", delay.as_secs(), reason)
            }
            other => f.write_str(other.label()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy() {
        assert_eq!(ReconnectPolicy::default().delay, Duration::from_secs(5));
    }

    #[test]
    fn test_delay_never_grows_and_never_gives_up() {
        let policy = ReconnectPolicy::default();
        for failures in [1, 2, 10, 1_000, u32::MAX] {
            assert_eq!(policy.next_delay(failures), Some(Duration::from_secs(5)));
        }
    }

    #[test]
    fn test_custom_fixed_delay() {
        let policy = ReconnectPolicy::fixed(Duration::from_millis(250));
        assert_eq!(policy.next_delay(3), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(ConnectionState::Streaming.label(), "streaming");
        assert!(ConnectionState::Streaming.is_streaming());
        let state = ConnectionState::Reconnecting {
            delay: Duration::from_secs(5),
            reason: "connection reset".to_string(),
        };
        assert!(!state.is_streaming());
        assert_eq!(state.to_string(), "reconnecting in 5s (connection reset)");
    }
}
