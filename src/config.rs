//! Client configuration.

use std::time::Duration;

use crate::supervisor::RetryPolicy;

/// Default settling delay after lobby creation. The peer's lobby record is
/// asynchronously consistent with the key it returns, so a freshly created
/// key is not usable immediately.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

/// Default transitional display window between rounds.
pub const DEFAULT_ROUND_TRANSITION_DELAY: Duration = Duration::from_millis(1500);

/// Default delay before navigating away after a peer-reported error.
pub const DEFAULT_ERROR_REDIRECT_DELAY: Duration = Duration::from_secs(3);

/// Default capacity of the bounded session event channel.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default timeout for the graceful shutdown.
pub const DEFAULT_SHUTDOWN_TIMEOUT: Duration = Duration::from_secs(1);

/// Configuration for a [`LobbyClient`](crate::client::LobbyClient).
///
/// The required fields are the provisioning base URL, the streaming base URL,
/// and the API key; everything else has sensible defaults.
///
/// # Example
///
/// ```
/// use word_race_client::config::ClientConfig;
/// use std::time::Duration;
///
/// let config = ClientConfig::new("http://127.0.0.1:8000", "ws://127.0.0.1:8000", "wr_key_123")
///     .with_settle_delay(Duration::from_millis(500));
/// assert_eq!(config.api_key, "wr_key_123");
/// ```
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL for the HTTP provisioning endpoints (`/create`, `/join`).
    pub base_url: String,
    /// Base URL for the streaming connection (`/lobby/<key>`).
    pub ws_url: String,
    /// API key. Sent as a header on HTTP requests and as a query parameter
    /// on the streaming connection, which cannot carry headers.
    pub api_key: String,
    /// Pause after lobby creation before the key is surfaced.
    pub settle_delay: Duration,
    /// Bounded reconnect policy for the streaming connection.
    pub retry_policy: RetryPolicy,
    /// Display window held at a round boundary before the next round's
    /// letters are committed.
    pub round_transition_delay: Duration,
    /// Delay between a peer-reported error and the navigate-away event.
    pub error_redirect_delay: Duration,
    /// Capacity of the bounded session event channel. Values below 1 are
    /// clamped to 1.
    pub event_channel_capacity: usize,
    /// Timeout for the graceful shutdown of background tasks.
    pub shutdown_timeout: Duration,
}

impl ClientConfig {
    /// Create a configuration with the given endpoints and default tuning.
    pub fn new(
        base_url: impl Into<String>,
        ws_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Self {
        Self {
            base_url: base_url.into(),
            ws_url: ws_url.into(),
            api_key: api_key.into(),
            settle_delay: DEFAULT_SETTLE_DELAY,
            retry_policy: RetryPolicy::default(),
            round_transition_delay: DEFAULT_ROUND_TRANSITION_DELAY,
            error_redirect_delay: DEFAULT_ERROR_REDIRECT_DELAY,
            event_channel_capacity: DEFAULT_EVENT_CHANNEL_CAPACITY,
            shutdown_timeout: DEFAULT_SHUTDOWN_TIMEOUT,
        }
    }

    /// Set the settling delay after lobby creation.
    #[must_use]
    pub fn with_settle_delay(mut self, delay: Duration) -> Self {
        self.settle_delay = delay;
        self
    }

    /// Set the reconnect policy for the streaming connection.
    #[must_use]
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set the transitional display window between rounds.
    #[must_use]
    pub fn with_round_transition_delay(mut self, delay: Duration) -> Self {
        self.round_transition_delay = delay;
        self
    }

    /// Set the delay before navigating away after a peer-reported error.
    #[must_use]
    pub fn with_error_redirect_delay(mut self, delay: Duration) -> Self {
        self.error_redirect_delay = delay;
        self
    }

    /// Set the capacity of the bounded session event channel.
    #[must_use]
    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity.max(1);
        self
    }

    /// Set the timeout for the graceful shutdown.
    #[must_use]
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }
}
