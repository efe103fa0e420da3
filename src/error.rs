//! Error types for the Word Race client.

use std::fmt;

use thiserror::Error;

/// Input fields that are validated locally before any network call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationField {
    /// The player's display name.
    DisplayName,
    /// The lobby key entered on the join screen.
    LobbyKey,
}

impl fmt::Display for ValidationField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationField::DisplayName => write!(f, "display name"),
            ValidationField::LobbyKey => write!(f, "lobby key"),
        }
    }
}

/// Errors that can occur when using the Word Race client.
#[derive(Debug, Error)]
pub enum WordRaceError {
    /// A required input field is empty. Raised before any network I/O and
    /// surfaced as inline field feedback, never sent to the peer.
    #[error("{0} must not be empty")]
    Validation(ValidationField),

    /// The provisioning peer was unreachable or returned malformed data
    /// during create/join. No session exists yet when this is raised.
    #[error("provisioning failed: {0}")]
    Provisioning(String),

    /// An inbound frame could not be decoded. The interpreter logs and
    /// discards these; they never terminate the session.
    #[error("malformed frame: {0}")]
    Protocol(String),

    /// Failed to send a frame through the transport.
    #[error("transport send error: {0}")]
    TransportSend(String),

    /// Failed to receive a frame from the transport.
    #[error("transport receive error: {0}")]
    TransportReceive(String),

    /// The transport connection was closed.
    #[error("transport connection closed")]
    TransportClosed,

    /// Attempted an operation that requires a live connection.
    #[error("not connected to a lobby")]
    NotConnected,

    /// A connection is already open or connecting for this session.
    #[error("a connection is already active for this session")]
    AlreadyConnected,

    /// The bounded reconnect policy ran out of attempts.
    #[error("connection retry attempts exhausted")]
    ConnectionExhausted,

    /// Failed to serialize or deserialize a protocol frame.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An operation timed out.
    #[error("operation timed out")]
    Timeout,
}

/// A specialized [`Result`] type for Word Race client operations.
pub type Result<T> = std::result::Result<T, WordRaceError>;
