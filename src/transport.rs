//! Transport abstraction for the lobby streaming connection.
//!
//! The [`Transport`] trait is a bidirectional text-frame channel between the
//! client and the game peer. The lobby protocol exchanges JSON text frames,
//! so every implementation must handle framing internally (WebSocket frames,
//! length-prefixed TCP, and so on).
//!
//! Connection setup is not part of this trait: the supervisor needs to
//! reconnect after a drop, so it goes through a [`Connector`] factory
//! instead of a pre-connected transport. See
//! [`Connector`](crate::supervisor::Connector).

use async_trait::async_trait;

use crate::error::WordRaceError;

/// A bidirectional text-frame transport for the lobby streaming connection.
///
/// Each call to [`send`](Transport::send) transmits one complete JSON frame;
/// each call to [`recv`](Transport::recv) yields one complete JSON frame.
///
/// # Cancel Safety
///
/// [`recv`](Transport::recv) **MUST** be cancel-safe because the supervisor
/// polls it inside `tokio::select!`. If `recv` is cancelled before
/// completion, calling it again must not lose frames. Channel-backed
/// implementations are naturally cancel-safe.
#[async_trait]
pub trait Transport: Send + 'static {
    /// Send one JSON text frame to the peer.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::TransportSend`] if the frame could not be
    /// sent (connection broken, write buffer full).
    async fn send(&mut self, frame: String) -> Result<(), WordRaceError>;

    /// Receive the next JSON text frame from the peer.
    ///
    /// Returns:
    /// - `Some(Ok(text))` — a complete frame was received
    /// - `Some(Err(e))` — a transport error occurred
    /// - `None` — the connection was closed by the peer
    ///
    /// # Cancel Safety
    ///
    /// This method **MUST** be cancel-safe (see trait documentation).
    async fn recv(&mut self) -> Option<Result<String, WordRaceError>>;

    /// Close the connection gracefully.
    ///
    /// After this call, [`send`](Transport::send) and
    /// [`recv`](Transport::recv) may return errors or `None`.
    ///
    /// # Errors
    ///
    /// Returns an error if the close handshake fails. Implementations should
    /// still release resources when that happens.
    async fn close(&mut self) -> Result<(), WordRaceError>;
}
