//! Transport implementations for the lobby streaming connection.
//!
//! Concrete [`Transport`](crate::Transport) implementations live here behind
//! feature gates:
//!
//! | Feature               | Types                                       |
//! |-----------------------|---------------------------------------------|
//! | `transport-websocket` | [`WebSocketTransport`], [`WebSocketConnector`] |

#[cfg(feature = "transport-websocket")]
pub mod websocket;

#[cfg(feature = "transport-websocket")]
pub use websocket::{WebSocketConnector, WebSocketTransport};
