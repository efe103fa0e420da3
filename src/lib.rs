//! # Word Race Client
//!
//! Transport-agnostic Rust client engine for Word Race multiplayer lobby
//! sessions.
//!
//! This crate provisions lobbies over HTTP, maintains a supervised streaming
//! connection to the game peer, interprets the integer-tagged JSON frame
//! protocol, and drives a session state machine that the presentation layer
//! observes through typed [`SessionEvent`]s.
//!
//! ## Features
//!
//! - **Transport-agnostic**: implement the [`Transport`] and [`Connector`]
//!   traits for any backend
//! - **WebSocket built-in**: the default `transport-websocket` feature
//!   provides `WebSocketConnector`
//! - **Supervised connection**: bounded automatic reconnects with typed
//!   lifecycle events
//! - **Event-driven**: the engine applies frames in arrival order and emits
//!   [`SessionEvent`]s via a channel
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use word_race_client::{ClientConfig, LobbyClient, SessionEvent};
//! use word_race_client::transports::WebSocketConnector;
//!
//! let config = ClientConfig::new("http://peer:8000", "ws://peer:8000", "wr_key");
//! let connector = WebSocketConnector::new(&config.ws_url, &config.api_key);
//! let store = std::sync::Arc::new(word_race_client::MemoryMarkerStore::default());
//! let mut client = LobbyClient::new(config, connector, store);
//!
//! let mut events = client.create_session("Alice", true, 5).await?;
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod protocol;
pub mod provision;
pub mod reload;
pub mod session;
pub mod supervisor;
pub mod transport;
pub mod transports;

// Re-export primary types for ergonomic imports.
pub use client::{JoinOutcome, LobbyClient};
pub use config::ClientConfig;
pub use error::{Result, ValidationField, WordRaceError};
pub use protocol::{ClientFrame, Letters, LobbyStatus, ScoreEntry, ServerFrame};
pub use provision::{ProvisionedLobby, ProvisioningClient};
pub use reload::{
    FileMarkerStore, MarkerStore, MemoryMarkerStore, ReloadDecision, ReloadGuard,
};
pub use session::{LobbySession, Phase, ScoreBoard, SessionEvent};
pub use supervisor::{
    ConnectParams, ConnectionEvent, ConnectionSender, ConnectionState, Connector,
    LobbyConnection, RetryPolicy,
};
pub use transport::Transport;

#[cfg(feature = "transport-websocket")]
pub use transports::{WebSocketConnector, WebSocketTransport};
