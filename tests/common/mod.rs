#![allow(
    dead_code,
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
//! Shared test utilities for Word Race Client integration tests.
//!
//! Provides a scripted [`MockTransport`], a [`MockConnector`] that hands out
//! scripted transports across reconnect attempts, and helper functions for
//! constructing inbound frame JSON.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use serde_json::json;
use word_race_client::supervisor::{ConnectParams, Connector};
use word_race_client::{Transport, WordRaceError};

// ── MockTransport ───────────────────────────────────────────────────

/// A scripted mock transport.
///
/// Scripted inbound items are consumed in order by `recv()`: `Some(Ok(_))`
/// is a text frame, `Some(Err(_))` a receive error, `None` an orderly close.
/// Once the script runs out, `recv()` hangs so the connection stays alive
/// until it is shut down.
pub struct MockTransport {
    incoming: VecDeque<Option<Result<String, WordRaceError>>>,
    /// Recorded outgoing messages from the client.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Whether `close()` has been called.
    pub closed: Arc<AtomicBool>,
}

impl MockTransport {
    /// Create a mock transport with the given scripted inbound items.
    ///
    /// Returns the transport plus shared handles for inspecting sent
    /// messages and whether close was called.
    #[allow(clippy::type_complexity)]
    pub fn new(
        incoming: Vec<Option<Result<String, WordRaceError>>>,
    ) -> (Self, Arc<StdMutex<Vec<String>>>, Arc<AtomicBool>) {
        let sent = Arc::new(StdMutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        let transport = Self {
            incoming: VecDeque::from(incoming),
            sent: Arc::clone(&sent),
            closed: Arc::clone(&closed),
        };
        (transport, sent, closed)
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&mut self, frame: String) -> Result<(), WordRaceError> {
        self.sent.lock().unwrap().push(frame);
        Ok(())
    }

    async fn recv(&mut self) -> Option<Result<String, WordRaceError>> {
        if let Some(item) = self.incoming.pop_front() {
            item
        } else {
            // Script exhausted: hang so the supervise loop stays alive
            // until shutdown.
            std::future::pending().await
        }
    }

    async fn close(&mut self) -> Result<(), WordRaceError> {
        self.closed.store(true, Ordering::Relaxed);
        Ok(())
    }
}

// ── MockConnector ───────────────────────────────────────────────────

/// One scripted connect attempt for [`MockConnector`].
pub enum ConnectScript {
    /// Connect succeeds, yielding a transport with these inbound items.
    Ok(Vec<Option<Result<String, WordRaceError>>>),
    /// Connect fails with a transport error.
    Fail,
}

/// A connector whose successive `connect()` calls consume a script.
///
/// Once the script runs out every further attempt fails, which is what an
/// exhaustion test wants. All transports handed out share one `sent` log
/// and one `closed` flag.
#[derive(Clone)]
pub struct MockConnector {
    script: Arc<StdMutex<VecDeque<ConnectScript>>>,
    /// Number of `connect()` calls observed.
    pub attempts: Arc<AtomicU32>,
    /// Outgoing messages across all transports handed out.
    pub sent: Arc<StdMutex<Vec<String>>>,
    /// Whether any handed-out transport was closed.
    pub closed: Arc<AtomicBool>,
    /// Params captured from the most recent `connect()` call.
    pub last_params: Arc<StdMutex<Option<ConnectParams>>>,
}

impl MockConnector {
    pub fn new(script: Vec<ConnectScript>) -> Self {
        Self {
            script: Arc::new(StdMutex::new(VecDeque::from(script))),
            attempts: Arc::new(AtomicU32::new(0)),
            sent: Arc::new(StdMutex::new(Vec::new())),
            closed: Arc::new(AtomicBool::new(false)),
            last_params: Arc::new(StdMutex::new(None)),
        }
    }

    /// A connector that always fails to connect.
    pub fn always_failing() -> Self {
        Self::new(Vec::new())
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Connector for MockConnector {
    type Conn = MockTransport;

    async fn connect(&self, params: &ConnectParams) -> Result<MockTransport, WordRaceError> {
        self.attempts.fetch_add(1, Ordering::Relaxed);
        *self.last_params.lock().unwrap() = Some(params.clone());
        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(ConnectScript::Ok(incoming)) => {
                let transport = MockTransport {
                    incoming: VecDeque::from(incoming),
                    sent: Arc::clone(&self.sent),
                    closed: Arc::clone(&self.closed),
                };
                Ok(transport)
            }
            Some(ConnectScript::Fail) | None => Err(WordRaceError::TransportReceive(
                "scripted connect failure".into(),
            )),
        }
    }
}

// ── JSON helper functions ───────────────────────────────────────────

/// An INFO frame with just a status.
pub fn info_json(status: &str) -> String {
    json!({"type": 1, "status": status}).to_string()
}

/// An INFO frame with a status and leader.
pub fn info_with_leader_json(status: &str, leader: &str) -> String {
    json!({"type": 1, "status": status, "leader": leader}).to_string()
}

/// An `in_progress` INFO frame carrying round, letters payload, and skips.
pub fn in_progress_json(round: u32, letters: &str, num_skips: u32) -> String {
    json!({
        "type": 1,
        "status": "in_progress",
        "round": round,
        "message": letters,
        "numSkips": num_skips,
    })
    .to_string()
}

/// An `error` INFO frame with a detail message.
pub fn error_info_json(message: &str) -> String {
    json!({"type": 1, "status": "error", "message": message}).to_string()
}

/// A COMM chat frame.
pub fn chat_json(player: &str, message: &str) -> String {
    json!({"type": 2, "player": player, "message": message}).to_string()
}

/// A BROADCAST frame with a message and no scores.
pub fn broadcast_json(message: &str) -> String {
    json!({"type": 3, "message": message}).to_string()
}

/// A SCORE frame from `(player, score)` pairs, preserving pair order.
pub fn score_json(pairs: &[(&str, i64)]) -> String {
    let mut scores = serde_json::Map::new();
    for (player, score) in pairs {
        scores.insert((*player).to_string(), json!(score));
    }
    json!({"type": 4, "scores": scores}).to_string()
}
