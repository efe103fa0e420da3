//! Connection supervision for the lobby streaming connection.
//!
//! [`LobbyConnection`] owns the lifecycle of the single streaming connection
//! for a lobby: open, bounded retry on unexpected drops, explicit close, and
//! guaranteed release on teardown. A background supervise loop multiplexes
//! outbound frames and inbound traffic via `tokio::select!` and emits
//! [`ConnectionEvent`]s on a bounded channel, in strict arrival order.
//!
//! Retrying is driven by an explicit [`RetryPolicy`] rather than free-running
//! timers: the retry sleep lives inside the supervise loop, so tearing the
//! loop down cancels any pending attempt with it.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, warn};

use crate::error::{Result, WordRaceError};
use crate::protocol::{ClientFrame, ServerFrame};
use crate::transport::Transport;

/// Default cap on reconnection attempts after unexpected drops.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

/// Default fixed delay between reconnection attempts.
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(2);

/// Timeout for the graceful close handshake before the task is aborted.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

// ── Parameters ──────────────────────────────────────────────────────

/// Parameters for opening the streaming connection. Retries reuse these
/// verbatim; they never change for the life of the connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectParams {
    pub lobby_key: String,
    pub display_name: String,
    pub weighted_words: bool,
    pub total_rounds: u32,
}

/// Bounded reconnect policy: a fixed number of attempts with a fixed
/// inter-attempt delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Maximum reconnection attempts after unexpected drops.
    pub max_retries: u32,
    /// Fixed delay before each reconnection attempt.
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            delay: DEFAULT_RETRY_DELAY,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, delay: Duration) -> Self {
        Self { max_retries, delay }
    }
}

// ── Connector seam ──────────────────────────────────────────────────

/// Factory for streaming transports.
///
/// The supervisor reconnects with identical parameters after a drop, so it
/// needs a factory rather than a single pre-connected [`Transport`]. The
/// WebSocket implementation lives in
/// [`WebSocketConnector`](crate::transports::WebSocketConnector); tests
/// script one that replays canned frames.
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Conn: Transport;

    /// Open a new transport for the given lobby.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection cannot be established; the
    /// supervisor treats that as an unexpected drop and applies the retry
    /// policy.
    async fn connect(&self, params: &ConnectParams) -> Result<Self::Conn>;
}

// ── State & events ──────────────────────────────────────────────────

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Never started (lobby key or display name was absent).
    Idle,
    /// Establishing (first attempt or a retry).
    Connecting,
    /// Live.
    Open,
    /// Closed on purpose (explicit close, peer handshake, teardown).
    Closed,
    /// Retry attempts exhausted.
    Failed,
}

/// Events emitted by the supervise loop, in strict arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum ConnectionEvent {
    /// The transport is live (also emitted after a successful retry).
    Opened,
    /// One decoded inbound frame.
    Frame(ServerFrame),
    /// The connection dropped unexpectedly; attempt `attempt` of the retry
    /// policy is scheduled.
    Reconnecting { attempt: u32 },
    /// The retry policy ran out of attempts. Emitted exactly once; the
    /// connection is `Failed` and will not recover.
    Exhausted,
    /// The connection closed for good without failing.
    Closed,
}

struct ConnectionShared {
    state: StdMutex<ConnectionState>,
    explicit_close: AtomicBool,
}

impl ConnectionShared {
    fn new(initial: ConnectionState) -> Self {
        Self {
            state: StdMutex::new(initial),
            explicit_close: AtomicBool::new(false),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, ConnectionState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn state(&self) -> ConnectionState {
        *self.lock_state()
    }

    fn set_state(&self, state: ConnectionState) {
        *self.lock_state() = state;
    }
}

// ── Handles ─────────────────────────────────────────────────────────

/// Cloneable sending half of a [`LobbyConnection`].
///
/// Lets the engine queue outbound frames while the connection itself lives
/// inside the event pump.
#[derive(Clone)]
pub struct ConnectionSender {
    cmd_tx: Option<mpsc::UnboundedSender<ClientFrame>>,
    shared: Arc<ConnectionShared>,
}

impl ConnectionSender {
    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether the connection is connecting or open.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Open
        )
    }

    /// Queue one outbound frame.
    ///
    /// Frames queued while a retry is pending are flushed once the
    /// connection reopens.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::ConnectionExhausted`] once the retry policy
    /// has run out, and [`WordRaceError::NotConnected`] if the connection is
    /// idle or closed.
    pub fn send(&self, frame: ClientFrame) -> Result<()> {
        match self.state() {
            ConnectionState::Connecting | ConnectionState::Open => {}
            ConnectionState::Failed => return Err(WordRaceError::ConnectionExhausted),
            ConnectionState::Idle | ConnectionState::Closed => {
                return Err(WordRaceError::NotConnected);
            }
        }
        match &self.cmd_tx {
            Some(tx) => tx.send(frame).map_err(|_| WordRaceError::NotConnected),
            None => Err(WordRaceError::NotConnected),
        }
    }
}

impl std::fmt::Debug for ConnectionSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSender")
            .field("state", &self.state())
            .finish()
    }
}

/// Handle to the supervised streaming connection for one lobby session.
///
/// At most one live connection exists per session: this handle *is* the
/// connection, and the engine refuses to open a second while one is active.
pub struct LobbyConnection {
    cmd_tx: Option<mpsc::UnboundedSender<ClientFrame>>,
    shared: Arc<ConnectionShared>,
    task: Option<tokio::task::JoinHandle<()>>,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl LobbyConnection {
    /// Open the streaming connection and return a handle plus the event
    /// receiver.
    ///
    /// When `lobby_key` or `display_name` is empty the connection is a
    /// deliberate no-op: the handle comes back immediately in `Idle` with no
    /// background task, and the event channel ends at once. Connection only
    /// starts once both are known.
    #[must_use = "the event receiver must be consumed to drive the session"]
    pub fn open<C: Connector>(
        connector: C,
        params: ConnectParams,
        policy: RetryPolicy,
        event_capacity: usize,
    ) -> (Self, mpsc::Receiver<ConnectionEvent>) {
        let (event_tx, event_rx) = mpsc::channel(event_capacity.max(1));

        if params.lobby_key.is_empty() || params.display_name.is_empty() {
            debug!("lobby key or display name absent, connection stays idle");
            drop(event_tx);
            let connection = Self {
                cmd_tx: None,
                shared: Arc::new(ConnectionShared::new(ConnectionState::Idle)),
                task: None,
                shutdown_tx: None,
            };
            return (connection, event_rx);
        }

        let shared = Arc::new(ConnectionShared::new(ConnectionState::Connecting));
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<ClientFrame>();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(supervise_loop(
            connector,
            params,
            policy,
            cmd_rx,
            event_tx,
            Arc::clone(&shared),
            shutdown_rx,
        ));

        let connection = Self {
            cmd_tx: Some(cmd_tx),
            shared,
            task: Some(task),
            shutdown_tx: Some(shutdown_tx),
        };
        (connection, event_rx)
    }

    /// Current connection state.
    pub fn state(&self) -> ConnectionState {
        self.shared.state()
    }

    /// Whether the connection is connecting or open.
    pub fn is_active(&self) -> bool {
        matches!(
            self.state(),
            ConnectionState::Connecting | ConnectionState::Open
        )
    }

    /// A cloneable sending half of this connection.
    pub fn sender(&self) -> ConnectionSender {
        ConnectionSender {
            cmd_tx: self.cmd_tx.clone(),
            shared: Arc::clone(&self.shared),
        }
    }

    /// Queue one outbound frame.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::ConnectionExhausted`] once the retry policy
    /// has run out, and [`WordRaceError::NotConnected`] if the connection is
    /// idle or closed.
    pub fn send(&self, frame: ClientFrame) -> Result<()> {
        self.sender().send(frame)
    }

    /// Close the connection explicitly. Never triggers a retry.
    ///
    /// Cancels any pending retry sleep, closes the transport, and waits for
    /// the supervise loop with a short timeout before aborting it.
    pub async fn close(&mut self) {
        debug!("explicit connection close requested");
        self.shared.explicit_close.store(true, Ordering::Release);

        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }

        if let Some(mut task) = self.task.take() {
            match tokio::time::timeout(CLOSE_TIMEOUT, &mut task).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("supervise loop terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("supervise loop did not exit within timeout, aborting task");
                    task.abort();
                    if let Err(join_err) = task.await {
                        debug!("supervise loop aborted: {join_err}");
                    }
                }
            }
        }

        let mut state = self.shared.lock_state();
        if *state != ConnectionState::Failed {
            *state = ConnectionState::Closed;
        }
    }
}

impl std::fmt::Debug for LobbyConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbyConnection")
            .field("state", &self.state())
            .field("has_task", &self.task.is_some())
            .finish()
    }
}

impl Drop for LobbyConnection {
    fn drop(&mut self) {
        // `Drop` is synchronous, so a graceful close cannot be awaited here.
        // Aborting the task drops the supervise loop future, which releases
        // the transport and cancels any pending retry sleep.
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

// ── Supervise loop ──────────────────────────────────────────────────

/// Background loop: connect, pump frames, retry on unexpected drops up to
/// the policy cap, exit on explicit close or exhaustion.
async fn supervise_loop<C: Connector>(
    connector: C,
    params: ConnectParams,
    policy: RetryPolicy,
    mut cmd_rx: mpsc::UnboundedReceiver<ClientFrame>,
    event_tx: mpsc::Sender<ConnectionEvent>,
    shared: Arc<ConnectionShared>,
    mut shutdown_rx: oneshot::Receiver<()>,
) {
    debug!(lobby_key = %params.lobby_key, "supervise loop started");
    let mut retry_count: u32 = 0;

    loop {
        let mut transport = match connector.connect(&params).await {
            Ok(transport) => transport,
            Err(e) => {
                warn!(error = %e, "lobby connection attempt failed");
                if schedule_retry(&mut retry_count, policy, &shared, &event_tx, &mut shutdown_rx)
                    .await
                {
                    continue;
                }
                return;
            }
        };

        shared.set_state(ConnectionState::Open);
        retry_count = 0;
        send_lifecycle(&event_tx, ConnectionEvent::Opened).await;

        let dropped =
            pump_transport(&mut transport, &mut cmd_rx, &event_tx, &mut shutdown_rx).await;

        match dropped {
            PumpExit::Shutdown => {
                let _ = transport.close().await;
                shared.set_state(ConnectionState::Closed);
                send_lifecycle(&event_tx, ConnectionEvent::Closed).await;
                return;
            }
            PumpExit::UnexpectedDrop => {
                if shared.explicit_close.load(Ordering::Acquire) {
                    // The drop raced an explicit close; do not retry.
                    shared.set_state(ConnectionState::Closed);
                    send_lifecycle(&event_tx, ConnectionEvent::Closed).await;
                    return;
                }
                if !schedule_retry(&mut retry_count, policy, &shared, &event_tx, &mut shutdown_rx)
                    .await
                {
                    return;
                }
            }
        }
    }
}

enum PumpExit {
    /// Explicit close or client handle dropped. Never retried.
    Shutdown,
    /// The peer closed the connection or the transport errored.
    UnexpectedDrop,
}

/// Pump one live transport until it drops or the connection is shut down.
async fn pump_transport(
    transport: &mut impl Transport,
    cmd_rx: &mut mpsc::UnboundedReceiver<ClientFrame>,
    event_tx: &mpsc::Sender<ConnectionEvent>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> PumpExit {
    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                match cmd {
                    Some(frame) => match frame.encode() {
                        Ok(json) => {
                            if let Err(e) = transport.send(json).await {
                                error!("transport send error: {e}");
                                return PumpExit::UnexpectedDrop;
                            }
                        }
                        Err(e) => {
                            // Encoding failures are programming bugs; the
                            // connection stays up.
                            error!("failed to encode outbound frame: {e}");
                        }
                    },
                    None => {
                        debug!("command channel closed, shutting down connection");
                        return PumpExit::Shutdown;
                    }
                }
            }

            _ = &mut *shutdown_rx => {
                debug!("shutdown signal received");
                return PumpExit::Shutdown;
            }

            incoming = transport.recv() => {
                match incoming {
                    Some(Ok(text)) => match ServerFrame::decode(&text) {
                        Ok(frame) => emit_frame(event_tx, frame).await,
                        Err(e) => {
                            warn!(error = %e, raw = %text, "discarding malformed frame");
                        }
                    },
                    Some(Err(e)) => {
                        error!("transport receive error: {e}");
                        return PumpExit::UnexpectedDrop;
                    }
                    None => {
                        debug!("peer closed the connection");
                        return PumpExit::UnexpectedDrop;
                    }
                }
            }
        }
    }
}

/// Count one unexpected drop and either sleep out the fixed retry delay
/// (returning `true` to reconnect) or exhaust the policy (returning `false`
/// after emitting [`ConnectionEvent::Exhausted`] exactly once).
async fn schedule_retry(
    retry_count: &mut u32,
    policy: RetryPolicy,
    shared: &ConnectionShared,
    event_tx: &mpsc::Sender<ConnectionEvent>,
    shutdown_rx: &mut oneshot::Receiver<()>,
) -> bool {
    *retry_count += 1;
    if *retry_count > policy.max_retries {
        warn!(max_retries = policy.max_retries, "connection retry attempts exhausted");
        shared.set_state(ConnectionState::Failed);
        send_lifecycle(event_tx, ConnectionEvent::Exhausted).await;
        return false;
    }

    shared.set_state(ConnectionState::Connecting);
    debug!(attempt = *retry_count, delay = ?policy.delay, "scheduling reconnect");
    send_lifecycle(
        event_tx,
        ConnectionEvent::Reconnecting {
            attempt: *retry_count,
        },
    )
    .await;

    tokio::select! {
        _ = tokio::time::sleep(policy.delay) => true,
        _ = shutdown_rx => {
            debug!("shutdown during retry delay, cancelling reconnect");
            shared.set_state(ConnectionState::Closed);
            send_lifecycle(event_tx, ConnectionEvent::Closed).await;
            false
        }
    }
}

/// Emit a frame event. If the channel is full the frame is dropped with a
/// warning so a slow consumer cannot stall the supervise loop.
async fn emit_frame(event_tx: &mpsc::Sender<ConnectionEvent>, frame: ServerFrame) {
    match event_tx.try_send(ConnectionEvent::Frame(frame)) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("event channel full, dropping frame: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("event channel closed, receiver dropped");
        }
    }
}

/// Emit a lifecycle event with a blocking send: `Opened`, `Reconnecting`,
/// `Exhausted`, and `Closed` must never be silently dropped.
async fn send_lifecycle(event_tx: &mpsc::Sender<ConnectionEvent>, event: ConnectionEvent) {
    if event_tx.send(event).await.is_err() {
        debug!("event channel closed, receiver dropped");
    }
}

// ── Tests ───────────────────────────────────────────────────────────

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::todo,
    clippy::unimplemented,
    clippy::indexing_slicing
)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_defaults() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, DEFAULT_MAX_RETRIES);
        assert_eq!(policy.delay, DEFAULT_RETRY_DELAY);
    }

    #[tokio::test]
    async fn open_without_lobby_key_stays_idle() {
        struct NeverConnector;

        #[async_trait]
        impl Connector for NeverConnector {
            type Conn = NeverTransport;
            async fn connect(&self, _params: &ConnectParams) -> Result<Self::Conn> {
                panic!("connect must not be called for an idle connection");
            }
        }

        struct NeverTransport;

        #[async_trait]
        impl Transport for NeverTransport {
            async fn send(&mut self, _frame: String) -> Result<()> {
                Ok(())
            }
            async fn recv(&mut self) -> Option<Result<String>> {
                None
            }
            async fn close(&mut self) -> Result<()> {
                Ok(())
            }
        }

        let params = ConnectParams {
            lobby_key: String::new(),
            display_name: "Alice".into(),
            weighted_words: false,
            total_rounds: 3,
        };
        let (connection, mut events) =
            LobbyConnection::open(NeverConnector, params, RetryPolicy::default(), 8);

        assert_eq!(connection.state(), ConnectionState::Idle);
        assert!(!connection.is_active());
        assert!(events.recv().await.is_none());
        assert!(matches!(
            connection.send(ClientFrame::StartGame),
            Err(WordRaceError::NotConnected)
        ));
    }
}
