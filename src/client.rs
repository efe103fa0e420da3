//! High-level session engine for a Word Race lobby.
//!
//! [`LobbyClient`] wires the pieces together: it provisions a lobby over
//! HTTP, opens the supervised streaming connection, and runs a background
//! event pump that applies every inbound frame to the shared
//! [`LobbySession`] in strict arrival order. The presentation layer consumes
//! [`SessionEvent`]s from the receiver returned by the open calls and reads
//! state through [`LobbyClient::session`] snapshots.
//!
//! The pump owns the two fixed timers of the session (the round-transition
//! display window and the post-error navigation delay) as `select!` arms,
//! so tearing the pump down cancels them with it; a timer can never fire
//! into a dead session.
//!
//! # Example
//!
//! ```rust,ignore
//! let config = ClientConfig::new("http://peer:8000", "ws://peer:8000", "wr_key");
//! let connector = WebSocketConnector::new(&config.ws_url, &config.api_key);
//! let store = Arc::new(FileMarkerStore::new(profile_dir));
//! let mut client = LobbyClient::new(config, connector, store);
//!
//! if client.check_reload().await == ReloadDecision::StartOver {
//!     return; // back to the entry screen
//! }
//!
//! let mut events = client.create_session("Alice", true, 5).await?;
//! while let Some(event) = events.recv().await {
//!     match event {
//!         SessionEvent::PhaseChanged(phase) => { /* re-render */ }
//!         SessionEvent::NavigateToEntry => break,
//!         _ => {}
//!     }
//! }
//! ```

use std::pin::Pin;
use std::sync::{Arc, Mutex as StdMutex, MutexGuard};
use std::time::Duration;

use tokio::sync::{mpsc, oneshot};
use tokio::time::Sleep;
use tracing::{debug, warn};

use crate::config::ClientConfig;
use crate::error::{Result, WordRaceError};
use crate::protocol::ClientFrame;
use crate::provision::ProvisioningClient;
use crate::reload::{MarkerStore, ReloadDecision, ReloadGuard};
use crate::session::{LobbySession, Phase, SessionEvent};
use crate::supervisor::{
    ConnectParams, ConnectionEvent, ConnectionSender, ConnectionState, Connector, LobbyConnection,
};

/// Outcome of a join attempt.
#[derive(Debug)]
pub enum JoinOutcome {
    /// The lobby key was valid; the session is connecting.
    Joined(mpsc::Receiver<SessionEvent>),
    /// The peer rejected the key. No socket was opened; the caller shows
    /// inline "invalid lobby key" feedback.
    InvalidKey,
}

/// Session engine handle for one lobby at a time.
pub struct LobbyClient<C: Connector + Clone> {
    config: ClientConfig,
    connector: C,
    guard: ReloadGuard,
    session: Option<Arc<StdMutex<LobbySession>>>,
    sender: Option<ConnectionSender>,
    pump: Option<tokio::task::JoinHandle<()>>,
    pump_shutdown: Option<oneshot::Sender<()>>,
}

impl<C: Connector + Clone> LobbyClient<C> {
    pub fn new(config: ClientConfig, connector: C, store: Arc<dyn MarkerStore>) -> Self {
        Self {
            config,
            connector,
            guard: ReloadGuard::new(store),
            session: None,
            sender: None,
            pump: None,
            pump_shutdown: None,
        }
    }

    // ── Reload guard integration ────────────────────────────────────

    /// Consume the reload marker and decide whether to start over.
    ///
    /// On [`ReloadDecision::StartOver`] any live connection is force-closed
    /// and the session (with its lobby key) is dropped; an interrupted
    /// session never resumes.
    pub async fn check_reload(&mut self) -> ReloadDecision {
        let decision = self.guard.check_on_load();
        if decision == ReloadDecision::StartOver {
            self.shutdown().await;
            self.session = None;
        }
        decision
    }

    /// Record an unload. Persists the marker only while the connection is
    /// open.
    ///
    /// # Errors
    ///
    /// Returns an error if the marker could not be persisted.
    pub fn mark_unload(&self) -> Result<()> {
        self.guard.mark_unload(self.connection_state())
    }

    // ── Session lifecycle ───────────────────────────────────────────

    /// Provision a new lobby and open its streaming connection.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::Validation`] for an empty display name,
    /// [`WordRaceError::Provisioning`] if the peer is unreachable or returns
    /// an invalid key, and [`WordRaceError::AlreadyConnected`] if a
    /// connection is already active.
    pub async fn create_session(
        &mut self,
        display_name: &str,
        weighted_words: bool,
        total_rounds: u32,
    ) -> Result<mpsc::Receiver<SessionEvent>> {
        self.ensure_not_connected()?;
        let provisioning = ProvisioningClient::new(&self.config);
        let lobby = provisioning.create(display_name, weighted_words).await?;

        let mut session = LobbySession::new(display_name, weighted_words, total_rounds);
        session.provisioned(lobby.lobby_key);
        self.open_session(session)
    }

    /// Validate joining an existing lobby and, if the key is accepted, open
    /// its streaming connection. A rejected key is
    /// [`JoinOutcome::InvalidKey`], not an error, and opens no socket.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::Validation`] for an empty display name or
    /// lobby key, [`WordRaceError::Provisioning`] if the peer is
    /// unreachable, and [`WordRaceError::AlreadyConnected`] if a connection
    /// is already active.
    pub async fn join_session(
        &mut self,
        lobby_key: &str,
        display_name: &str,
        total_rounds: u32,
    ) -> Result<JoinOutcome> {
        self.ensure_not_connected()?;
        let provisioning = ProvisioningClient::new(&self.config);
        if !provisioning.join(lobby_key, display_name).await? {
            return Ok(JoinOutcome::InvalidKey);
        }

        let mut session = LobbySession::new(display_name, false, total_rounds);
        session.joined(lobby_key);
        Ok(JoinOutcome::Joined(self.open_session(session)?))
    }

    /// Open the streaming connection for an already-provisioned session and
    /// start the event pump.
    ///
    /// If the session has no lobby key yet the connection deliberately stays
    /// idle and the returned channel ends immediately.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::AlreadyConnected`] if a connection is
    /// already connecting or open for this client.
    pub fn open_session(
        &mut self,
        session: LobbySession,
    ) -> Result<mpsc::Receiver<SessionEvent>> {
        self.ensure_not_connected()?;

        let params = ConnectParams {
            lobby_key: session.lobby_key().to_string(),
            display_name: session.display_name().to_string(),
            weighted_words: session.weighted_words(),
            total_rounds: session.total_rounds(),
        };
        let (connection, conn_events) = LobbyConnection::open(
            self.connector.clone(),
            params,
            self.config.retry_policy,
            self.config.event_channel_capacity,
        );

        // Keep a sender clone for user actions and state queries; the
        // connection handle itself moves into the pump so the pump can
        // force-close it on a peer-reported error.
        let sender = connection.sender();

        let session = Arc::new(StdMutex::new(session));
        let (event_tx, event_rx) = mpsc::channel(self.config.event_channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let pump = tokio::spawn(pump_loop(PumpContext {
            connection,
            conn_events,
            session: Arc::clone(&session),
            event_tx,
            guard: self.guard.clone(),
            transition_delay: self.config.round_transition_delay,
            error_delay: self.config.error_redirect_delay,
            shutdown_rx,
        }));

        self.sender = Some(sender);
        self.session = Some(session);
        self.pump = Some(pump);
        self.pump_shutdown = Some(shutdown_tx);
        Ok(event_rx)
    }

    /// Shut down the pump and the connection, terminating the session.
    ///
    /// Idempotent; after it returns the event receiver yields `None`.
    pub async fn shutdown(&mut self) {
        debug!("LobbyClient: shutdown requested");

        if let Some(tx) = self.pump_shutdown.take() {
            let _ = tx.send(());
        }

        if let Some(mut pump) = self.pump.take() {
            match tokio::time::timeout(self.config.shutdown_timeout, &mut pump).await {
                Ok(Ok(())) => {}
                Ok(Err(join_err)) => {
                    warn!("event pump terminated with join error: {join_err}");
                }
                Err(_) => {
                    warn!("event pump did not exit within timeout, aborting task");
                    pump.abort();
                    if let Err(join_err) = pump.await {
                        debug!("event pump aborted: {join_err}");
                    }
                    // The aborted pump never got to terminate the session.
                    if let Some(session) = &self.session {
                        lock_session(session).terminate();
                    }
                }
            }
        }

        self.sender = None;
    }

    // ── User actions ────────────────────────────────────────────────

    /// Send a chat message.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::NotConnected`] if no connection is active.
    pub fn send_chat(&self, text: impl Into<String>) -> Result<()> {
        self.send_frame(ClientFrame::Chat(text.into()))
    }

    /// Start (or restart) the game. Meaningful only for the leader; the
    /// peer ignores it from anyone else.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::NotConnected`] if no connection is active.
    pub fn start_game(&self) -> Result<()> {
        self.send_frame(ClientFrame::StartGame)
    }

    /// Vote to skip the current word.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::NotConnected`] if no connection is active.
    pub fn skip_word(&self) -> Result<()> {
        self.send_frame(ClientFrame::SkipWord)
    }

    // ── State accessors ─────────────────────────────────────────────

    /// Snapshot of the current session state, if any.
    pub fn session(&self) -> Option<LobbySession> {
        self.session.as_ref().map(|s| lock_session(s).clone())
    }

    /// Current connection state ([`ConnectionState::Idle`] when no
    /// connection was ever opened).
    pub fn connection_state(&self) -> ConnectionState {
        self.sender
            .as_ref()
            .map_or(ConnectionState::Idle, ConnectionSender::state)
    }

    // ── Internals ───────────────────────────────────────────────────

    fn ensure_not_connected(&self) -> Result<()> {
        if self.sender.as_ref().is_some_and(ConnectionSender::is_active) {
            return Err(WordRaceError::AlreadyConnected);
        }
        Ok(())
    }

    fn send_frame(&self, frame: ClientFrame) -> Result<()> {
        match &self.sender {
            Some(sender) => sender.send(frame),
            None => Err(WordRaceError::NotConnected),
        }
    }
}

impl<C: Connector + Clone> std::fmt::Debug for LobbyClient<C> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LobbyClient")
            .field("connection", &self.connection_state())
            .field("has_session", &self.session.is_some())
            .field("has_pump", &self.pump.is_some())
            .finish()
    }
}

impl<C: Connector + Clone> Drop for LobbyClient<C> {
    fn drop(&mut self) {
        // No executor context to drive a graceful shutdown from `Drop`;
        // aborting the pump drops the connection handle, whose own `Drop`
        // aborts the supervise loop.
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
    }
}

/// Lock the shared session, recovering from a poisoned lock.
fn lock_session(session: &Arc<StdMutex<LobbySession>>) -> MutexGuard<'_, LobbySession> {
    match session.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

// ── Event pump ──────────────────────────────────────────────────────

struct PumpContext {
    connection: LobbyConnection,
    conn_events: mpsc::Receiver<ConnectionEvent>,
    session: Arc<StdMutex<LobbySession>>,
    event_tx: mpsc::Sender<SessionEvent>,
    guard: ReloadGuard,
    transition_delay: Duration,
    error_delay: Duration,
    shutdown_rx: oneshot::Receiver<()>,
}

/// Background pump: applies connection events to the session on a single
/// logical queue and drives the two fixed timers.
async fn pump_loop(mut ctx: PumpContext) {
    debug!("event pump started");

    let mut transition_timer: Option<Pin<Box<Sleep>>> = None;
    let mut error_timer: Option<Pin<Box<Sleep>>> = None;
    // Set once the connection event channel ends; an armed timer may still
    // owe the consumer a commit or a navigation event.
    let mut conn_done = false;

    loop {
        let transition_armed = transition_timer.is_some();
        let error_armed = error_timer.is_some();
        if conn_done && !transition_armed && !error_armed {
            break;
        }

        tokio::select! {
            _ = &mut ctx.shutdown_rx => {
                ctx.connection.close().await;
                let events = lock_session(&ctx.session).terminate();
                forward_all(&ctx.event_tx, events).await;
                break;
            }

            event = ctx.conn_events.recv(), if !conn_done => {
                let Some(event) = event else {
                    debug!("connection event channel ended");
                    conn_done = true;
                    continue;
                };
                match event {
                    ConnectionEvent::Opened => {
                        forward(&ctx.event_tx, SessionEvent::ConnectionOpened).await;
                    }
                    ConnectionEvent::Frame(frame) => {
                        let events = lock_session(&ctx.session).apply(&frame);
                        let mut errored = false;
                        for event in &events {
                            match event {
                                SessionEvent::PhaseChanged(Phase::RoundTransition) => {
                                    transition_timer =
                                        Some(Box::pin(tokio::time::sleep(ctx.transition_delay)));
                                }
                                SessionEvent::PhaseChanged(Phase::Errored) => errored = true,
                                _ => {}
                            }
                        }
                        forward_all(&ctx.event_tx, events).await;
                        if errored {
                            // A peer-reported error is terminal for the
                            // connection; the navigation delay starts now.
                            transition_timer = None;
                            ctx.connection.close().await;
                            error_timer = Some(Box::pin(tokio::time::sleep(ctx.error_delay)));
                        }
                    }
                    ConnectionEvent::Reconnecting { attempt } => {
                        forward(&ctx.event_tx, SessionEvent::Reconnecting { attempt }).await;
                    }
                    ConnectionEvent::Exhausted => {
                        forward(&ctx.event_tx, SessionEvent::ConnectionExhausted).await;
                        let events = lock_session(&ctx.session).terminate();
                        forward_all(&ctx.event_tx, events).await;
                        if let Err(e) = ctx.guard.clear() {
                            warn!("failed to clear reload marker: {e}");
                        }
                        forward(&ctx.event_tx, SessionEvent::NavigateToEntry).await;
                        break;
                    }
                    ConnectionEvent::Closed => {
                        forward(&ctx.event_tx, SessionEvent::ConnectionClosed).await;
                    }
                }
            }

            _ = wait_timer(&mut transition_timer), if transition_armed => {
                transition_timer = None;
                let events = lock_session(&ctx.session).commit_round_transition();
                forward_all(&ctx.event_tx, events).await;
            }

            _ = wait_timer(&mut error_timer), if error_armed => {
                if let Err(e) = ctx.guard.clear() {
                    warn!("failed to clear reload marker: {e}");
                }
                let events = lock_session(&ctx.session).terminate();
                forward_all(&ctx.event_tx, events).await;
                forward(&ctx.event_tx, SessionEvent::NavigateToEntry).await;
                break;
            }
        }
    }

    debug!("event pump exited");
}

/// Await an armed timer; pend forever when unarmed (the arm is disabled by
/// its precondition in that case, this is belt and braces).
async fn wait_timer(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer.as_mut() {
        Some(sleep) => sleep.await,
        None => std::future::pending().await,
    }
}

/// Forward one event to the consumer. Terminal events use a blocking send
/// and are never dropped; the rest are `try_send` so a slow consumer cannot
/// stall the pump.
async fn forward(event_tx: &mpsc::Sender<SessionEvent>, event: SessionEvent) {
    let terminal = matches!(
        event,
        SessionEvent::NavigateToEntry
            | SessionEvent::ConnectionExhausted
            | SessionEvent::PhaseChanged(Phase::Terminated)
    );
    if terminal {
        if event_tx.send(event).await.is_err() {
            debug!("session event channel closed, receiver dropped");
        }
        return;
    }
    match event_tx.try_send(event) {
        Ok(()) => {}
        Err(mpsc::error::TrySendError::Full(dropped)) => {
            warn!("session event channel full, dropping event: {dropped:?}");
        }
        Err(mpsc::error::TrySendError::Closed(_)) => {
            debug!("session event channel closed, receiver dropped");
        }
    }
}

async fn forward_all(event_tx: &mpsc::Sender<SessionEvent>, events: Vec<SessionEvent>) {
    for event in events {
        forward(event_tx, event).await;
    }
}
