//! Session state machine for an active lobby.
//!
//! [`LobbySession`] is the single source of truth rendered by the
//! presentation layer: lifecycle phase, round progress, scoreboard, and chat
//! transcript. Inbound frames are applied through [`LobbySession::apply`],
//! which enforces the phase transition table and returns the
//! [`SessionEvent`]s the change produced. The session never touches the
//! network; the connection supervisor feeds it frames and reacts to the
//! events it emits.

use tracing::{debug, warn};

use crate::protocol::{InfoFrame, Letters, LobbyStatus, ScoreEntry, ServerFrame};

// ── Phase ───────────────────────────────────────────────────────────

/// Lifecycle phase of a lobby session. Exactly one is active at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Lobby key not yet confirmed by the peer.
    Provisioning,
    /// Connected, waiting for enough players.
    Waiting,
    /// Enough players present; the leader may start.
    Ready,
    /// A round is being played.
    InProgress,
    /// Holding the display window between two rounds.
    RoundTransition,
    /// All rounds played; a rematch may be started.
    Completed,
    /// The peer reported a fatal error. Only explicit teardown follows.
    Errored,
    /// Explicit teardown. Nothing leaves this phase.
    Terminated,
}

/// Whether the transition table permits `from → to`.
///
/// Same-phase "transitions" are handled by the caller (they are no-ops, not
/// edges), so `from == to` never reaches this check except for the
/// intra-state `InProgress` refresh which the caller also short-circuits.
fn edge_allowed(from: Phase, to: Phase) -> bool {
    use Phase::*;
    match (from, to) {
        // Nothing leaves Terminated; Errored only yields to explicit teardown.
        (Terminated, _) => false,
        (Errored, Terminated) => true,
        (Errored, _) => false,
        (_, Terminated) | (_, Errored) => true,
        (Provisioning, Waiting) => true,
        (Waiting, Ready) => true,
        (Ready, Waiting) => true,
        (Ready, InProgress) => true,
        (InProgress, RoundTransition) => true,
        (RoundTransition, InProgress) => true,
        (InProgress, Completed) | (RoundTransition, Completed) => true,
        (Completed, InProgress) => true,
        (Completed, Waiting) => true,
        _ => false,
    }
}

// ── Scoreboard ──────────────────────────────────────────────────────

/// Scoreboard rebuilt wholesale from peer snapshots, never patched.
///
/// Entries are kept sorted descending by score; ties keep the arrival order
/// of the underlying snapshot (stable sort), so re-delivering the same
/// snapshot is idempotent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScoreBoard {
    entries: Vec<ScoreEntry>,
}

impl ScoreBoard {
    /// Replace the whole board with a new snapshot.
    pub fn replace(&mut self, mut entries: Vec<ScoreEntry>) {
        entries.sort_by(|a, b| b.score.cmp(&a.score));
        self.entries = entries;
    }

    /// Drop all entries (round-one reset, waiting→ready reset).
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Rows in display order.
    pub fn entries(&self) -> &[ScoreEntry] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

// ── Events ──────────────────────────────────────────────────────────

/// Observable changes produced by the session (and its supervisor).
///
/// The presentation layer renders these; it never inspects internals beyond
/// the [`LobbySession`] snapshot accessors.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// The lifecycle phase changed.
    PhaseChanged(Phase),
    /// The leader was observed for the first time. Never re-emitted.
    LeaderObserved(String),
    /// A line was appended to the chat transcript.
    ChatAppended(String),
    /// The scoreboard was rebuilt from a snapshot.
    ScoresReplaced,
    /// A round boundary was reached; the new round is held until the
    /// transitional display window elapses.
    RoundTransitionStarted { round: u32, letters: Letters },
    /// The held round was committed after the display window.
    RoundCommitted { round: u32 },
    /// The peer reported a fatal error (leader disconnected, lobby gone).
    ErrorReported(Option<String>),
    /// The streaming connection is open.
    ConnectionOpened,
    /// The connection dropped unexpectedly; a bounded reopen is scheduled.
    Reconnecting { attempt: u32 },
    /// The reconnect policy ran out of attempts. Fatal for the session.
    ConnectionExhausted,
    /// The connection closed for good.
    ConnectionClosed,
    /// The session is over; the presentation layer should return to the
    /// entry screen.
    NavigateToEntry,
}

// ── Session ─────────────────────────────────────────────────────────

/// A round boundary observed but not yet committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingRound {
    round: u32,
    letters: Letters,
    num_skips: u32,
}

/// The aggregate root for one lobby session.
#[derive(Debug, Clone)]
pub struct LobbySession {
    lobby_key: String,
    display_name: String,
    weighted_words: bool,
    leader_name: Option<String>,
    phase: Phase,
    round: u32,
    total_rounds: u32,
    letters: Option<Letters>,
    skip_count: u32,
    skip_threshold: u32,
    scores: ScoreBoard,
    chat_log: Vec<String>,
    has_provisioned: bool,
    has_joined: bool,
    pending_round: Option<PendingRound>,
}

impl LobbySession {
    /// Create a session in the `Provisioning` phase.
    ///
    /// `display_name` is assumed non-empty; the provisioning client enforces
    /// that before any session exists.
    pub fn new(display_name: impl Into<String>, weighted_words: bool, total_rounds: u32) -> Self {
        Self {
            lobby_key: String::new(),
            display_name: display_name.into(),
            weighted_words,
            leader_name: None,
            phase: Phase::Provisioning,
            round: 1,
            total_rounds: total_rounds.max(1),
            letters: None,
            skip_count: 0,
            skip_threshold: 0,
            scores: ScoreBoard::default(),
            chat_log: Vec::new(),
            has_provisioned: false,
            has_joined: false,
            pending_round: None,
        }
    }

    // ── Accessors ───────────────────────────────────────────────────

    pub fn lobby_key(&self) -> &str {
        &self.lobby_key
    }

    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    pub fn weighted_words(&self) -> bool {
        self.weighted_words
    }

    /// The leader as first observed. `None` until the first INFO frame.
    pub fn leader_name(&self) -> Option<&str> {
        self.leader_name.as_deref()
    }

    /// Whether the local player is the leader (may start rounds).
    pub fn is_local_leader(&self) -> bool {
        self.leader_name.as_deref() == Some(self.display_name.as_str())
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn round(&self) -> u32 {
        self.round
    }

    pub fn total_rounds(&self) -> u32 {
        self.total_rounds
    }

    /// Current letter constraint; only meaningful while a round is live.
    pub fn letters(&self) -> Option<Letters> {
        self.letters
    }

    pub fn skip_count(&self) -> u32 {
        self.skip_count
    }

    pub fn skip_threshold(&self) -> u32 {
        self.skip_threshold
    }

    pub fn scores(&self) -> &ScoreBoard {
        &self.scores
    }

    pub fn chat_log(&self) -> &[String] {
        &self.chat_log
    }

    pub fn has_provisioned(&self) -> bool {
        self.has_provisioned
    }

    pub fn has_joined(&self) -> bool {
        self.has_joined
    }

    // ── Provisioning hooks ──────────────────────────────────────────

    /// Record a freshly created lobby key. The key is write-once.
    pub fn provisioned(&mut self, lobby_key: impl Into<String>) {
        if self.lobby_key.is_empty() {
            self.lobby_key = lobby_key.into();
        }
        self.has_provisioned = true;
    }

    /// Record a validated join of an existing lobby. The key is write-once.
    pub fn joined(&mut self, lobby_key: impl Into<String>) {
        if self.lobby_key.is_empty() {
            self.lobby_key = lobby_key.into();
        }
        self.has_joined = true;
    }

    // ── Frame application ───────────────────────────────────────────

    /// Apply one inbound frame and return the changes it produced.
    ///
    /// Frames must be applied in arrival order; every mutation from frame N
    /// is visible before frame N+1 is interpreted. Unknown frames produce no
    /// mutation.
    pub fn apply(&mut self, frame: &ServerFrame) -> Vec<SessionEvent> {
        let mut events = Vec::new();

        // The first recognized frame confirms the lobby key, even when the
        // peer never reports `waiting` (joining a lobby that is already full
        // or mid-game goes straight to a later status).
        if self.phase == Phase::Provisioning && !matches!(frame, ServerFrame::Unknown { .. }) {
            self.enter(Phase::Waiting, &mut events);
        }

        match frame {
            ServerFrame::Info(info) => self.apply_info(info, &mut events),
            ServerFrame::Chat { player, message } => {
                let line = format!("{player}: {message}");
                self.chat_log.push(line.clone());
                events.push(SessionEvent::ChatAppended(line));
            }
            ServerFrame::Broadcast { message, scores } => {
                if let Some(message) = message {
                    let line = format!("LOBBY: {message}");
                    self.chat_log.push(line.clone());
                    events.push(SessionEvent::ChatAppended(line));
                }
                if let Some(scores) = scores {
                    self.replace_scores(scores.clone(), &mut events);
                }
            }
            ServerFrame::Score { scores } => {
                self.replace_scores(scores.clone(), &mut events);
            }
            ServerFrame::Unknown { tag } => {
                warn!(tag, "ignoring frame with unrecognized tag");
            }
        }

        events
    }

    /// Commit a held round boundary after the transitional display window.
    ///
    /// A no-op if the session left `RoundTransition` in the meantime (error,
    /// completion, teardown), so a late timer can never mutate a dead state.
    pub fn commit_round_transition(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        let Some(pending) = self.pending_round.take() else {
            return events;
        };
        if self.phase != Phase::RoundTransition {
            debug!(phase = ?self.phase, "round transition window expired outside RoundTransition");
            return events;
        }
        self.enter(Phase::InProgress, &mut events);
        self.commit_round(
            pending.round,
            Some(pending.letters),
            pending.num_skips,
            &mut events,
        );
        events.push(SessionEvent::RoundCommitted {
            round: pending.round,
        });
        events
    }

    /// Tear the session down. Valid from any phase; idempotent.
    pub fn terminate(&mut self) -> Vec<SessionEvent> {
        self.pending_round = None;
        let mut events = Vec::new();
        self.enter(Phase::Terminated, &mut events);
        events
    }

    /// Latch the leader on a first-writer-wins basis.
    ///
    /// Later frames reporting a different leader never overwrite the first
    /// observation, even if the peer promoted a new leader mid-session.
    pub fn observe_leader(&mut self, candidate: &str) -> bool {
        if candidate.is_empty() || self.leader_name.is_some() {
            return false;
        }
        self.leader_name = Some(candidate.to_string());
        true
    }

    // ── Internals ───────────────────────────────────────────────────

    fn apply_info(&mut self, info: &InfoFrame, events: &mut Vec<SessionEvent>) {
        if let Some(leader) = &info.leader {
            if self.observe_leader(leader) {
                events.push(SessionEvent::LeaderObserved(leader.clone()));
            }
        }
        if let Some(num_rounds) = info.num_rounds {
            if num_rounds >= 1 {
                self.total_rounds = num_rounds;
            }
        }

        match info.status {
            LobbyStatus::Waiting => {
                self.enter(Phase::Waiting, events);
            }
            LobbyStatus::Ready => {
                if self.enter(Phase::Ready, events) {
                    self.clear_scores(events);
                }
            }
            LobbyStatus::InProgress => self.apply_in_progress(info, events),
            LobbyStatus::Completed => {
                // Round and letters freeze as-is for the results screen.
                self.pending_round = None;
                self.enter(Phase::Completed, events);
            }
            LobbyStatus::Error => {
                self.pending_round = None;
                self.enter(Phase::Errored, events);
                events.push(SessionEvent::ErrorReported(info.message.clone()));
            }
            LobbyStatus::Unknown => {
                warn!("ignoring INFO frame with unrecognized status");
            }
        }
    }

    fn apply_in_progress(&mut self, info: &InfoFrame, events: &mut Vec<SessionEvent>) {
        let round = info.round.unwrap_or(self.round).max(1);
        let letters = info.message.as_deref().and_then(Letters::from_payload);
        let num_skips = info.num_skips.unwrap_or(0);

        let in_play = matches!(self.phase, Phase::InProgress | Phase::RoundTransition);
        if !in_play {
            // Game (or rematch) start: round-local display state resets.
            if !self.enter(Phase::InProgress, events) {
                return;
            }
            self.letters = None;
            self.skip_count = 0;
            self.commit_round(round, letters, num_skips, events);
            return;
        }

        if round > 1 && round > self.round {
            if let Some(letters) = letters {
                // Round boundary: hold the new letters behind the display
                // window instead of flashing them over the old round.
                self.pending_round = Some(PendingRound {
                    round,
                    letters,
                    num_skips,
                });
                self.enter(Phase::RoundTransition, events);
                events.push(SessionEvent::RoundTransitionStarted { round, letters });
                return;
            }
            debug!(round, "round advanced without a two-letter payload, committing directly");
            self.commit_round(round, None, num_skips, events);
            return;
        }

        // Same-round refresh: skip progress and letters update in place.
        self.skip_count = num_skips;
        if let Some(letters) = letters {
            self.letters = Some(letters);
        }
        if round == 1 {
            self.clear_scores(events);
        }
    }

    fn commit_round(
        &mut self,
        round: u32,
        letters: Option<Letters>,
        num_skips: u32,
        events: &mut Vec<SessionEvent>,
    ) {
        // `round` never exceeds `total_rounds`.
        self.total_rounds = self.total_rounds.max(round);
        self.round = round;
        if let Some(letters) = letters {
            self.letters = Some(letters);
        }
        self.skip_count = num_skips;
        if round == 1 {
            // Round one is the authoritative score reset point, regardless
            // of any earlier SCORE or BROADCAST snapshot.
            self.clear_scores(events);
        }
    }

    /// Clear the board and report it, unless it is already empty.
    fn clear_scores(&mut self, events: &mut Vec<SessionEvent>) {
        if !self.scores.is_empty() {
            self.scores.clear();
            events.push(SessionEvent::ScoresReplaced);
        }
    }

    fn replace_scores(&mut self, scores: Vec<ScoreEntry>, events: &mut Vec<SessionEvent>) {
        self.skip_threshold = self.skip_threshold.max(scores.len() as u32);
        self.scores.replace(scores);
        events.push(SessionEvent::ScoresReplaced);
    }

    /// Move to `to` if the transition table allows it. Same-phase entries
    /// are silent no-ops; disallowed edges are logged and dropped.
    fn enter(&mut self, to: Phase, events: &mut Vec<SessionEvent>) -> bool {
        if self.phase == to {
            return false;
        }
        if !edge_allowed(self.phase, to) {
            warn!(from = ?self.phase, to = ?to, "ignoring invalid phase transition");
            return false;
        }
        debug!(from = ?self.phase, to = ?to, "phase transition");
        self.phase = to;
        events.push(SessionEvent::PhaseChanged(to));
        true
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

    fn entry(player: &str, score: i64) -> ScoreEntry {
        ScoreEntry {
            player: player.into(),
            score,
        }
    }

    #[test]
    fn scoreboard_sorts_descending_with_stable_ties() {
        let mut board = ScoreBoard::default();
        board.replace(vec![entry("zed", 3), entry("abe", 7), entry("mia", 3)]);
        let order: Vec<(&str, i64)> = board
            .entries()
            .iter()
            .map(|e| (e.player.as_str(), e.score))
            .collect();
        assert_eq!(order, [("abe", 7), ("zed", 3), ("mia", 3)]);
    }

    #[test]
    fn scoreboard_replace_is_idempotent() {
        let snapshot = vec![entry("zed", 3), entry("abe", 3)];
        let mut board = ScoreBoard::default();
        board.replace(snapshot.clone());
        let first = board.clone();
        board.replace(snapshot);
        assert_eq!(board, first);
    }

    #[test]
    fn lobby_key_is_write_once() {
        let mut session = LobbySession::new("Alice", false, 3);
        session.provisioned("4821");
        session.provisioned("9999");
        assert_eq!(session.lobby_key(), "4821");
        assert!(session.has_provisioned());
    }

    #[test]
    fn leader_is_write_once() {
        let mut session = LobbySession::new("Alice", false, 3);
        assert!(session.observe_leader("Alice"));
        assert!(!session.observe_leader("Bob"));
        assert_eq!(session.leader_name(), Some("Alice"));
        assert!(session.is_local_leader());
    }

    #[test]
    fn terminate_is_idempotent_and_final() {
        let mut session = LobbySession::new("Alice", false, 3);
        let events = session.terminate();
        assert_eq!(events, [SessionEvent::PhaseChanged(Phase::Terminated)]);
        assert!(session.terminate().is_empty());
        assert_eq!(session.phase(), Phase::Terminated);
    }

    #[test]
    fn commit_without_pending_round_is_a_no_op() {
        let mut session = LobbySession::new("Alice", false, 3);
        assert!(session.commit_round_transition().is_empty());
    }
}
