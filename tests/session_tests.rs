#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Session state machine tests.
//!
//! Drives [`LobbySession`] with decoded frames the way the event pump does
//! and checks phases, round boundaries, scoreboard handling, and the edge
//! discipline of the transition table.

mod common;

use common::{
    broadcast_json, chat_json, error_info_json, in_progress_json, info_json,
    info_with_leader_json, score_json,
};
use word_race_client::{Letters, LobbySession, Phase, ServerFrame, SessionEvent};

fn decode(json: &str) -> ServerFrame {
    ServerFrame::decode(json).expect("decode")
}

fn session() -> LobbySession {
    let mut s = LobbySession::new("Alice", false, 5);
    s.provisioned("12345");
    s
}

#[test]
fn happy_path_through_one_game() {
    let mut s = session();
    assert_eq!(s.phase(), Phase::Provisioning);

    s.apply(&decode(&info_json("waiting")));
    assert_eq!(s.phase(), Phase::Waiting);

    s.apply(&decode(&info_with_leader_json("ready", "Alice")));
    assert_eq!(s.phase(), Phase::Ready);
    assert!(s.is_local_leader());

    s.apply(&decode(&in_progress_json(1, "ab", 0)));
    assert_eq!(s.phase(), Phase::InProgress);
    assert_eq!(s.round(), 1);
    assert_eq!(
        s.letters(),
        Some(Letters {
            first: 'a',
            last: 'b'
        })
    );

    s.apply(&decode(&info_json("completed")));
    assert_eq!(s.phase(), Phase::Completed);
    // Round and letters freeze for the results screen.
    assert_eq!(s.round(), 1);
    assert!(s.letters().is_some());
}

#[test]
fn first_frame_confirms_the_lobby_without_a_waiting_status() {
    // Joining a lobby that is already full: the peer's first frame reports
    // `ready`, never `waiting`.
    let mut s = LobbySession::new("Bob", false, 5);
    s.joined("12345");

    let events = s.apply(&decode(&info_with_leader_json("ready", "Alice")));
    assert_eq!(s.phase(), Phase::Ready);
    assert!(events.contains(&SessionEvent::PhaseChanged(Phase::Waiting)));
    assert!(events.contains(&SessionEvent::PhaseChanged(Phase::Ready)));

    s.apply(&decode(&in_progress_json(1, "ab", 0)));
    assert_eq!(s.phase(), Phase::InProgress);
}

#[test]
fn any_recognized_first_frame_leaves_provisioning() {
    let mut s = session();
    s.apply(&decode(&chat_json("Bob", "made it")));
    assert_eq!(s.phase(), Phase::Waiting);

    // Unrecognized tags do not count as contact.
    let mut s = session();
    s.apply(&decode(r#"{"type":42}"#));
    assert_eq!(s.phase(), Phase::Provisioning);
}

#[test]
fn leader_is_write_once() {
    let mut s = session();
    let events = s.apply(&decode(&info_with_leader_json("waiting", "Bob")));
    assert!(events.contains(&SessionEvent::LeaderObserved("Bob".into())));
    assert_eq!(s.leader_name(), Some("Bob"));
    assert!(!s.is_local_leader());

    // A later frame naming a different leader never overwrites the latch.
    let events = s.apply(&decode(&info_with_leader_json("waiting", "Carol")));
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::LeaderObserved(_))));
    assert_eq!(s.leader_name(), Some("Bob"));
}

#[test]
fn ready_entry_clears_scores() {
    let mut s = session();
    s.apply(&decode(&info_json("waiting")));
    s.apply(&decode(&score_json(&[("Alice", 3)])));
    assert!(!s.scores().is_empty());

    let events = s.apply(&decode(&info_json("ready")));
    assert!(s.scores().is_empty());
    assert!(events.contains(&SessionEvent::ScoresReplaced));
}

#[test]
fn ready_entry_with_empty_board_reports_no_score_change() {
    let mut s = session();
    s.apply(&decode(&info_json("waiting")));
    let events = s.apply(&decode(&info_json("ready")));
    assert_eq!(events, [SessionEvent::PhaseChanged(Phase::Ready)]);
}

#[test]
fn round_one_resets_scores_even_after_snapshot() {
    let mut s = session();
    s.apply(&decode(&info_json("waiting")));
    s.apply(&decode(&info_json("ready")));
    // Scores arriving between Ready and the first round belong to the
    // previous game.
    s.apply(&decode(&score_json(&[("Alice", 9), ("Bob", 7)])));
    s.apply(&decode(&in_progress_json(1, "ab", 0)));
    assert!(s.scores().is_empty());
}

#[test]
fn round_boundary_holds_behind_transition_window() {
    let mut s = session();
    s.apply(&decode(&info_json("waiting")));
    s.apply(&decode(&info_json("ready")));
    s.apply(&decode(&in_progress_json(2, "ab", 0)));
    assert_eq!(s.round(), 2);

    let events = s.apply(&decode(&in_progress_json(3, "cz", 0)));
    assert_eq!(s.phase(), Phase::RoundTransition);
    // The old round stays on display until the window expires.
    assert_eq!(s.round(), 2);
    assert_eq!(
        s.letters(),
        Some(Letters {
            first: 'a',
            last: 'b'
        })
    );
    assert!(events.iter().any(|e| matches!(
        e,
        SessionEvent::RoundTransitionStarted { round: 3, .. }
    )));

    let events = s.commit_round_transition();
    assert_eq!(s.phase(), Phase::InProgress);
    assert_eq!(s.round(), 3);
    assert_eq!(
        s.letters(),
        Some(Letters {
            first: 'c',
            last: 'z'
        })
    );
    assert!(events.contains(&SessionEvent::RoundCommitted { round: 3 }));
}

#[test]
fn late_commit_after_error_is_a_no_op() {
    let mut s = session();
    s.apply(&decode(&info_json("waiting")));
    s.apply(&decode(&info_json("ready")));
    s.apply(&decode(&in_progress_json(1, "ab", 0)));
    s.apply(&decode(&in_progress_json(2, "cz", 0)));
    assert_eq!(s.phase(), Phase::RoundTransition);

    s.apply(&decode(&error_info_json("lobby imploded")));
    assert_eq!(s.phase(), Phase::Errored);

    // The display-window timer firing now must not resurrect the round.
    let events = s.commit_round_transition();
    assert!(events.is_empty());
    assert_eq!(s.phase(), Phase::Errored);
    assert_eq!(s.round(), 1);
}

#[test]
fn same_round_refresh_updates_skips_in_place() {
    let mut s = session();
    s.apply(&decode(&info_json("waiting")));
    s.apply(&decode(&info_json("ready")));
    s.apply(&decode(&in_progress_json(1, "ab", 0)));

    let events = s.apply(&decode(&in_progress_json(1, "ab", 2)));
    assert_eq!(s.phase(), Phase::InProgress);
    assert_eq!(s.skip_count(), 2);
    assert!(!events
        .iter()
        .any(|e| matches!(e, SessionEvent::RoundTransitionStarted { .. })));
}

#[test]
fn scores_sort_descending_with_stable_ties() {
    let mut s = session();
    s.apply(&decode(&info_json("waiting")));
    s.apply(&decode(&score_json(&[("Amy", 2), ("Zed", 5), ("Mia", 2)])));
    let players: Vec<&str> = s
        .scores()
        .entries()
        .iter()
        .map(|e| e.player.as_str())
        .collect();
    // Ties keep arrival order: Amy before Mia.
    assert_eq!(players, ["Zed", "Amy", "Mia"]);
}

#[test]
fn skip_threshold_tracks_largest_roster_seen() {
    let mut s = session();
    s.apply(&decode(&info_json("waiting")));
    s.apply(&decode(&score_json(&[("A", 0), ("B", 0), ("C", 0)])));
    assert_eq!(s.skip_threshold(), 3);
    // A player leaving does not lower the threshold mid-round.
    s.apply(&decode(&score_json(&[("A", 1), ("B", 1)])));
    assert_eq!(s.skip_threshold(), 3);
}

#[test]
fn chat_log_is_append_only_with_speaker_prefix() {
    let mut s = session();
    s.apply(&decode(&chat_json("Bob", "hello")));
    s.apply(&decode(&broadcast_json("Round starting")));
    s.apply(&decode(&chat_json("Alice", "gl")));
    assert_eq!(
        s.chat_log(),
        ["Bob: hello", "LOBBY: Round starting", "Alice: gl"]
    );
}

#[test]
fn error_phase_is_terminal() {
    let mut s = session();
    s.apply(&decode(&info_json("waiting")));
    let events = s.apply(&decode(&error_info_json("boom")));
    assert_eq!(s.phase(), Phase::Errored);
    assert!(events.contains(&SessionEvent::ErrorReported(Some("boom".into()))));

    // No status can pull the session back out.
    for status in ["waiting", "ready", "completed"] {
        s.apply(&decode(&info_json(status)));
        assert_eq!(s.phase(), Phase::Errored);
    }
    s.apply(&decode(&in_progress_json(1, "ab", 0)));
    assert_eq!(s.phase(), Phase::Errored);

    // Explicit teardown is the one way forward.
    let events = s.terminate();
    assert_eq!(events, [SessionEvent::PhaseChanged(Phase::Terminated)]);
    assert_eq!(s.phase(), Phase::Terminated);
}

#[test]
fn rematch_restarts_from_completed() {
    let mut s = session();
    s.apply(&decode(&info_json("waiting")));
    s.apply(&decode(&info_json("ready")));
    s.apply(&decode(&in_progress_json(1, "ab", 0)));
    s.apply(&decode(&score_json(&[("Alice", 4)])));
    s.apply(&decode(&info_json("completed")));
    assert_eq!(s.phase(), Phase::Completed);

    // Rematch: straight back into round one with a clean scoreboard.
    s.apply(&decode(&in_progress_json(1, "xy", 0)));
    assert_eq!(s.phase(), Phase::InProgress);
    assert_eq!(s.round(), 1);
    assert!(s.scores().is_empty());
}

#[test]
fn unknown_frames_and_statuses_mutate_nothing() {
    let mut s = session();
    s.apply(&decode(&info_json("waiting")));
    let before = s.clone();

    assert!(s.apply(&decode(r#"{"type":42}"#)).is_empty());
    assert!(s.apply(&decode(r#"{"type":1,"status":"paused"}"#)).is_empty());
    assert_eq!(s.phase(), before.phase());
    assert_eq!(s.round(), before.round());
    assert_eq!(s.chat_log(), before.chat_log());
}

#[test]
fn terminate_is_idempotent() {
    let mut s = session();
    s.apply(&decode(&info_json("waiting")));
    let events = s.terminate();
    assert_eq!(events, [SessionEvent::PhaseChanged(Phase::Terminated)]);
    assert!(s.terminate().is_empty());
    assert_eq!(s.phase(), Phase::Terminated);
}

// ── Randomized edge discipline ──────────────────────────────────────

/// Tiny deterministic LCG, enough to shuffle statuses.
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        self.0 >> 33
    }
}

#[test]
fn random_frame_sequences_only_take_table_edges() {
    let frames = [
        info_json("waiting"),
        info_json("ready"),
        in_progress_json(1, "ab", 0),
        in_progress_json(2, "cd", 1),
        in_progress_json(3, "ef", 0),
        info_json("completed"),
        error_info_json("boom"),
        score_json(&[("A", 1), ("B", 2)]),
        chat_json("A", "hi"),
        info_json("bogus_status"),
    ];

    for seed in 0..64u64 {
        let mut rng = Lcg(seed.wrapping_mul(0x9E3779B97F4A7C15) | 1);
        let mut s = session();
        let mut phase = s.phase();
        for _ in 0..200 {
            let frame = &frames[(rng.next() % frames.len() as u64) as usize];
            let events = s.apply(&decode(frame));
            // Occasionally let a pending transition window expire.
            let ev2 = if rng.next() % 4 == 0 {
                s.commit_round_transition()
            } else {
                Vec::new()
            };
            for event in events.iter().chain(ev2.iter()) {
                if let SessionEvent::PhaseChanged(next) = event {
                    assert!(
                        allowed(phase, *next),
                        "seed {seed}: illegal edge {phase:?} -> {next:?}"
                    );
                    phase = *next;
                }
            }
            assert_eq!(phase, s.phase(), "seed {seed}: event stream lost a phase");
        }
    }
}

/// The reference transition table, written out independently.
fn allowed(from: Phase, to: Phase) -> bool {
    use Phase::*;
    if from == Terminated {
        return false;
    }
    if from == Errored {
        return to == Terminated;
    }
    if to == Terminated || to == Errored {
        return true;
    }
    matches!(
        (from, to),
        (Provisioning, Waiting)
            | (Waiting, Ready)
            | (Ready, Waiting)
            | (Ready, InProgress)
            | (InProgress, RoundTransition)
            | (RoundTransition, InProgress)
            | (InProgress, Completed)
            | (RoundTransition, Completed)
            | (Completed, InProgress)
            | (Completed, Waiting)
    )
}
