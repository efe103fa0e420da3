#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::panic,
    clippy::indexing_slicing
)]
//! Wire-format tests for the Word Race frame protocol.
//!
//! Exercises decoding of realistic peer frames, tolerance of unknown tags
//! and statuses, and the arrival-order guarantee for score snapshots.

mod common;

use common::{chat_json, in_progress_json, info_with_leader_json, score_json};
use word_race_client::{ClientFrame, Letters, LobbyStatus, ServerFrame, WordRaceError};

#[test]
fn decode_full_info_frame() {
    let json = r#"{"type":1,"status":"in_progress","leader":"Alice","round":3,"message":"cz","numRounds":5,"numSkips":2}"#;
    let frame = ServerFrame::decode(json).expect("decode");
    let ServerFrame::Info(info) = frame else {
        panic!("expected Info, got {frame:?}");
    };
    assert_eq!(info.status, LobbyStatus::InProgress);
    assert_eq!(info.leader.as_deref(), Some("Alice"));
    assert_eq!(info.round, Some(3));
    assert_eq!(info.message.as_deref(), Some("cz"));
    assert_eq!(info.num_rounds, Some(5));
    assert_eq!(info.num_skips, Some(2));
}

#[test]
fn decode_helper_built_frames() {
    let frame = ServerFrame::decode(&info_with_leader_json("waiting", "Bob")).expect("decode");
    let ServerFrame::Info(info) = frame else {
        panic!("expected Info");
    };
    assert_eq!(info.status, LobbyStatus::Waiting);
    assert_eq!(info.leader.as_deref(), Some("Bob"));

    let frame = ServerFrame::decode(&in_progress_json(2, "ab", 1)).expect("decode");
    let ServerFrame::Info(info) = frame else {
        panic!("expected Info");
    };
    assert_eq!(info.round, Some(2));
    assert_eq!(
        info.message.as_deref().and_then(Letters::from_payload),
        Some(Letters {
            first: 'a',
            last: 'b'
        })
    );
}

#[test]
fn decode_chat_accepts_display_name_alias() {
    let json = r#"{"type":2,"display_name":"Carol","message":"hello"}"#;
    let frame = ServerFrame::decode(json).expect("decode");
    assert_eq!(
        frame,
        ServerFrame::Chat {
            player: "Carol".into(),
            message: "hello".into()
        }
    );

    let frame = ServerFrame::decode(&chat_json("Dave", "hi")).expect("decode");
    assert_eq!(
        frame,
        ServerFrame::Chat {
            player: "Dave".into(),
            message: "hi".into()
        }
    );
}

#[test]
fn decode_broadcast_with_and_without_scores() {
    let json = r#"{"type":3,"message":"Round over!","scores":{"Alice":3,"Bob":1}}"#;
    let frame = ServerFrame::decode(json).expect("decode");
    let ServerFrame::Broadcast { message, scores } = frame else {
        panic!("expected Broadcast");
    };
    assert_eq!(message.as_deref(), Some("Round over!"));
    let scores = scores.expect("scores");
    assert_eq!(scores.len(), 2);
    assert_eq!(scores[0].player, "Alice");
    assert_eq!(scores[1].score, 1);

    let frame = ServerFrame::decode(r#"{"type":3,"message":"hi"}"#).expect("decode");
    assert_eq!(
        frame,
        ServerFrame::Broadcast {
            message: Some("hi".into()),
            scores: None
        }
    );
}

#[test]
fn score_snapshot_preserves_arrival_order() {
    // Ties must keep the peer's ordering; decoding must not reorder keys.
    let json = score_json(&[("Zed", 2), ("Amy", 2), ("Mia", 2)]);
    let frame = ServerFrame::decode(&json).expect("decode");
    let ServerFrame::Score { scores } = frame else {
        panic!("expected Score");
    };
    let players: Vec<&str> = scores.iter().map(|e| e.player.as_str()).collect();
    assert_eq!(players, ["Zed", "Amy", "Mia"]);
}

#[test]
fn unknown_tag_decodes_without_error() {
    let frame = ServerFrame::decode(r#"{"type":99,"whatever":true}"#).expect("decode");
    assert_eq!(frame, ServerFrame::Unknown { tag: 99 });
}

#[test]
fn unknown_status_decodes_to_unknown_variant() {
    let frame = ServerFrame::decode(r#"{"type":1,"status":"paused"}"#).expect("decode");
    let ServerFrame::Info(info) = frame else {
        panic!("expected Info");
    };
    assert_eq!(info.status, LobbyStatus::Unknown);
}

#[test]
fn missing_required_fields_are_protocol_errors() {
    for json in [
        r#"{"type":1}"#,
        r#"{"type":2,"message":"no player"}"#,
        r#"{"type":2,"player":"no message"}"#,
        r#"{"type":4}"#,
    ] {
        let err = ServerFrame::decode(json).expect_err("should fail");
        assert!(matches!(err, WordRaceError::Protocol(_)), "got {err:?}");
    }
}

#[test]
fn malformed_json_is_a_protocol_error() {
    let err = ServerFrame::decode("not json at all").expect_err("should fail");
    assert!(matches!(err, WordRaceError::Protocol(_)));
}

#[test]
fn non_integer_score_is_a_protocol_error() {
    let err =
        ServerFrame::decode(r#"{"type":4,"scores":{"Alice":"three"}}"#).expect_err("should fail");
    assert!(matches!(err, WordRaceError::Protocol(_)));
}

#[test]
fn outbound_frames_round_trip_through_the_tag_space() {
    // Outbound shapes reuse the inbound tags; a peer echoing a chat frame
    // back must decode as a chat.
    let sent = ClientFrame::Chat("gg".into()).encode().expect("encode");
    let echoed = format!(
        r#"{{"type":2,"player":"Alice","message":{}}}"#,
        serde_json::to_string("gg").expect("json string")
    );
    assert!(sent.contains(r#""type":2"#));
    let frame = ServerFrame::decode(&echoed).expect("decode");
    assert_eq!(
        frame,
        ServerFrame::Chat {
            player: "Alice".into(),
            message: "gg".into()
        }
    );
}
