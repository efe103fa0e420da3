//! Wire frames for the Word Race lobby protocol.
//!
//! The streaming connection exchanges JSON text frames tagged by an integer
//! `type` field. Inbound frames decode into the closed [`ServerFrame`] enum;
//! tags outside the recognized set decode to [`ServerFrame::Unknown`] so the
//! session never fails on a frame it does not understand. Outbound frames are
//! the three fixed shapes in [`ClientFrame`].

use serde::{Deserialize, Serialize};

use crate::error::{Result, WordRaceError};

// ── Frame tags ──────────────────────────────────────────────────────

/// Lifecycle/status update frame.
pub const TAG_INFO: u64 = 1;
/// Chat frame from a named player.
pub const TAG_COMM: u64 = 2;
/// Lobby-wide announcement, optionally carrying a score snapshot.
pub const TAG_BROADCAST: u64 = 3;
/// Authoritative scoreboard snapshot.
pub const TAG_SCORE: u64 = 4;

// ── Status ──────────────────────────────────────────────────────────

/// Lifecycle status carried by INFO frames.
///
/// Status strings outside the known set decode to [`LobbyStatus::Unknown`]
/// and are ignored by the session rather than rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LobbyStatus {
    Waiting,
    Ready,
    InProgress,
    Completed,
    Error,
    #[serde(other)]
    Unknown,
}

// ── Outbound frames ─────────────────────────────────────────────────

/// Frames sent from the client to the peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientFrame {
    /// Leader action: start (or restart) the game.
    StartGame,
    /// Vote to skip the current word.
    SkipWord,
    /// Chat message from the local player.
    Chat(String),
}

#[derive(Serialize)]
struct OutboundWire<'a> {
    #[serde(rename = "type")]
    tag: u64,
    message: &'a str,
}

impl ClientFrame {
    /// Encode this frame as one JSON text message.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::Serialization`] if JSON encoding fails.
    pub fn encode(&self) -> Result<String> {
        let wire = match self {
            ClientFrame::StartGame => OutboundWire {
                tag: TAG_INFO,
                message: "startGame",
            },
            ClientFrame::SkipWord => OutboundWire {
                tag: TAG_INFO,
                message: "skipWord",
            },
            ClientFrame::Chat(text) => OutboundWire {
                tag: TAG_COMM,
                message: text,
            },
        };
        Ok(serde_json::to_string(&wire)?)
    }
}

// ── Inbound frames ──────────────────────────────────────────────────

/// The current round's first/last letter constraint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Letters {
    pub first: char,
    pub last: char,
}

impl Letters {
    /// Parse a letters payload of exactly two characters.
    pub fn from_payload(payload: &str) -> Option<Self> {
        let mut chars = payload.chars();
        let first = chars.next()?;
        let last = chars.next()?;
        if chars.next().is_some() {
            return None;
        }
        Some(Self { first, last })
    }
}

/// One row of a scoreboard snapshot, in arrival order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreEntry {
    pub player: String,
    pub score: i64,
}

/// Fields carried by an INFO frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InfoFrame {
    pub status: LobbyStatus,
    pub leader: Option<String>,
    pub message: Option<String>,
    pub round: Option<u32>,
    pub num_rounds: Option<u32>,
    pub num_skips: Option<u32>,
}

/// Frames received from the peer.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerFrame {
    /// Lifecycle/status update (tag 1).
    Info(InfoFrame),
    /// Chat from a named player (tag 2).
    Chat { player: String, message: String },
    /// Lobby-wide announcement (tag 3).
    Broadcast {
        message: Option<String>,
        scores: Option<Vec<ScoreEntry>>,
    },
    /// Authoritative scoreboard snapshot (tag 4).
    Score { scores: Vec<ScoreEntry> },
    /// Any other tag. Carries no payload; the session logs and ignores it.
    Unknown { tag: u64 },
}

/// Superset of all inbound frame fields, used as a decoding intermediate
/// because serde's internally-tagged enums only support string tags.
#[derive(Deserialize)]
struct InboundWire {
    #[serde(rename = "type")]
    tag: u64,
    status: Option<LobbyStatus>,
    leader: Option<String>,
    message: Option<String>,
    round: Option<u32>,
    #[serde(rename = "numRounds")]
    num_rounds: Option<u32>,
    #[serde(rename = "numSkips")]
    num_skips: Option<u32>,
    #[serde(alias = "display_name")]
    player: Option<String>,
    scores: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ServerFrame {
    /// Decode one inbound JSON text frame.
    ///
    /// Unrecognized tags decode to [`ServerFrame::Unknown`]; only parse
    /// failures and missing required fields produce an error, which callers
    /// log and discard without affecting the session.
    ///
    /// # Errors
    ///
    /// Returns [`WordRaceError::Protocol`] for unparseable JSON or a frame
    /// missing a field its tag requires.
    pub fn decode(text: &str) -> Result<Self> {
        let wire: InboundWire = serde_json::from_str(text)
            .map_err(|e| WordRaceError::Protocol(format!("unparseable frame: {e}")))?;

        Ok(match wire.tag {
            TAG_INFO => {
                let status = wire
                    .status
                    .ok_or_else(|| WordRaceError::Protocol("INFO frame missing status".into()))?;
                ServerFrame::Info(InfoFrame {
                    status,
                    leader: wire.leader,
                    message: wire.message,
                    round: wire.round,
                    num_rounds: wire.num_rounds,
                    num_skips: wire.num_skips,
                })
            }
            TAG_COMM => ServerFrame::Chat {
                player: wire
                    .player
                    .ok_or_else(|| WordRaceError::Protocol("COMM frame missing player".into()))?,
                message: wire
                    .message
                    .ok_or_else(|| WordRaceError::Protocol("COMM frame missing message".into()))?,
            },
            TAG_BROADCAST => ServerFrame::Broadcast {
                message: wire.message,
                scores: wire.scores.map(score_entries).transpose()?,
            },
            TAG_SCORE => ServerFrame::Score {
                scores: score_entries(wire.scores.ok_or_else(|| {
                    WordRaceError::Protocol("SCORE frame missing scores".into())
                })?)?,
            },
            tag => ServerFrame::Unknown { tag },
        })
    }
}

/// Convert a raw score object into entries, preserving arrival order.
fn score_entries(map: serde_json::Map<String, serde_json::Value>) -> Result<Vec<ScoreEntry>> {
    map.into_iter()
        .map(|(player, value)| {
            let score = value.as_i64().ok_or_else(|| {
                WordRaceError::Protocol(format!("non-integer score for player {player:?}"))
            })?;
            Ok(ScoreEntry { player, score })
        })
        .collect()
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
    fn encode_start_game() {
        let json = ClientFrame::StartGame.encode().unwrap();
        assert_eq!(json, r#"{"type":1,"message":"startGame"}"#);
    }

    #[test]
    fn encode_skip_word() {
        let json = ClientFrame::SkipWord.encode().unwrap();
        assert_eq!(json, r#"{"type":1,"message":"skipWord"}"#);
    }

    #[test]
    fn encode_chat() {
        let json = ClientFrame::Chat("hi there".into()).encode().unwrap();
        assert_eq!(json, r#"{"type":2,"message":"hi there"}"#);
    }

    #[test]
    fn decode_info_frame() {
        let frame = ServerFrame::decode(
            r#"{"type":1,"status":"in_progress","leader":"Alice","message":"CZ","round":3,"numRounds":5,"numSkips":1}"#,
        )
        .unwrap();
        let ServerFrame::Info(info) = frame else {
            panic!("expected Info frame");
        };
        assert_eq!(info.status, LobbyStatus::InProgress);
        assert_eq!(info.leader.as_deref(), Some("Alice"));
        assert_eq!(info.message.as_deref(), Some("CZ"));
        assert_eq!(info.round, Some(3));
        assert_eq!(info.num_rounds, Some(5));
        assert_eq!(info.num_skips, Some(1));
    }

    #[test]
    fn decode_chat_frame() {
        let frame =
            ServerFrame::decode(r#"{"type":2,"player":"Bob","message":"hello"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Chat {
                player: "Bob".into(),
                message: "hello".into(),
            }
        );
    }

    #[test]
    fn decode_chat_frame_with_display_name_alias() {
        let frame =
            ServerFrame::decode(r#"{"type":2,"display_name":"Bob","message":"hello"}"#).unwrap();
        assert!(matches!(frame, ServerFrame::Chat { player, .. } if player == "Bob"));
    }

    #[test]
    fn decode_score_frame_preserves_arrival_order() {
        let frame =
            ServerFrame::decode(r#"{"type":4,"scores":{"zed":3,"abe":3,"mia":7}}"#).unwrap();
        let ServerFrame::Score { scores } = frame else {
            panic!("expected Score frame");
        };
        let order: Vec<&str> = scores.iter().map(|e| e.player.as_str()).collect();
        assert_eq!(order, ["zed", "abe", "mia"]);
    }

    #[test]
    fn decode_broadcast_without_scores() {
        let frame = ServerFrame::decode(r#"{"type":3,"message":"round over"}"#).unwrap();
        assert_eq!(
            frame,
            ServerFrame::Broadcast {
                message: Some("round over".into()),
                scores: None,
            }
        );
    }

    #[test]
    fn decode_unknown_tag() {
        let frame = ServerFrame::decode(r#"{"type":99,"whatever":true}"#).unwrap();
        assert_eq!(frame, ServerFrame::Unknown { tag: 99 });
    }

    #[test]
    fn decode_unknown_status_string() {
        let frame = ServerFrame::decode(r#"{"type":1,"status":"celebrating"}"#).unwrap();
        let ServerFrame::Info(info) = frame else {
            panic!("expected Info frame");
        };
        assert_eq!(info.status, LobbyStatus::Unknown);
    }

    #[test]
    fn decode_rejects_unparseable_json() {
        let err = ServerFrame::decode("{not json").unwrap_err();
        assert!(matches!(err, WordRaceError::Protocol(_)));
    }

    #[test]
    fn decode_rejects_info_without_status() {
        let err = ServerFrame::decode(r#"{"type":1,"leader":"Alice"}"#).unwrap_err();
        assert!(matches!(err, WordRaceError::Protocol(_)));
    }

    #[test]
    fn decode_rejects_non_integer_score() {
        let err = ServerFrame::decode(r#"{"type":4,"scores":{"abe":"many"}}"#).unwrap_err();
        assert!(matches!(err, WordRaceError::Protocol(_)));
    }

    #[test]
    fn letters_from_two_character_payload() {
        assert_eq!(
            Letters::from_payload("CZ"),
            Some(Letters {
                first: 'C',
                last: 'Z'
            })
        );
    }

    #[test]
    fn letters_rejects_other_lengths() {
        assert_eq!(Letters::from_payload(""), None);
        assert_eq!(Letters::from_payload("C"), None);
        assert_eq!(Letters::from_payload("CAT"), None);
    }
}
