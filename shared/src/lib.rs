//! Types and pure logic shared by the relay and every trivia client.
//!
//! Everything that must come out identical on every replica lives here: the
//! data model, the event catalog, the scoring engine and the relay wire
//! format. Nothing in this crate performs I/O.

use serde::{Deserialize, Serialize};

pub mod event;
pub mod model;
pub mod scoring;
pub mod validation;

pub use event::GameEvent;
pub use model::{
    Category, Difficulty, Phase, Player, PlayerId, PlayerScore, Question, QuestionResult,
    SessionCode,
};
pub use scoring::{apply_result, question_result, rank_players, score_answer, ScoringConfig};
pub use validation::{
    generate_code, normalize_code, validate_nickname, JoinRejection, ValidationError,
    CODE_ALPHABET, CODE_LENGTH, MAX_NICKNAME_LEN,
};

/// Options per question.
pub const OPTION_COUNT: usize = 4;

/// Largest datagram either side will try to decode.
pub const MAX_PACKET_SIZE: usize = 65_507;

pub const PROTOCOL_VERSION: u32 = 1;

/// Datagrams exchanged between a client and the relay.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub enum Packet {
    // Channel membership
    Subscribe {
        channel: SessionCode,
        subscriber_id: PlayerId,
    },
    Subscribed {
        channel: SessionCode,
    },
    Unsubscribe {
        channel: SessionCode,
    },

    // Broadcast fan-out
    Publish {
        channel: SessionCode,
        event: GameEvent,
    },
    Deliver {
        channel: SessionCode,
        event: GameEvent,
    },

    Heartbeat {
        timestamp: u64,
    },
    HeartbeatAck {
        timestamp: u64,
    },

    // Lobby request/response
    AllocateCode {
        client_version: u32,
        host_id: PlayerId,
    },
    CodeAllocated {
        code: SessionCode,
        host_id: PlayerId,
    },
    JoinRequest {
        code: SessionCode,
        nickname: String,
        player_id: PlayerId,
    },
    JoinAccepted {
        code: SessionCode,
        player_id: PlayerId,
        is_reconnect: bool,
        phase: Phase,
    },
    JoinRejected {
        reason: JoinRejection,
    },
}

pub fn encode(packet: &Packet) -> Result<Vec<u8>, bincode::Error> {
    bincode::serialize(packet)
}

pub fn decode(bytes: &[u8]) -> Result<Packet, bincode::Error> {
    bincode::deserialize(bytes)
}
