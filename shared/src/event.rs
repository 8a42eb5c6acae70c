//! The closed set of events carried over a session channel

use serde::{Deserialize, Serialize};

use crate::model::{Player, PlayerId, PlayerScore, Question, QuestionResult};

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GameEvent {
    /// New or rejoining player announced.
    PlayerJoined { player: Player },
    /// Player removed from the roster.
    PlayerLeft { player_id: PlayerId },
    /// Lobby closed, first question imminent.
    GameStarted,
    /// New active question; every replica resets its timer to `time_limit`.
    QuestionStarted {
        question: Question,
        index: usize,
        time_limit: u32,
    },
    /// A player locked in an answer for question `question_index`.
    AnswerSubmitted {
        player_id: PlayerId,
        question_index: usize,
        answer_index: usize,
    },
    /// Authoritative outcome and score deltas for question `index`.
    QuestionEnded {
        index: usize,
        results: Vec<QuestionResult>,
    },
    /// Terminal ranking.
    GameEnded { final_scores: Vec<PlayerScore> },
    /// Connectivity restored without a roster change.
    PlayerReconnected { player_id: PlayerId },
}

impl GameEvent {
    /// Wire tag of the event.
    pub fn event_type(&self) -> &'static str {
        match self {
            GameEvent::PlayerJoined { .. } => "player_joined",
            GameEvent::PlayerLeft { .. } => "player_left",
            GameEvent::GameStarted => "game_started",
            GameEvent::QuestionStarted { .. } => "question_started",
            GameEvent::AnswerSubmitted { .. } => "answer_submitted",
            GameEvent::QuestionEnded { .. } => "question_ended",
            GameEvent::GameEnded { .. } => "game_ended",
            GameEvent::PlayerReconnected { .. } => "player_reconnected",
        }
    }
}
