//! Trivia data model shared by every replica and the relay.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

use crate::validation::ValidationError;
use crate::OPTION_COUNT;

/// Opaque, client-generated player identifier.
pub type PlayerId = String;

/// Four-character session code; doubles as the broadcast channel name.
pub type SessionCode = String;

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Geography,
    Entertainment,
    History,
    ArtsLiterature,
    ScienceNature,
    SportsLeisure,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Geography,
        Category::Entertainment,
        Category::History,
        Category::ArtsLiterature,
        Category::ScienceNature,
        Category::SportsLeisure,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Geography => "Geography",
            Category::Entertainment => "Entertainment",
            Category::History => "History",
            Category::ArtsLiterature => "Arts & Literature",
            Category::ScienceNature => "Science & Nature",
            Category::SportsLeisure => "Sports & Leisure",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// A single multiple-choice question. Immutable once dealt.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub category: Category,
    #[serde(rename = "question")]
    pub prompt: String,
    pub options: Vec<String>,
    pub correct_answer: usize,
    #[serde(default)]
    pub difficulty: Option<Difficulty>,
}

impl Question {
    /// Checks the fixed option count and that the correct index points at an option.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.options.len() != OPTION_COUNT {
            return Err(ValidationError::OptionCount {
                question_id: self.id.clone(),
                found: self.options.len(),
            });
        }
        if self.correct_answer >= self.options.len() {
            return Err(ValidationError::CorrectAnswerOutOfRange {
                question_id: self.id.clone(),
                index: self.correct_answer,
            });
        }
        Ok(())
    }

    pub fn is_valid_option(&self, index: usize) -> bool {
        index < self.options.len()
    }
}

/// A participant as seen by one replica.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Player {
    pub id: PlayerId,
    pub nickname: String,
    pub score: u32,
    /// Categories answered correctly at least once. Never shrinks.
    pub wedges: BTreeSet<Category>,
    /// Answer locked in for the open question, cleared when a new one is dealt.
    pub current_answer: Option<usize>,
    pub is_connected: bool,
    /// Milliseconds since the Unix epoch, stamped by the joining client.
    pub joined_at: u64,
}

impl Player {
    pub fn new(id: impl Into<PlayerId>, nickname: impl Into<String>, joined_at: u64) -> Self {
        Self {
            id: id.into(),
            nickname: nickname.into(),
            score: 0,
            wedges: BTreeSet::new(),
            current_answer: None,
            is_connected: true,
            joined_at,
        }
    }

    pub fn has_answered(&self) -> bool {
        self.current_answer.is_some()
    }
}

/// Game phase. Declaration order is the forward order of play.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Waiting,
    Playing,
    Question,
    Reveal,
    Finished,
}

impl Phase {
    /// Phases in which acknowledge-join still admits newcomers.
    pub fn is_joinable(&self) -> bool {
        matches!(self, Phase::Waiting | Phase::Playing)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Finished)
    }

    /// Legal edges of the session state machine.
    pub fn can_transition_to(&self, next: Phase) -> bool {
        use Phase::*;
        matches!(
            (self, next),
            (Waiting, Playing)
                | (Playing, Question)
                | (Playing, Finished)
                | (Question, Reveal)
                | (Question, Finished)
                | (Reveal, Question)
                | (Reveal, Finished)
                | (Waiting, Finished)
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Waiting => "waiting",
            Phase::Playing => "playing",
            Phase::Question => "question",
            Phase::Reveal => "reveal",
            Phase::Finished => "finished",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-player outcome of one question.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct QuestionResult {
    pub player_id: PlayerId,
    pub correct: bool,
    pub points_earned: u32,
    /// `None` when the player did not answer.
    pub answer_index: Option<usize>,
}

/// End-of-game projection of one player.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlayerScore {
    pub player_id: PlayerId,
    pub nickname: String,
    pub score: u32,
    pub wedges: Vec<Category>,
    /// 1-based.
    pub rank: usize,
}
