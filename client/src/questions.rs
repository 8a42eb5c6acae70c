//! Question bank loading and per-game selection
//!
//! Banks are JSON arrays of questions in the shape
//! `{ "id", "category", "question", "options", "correctAnswer", "difficulty" }`.
//! Every question is validated on load, so anything that reaches the
//! controller is safe to deal.

use std::path::Path;

use log::info;
use rand::seq::SliceRandom;
use rand::Rng;
use shared::Question;

use crate::error::SessionError;

#[derive(Debug, Clone, Default)]
pub struct QuestionBank {
    questions: Vec<Question>,
}

impl QuestionBank {
    pub fn new(questions: Vec<Question>) -> Result<Self, SessionError> {
        for question in &questions {
            question.validate()?;
        }
        Ok(Self { questions })
    }

    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let questions: Vec<Question> = serde_json::from_str(json)?;
        Self::new(questions)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, SessionError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| {
            SessionError::QuestionBank(format!("cannot read {}: {}", path.display(), e))
        })?;
        let bank = Self::from_json(&json)?;
        info!("Loaded {} questions from {}", bank.len(), path.display());
        Ok(bank)
    }

    /// Shuffles the bank and takes up to `game_length` questions
    pub fn select<R: Rng + ?Sized>(&self, game_length: usize, rng: &mut R) -> Vec<Question> {
        let mut picked = self.questions.clone();
        picked.shuffle(rng);
        picked.truncate(game_length);
        picked
    }

    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
