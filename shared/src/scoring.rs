//! Deterministic scoring shared by the host and every replica

use serde::{Deserialize, Serialize};

use crate::model::{Player, PlayerScore, Question, QuestionResult};

/// Scoring and pacing constants
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct ScoringConfig {
    pub base_points: u32,
    pub time_bonus_enabled: bool,
    pub max_bonus: u32,
    /// Seconds per question.
    pub question_time_limit: u32,
    /// Questions dealt per game.
    pub game_length: usize,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            base_points: 100,
            time_bonus_enabled: true,
            max_bonus: 50,
            question_time_limit: 20,
            game_length: 12,
        }
    }
}

/// Outcome of scoring a single answer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnswerScore {
    pub correct: bool,
    pub points_earned: u32,
}

/// Scores one answer against the host's timer snapshot.
///
/// Wrong or missing answers earn nothing. A correct answer earns the base
/// points plus `floor(time_remaining / time_limit * max_bonus)` when the time
/// bonus is on. The bonus is computed in integers so every replica agrees.
pub fn score_answer(
    question: &Question,
    selected: Option<usize>,
    time_remaining: u32,
    time_limit: u32,
    config: &ScoringConfig,
) -> AnswerScore {
    let correct = selected == Some(question.correct_answer);
    if !correct {
        return AnswerScore {
            correct: false,
            points_earned: 0,
        };
    }

    let mut points_earned = config.base_points;
    if config.time_bonus_enabled {
        points_earned += time_bonus(time_remaining, time_limit, config.max_bonus);
    }

    AnswerScore {
        correct: true,
        points_earned,
    }
}

/// `floor(remaining / limit * max_bonus)`, clamped to `max_bonus`.
pub fn time_bonus(time_remaining: u32, time_limit: u32, max_bonus: u32) -> u32 {
    if time_limit == 0 {
        return 0;
    }
    let remaining = time_remaining.min(time_limit) as u64;
    (remaining * max_bonus as u64 / time_limit as u64) as u32
}

/// Builds the result for one player from their locked-in answer.
pub fn question_result(
    player: &Player,
    question: &Question,
    time_remaining: u32,
    time_limit: u32,
    config: &ScoringConfig,
) -> QuestionResult {
    let score = score_answer(
        question,
        player.current_answer,
        time_remaining,
        time_limit,
        config,
    );
    QuestionResult {
        player_id: player.id.clone(),
        correct: score.correct,
        points_earned: score.points_earned,
        answer_index: player.current_answer,
    }
}

/// Applies a result to a player: adds points and, when correct, the wedge.
pub fn apply_result(player: &mut Player, result: &QuestionResult, question: Option<&Question>) {
    player.score = player.score.saturating_add(result.points_earned);
    if result.correct {
        if let Some(question) = question {
            player.wedges.insert(question.category);
        }
    }
}

/// Ranks players by score, descending. Ties keep the input order.
pub fn rank_players<'a, I>(players: I) -> Vec<PlayerScore>
where
    I: IntoIterator<Item = &'a Player>,
{
    let mut scores: Vec<PlayerScore> = players
        .into_iter()
        .map(|player| PlayerScore {
            player_id: player.id.clone(),
            nickname: player.nickname.clone(),
            score: player.score,
            wedges: player.wedges.iter().copied().collect(),
            rank: 0,
        })
        .collect();

    // sort_by is stable
    scores.sort_by(|a, b| b.score.cmp(&a.score));

    for (index, score) in scores.iter_mut().enumerate() {
        score.rank = index + 1;
    }
    scores
}
