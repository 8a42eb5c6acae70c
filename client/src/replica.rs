//! Locally held copy of a session, rebuilt by replaying channel events
//!
//! Every client, host included, owns one [`SessionReplica`] and feeds every
//! delivered [`GameEvent`] through [`SessionReplica::apply`]. The reducer is
//! the same for every role, so clients that see the same events end up with
//! the same state.
//!
//! Delivery is unordered and may repeat, so each handler is idempotent and
//! refuses to move the phase backwards:
//! - a `question_started` whose index is not ahead of ours is dropped
//! - a `question_ended` for an older question is dropped
//! - a second answer from the same player is dropped
//! - nothing but `player_*` roster events changes a finished session

use log::debug;
use shared::{
    question_result, GameEvent, Phase, Player, PlayerScore, Question, QuestionResult,
    ScoringConfig, SessionCode,
};

use crate::roster::{JoinOutcome, Roster};
use crate::timer::{QuestionTimer, TickOutcome};

/// How an event landed on the replica
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// State changed
    Applied,
    /// Already reflected; nothing changed
    Duplicate,
    /// Describes a transition this replica has moved past, or cannot place
    Stale,
}

#[derive(Debug, Clone)]
pub struct SessionReplica {
    code: SessionCode,
    phase: Phase,
    /// `None` until the first question is dealt
    current_index: Option<usize>,
    current_question: Option<Question>,
    roster: Roster,
    timer: QuestionTimer,
    last_results: Vec<QuestionResult>,
    final_scores: Vec<PlayerScore>,
}

impl SessionReplica {
    pub fn new(code: impl Into<SessionCode>, time_limit: u32) -> Self {
        Self::with_phase(code, Phase::Waiting, time_limit)
    }

    /// Replica for a client that joins while the session is already in `phase`
    pub fn with_phase(code: impl Into<SessionCode>, phase: Phase, time_limit: u32) -> Self {
        Self {
            code: code.into(),
            phase,
            current_index: None,
            current_question: None,
            roster: Roster::new(),
            timer: QuestionTimer::new(time_limit),
            last_results: Vec::new(),
            final_scores: Vec::new(),
        }
    }

    /// Folds one event into local state
    pub fn apply(&mut self, event: &GameEvent) -> ApplyOutcome {
        let outcome = match event {
            GameEvent::PlayerJoined { player } => self.on_player_joined(player),
            GameEvent::PlayerLeft { player_id } => {
                if self.roster.leave(player_id) {
                    ApplyOutcome::Applied
                } else {
                    ApplyOutcome::Duplicate
                }
            }
            GameEvent::GameStarted => self.on_game_started(),
            GameEvent::QuestionStarted {
                question,
                index,
                time_limit,
            } => self.on_question_started(question, *index, *time_limit),
            GameEvent::AnswerSubmitted {
                player_id,
                question_index,
                answer_index,
            } => self.on_answer_submitted(player_id, *question_index, *answer_index),
            GameEvent::QuestionEnded { index, results } => self.on_question_ended(*index, results),
            GameEvent::GameEnded { final_scores } => self.on_game_ended(final_scores),
            GameEvent::PlayerReconnected { player_id } => {
                if self.roster.reconnect(player_id) {
                    ApplyOutcome::Applied
                } else {
                    ApplyOutcome::Stale
                }
            }
        };

        if outcome != ApplyOutcome::Applied {
            debug!(
                "[{}] {} ignored as {:?} in phase {}",
                self.code,
                event.event_type(),
                outcome,
                self.phase
            );
        }
        outcome
    }

    fn on_player_joined(&mut self, player: &Player) -> ApplyOutcome {
        match self.roster.join(player) {
            JoinOutcome::Added => ApplyOutcome::Applied,
            JoinOutcome::AlreadyKnown => ApplyOutcome::Duplicate,
        }
    }

    fn on_game_started(&mut self) -> ApplyOutcome {
        match self.phase {
            Phase::Waiting => {
                self.phase = Phase::Playing;
                ApplyOutcome::Applied
            }
            Phase::Playing => ApplyOutcome::Duplicate,
            _ => ApplyOutcome::Stale,
        }
    }

    fn on_question_started(
        &mut self,
        question: &Question,
        index: usize,
        time_limit: u32,
    ) -> ApplyOutcome {
        if self.phase.is_terminal() {
            return ApplyOutcome::Stale;
        }

        match self.current_index {
            Some(current) if index == current => return ApplyOutcome::Duplicate,
            Some(current) if index < current => return ApplyOutcome::Stale,
            _ => {}
        }

        self.current_index = Some(index);
        self.current_question = Some(question.clone());
        self.phase = Phase::Question;
        self.timer.reset(time_limit);
        self.roster.clear_answers();
        self.last_results.clear();
        ApplyOutcome::Applied
    }

    fn on_answer_submitted(
        &mut self,
        player_id: &str,
        question_index: usize,
        answer_index: usize,
    ) -> ApplyOutcome {
        if self.phase != Phase::Question || self.current_index != Some(question_index) {
            return ApplyOutcome::Stale;
        }
        let valid = self
            .current_question
            .as_ref()
            .is_some_and(|q| q.is_valid_option(answer_index));
        if !valid || !self.roster.contains(player_id) {
            return ApplyOutcome::Stale;
        }

        if self.roster.record_answer(player_id, answer_index) {
            ApplyOutcome::Applied
        } else {
            ApplyOutcome::Duplicate
        }
    }

    fn on_question_ended(&mut self, index: usize, results: &[QuestionResult]) -> ApplyOutcome {
        if self.phase.is_terminal() {
            return ApplyOutcome::Stale;
        }

        match self.current_index {
            Some(current) if index < current => ApplyOutcome::Stale,
            Some(current) if index == current => match self.phase {
                Phase::Question => {
                    self.roster
                        .apply_results(results, self.current_question.as_ref());
                    self.close_question(results);
                    ApplyOutcome::Applied
                }
                Phase::Reveal => ApplyOutcome::Duplicate,
                _ => ApplyOutcome::Stale,
            },
            _ => {
                // Missed the question itself: points still count, the wedge
                // category is unknown here
                self.roster.apply_results(results, None);
                self.current_index = Some(index);
                self.current_question = None;
                self.close_question(results);
                ApplyOutcome::Applied
            }
        }
    }

    fn close_question(&mut self, results: &[QuestionResult]) {
        self.timer.stop();
        self.phase = Phase::Reveal;
        self.last_results = results.to_vec();
    }

    fn on_game_ended(&mut self, final_scores: &[PlayerScore]) -> ApplyOutcome {
        if self.phase.is_terminal() {
            return ApplyOutcome::Duplicate;
        }
        self.roster.sync_scores(final_scores);
        self.final_scores = final_scores.to_vec();
        self.timer.stop();
        self.phase = Phase::Finished;
        ApplyOutcome::Applied
    }

    /// Scores every known player for the open question
    ///
    /// Uses this replica's timer as the snapshot, so only the host's call is
    /// authoritative. Returns `None` outside the `question` phase.
    pub fn compute_results(&self, config: &ScoringConfig) -> Option<Vec<QuestionResult>> {
        if self.phase != Phase::Question {
            return None;
        }
        let question = self.current_question.as_ref()?;
        let remaining = self.timer.remaining();
        let limit = self.timer.limit();

        Some(
            self.roster
                .players()
                .iter()
                .map(|player| question_result(player, question, remaining, limit, config))
                .collect(),
        )
    }

    /// Advances the display/authority countdown while a question is open
    pub fn tick_timer(&mut self) -> TickOutcome {
        if self.phase != Phase::Question {
            return TickOutcome::Idle;
        }
        self.timer.tick()
    }

    pub fn mark_disconnected(&mut self, player_id: &str) -> bool {
        self.roster.mark_disconnected(player_id)
    }

    /// Drops everything and returns to an empty lobby
    pub fn reset(&mut self) {
        self.phase = Phase::Waiting;
        self.current_index = None;
        self.current_question = None;
        self.roster.clear();
        self.timer.stop();
        self.last_results.clear();
        self.final_scores.clear();
    }

    pub fn code(&self) -> &str {
        &self.code
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn current_index(&self) -> Option<usize> {
        self.current_index
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.current_question.as_ref()
    }

    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    pub fn players(&self) -> &[Player] {
        self.roster.players()
    }

    pub fn timer(&self) -> &QuestionTimer {
        &self.timer
    }

    pub fn time_remaining(&self) -> u32 {
        self.timer.remaining()
    }

    pub fn last_results(&self) -> &[QuestionResult] {
        &self.last_results
    }

    pub fn final_scores(&self) -> &[PlayerScore] {
        &self.final_scores
    }
}
