//! Session lifecycle for one client
//!
//! [`SessionController`] owns a [`SessionReplica`] and decides which events
//! this client is allowed to originate. It performs no I/O: every operation
//! returns the [`Action`]s the network driver has to carry out, so the same
//! code runs against the UDP relay and against the in-memory bus used by
//! the tests.
//!
//! The host writes through its own reducer. An event is applied locally
//! first and then broadcast; when the relay delivers it back the replica
//! reports a duplicate and nothing happens twice.

use std::time::Duration;

use log::{info, warn};
use shared::{
    rank_players, GameEvent, Phase, Player, PlayerId, PlayerScore, Question, ScoringConfig,
    SessionCode,
};

use crate::replica::{ApplyOutcome, SessionReplica};
use crate::timer::TickOutcome;

/// Pause between `game_started` and the first question
pub const DEFAULT_START_DELAY: Duration = Duration::from_secs(2);

/// Side effects requested by the controller
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Publish on the session channel
    Broadcast(GameEvent),
    /// Call [`SessionController::fire_scheduled`] with `token` after `delay`
    ScheduleAdvance { delay: Duration, token: u64 },
    /// Unsubscribe and stop listening
    Detach,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Player,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    pub scoring: ScoringConfig,
    pub start_delay: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            scoring: ScoringConfig::default(),
            start_delay: DEFAULT_START_DELAY,
        }
    }
}

pub struct SessionController {
    role: Role,
    local_id: PlayerId,
    /// `None` for the host, who is not a roster member
    nickname: Option<String>,
    config: SessionConfig,
    replica: SessionReplica,
    /// The dealt questions, only ever filled on the host
    questions: Vec<Question>,
    pending_advance: Option<u64>,
    next_token: u64,
    /// Question index this client last answered
    answered: Option<usize>,
    active: bool,
}

impl SessionController {
    /// Controller for the client that created the session
    pub fn host(host_id: impl Into<PlayerId>, code: impl Into<SessionCode>, config: SessionConfig) -> Self {
        let code = code.into();
        info!("Hosting session {}", code);
        Self::build(
            Role::Host,
            host_id.into(),
            None,
            SessionReplica::new(code, config.scoring.question_time_limit),
            config,
        )
    }

    /// Controller for a player admitted by the relay
    ///
    /// `phase` is the session phase reported in the join acknowledgement.
    pub fn player(
        player_id: impl Into<PlayerId>,
        nickname: impl Into<String>,
        code: impl Into<SessionCode>,
        phase: Phase,
        config: SessionConfig,
    ) -> Self {
        Self::build(
            Role::Player,
            player_id.into(),
            Some(nickname.into()),
            SessionReplica::with_phase(code, phase, config.scoring.question_time_limit),
            config,
        )
    }

    fn build(
        role: Role,
        local_id: PlayerId,
        nickname: Option<String>,
        replica: SessionReplica,
        config: SessionConfig,
    ) -> Self {
        Self {
            role,
            local_id,
            nickname,
            config,
            replica,
            questions: Vec::new(),
            pending_advance: None,
            next_token: 0,
            answered: None,
            active: true,
        }
    }

    /// Announces this player on the channel
    ///
    /// A reconnect keeps the existing roster entry when this replica still
    /// has one; otherwise the player is announced as a fresh join.
    pub fn announce(&mut self, is_reconnect: bool, joined_at: u64) -> Vec<Action> {
        let Some(nickname) = self.nickname.clone() else {
            return Vec::new();
        };
        if !self.active {
            return Vec::new();
        }

        let event = if is_reconnect && self.replica.roster().contains(&self.local_id) {
            GameEvent::PlayerReconnected {
                player_id: self.local_id.clone(),
            }
        } else {
            GameEvent::PlayerJoined {
                player: Player::new(self.local_id.clone(), nickname, joined_at),
            }
        };
        self.publish(event)
    }

    /// Records that the relay link dropped
    pub fn connection_lost(&mut self) {
        if self.replica.mark_disconnected(&self.local_id) {
            warn!("Connection lost, marked {} disconnected", self.local_id);
        }
    }

    /// Re-announces this client after the link comes back
    pub fn resume(&mut self, joined_at: u64) -> Vec<Action> {
        match self.role {
            Role::Host => Vec::new(),
            Role::Player => self.announce(true, joined_at),
        }
    }

    /// Starts the game with an already shuffled, trimmed question list
    ///
    /// Host only, and only from the waiting phase. The first question is
    /// dealt after the configured start delay.
    pub fn start(&mut self, questions: Vec<Question>) -> Vec<Action> {
        if !self.host_may("start", &[Phase::Waiting]) {
            return Vec::new();
        }
        if questions.is_empty() {
            warn!("Cannot start without questions");
            return Vec::new();
        }
        if let Some(bad) = questions.iter().find_map(|q| q.validate().err()) {
            warn!("Refusing to start: {}", bad);
            return Vec::new();
        }

        info!(
            "Starting session {} with {} questions and {} players",
            self.replica.code(),
            questions.len(),
            self.replica.roster().len()
        );
        self.questions = questions;

        let mut actions = self.publish(GameEvent::GameStarted);
        let token = self.schedule_token();
        actions.push(Action::ScheduleAdvance {
            delay: self.config.start_delay,
            token,
        });
        actions
    }

    /// Runs a scheduled advance if it is still the latest one
    pub fn fire_scheduled(&mut self, token: u64) -> Vec<Action> {
        if self.pending_advance != Some(token) {
            return Vec::new();
        }
        self.pending_advance = None;
        if self.replica.phase() != Phase::Playing {
            return Vec::new();
        }
        self.advance()
    }

    /// Deals the next question, or finishes the game when none are left
    pub fn advance(&mut self) -> Vec<Action> {
        if !self.host_may("advance", &[Phase::Playing, Phase::Reveal]) {
            return Vec::new();
        }
        self.pending_advance = None;

        let next = self.replica.current_index().map_or(0, |i| i + 1);
        let Some(question) = self.questions.get(next).cloned() else {
            return self.finish();
        };

        self.publish(GameEvent::QuestionStarted {
            question,
            index: next,
            time_limit: self.config.scoring.question_time_limit,
        })
    }

    /// Closes the open question and publishes everyone's result
    pub fn reveal(&mut self) -> Vec<Action> {
        if !self.host_may("reveal", &[Phase::Question]) {
            return Vec::new();
        }
        let Some(index) = self.replica.current_index() else {
            return Vec::new();
        };
        let Some(results) = self.replica.compute_results(&self.config.scoring) else {
            return Vec::new();
        };

        self.publish(GameEvent::QuestionEnded { index, results })
    }

    /// Ends the game early
    pub fn end(&mut self) -> Vec<Action> {
        if !self.host_may("end", &[Phase::Waiting, Phase::Playing, Phase::Question, Phase::Reveal]) {
            return Vec::new();
        }
        self.finish()
    }

    fn finish(&mut self) -> Vec<Action> {
        self.pending_advance = None;
        let final_scores = rank_players(self.replica.players());
        info!(
            "Session {} finished, winner: {}",
            self.replica.code(),
            final_scores
                .first()
                .map(|s| s.nickname.as_str())
                .unwrap_or("nobody")
        );
        self.publish(GameEvent::GameEnded { final_scores })
    }

    /// One second of countdown. Expiry reveals on the host.
    pub fn tick(&mut self) -> Vec<Action> {
        if !self.active {
            return Vec::new();
        }
        match self.replica.tick_timer() {
            TickOutcome::Expired if self.role == Role::Host => {
                info!("Time is up on question {:?}", self.replica.current_index());
                self.reveal()
            }
            _ => Vec::new(),
        }
    }

    /// Locks in this player's answer for the open question
    pub fn submit_answer(&mut self, answer_index: usize) -> Vec<Action> {
        if !self.active || self.role != Role::Player {
            return Vec::new();
        }
        if self.replica.phase() != Phase::Question {
            return Vec::new();
        }
        let Some(question_index) = self.replica.current_index() else {
            return Vec::new();
        };
        let valid = self
            .replica
            .current_question()
            .is_some_and(|q| q.is_valid_option(answer_index));
        if !valid {
            warn!("Option {} does not exist", answer_index);
            return Vec::new();
        }
        if self.answered == Some(question_index) {
            return Vec::new();
        }

        self.answered = Some(question_index);
        self.publish(GameEvent::AnswerSubmitted {
            player_id: self.local_id.clone(),
            question_index,
            answer_index,
        })
    }

    /// Leaves the session and drops all local state
    pub fn leave(&mut self) -> Vec<Action> {
        if !self.active {
            return Vec::new();
        }
        info!("{} leaving session {}", self.local_id, self.replica.code());

        let actions = vec![
            Action::Broadcast(GameEvent::PlayerLeft {
                player_id: self.local_id.clone(),
            }),
            Action::Detach,
        ];

        self.active = false;
        self.pending_advance = None;
        self.questions.clear();
        self.answered = None;
        self.replica.reset();
        actions
    }

    /// Applies an event delivered by the channel
    pub fn handle_event(&mut self, event: &GameEvent) -> Vec<Action> {
        if !self.active {
            return Vec::new();
        }
        let outcome = self.replica.apply(event);

        match event {
            GameEvent::PlayerJoined { player }
                if self.role == Role::Host
                    && outcome == ApplyOutcome::Applied
                    && self.replica.phase().is_joinable() =>
            {
                self.reannounce_roster(&player.id)
            }
            _ => Vec::new(),
        }
    }

    /// Tells a newcomer about everyone who joined before them
    fn reannounce_roster(&self, newcomer: &str) -> Vec<Action> {
        self.replica
            .players()
            .iter()
            .filter(|p| p.id != newcomer)
            .map(|p| {
                Action::Broadcast(GameEvent::PlayerJoined {
                    player: Player::new(p.id.clone(), p.nickname.clone(), p.joined_at),
                })
            })
            .collect()
    }

    fn publish(&mut self, event: GameEvent) -> Vec<Action> {
        self.replica.apply(&event);
        vec![Action::Broadcast(event)]
    }

    fn schedule_token(&mut self) -> u64 {
        self.next_token += 1;
        self.pending_advance = Some(self.next_token);
        self.next_token
    }

    fn host_may(&self, operation: &str, phases: &[Phase]) -> bool {
        if !self.active {
            return false;
        }
        if self.role != Role::Host {
            warn!("Only the host can {}", operation);
            return false;
        }
        if !phases.contains(&self.replica.phase()) {
            warn!("Cannot {} in phase {}", operation, self.replica.phase());
            return false;
        }
        true
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn is_host(&self) -> bool {
        self.role == Role::Host
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn local_id(&self) -> &str {
        &self.local_id
    }

    pub fn nickname(&self) -> Option<&str> {
        self.nickname.as_deref()
    }

    pub fn code(&self) -> &str {
        self.replica.code()
    }

    pub fn phase(&self) -> Phase {
        self.replica.phase()
    }

    pub fn replica(&self) -> &SessionReplica {
        &self.replica
    }

    pub fn question_count(&self) -> usize {
        self.questions.len()
    }

    pub fn final_scores(&self) -> &[PlayerScore] {
        self.replica.final_scores()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
}
