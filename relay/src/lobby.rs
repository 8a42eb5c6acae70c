//! Session lobbies known to the relay
//!
//! The relay keeps just enough per-session state to answer lobby requests:
//! which codes are taken, who hosts each session, which players have been
//! admitted and the coarse phase. That state is learned by watching the
//! events published on each session's channel; the relay never originates
//! game events itself.

use log::{debug, info};
use rand::rngs::StdRng;
use rand::SeedableRng;
use shared::{
    generate_code, validate_nickname, GameEvent, JoinRejection, Phase, PlayerId, SessionCode,
};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// A session as the relay sees it
#[derive(Debug, Clone)]
pub struct Lobby {
    pub code: SessionCode,
    pub host_id: PlayerId,
    pub phase: Phase,
    /// Admitted players and their nicknames
    pub players: HashMap<PlayerId, String>,
    pub allocated_at: Instant,
}

impl Lobby {
    fn new(code: SessionCode, host_id: PlayerId) -> Self {
        Self {
            code,
            host_id,
            phase: Phase::Waiting,
            players: HashMap::new(),
            allocated_at: Instant::now(),
        }
    }

    fn nickname_taken(&self, nickname: &str, by_other_than: &str) -> bool {
        self.players
            .iter()
            .any(|(id, name)| id != by_other_than && name.eq_ignore_ascii_case(nickname))
    }
}

/// Answer to an admitted join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JoinAck {
    pub is_reconnect: bool,
    pub phase: Phase,
}

/// Effect of an observed event on the registry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobbyChange {
    Unchanged,
    Updated,
    /// The host left; the session is gone
    Closed,
}

pub struct LobbyRegistry {
    lobbies: HashMap<SessionCode, Lobby>,
    rng: StdRng,
}

impl LobbyRegistry {
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            lobbies: HashMap::new(),
            rng,
        }
    }

    /// Reserves a code nobody else holds
    ///
    /// A host asking again gets the code it already holds, so a retried
    /// request does not leak lobbies.
    pub fn allocate(&mut self, host_id: &str) -> SessionCode {
        if let Some(existing) = self
            .lobbies
            .values()
            .find(|l| l.host_id == host_id && !l.phase.is_terminal())
        {
            return existing.code.clone();
        }

        let code = loop {
            let candidate = generate_code(&mut self.rng);
            if !self.lobbies.contains_key(&candidate) {
                break candidate;
            }
            debug!("Code {} collided, drawing again", candidate);
        };

        info!("Allocated session {} for host {}", code, host_id);
        self.lobbies
            .insert(code.clone(), Lobby::new(code.clone(), host_id.to_string()));
        code
    }

    /// Decides whether `player_id` may enter session `code`
    ///
    /// Known ids are readmitted as reconnects while the game is still
    /// running. New players are only admitted in the waiting and playing
    /// phases and need a nickname nobody else in the session uses.
    pub fn acknowledge_join(
        &mut self,
        code: &str,
        nickname: &str,
        player_id: &str,
    ) -> Result<JoinAck, JoinRejection> {
        let nickname =
            validate_nickname(nickname).map_err(|e| JoinRejection::Invalid(e.to_string()))?;
        let lobby = self.lobbies.get_mut(code).ok_or(JoinRejection::NotFound)?;

        if lobby.players.contains_key(player_id) {
            if lobby.phase.is_terminal() {
                return Err(JoinRejection::AlreadyStarted);
            }
            if lobby.nickname_taken(&nickname, player_id) {
                return Err(JoinRejection::NicknameTaken);
            }
            lobby.players.insert(player_id.to_string(), nickname);
            return Ok(JoinAck {
                is_reconnect: true,
                phase: lobby.phase,
            });
        }

        if !lobby.phase.is_joinable() {
            return Err(JoinRejection::AlreadyStarted);
        }
        if lobby.nickname_taken(&nickname, player_id) {
            return Err(JoinRejection::NicknameTaken);
        }

        info!("{} ({}) admitted to {}", nickname, player_id, code);
        lobby.players.insert(player_id.to_string(), nickname);
        Ok(JoinAck {
            is_reconnect: false,
            phase: lobby.phase,
        })
    }

    /// Updates a lobby from an event published on its channel
    pub fn observe(&mut self, code: &str, event: &GameEvent) -> LobbyChange {
        let Some(lobby) = self.lobbies.get_mut(code) else {
            return LobbyChange::Unchanged;
        };

        let next_phase = match event {
            GameEvent::GameStarted => Some(Phase::Playing),
            GameEvent::QuestionStarted { .. } => Some(Phase::Question),
            GameEvent::QuestionEnded { .. } => Some(Phase::Reveal),
            GameEvent::GameEnded { .. } => Some(Phase::Finished),
            GameEvent::PlayerJoined { player } => {
                if lobby.players.contains_key(&player.id) {
                    return LobbyChange::Unchanged;
                }
                lobby
                    .players
                    .insert(player.id.clone(), player.nickname.clone());
                return LobbyChange::Updated;
            }
            GameEvent::PlayerLeft { player_id } => {
                if *player_id == lobby.host_id {
                    info!("Host of {} left, closing session", code);
                    self.lobbies.remove(code);
                    return LobbyChange::Closed;
                }
                return match lobby.players.remove(player_id) {
                    Some(_) => LobbyChange::Updated,
                    None => LobbyChange::Unchanged,
                };
            }
            GameEvent::AnswerSubmitted { .. } | GameEvent::PlayerReconnected { .. } => None,
        };

        match next_phase {
            Some(phase) if lobby.phase.can_transition_to(phase) => {
                debug!("{}: {} -> {}", code, lobby.phase, phase);
                lobby.phase = phase;
                LobbyChange::Updated
            }
            _ => LobbyChange::Unchanged,
        }
    }

    /// Drops lobbies older than `max_age` whose channel was never claimed
    ///
    /// A host that allocates a code and never subscribes would otherwise hold
    /// the code forever. Returns the removed codes.
    pub fn expire_unclaimed<F>(&mut self, max_age: Duration, is_claimed: F) -> Vec<SessionCode>
    where
        F: Fn(&str) -> bool,
    {
        let expired: Vec<SessionCode> = self
            .lobbies
            .values()
            .filter(|l| l.allocated_at.elapsed() > max_age && !is_claimed(&l.code))
            .map(|l| l.code.clone())
            .collect();

        for code in &expired {
            info!("Session {} never claimed, releasing code", code);
            self.lobbies.remove(code);
        }
        expired
    }

    pub fn remove(&mut self, code: &str) -> Option<Lobby> {
        let removed = self.lobbies.remove(code);
        if removed.is_some() {
            info!("Session {} removed", code);
        }
        removed
    }

    pub fn get(&self, code: &str) -> Option<&Lobby> {
        self.lobbies.get(code)
    }

    pub fn len(&self) -> usize {
        self.lobbies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lobbies.is_empty()
    }
}

impl Default for LobbyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
