//! Player roster for one session replica
//!
//! This module keeps the set of players a replica currently knows about:
//! - Join, with duplicate-announcement and reconnect deduplication
//! - Leave, which drops the entry and its score history entirely
//! - Reconnect, which only restores the connectivity flag
//! - Per-question answer bookkeeping
//!
//! Insertion order is preserved because final ranking breaks ties by it.
//! Nickname uniqueness is not checked here; that happens at the join
//! boundary before a player is ever announced.

use log::{debug, info};
use shared::{apply_result, Player, PlayerId, PlayerScore, Question, QuestionResult};

/// Ordered collection of players known to this replica
#[derive(Debug, Clone, Default)]
pub struct Roster {
    /// Players in join order
    players: Vec<Player>,
}

/// What a join announcement did to the roster
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinOutcome {
    /// The id was unknown and a fresh entry was appended
    Added,
    /// The id was already present; only connectivity was refreshed
    AlreadyKnown,
}

impl Roster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies a join announcement
    ///
    /// Unknown ids are appended with score 0, no wedges and no answer,
    /// whatever the announced entry carried. Known ids keep their score and
    /// wedges and are simply marked connected, which makes duplicate
    /// deliveries of the same announcement harmless.
    pub fn join(&mut self, announced: &Player) -> JoinOutcome {
        if let Some(existing) = self.get_mut(&announced.id) {
            existing.is_connected = true;
            debug!("Player {} already on roster", announced.id);
            return JoinOutcome::AlreadyKnown;
        }

        let player = Player::new(
            announced.id.clone(),
            announced.nickname.clone(),
            announced.joined_at,
        );
        info!("Player {} ({}) joined", player.nickname, player.id);
        self.players.push(player);
        JoinOutcome::Added
    }

    /// Removes a player entirely. Returns false if they were already gone.
    pub fn leave(&mut self, player_id: &str) -> bool {
        let before = self.players.len();
        self.players.retain(|p| p.id != player_id);
        let removed = self.players.len() != before;
        if removed {
            info!("Player {} left", player_id);
        }
        removed
    }

    /// Marks a known player connected without touching score or wedges
    pub fn reconnect(&mut self, player_id: &str) -> bool {
        match self.get_mut(player_id) {
            Some(player) => {
                player.is_connected = true;
                info!("Player {} reconnected", player_id);
                true
            }
            None => false,
        }
    }

    pub fn mark_disconnected(&mut self, player_id: &str) -> bool {
        match self.get_mut(player_id) {
            Some(player) => {
                player.is_connected = false;
                true
            }
            None => false,
        }
    }

    /// Locks in an answer for a player
    ///
    /// The first answer wins. Returns false if the player is unknown or has
    /// already answered the open question.
    pub fn record_answer(&mut self, player_id: &str, answer_index: usize) -> bool {
        match self.get_mut(player_id) {
            Some(player) if player.current_answer.is_none() => {
                player.current_answer = Some(answer_index);
                true
            }
            _ => false,
        }
    }

    /// Clears every player's answer when a new question is dealt
    pub fn clear_answers(&mut self) {
        for player in &mut self.players {
            player.current_answer = None;
        }
    }

    /// Applies a batch of authoritative results
    ///
    /// Results for players this replica does not know are skipped. The
    /// question supplies the wedge category; without it only points move.
    pub fn apply_results(&mut self, results: &[QuestionResult], question: Option<&Question>) {
        for result in results {
            if let Some(player) = self.get_mut(&result.player_id) {
                apply_result(player, result, question);
            }
        }
    }

    pub fn get(&self, player_id: &str) -> Option<&Player> {
        self.players.iter().find(|p| p.id == player_id)
    }

    fn get_mut(&mut self, player_id: &str) -> Option<&mut Player> {
        self.players.iter_mut().find(|p| p.id == player_id)
    }

    /// Adopts scores from an authoritative final ranking
    ///
    /// Known players take the ranked score; wedges are only ever added so the
    /// set never shrinks. Unknown ids are ignored.
    pub fn sync_scores(&mut self, final_scores: &[PlayerScore]) {
        for ranked in final_scores {
            if let Some(player) = self.get_mut(&ranked.player_id) {
                player.score = ranked.score;
                player.wedges.extend(ranked.wedges.iter().copied());
            }
        }
    }

    pub fn contains(&self, player_id: &str) -> bool {
        self.get(player_id).is_some()
    }

    /// Players in join order
    pub fn players(&self) -> &[Player] {
        &self.players
    }

    pub fn ids(&self) -> Vec<PlayerId> {
        self.players.iter().map(|p| p.id.clone()).collect()
    }

    pub fn answered_count(&self) -> usize {
        self.players.iter().filter(|p| p.has_answered()).count()
    }

    pub fn len(&self) -> usize {
        self.players.len()
    }

    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    pub fn clear(&mut self) {
        self.players.clear();
    }
}
