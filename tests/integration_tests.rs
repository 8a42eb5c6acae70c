//! Integration tests for the trivia session engine
//!
//! These tests drive several controllers against each other, either over an
//! in-memory broadcast bus or through a real relay on a UDP socket.

use client::controller::{Action, SessionConfig, SessionController};
use client::network::{create_session, join_session, RelayConnection};
use client::replica::SessionReplica;
use relay::{RelayConfig, Server};
use shared::{Category, GameEvent, Packet, Phase, PlayerScore, Question, MAX_PACKET_SIZE};
use std::collections::{BTreeSet, VecDeque};
use std::time::Duration;
use tokio::time::timeout;

fn question(id: &str, category: Category, correct_answer: usize) -> Question {
    Question {
        id: id.to_string(),
        category,
        prompt: format!("Question {}", id),
        options: vec!["A".into(), "B".into(), "C".into(), "D".into()],
        correct_answer,
        difficulty: None,
    }
}

/// In-memory stand-in for the relay: every broadcast reaches every client,
/// the sender included, in publish order.
struct Bus {
    clients: Vec<SessionController>,
    queue: VecDeque<GameEvent>,
    scheduled: Vec<(usize, u64)>,
    log: Vec<GameEvent>,
}

impl Bus {
    fn new(host: SessionController) -> Self {
        Self {
            clients: vec![host],
            queue: VecDeque::new(),
            scheduled: Vec::new(),
            log: Vec::new(),
        }
    }

    fn add_player(&mut self, id: &str, nickname: &str) -> usize {
        let phase = self.clients[0].phase();
        let mut player =
            SessionController::player(id, nickname, "WXYZ", phase, SessionConfig::default());
        let actions = player.announce(false, self.clients.len() as u64);
        self.clients.push(player);
        let index = self.clients.len() - 1;
        self.dispatch(index, actions);
        self.pump();
        index
    }

    fn dispatch(&mut self, from: usize, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::Broadcast(event) => self.queue.push_back(event),
                Action::ScheduleAdvance { token, .. } => self.scheduled.push((from, token)),
                Action::Detach => {}
            }
        }
    }

    fn pump(&mut self) {
        while let Some(event) = self.queue.pop_front() {
            self.log.push(event.clone());
            for i in 0..self.clients.len() {
                let actions = self.clients[i].handle_event(&event);
                self.dispatch(i, actions);
            }
        }
    }

    /// Runs `op` on client `index` and delivers everything it caused
    fn act<F>(&mut self, index: usize, op: F)
    where
        F: FnOnce(&mut SessionController) -> Vec<Action>,
    {
        let actions = op(&mut self.clients[index]);
        self.dispatch(index, actions);
        self.pump();
    }

    fn fire_scheduled(&mut self) {
        for (index, token) in std::mem::take(&mut self.scheduled) {
            let actions = self.clients[index].fire_scheduled(token);
            self.dispatch(index, actions);
        }
        self.pump();
    }

    fn host(&self) -> &SessionController {
        &self.clients[0]
    }

    fn assert_converged(&self) {
        let host = self.host().replica();
        for client in self.clients.iter().filter(|c| c.is_active()) {
            let replica = client.replica();
            assert_eq!(replica.phase(), host.phase(), "{} phase", client.local_id());
            assert_eq!(replica.current_index(), host.current_index());
            assert_eq!(scores(replica), scores(host), "{} scores", client.local_id());
        }
    }
}

fn scores(replica: &SessionReplica) -> Vec<(String, u32, usize)> {
    let mut scores: Vec<_> = replica
        .players()
        .iter()
        .map(|p| (p.id.clone(), p.score, p.wedges.len()))
        .collect();
    scores.sort();
    scores
}

fn standings(replica: &SessionReplica) -> Vec<(String, u32, BTreeSet<Category>)> {
    replica
        .players()
        .iter()
        .map(|p| (p.id.clone(), p.score, p.wedges.clone()))
        .collect()
}

fn two_player_bus() -> Bus {
    let host = SessionController::host("host", "WXYZ", SessionConfig::default());
    let mut bus = Bus::new(host);
    bus.add_player("ana", "Ana");
    bus.add_player("bo", "Bo");
    bus
}

/// END-TO-END SESSION TESTS
mod session_flow_tests {
    use super::*;

    /// Two players, two questions: Ana gets q0 right, both miss q1
    #[test]
    fn full_game_ranks_players() {
        let mut bus = two_player_bus();
        assert_eq!(bus.host().replica().players().len(), 2);

        bus.act(0, |host| {
            host.start(vec![
                question("q0", Category::Geography, 1),
                question("q1", Category::History, 2),
            ])
        });
        assert_eq!(bus.host().phase(), Phase::Playing);
        bus.fire_scheduled();
        assert_eq!(bus.host().phase(), Phase::Question);

        bus.act(1, |ana| ana.submit_answer(1));
        bus.act(2, |bo| bo.submit_answer(0));
        bus.act(0, |host| host.reveal());
        bus.assert_converged();

        bus.act(0, |host| host.advance());
        assert_eq!(bus.host().replica().current_index(), Some(1));
        let before: Vec<_> = bus.clients.iter().map(|c| standings(c.replica())).collect();

        // Both miss q1, whose answer is option 2
        bus.act(1, |ana| ana.submit_answer(0));
        bus.act(2, |bo| bo.submit_answer(0));
        for _ in 0..20 {
            bus.act(0, |host| host.tick());
        }
        assert_eq!(bus.host().phase(), Phase::Reveal);
        bus.assert_converged();

        for (client, before) in bus.clients.iter().zip(&before) {
            assert_eq!(&standings(client.replica()), before, "{}", client.local_id());
            let results = client.replica().last_results();
            assert_eq!(results.len(), 2);
            for result in results {
                assert!(!result.correct);
                assert_eq!(result.points_earned, 0);
                assert_eq!(result.answer_index, Some(0));
            }
        }

        bus.act(0, |host| host.advance());
        assert_eq!(bus.host().phase(), Phase::Finished);
        bus.assert_converged();

        let final_scores: &[PlayerScore] = bus.host().final_scores();
        assert_eq!(final_scores.len(), 2);
        assert_eq!(final_scores[0].nickname, "Ana");
        assert_eq!(final_scores[0].score, 150);
        assert_eq!(final_scores[0].rank, 1);
        assert_eq!(final_scores[0].wedges, vec![Category::Geography]);
        assert_eq!(final_scores[1].nickname, "Bo");
        assert_eq!(final_scores[1].score, 0);
        assert_eq!(final_scores[1].rank, 2);

        for client in &bus.clients {
            assert_eq!(client.final_scores(), final_scores);
        }
    }

    /// Every question goes question -> reveal before the game finishes
    #[test]
    fn phase_sequence_over_many_questions() {
        let mut bus = two_player_bus();
        let questions: Vec<Question> = (0..5)
            .map(|i| question(&format!("q{}", i), Category::ALL[i % 6], i % 4))
            .collect();

        bus.act(0, |host| host.start(questions));
        let mut phases = vec![bus.host().phase()];
        for client in &bus.clients {
            assert_eq!(client.phase(), Phase::Playing, "{}", client.local_id());
        }
        bus.fire_scheduled();

        let mut indices = Vec::new();
        for _ in 0..5 {
            phases.push(bus.host().phase());
            indices.push(bus.host().replica().current_index());
            bus.act(0, |host| host.reveal());
            phases.push(bus.host().phase());
            bus.act(0, |host| host.advance());
        }
        phases.push(bus.host().phase());

        assert_eq!(indices, (0..5).map(Some).collect::<Vec<_>>());
        assert_eq!(indices.last(), Some(&Some(4)));

        let mut expected = vec![Phase::Playing];
        for _ in 0..5 {
            expected.push(Phase::Question);
            expected.push(Phase::Reveal);
        }
        expected.push(Phase::Finished);
        assert_eq!(phases, expected);
        bus.assert_converged();
    }

    /// Ending early from the lobby still yields a ranking
    #[test]
    fn end_from_waiting() {
        let mut bus = two_player_bus();
        bus.act(0, |host| host.end());
        assert_eq!(bus.host().final_scores().len(), 2);
        bus.assert_converged();
    }

    /// Players cannot drive the lifecycle
    #[test]
    fn players_cannot_start_or_advance() {
        let mut bus = two_player_bus();
        bus.act(1, |ana| ana.start(vec![question("q0", Category::History, 0)]));
        bus.act(1, |ana| ana.advance());
        assert_eq!(bus.host().phase(), Phase::Waiting);
        assert!(bus.log.iter().all(|e| !matches!(e, GameEvent::GameStarted)));
    }
}

/// ROSTER TESTS
mod roster_tests {
    use super::*;

    /// A late joiner learns about players who joined before it
    #[test]
    fn late_joiner_sees_full_roster() {
        let bus = two_player_bus();
        let bo = &bus.clients[2];
        let ids: Vec<&str> = bo.replica().players().iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["bo", "ana"]);
        bus.assert_converged();
    }

    /// Leaving removes the player everywhere; rejoining starts from zero
    #[test]
    fn leave_and_rejoin() {
        let mut bus = two_player_bus();
        bus.act(0, |host| host.start(vec![question("q0", Category::History, 1)]));
        bus.fire_scheduled();
        bus.act(1, |ana| ana.submit_answer(1));
        bus.act(0, |host| host.reveal());
        assert_eq!(bus.host().replica().roster().get("ana").unwrap().score, 150);

        bus.act(1, |ana| ana.leave());
        assert!(!bus.clients[1].is_active());
        for client in bus.clients.iter().filter(|c| c.is_active()) {
            assert!(!client.replica().roster().contains("ana"));
        }

        let mut ana = SessionController::player(
            "ana",
            "Ana",
            "WXYZ",
            bus.host().phase(),
            SessionConfig::default(),
        );
        let actions = ana.announce(false, 99);
        bus.clients[1] = ana;
        bus.dispatch(1, actions);
        bus.pump();

        assert_eq!(bus.host().replica().roster().get("ana").unwrap().score, 0);
    }

    /// A reconnect restores connectivity without touching the score
    #[test]
    fn reconnect_keeps_score() {
        let mut bus = two_player_bus();
        bus.act(0, |host| host.start(vec![question("q0", Category::Entertainment, 3)]));
        bus.fire_scheduled();
        bus.act(2, |bo| bo.submit_answer(3));
        bus.act(0, |host| host.reveal());

        bus.clients[2].connection_lost();
        assert!(!bus.clients[2].replica().roster().get("bo").unwrap().is_connected);

        bus.act(2, |bo| bo.resume(0));
        let bo = bus.host().replica().roster().get("bo").unwrap();
        assert!(bo.is_connected);
        assert_eq!(bo.score, 150);
        assert!(bo.wedges.contains(&Category::Entertainment));
        bus.assert_converged();
    }
}

/// DELIVERY ORDER TESTS
mod delivery_tests {
    use super::*;

    fn played_log() -> Vec<GameEvent> {
        let mut bus = two_player_bus();
        bus.act(0, |host| {
            host.start(vec![
                question("q0", Category::Geography, 1),
                question("q1", Category::ScienceNature, 2),
            ])
        });
        bus.fire_scheduled();
        bus.act(1, |ana| ana.submit_answer(1));
        bus.act(2, |bo| bo.submit_answer(1));
        bus.act(0, |host| host.reveal());
        bus.act(0, |host| host.advance());
        bus.act(2, |bo| bo.submit_answer(2));
        bus.act(0, |host| host.reveal());
        bus.act(0, |host| host.advance());
        bus.log.clone()
    }

    fn replay<'a>(events: impl IntoIterator<Item = &'a GameEvent>) -> SessionReplica {
        let mut replica = SessionReplica::new("WXYZ", 20);
        for event in events {
            replica.apply(event);
        }
        replica
    }

    /// Every event delivered twice ends in the same state
    #[test]
    fn duplicated_delivery_is_harmless() {
        let log = played_log();
        let once = replay(&log);
        let twice = replay(log.iter().flat_map(|e| [e, e]));

        assert_eq!(once.phase(), Phase::Finished);
        assert_eq!(scores(&twice), scores(&once));
        assert_eq!(twice.final_scores(), once.final_scores());
    }

    /// Replaying the whole log again after the fact changes nothing
    #[test]
    fn stale_redelivery_is_ignored() {
        let log = played_log();
        let once = replay(&log);
        let again = replay(log.iter().chain(log.iter()));

        assert_eq!(again.phase(), Phase::Finished);
        assert_eq!(scores(&again), scores(&once));
    }

    /// Late question events never pull a replica backwards
    #[test]
    fn late_events_do_not_regress() {
        let log = played_log();
        let cutoff = log
            .iter()
            .rposition(|e| matches!(e, GameEvent::QuestionStarted { index: 1, .. }))
            .unwrap();

        let mut replica = replay(&log[..=cutoff]);
        assert_eq!(replica.current_index(), Some(1));

        for event in log[..cutoff].iter().rev() {
            replica.apply(event);
            assert_eq!(replica.current_index(), Some(1));
            assert_eq!(replica.phase(), Phase::Question);
        }
    }

    /// Scores agree even when a replica misses a question start
    #[test]
    fn missed_question_start_keeps_points() {
        let log = played_log();
        let filtered: Vec<&GameEvent> = log
            .iter()
            .filter(|e| !matches!(e, GameEvent::QuestionStarted { index: 0, .. }))
            .collect();

        let full = replay(&log);
        let partial = replay(filtered);
        let points = |r: &SessionReplica| -> Vec<(String, u32)> {
            scores(r).into_iter().map(|(id, s, _)| (id, s)).collect()
        };
        assert_eq!(points(&partial), points(&full));
    }
}

/// RELAY ROUND-TRIP TESTS
mod relay_tests {
    use super::*;

    async fn start_relay() -> String {
        let mut server = Server::new("127.0.0.1:0", RelayConfig::default())
            .await
            .unwrap();
        let addr = server.local_addr().unwrap().to_string();
        tokio::spawn(async move {
            let _ = server.run().await;
        });
        addr
    }

    async fn next_event(connection: &RelayConnection) -> Option<GameEvent> {
        let mut buffer = vec![0u8; MAX_PACKET_SIZE];
        let wait = async {
            loop {
                if let Ok(Packet::Deliver { event, .. }) = connection.recv(&mut buffer).await {
                    return event;
                }
            }
        };
        timeout(Duration::from_secs(2), wait).await.ok()
    }

    async fn publish_all(connection: &RelayConnection, code: &str, actions: Vec<Action>) {
        for action in actions {
            if let Action::Broadcast(event) = action {
                connection.publish(code, event).await.unwrap();
            }
        }
    }

    /// Host creates a session, a player joins and both see the same roster
    #[tokio::test]
    async fn create_join_and_start_over_udp() {
        let relay = start_relay().await;

        let host_conn = RelayConnection::connect(&relay, 0).await.unwrap();
        let mut host = create_session(&host_conn, "host", SessionConfig::default())
            .await
            .unwrap();
        let code = host.code().to_string();
        assert_eq!(code.len(), 4);

        let ana_conn = RelayConnection::connect(&relay, 0).await.unwrap();
        let (mut ana, actions) = join_session(
            &ana_conn,
            &code.to_lowercase(),
            " Ana ",
            "ana",
            SessionConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(ana.nickname(), Some("Ana"));
        publish_all(&ana_conn, &code, actions).await;

        let joined = next_event(&host_conn).await.expect("host saw no join");
        let reply = host.handle_event(&joined);
        assert!(reply.is_empty());
        assert!(host.replica().roster().contains("ana"));

        // Self-delivery reaches the publisher too
        let echoed = next_event(&ana_conn).await.expect("no self-delivery");
        assert_eq!(echoed, joined);

        let actions = host.start(vec![question("q0", Category::Geography, 0)]);
        publish_all(&host_conn, &code, actions).await;

        let started = next_event(&ana_conn).await.expect("player saw no start");
        ana.handle_event(&started);
        assert_eq!(ana.phase(), Phase::Playing);
    }

    /// Duplicate nicknames are refused before the player is announced
    #[tokio::test]
    async fn duplicate_nickname_rejected_over_udp() {
        let relay = start_relay().await;

        let host_conn = RelayConnection::connect(&relay, 0).await.unwrap();
        let host = create_session(&host_conn, "host", SessionConfig::default())
            .await
            .unwrap();

        let ana_conn = RelayConnection::connect(&relay, 0).await.unwrap();
        join_session(&ana_conn, host.code(), "Ana", "ana", SessionConfig::default())
            .await
            .unwrap();

        let other_conn = RelayConnection::connect(&relay, 0).await.unwrap();
        let result =
            join_session(&other_conn, host.code(), "ana", "other", SessionConfig::default()).await;
        assert!(matches!(
            result,
            Err(client::SessionError::JoinRejected(
                shared::JoinRejection::NicknameTaken
            ))
        ));
    }
}
