use std::fmt::Write;

use shared::{Phase, Player, PlayerScore, Question, QuestionResult};

use crate::replica::SessionReplica;
use crate::timer::QuestionTimer;

#[derive(Debug, Clone)]
pub struct RenderConfig<'a> {
    pub local_id: &'a str,
    pub is_host: bool,
    pub fake_ping_ms: u64,
}

/// Text renderer for the terminal
///
/// Frames are plain strings. A frame is only handed out when it differs
/// from the previous one, so calling [`Renderer::render`] after every event
/// does not flood the terminal with duplicates.
#[derive(Debug, Default)]
pub struct Renderer {
    last_frame: String,
}

impl Renderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the frame for the current state if it changed
    pub fn render(&mut self, replica: &SessionReplica, config: &RenderConfig) -> Option<String> {
        let frame = draw_frame(replica, config);
        if frame == self.last_frame {
            return None;
        }
        self.last_frame = frame.clone();
        Some(frame)
    }
}

pub fn draw_frame(replica: &SessionReplica, config: &RenderConfig) -> String {
    let mut out = String::new();
    let role = if config.is_host { "host" } else { "player" };
    let _ = writeln!(
        out,
        "=== Session {} | {} | {} ===",
        replica.code(),
        role,
        replica.phase()
    );

    match replica.phase() {
        Phase::Waiting => draw_lobby(&mut out, replica.players(), config),
        Phase::Playing => {
            let _ = writeln!(out, "Get ready, the first question is coming up");
            draw_standings(&mut out, replica.players(), config.local_id);
        }
        Phase::Question => {
            if let (Some(index), Some(question)) =
                (replica.current_index(), replica.current_question())
            {
                draw_question(&mut out, index, question, replica.players(), config.local_id);
            }
        }
        Phase::Reveal => {
            draw_reveal(
                &mut out,
                replica.current_question(),
                replica.last_results(),
                replica.players(),
            );
            draw_standings(&mut out, replica.players(), config.local_id);
        }
        Phase::Finished => draw_final_scores(&mut out, replica.final_scores(), config.local_id),
    }

    if config.fake_ping_ms > 0 {
        let _ = writeln!(out, "(simulated latency {}ms)", config.fake_ping_ms);
    }
    out
}

fn draw_lobby(out: &mut String, players: &[Player], config: &RenderConfig) {
    let _ = writeln!(out, "Players in lobby: {}", players.len());
    for player in players {
        let _ = writeln!(out, "  {}", player_label(player, config.local_id));
    }
    if config.is_host {
        let _ = writeln!(out, "Type 'start' when everyone is in");
    } else {
        let _ = writeln!(out, "Waiting for the host to start");
    }
}

fn draw_question(
    out: &mut String,
    index: usize,
    question: &Question,
    players: &[Player],
    local_id: &str,
) {
    let _ = writeln!(out, "Q{} [{}] {}", index + 1, question.category, question.prompt);
    let picked = players
        .iter()
        .find(|p| p.id == local_id)
        .and_then(|p| p.current_answer);

    for (i, option) in question.options.iter().enumerate() {
        let marker = if picked == Some(i) { '>' } else { ' ' };
        let _ = writeln!(out, " {} {}) {}", marker, option_letter(i), option);
    }

    let answered = players.iter().filter(|p| p.has_answered()).count();
    let _ = writeln!(out, "Answered: {}/{}", answered, players.len());
}

fn draw_reveal(
    out: &mut String,
    question: Option<&Question>,
    results: &[QuestionResult],
    players: &[Player],
) {
    if let Some(question) = question {
        if let Some(correct) = question.options.get(question.correct_answer) {
            let _ = writeln!(
                out,
                "Answer: {}) {}",
                option_letter(question.correct_answer),
                correct
            );
        }
    }

    for result in results {
        let nickname = players
            .iter()
            .find(|p| p.id == result.player_id)
            .map(|p| p.nickname.as_str())
            .unwrap_or(result.player_id.as_str());
        let verdict = match (result.answer_index, result.correct) {
            (None, _) => "no answer".to_string(),
            (Some(_), true) => format!("correct +{}", result.points_earned),
            (Some(i), false) => format!("picked {}", option_letter(i)),
        };
        let _ = writeln!(out, "  {:<20} {}", nickname, verdict);
    }
}

fn draw_standings(out: &mut String, players: &[Player], local_id: &str) {
    let _ = writeln!(out, "Scores:");
    for player in players {
        let _ = writeln!(
            out,
            "  {:<24} {:>5}  wedges {}",
            player_label(player, local_id),
            player.score,
            player.wedges.len()
        );
    }
}

fn draw_final_scores(out: &mut String, scores: &[PlayerScore], local_id: &str) {
    let _ = writeln!(out, "Final standings:");
    for entry in scores {
        let you = if entry.player_id == local_id { " (you)" } else { "" };
        let wedges: Vec<&str> = entry.wedges.iter().map(|c| c.label()).collect();
        let _ = writeln!(
            out,
            "  {}. {}{} - {} pts [{}]",
            entry.rank,
            entry.nickname,
            you,
            entry.score,
            wedges.join(", ")
        );
    }
}

/// Single-line countdown, printed on its own while a question runs
pub fn countdown_line(timer: &QuestionTimer) -> String {
    const WIDTH: usize = 20;
    let filled = ((timer.fraction_remaining().min(1.0) * WIDTH as f32) as usize).min(WIDTH);
    format!(
        "[{}{}] {}s",
        "#".repeat(filled),
        "-".repeat(WIDTH - filled),
        timer.remaining()
    )
}

fn player_label(player: &Player, local_id: &str) -> String {
    let mut label = player.nickname.clone();
    if player.id == local_id {
        label.push_str(" (you)");
    }
    if !player.is_connected {
        label.push_str(" [offline]");
    }
    label
}

fn option_letter(index: usize) -> char {
    (b'A' + index as u8) as char
}
