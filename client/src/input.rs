//! Terminal command parsing
//!
//! Lines read from stdin are turned into [`Command`]s. Answers can be typed
//! as a letter (`a`-`d`) or a one-based number (`1`-`4`).

use shared::OPTION_COUNT;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Host: close the lobby
    Start,
    /// Host: deal the next question
    Next,
    /// Host: close the open question early
    Reveal,
    /// Host: finish the game now
    End,
    Leave,
    /// Zero-based option index
    Answer(usize),
    Help,
}

pub const HELP: &str = "\
Commands:
  start           host: start the game
  next            host: deal the next question
  reveal          host: reveal the answer now
  end             host: end the game
  a-d | 1-4       player: answer the open question
  leave           leave the session
  help            show this message";

/// Parses one line of input. Blank or unknown lines yield `None`.
pub fn parse_command(line: &str) -> Option<Command> {
    let word = line.trim().to_ascii_lowercase();
    match word.as_str() {
        "start" | "s" => Some(Command::Start),
        "next" | "n" => Some(Command::Next),
        "reveal" | "r" => Some(Command::Reveal),
        "end" => Some(Command::End),
        "leave" | "quit" | "q" => Some(Command::Leave),
        "help" | "?" => Some(Command::Help),
        other => parse_answer(other).map(Command::Answer),
    }
}

fn parse_answer(word: &str) -> Option<usize> {
    let mut chars = word.chars();
    let c = chars.next()?;
    if chars.next().is_some() {
        return None;
    }

    let index = match c {
        'a'..='z' => c as usize - 'a' as usize,
        '1'..='9' => c as usize - '1' as usize,
        _ => return None,
    };
    (index < OPTION_COUNT).then_some(index)
}
