use clap::{Args as ClapArgs, Parser, Subcommand};
use client::controller::SessionConfig;
use client::error::SessionError;
use client::network::{host_session, play_session};
use client::questions::QuestionBank;
use client::utils::generate_player_id;
use log::info;
use shared::ScoringConfig;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay address to connect to
    #[arg(short = 'r', long, env = "TRIVIA_RELAY")]
    relay: Option<String>,

    /// Simulate network latency in milliseconds
    #[arg(short = 'l', long, default_value = "0")]
    fake_ping: u64,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Subcommand, Debug)]
enum Mode {
    /// Create a new session and run it as host
    Host(HostArgs),
    /// Join an existing session as a player
    Join(JoinArgs),
}

#[derive(ClapArgs, Debug)]
struct HostArgs {
    /// Question bank (JSON)
    #[arg(short, long, default_value = "questions/trivia-questions.json")]
    questions: PathBuf,

    /// Questions dealt per game
    #[arg(short = 'n', long, default_value = "12")]
    game_length: usize,

    /// Seconds per question
    #[arg(short, long, default_value = "20", value_parser = clap::value_parser!(u32).range(1..))]
    time_limit: u32,

    /// Award only base points for correct answers
    #[arg(long)]
    no_time_bonus: bool,

    /// Seconds between starting the game and the first question
    #[arg(long, default_value = "2")]
    start_delay: u64,
}

#[derive(ClapArgs, Debug)]
struct JoinArgs {
    /// Session code shown on the host's screen
    #[arg(short, long)]
    code: String,

    /// Name shown to other players
    #[arg(short = 'N', long)]
    nickname: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let relay = args.relay.ok_or_else(|| {
        SessionError::Config("no relay address, pass --relay or set TRIVIA_RELAY".to_string())
    })?;
    let client_id = generate_player_id();

    info!("Starting client {}...", client_id);
    info!("Relay: {}", relay);
    if args.fake_ping > 0 {
        info!("Simulating {}ms latency", args.fake_ping);
    }

    match args.mode {
        Mode::Host(host) => {
            let bank = QuestionBank::load(&host.questions)?;
            let config = SessionConfig {
                scoring: ScoringConfig {
                    time_bonus_enabled: !host.no_time_bonus,
                    question_time_limit: host.time_limit,
                    game_length: host.game_length,
                    ..ScoringConfig::default()
                },
                start_delay: Duration::from_secs(host.start_delay),
            };
            host_session(&relay, args.fake_ping, client_id, bank, config).await?;
        }
        Mode::Join(join) => {
            play_session(
                &relay,
                args.fake_ping,
                client_id,
                &join.code,
                &join.nickname,
                SessionConfig::default(),
            )
            .await?;
        }
    }

    Ok(())
}
