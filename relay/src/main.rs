use clap::Parser;
use log::info;
use relay::{RelayConfig, Server};
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Relay IP address to bind to
    #[arg(short = 'H', long, default_value = "127.0.0.1")]
    host: String,

    /// Relay port to listen on
    #[arg(short, long, default_value = "8080")]
    port: u16,

    /// Maximum subscribers on one session channel
    #[arg(short, long, default_value = "64")]
    max_subscribers: usize,

    /// Seconds of silence before a subscriber is dropped
    #[arg(short = 't', long, default_value = "10")]
    subscriber_timeout_secs: u64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::init();

    if std::env::var("RUST_LOG").is_err() {
        eprintln!("Set RUST_LOG=info for detailed logging");
    }

    let args = Args::parse();
    let addr = format!("{}:{}", args.host, args.port);

    info!("Starting relay on {}", addr);
    info!(
        "Max subscribers per channel: {}, subscriber timeout: {}s",
        args.max_subscribers, args.subscriber_timeout_secs
    );

    let config = RelayConfig {
        max_subscribers: args.max_subscribers,
        subscriber_timeout: Duration::from_secs(args.subscriber_timeout_secs),
    };

    let mut server = Server::new(&addr, config).await?;
    server.run().await?;

    Ok(())
}
