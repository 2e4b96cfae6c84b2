//! chatline - a minimal interactive terminal chat client.
//!
//! Connects to a chat server over TCP and multiplexes terminal input with
//! server messages in a single non-blocking event loop, so typing never
//! stalls incoming chat and incoming chat never clobbers a half-typed line.

use anyhow::{Context, Result};
use chatline::{client, config};
use clap::{ArgAction, Parser};
use tokio::net::TcpStream;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "chatline")]
#[command(author, version, about = "A minimal interactive terminal chat client")]
#[command(disable_help_flag = true)]
struct Cli {
    /// Set host.
    #[arg(short = 'h', long, value_name = "HOST")]
    host: Option<String>,

    /// Set port number.
    #[arg(short = 'p', long, value_name = "PORT")]
    port: Option<u16>,

    /// Print this usage.
    #[arg(short = '?', long = "help", action = ArgAction::Help)]
    help: Option<bool>,
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    let config = config::Config::load()
        .context("failed to load configuration")?
        .with_overrides(cli.host, cli.port);

    if !atty::is(atty::Stream::Stdin) {
        anyhow::bail!("chatline is interactive and requires a terminal on stdin");
    }

    println!("Host: {}", config.host);
    println!("Port: {}", config.port);

    let stream = TcpStream::connect((config.host.as_str(), config.port))
        .await
        .with_context(|| format!("failed to connect to {}:{}", config.host, config.port))?;
    info!(host = %config.host, port = config.port, "connected");

    client::run(stream, &config).await
}

/// Logging goes to stderr so it never interleaves with the chat display.
/// The interactive client stays quiet unless RUST_LOG says otherwise.
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}
