use std::io::Write;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use frames::{Estimate, UserId};
use pokerboard::config::{DEFAULT_TICK_MS, DEFAULT_WS_BASE_URL};
use pokerboard::{
    ClientConfig, ConfigError, DeckKind, ErrorKind, EstimationScale, Identity, Phase, SessionConfig, SessionError,
    SessionHandle, SessionObserver, SessionSnapshot, SystemClock, spawn_session,
};
use serde_json::json;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("stdin read failed: {0}")]
    Stdin(#[from] std::io::Error),
    #[error("session task failed: {0}")]
    Task(#[from] tokio::task::JoinError),
    #[error("unknown command `{0}`; expected vote, start, skip, estimate, init or quit")]
    UnknownCommand(String),
    #[error("`{command}` needs a numeric estimate, got `{value}`")]
    InvalidEstimate { command: &'static str, value: String },
}

#[derive(Parser, Debug)]
#[command(name = "poker-cli", about = "Planning-poker session client (JSON snapshots on stdout)")]
struct Cli {
    #[arg(long, env = "POKER_WS_BASE_URL", default_value = DEFAULT_WS_BASE_URL)]
    base_url: String,

    #[arg(long, env = "POKER_TOKEN")]
    token: String,

    #[arg(long, env = "POKER_USER_ID")]
    user_id: UserId,

    #[arg(long, env = "POKER_USER_NAME", default_value = "")]
    name: String,

    #[arg(long)]
    session_id: String,

    #[arg(long, default_value = "")]
    ticket_id: String,

    #[arg(long, default_value_t = 60)]
    duration_secs: u32,

    /// Deck preset: serial, even, odd, fibonacci (or 1-4).
    #[arg(long, default_value = "fibonacci")]
    deck: DeckKind,

    /// Explicit comma-separated scale; overrides `--deck`.
    #[arg(long, value_delimiter = ',')]
    scale: Vec<Estimate>,

    #[arg(long)]
    coordinator_id: UserId,

    #[arg(long, env = "POKER_TICK_MS", default_value_t = DEFAULT_TICK_MS)]
    tick_ms: u64,
}

/// One line typed on stdin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HostCommand {
    Vote(Estimate),
    Start,
    Skip,
    Estimate(Estimate),
    Init,
    Quit,
}

/// Writes every session event to stdout as one JSON line.
struct JsonLinesObserver;

impl SessionObserver for JsonLinesObserver {
    fn on_snapshot(&mut self, snapshot: &SessionSnapshot) {
        print_line(&json!({ "event": "snapshot", "snapshot": snapshot }));
    }

    fn on_error(&mut self, error: &ErrorKind) {
        print_line(&json!({ "event": "error", "message": error.to_string() }));
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let phase = run(cli).await?;
    info!(%phase, "poker-cli: session ended");
    Ok(())
}

async fn run(cli: Cli) -> Result<Phase, CliError> {
    let estimation_scale = if cli.scale.is_empty() {
        EstimationScale::from_deck(cli.deck)
    } else {
        EstimationScale::custom(cli.scale)?
    };
    let client = ClientConfig {
        ws_base_url: cli.base_url,
        tick: Duration::from_millis(cli.tick_ms),
        ..ClientConfig::from_env()?
    };
    let identity = Identity { user_id: cli.user_id, display_name: cli.name, token: cli.token };
    let config = SessionConfig {
        session_id: cli.session_id,
        ticket_id: cli.ticket_id,
        duration_secs: cli.duration_secs,
        estimation_scale,
        coordinator_user_id: cli.coordinator_id,
    };
    info!(session_id = %config.session_id, user_id = identity.user_id, scale = %config.estimation_scale, "poker-cli: joining");

    let (handle, mut task) =
        spawn_session(config, &identity, &client, Box::new(JsonLinesObserver), Arc::new(SystemClock))?;
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            finished = &mut task => return Ok(finished?),
            line = lines.next_line() => {
                let command = match line? {
                    None => HostCommand::Quit,
                    Some(line) => match parse_command(&line) {
                        Ok(Some(command)) => command,
                        Ok(None) => continue,
                        Err(error) => {
                            eprintln!("{error}");
                            continue;
                        }
                    },
                };
                if command == HostCommand::Quit {
                    handle.close().await;
                    return Ok(task.await?);
                }
                if let Err(error) = execute(&handle, command).await {
                    debug!(error = %error, "poker-cli: command rejected");
                }
            }
        }
    }
}

async fn execute(handle: &SessionHandle, command: HostCommand) -> Result<(), SessionError> {
    match command {
        HostCommand::Vote(value) => handle.cast_vote(value).await,
        HostCommand::Start => handle.start_countdown().await,
        HostCommand::Skip => handle.skip().await,
        HostCommand::Estimate(value) => handle.submit_final_estimate(value).await,
        HostCommand::Init => handle.request_init().await,
        HostCommand::Quit => {
            handle.close().await;
            Ok(())
        }
    }
}

/// Parse one stdin line. Blank lines yield `None`.
fn parse_command(line: &str) -> Result<Option<HostCommand>, CliError> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let command = match verb.to_ascii_lowercase().as_str() {
        "vote" => HostCommand::Vote(parse_estimate("vote", words.next())?),
        "start" => HostCommand::Start,
        "skip" => HostCommand::Skip,
        "estimate" => HostCommand::Estimate(parse_estimate("estimate", words.next())?),
        "init" => HostCommand::Init,
        "quit" | "exit" => HostCommand::Quit,
        other => return Err(CliError::UnknownCommand(other.to_owned())),
    };
    Ok(Some(command))
}

fn parse_estimate(command: &'static str, raw: Option<&str>) -> Result<Estimate, CliError> {
    let raw = raw.unwrap_or_default();
    raw.parse()
        .map_err(|_| CliError::InvalidEstimate { command, value: raw.to_owned() })
}

fn print_line(value: &serde_json::Value) {
    let mut stdout = std::io::stdout().lock();
    if writeln!(stdout, "{value}").and_then(|()| stdout.flush()).is_err() {
        debug!("poker-cli: stdout closed");
    }
}

#[cfg(test)]
#[path = "main_test.rs"]
mod tests;
