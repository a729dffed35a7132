use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod echo;
pub mod send;
pub mod subscribe;
pub mod version;
pub mod wal;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run an echo server that answers every message.
    Echo(EchoArgs),
    /// Send one request and print the reply.
    Send(SendArgs),
    /// Print messages pushed by a server.
    Subscribe(SubscribeArgs),
    /// Inspect or compact a write-ahead log directory.
    #[command(subcommand)]
    Wal(WalCommand),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Echo(args) => echo::run(args, format),
        Command::Send(args) => send::run(args, format),
        Command::Subscribe(args) => subscribe::run(args, format),
        Command::Wal(WalCommand::Inspect(args)) => wal::inspect(args, format),
        Command::Wal(WalCommand::Compact(args)) => wal::compact(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct EchoArgs {
    /// Loopback address to bind (port 0 picks one).
    #[arg(env = "COURIER_ADDR", default_value = "127.0.0.1:7070")]
    pub addr: SocketAddr,
    /// Stop after serving N connections.
    #[arg(long)]
    pub connections: Option<usize>,
}

#[derive(Args, Debug)]
pub struct SendArgs {
    /// Server address.
    #[arg(env = "COURIER_ADDR")]
    pub addr: SocketAddr,
    /// Text payload.
    #[arg(long, conflicts_with = "file")]
    pub text: Option<String>,
    /// Read a binary payload from a file.
    #[arg(long, conflicts_with = "text")]
    pub file: Option<PathBuf>,
    /// Payload mimetype. Defaults to text/plain for --text and
    /// application/octet-stream for --file.
    #[arg(long)]
    pub mimetype: Option<String>,
    /// Charset used to encode --text.
    #[arg(long, default_value = "UTF-8")]
    pub charset: String,
    /// Connect and reply timeout (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct SubscribeArgs {
    /// Server address.
    #[arg(env = "COURIER_ADDR")]
    pub addr: SocketAddr,
    /// Exit after receiving N messages.
    #[arg(long)]
    pub count: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum WalCommand {
    /// Summarize the records in a queue's WAL directory.
    Inspect(WalArgs),
    /// Drop acknowledged and expired records.
    Compact(WalArgs),
}

#[derive(Args, Debug)]
pub struct WalArgs {
    /// Queue WAL directory (the one holding *.wal segments).
    pub dir: PathBuf,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

pub fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}
