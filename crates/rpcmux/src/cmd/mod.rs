use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Subcommand};

use crate::exit::{CliError, CliResult, USAGE};
use crate::output::OutputFormat;

pub mod call;
pub mod serve;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve an endpoint: answer each inbound request on a fresh channel.
    Serve(ServeArgs),
    /// Call a serving endpoint and print the reply.
    Call(CallArgs),
    /// Show version information.
    Version(VersionArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Serve(args) => serve::run(args, format),
        Command::Call(args) => call::run(args, format),
        Command::Version(args) => version::run(args),
    }
}

#[derive(Args, Debug)]
pub struct ServeArgs {
    /// Socket path to bind.
    pub path: PathBuf,
    /// Exit after answering N requests.
    #[arg(long)]
    pub count: Option<usize>,
}

#[derive(Args, Debug)]
pub struct CallArgs {
    /// Socket path to connect to.
    pub path: PathBuf,
    /// Event name to send.
    pub name: String,
    /// Arguments as a JSON array, e.g. '["a", 1]'.
    #[arg(default_value = "[]")]
    pub args: String,
    /// Maximum time to wait for the reply (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub timeout: String,
}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

/// Parse a human duration like `500ms`, `5s`, or `2m`.
pub(crate) fn parse_duration(input: &str) -> CliResult<Duration> {
    let trimmed = input.trim();
    let split = trimmed
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| CliError::new(USAGE, format!("missing duration unit in '{input}'")))?;
    let (value, unit) = trimmed.split_at(split);
    let value: u64 = value
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration '{input}'")))?;

    match unit {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        _ => Err(CliError::new(
            USAGE,
            format!("unknown duration unit '{unit}' in '{input}'"),
        )),
    }
}
