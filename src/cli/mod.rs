//! Command-line interface

pub mod commands;
pub mod output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, MatchCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;
use std::path::PathBuf;

/// Event-driven CI pipeline engine
#[derive(Debug, Parser, Clone)]
#[command(name = "gantry")]
#[command(version)]
#[command(about = "Runs CI pipelines in response to repository events", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Engine settings file (defaults to ./gantry.yml when present)
    #[arg(short, long, global = true)]
    pub settings: Option<PathBuf>,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run every pipeline the event activates
    Run(RunCommand),

    /// Validate a pipeline definition
    Validate(ValidateCommand),

    /// List the pipelines an event would activate
    Match(MatchCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
