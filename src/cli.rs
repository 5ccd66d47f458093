//! Command-line surface.
//!
//! `campaign run` drives the whole two-phase sequence. Each stage can also
//! be run alone, reading and writing the conventional paths unless told
//! otherwise.

use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(
    name = "campaign",
    version,
    about = "Concurrent LLM enrichment pipeline for sales outreach campaigns",
    subcommand_required = true,
    arg_required_else_help = true
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run outreach, ask whether to continue, then run the follow-up
    Run,
    /// Score leads and fill missing profile fields
    Score(StageArgs),
    /// Draft a personalised email per lead
    Draft(StageArgs),
    /// Send drafted emails over SMTP
    Send(StageArgs),
    /// Generate simulated replies to sent emails
    SimulateReplies(StageArgs),
    /// Classify reply text
    Classify(StageArgs),
    /// Aggregate metrics and write the campaign report
    Report(StageArgs),
}

/// Input/output overrides shared by the standalone stage commands.
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct StageArgs {
    /// Input dataset (defaults to the previous stage's output)
    #[arg(long, value_name = "PATH")]
    pub input: Option<PathBuf>,

    /// Output file (defaults to the conventional location)
    #[arg(long, value_name = "PATH")]
    pub output: Option<PathBuf>,
}

impl StageArgs {
    /// Explicit paths, falling back to the given defaults.
    pub fn resolve(&self, input: &Path, output: &Path) -> (PathBuf, PathBuf) {
        (
            self.input.clone().unwrap_or_else(|| input.to_path_buf()),
            self.output.clone().unwrap_or_else(|| output.to_path_buf()),
        )
    }
}
