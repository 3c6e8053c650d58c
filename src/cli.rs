use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Compare two files by content and keep a history of every comparison.
#[derive(Debug, Parser)]
#[command(name = "hashbank", author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file (TOML, YAML or JSON), layered over any
    /// `hashbank.toml` in the working directory.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// More log output; repeat for more detail.
    #[arg(short, long, global = true, action = clap::ArgAction::Count, conflicts_with = "quiet")]
    pub verbose: u8,

    /// Only log errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Compare two files and record the result
    ///
    /// Both files are copied into the staging directory first, so the
    /// originals are left where they are.
    Compare {
        file1: PathBuf,
        file2: PathBuf,
    },
    /// Show recorded comparisons, newest first
    History {
        /// Only show this many
        #[arg(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Replace all records with a small set of demo comparisons
    Seed,
    /// Bring the database schema up to date and list its columns
    Schema,
    /// List cached files that no record refers to
    Orphans,
}
