//! CLI argument definitions using clap derive

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::cli::commands::{
    completions::CompletionsArgs, config::ConfigCommands, publish::PublishArgs, replay::ReplayArgs,
    structure::StructureArgs,
};

#[derive(Parser)]
#[command(name = "catsync")]
#[command(author, version, about = "Incremental channel-to-catalog synchronization")]
#[command(long_about = "Propagates single change events from a product-information channel into a target catalog, sending only the documents the change requires.")]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[command(flatten)]
    pub global: GlobalOpts,
}

#[derive(clap::Args, Clone, Debug)]
pub struct GlobalOpts {
    /// Output format
    #[arg(long, short = 'f', global = true, default_value = "auto")]
    pub format: OutputFormat,

    /// Suppress non-essential output
    #[arg(long, short = 'q', global = true)]
    pub quiet: bool,

    /// Enable verbose output (debug logging)
    #[arg(long, short = 'v', global = true)]
    pub verbose: bool,

    /// Configuration file (default: .catsync/config.yaml)
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Replay one change event against a channel snapshot
    Replay(ReplayArgs),

    /// Project a whole channel snapshot into the target catalog
    Publish(PublishArgs),

    /// Show the structure rows computed for a channel snapshot
    Structure(StructureArgs),

    /// Show effective configuration
    #[command(subcommand)]
    Config(ConfigCommands),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Table on a terminal
    #[default]
    Auto,
    /// Human-readable table
    Table,
    /// JSON
    Json,
    /// YAML
    Yaml,
}
