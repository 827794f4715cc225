//! `catsync publish` command - full projection of a channel snapshot

use miette::Result;
use std::path::PathBuf;

use crate::cli::commands::replay::dispatch;
use crate::cli::helpers::{load_config, load_snapshot};
use crate::cli::GlobalOpts;
use crate::sync::ChangeEvent;

#[derive(clap::Args, Debug)]
pub struct PublishArgs {
    /// Channel snapshot (YAML)
    #[arg(long, short = 's')]
    pub snapshot: PathBuf,

    /// Directory documents are written to
    #[arg(long, short = 'o')]
    pub outbox: Option<PathBuf>,
}

pub fn run(args: PublishArgs, global: &GlobalOpts) -> Result<()> {
    let config = load_config(global)?;
    let source = load_snapshot(&args.snapshot)?;
    let event = ChangeEvent::Publish {
        channel: config.channel_id.unwrap_or_else(|| source.channel()),
    };
    dispatch(&config, &source, &event, args.outbox.as_deref(), global)
}
