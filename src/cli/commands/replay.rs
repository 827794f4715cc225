//! `catsync replay` command - run one change event against a snapshot
//!
//! Documents are written as JSON files into an outbox directory.

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::{Path, PathBuf};

use crate::cli::helpers::{load_config, load_snapshot, render_table, resolve_format, truncate_str};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::config::Config;
use crate::core::events::TracingSink;
use crate::core::snapshot::SnapshotSource;
use crate::core::transport::OutboxTransport;
use crate::sync::{ChangeEvent, ChangeRouter, RouteOutcome};
use crate::yaml::parse_yaml_file;

const DEFAULT_OUTBOX: &str = "outbox";

#[derive(clap::Args, Debug)]
pub struct ReplayArgs {
    /// Channel snapshot (YAML)
    #[arg(long, short = 's')]
    pub snapshot: PathBuf,

    /// Change event (YAML)
    #[arg(long, short = 'e')]
    pub event: PathBuf,

    /// Directory documents are written to (default: config `outbox`, else ./outbox)
    #[arg(long, short = 'o')]
    pub outbox: Option<PathBuf>,
}

pub fn run(args: ReplayArgs, global: &GlobalOpts) -> Result<()> {
    let config = load_config(global)?;
    let source = load_snapshot(&args.snapshot)?;
    let event: ChangeEvent = parse_yaml_file(&args.event)?;
    dispatch(&config, &source, &event, args.outbox.as_deref(), global)
}

/// Route `event` through an outbox transport and print what was written
pub(crate) fn dispatch(
    config: &Config,
    source: &SnapshotSource,
    event: &ChangeEvent,
    outbox: Option<&Path>,
    global: &GlobalOpts,
) -> Result<()> {
    let dir = outbox
        .map(Path::to_path_buf)
        .or_else(|| config.outbox.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTBOX));
    let mut transport = OutboxTransport::new(&dir).into_diagnostic()?;

    let sink = TracingSink;
    let router = ChangeRouter::new(source, source, config, &sink);
    let outcome = router.handle(event, &mut transport)?;

    let format = resolve_format(global.format);
    match outcome {
        RouteOutcome::Ignored { reason } => {
            if !global.quiet {
                eprintln!("{} {}", style("!").yellow(), reason);
            }
        }
        RouteOutcome::Completed {
            event,
            documents_sent,
            resources_included,
        } => match format {
            OutputFormat::Json | OutputFormat::Yaml => {
                let written: Vec<serde_json::Value> = transport
                    .written()
                    .iter()
                    .map(|entry| {
                        serde_json::json!({
                            "kind": entry.kind.as_str(),
                            "elements": entry.elements,
                            "summary": entry.summary,
                            "path": entry.path.display().to_string(),
                        })
                    })
                    .collect();
                let report = serde_json::json!({
                    "event": event.as_str(),
                    "documents_sent": documents_sent,
                    "resources_included": resources_included,
                    "documents": written,
                });
                if format == OutputFormat::Json {
                    println!("{}", serde_json::to_string_pretty(&report).into_diagnostic()?);
                } else {
                    print!("{}", serde_yml::to_string(&report).into_diagnostic()?);
                }
            }
            _ => {
                let rows = transport.written().iter().enumerate().map(|(i, entry)| {
                    vec![
                        (i + 1).to_string(),
                        entry.kind.as_str().to_string(),
                        entry.elements.to_string(),
                        truncate_str(&entry.summary, 48),
                        entry
                            .path
                            .file_name()
                            .map(|n| n.to_string_lossy().to_string())
                            .unwrap_or_default(),
                    ]
                });
                println!("{}", render_table(&["#", "Kind", "Elements", "Summary", "File"], rows));
                if !global.quiet {
                    println!();
                    println!(
                        "{} {} handled: {} document(s) written to {}{}",
                        style("✓").green(),
                        style(event.as_str()).cyan(),
                        documents_sent,
                        style(transport.dir().display()).dim(),
                        if resources_included { " (resources included)" } else { "" }
                    );
                }
            }
        },
    }
    Ok(())
}
