//! Shared helper functions for CLI commands

use console::Term;
use miette::{IntoDiagnostic, Result};
use std::path::Path;
use tabled::{builder::Builder, settings::Style};

use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::config::Config;
use crate::core::snapshot::SnapshotSource;

/// Effective configuration, honouring `--config`
pub fn load_config(global: &GlobalOpts) -> Result<Config> {
    Config::load(global.config.as_deref()).into_diagnostic()
}

/// Load a channel snapshot, reporting YAML errors with their source span
pub fn load_snapshot(path: &Path) -> Result<SnapshotSource> {
    Ok(SnapshotSource::from_yaml_file(path)?)
}

/// Resolve `auto` to a table on a terminal and YAML otherwise
pub fn resolve_format(format: OutputFormat) -> OutputFormat {
    match format {
        OutputFormat::Auto if Term::stdout().is_term() => OutputFormat::Table,
        OutputFormat::Auto => OutputFormat::Yaml,
        other => other,
    }
}

/// Markdown-style table
pub fn render_table<R, C>(header: &[&str], rows: R) -> String
where
    R: IntoIterator<Item = Vec<C>>,
    C: Into<String>,
{
    let mut builder = Builder::default();
    builder.push_record(header.iter().map(|h| h.to_string()));
    for row in rows {
        builder.push_record(row.into_iter().map(|cell| -> String { cell.into() }));
    }
    builder.build().with(Style::markdown()).to_string()
}

/// Truncate a string to max_len, adding "..." if truncated
pub fn truncate_str(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
