//! `catsync config` command - inspect connector configuration

use clap::Subcommand;
use console::style;
use miette::{IntoDiagnostic, Result};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cli::helpers::load_config;
use crate::cli::GlobalOpts;
use crate::core::config::{Config, PROJECT_DIR};

#[derive(Subcommand, Debug)]
pub enum ConfigCommands {
    /// Show current configuration values
    Show(ShowArgs),

    /// Show paths to configuration files
    Path,

    /// List all available configuration keys
    Keys,
}

#[derive(clap::Args, Debug)]
pub struct ShowArgs {
    /// Show only this key's value
    pub key: Option<String>,

    /// Show only project-level config
    #[arg(long = "project-only", conflicts_with = "global_only")]
    pub project_only: bool,

    /// Show only global (user) config
    #[arg(long = "global-only")]
    pub global_only: bool,
}

/// Valid configuration keys
const VALID_KEYS: &[(&str, &str)] = &[
    ("channel_id", "Channel handled by this connector"),
    ("channel_prefix", "Prefix applied to every catalog code"),
    ("items_to_skus", "Expand items into their SKU entries"),
    ("use_three_levels", "Keep the item entry next to its SKUs"),
    ("force_include_linked_content", "Publish entries reachable only by association"),
    ("export_entity_types", "Entity kinds included in a full publish"),
    ("sku_field", "Field holding an item's SKU list"),
    ("link_types", "Link type definitions overriding the data source"),
    ("max_delete_depth", "Recursion cap for the delete walk"),
    ("outbox", "Directory the outbox transport writes to"),
];

/// Run a config subcommand
pub fn run(cmd: ConfigCommands, global: &GlobalOpts) -> Result<()> {
    match cmd {
        ConfigCommands::Show(args) => run_show(args, global),
        ConfigCommands::Path => run_path(),
        ConfigCommands::Keys => run_keys(),
    }
}

fn run_show(args: ShowArgs, global: &GlobalOpts) -> Result<()> {
    if args.project_only {
        return show_file("Project config:", &project_config_path(global));
    }
    if args.global_only {
        return show_file("Global config:", &global_config_path()?);
    }

    let config = load_config(global)?;
    let value = serde_yml::to_value(&config).into_diagnostic()?;

    if let Some(key) = &args.key {
        return match value.get(key.as_str()) {
            Some(v) if !v.is_null() => {
                print!("{}", serde_yml::to_string(v).into_diagnostic()?);
                Ok(())
            }
            Some(_) => Err(miette::miette!("Key '{}' is not set", key)),
            None => Err(miette::miette!(
                "Unknown key '{}'. Run 'catsync config keys' to list them",
                key
            )),
        };
    }

    println!("{}", style("Effective Configuration").bold().underlined());
    println!();
    print!("{}", serde_yml::to_string(&config).into_diagnostic()?);

    if !global.quiet {
        println!();
        println!("{}", style("Config Sources (in priority order):").dim());
        println!("  1. Environment variables (CATSYNC_CHANNEL_ID, CATSYNC_ITEMS_TO_SKUS, ...)");
        println!("  2. Project config ({}/config.yaml) or --config", PROJECT_DIR);
        println!("  3. Global config (~/.config/catsync/config.yaml)");
    }

    Ok(())
}

fn run_path() -> Result<()> {
    let global_path = global_config_path()?;
    let project_path = Path::new(PROJECT_DIR).join("config.yaml");

    println!("{}", style("Configuration file paths:").bold());
    println!();
    print_path("Global:", &global_path);
    println!();
    print_path("Project:", &project_path);

    Ok(())
}

fn run_keys() -> Result<()> {
    println!("{}", style("Available configuration keys:").bold());
    println!();

    for (key, description) in VALID_KEYS {
        println!("  {:<30} {}", style(key).cyan(), style(description).dim());
    }

    Ok(())
}

fn global_config_path() -> Result<PathBuf> {
    Config::global_config_path()
        .ok_or_else(|| miette::miette!("Could not determine global config directory"))
}

fn project_config_path(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(|| Path::new(PROJECT_DIR).join("config.yaml"))
}

fn print_path(label: &str, path: &Path) {
    println!("  {} {}", style(label).cyan(), path.display());
    if path.exists() {
        println!("          {}", style("(exists)").green());
    } else {
        println!("          {}", style("(not created)").dim());
    }
}

fn show_file(label: &str, path: &Path) -> Result<()> {
    println!("{} {}", style(label).bold(), style(path.display()).dim());
    println!();

    if path.exists() {
        let content = fs::read_to_string(path).into_diagnostic()?;
        print!("{}", content);
    } else {
        println!("{}", style("(not created)").dim());
    }

    Ok(())
}
