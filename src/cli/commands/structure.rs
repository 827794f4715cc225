//! `catsync structure` command - show the structure rows of a snapshot

use console::style;
use miette::{IntoDiagnostic, Result};
use std::path::PathBuf;

use crate::cli::helpers::{load_config, load_snapshot, render_table, resolve_format};
use crate::cli::{GlobalOpts, OutputFormat};
use crate::core::entity::StructureEntity;
use crate::core::identity::{EntityId, EntityKind};
use crate::core::links::LinkTypeRegistry;
use crate::core::source::DataService;

#[derive(clap::Args, Debug)]
pub struct StructureArgs {
    /// Channel snapshot (YAML)
    #[arg(long, short = 's')]
    pub snapshot: PathBuf,

    /// Only positions of this entity
    #[arg(long, short = 'e')]
    pub entity: Option<EntityId>,

    /// Only positions of this entity kind (e.g. ChannelNode, Item)
    #[arg(long, short = 'k')]
    pub kind: Option<String>,
}

pub fn run(args: StructureArgs, global: &GlobalOpts) -> Result<()> {
    let config = load_config(global)?;
    let source = load_snapshot(&args.snapshot)?;
    let links = LinkTypeRegistry::new(&source.link_types().into_diagnostic()?, &config.link_types);
    let kind = args.kind.as_deref().map(EntityKind::from);

    let rows: Vec<StructureEntity> = source
        .structure()
        .into_iter()
        .filter(|row| args.entity.map_or(true, |id| row.entity_id == id))
        .filter(|row| kind.as_ref().map_or(true, |k| &row.kind == k))
        .collect();

    match resolve_format(global.format) {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&rows).into_diagnostic()?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yml::to_string(&rows).into_diagnostic()?);
        }
        _ => {
            let table = render_table(
                &["Path", "Entity", "Kind", "Parent", "Link type", "Class", "Sort"],
                rows.iter().map(|row| {
                    vec![
                        row.path.clone(),
                        row.entity_id.to_string(),
                        row.kind.to_string(),
                        row.parent_id.map(|p| p.to_string()).unwrap_or_default(),
                        row.link_type.clone().unwrap_or_default(),
                        row.link_type
                            .as_deref()
                            .map(|lt| links.class(lt).to_string())
                            .unwrap_or_default(),
                        row.sort_order.to_string(),
                    ]
                }),
            );
            println!("{}", table);
            if !global.quiet {
                println!();
                println!(
                    "{} position(s) in channel {}",
                    style(rows.len()).cyan(),
                    style(source.channel()).bold()
                );
            }
        }
    }
    Ok(())
}
