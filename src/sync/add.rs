//! Add Propagator: projects an affected subgraph into catalog and resource documents

use std::collections::{BTreeMap, HashSet};

use tracing::{debug, info, warn};

use crate::core::assembly::{
    association, catalog_element, entry_element, entry_relation, node_element, node_entry_relation,
    node_relation, resource_element, sku_entries,
};
use crate::core::config::Config;
use crate::core::document::{CatalogDocument, Document, Relation, ResourceAction, ResourceDocument};
use crate::core::entity::{Entity, StructureEntity};
use crate::core::identity::{EntityId, EntityKind, LoadLevel};
use crate::core::links::LinkClass;
use crate::core::sku::item_skus;
use crate::core::transport::Transport;
use crate::sync::context::OperationContext;
use crate::sync::hierarchy::{dedup_by_path, sort_parents_first};
use crate::sync::SyncError;

/// Knobs for one add run
#[derive(Debug, Clone)]
pub struct AddOptions {
    /// Emit relations and associations, not only the elements themselves
    pub include_relations: bool,
    /// Restrict SKU fan-out to these SKU ids
    pub sku_filter: Option<Vec<String>>,
}

impl Default for AddOptions {
    fn default() -> Self {
        Self {
            include_relations: true,
            sku_filter: None,
        }
    }
}

/// What an add run sent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AddOutcome {
    pub nodes: usize,
    pub entries: usize,
    pub relations: usize,
    pub associations: usize,
    pub resources: usize,
    pub resources_included: bool,
    pub documents_sent: usize,
}

/// Codes standing for an entity at either end of an entry relation.
///
/// In SKU mode an item is represented by its SKUs, unless the item is kept
/// as a level of its own.
pub(crate) fn relation_codes(entity: &Entity, config: &Config, filter: Option<&[String]>) -> Vec<String> {
    if entity.kind != EntityKind::Item || !config.items_to_skus || config.use_three_levels {
        return vec![config.code(entity.id)];
    }
    let skus = item_skus(entity, config);
    if skus.is_empty() {
        return vec![config.code(entity.id)];
    }
    skus.into_iter()
        .filter(|sku| filter.map_or(true, |ids| ids.contains(&sku.id)))
        .map(|sku| config.code(&sku.id))
        .collect()
}

/// Codes of every catalog entry generated for an entity
pub(crate) fn entry_codes(entity: &Entity, config: &Config) -> Vec<String> {
    if entity.kind != EntityKind::Item || !config.items_to_skus {
        return vec![config.code(entity.id)];
    }
    let mut codes: Vec<String> = item_skus(entity, config)
        .into_iter()
        .map(|sku| config.code(&sku.id))
        .collect();
    if codes.is_empty() || config.use_three_levels {
        codes.insert(0, config.code(entity.id));
    }
    codes
}

struct Projection<'o> {
    doc: CatalogDocument,
    resources: BTreeMap<EntityId, Vec<String>>,
    nodes: HashSet<EntityId>,
    entries: HashSet<EntityId>,
    options: &'o AddOptions,
}

impl Projection<'_> {
    fn relate(&mut self, relation: Relation) {
        if !self.doc.relations.contains(&relation) {
            self.doc.relations.push(relation);
        }
    }

    fn sku_filter(&self) -> Option<&[String]> {
        self.options.sku_filter.as_deref()
    }

    fn add_node(&mut self, ctx: &OperationContext, node: &Entity, row: &StructureEntity) {
        let config = ctx.config();
        let parent = row.parent_id.filter(|p| *p != ctx.channel_id());
        if self.nodes.insert(node.id) {
            self.doc
                .nodes
                .push(node_element(node, parent, row.sort_order, config));
        } else if let Some(parent) = parent {
            if self.options.include_relations {
                self.relate(node_relation(parent, node.id, row.sort_order, config));
            }
        }
    }

    fn add_entries(&mut self, ctx: &OperationContext, entity: &Entity) {
        if !self.entries.insert(entity.id) {
            return;
        }
        let config = ctx.config();
        if entity.kind != EntityKind::Item || !config.items_to_skus {
            self.doc
                .entries
                .push(entry_element(entity, ctx.channel_id(), config));
            return;
        }

        let skus: Vec<_> = sku_entries(entity, ctx.channel_id(), config)
            .into_iter()
            .filter(|entry| {
                self.sku_filter()
                    .map_or(true, |ids| ids.iter().any(|id| config.code(id) == entry.code))
            })
            .collect();
        let keep_item = self.sku_filter().is_none()
            && (config.use_three_levels || item_skus(entity, config).is_empty());
        if keep_item {
            self.doc
                .entries
                .push(entry_element(entity, ctx.channel_id(), config));
        }
        if config.use_three_levels && self.options.include_relations {
            for (index, sku) in skus.iter().enumerate() {
                self.relate(entry_relation(
                    config.code(entity.id),
                    &entity.kind,
                    sku.code.clone(),
                    index as i32,
                    config,
                ));
            }
        }
        self.doc.entries.extend(skus);
    }

    fn add_relation(
        &mut self,
        ctx: &mut OperationContext,
        entity: &Entity,
        row: &StructureEntity,
        class: LinkClass,
    ) -> Result<(), SyncError> {
        let Some(parent_id) = row.parent_id else {
            return Ok(());
        };
        if parent_id == ctx.channel_id() {
            return Ok(());
        }
        let config = ctx.config();
        match class {
            LinkClass::ChannelNodeLink => {
                for code in relation_codes(entity, config, self.sku_filter()) {
                    self.relate(node_entry_relation(parent_id, code, row.sort_order, config));
                }
            }
            LinkClass::Relation => {
                let parent = match ctx.cache.parent_product(row)? {
                    Some(parent) if parent.id == parent_id => Some(parent),
                    _ => ctx.cache.find_entity(parent_id, LoadLevel::DataOnly)?,
                };
                let Some(parent) = parent else {
                    warn!(entity_id = %entity.id, parent_id = %parent_id, "parent entity not found, relation skipped");
                    return Ok(());
                };
                let children = relation_codes(entity, config, self.sku_filter());
                for parent_code in relation_codes(&parent, config, None) {
                    for child in &children {
                        self.relate(entry_relation(
                            parent_code.clone(),
                            &parent.kind,
                            child.clone(),
                            row.sort_order,
                            config,
                        ));
                    }
                }
            }
            LinkClass::Association => {
                let link_entity = match row.link_entity_id {
                    Some(id) => ctx.cache.find_entity(id, LoadLevel::DataOnly)?,
                    None => None,
                };
                if let Some(element) = association(row, link_entity.as_deref(), config) {
                    if !self.doc.associations.contains(&element) {
                        self.doc.associations.push(element);
                    }
                }
            }
        }
        Ok(())
    }

    fn add_resource(&mut self, ctx: &mut OperationContext, row: &StructureEntity) -> Result<(), SyncError> {
        let codes = self.resources.entry(row.entity_id).or_default();
        let Some(parent_id) = row.parent_id else {
            return Ok(());
        };
        let parent_codes = match ctx.cache.find_entity(parent_id, LoadLevel::DataOnly)? {
            Some(parent) => relation_codes(&parent, ctx.config(), None),
            None => vec![ctx.config().code(parent_id)],
        };
        for code in parent_codes {
            if !codes.contains(&code) {
                codes.push(code);
            }
        }
        Ok(())
    }
}

/// Project `scope` into a catalog document and, when resources are in
/// scope, a resources document; send them in that order.
pub fn add(
    ctx: &mut OperationContext,
    transport: &mut dyn Transport,
    scope: &[StructureEntity],
    options: &AddOptions,
) -> Result<AddOutcome, SyncError> {
    let config = ctx.config();
    let mut rows = dedup_by_path(scope.to_vec());
    sort_parents_first(&mut rows);

    let mut projection = Projection {
        doc: CatalogDocument {
            catalog: Some(catalog_element(ctx.channel(), config)),
            ..CatalogDocument::default()
        },
        resources: BTreeMap::new(),
        nodes: HashSet::new(),
        entries: HashSet::new(),
        options,
    };

    for row in &rows {
        match row.kind {
            EntityKind::Channel => continue,
            EntityKind::Resource => {
                projection.add_resource(ctx, row)?;
                continue;
            }
            _ => {}
        }

        let Some(entity) = ctx.cache.find_entity(row.entity_id, LoadLevel::DataOnly)? else {
            warn!(entity_id = %row.entity_id, path = %row.path, "entity in structure but not in source, skipped");
            continue;
        };
        if entity.is_link_entity {
            continue;
        }

        if row.kind == EntityKind::ChannelNode {
            projection.add_node(ctx, &entity, row);
            continue;
        }

        let class = row
            .link_type
            .as_deref()
            .map(|link_type| ctx.cache.links().class(link_type));
        let via_association = class == Some(LinkClass::Association);
        if !via_association || config.force_include_linked_content {
            projection.add_entries(ctx, &entity);
        }
        if options.include_relations {
            if let Some(class) = class {
                projection.add_relation(ctx, &entity, row, class)?;
            }
        }
    }

    let Projection { doc, resources, .. } = projection;
    let mut outcome = AddOutcome {
        nodes: doc.nodes.len(),
        entries: doc.entries.len(),
        relations: doc.relations.len(),
        associations: doc.associations.len(),
        ..AddOutcome::default()
    };

    let mut resource_doc = ResourceDocument::default();
    for (id, parent_codes) in resources {
        let resource = ctx.cache.find_entity(id, LoadLevel::DataOnly)?;
        resource_doc.resources.push(resource_element(
            resource.as_deref(),
            config.code(id),
            ResourceAction::Added,
            parent_codes,
            config,
        ));
    }
    outcome.resources = resource_doc.resources.len();
    outcome.resources_included = !resource_doc.resources.is_empty();

    debug!(
        nodes = outcome.nodes,
        entries = outcome.entries,
        relations = outcome.relations,
        "catalog document assembled"
    );
    transport.import(ctx.identity(), &Document::Catalog(doc))?;
    outcome.documents_sent += 1;

    if outcome.resources_included {
        transport.import(ctx.identity(), &Document::Resources(resource_doc))?;
        outcome.documents_sent += 1;
    }

    info!(
        channel_id = %ctx.channel_id(),
        entries = outcome.entries,
        nodes = outcome.nodes,
        resources = outcome.resources,
        "add propagated"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::document::{DocumentKind, EntryRelationType};
    use crate::core::links::LinkTypeDef;
    use crate::core::snapshot::SnapshotSource;
    use crate::core::transport::RecordingTransport;

    const SKUS: &str = r#"<SKUs><SKU id="A"/><SKU id="B"/></SKUs>"#;

    fn source() -> SnapshotSource {
        SnapshotSource::new(EntityId::new(1))
            .with_link_type(LinkTypeDef::new("ChannelNodes", EntityKind::Channel, EntityKind::ChannelNode))
            .with_link_type(LinkTypeDef::new("NodeNodes", EntityKind::ChannelNode, EntityKind::ChannelNode))
            .with_link_type(LinkTypeDef::new("NodeProducts", EntityKind::ChannelNode, EntityKind::Product))
            .with_link_type(LinkTypeDef::new("ProductItems", EntityKind::Product, EntityKind::Item))
            .with_link_type(LinkTypeDef::new("Accessories", EntityKind::Product, EntityKind::Product))
            .with_link_type(LinkTypeDef::new("ProductResources", EntityKind::Product, EntityKind::Resource))
            .with_entity(10, EntityKind::ChannelNode)
            .with_entity(11, EntityKind::ChannelNode)
            .with_entity(20, EntityKind::Product)
            .with_entity(21, EntityKind::Product)
            .with_entity(30, EntityKind::Item)
            .with_field(30, "SKUs", SKUS)
            .with_entity(90, EntityKind::Resource)
            .with_link("ChannelNodes", 1, 10)
            .with_link("NodeNodes", 10, 11)
            .with_link("NodeProducts", 11, 20)
            .with_link("ProductItems", 20, 30)
            .with_link("Accessories", 20, 21)
            .with_link("ProductResources", 20, 90)
    }

    fn run(src: &SnapshotSource, config: &Config, options: &AddOptions) -> (RecordingTransport, AddOutcome) {
        let mut ctx = OperationContext::open(src, src, config, EntityId::new(1)).unwrap();
        let scope = src.structure();
        let mut transport = RecordingTransport::new();
        let outcome = add(&mut ctx, &mut transport, &scope, options).unwrap();
        (transport, outcome)
    }

    #[test]
    fn test_add_projects_nodes_entries_and_relations() {
        let src = source();
        let (transport, outcome) = run(&src, &Config::default(), &AddOptions::default());
        assert_eq!(transport.kinds(), vec![DocumentKind::Catalog, DocumentKind::Resources]);
        let doc = transport.documents()[0].as_catalog().unwrap();

        assert!(doc.catalog.is_some());
        assert_eq!(doc.node("10").unwrap().parent_code, None);
        assert_eq!(doc.node("11").unwrap().parent_code.as_deref(), Some("10"));
        assert!(doc.entry("20").is_some());
        assert!(doc.entry("30").is_some());
        // reached only as an accessory
        assert!(doc.entry("21").is_none());
        assert_eq!(doc.associations.len(), 1);
        assert!(doc.relations.iter().any(|r| matches!(
            r,
            Relation::NodeEntry { node_code, entry_code, .. } if node_code == "11" && entry_code == "20"
        )));
        assert!(doc.relations.iter().any(|r| matches!(
            r,
            Relation::EntryRelation { parent_entry_code, child_entry_code, relation_type: EntryRelationType::ProductVariation, .. }
                if parent_entry_code == "20" && child_entry_code == "30"
        )));
        assert!(outcome.resources_included);

        let resources = transport.documents()[1].as_resources().unwrap();
        assert_eq!(resources.resources[0].parent_codes, vec!["20".to_string()]);
    }

    #[test]
    fn test_add_item_under_two_products_relates_both() {
        let src = source()
            .with_entity(22, EntityKind::Product)
            .with_link("NodeProducts", 11, 22)
            .with_link("ProductItems", 22, 30);
        let (transport, _) = run(&src, &Config::default(), &AddOptions::default());
        let doc = transport.documents()[0].as_catalog().unwrap();

        let mut parents: Vec<&str> = doc
            .relations
            .iter()
            .filter_map(|r| match r {
                Relation::EntryRelation {
                    parent_entry_code,
                    child_entry_code,
                    ..
                } if child_entry_code == "30" => Some(parent_entry_code.as_str()),
                _ => None,
            })
            .collect();
        parents.sort();
        assert_eq!(parents, vec!["20", "22"]);
    }

    #[test]
    fn test_add_sku_mode_fans_out_items() {
        let src = source();
        let config = Config {
            items_to_skus: true,
            ..Config::default()
        };
        let (transport, _) = run(&src, &config, &AddOptions::default());
        let doc = transport.documents()[0].as_catalog().unwrap();
        assert!(doc.entry("30").is_none());
        assert_eq!(doc.entry("A").unwrap().entry_type, "Variation");
        assert!(doc.entry("B").is_some());
        let children: Vec<&str> = doc
            .relations
            .iter()
            .filter_map(|r| match r {
                Relation::EntryRelation { child_entry_code, .. } => Some(child_entry_code.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(children, vec!["A", "B"]);
    }

    #[test]
    fn test_add_three_levels_keeps_item() {
        let src = source();
        let config = Config {
            items_to_skus: true,
            use_three_levels: true,
            ..Config::default()
        };
        let (transport, _) = run(&src, &config, &AddOptions::default());
        let doc = transport.documents()[0].as_catalog().unwrap();
        assert!(doc.entry("30").is_some());
        assert!(doc.relations.iter().any(|r| matches!(
            r,
            Relation::EntryRelation { parent_entry_code, child_entry_code, .. }
                if parent_entry_code == "30" && child_entry_code == "A"
        )));
    }

    #[test]
    fn test_add_sku_filter_limits_entries() {
        let src = source();
        let config = Config {
            items_to_skus: true,
            ..Config::default()
        };
        let options = AddOptions {
            sku_filter: Some(vec!["B".into()]),
            ..AddOptions::default()
        };
        let (transport, _) = run(&src, &config, &options);
        let doc = transport.documents()[0].as_catalog().unwrap();
        assert!(doc.entry("A").is_none());
        assert!(doc.entry("B").is_some());
    }

    #[test]
    fn test_add_without_relations() {
        let src = source();
        let options = AddOptions {
            include_relations: false,
            ..AddOptions::default()
        };
        let (transport, outcome) = run(&src, &Config::default(), &options);
        let doc = transport.documents()[0].as_catalog().unwrap();
        assert!(doc.relations.is_empty());
        assert!(doc.associations.is_empty());
        assert_eq!(outcome.relations, 0);
    }

    #[test]
    fn test_add_catalog_rejection_skips_resources() {
        let src = source();
        let config = Config::default();
        let mut ctx = OperationContext::open(&src, &src, &config, EntityId::new(1)).unwrap();
        let mut transport = RecordingTransport::rejecting(DocumentKind::Catalog);
        let err = add(&mut ctx, &mut transport, &src.structure(), &AddOptions::default()).unwrap_err();
        assert!(err.is_fatal());
        assert!(transport.documents().is_empty());
    }

    #[test]
    fn test_entry_codes_three_levels() {
        let mut item = Entity::new(EntityId::new(30), EntityKind::Item);
        item.fields.push(crate::core::entity::Field::new(
            "SKUs",
            crate::core::entity::FieldValue::Text(SKUS.into()),
        ));
        let config = Config {
            items_to_skus: true,
            use_three_levels: true,
            ..Config::default()
        };
        assert_eq!(entry_codes(&item, &config), vec!["30", "A", "B"]);
        assert_eq!(relation_codes(&item, &config, None), vec!["30"]);
        let config = Config {
            items_to_skus: true,
            ..Config::default()
        };
        assert_eq!(entry_codes(&item, &config), vec!["A", "B"]);
    }
}
