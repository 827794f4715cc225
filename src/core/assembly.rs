//! Projection of source entities into catalog document elements
//!
//! Every function here is pure: it reads entities, structure rows and the
//! configuration and returns document elements.

use crate::core::config::Config;
use crate::core::document::{
    AssociationElement, CatalogElement, EntryElement, EntryRelationType, LineageElement, MetaData,
    MetaField, NodeElement, Relation, ResourceAction, ResourceElement,
};
use crate::core::entity::{Entity, FieldValue, StructureEntity};
use crate::core::identity::{EntityId, EntityKind};
use crate::core::sku::item_skus;

/// Deterministic GUID of a channel entry: both ids zero-padded to 16 digits
pub fn entry_guid(channel: EntityId, entity: EntityId) -> String {
    let digits = format!("{:016}{:016}", channel.get(), entity.get());
    format!(
        "{}-{}-{}-{}-{}",
        &digits[0..8],
        &digits[8..12],
        &digits[12..16],
        &digits[16..20],
        &digits[20..32]
    )
}

/// Display name: first non-empty configured name field, else the id
pub fn entity_name(entity: &Entity, config: &Config) -> String {
    config
        .epi_name_fields
        .iter()
        .filter_map(|name| entity.field(name))
        .filter(|f| !f.is_empty())
        .find_map(|f| f.value.as_ref().map(|v| v.as_text(&source_language(config))))
        .unwrap_or_else(|| entity.id.to_string())
}

fn source_language(config: &Config) -> String {
    config
        .language_mapping
        .get(&config.default_language)
        .cloned()
        .unwrap_or_else(|| config.default_language.clone())
}

/// Meta class: the field set when there is one, else the entity kind
pub fn meta_class(entity: &Entity) -> String {
    match &entity.field_set {
        Some(set) => format!("{}_{}", entity.kind, set),
        None => entity.kind.to_string(),
    }
}

/// Fields of an entity as meta fields; empty fields and the SKU field are left out
pub fn meta_fields(entity: &Entity, config: &Config) -> Vec<MetaField> {
    entity
        .fields
        .iter()
        .filter(|f| !f.is_empty() && f.name != config.sku_field)
        .filter_map(|f| {
            let value = f.value.as_ref()?;
            let data = match value {
                FieldValue::Localized(values) => config
                    .languages()
                    .into_iter()
                    .map(|(catalog, source)| MetaData {
                        language: catalog.to_lowercase(),
                        value: values.get(&source).cloned().unwrap_or_default(),
                    })
                    .collect(),
                other => vec![MetaData {
                    language: config.default_language.to_lowercase(),
                    value: other.as_text(&config.default_language),
                }],
            };
            Some(MetaField {
                name: f.name.clone(),
                data,
            })
        })
        .collect()
}

fn simple_meta_field(name: &str, value: &str, config: &Config) -> MetaField {
    MetaField {
        name: name.to_string(),
        data: vec![MetaData {
            language: config.default_language.to_lowercase(),
            value: value.to_string(),
        }],
    }
}

pub fn catalog_element(channel: &Entity, config: &Config) -> CatalogElement {
    CatalogElement {
        code: config.code(channel.id),
        name: entity_name(channel, config),
        default_language: config.default_language.to_lowercase(),
        default_currency: config.default_currency.clone(),
        languages: config
            .languages()
            .into_iter()
            .map(|(catalog, _)| catalog.to_lowercase())
            .collect(),
    }
}

/// Node element; `parent` is `None` for nodes directly under the channel
pub fn node_element(
    node: &Entity,
    parent: Option<EntityId>,
    sort_order: i32,
    config: &Config,
) -> NodeElement {
    NodeElement {
        code: config.code(node.id),
        name: entity_name(node, config),
        parent_code: parent.map(|id| config.code(id)),
        sort_order,
        meta_class: meta_class(node),
        meta_fields: meta_fields(node, config),
    }
}

pub fn entry_element(entity: &Entity, channel: EntityId, config: &Config) -> EntryElement {
    EntryElement {
        code: config.code(entity.id),
        name: entity_name(entity, config),
        entry_type: config.entry_type(&entity.kind).to_string(),
        guid: entry_guid(channel, entity.id),
        meta_class: meta_class(entity),
        meta_fields: meta_fields(entity, config),
    }
}

/// One variation entry per SKU of an item
pub fn sku_entries(item: &Entity, channel: EntityId, config: &Config) -> Vec<EntryElement> {
    let base = entry_element(item, channel, config);
    item_skus(item, config)
        .into_iter()
        .map(|sku| {
            let mut entry = base.clone();
            entry.name = sku.name.clone().unwrap_or_else(|| sku.id.clone());
            entry.code = config.code(&sku.id);
            entry.entry_type = "Variation".to_string();
            entry.meta_fields.extend(
                sku.data
                    .iter()
                    .map(|(name, value)| simple_meta_field(name, value, config)),
            );
            entry
        })
        .collect()
}

pub fn node_entry_relation(node: EntityId, entry_code: String, sort_order: i32, config: &Config) -> Relation {
    Relation::NodeEntry {
        node_code: config.code(node),
        entry_code,
        sort_order,
    }
}

pub fn node_relation(parent: EntityId, child: EntityId, sort_order: i32, config: &Config) -> Relation {
    Relation::NodeRelation {
        parent_node_code: config.code(parent),
        child_node_code: config.code(child),
        sort_order,
    }
}

/// Entry relation; the relation type follows the parent's entry type
pub fn entry_relation(
    parent_code: String,
    parent_kind: &EntityKind,
    child_code: String,
    sort_order: i32,
    config: &Config,
) -> Relation {
    let relation_type = match config.entry_type(parent_kind) {
        "Package" | "DynamicPackage" => EntryRelationType::PackageEntry,
        "Bundle" => EntryRelationType::BundleEntry,
        _ => EntryRelationType::ProductVariation,
    };
    Relation::EntryRelation {
        parent_entry_code: parent_code,
        child_entry_code: child_code,
        relation_type,
        sort_order,
    }
}

/// Association from a structure row; the link entity, when present, names it
pub fn association(
    row: &StructureEntity,
    link_entity: Option<&Entity>,
    config: &Config,
) -> Option<AssociationElement> {
    let parent = row.parent_id?;
    let link_type = row.link_type.clone().unwrap_or_default();
    let name = link_entity
        .map(|e| entity_name(e, config))
        .unwrap_or_else(|| link_type.clone())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join("");
    let description = match row.link_entity_id {
        Some(id) => config.code(id),
        None => link_type.clone(),
    };
    Some(AssociationElement {
        name,
        description,
        entry_code: config.code(parent),
        associated_entry_code: config.code(row.entity_id),
        association_type: link_type,
        sort_order: row.sort_order,
    })
}

pub fn resource_element(
    resource: Option<&Entity>,
    code: String,
    action: ResourceAction,
    parent_codes: Vec<String>,
    config: &Config,
) -> ResourceElement {
    ResourceElement {
        code,
        action,
        parent_codes,
        meta_fields: resource.map(|r| meta_fields(r, config)).unwrap_or_default(),
    }
}

/// Lineage of a position: every ancestor row on its path, root first
pub fn lineage(path_rows: &[StructureEntity], config: &Config) -> Vec<LineageElement> {
    path_rows
        .iter()
        .map(|row| LineageElement {
            kind: row.kind.to_string(),
            code: config.code(row.entity_id),
        })
        .collect()
}
