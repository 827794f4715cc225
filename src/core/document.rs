//! Documents sent to the target catalog
//!
//! Three document shapes exist: a catalog document (nodes, entries,
//! relations and associations to create or update), a resource document
//! (media references to add, update, delete or unlink) and an action
//! document (a batch of deletions or relation corrections, prefixed by
//! the lineage of the element it applies to).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Document variants accepted by the transport
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "document", rename_all = "snake_case")]
pub enum Document {
    Catalog(CatalogDocument),
    Resources(ResourceDocument),
    Action(ActionDocument),
}

/// Short classification used for file names and summaries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    Catalog,
    Resources,
    Deleted,
    Updated,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Catalog => "catalog",
            DocumentKind::Resources => "resources",
            DocumentKind::Deleted => "deleted",
            DocumentKind::Updated => "updated",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Document {
    pub fn kind(&self) -> DocumentKind {
        match self {
            Document::Catalog(_) => DocumentKind::Catalog,
            Document::Resources(_) => DocumentKind::Resources,
            Document::Action(doc) => match doc.action {
                Action::Deleted => DocumentKind::Deleted,
                Action::Updated => DocumentKind::Updated,
            },
        }
    }

    /// Number of top-level elements or mutations carried
    pub fn element_count(&self) -> usize {
        match self {
            Document::Catalog(doc) => {
                doc.nodes.len() + doc.entries.len() + doc.relations.len() + doc.associations.len()
            }
            Document::Resources(doc) => doc.resources.len(),
            Document::Action(doc) => doc.mutations.len(),
        }
    }

    pub fn summary(&self) -> String {
        match self {
            Document::Catalog(doc) => format!(
                "{} nodes, {} entries, {} relations, {} associations",
                doc.nodes.len(),
                doc.entries.len(),
                doc.relations.len(),
                doc.associations.len()
            ),
            Document::Resources(doc) => {
                let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
                for res in &doc.resources {
                    *counts.entry(res.action.as_str()).or_insert(0) += 1;
                }
                counts
                    .iter()
                    .map(|(action, n)| format!("{} {}", n, action))
                    .collect::<Vec<_>>()
                    .join(", ")
            }
            Document::Action(doc) => format!("{} mutations", doc.mutations.len()),
        }
    }

    pub fn as_catalog(&self) -> Option<&CatalogDocument> {
        match self {
            Document::Catalog(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_resources(&self) -> Option<&ResourceDocument> {
        match self {
            Document::Resources(doc) => Some(doc),
            _ => None,
        }
    }

    pub fn as_action(&self) -> Option<&ActionDocument> {
        match self {
            Document::Action(doc) => Some(doc),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------
// Catalog documents
// ---------------------------------------------------------------------

/// A localized value of a meta field
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaData {
    pub language: String,
    pub value: String,
}

/// A field as sent to the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MetaField {
    pub name: String,
    pub data: Vec<MetaData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogElement {
    pub code: String,
    pub name: String,
    pub default_language: String,
    pub default_currency: String,
    pub languages: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeElement {
    pub code: String,
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_code: Option<String>,

    pub sort_order: i32,
    pub meta_class: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta_fields: Vec<MetaField>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryElement {
    pub code: String,
    pub name: String,
    pub entry_type: String,
    pub guid: String,
    pub meta_class: String,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta_fields: Vec<MetaField>,
}

/// Relation between catalog elements
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "relation", rename_all = "snake_case")]
pub enum Relation {
    /// An entry placed under a node
    NodeEntry {
        node_code: String,
        entry_code: String,
        sort_order: i32,
    },
    /// A node placed under a second parent node
    NodeRelation {
        parent_node_code: String,
        child_node_code: String,
        sort_order: i32,
    },
    /// Parent/child between entries
    EntryRelation {
        parent_entry_code: String,
        child_entry_code: String,
        relation_type: EntryRelationType,
        sort_order: i32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EntryRelationType {
    ProductVariation,
    PackageEntry,
    BundleEntry,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssociationElement {
    pub name: String,
    pub description: String,
    pub entry_code: String,
    pub associated_entry_code: String,
    pub association_type: String,
    pub sort_order: i32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogDocument {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<CatalogElement>,

    #[serde(default)]
    pub nodes: Vec<NodeElement>,

    #[serde(default)]
    pub entries: Vec<EntryElement>,

    #[serde(default)]
    pub relations: Vec<Relation>,

    #[serde(default)]
    pub associations: Vec<AssociationElement>,
}

impl CatalogDocument {
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
            && self.entries.is_empty()
            && self.relations.is_empty()
            && self.associations.is_empty()
    }

    pub fn entry(&self, code: &str) -> Option<&EntryElement> {
        self.entries.iter().find(|e| e.code == code)
    }

    pub fn node(&self, code: &str) -> Option<&NodeElement> {
        self.nodes.iter().find(|n| n.code == code)
    }

    pub fn entry_codes(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.code.as_str()).collect()
    }
}

// ---------------------------------------------------------------------
// Resource documents
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceAction {
    Added,
    Updated,
    Deleted,
    Unlinked,
}

impl ResourceAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceAction::Added => "added",
            ResourceAction::Updated => "updated",
            ResourceAction::Deleted => "deleted",
            ResourceAction::Unlinked => "unlinked",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceElement {
    pub code: String,
    pub action: ResourceAction,

    /// Entry or node codes the resource is attached to (for unlink, the one it leaves)
    #[serde(default)]
    pub parent_codes: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub meta_fields: Vec<MetaField>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceDocument {
    pub resources: Vec<ResourceElement>,
}

impl ResourceDocument {
    pub fn codes_with(&self, action: ResourceAction) -> Vec<&str> {
        self.resources
            .iter()
            .filter(|r| r.action == action)
            .map(|r| r.code.as_str())
            .collect()
    }
}

// ---------------------------------------------------------------------
// Action documents
// ---------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Deleted,
    Updated,
}

/// An ancestor of the element an action document applies to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineageElement {
    pub kind: String,
    pub code: String,
}

/// Corrected relation of an entry to one parent after a link removal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntryRelationUpdate {
    pub entry_code: String,
    pub parent_code: String,
    pub link_type: String,
    pub is_relation: bool,

    /// Whether the entry is still a child of this parent
    pub parent_exists_in_channel_nodes: bool,

    /// Node code to whether the entry still belongs under that node
    pub membership: BTreeMap<String, bool>,

    /// Association descriptions to remove; empty means all
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub link_entity_ids_to_remove: Vec<String>,
}

/// A single change carried by an action document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Mutation {
    DeleteCatalog { code: String },
    DeleteNode { code: String },
    DeleteEntry { code: String },
    UpdateRelations(EntryRelationUpdate),
    UpdateLinkEntity {
        link_entity_code: String,
        source_code: String,
        meta_fields: Vec<MetaField>,
    },
}

impl Mutation {
    /// Code of the catalog element the mutation targets
    pub fn code(&self) -> &str {
        match self {
            Mutation::DeleteCatalog { code }
            | Mutation::DeleteNode { code }
            | Mutation::DeleteEntry { code } => code,
            Mutation::UpdateRelations(update) => &update.entry_code,
            Mutation::UpdateLinkEntity { link_entity_code, .. } => link_entity_code,
        }
    }

    pub fn is_delete(&self) -> bool {
        matches!(
            self,
            Mutation::DeleteCatalog { .. } | Mutation::DeleteNode { .. } | Mutation::DeleteEntry { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionDocument {
    pub action: Action,

    #[serde(default)]
    pub lineage: Vec<LineageElement>,

    pub mutations: Vec<Mutation>,
}

impl ActionDocument {
    pub fn new(action: Action, lineage: Vec<LineageElement>) -> Self {
        Self {
            action,
            lineage,
            mutations: Vec::new(),
        }
    }

    /// Add a mutation unless an identical one is already present
    pub fn push(&mut self, mutation: Mutation) {
        if !self.mutations.contains(&mutation) {
            self.mutations.push(mutation);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }

    pub fn deleted_codes(&self) -> Vec<&str> {
        self.mutations
            .iter()
            .filter(|m| m.is_delete())
            .map(Mutation::code)
            .collect()
    }

    pub fn relation_updates(&self) -> impl Iterator<Item = &EntryRelationUpdate> {
        self.mutations.iter().filter_map(|m| match m {
            Mutation::UpdateRelations(update) => Some(update),
            _ => None,
        })
    }
}
