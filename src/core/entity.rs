//! Source entities, links and materialized hierarchy positions

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::core::identity::{EntityId, EntityKind, LoadLevel};

/// Value held by a field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Boolean(bool),
    Number(f64),
    Text(String),
    /// Locale-aware data keyed by source language
    Localized(BTreeMap<String, String>),
    /// Selected keys of a list-valued field
    Keys(Vec<String>),
}

impl FieldValue {
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.trim().is_empty(),
            FieldValue::Localized(map) => map.values().all(|v| v.trim().is_empty()),
            FieldValue::Keys(keys) => keys.is_empty(),
            FieldValue::Boolean(_) | FieldValue::Number(_) => false,
        }
    }

    /// Flat text rendering, picking `language` for localized data
    pub fn as_text(&self, language: &str) -> String {
        match self {
            FieldValue::Boolean(b) => b.to_string(),
            FieldValue::Number(n) => n.to_string(),
            FieldValue::Text(s) => s.clone(),
            FieldValue::Localized(map) => map.get(language).cloned().unwrap_or_default(),
            FieldValue::Keys(keys) => keys.join(";"),
        }
    }
}

/// A named field on an entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub name: String,

    #[serde(default)]
    pub revision: u32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<FieldValue>,
}

impl Field {
    pub fn new(name: impl Into<String>, value: FieldValue) -> Self {
        Self {
            name: name.into(),
            revision: 1,
            value: Some(value),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.value.as_ref().map_or(true, FieldValue::is_empty)
    }

    /// Raw string data (plain text fields only)
    pub fn text(&self) -> Option<&str> {
        match &self.value {
            Some(FieldValue::Text(s)) => Some(s),
            _ => None,
        }
    }
}

/// One end of a link
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkEnd {
    pub id: EntityId,
    pub kind: EntityKind,
}

/// A directed, typed relation between two entities
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub link_type: String,
    pub source: LinkEnd,
    pub target: LinkEnd,

    #[serde(default)]
    pub sort_order: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_entity: Option<EntityId>,
}

/// A read-only snapshot of a source entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub id: EntityId,
    pub kind: EntityKind,

    #[serde(default = "default_load_level")]
    pub load_level: LoadLevel,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_set: Option<String>,

    /// Whether this entity carries metadata for a link (e.g. a named association)
    #[serde(default)]
    pub is_link_entity: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_modified: Option<DateTime<Utc>>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub outbound: Vec<Link>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub inbound: Vec<Link>,
}

fn default_load_level() -> LoadLevel {
    LoadLevel::DataAndLinks
}

impl Entity {
    pub fn new(id: EntityId, kind: EntityKind) -> Self {
        Self {
            id,
            kind,
            load_level: LoadLevel::DataAndLinks,
            field_set: None,
            is_link_entity: false,
            last_modified: None,
            fields: Vec::new(),
            outbound: Vec::new(),
            inbound: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Outbound links whose target is of the given kind
    pub fn outbound_to<'a>(&'a self, kind: &'a EntityKind) -> impl Iterator<Item = &'a Link> + 'a {
        self.outbound.iter().filter(move |l| &l.target.kind == kind)
    }

    /// A copy reduced to what the given load level would have fetched
    pub fn at_level(&self, level: LoadLevel) -> Entity {
        let mut copy = self.clone();
        copy.load_level = level;
        if level < LoadLevel::DataAndLinks {
            copy.outbound.clear();
            copy.inbound.clear();
        }
        if level < LoadLevel::DataOnly {
            copy.fields.clear();
            copy.field_set = None;
        }
        copy
    }
}

/// A materialized position of an entity in the channel hierarchy
///
/// `path` lists ancestor ids separated by `/`, channel root first, and
/// ends with the entity's own id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StructureEntity {
    pub entity_id: EntityId,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EntityId>,

    pub path: String,
    pub kind: EntityKind,

    /// Type of the link from the parent (none for the channel root)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_type: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_entity_id: Option<EntityId>,

    #[serde(default)]
    pub sort_order: i32,
}

/// A structure path that does not follow the `root/.../self` shape
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Malformed structure path '{path}' for entity {entity_id}")]
pub struct PathError {
    pub entity_id: EntityId,
    pub path: String,
}

impl StructureEntity {
    /// Ids along the path, channel root first
    pub fn path_ids(&self) -> Result<Vec<EntityId>, PathError> {
        let ids = parse_path(&self.path).ok_or_else(|| self.path_error())?;
        if ids.last() != Some(&self.entity_id) {
            return Err(self.path_error());
        }
        Ok(ids)
    }

    /// Whether this position sits strictly below `path`
    pub fn is_below(&self, path: &str) -> bool {
        self.path.len() > path.len() + 1
            && self.path.starts_with(path)
            && self.path.as_bytes()[path.len()] == b'/'
    }

    fn path_error(&self) -> PathError {
        PathError {
            entity_id: self.entity_id,
            path: self.path.clone(),
        }
    }
}

/// Parse a `/`-separated path of entity ids
pub fn parse_path(path: &str) -> Option<Vec<EntityId>> {
    if path.is_empty() {
        return None;
    }
    path.split('/').map(|seg| seg.parse::<EntityId>().ok()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(id: u32, parent: Option<u32>, path: &str) -> StructureEntity {
        StructureEntity {
            entity_id: EntityId::new(id),
            parent_id: parent.map(EntityId::new),
            path: path.to_string(),
            kind: EntityKind::Product,
            link_type: None,
            link_entity_id: None,
            sort_order: 0,
        }
    }

    #[test]
    fn test_path_ids_well_formed() {
        let r = row(30, Some(20), "1/20/30");
        assert_eq!(
            r.path_ids().unwrap(),
            vec![EntityId::new(1), EntityId::new(20), EntityId::new(30)]
        );
    }

    #[test]
    fn test_path_ids_rejects_wrong_tail() {
        let r = row(31, Some(20), "1/20/30");
        assert!(r.path_ids().is_err());
    }

    #[test]
    fn test_path_ids_rejects_garbage() {
        assert!(row(5, None, "1//5").path_ids().is_err());
        assert!(row(5, None, "").path_ids().is_err());
        assert!(row(5, None, "1/x/5").path_ids().is_err());
    }

    #[test]
    fn test_is_below_respects_segment_boundaries() {
        let r = row(30, Some(20), "1/20/30");
        assert!(r.is_below("1/20"));
        assert!(r.is_below("1"));
        assert!(!r.is_below("1/2"));
        assert!(!r.is_below("1/20/30"));
    }

    #[test]
    fn test_at_level_strips_links_and_fields() {
        let mut e = Entity::new(EntityId::new(3), EntityKind::Item);
        e.fields.push(Field::new("ItemName", FieldValue::Text("Shoe".into())));
        e.outbound.push(Link {
            link_type: "ItemResource".into(),
            source: LinkEnd { id: e.id, kind: EntityKind::Item },
            target: LinkEnd { id: EntityId::new(9), kind: EntityKind::Resource },
            sort_order: 0,
            link_entity: None,
        });

        let data = e.at_level(LoadLevel::DataOnly);
        assert!(data.outbound.is_empty());
        assert_eq!(data.fields.len(), 1);

        let shallow = e.at_level(LoadLevel::Shallow);
        assert!(shallow.fields.is_empty());
        assert_eq!(shallow.load_level, LoadLevel::Shallow);
    }

    #[test]
    fn test_field_value_emptiness() {
        assert!(FieldValue::Text("  ".into()).is_empty());
        assert!(!FieldValue::Number(0.0).is_empty());
        let mut map = BTreeMap::new();
        map.insert("en".to_string(), String::new());
        assert!(FieldValue::Localized(map).is_empty());
    }
}
