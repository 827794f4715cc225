//! In-memory source system built from a channel snapshot
//!
//! A snapshot describes the entities, links and field history of one
//! channel. `SnapshotSource` serves it through the [`DataService`] and
//! [`ChannelService`] traits and computes the channel structure by walking
//! links from the channel root. It is mutable so that a change can be
//! applied before the event describing it is replayed.

use serde::{Deserialize, Serialize};
use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::core::entity::{Entity, Field, FieldValue, Link, LinkEnd, StructureEntity};
use crate::core::identity::{EntityId, EntityKind, LoadLevel};
use crate::core::links::LinkTypeDef;
use crate::core::source::{ChannelService, DataService, SourceError};
use crate::yaml::diagnostics::{parse_yaml_file, YamlError};

/// Entity as stored in a snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityRecord {
    pub id: EntityId,
    pub kind: EntityKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field_set: Option<String>,

    #[serde(default)]
    pub is_link_entity: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<Field>,
}

/// Link as stored in a snapshot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkRecord {
    #[serde(rename = "type")]
    pub link_type: String,
    pub source: EntityId,
    pub target: EntityId,

    #[serde(default)]
    pub sort_order: i32,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_entity: Option<EntityId>,
}

/// Earlier revisions of one field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryRecord {
    pub entity: EntityId,
    pub field: String,
    pub revisions: Vec<Field>,
}

/// Serialized form of a channel snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub channel: EntityId,

    #[serde(default)]
    pub link_types: Vec<LinkTypeDef>,

    #[serde(default)]
    pub entities: Vec<EntityRecord>,

    #[serde(default)]
    pub links: Vec<LinkRecord>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub field_history: Vec<HistoryRecord>,
}

/// Source system serving a snapshot
#[derive(Debug)]
pub struct SnapshotSource {
    channel: EntityId,
    link_types: Vec<LinkTypeDef>,
    entities: BTreeMap<EntityId, EntityRecord>,
    links: Vec<LinkRecord>,
    history: HashMap<(EntityId, String), Vec<Field>>,
    fetches: RefCell<HashMap<EntityId, usize>>,
    structure_queries: Cell<usize>,
}

impl SnapshotSource {
    /// Empty source holding only the channel entity
    pub fn new(channel: EntityId) -> Self {
        let mut entities = BTreeMap::new();
        entities.insert(
            channel,
            EntityRecord {
                id: channel,
                kind: EntityKind::Channel,
                field_set: None,
                is_link_entity: false,
                fields: Vec::new(),
            },
        );
        Self {
            channel,
            link_types: Vec::new(),
            entities,
            links: Vec::new(),
            history: HashMap::new(),
            fetches: RefCell::new(HashMap::new()),
            structure_queries: Cell::new(0),
        }
    }

    /// Build from a deserialized snapshot, checking link ends
    pub fn from_snapshot(snapshot: Snapshot) -> Result<Self, SourceError> {
        let mut source = Self::new(snapshot.channel);
        source.link_types = snapshot.link_types;
        for record in snapshot.entities {
            source.entities.insert(record.id, record);
        }
        for link in &snapshot.links {
            for end in [link.source, link.target] {
                if !source.entities.contains_key(&end) {
                    return Err(SourceError::Malformed(format!(
                        "link '{}' {} -> {} references unknown entity {}",
                        link.link_type, link.source, link.target, end
                    )));
                }
            }
        }
        source.links = snapshot.links;
        for record in snapshot.field_history {
            source
                .history
                .insert((record.entity, record.field), record.revisions);
        }
        Ok(source)
    }

    /// Load a YAML snapshot file
    pub fn from_yaml_file(path: &Path) -> Result<Self, YamlError> {
        let snapshot: Snapshot = parse_yaml_file(path)?;
        Self::from_snapshot(snapshot).map_err(|e| YamlError::Invalid {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    pub fn channel(&self) -> EntityId {
        self.channel
    }

    // Builder helpers

    pub fn with_link_type(mut self, def: LinkTypeDef) -> Self {
        self.link_types.push(def);
        self
    }

    pub fn with_entity(mut self, id: u32, kind: EntityKind) -> Self {
        self.insert_entity(EntityId::new(id), kind);
        self
    }

    pub fn with_field(mut self, id: u32, name: &str, value: &str) -> Self {
        if let Some(record) = self.entities.get_mut(&EntityId::new(id)) {
            record
                .fields
                .push(Field::new(name, FieldValue::Text(value.to_string())));
        }
        self
    }

    pub fn with_link(mut self, link_type: &str, source: u32, target: u32) -> Self {
        let sort_order = self.links.len() as i32;
        self.links.push(LinkRecord {
            link_type: link_type.to_string(),
            source: EntityId::new(source),
            target: EntityId::new(target),
            sort_order,
            link_entity: None,
        });
        self
    }

    pub fn with_link_entity(mut self, link_type: &str, source: u32, target: u32, link_entity: u32) -> Self {
        self = self.with_link(link_type, source, target);
        if let Some(last) = self.links.last_mut() {
            last.link_entity = Some(EntityId::new(link_entity));
        }
        self
    }

    // Mutators, applied to simulate a change before replaying its event

    pub fn insert_entity(&mut self, id: EntityId, kind: EntityKind) {
        self.entities.insert(
            id,
            EntityRecord {
                id,
                kind,
                field_set: None,
                is_link_entity: false,
                fields: Vec::new(),
            },
        );
    }

    pub fn mark_link_entity(&mut self, id: EntityId) {
        if let Some(record) = self.entities.get_mut(&id) {
            record.is_link_entity = true;
        }
    }

    pub fn add_link(&mut self, link: LinkRecord) {
        self.links.push(link);
    }

    /// Remove links of `link_type` from `source` to `target`; returns how many were removed
    pub fn remove_link(&mut self, source: EntityId, target: EntityId, link_type: &str) -> usize {
        let before = self.links.len();
        self.links
            .retain(|l| !(l.source == source && l.target == target && l.link_type == link_type));
        before - self.links.len()
    }

    /// Remove an entity together with every link touching it
    pub fn remove_entity(&mut self, id: EntityId) -> Option<EntityRecord> {
        self.links.retain(|l| l.source != id && l.target != id);
        self.entities.remove(&id)
    }

    /// Set a field value, keeping the previous value in the field history
    pub fn set_field(&mut self, id: EntityId, name: &str, value: FieldValue) -> Result<(), SourceError> {
        let record = self.entities.get_mut(&id).ok_or(SourceError::NotFound(id))?;
        match record.fields.iter_mut().find(|f| f.name == name) {
            Some(field) => {
                self.history
                    .entry((id, name.to_string()))
                    .or_default()
                    .push(field.clone());
                field.revision += 1;
                field.value = Some(value);
            }
            None => record.fields.push(Field::new(name, value)),
        }
        Ok(())
    }

    // Instrumentation

    /// Number of entity fetches served for `id`
    pub fn fetch_count(&self, id: EntityId) -> usize {
        self.fetches.borrow().get(&id).copied().unwrap_or(0)
    }

    /// Number of structure queries served
    pub fn structure_query_count(&self) -> usize {
        self.structure_queries.get()
    }

    /// Every structure row of the channel, in walk order
    pub fn structure(&self) -> Vec<StructureEntity> {
        self.structure_queries.set(self.structure_queries.get() + 1);
        let mut rows = Vec::new();
        let root = StructureEntity {
            entity_id: self.channel,
            parent_id: None,
            path: self.channel.to_string(),
            kind: EntityKind::Channel,
            link_type: None,
            link_entity_id: None,
            sort_order: 0,
        };
        let mut on_path = vec![self.channel];
        rows.push(root.clone());
        self.walk(&root, &mut on_path, &mut rows);
        rows
    }

    fn walk(&self, row: &StructureEntity, on_path: &mut Vec<EntityId>, rows: &mut Vec<StructureEntity>) {
        for link in self.sorted_links(|l| l.source == row.entity_id) {
            // A link back into the current path would make the path infinite
            if on_path.contains(&link.target) {
                continue;
            }
            let Some(target) = self.entities.get(&link.target) else {
                continue;
            };
            if target.is_link_entity {
                continue;
            }
            let child = StructureEntity {
                entity_id: link.target,
                parent_id: Some(row.entity_id),
                path: format!("{}/{}", row.path, link.target),
                kind: target.kind.clone(),
                link_type: Some(link.link_type.clone()),
                link_entity_id: link.link_entity,
                sort_order: link.sort_order,
            };
            rows.push(child.clone());
            on_path.push(link.target);
            self.walk(&child, on_path, rows);
            on_path.pop();
        }
    }

    fn sorted_links<F>(&self, filter: F) -> Vec<&LinkRecord>
    where
        F: Fn(&LinkRecord) -> bool,
    {
        let mut links: Vec<&LinkRecord> = self.links.iter().filter(|l| filter(l)).collect();
        links.sort_by_key(|l| l.sort_order);
        links
    }

    fn to_link(&self, record: &LinkRecord) -> Option<Link> {
        let source = self.entities.get(&record.source)?;
        let target = self.entities.get(&record.target)?;
        Some(Link {
            link_type: record.link_type.clone(),
            source: LinkEnd {
                id: source.id,
                kind: source.kind.clone(),
            },
            target: LinkEnd {
                id: target.id,
                kind: target.kind.clone(),
            },
            sort_order: record.sort_order,
            link_entity: record.link_entity,
        })
    }

    fn check_channel(&self, channel: EntityId) -> Result<(), SourceError> {
        if channel == self.channel {
            Ok(())
        } else {
            Err(SourceError::NotFound(channel))
        }
    }
}

impl DataService for SnapshotSource {
    fn entity(&self, id: EntityId, level: LoadLevel) -> Result<Entity, SourceError> {
        *self.fetches.borrow_mut().entry(id).or_insert(0) += 1;
        let record = self.entities.get(&id).ok_or(SourceError::NotFound(id))?;

        let mut entity = Entity::new(id, record.kind.clone());
        entity.field_set = record.field_set.clone();
        entity.is_link_entity = record.is_link_entity;
        entity.fields = record.fields.clone();
        entity.outbound = self
            .sorted_links(|l| l.source == id)
            .into_iter()
            .filter_map(|l| self.to_link(l))
            .collect();
        entity.inbound = self
            .sorted_links(|l| l.target == id)
            .into_iter()
            .filter_map(|l| self.to_link(l))
            .collect();
        Ok(entity.at_level(level))
    }

    fn links_for_link_entity(&self, link_entity_id: EntityId) -> Result<Vec<Link>, SourceError> {
        Ok(self
            .sorted_links(|l| l.link_entity == Some(link_entity_id))
            .into_iter()
            .filter_map(|l| self.to_link(l))
            .collect())
    }

    fn inbound_links(&self, id: EntityId) -> Result<Vec<Link>, SourceError> {
        if !self.entities.contains_key(&id) {
            return Err(SourceError::NotFound(id));
        }
        Ok(self
            .sorted_links(|l| l.target == id)
            .into_iter()
            .filter_map(|l| self.to_link(l))
            .collect())
    }

    fn field(&self, id: EntityId, field: &str) -> Result<Field, SourceError> {
        let record = self.entities.get(&id).ok_or(SourceError::NotFound(id))?;
        record
            .fields
            .iter()
            .find(|f| f.name == field)
            .cloned()
            .ok_or_else(|| SourceError::FieldNotFound {
                entity_id: id,
                field: field.to_string(),
            })
    }

    fn field_history(&self, id: EntityId, field: &str) -> Result<Vec<Field>, SourceError> {
        let mut revisions = self
            .history
            .get(&(id, field.to_string()))
            .cloned()
            .unwrap_or_default();
        if let Ok(current) = self.field(id, field) {
            revisions.push(current);
        }
        revisions.sort_by_key(|f| f.revision);
        Ok(revisions)
    }

    fn link_types(&self) -> Result<Vec<LinkTypeDef>, SourceError> {
        Ok(self.link_types.clone())
    }
}

impl ChannelService for SnapshotSource {
    fn structure_for_type(
        &self,
        channel: EntityId,
        kind: &EntityKind,
    ) -> Result<Vec<StructureEntity>, SourceError> {
        self.check_channel(channel)?;
        Ok(self
            .structure()
            .into_iter()
            .filter(|row| &row.kind == kind)
            .collect())
    }

    fn structure_for_entity(
        &self,
        channel: EntityId,
        entity: EntityId,
    ) -> Result<Vec<StructureEntity>, SourceError> {
        self.check_channel(channel)?;
        Ok(self
            .structure()
            .into_iter()
            .filter(|row| row.entity_id == entity)
            .collect())
    }

    fn structure_for_entity_with_parent(
        &self,
        channel: EntityId,
        entity: EntityId,
        parent: EntityId,
    ) -> Result<Vec<StructureEntity>, SourceError> {
        self.check_channel(channel)?;
        Ok(self
            .structure()
            .into_iter()
            .filter(|row| row.entity_id == entity && row.parent_id == Some(parent))
            .collect())
    }

    fn structure_from_path(
        &self,
        channel: EntityId,
        path: &str,
    ) -> Result<Vec<StructureEntity>, SourceError> {
        self.check_channel(channel)?;
        Ok(self
            .structure()
            .into_iter()
            .filter(|row| row.path == path)
            .collect())
    }

    fn children_from_path(
        &self,
        channel: EntityId,
        path: &str,
    ) -> Result<Vec<StructureEntity>, SourceError> {
        self.check_channel(channel)?;
        Ok(self
            .structure()
            .into_iter()
            .filter(|row| row.is_below(path))
            .collect())
    }

    fn structure_for_type_in_path(
        &self,
        channel: EntityId,
        path: &str,
        kind: &EntityKind,
    ) -> Result<Vec<StructureEntity>, SourceError> {
        self.check_channel(channel)?;
        Ok(self
            .structure()
            .into_iter()
            .filter(|row| &row.kind == kind)
            .filter(|row| row.path == path || path.starts_with(&format!("{}/", row.path)))
            .collect())
    }

    fn entity_exists_in_channel(
        &self,
        channel: EntityId,
        entity: EntityId,
    ) -> Result<bool, SourceError> {
        self.check_channel(channel)?;
        Ok(self.structure().iter().any(|row| row.entity_id == entity))
    }
}
