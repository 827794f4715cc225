//! Source system boundary: entity data and channel structure services

use thiserror::Error;

use crate::core::entity::{Entity, Field, Link, StructureEntity};
use crate::core::identity::{EntityId, EntityKind, LoadLevel};
use crate::core::links::LinkTypeDef;

/// Errors reported by the source system
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("Entity {0} not found")]
    NotFound(EntityId),

    #[error("Field '{field}' not found on entity {entity_id}")]
    FieldNotFound { entity_id: EntityId, field: String },

    #[error("Source system unavailable: {0}")]
    Unavailable(String),

    #[error("Malformed source data: {0}")]
    Malformed(String),
}

impl SourceError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, SourceError::NotFound(_) | SourceError::FieldNotFound { .. })
    }
}

/// Entity data access
pub trait DataService {
    /// Fetch an entity at the given load level
    fn entity(&self, id: EntityId, level: LoadLevel) -> Result<Entity, SourceError>;

    /// Links carrying the given link entity
    fn links_for_link_entity(&self, link_entity_id: EntityId) -> Result<Vec<Link>, SourceError>;

    /// Inbound links of an entity without loading its data
    fn inbound_links(&self, id: EntityId) -> Result<Vec<Link>, SourceError>;

    /// Current value of a single field
    fn field(&self, id: EntityId, field: &str) -> Result<Field, SourceError>;

    /// Every stored revision of a field, oldest first
    fn field_history(&self, id: EntityId, field: &str) -> Result<Vec<Field>, SourceError>;

    /// Link types defined in the source model
    fn link_types(&self) -> Result<Vec<LinkTypeDef>, SourceError>;
}

/// Channel structure access
pub trait ChannelService {
    fn structure_for_type(
        &self,
        channel: EntityId,
        kind: &EntityKind,
    ) -> Result<Vec<StructureEntity>, SourceError>;

    fn structure_for_entity(
        &self,
        channel: EntityId,
        entity: EntityId,
    ) -> Result<Vec<StructureEntity>, SourceError>;

    fn structure_for_entity_with_parent(
        &self,
        channel: EntityId,
        entity: EntityId,
        parent: EntityId,
    ) -> Result<Vec<StructureEntity>, SourceError>;

    /// Rows whose path equals `path`
    fn structure_from_path(
        &self,
        channel: EntityId,
        path: &str,
    ) -> Result<Vec<StructureEntity>, SourceError>;

    /// Rows strictly below `path`
    fn children_from_path(
        &self,
        channel: EntityId,
        path: &str,
    ) -> Result<Vec<StructureEntity>, SourceError>;

    /// Rows of `kind` found along `path` (the path's own ancestors)
    fn structure_for_type_in_path(
        &self,
        channel: EntityId,
        path: &str,
        kind: &EntityKind,
    ) -> Result<Vec<StructureEntity>, SourceError>;

    fn entity_exists_in_channel(
        &self,
        channel: EntityId,
        entity: EntityId,
    ) -> Result<bool, SourceError>;
}
