//! Structure Cache: per-operation memo of entities and channel structure
//!
//! The cache lives inside one [`OperationContext`](super::OperationContext)
//! and is flushed when the context opens and closes. It never outlives the
//! operation.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use tracing::debug;

use crate::core::config::Config;
use crate::core::entity::{Entity, StructureEntity};
use crate::core::identity::{EntityId, EntityKind, LoadLevel};
use crate::core::links::LinkTypeRegistry;
use crate::core::source::{ChannelService, DataService, SourceError};

/// Hit and fetch counters of a cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entity_hits: usize,
    pub entity_fetches: usize,
    pub structure_fetches: usize,
}

pub struct StructureCache<'a> {
    data: &'a dyn DataService,
    channels: &'a dyn ChannelService,
    config: &'a Config,
    links: LinkTypeRegistry,
    channel: EntityId,

    entities: HashMap<EntityId, Rc<Entity>>,
    structure: BTreeMap<Vec<EntityKind>, Vec<StructureEntity>>,
    resources: Option<Vec<StructureEntity>>,
    channel_nodes: Option<Vec<StructureEntity>>,
    parents: HashMap<EntityId, Option<Rc<Entity>>>,
    node_paths: HashMap<String, Vec<StructureEntity>>,
    stats: CacheStats,
}

impl<'a> StructureCache<'a> {
    /// Create an empty cache for one channel
    pub fn new(
        data: &'a dyn DataService,
        channels: &'a dyn ChannelService,
        config: &'a Config,
        channel: EntityId,
    ) -> Result<Self, SourceError> {
        let links = LinkTypeRegistry::new(&data.link_types()?, &config.link_types);
        Ok(Self {
            data,
            channels,
            config,
            links,
            channel,
            entities: HashMap::new(),
            structure: BTreeMap::new(),
            resources: None,
            channel_nodes: None,
            parents: HashMap::new(),
            node_paths: HashMap::new(),
            stats: CacheStats::default(),
        })
    }

    pub fn channel_id(&self) -> EntityId {
        self.channel
    }

    pub fn config(&self) -> &'a Config {
        self.config
    }

    pub fn links(&self) -> &LinkTypeRegistry {
        &self.links
    }

    pub fn data(&self) -> &'a dyn DataService {
        self.data
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    /// Entity at `level` or richer; a cached copy is reused when it is rich enough
    pub fn entity(&mut self, id: EntityId, level: LoadLevel) -> Result<Rc<Entity>, SourceError> {
        if let Some(cached) = self.entities.get(&id) {
            if cached.load_level >= level {
                self.stats.entity_hits += 1;
                return Ok(Rc::clone(cached));
            }
        }
        self.stats.entity_fetches += 1;
        debug!(entity_id = %id, level = %level, "fetching entity");
        let entity = Rc::new(self.data.entity(id, level)?);
        self.entities.insert(id, Rc::clone(&entity));
        Ok(entity)
    }

    /// Like [`entity`](Self::entity) but a missing entity is `None`
    pub fn find_entity(&mut self, id: EntityId, level: LoadLevel) -> Result<Option<Rc<Entity>>, SourceError> {
        match self.entity(id, level) {
            Ok(entity) => Ok(Some(entity)),
            Err(SourceError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Seed the cache with an entity that can no longer be fetched (e.g. a deleted one)
    pub fn remember(&mut self, entity: Entity) -> Rc<Entity> {
        let entity = Rc::new(entity);
        self.entities.insert(entity.id, Rc::clone(&entity));
        entity
    }

    /// Structure rows of the given kinds across the channel.
    ///
    /// Unless `force_include_linked_content` is set, rows of entities that are
    /// reachable only through associations are left out.
    pub fn all_structure_entities(&mut self, kinds: &[EntityKind]) -> Result<Vec<StructureEntity>, SourceError> {
        let key = kinds.to_vec();
        if let Some(rows) = self.structure.get(&key) {
            return Ok(rows.clone());
        }

        let mut rows = Vec::new();
        for kind in kinds {
            self.stats.structure_fetches += 1;
            rows.extend(self.channels.structure_for_type(self.channel, kind)?);
        }

        if !self.config.force_include_linked_content {
            let belongs: std::collections::HashSet<EntityId> = rows
                .iter()
                .filter(|row| self.belongs_in_channel(row))
                .map(|row| row.entity_id)
                .collect();
            rows.retain(|row| belongs.contains(&row.entity_id));
        }

        self.structure.insert(key, rows.clone());
        Ok(rows)
    }

    fn belongs_in_channel(&self, row: &StructureEntity) -> bool {
        match row.link_type.as_deref() {
            None => true,
            Some(link_type) => {
                self.links.is_relation(link_type) || self.links.is_channel_node_link(link_type)
            }
        }
    }

    /// Resource structure, loaded once per operation
    fn load_resources(&mut self) -> Result<&[StructureEntity], SourceError> {
        if self.resources.is_none() {
            self.stats.structure_fetches += 1;
            self.resources = Some(
                self.channels
                    .structure_for_type(self.channel, &EntityKind::Resource)?,
            );
        }
        Ok(self.resources.as_deref().unwrap_or_default())
    }

    /// Positions of a resource
    pub fn resource_locations(&mut self, resource_id: EntityId) -> Result<Vec<StructureEntity>, SourceError> {
        Ok(self
            .load_resources()?
            .iter()
            .filter(|row| row.entity_id == resource_id)
            .cloned()
            .collect())
    }

    /// Every resource position in the channel
    pub fn all_resource_locations(&mut self) -> Result<Vec<StructureEntity>, SourceError> {
        Ok(self.load_resources()?.to_vec())
    }

    /// Every channel node position, unfiltered
    pub fn channel_nodes(&mut self) -> Result<Vec<StructureEntity>, SourceError> {
        if self.channel_nodes.is_none() {
            self.stats.structure_fetches += 1;
            self.channel_nodes = Some(
                self.channels
                    .structure_for_type(self.channel, &EntityKind::ChannelNode)?,
            );
        }
        Ok(self.channel_nodes.clone().unwrap_or_default())
    }

    /// Parent entity through the first inbound hierarchical relation
    pub fn parent_product(&mut self, row: &StructureEntity) -> Result<Option<Rc<Entity>>, SourceError> {
        if let Some(parent) = self.parents.get(&row.entity_id) {
            return Ok(parent.clone());
        }
        let inbound = self.data.inbound_links(row.entity_id)?;
        let parent = match inbound.iter().find(|l| self.links.is_relation(&l.link_type)) {
            Some(link) => self.find_entity(link.source.id, LoadLevel::DataOnly)?,
            None => None,
        };
        self.parents.insert(row.entity_id, parent.clone());
        Ok(parent)
    }

    /// All current positions of an entity
    pub fn structure_for_entity(&mut self, entity_id: EntityId) -> Result<Vec<StructureEntity>, SourceError> {
        self.stats.structure_fetches += 1;
        self.channels.structure_for_entity(self.channel, entity_id)
    }

    /// Positions of an entity directly under `parent_id`
    pub fn entity_in_channel_with_parent(
        &mut self,
        entity_id: EntityId,
        parent_id: EntityId,
    ) -> Result<Vec<StructureEntity>, SourceError> {
        self.stats.structure_fetches += 1;
        self.channels
            .structure_for_entity_with_parent(self.channel, entity_id, parent_id)
    }

    pub fn structure_from_path(&mut self, path: &str) -> Result<Vec<StructureEntity>, SourceError> {
        self.stats.structure_fetches += 1;
        self.channels.structure_from_path(self.channel, path)
    }

    /// Rows strictly below `path`
    pub fn children_from_path(&mut self, path: &str) -> Result<Vec<StructureEntity>, SourceError> {
        self.stats.structure_fetches += 1;
        self.channels.children_from_path(self.channel, path)
    }

    /// Channel nodes on the way to `path`, memoised per path
    pub fn channel_nodes_in_path(&mut self, path: &str) -> Result<Vec<StructureEntity>, SourceError> {
        if let Some(rows) = self.node_paths.get(path) {
            return Ok(rows.clone());
        }
        self.stats.structure_fetches += 1;
        let rows = self
            .channels
            .structure_for_type_in_path(self.channel, path, &EntityKind::ChannelNode)?;
        self.node_paths.insert(path.to_string(), rows.clone());
        Ok(rows)
    }

    pub fn entity_exists_in_channel(&mut self, entity_id: EntityId) -> Result<bool, SourceError> {
        self.channels.entity_exists_in_channel(self.channel, entity_id)
    }

    /// Drop every cached entity and structure list
    pub fn flush(&mut self) {
        self.entities.clear();
        self.structure.clear();
        self.resources = None;
        self.channel_nodes = None;
        self.parents.clear();
        self.node_paths.clear();
    }

    pub fn cached_entities(&self) -> usize {
        self.entities.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::links::LinkTypeDef;
    use crate::core::snapshot::SnapshotSource;

    fn source() -> SnapshotSource {
        SnapshotSource::new(EntityId::new(1))
            .with_link_type(LinkTypeDef::new("ChannelNodes", EntityKind::Channel, EntityKind::ChannelNode))
            .with_link_type(LinkTypeDef::new("NodeProducts", EntityKind::ChannelNode, EntityKind::Product))
            .with_link_type(LinkTypeDef::new("ProductItems", EntityKind::Product, EntityKind::Item))
            .with_link_type(LinkTypeDef::new("Accessories", EntityKind::Product, EntityKind::Product))
            .with_entity(10, EntityKind::ChannelNode)
            .with_entity(20, EntityKind::Product)
            .with_entity(21, EntityKind::Product)
            .with_entity(30, EntityKind::Item)
            .with_link("ChannelNodes", 1, 10)
            .with_link("NodeProducts", 10, 20)
            .with_link("ProductItems", 20, 30)
            .with_link("Accessories", 20, 21)
    }

    #[test]
    fn test_entity_cache_hit_for_same_or_lower_level() {
        let src = source();
        let config = Config::default();
        let mut cache = StructureCache::new(&src, &src, &config, EntityId::new(1)).unwrap();

        cache.entity(EntityId::new(20), LoadLevel::DataOnly).unwrap();
        cache.entity(EntityId::new(20), LoadLevel::DataOnly).unwrap();
        cache.entity(EntityId::new(20), LoadLevel::Shallow).unwrap();
        assert_eq!(src.fetch_count(EntityId::new(20)), 1);

        let richer = cache.entity(EntityId::new(20), LoadLevel::DataAndLinks).unwrap();
        assert_eq!(richer.load_level, LoadLevel::DataAndLinks);
        assert_eq!(src.fetch_count(EntityId::new(20)), 2);

        cache.entity(EntityId::new(20), LoadLevel::DataOnly).unwrap();
        assert_eq!(src.fetch_count(EntityId::new(20)), 2);
        assert_eq!(cache.stats().entity_hits, 3);
    }

    #[test]
    fn test_flush_forces_refetch() {
        let src = source();
        let config = Config::default();
        let mut cache = StructureCache::new(&src, &src, &config, EntityId::new(1)).unwrap();
        cache.entity(EntityId::new(30), LoadLevel::DataOnly).unwrap();
        cache.flush();
        assert_eq!(cache.cached_entities(), 0);
        cache.entity(EntityId::new(30), LoadLevel::DataOnly).unwrap();
        assert_eq!(src.fetch_count(EntityId::new(30)), 2);
    }

    #[test]
    fn test_find_entity_missing_is_none() {
        let src = source();
        let config = Config::default();
        let mut cache = StructureCache::new(&src, &src, &config, EntityId::new(1)).unwrap();
        assert!(cache.find_entity(EntityId::new(999), LoadLevel::DataOnly).unwrap().is_none());
    }

    #[test]
    fn test_association_only_rows_filtered() {
        let src = source();
        let config = Config::default();
        let mut cache = StructureCache::new(&src, &src, &config, EntityId::new(1)).unwrap();
        let rows = cache.all_structure_entities(&[EntityKind::Product]).unwrap();
        assert!(rows.iter().all(|r| r.entity_id != EntityId::new(21)));
        assert!(rows.iter().any(|r| r.entity_id == EntityId::new(20)));

        let config = Config {
            force_include_linked_content: true,
            ..Config::default()
        };
        let mut cache = StructureCache::new(&src, &src, &config, EntityId::new(1)).unwrap();
        let rows = cache.all_structure_entities(&[EntityKind::Product]).unwrap();
        assert!(rows.iter().any(|r| r.entity_id == EntityId::new(21)));
    }

    #[test]
    fn test_structure_list_memoised() {
        let src = source();
        let config = Config::default();
        let mut cache = StructureCache::new(&src, &src, &config, EntityId::new(1)).unwrap();
        cache.all_structure_entities(&[EntityKind::Item]).unwrap();
        let queries = src.structure_query_count();
        cache.all_structure_entities(&[EntityKind::Item]).unwrap();
        assert_eq!(src.structure_query_count(), queries);
    }

    #[test]
    fn test_resource_locations_loaded_once() {
        let src = source()
            .with_link_type(LinkTypeDef::new("ItemResources", EntityKind::Item, EntityKind::Resource))
            .with_entity(90, EntityKind::Resource)
            .with_link("ItemResources", 30, 90);
        let config = Config::default();
        let mut cache = StructureCache::new(&src, &src, &config, EntityId::new(1)).unwrap();
        assert_eq!(cache.resource_locations(EntityId::new(90)).unwrap().len(), 1);
        let queries = src.structure_query_count();
        assert!(cache.resource_locations(EntityId::new(91)).unwrap().is_empty());
        assert_eq!(cache.all_resource_locations().unwrap().len(), 1);
        assert_eq!(src.structure_query_count(), queries);
    }

    #[test]
    fn test_parent_product_memoised() {
        let src = source();
        let config = Config::default();
        let mut cache = StructureCache::new(&src, &src, &config, EntityId::new(1)).unwrap();
        let item_row = cache.structure_for_entity(EntityId::new(30)).unwrap().remove(0);
        let parent = cache.parent_product(&item_row).unwrap().unwrap();
        assert_eq!(parent.id, EntityId::new(20));
        cache.parent_product(&item_row).unwrap();
        assert_eq!(src.fetch_count(EntityId::new(20)), 1);

        let node_row = cache.structure_for_entity(EntityId::new(10)).unwrap().remove(0);
        assert!(cache.parent_product(&node_row).unwrap().is_none());
    }

    #[test]
    fn test_channel_nodes_in_path() {
        let src = source();
        let config = Config::default();
        let mut cache = StructureCache::new(&src, &src, &config, EntityId::new(1)).unwrap();
        let nodes = cache.channel_nodes_in_path("1/10/20/30").unwrap();
        assert_eq!(nodes.len(), 1);
        assert_eq!(nodes[0].entity_id, EntityId::new(10));
    }
}
