//! Delete/Unlink Propagator
//!
//! Decides per entity whether a removal is a genuine delete, a relink (the
//! entity is still reachable through another path) or a resource unlink, and
//! walks outbound links depth-first. Every id descended into is recorded in
//! a visited set shared by the whole walk, so circular link graphs terminate.

use std::collections::{BTreeMap, HashSet};
use std::rc::Rc;

use tracing::{debug, info, warn};

use crate::core::assembly::{lineage, resource_element};
use crate::core::document::{
    Action, ActionDocument, Document, EntryRelationUpdate, LineageElement, Mutation, ResourceAction,
    ResourceDocument,
};
use crate::core::entity::{Entity, StructureEntity};
use crate::core::identity::{EntityId, EntityKind, LoadLevel};
use crate::core::transport::{LinkEntityQuery, Transport};
use crate::sync::add::entry_codes;
use crate::sync::context::OperationContext;
use crate::sync::hierarchy::{
    find_in_structure, lineage_rows, parent_along_path, parent_ids, should_exist_in_channel_nodes,
};
use crate::sync::SyncError;

/// What a delete run sent
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeleteOutcome {
    /// Codes removed from the target
    pub deleted: Vec<String>,
    /// Entry codes whose relations were corrected
    pub updated: Vec<String>,
    pub unlinked_resources: Vec<String>,
    pub deleted_resources: Vec<String>,
    /// Entities visited, in walk order
    pub visited: Vec<EntityId>,
    /// Branches abandoned because of a missing entity or a non-fatal error
    pub skipped: usize,
    pub resources_included: bool,
    pub documents_sent: usize,
}

struct DeleteWalk {
    deleted: ActionDocument,
    updated: ActionDocument,
    resources: Vec<ResourceDocument>,
    visited: HashSet<EntityId>,
    /// Resources already sent as deleted by an earlier sweep
    deleted_resources: HashSet<EntityId>,
    order: Vec<EntityId>,
    skipped: usize,
}

/// Propagate the removal of `target`, reached from `parent` through
/// `link_type` (both absent when the entity itself was deleted).
pub fn delete(
    ctx: &mut OperationContext,
    transport: &mut dyn Transport,
    parent: Option<EntityId>,
    target: &Entity,
    link_type: Option<&str>,
) -> Result<DeleteOutcome, SyncError> {
    let lineage = match parent_lineage(ctx, parent) {
        Ok(lineage) => lineage,
        Err(SyncError::MalformedPath(e)) => {
            warn!(entity_id = %target.id, error = %e, "parent position unusable, delete abandoned");
            return Ok(DeleteOutcome {
                visited: vec![target.id],
                skipped: 1,
                ..DeleteOutcome::default()
            });
        }
        Err(e) => return Err(e),
    };
    let mut walk = DeleteWalk {
        deleted: ActionDocument::new(Action::Deleted, lineage.clone()),
        updated: ActionDocument::new(Action::Updated, lineage),
        resources: Vec::new(),
        visited: HashSet::from([target.id]),
        deleted_resources: HashSet::new(),
        order: Vec::new(),
        skipped: 0,
    };

    match walk.visit(ctx, transport, parent, target, link_type, 0) {
        Err(e @ SyncError::MalformedPath(_)) => {
            warn!(entity_id = %target.id, error = %e, "delete branch abandoned");
            walk.skipped += 1;
        }
        result => result?,
    }

    let mut outcome = DeleteOutcome {
        deleted: walk.deleted.deleted_codes().into_iter().map(str::to_string).collect(),
        updated: walk
            .updated
            .relation_updates()
            .map(|u| u.entry_code.clone())
            .fold(Vec::new(), |mut acc, code| {
                if !acc.contains(&code) {
                    acc.push(code);
                }
                acc
            }),
        visited: walk.order,
        skipped: walk.skipped,
        resources_included: !walk.resources.is_empty(),
        ..DeleteOutcome::default()
    };
    for doc in &walk.resources {
        for element in &doc.resources {
            match element.action {
                ResourceAction::Unlinked => outcome.unlinked_resources.push(element.code.clone()),
                ResourceAction::Deleted => outcome.deleted_resources.push(element.code.clone()),
                _ => {}
            }
        }
    }

    if !walk.deleted.is_empty() {
        transport.import(ctx.identity(), &Document::Action(walk.deleted))?;
        outcome.documents_sent += 1;
    }
    if !walk.updated.is_empty() {
        transport.import(ctx.identity(), &Document::Action(walk.updated))?;
        outcome.documents_sent += 1;
    }
    for doc in walk.resources {
        transport.import(ctx.identity(), &Document::Resources(doc))?;
        outcome.documents_sent += 1;
    }

    info!(
        channel_id = %ctx.channel_id(),
        entity_id = %target.id,
        deleted = outcome.deleted.len(),
        updated = outcome.updated.len(),
        skipped = outcome.skipped,
        "delete propagated"
    );
    Ok(outcome)
}

/// Ancestors of the parent's first position, falling back to the channel alone.
///
/// A parent whose path does not parse is [`SyncError::MalformedPath`].
pub(crate) fn parent_lineage(ctx: &mut OperationContext, parent: Option<EntityId>) -> Result<Vec<LineageElement>, SyncError> {
    let config = ctx.config();
    let channel_id = ctx.channel_id();
    let fallback = vec![LineageElement {
        kind: EntityKind::Channel.to_string(),
        code: config.code(channel_id),
    }];

    let row = match parent.filter(|p| *p != channel_id) {
        Some(parent) => match ctx.cache.structure_for_entity(parent) {
            Ok(rows) => rows.into_iter().next(),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        },
        None => None,
    };
    let Some(row) = row else {
        return Ok(fallback);
    };

    let ancestors = parent_ids(&row)?;
    let mut candidates = ctx.cache.channel_nodes_in_path(&row.path)?;
    for id in ancestors {
        if candidates.iter().any(|c| c.entity_id == id) {
            continue;
        }
        match ctx.cache.structure_for_entity(id) {
            Ok(rows) => candidates.extend(rows),
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e.into()),
        }
    }
    candidates.push(row.clone());

    let rows: Vec<StructureEntity> = lineage_rows(&candidates, &row.path).into_iter().cloned().collect();
    if rows.is_empty() {
        Ok(fallback)
    } else {
        Ok(lineage(&rows, config))
    }
}

impl DeleteWalk {
    fn visit(
        &mut self,
        ctx: &mut OperationContext,
        transport: &mut dyn Transport,
        parent: Option<EntityId>,
        target: &Entity,
        link_type: Option<&str>,
        depth: usize,
    ) -> Result<(), SyncError> {
        let limit = ctx.config().max_delete_depth;
        if depth > limit {
            return Err(SyncError::DepthExceeded {
                limit,
                entity_id: target.id,
            });
        }
        self.order.push(target.id);

        if target.kind != EntityKind::Channel && ctx.cache.entity_exists_in_channel(target.id)? {
            return match parent {
                Some(parent) if target.kind == EntityKind::Resource => self.unlink_resource(ctx, parent, target),
                Some(parent) => self.relink(ctx, transport, parent, target, link_type.unwrap_or_default()),
                None => {
                    debug!(entity_id = %target.id, "entity still in channel, nothing to delete");
                    Ok(())
                }
            };
        }

        self.delete_entity(ctx, transport, parent, target, depth)
    }

    fn delete_entity(
        &mut self,
        ctx: &mut OperationContext,
        transport: &mut dyn Transport,
        parent: Option<EntityId>,
        target: &Entity,
        depth: usize,
    ) -> Result<(), SyncError> {
        let config = ctx.config();
        let linked = with_links(ctx, target)?;
        let outbound_resources: Vec<EntityId> = linked
            .outbound_to(&EntityKind::Resource)
            .map(|l| l.target.id)
            .collect();
        debug!(entity_id = %target.id, kind = %target.kind, depth, "deleting entity");

        match &target.kind {
            EntityKind::Channel => {
                self.deleted.push(Mutation::DeleteCatalog {
                    code: config.code(target.id),
                });
                let mut resources: Vec<EntityId> = match ctx.cache.all_resource_locations() {
                    Ok(rows) => rows.into_iter().map(|r| r.entity_id).collect(),
                    Err(e) if e.is_not_found() => Vec::new(),
                    Err(e) => return Err(e.into()),
                };
                resources.extend(outbound_resources);
                self.sweep(ctx, Vec::new(), resources, false)?;
            }
            EntityKind::ChannelNode => {
                self.deleted.push(Mutation::DeleteNode {
                    code: config.code(target.id),
                });
                self.recurse(ctx, transport, &linked, depth)?;
                self.sweep(ctx, vec![config.code(target.id)], outbound_resources, true)?;
            }
            EntityKind::Item => {
                let codes = entry_codes(target, config);
                for code in &codes {
                    self.deleted.push(Mutation::DeleteEntry { code: code.clone() });
                }
                self.sweep(ctx, codes, outbound_resources, true)?;
            }
            EntityKind::Resource => {
                let owners = match parent {
                    Some(parent) => parent_codes(ctx, parent)?,
                    None => Vec::new(),
                };
                self.sweep(ctx, owners, vec![target.id], true)?;
            }
            _ => {
                self.deleted.push(Mutation::DeleteEntry {
                    code: config.code(target.id),
                });
                self.recurse(ctx, transport, &linked, depth)?;
                self.sweep(ctx, vec![config.code(target.id)], outbound_resources, true)?;
            }
        }
        Ok(())
    }

    /// Descend into every non-resource outbound link of `owner`
    fn recurse(
        &mut self,
        ctx: &mut OperationContext,
        transport: &mut dyn Transport,
        owner: &Entity,
        depth: usize,
    ) -> Result<(), SyncError> {
        for link in &owner.outbound {
            if link.target.kind == EntityKind::Resource {
                continue;
            }
            let child_id = link.target.id;
            if !self.visited.insert(child_id) {
                info!(
                    "Entity with id {} has already been deleted, break the chain to avoid circular relations",
                    child_id
                );
                continue;
            }
            let child = match ctx.cache.find_entity(child_id, LoadLevel::DataAndLinks) {
                Ok(Some(child)) => child,
                Ok(None) => {
                    warn!(entity_id = %child_id, parent_id = %owner.id, "child entity not found, branch skipped");
                    self.skipped += 1;
                    continue;
                }
                Err(e) => {
                    warn!(entity_id = %child_id, error = %e, "could not load child entity, branch skipped");
                    self.skipped += 1;
                    continue;
                }
            };
            match self.visit(ctx, transport, Some(owner.id), &child, Some(link.link_type.as_str()), depth + 1) {
                Ok(()) => {}
                Err(e) if e.is_fatal() => return Err(e),
                Err(e) => {
                    warn!(entity_id = %child_id, error = %e, "delete branch abandoned");
                    self.skipped += 1;
                }
            }
        }
        Ok(())
    }

    /// Send resource unlink and delete elements for resources no longer in the channel
    fn sweep(
        &mut self,
        ctx: &mut OperationContext,
        owner_codes: Vec<String>,
        resource_ids: Vec<EntityId>,
        check_channel: bool,
    ) -> Result<(), SyncError> {
        let config = ctx.config();
        let mut seen = HashSet::new();
        let mut unlink = ResourceDocument::default();
        let mut remove = ResourceDocument::default();

        for id in resource_ids {
            if !seen.insert(id) {
                continue;
            }
            if check_channel && ctx.cache.entity_exists_in_channel(id)? {
                debug!(resource_id = %id, "resource still referenced in channel, kept");
                continue;
            }
            let still_exists = match ctx.cache.find_entity(id, LoadLevel::Shallow) {
                Ok(found) => found.is_some(),
                Err(e) => {
                    warn!(resource_id = %id, error = %e, "could not load resource");
                    false
                }
            };
            if still_exists && !owner_codes.is_empty() {
                unlink.resources.push(resource_element(
                    None,
                    config.code(id),
                    ResourceAction::Unlinked,
                    owner_codes.clone(),
                    config,
                ));
            }
            if !self.deleted_resources.insert(id) {
                continue;
            }
            remove.resources.push(resource_element(
                None,
                config.code(id),
                ResourceAction::Deleted,
                Vec::new(),
                config,
            ));
        }

        if !unlink.resources.is_empty() {
            self.resources.push(unlink);
        }
        if !remove.resources.is_empty() {
            self.resources.push(remove);
        }
        Ok(())
    }

    fn unlink_resource(&mut self, ctx: &mut OperationContext, parent: EntityId, resource: &Entity) -> Result<(), SyncError> {
        let config = ctx.config();
        let owners = parent_codes(ctx, parent)?;
        debug!(resource_id = %resource.id, parent_id = %parent, "unlinking resource");
        self.resources.push(ResourceDocument {
            resources: vec![resource_element(
                None,
                config.code(resource.id),
                ResourceAction::Unlinked,
                owners,
                config,
            )],
        });
        Ok(())
    }

    /// The entity is still reachable: correct channel node membership of it
    /// and of everything directly below it instead of deleting.
    fn relink(
        &mut self,
        ctx: &mut OperationContext,
        transport: &mut dyn Transport,
        parent: EntityId,
        target: &Entity,
        link_type: &str,
    ) -> Result<(), SyncError> {
        let config = ctx.config();
        let channel_id = ctx.channel_id();

        let mut channel_nodes = ctx.cache.channel_nodes()?;
        if channel_nodes.is_empty() && parent == channel_id {
            channel_nodes.extend(ctx.cache.structure_for_entity(channel_id)?.into_iter().take(1));
        }

        let parents = parent_codes(ctx, parent)?;
        let link_entity_ids = self.stale_link_entities(ctx, transport, parent, target, link_type, &parents)?;

        let linked = with_links(ctx, target)?;
        let mut elements: Vec<Rc<Entity>> = vec![Rc::clone(&linked)];
        let mut element_ids = HashSet::from([target.id]);
        for link in &linked.outbound {
            if link.target.kind == EntityKind::Resource || !element_ids.insert(link.target.id) {
                continue;
            }
            match ctx.cache.find_entity(link.target.id, LoadLevel::DataOnly) {
                Ok(Some(child)) => elements.push(child),
                Ok(None) => warn!(entity_id = %link.target.id, "entity below relinked entity not found"),
                Err(e) => warn!(entity_id = %link.target.id, error = %e, "could not load entity below relinked entity"),
            }
        }

        let is_relation = ctx.cache.links().is_relation(link_type);
        let mut updates: BTreeMap<String, (BTreeMap<String, bool>, bool)> = BTreeMap::new();
        for element in &elements {
            let rows = ctx.cache.structure_for_entity(element.id)?;
            let membership: BTreeMap<String, bool> = should_exist_in_channel_nodes(&channel_nodes, &rows)
                .into_iter()
                .map(|(node, member)| (config.code(node), member))
                .collect();
            let mut parent_exists = false;
            for row in &rows {
                parent_exists |= parent_along_path(row)? == Some(parent);
            }
            for code in entry_codes(element, config) {
                updates
                    .entry(code)
                    .or_insert_with(|| (membership.clone(), parent_exists));
            }
        }

        for (entry_code, (membership, parent_exists)) in updates {
            for parent_code in &parents {
                self.updated.push(Mutation::UpdateRelations(EntryRelationUpdate {
                    entry_code: entry_code.clone(),
                    parent_code: parent_code.clone(),
                    link_type: link_type.to_string(),
                    is_relation,
                    parent_exists_in_channel_nodes: parent_exists,
                    membership: membership.clone(),
                    link_entity_ids_to_remove: link_entity_ids.clone(),
                }));
            }
        }
        debug!(entity_id = %target.id, parent_id = %parent, elements = elements.len(), "relinked");
        Ok(())
    }

    /// Association descriptions the target still holds for the removed link
    /// but no current structure row backs any more.
    fn stale_link_entities(
        &mut self,
        ctx: &mut OperationContext,
        transport: &mut dyn Transport,
        parent: EntityId,
        target: &Entity,
        link_type: &str,
        parent_codes: &[String],
    ) -> Result<Vec<String>, SyncError> {
        if !ctx.cache.links().has_link_entity(link_type) {
            return Ok(Vec::new());
        }
        let config = ctx.config();
        let query = LinkEntityQuery {
            link_type: link_type.to_string(),
            parent_codes: parent_codes.to_vec(),
            target_codes: entry_codes(target, config),
        };
        let existing = transport.link_entity_associations(ctx.identity(), &query)?;
        let rows = ctx.cache.structure_for_entity(target.id)?;
        let backed: HashSet<String> = find_in_structure(&rows, parent, target.id, link_type)
            .into_iter()
            .filter_map(|row| row.link_entity_id)
            .map(|id| config.code(id))
            .collect();
        Ok(existing
            .into_iter()
            .filter(|description| !backed.contains(description))
            .collect())
    }
}

/// The entity with its links loaded, refetching when the given copy is too shallow
fn with_links(ctx: &mut OperationContext, entity: &Entity) -> Result<Rc<Entity>, SyncError> {
    if entity.load_level >= LoadLevel::DataAndLinks {
        return Ok(Rc::new(entity.clone()));
    }
    match ctx.cache.find_entity(entity.id, LoadLevel::DataAndLinks) {
        Ok(Some(found)) => Ok(found),
        Ok(None) => Ok(Rc::new(entity.clone())),
        Err(e) => Err(e.into()),
    }
}

/// Target codes of a parent, SKU-expanded for items
pub(crate) fn parent_codes(ctx: &mut OperationContext, parent: EntityId) -> Result<Vec<String>, SyncError> {
    let config = ctx.config();
    Ok(match ctx.cache.find_entity(parent, LoadLevel::DataOnly)? {
        Some(entity) => entry_codes(&entity, config),
        None => vec![config.code(parent)],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::Config;
    use crate::core::links::LinkTypeDef;
    use crate::core::snapshot::SnapshotSource;
    use crate::core::source::{ChannelService, DataService, SourceError};
    use crate::core::transport::RecordingTransport;
    use tracing_test::traced_test;

    /// Snapshot structure with every position of one entity moved to `path`
    struct RewrittenPaths<'s> {
        inner: &'s SnapshotSource,
        entity: EntityId,
        path: &'static str,
    }

    impl RewrittenPaths<'_> {
        fn rewrite(&self, mut rows: Vec<StructureEntity>) -> Vec<StructureEntity> {
            for row in rows.iter_mut().filter(|r| r.entity_id == self.entity) {
                row.path = self.path.to_string();
            }
            rows
        }
    }

    impl ChannelService for RewrittenPaths<'_> {
        fn structure_for_type(&self, channel: EntityId, kind: &EntityKind) -> Result<Vec<StructureEntity>, SourceError> {
            Ok(self.rewrite(self.inner.structure_for_type(channel, kind)?))
        }

        fn structure_for_entity(&self, channel: EntityId, entity: EntityId) -> Result<Vec<StructureEntity>, SourceError> {
            Ok(self.rewrite(self.inner.structure_for_entity(channel, entity)?))
        }

        fn structure_for_entity_with_parent(
            &self,
            channel: EntityId,
            entity: EntityId,
            parent: EntityId,
        ) -> Result<Vec<StructureEntity>, SourceError> {
            Ok(self.rewrite(self.inner.structure_for_entity_with_parent(channel, entity, parent)?))
        }

        fn structure_from_path(&self, channel: EntityId, path: &str) -> Result<Vec<StructureEntity>, SourceError> {
            Ok(self.rewrite(self.inner.structure_from_path(channel, path)?))
        }

        fn children_from_path(&self, channel: EntityId, path: &str) -> Result<Vec<StructureEntity>, SourceError> {
            Ok(self.rewrite(self.inner.children_from_path(channel, path)?))
        }

        fn structure_for_type_in_path(
            &self,
            channel: EntityId,
            path: &str,
            kind: &EntityKind,
        ) -> Result<Vec<StructureEntity>, SourceError> {
            Ok(self.rewrite(self.inner.structure_for_type_in_path(channel, path, kind)?))
        }

        fn entity_exists_in_channel(&self, channel: EntityId, entity: EntityId) -> Result<bool, SourceError> {
            self.inner.entity_exists_in_channel(channel, entity)
        }
    }

    fn source() -> SnapshotSource {
        SnapshotSource::new(EntityId::new(1))
            .with_link_type(LinkTypeDef::new("ChannelNodes", EntityKind::Channel, EntityKind::ChannelNode))
            .with_link_type(LinkTypeDef::new("NodeProducts", EntityKind::ChannelNode, EntityKind::Product))
            .with_link_type(LinkTypeDef::new("NodeItems", EntityKind::ChannelNode, EntityKind::Item))
            .with_link_type(LinkTypeDef::new("Related", EntityKind::Product, EntityKind::Product))
            .with_link_type(LinkTypeDef::new("ItemResources", EntityKind::Item, EntityKind::Resource))
            .with_entity(10, EntityKind::ChannelNode)
            .with_entity(11, EntityKind::ChannelNode)
            .with_entity(30, EntityKind::Item)
            .with_entity(31, EntityKind::Item)
            .with_link("ChannelNodes", 1, 10)
            .with_link("ChannelNodes", 1, 11)
            .with_link("NodeItems", 10, 30)
            .with_link("NodeItems", 10, 31)
    }

    fn deleted_doc(transport: &RecordingTransport) -> Option<&ActionDocument> {
        transport
            .documents()
            .iter()
            .filter_map(Document::as_action)
            .find(|d| d.action == Action::Deleted)
    }

    #[test]
    fn test_delete_node_with_items_in_one_document() {
        let mut src = source();
        let config = Config::default();
        let node = src.entity(EntityId::new(10), LoadLevel::DataAndLinks).unwrap();
        src.remove_link(EntityId::new(1), EntityId::new(10), "ChannelNodes");

        let mut ctx = OperationContext::open(&src, &src, &config, EntityId::new(1)).unwrap();
        let mut transport = RecordingTransport::new();
        let outcome = delete(&mut ctx, &mut transport, None, &node, None).unwrap();

        assert_eq!(transport.documents().len(), 1);
        let doc = deleted_doc(&transport).unwrap();
        assert_eq!(doc.deleted_codes(), vec!["10", "30", "31"]);
        assert_eq!(outcome.deleted.len(), 3);
        assert!(outcome.updated.is_empty());
    }

    #[test]
    fn test_relink_when_still_in_channel() {
        let mut src = source().with_link("NodeItems", 11, 30);
        let config = Config::default();
        src.remove_link(EntityId::new(10), EntityId::new(30), "NodeItems");
        let item = src.entity(EntityId::new(30), LoadLevel::DataAndLinks).unwrap();

        let mut ctx = OperationContext::open(&src, &src, &config, EntityId::new(1)).unwrap();
        let mut transport = RecordingTransport::new();
        let outcome = delete(&mut ctx, &mut transport, Some(EntityId::new(10)), &item, Some("NodeItems")).unwrap();

        assert!(outcome.deleted.is_empty());
        assert_eq!(outcome.updated, vec!["30"]);
        let doc = transport.documents()[0].as_action().unwrap();
        assert_eq!(doc.action, Action::Updated);
        let update = doc.relation_updates().next().unwrap();
        assert_eq!(update.membership.get("10"), Some(&false));
        assert_eq!(update.membership.get("11"), Some(&true));
        assert!(!update.parent_exists_in_channel_nodes);
    }

    #[test]
    #[traced_test]
    fn test_circular_products_visited_once() {
        let src = source()
            .with_entity(20, EntityKind::Product)
            .with_entity(21, EntityKind::Product)
            .with_link("Related", 20, 21)
            .with_link("Related", 21, 20);
        let config = Config::default();
        let product = src.entity(EntityId::new(20), LoadLevel::DataAndLinks).unwrap();

        let mut ctx = OperationContext::open(&src, &src, &config, EntityId::new(1)).unwrap();
        let mut transport = RecordingTransport::new();
        let outcome = delete(&mut ctx, &mut transport, None, &product, None).unwrap();

        assert_eq!(outcome.visited, vec![EntityId::new(20), EntityId::new(21)]);
        assert_eq!(outcome.deleted, vec!["20", "21"]);
        assert!(logs_contain("has already been deleted"));
    }

    #[test]
    fn test_depth_cap_abandons_branch() {
        let src = source()
            .with_entity(20, EntityKind::Product)
            .with_entity(21, EntityKind::Product)
            .with_entity(22, EntityKind::Product)
            .with_link("Related", 20, 21)
            .with_link("Related", 21, 22);
        let config = Config {
            max_delete_depth: 1,
            ..Config::default()
        };
        let product = src.entity(EntityId::new(20), LoadLevel::DataAndLinks).unwrap();

        let mut ctx = OperationContext::open(&src, &src, &config, EntityId::new(1)).unwrap();
        let mut transport = RecordingTransport::new();
        let outcome = delete(&mut ctx, &mut transport, None, &product, None).unwrap();
        assert_eq!(outcome.deleted, vec!["20", "21"]);
        assert_eq!(outcome.skipped, 1);
    }

    #[test]
    fn test_shared_resource_unlinked_not_deleted() {
        let mut src = source()
            .with_entity(90, EntityKind::Resource)
            .with_link("ItemResources", 30, 90)
            .with_link("ItemResources", 31, 90);
        let config = Config::default();
        src.remove_link(EntityId::new(30), EntityId::new(90), "ItemResources");
        let resource = src.entity(EntityId::new(90), LoadLevel::DataAndLinks).unwrap();

        let mut ctx = OperationContext::open(&src, &src, &config, EntityId::new(1)).unwrap();
        let mut transport = RecordingTransport::new();
        let outcome = delete(&mut ctx, &mut transport, Some(EntityId::new(30)), &resource, Some("ItemResources")).unwrap();

        assert_eq!(outcome.unlinked_resources, vec!["90"]);
        assert!(outcome.deleted_resources.is_empty());
        let doc = transport.documents()[0].as_resources().unwrap();
        assert_eq!(doc.resources[0].parent_codes, vec!["30".to_string()]);
    }

    #[test]
    fn test_last_resource_link_unlinks_and_deletes() {
        let mut src = source()
            .with_entity(90, EntityKind::Resource)
            .with_link("ItemResources", 30, 90);
        let config = Config::default();
        src.remove_link(EntityId::new(30), EntityId::new(90), "ItemResources");
        let resource = src.entity(EntityId::new(90), LoadLevel::DataAndLinks).unwrap();

        let mut ctx = OperationContext::open(&src, &src, &config, EntityId::new(1)).unwrap();
        let mut transport = RecordingTransport::new();
        let outcome = delete(&mut ctx, &mut transport, Some(EntityId::new(30)), &resource, Some("ItemResources")).unwrap();

        assert_eq!(outcome.unlinked_resources, vec!["90"]);
        assert_eq!(outcome.deleted_resources, vec!["90"]);
        assert_eq!(outcome.documents_sent, 2);
    }

    #[test]
    fn test_sku_item_delete_enumerates_skus() {
        let mut src = source().with_field(31, "SKUs", r#"<SKUs><SKU id="A"/><SKU id="B"/></SKUs>"#);
        let config = Config {
            items_to_skus: true,
            ..Config::default()
        };
        src.remove_link(EntityId::new(10), EntityId::new(31), "NodeItems");
        let item = src.entity(EntityId::new(31), LoadLevel::DataAndLinks).unwrap();

        let mut ctx = OperationContext::open(&src, &src, &config, EntityId::new(1)).unwrap();
        let mut transport = RecordingTransport::new();
        let outcome = delete(&mut ctx, &mut transport, Some(EntityId::new(10)), &item, Some("NodeItems")).unwrap();
        assert_eq!(outcome.deleted, vec!["A", "B"]);

        let doc = deleted_doc(&transport).unwrap();
        let lineage: Vec<&str> = doc.lineage.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(lineage, vec!["1", "10"]);
    }

    #[test]
    fn test_resource_shared_by_deleted_siblings_deleted_once() {
        let mut src = source()
            .with_entity(90, EntityKind::Resource)
            .with_link("ItemResources", 30, 90)
            .with_link("ItemResources", 31, 90);
        let config = Config::default();
        let node = src.entity(EntityId::new(10), LoadLevel::DataAndLinks).unwrap();
        src.remove_link(EntityId::new(1), EntityId::new(10), "ChannelNodes");

        let mut ctx = OperationContext::open(&src, &src, &config, EntityId::new(1)).unwrap();
        let mut transport = RecordingTransport::new();
        let outcome = delete(&mut ctx, &mut transport, None, &node, None).unwrap();

        assert_eq!(outcome.deleted, vec!["10", "30", "31"]);
        assert_eq!(outcome.deleted_resources, vec!["90"]);
        assert_eq!(outcome.unlinked_resources, vec!["90", "90"]);
        let deletes: usize = transport
            .documents()
            .iter()
            .filter_map(Document::as_resources)
            .map(|doc| doc.codes_with(ResourceAction::Deleted).len())
            .sum();
        assert_eq!(deletes, 1);
        assert_eq!(outcome.documents_sent, 4);
    }

    #[test]
    fn test_lineage_runs_through_product_parent() {
        let mut src = source()
            .with_link_type(LinkTypeDef::new("ProductItems", EntityKind::Product, EntityKind::Item))
            .with_entity(20, EntityKind::Product)
            .with_entity(32, EntityKind::Item)
            .with_link("NodeProducts", 10, 20)
            .with_link("ProductItems", 20, 32);
        let config = Config::default();
        src.remove_link(EntityId::new(20), EntityId::new(32), "ProductItems");
        let item = src.entity(EntityId::new(32), LoadLevel::DataAndLinks).unwrap();

        let mut ctx = OperationContext::open(&src, &src, &config, EntityId::new(1)).unwrap();
        let mut transport = RecordingTransport::new();
        delete(&mut ctx, &mut transport, Some(EntityId::new(20)), &item, Some("ProductItems")).unwrap();

        let doc = deleted_doc(&transport).unwrap();
        let lineage: Vec<(&str, &str)> = doc
            .lineage
            .iter()
            .map(|l| (l.kind.as_str(), l.code.as_str()))
            .collect();
        assert_eq!(
            lineage,
            vec![("Channel", "1"), ("ChannelNode", "10"), ("Product", "20")]
        );
    }

    #[test]
    #[traced_test]
    fn test_malformed_parent_path_abandons_delete() {
        let mut src = source();
        let config = Config::default();
        src.remove_link(EntityId::new(10), EntityId::new(31), "NodeItems");
        let item = src.entity(EntityId::new(31), LoadLevel::DataAndLinks).unwrap();
        let channels = RewrittenPaths {
            inner: &src,
            entity: EntityId::new(10),
            path: "1//10",
        };

        let mut ctx = OperationContext::open(&src, &channels, &config, EntityId::new(1)).unwrap();
        let mut transport = RecordingTransport::new();
        let outcome = delete(&mut ctx, &mut transport, Some(EntityId::new(10)), &item, Some("NodeItems")).unwrap();

        assert_eq!(outcome.skipped, 1);
        assert!(outcome.deleted.is_empty());
        assert!(transport.documents().is_empty());
        assert!(logs_contain("delete abandoned"));
    }

    #[test]
    #[traced_test]
    fn test_malformed_position_abandons_relink() {
        let mut src = source().with_link("NodeItems", 11, 30);
        let config = Config::default();
        src.remove_link(EntityId::new(10), EntityId::new(30), "NodeItems");
        let item = src.entity(EntityId::new(30), LoadLevel::DataAndLinks).unwrap();
        let channels = RewrittenPaths {
            inner: &src,
            entity: EntityId::new(30),
            path: "1/11/x30",
        };

        let mut ctx = OperationContext::open(&src, &channels, &config, EntityId::new(1)).unwrap();
        let mut transport = RecordingTransport::new();
        let outcome = delete(&mut ctx, &mut transport, Some(EntityId::new(10)), &item, Some("NodeItems")).unwrap();

        assert_eq!(outcome.skipped, 1);
        assert!(outcome.updated.is_empty());
        assert!(transport.documents().is_empty());
        assert!(logs_contain("delete branch abandoned"));
    }
}
