//! Change Router: turns one source change event into one propagation

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::core::assembly::{meta_fields, resource_element};
use crate::core::config::Config;
use crate::core::document::{Action, ActionDocument, Document, Mutation, ResourceAction, ResourceDocument};
use crate::core::entity::{Entity, Field, StructureEntity};
use crate::core::events::{EventKind, EventReporter, EventSink};
use crate::core::identity::{EntityId, EntityKind, LoadLevel};
use crate::core::sku::diff_skus;
use crate::core::source::{ChannelService, DataService};
use crate::core::transport::{Completion, CompletionKind, Transport};
use crate::sync::add::{add, AddOptions, AddOutcome};
use crate::sync::context::OperationContext;
use crate::sync::delete::{delete, parent_codes, parent_lineage, DeleteOutcome};
use crate::sync::SyncError;

/// A change notification from the source system
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ChangeEvent {
    EntityAdded {
        channel: EntityId,
        entity_id: EntityId,
    },
    EntityUpdated {
        channel: EntityId,
        entity_id: EntityId,
        #[serde(default)]
        changed_fields: Vec<String>,
    },
    /// Carries the entity as it was, since it can no longer be fetched
    EntityDeleted {
        channel: EntityId,
        entity: Entity,
    },
    LinkAdded {
        channel: EntityId,
        source_id: EntityId,
        target_id: EntityId,
        link_type: String,
        #[serde(default)]
        link_entity_id: Option<EntityId>,
    },
    LinkUpdated {
        channel: EntityId,
        source_id: EntityId,
        target_id: EntityId,
        link_type: String,
        #[serde(default)]
        link_entity_id: Option<EntityId>,
    },
    LinkDeleted {
        channel: EntityId,
        source_id: EntityId,
        target_id: EntityId,
        link_type: String,
        #[serde(default)]
        link_entity_id: Option<EntityId>,
    },
    FieldSetUpdated {
        channel: EntityId,
        entity_id: EntityId,
        #[serde(default)]
        field_set: Option<String>,
    },
    SpecificationFieldChanged {
        channel: EntityId,
        entity_id: EntityId,
        field: String,
    },
    Publish {
        channel: EntityId,
    },
}

impl ChangeEvent {
    pub fn channel(&self) -> EntityId {
        match self {
            ChangeEvent::EntityAdded { channel, .. }
            | ChangeEvent::EntityUpdated { channel, .. }
            | ChangeEvent::EntityDeleted { channel, .. }
            | ChangeEvent::LinkAdded { channel, .. }
            | ChangeEvent::LinkUpdated { channel, .. }
            | ChangeEvent::LinkDeleted { channel, .. }
            | ChangeEvent::FieldSetUpdated { channel, .. }
            | ChangeEvent::SpecificationFieldChanged { channel, .. }
            | ChangeEvent::Publish { channel } => *channel,
        }
    }

    /// Connector event kind reported for this change
    pub fn kind(&self) -> EventKind {
        match self {
            ChangeEvent::EntityAdded { .. } => EventKind::EntityAdded,
            ChangeEvent::EntityUpdated { .. }
            | ChangeEvent::FieldSetUpdated { .. }
            | ChangeEvent::SpecificationFieldChanged { .. } => EventKind::EntityUpdated,
            ChangeEvent::EntityDeleted { .. } => EventKind::EntityDeleted,
            ChangeEvent::LinkAdded { .. } => EventKind::LinkAdded,
            ChangeEvent::LinkUpdated { .. } => EventKind::LinkUpdated,
            ChangeEvent::LinkDeleted { .. } => EventKind::LinkDeleted,
            ChangeEvent::Publish { .. } => EventKind::Publish,
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ChangeEvent::EntityAdded { entity_id, .. } => format!("entity {} added", entity_id),
            ChangeEvent::EntityUpdated { entity_id, .. } => format!("entity {} updated", entity_id),
            ChangeEvent::EntityDeleted { entity, .. } => format!("{} {} deleted", entity.kind, entity.id),
            ChangeEvent::LinkAdded { source_id, target_id, link_type, .. } => {
                format!("link {} {} -> {} added", link_type, source_id, target_id)
            }
            ChangeEvent::LinkUpdated { source_id, target_id, link_type, .. } => {
                format!("link {} {} -> {} updated", link_type, source_id, target_id)
            }
            ChangeEvent::LinkDeleted { source_id, target_id, link_type, .. } => {
                format!("link {} {} -> {} deleted", link_type, source_id, target_id)
            }
            ChangeEvent::FieldSetUpdated { entity_id, .. } => format!("field set of entity {} updated", entity_id),
            ChangeEvent::SpecificationFieldChanged { entity_id, field, .. } => {
                format!("specification field {} of entity {} changed", field, entity_id)
            }
            ChangeEvent::Publish { channel } => format!("channel {} published", channel),
        }
    }

    fn completion_kind(&self) -> CompletionKind {
        match self {
            ChangeEvent::EntityDeleted { .. } | ChangeEvent::LinkDeleted { .. } => CompletionKind::DeleteCompleted,
            _ => CompletionKind::ImportUpdateCompleted,
        }
    }
}

/// Result of routing one event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    /// The event does not concern the configured channel
    Ignored { reason: String },
    Completed {
        event: EventKind,
        documents_sent: usize,
        resources_included: bool,
    },
}

#[derive(Debug, Default, Clone, Copy)]
struct Handled {
    documents_sent: usize,
    resources_included: bool,
}

impl From<AddOutcome> for Handled {
    fn from(outcome: AddOutcome) -> Self {
        Self {
            documents_sent: outcome.documents_sent,
            resources_included: outcome.resources_included,
        }
    }
}

impl From<DeleteOutcome> for Handled {
    fn from(outcome: DeleteOutcome) -> Self {
        Self {
            documents_sent: outcome.documents_sent,
            resources_included: outcome.resources_included,
        }
    }
}

/// Dispatches change events to the propagators, one operation per event
pub struct ChangeRouter<'a> {
    data: &'a dyn DataService,
    channels: &'a dyn ChannelService,
    config: &'a Config,
    events: &'a dyn EventSink,
}

impl<'a> ChangeRouter<'a> {
    pub fn new(
        data: &'a dyn DataService,
        channels: &'a dyn ChannelService,
        config: &'a Config,
        events: &'a dyn EventSink,
    ) -> Self {
        Self {
            data,
            channels,
            config,
            events,
        }
    }

    /// Handle one event: check the channel, propagate, notify the target
    pub fn handle(&self, event: &ChangeEvent, transport: &mut dyn Transport) -> Result<RouteOutcome, SyncError> {
        let channel = event.channel();
        if let Some(configured) = self.config.channel_id {
            if configured != channel {
                let reason = SyncError::ChannelMismatch {
                    event: channel,
                    configured,
                }
                .to_string();
                info!(channel_id = %channel, "{}", reason);
                return Ok(RouteOutcome::Ignored { reason });
            }
        }

        let reporter = EventReporter::start(self.events, event.kind(), format!("Handling {}", event.describe()));
        debug!(session = %reporter.session(), event = %event.describe(), "handling event");
        match self.run(event, transport, &reporter) {
            Ok(handled) => {
                reporter.finish(format!("Done with {}", event.describe()));
                Ok(RouteOutcome::Completed {
                    event: event.kind(),
                    documents_sent: handled.documents_sent,
                    resources_included: handled.resources_included,
                })
            }
            Err(e) => {
                error!(session = %reporter.session(), channel_id = %channel, error = %e, "event handling failed");
                reporter.fail(format!("Failed to handle {}: {}", event.describe(), e));
                Err(e)
            }
        }
    }

    fn run(
        &self,
        event: &ChangeEvent,
        transport: &mut dyn Transport,
        reporter: &EventReporter,
    ) -> Result<Handled, SyncError> {
        let channel = event.channel();
        let mut ctx = match event {
            ChangeEvent::EntityDeleted { entity, .. }
                if entity.id == channel && entity.kind == EntityKind::Channel =>
            {
                OperationContext::detached(self.data, self.channels, self.config, entity.clone())?
            }
            _ => OperationContext::open(self.data, self.channels, self.config, channel)?,
        };
        reporter.update("Structure cache ready", 11);

        let handled = match event {
            ChangeEvent::EntityAdded { entity_id, .. } => self.entity_added(&mut ctx, transport, *entity_id, reporter)?,
            ChangeEvent::EntityUpdated {
                entity_id,
                changed_fields,
                ..
            } => self.entity_updated(&mut ctx, transport, *entity_id, changed_fields, reporter)?,
            ChangeEvent::EntityDeleted { entity, .. } => {
                reporter.update(format!("Deleting {} {}", entity.kind, entity.id), 25);
                delete(&mut ctx, transport, None, entity, None)?.into()
            }
            ChangeEvent::LinkAdded {
                source_id,
                target_id,
                link_type,
                ..
            } => self.link_added(&mut ctx, transport, *source_id, *target_id, link_type, false, reporter)?,
            ChangeEvent::LinkUpdated {
                source_id,
                target_id,
                link_type,
                ..
            } => self.link_added(&mut ctx, transport, *source_id, *target_id, link_type, true, reporter)?,
            ChangeEvent::LinkDeleted {
                source_id,
                target_id,
                link_type,
                ..
            } => self.link_deleted(&mut ctx, transport, *source_id, *target_id, link_type, reporter)?,
            ChangeEvent::FieldSetUpdated { entity_id, .. } => {
                self.entity_updated(&mut ctx, transport, *entity_id, &[], reporter)?
            }
            ChangeEvent::SpecificationFieldChanged { entity_id, field, .. } => {
                self.entity_updated(&mut ctx, transport, *entity_id, std::slice::from_ref(field), reporter)?
            }
            ChangeEvent::Publish { .. } => self.publish(&mut ctx, transport, reporter)?,
        };
        reporter.update("Propagation done", 75);

        transport.notify(
            ctx.identity(),
            &Completion {
                kind: event.completion_kind(),
                event: event.kind(),
                resources_included: handled.resources_included,
            },
        )?;
        ctx.close();
        Ok(handled)
    }

    fn entity_added(
        &self,
        ctx: &mut OperationContext,
        transport: &mut dyn Transport,
        entity_id: EntityId,
        reporter: &EventReporter,
    ) -> Result<Handled, SyncError> {
        let rows = ctx.cache.structure_for_entity(entity_id)?;
        if rows.is_empty() {
            info!(entity_id = %entity_id, "added entity is not part of the channel, nothing to do");
            return Ok(Handled::default());
        }
        let scope = with_descendants(ctx, rows)?;
        reporter.update(format!("Adding {} structure entities", scope.len()), 25);
        let outcome = add(ctx, transport, &scope, &AddOptions::default())?;
        reporter.update("Catalog updated", 50);
        Ok(outcome.into())
    }

    #[allow(clippy::too_many_arguments)]
    fn link_added(
        &self,
        ctx: &mut OperationContext,
        transport: &mut dyn Transport,
        source_id: EntityId,
        target_id: EntityId,
        link_type: &str,
        updated: bool,
        reporter: &EventReporter,
    ) -> Result<Handled, SyncError> {
        let rows: Vec<StructureEntity> = ctx
            .cache
            .entity_in_channel_with_parent(target_id, source_id)?
            .into_iter()
            .filter(|row| row.link_type.as_deref().map_or(true, |lt| lt == link_type))
            .collect();
        if rows.is_empty() {
            if updated {
                return Err(SyncError::StructureNotFound {
                    entity_id: target_id,
                    parent_id: source_id,
                });
            }
            info!(source_id = %source_id, target_id = %target_id, link_type, "link is outside the channel, nothing to do");
            return Ok(Handled::default());
        }
        let scope = with_descendants(ctx, rows)?;
        reporter.update(format!("Adding {} structure entities", scope.len()), 25);
        let outcome = add(ctx, transport, &scope, &AddOptions::default())?;
        reporter.update("Catalog updated", 50);
        Ok(outcome.into())
    }

    fn link_deleted(
        &self,
        ctx: &mut OperationContext,
        transport: &mut dyn Transport,
        source_id: EntityId,
        target_id: EntityId,
        link_type: &str,
        reporter: &EventReporter,
    ) -> Result<Handled, SyncError> {
        if source_id != ctx.channel_id() && !ctx.cache.entity_exists_in_channel(source_id)? {
            info!(source_id = %source_id, link_type, "link source is not in the channel, nothing to do");
            return Ok(Handled::default());
        }
        let Some(target) = ctx.cache.find_entity(target_id, LoadLevel::DataAndLinks)? else {
            warn!(target_id = %target_id, "link target no longer exists, nothing to unlink");
            return Ok(Handled::default());
        };
        reporter.update(format!("Unlinking {} {}", target.kind, target.id), 25);
        let outcome = delete(ctx, transport, Some(source_id), &target, Some(link_type))?;
        reporter.update("Catalog updated", 50);
        Ok(outcome.into())
    }

    fn entity_updated(
        &self,
        ctx: &mut OperationContext,
        transport: &mut dyn Transport,
        entity_id: EntityId,
        changed_fields: &[String],
        reporter: &EventReporter,
    ) -> Result<Handled, SyncError> {
        if entity_id == ctx.channel_id() {
            debug!(entity_id = %entity_id, "channel entity updated, nothing to propagate");
            return Ok(Handled::default());
        }
        let Some(entity) = ctx.cache.find_entity(entity_id, LoadLevel::DataAndLinks)? else {
            warn!(entity_id = %entity_id, "updated entity not found");
            return Ok(Handled::default());
        };
        if !entity.is_link_entity && !ctx.cache.entity_exists_in_channel(entity_id)? {
            info!(entity_id = %entity_id, "updated entity is not part of the channel, nothing to do");
            return Ok(Handled::default());
        }
        reporter.update(format!("Updating {} {}", entity.kind, entity.id), 25);

        let config = ctx.config();
        let handled = if entity.is_link_entity {
            self.link_entity_updated(ctx, transport, &entity)?
        } else {
            match entity.kind {
                EntityKind::Resource => self.resource_updated(ctx, transport, &entity)?,
                EntityKind::ChannelNode => {
                    let rows = ctx.cache.structure_for_entity(entity_id)?;
                    let scope = with_descendants(ctx, rows)?;
                    add(ctx, transport, &scope, &AddOptions::default())?.into()
                }
                EntityKind::Item
                    if config.items_to_skus && changed_fields.iter().any(|f| *f == config.sku_field) =>
                {
                    let mut handled = self.skus_updated(ctx, transport, &entity)?;
                    if changed_fields.iter().any(|f| *f != config.sku_field) {
                        let more = self.generic_update(ctx, transport, &entity, changed_fields)?;
                        handled.documents_sent += more.documents_sent;
                        handled.resources_included |= more.resources_included;
                    }
                    handled
                }
                _ => self.generic_update(ctx, transport, &entity, changed_fields)?,
            }
        };
        reporter.update("Catalog updated", 50);
        Ok(handled)
    }

    /// Re-send the entity; relations only when its code field changed
    fn generic_update(
        &self,
        ctx: &mut OperationContext,
        transport: &mut dyn Transport,
        entity: &Entity,
        changed_fields: &[String],
    ) -> Result<Handled, SyncError> {
        let rows = ctx.cache.structure_for_entity(entity.id)?;
        let include_relations = ctx
            .config()
            .code_field(&entity.kind)
            .is_some_and(|field| changed_fields.iter().any(|f| f == field));
        let options = AddOptions {
            include_relations,
            sku_filter: None,
        };
        Ok(add(ctx, transport, &rows, &options)?.into())
    }

    /// Diff the SKU field against its previous revision: removed SKUs are
    /// deleted, added SKUs are projected, unchanged ones are left alone.
    fn skus_updated(
        &self,
        ctx: &mut OperationContext,
        transport: &mut dyn Transport,
        item: &Entity,
    ) -> Result<Handled, SyncError> {
        let config = ctx.config();
        let data = ctx.cache.data();
        let current = match data.field(item.id, &config.sku_field) {
            Ok(field) => Some(field),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e.into()),
        };
        let previous = match current.as_ref().and_then(|f| f.revision.checked_sub(1)) {
            Some(revision) => data
                .field_history(item.id, &config.sku_field)?
                .into_iter()
                .find(|f| f.revision == revision),
            None => None,
        };
        if previous.is_none() {
            debug!(entity_id = %item.id, "no previous SKU revision, every SKU counts as added");
        }
        let diff = diff_skus(
            previous.as_ref().and_then(Field::text).unwrap_or_default(),
            current.as_ref().and_then(Field::text).unwrap_or_default(),
        );
        if diff.is_empty() {
            info!(entity_id = %item.id, "SKU list unchanged");
            return Ok(Handled::default());
        }

        let rows = ctx.cache.structure_for_entity(item.id)?;
        let mut handled = Handled::default();
        if !diff.removed.is_empty() {
            let parent = rows.first().and_then(|row| row.parent_id);
            let mut doc = ActionDocument::new(Action::Deleted, parent_lineage(ctx, parent)?);
            for sku in &diff.removed {
                doc.push(Mutation::DeleteEntry { code: config.code(sku) });
            }
            info!(entity_id = %item.id, removed = ?diff.removed, "deleting removed SKUs");
            transport.import(ctx.identity(), &Document::Action(doc))?;
            handled.documents_sent += 1;
        }
        if !diff.added.is_empty() {
            info!(entity_id = %item.id, added = ?diff.added, "adding new SKUs");
            let options = AddOptions {
                include_relations: true,
                sku_filter: Some(diff.added.clone()),
            };
            let outcome = add(ctx, transport, &rows, &options)?;
            handled.documents_sent += outcome.documents_sent;
            handled.resources_included |= outcome.resources_included;
        }
        Ok(handled)
    }

    fn resource_updated(
        &self,
        ctx: &mut OperationContext,
        transport: &mut dyn Transport,
        resource: &Entity,
    ) -> Result<Handled, SyncError> {
        let config = ctx.config();
        let mut parents: Vec<String> = Vec::new();
        for location in ctx.cache.resource_locations(resource.id)? {
            let Some(parent) = location.parent_id else {
                continue;
            };
            for code in parent_codes(ctx, parent)? {
                if !parents.contains(&code) {
                    parents.push(code);
                }
            }
        }
        let doc = ResourceDocument {
            resources: vec![resource_element(
                Some(resource),
                config.code(resource.id),
                ResourceAction::Updated,
                parents,
                config,
            )],
        };
        transport.import(ctx.identity(), &Document::Resources(doc))?;
        Ok(Handled {
            documents_sent: 1,
            resources_included: true,
        })
    }

    fn link_entity_updated(
        &self,
        ctx: &mut OperationContext,
        transport: &mut dyn Transport,
        link_entity: &Entity,
    ) -> Result<Handled, SyncError> {
        let config = ctx.config();
        let links = ctx.cache.data().links_for_link_entity(link_entity.id)?;
        let Some(link) = links.first() else {
            info!(entity_id = %link_entity.id, "link entity is not used by any link");
            return Ok(Handled::default());
        };
        let mut doc = ActionDocument::new(Action::Updated, parent_lineage(ctx, None)?);
        doc.push(Mutation::UpdateLinkEntity {
            link_entity_code: config.code(link_entity.id),
            source_code: config.code(link.source.id),
            meta_fields: meta_fields(link_entity, config),
        });
        transport.import(ctx.identity(), &Document::Action(doc))?;
        Ok(Handled {
            documents_sent: 1,
            resources_included: false,
        })
    }

    fn publish(
        &self,
        ctx: &mut OperationContext,
        transport: &mut dyn Transport,
        reporter: &EventReporter,
    ) -> Result<Handled, SyncError> {
        let mut kinds = ctx.config().export_entity_types.clone();
        if !kinds.contains(&EntityKind::Resource) {
            kinds.push(EntityKind::Resource);
        }
        let rows = ctx.cache.all_structure_entities(&kinds)?;
        reporter.update(format!("Publishing {} structure entities", rows.len()), 25);
        let outcome = add(ctx, transport, &rows, &AddOptions::default())?;
        reporter.update("Catalog published", 50);
        Ok(outcome.into())
    }
}

/// The given rows followed by every row below them
fn with_descendants(ctx: &mut OperationContext, rows: Vec<StructureEntity>) -> Result<Vec<StructureEntity>, SyncError> {
    let mut scope = rows.clone();
    for row in &rows {
        scope.extend(ctx.cache.children_from_path(&row.path)?);
    }
    Ok(scope)
}
