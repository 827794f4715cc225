//! Per-operation context: the channel, its identity in the target and the cache

use std::rc::Rc;

use tracing::debug;

use crate::core::assembly::entity_name;
use crate::core::config::Config;
use crate::core::entity::Entity;
use crate::core::identity::{EntityId, EntityKind, LoadLevel};
use crate::core::source::{ChannelService, DataService, SourceError};
use crate::core::transport::ChannelIdentity;
use crate::sync::cache::{CacheStats, StructureCache};
use crate::sync::SyncError;

/// Everything one propagation needs; built when an event arrives and
/// dropped when it has been handled.
pub struct OperationContext<'a> {
    pub cache: StructureCache<'a>,
    channel: Rc<Entity>,
    identity: ChannelIdentity,
}

impl<'a> OperationContext<'a> {
    /// Load the channel and start with an empty cache
    pub fn open(
        data: &'a dyn DataService,
        channels: &'a dyn ChannelService,
        config: &'a Config,
        channel_id: EntityId,
    ) -> Result<Self, SyncError> {
        let mut cache = StructureCache::new(data, channels, config, channel_id)?;
        let channel = match cache.entity(channel_id, LoadLevel::DataAndLinks) {
            Ok(channel) => channel,
            Err(SourceError::NotFound(_)) => return Err(SyncError::ChannelNotFound(channel_id)),
            Err(e) => return Err(e.into()),
        };
        if channel.kind != EntityKind::Channel {
            return Err(SyncError::NotAChannel(channel_id));
        }
        let identity = ChannelIdentity::new(channel_id, entity_name(&channel, config));
        debug!(channel = %channel_id, name = %identity.name, "operation context opened");
        Ok(Self {
            cache,
            channel,
            identity,
        })
    }

    /// Context for a channel that is already gone from the source, built
    /// from its last known state
    pub fn detached(
        data: &'a dyn DataService,
        channels: &'a dyn ChannelService,
        config: &'a Config,
        channel: Entity,
    ) -> Result<Self, SyncError> {
        if channel.kind != EntityKind::Channel {
            return Err(SyncError::NotAChannel(channel.id));
        }
        let mut cache = StructureCache::new(data, channels, config, channel.id)?;
        let identity = ChannelIdentity::new(channel.id, entity_name(&channel, config));
        let channel = cache.remember(channel);
        Ok(Self {
            cache,
            channel,
            identity,
        })
    }

    pub fn channel(&self) -> &Entity {
        &self.channel
    }

    pub fn channel_id(&self) -> EntityId {
        self.channel.id
    }

    pub fn identity(&self) -> &ChannelIdentity {
        &self.identity
    }

    pub fn config(&self) -> &'a Config {
        self.cache.config()
    }

    /// Flush the cache and report what it did
    pub fn close(mut self) -> CacheStats {
        let stats = self.cache.stats();
        self.cache.flush();
        debug!(
            hits = stats.entity_hits,
            fetches = stats.entity_fetches,
            structure = stats.structure_fetches,
            "operation context closed"
        );
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::SnapshotSource;

    #[test]
    fn test_open_uses_channel_name() {
        let src = SnapshotSource::new(EntityId::new(1)).with_field(1, "Name", "Web shop");
        let config = Config {
            epi_name_fields: vec!["Name".into()],
            ..Config::default()
        };
        let ctx = OperationContext::open(&src, &src, &config, EntityId::new(1)).unwrap();
        assert_eq!(ctx.identity().name, "Web shop");
        assert_eq!(ctx.channel_id(), EntityId::new(1));
    }

    #[test]
    fn test_open_rejects_missing_or_wrong_kind() {
        let src = SnapshotSource::new(EntityId::new(1)).with_entity(5, EntityKind::Product);
        let config = Config::default();
        assert!(matches!(
            OperationContext::open(&src, &src, &config, EntityId::new(9)),
            Err(SyncError::ChannelNotFound(_))
        ));
        assert!(matches!(
            OperationContext::open(&src, &src, &config, EntityId::new(5)),
            Err(SyncError::NotAChannel(_))
        ));
    }

    #[test]
    fn test_detached_context_for_deleted_channel() {
        let src = SnapshotSource::new(EntityId::new(1));
        let config = Config::default();
        let gone = Entity::new(EntityId::new(7), EntityKind::Channel);
        let ctx = OperationContext::detached(&src, &src, &config, gone).unwrap();
        assert_eq!(ctx.channel_id(), EntityId::new(7));
        assert_eq!(ctx.identity().name, "7");
    }
}
