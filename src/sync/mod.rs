//! Incremental synchronization engine
//!
//! A change event enters through the [`router::ChangeRouter`], which opens an
//! [`context::OperationContext`] (owning a fresh [`cache::StructureCache`]),
//! works out the affected part of the channel with the [`hierarchy`]
//! functions and runs either the [`add`] or the [`delete`] propagator.

pub mod add;
pub mod cache;
pub mod context;
pub mod delete;
pub mod hierarchy;
pub mod router;

use miette::Diagnostic;
use thiserror::Error;

use crate::core::entity::PathError;
use crate::core::identity::EntityId;
use crate::core::source::SourceError;
use crate::core::transport::TransportError;

pub use add::{add, AddOptions, AddOutcome};
pub use cache::{CacheStats, StructureCache};
pub use context::OperationContext;
pub use delete::{delete, DeleteOutcome};
pub use router::{ChangeEvent, ChangeRouter, RouteOutcome};

/// Errors raised by a synchronization operation
#[derive(Debug, Error, Diagnostic)]
pub enum SyncError {
    #[error("Source error: {0}")]
    #[diagnostic(code(catsync::sync::source))]
    Source(#[from] SourceError),

    #[error("Transport error: {0}")]
    #[diagnostic(
        code(catsync::sync::transport),
        help("the operation was aborted; documents already accepted by the target are not rolled back")
    )]
    Transport(#[from] TransportError),

    #[error("Channel {0} not found in the source system")]
    #[diagnostic(code(catsync::sync::channel_not_found))]
    ChannelNotFound(EntityId),

    #[error("Entity {0} is not a channel")]
    #[diagnostic(code(catsync::sync::not_a_channel))]
    NotAChannel(EntityId),

    #[error("Event for channel {event} does not match configured channel {configured}")]
    #[diagnostic(code(catsync::sync::channel_mismatch))]
    ChannelMismatch { event: EntityId, configured: EntityId },

    #[error(transparent)]
    #[diagnostic(code(catsync::sync::malformed_path))]
    MalformedPath(#[from] PathError),

    #[error("Entity {entity_id} has no position under {parent_id} in the channel")]
    #[diagnostic(code(catsync::sync::structure_not_found))]
    StructureNotFound {
        entity_id: EntityId,
        parent_id: EntityId,
    },

    #[error("Delete recursion exceeded depth {limit} at entity {entity_id}")]
    #[diagnostic(
        code(catsync::sync::depth_exceeded),
        help("raise max_delete_depth if the hierarchy is genuinely this deep")
    )]
    DepthExceeded { limit: usize, entity_id: EntityId },
}

impl SyncError {
    /// Whether the error stops the whole operation rather than one branch
    pub fn is_fatal(&self) -> bool {
        matches!(self, SyncError::Transport(_))
    }
}
