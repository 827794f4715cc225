//! Core module - value model and collaborator boundaries

pub mod assembly;
pub mod config;
pub mod document;
pub mod entity;
pub mod events;
pub mod identity;
pub mod links;
pub mod sku;
pub mod snapshot;
pub mod source;
pub mod transport;

pub use config::{Config, ConfigError};
pub use document::{Document, DocumentKind};
pub use entity::{Entity, Field, FieldValue, Link, StructureEntity};
pub use events::{ConnectorEvent, EventKind, EventSink, RecordingSink, TracingSink};
pub use identity::{EntityId, EntityKind, IdParseError, LoadLevel};
pub use links::{LinkClass, LinkTypeDef, LinkTypeRegistry};
pub use snapshot::SnapshotSource;
pub use source::{ChannelService, DataService, SourceError};
pub use transport::{OutboxTransport, RecordingTransport, Transport, TransportError};
