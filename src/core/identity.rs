//! Entity identity: numeric ids, entity kinds and load levels

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identifier of an entity in the source system
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(u32);

impl EntityId {
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl From<u32> for EntityId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for EntityId {
    type Err = IdParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<u32>()
            .map(EntityId)
            .map_err(|_| IdParseError::InvalidId(s.to_string()))
    }
}

/// Errors that can occur when parsing identifiers
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IdParseError {
    #[error("Invalid entity id: '{0}'")]
    InvalidId(String),
}

/// Kind of an entity in the source hierarchy
///
/// Known kinds get their own variant; link-entity types and any custom
/// entity types configured in the source system land in `Other`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EntityKind {
    Channel,
    ChannelNode,
    Product,
    Item,
    Resource,
    Bundle,
    Package,
    DynamicPackage,
    Specification,
    Other(String),
}

impl EntityKind {
    pub fn as_str(&self) -> &str {
        match self {
            EntityKind::Channel => "Channel",
            EntityKind::ChannelNode => "ChannelNode",
            EntityKind::Product => "Product",
            EntityKind::Item => "Item",
            EntityKind::Resource => "Resource",
            EntityKind::Bundle => "Bundle",
            EntityKind::Package => "Package",
            EntityKind::DynamicPackage => "DynamicPackage",
            EntityKind::Specification => "Specification",
            EntityKind::Other(name) => name,
        }
    }

    /// Kinds that become nodes (or the catalog itself) in the target
    pub fn is_structural(&self) -> bool {
        matches!(self, EntityKind::Channel | EntityKind::ChannelNode)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&str> for EntityKind {
    fn from(s: &str) -> Self {
        match s {
            "Channel" => EntityKind::Channel,
            "ChannelNode" => EntityKind::ChannelNode,
            "Product" => EntityKind::Product,
            "Item" => EntityKind::Item,
            "Resource" => EntityKind::Resource,
            "Bundle" => EntityKind::Bundle,
            "Package" => EntityKind::Package,
            "DynamicPackage" => EntityKind::DynamicPackage,
            "Specification" => EntityKind::Specification,
            other => EntityKind::Other(other.to_string()),
        }
    }
}

impl From<String> for EntityKind {
    fn from(s: String) -> Self {
        EntityKind::from(s.as_str())
    }
}

impl From<EntityKind> for String {
    fn from(kind: EntityKind) -> Self {
        kind.as_str().to_string()
    }
}

/// How much of an entity is fetched from the source system.
///
/// Levels are ordered: a higher level always contains everything a lower
/// level does.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadLevel {
    /// Identity and kind only
    Shallow,
    /// Identity plus field data
    DataOnly,
    /// Field data plus inbound and outbound links
    DataAndLinks,
}

impl fmt::Display for LoadLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadLevel::Shallow => write!(f, "shallow"),
            LoadLevel::DataOnly => write!(f, "data_only"),
            LoadLevel::DataAndLinks => write!(f, "data_and_links"),
        }
    }
}
