//! Link-type classification
//!
//! Every link type is exactly one of: a hierarchical relation, a link from
//! the channel (or a channel node) to its content, or an association. The
//! class is decided once when the registry is built and looked up from
//! then on.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use crate::core::identity::EntityKind;

/// Class of a link type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkClass {
    /// Parent/child relation between catalog entries (product to item, bundle to item)
    Relation,
    /// Link from the channel or a channel node to its content
    ChannelNodeLink,
    /// Non-hierarchical relation such as accessories or upsell
    Association,
}

impl LinkClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkClass::Relation => "relation",
            LinkClass::ChannelNodeLink => "channel_node_link",
            LinkClass::Association => "association",
        }
    }
}

impl fmt::Display for LinkClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for LinkClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relation" => Ok(LinkClass::Relation),
            "channel_node_link" | "channelnodelink" => Ok(LinkClass::ChannelNodeLink),
            "association" => Ok(LinkClass::Association),
            _ => Err(format!("Unknown link class: {}", s)),
        }
    }
}

/// Definition of a link type as known by the source system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkTypeDef {
    pub id: String,
    pub source: EntityKind,
    pub target: EntityKind,

    /// Explicit class; inferred from the end kinds when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class: Option<LinkClass>,

    /// Entity type of the link entities carried by links of this type
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link_entity_type: Option<String>,
}

impl LinkTypeDef {
    pub fn new(id: impl Into<String>, source: EntityKind, target: EntityKind) -> Self {
        Self {
            id: id.into(),
            source,
            target,
            class: None,
            link_entity_type: None,
        }
    }

    pub fn with_class(mut self, class: LinkClass) -> Self {
        self.class = Some(class);
        self
    }

    pub fn with_link_entity_type(mut self, entity_type: impl Into<String>) -> Self {
        self.link_entity_type = Some(entity_type.into());
        self
    }

    fn infer_class(&self) -> LinkClass {
        if self.source.is_structural() {
            LinkClass::ChannelNodeLink
        } else if self.target == EntityKind::Resource {
            LinkClass::Relation
        } else if self.source == self.target {
            LinkClass::Association
        } else {
            LinkClass::Relation
        }
    }
}

/// Classified link types, keyed by id
#[derive(Debug, Clone, Default)]
pub struct LinkTypeRegistry {
    types: BTreeMap<String, (LinkTypeDef, LinkClass)>,
}

impl LinkTypeRegistry {
    /// Build from the source system's definitions, with configured
    /// definitions replacing any source definition of the same id
    pub fn new(source: &[LinkTypeDef], overrides: &[LinkTypeDef]) -> Self {
        let mut types = BTreeMap::new();
        for def in source.iter().chain(overrides) {
            let class = def.class.unwrap_or_else(|| def.infer_class());
            types.insert(def.id.clone(), (def.clone(), class));
        }
        Self { types }
    }

    pub fn get(&self, id: &str) -> Option<&LinkTypeDef> {
        self.types.get(id).map(|(def, _)| def)
    }

    /// Class of a link type; unknown ids are treated as associations so
    /// they never count as hierarchy membership
    pub fn class(&self, id: &str) -> LinkClass {
        match self.types.get(id) {
            Some((_, class)) => *class,
            None => {
                tracing::debug!(link_type = id, "unknown link type, treating as association");
                LinkClass::Association
            }
        }
    }

    pub fn is_relation(&self, id: &str) -> bool {
        self.class(id) == LinkClass::Relation
    }

    pub fn is_channel_node_link(&self, id: &str) -> bool {
        self.class(id) == LinkClass::ChannelNodeLink
    }

    pub fn has_link_entity(&self, id: &str) -> bool {
        self.get(id).is_some_and(|def| def.link_entity_type.is_some())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&LinkTypeDef, LinkClass)> {
        self.types.values().map(|(def, class)| (def, *class))
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> LinkTypeRegistry {
        LinkTypeRegistry::new(
            &[
                LinkTypeDef::new("ChannelNodeProducts", EntityKind::ChannelNode, EntityKind::Product),
                LinkTypeDef::new("ProductItem", EntityKind::Product, EntityKind::Item),
                LinkTypeDef::new("ItemResource", EntityKind::Item, EntityKind::Resource),
                LinkTypeDef::new("ProductProduct", EntityKind::Product, EntityKind::Product)
                    .with_link_entity_type("Accessory"),
            ],
            &[],
        )
    }

    #[test]
    fn test_inferred_classes() {
        let reg = registry();
        assert_eq!(reg.class("ChannelNodeProducts"), LinkClass::ChannelNodeLink);
        assert_eq!(reg.class("ProductItem"), LinkClass::Relation);
        assert_eq!(reg.class("ItemResource"), LinkClass::Relation);
        assert_eq!(reg.class("ProductProduct"), LinkClass::Association);
    }

    #[test]
    fn test_override_replaces_source_definition() {
        let reg = LinkTypeRegistry::new(
            &[LinkTypeDef::new("ProductProduct", EntityKind::Product, EntityKind::Product)],
            &[LinkTypeDef::new("ProductProduct", EntityKind::Product, EntityKind::Product)
                .with_class(LinkClass::Relation)],
        );
        assert!(reg.is_relation("ProductProduct"));
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn test_unknown_link_type_is_association() {
        assert_eq!(registry().class("Nope"), LinkClass::Association);
    }

    #[test]
    fn test_link_entity_lookup() {
        let reg = registry();
        assert!(reg.has_link_entity("ProductProduct"));
        assert!(!reg.has_link_entity("ProductItem"));
        assert!(!reg.has_link_entity("Nope"));
    }

    #[test]
    fn test_link_class_from_str() {
        assert_eq!("Relation".parse::<LinkClass>().unwrap(), LinkClass::Relation);
        assert_eq!(
            "channel_node_link".parse::<LinkClass>().unwrap(),
            LinkClass::ChannelNodeLink
        );
        assert!("parent".parse::<LinkClass>().is_err());
    }
}
