//! Configuration management with layered hierarchy

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::core::identity::{EntityId, EntityKind};
use crate::core::links::LinkTypeDef;

/// Directory holding project-local configuration
pub const PROJECT_DIR: &str = ".catsync";

/// Errors raised while loading configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid value for {var}: '{value}'")]
    InvalidEnv { var: String, value: String },
}

/// Connector configuration with layered hierarchy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Channel handled by this connector; events for other channels are ignored
    pub channel_id: Option<EntityId>,

    /// Prefix prepended to every code sent to the catalog
    pub channel_prefix: String,

    /// Expand items into one entry per SKU
    pub items_to_skus: bool,

    /// With `items_to_skus`, also keep the item itself as an entry
    pub use_three_levels: bool,

    /// Keep structure rows reachable only through associations
    pub force_include_linked_content: bool,

    /// Entity kinds fetched for a channel-wide structure
    pub export_entity_types: Vec<EntityKind>,

    pub bundle_entity_types: Vec<EntityKind>,
    pub package_entity_types: Vec<EntityKind>,
    pub dynamic_package_entity_types: Vec<EntityKind>,

    /// Field holding the SKU list of an item
    pub sku_field: String,

    /// Per entity kind, the field carrying the catalog code
    pub epi_code_fields: BTreeMap<String, String>,

    /// Fields tried in order for an entry or node name
    pub epi_name_fields: Vec<String>,

    /// Link-type definitions replacing those of the source system
    pub link_types: Vec<LinkTypeDef>,

    /// Catalog language to source language
    pub language_mapping: BTreeMap<String, String>,

    pub default_language: String,
    pub default_currency: String,

    /// Recursion cap for the delete walk
    pub max_delete_depth: usize,

    /// Directory where the outbox transport writes documents
    pub outbox: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            channel_id: None,
            channel_prefix: String::new(),
            items_to_skus: false,
            use_three_levels: false,
            force_include_linked_content: false,
            export_entity_types: vec![
                EntityKind::Channel,
                EntityKind::ChannelNode,
                EntityKind::Product,
                EntityKind::Item,
                EntityKind::Bundle,
                EntityKind::Package,
                EntityKind::DynamicPackage,
            ],
            bundle_entity_types: Vec::new(),
            package_entity_types: Vec::new(),
            dynamic_package_entity_types: Vec::new(),
            sku_field: "SKUs".to_string(),
            epi_code_fields: BTreeMap::new(),
            epi_name_fields: Vec::new(),
            link_types: Vec::new(),
            language_mapping: BTreeMap::new(),
            default_language: "en".to_string(),
            default_currency: "USD".to_string(),
            max_delete_depth: 64,
            outbox: None,
        }
    }
}

/// One configuration layer; unset keys leave lower layers untouched
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct ConfigLayer {
    channel_id: Option<EntityId>,
    channel_prefix: Option<String>,
    items_to_skus: Option<bool>,
    use_three_levels: Option<bool>,
    force_include_linked_content: Option<bool>,
    export_entity_types: Option<Vec<EntityKind>>,
    bundle_entity_types: Option<Vec<EntityKind>>,
    package_entity_types: Option<Vec<EntityKind>>,
    dynamic_package_entity_types: Option<Vec<EntityKind>>,
    sku_field: Option<String>,
    epi_code_fields: Option<BTreeMap<String, String>>,
    epi_name_fields: Option<Vec<String>>,
    link_types: Option<Vec<LinkTypeDef>>,
    language_mapping: Option<BTreeMap<String, String>>,
    default_language: Option<String>,
    default_currency: Option<String>,
    max_delete_depth: Option<usize>,
    outbox: Option<PathBuf>,
}

impl Config {
    /// Load configuration from all sources, merging in priority order.
    ///
    /// `explicit` replaces the project file lookup and must exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Config::default();

        // 1. Built-in defaults (already in Default impl)

        // 2. Global user config (~/.config/catsync/config.yaml)
        if let Some(global_path) = Self::global_config_path() {
            if global_path.exists() {
                match Self::read_layer(&global_path) {
                    Ok(layer) => config.merge(layer),
                    Err(e) => tracing::warn!("Ignoring global config: {}", e),
                }
            }
        }

        // 3. Project config (.catsync/config.yaml) or --config
        match explicit {
            Some(path) => {
                if !path.exists() {
                    return Err(ConfigError::NotFound(path.to_path_buf()));
                }
                config.merge(Self::read_layer(path)?);
            }
            None => {
                let project_path = Path::new(PROJECT_DIR).join("config.yaml");
                if project_path.exists() {
                    config.merge(Self::read_layer(&project_path)?);
                }
            }
        }

        // 4. Environment variables
        config.apply_env(|var| std::env::var(var).ok())?;

        Ok(config)
    }

    /// Parse a configuration from YAML text on top of the defaults
    pub fn from_yaml_str(contents: &str) -> Result<Self, ConfigError> {
        let layer = serde_yml::from_str::<ConfigLayer>(contents).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            message: e.to_string(),
        })?;
        let mut config = Config::default();
        config.merge(layer);
        Ok(config)
    }

    /// Get the path to the global config file
    pub fn global_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "catsync")
            .map(|dirs| dirs.config_dir().join("config.yaml"))
    }

    fn read_layer(path: &Path) -> Result<ConfigLayer, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        // An empty file parses as null
        if contents.trim().is_empty() {
            return Ok(ConfigLayer::default());
        }
        serde_yml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Apply `CATSYNC_*` variables as read by `lookup`
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("CATSYNC_CHANNEL_ID") {
            let id = value.parse::<EntityId>().map_err(|_| ConfigError::InvalidEnv {
                var: "CATSYNC_CHANNEL_ID".to_string(),
                value: value.clone(),
            })?;
            self.channel_id = Some(id);
        }
        if let Some(prefix) = lookup("CATSYNC_CHANNEL_PREFIX") {
            self.channel_prefix = prefix;
        }
        if let Some(value) = lookup("CATSYNC_ITEMS_TO_SKUS") {
            self.items_to_skus = match value.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidEnv {
                        var: "CATSYNC_ITEMS_TO_SKUS".to_string(),
                        value,
                    })
                }
            };
        }
        Ok(())
    }

    /// Merge a layer into this config (the layer takes precedence)
    fn merge(&mut self, layer: ConfigLayer) {
        if layer.channel_id.is_some() {
            self.channel_id = layer.channel_id;
        }
        if let Some(v) = layer.channel_prefix {
            self.channel_prefix = v;
        }
        if let Some(v) = layer.items_to_skus {
            self.items_to_skus = v;
        }
        if let Some(v) = layer.use_three_levels {
            self.use_three_levels = v;
        }
        if let Some(v) = layer.force_include_linked_content {
            self.force_include_linked_content = v;
        }
        if let Some(v) = layer.export_entity_types {
            self.export_entity_types = v;
        }
        if let Some(v) = layer.bundle_entity_types {
            self.bundle_entity_types = v;
        }
        if let Some(v) = layer.package_entity_types {
            self.package_entity_types = v;
        }
        if let Some(v) = layer.dynamic_package_entity_types {
            self.dynamic_package_entity_types = v;
        }
        if let Some(v) = layer.sku_field {
            self.sku_field = v;
        }
        if let Some(v) = layer.epi_code_fields {
            self.epi_code_fields = v;
        }
        if let Some(v) = layer.epi_name_fields {
            self.epi_name_fields = v;
        }
        if let Some(v) = layer.link_types {
            self.link_types = v;
        }
        if let Some(v) = layer.language_mapping {
            self.language_mapping = v;
        }
        if let Some(v) = layer.default_language {
            self.default_language = v;
        }
        if let Some(v) = layer.default_currency {
            self.default_currency = v;
        }
        if let Some(v) = layer.max_delete_depth {
            self.max_delete_depth = v;
        }
        if layer.outbox.is_some() {
            self.outbox = layer.outbox;
        }
    }

    /// Catalog code for a source id (entity id or SKU id)
    pub fn code(&self, id: impl std::fmt::Display) -> String {
        format!("{}{}", self.channel_prefix, id)
    }

    /// Catalog entry type for a source entity kind
    pub fn entry_type(&self, kind: &EntityKind) -> &'static str {
        if *kind == EntityKind::Item {
            "Variation"
        } else if self.bundle_entity_types.contains(kind) || *kind == EntityKind::Bundle {
            "Bundle"
        } else if self.package_entity_types.contains(kind) || *kind == EntityKind::Package {
            "Package"
        } else if self.dynamic_package_entity_types.contains(kind)
            || *kind == EntityKind::DynamicPackage
        {
            "DynamicPackage"
        } else {
            "Product"
        }
    }

    /// Field carrying the catalog code for entities of `kind`, if configured
    pub fn code_field(&self, kind: &EntityKind) -> Option<&str> {
        self.epi_code_fields.get(kind.as_str()).map(String::as_str)
    }

    /// Catalog languages; the default language alone when no mapping is set
    pub fn languages(&self) -> Vec<(String, String)> {
        if self.language_mapping.is_empty() {
            vec![(self.default_language.clone(), self.default_language.clone())]
        } else {
            self.language_mapping
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        }
    }
}
