//! SKU fan-out: parsing the SKU list stored on an item and diffing revisions
//!
//! The SKU field holds a small XML fragment:
//!
//! ```text
//! <SKUs>
//!   <SKU id="A"><Name>Red</Name><SKUData><Color>red</Color></SKUData></SKU>
//!   <SKU id="B"/>
//! </SKUs>
//! ```

use regex::Regex;
use std::collections::BTreeSet;
use std::sync::LazyLock;

use crate::core::config::Config;
use crate::core::entity::Entity;

static SKU_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<SKU\b([^>]*?)(?:/>|>(.*?)</SKU>)"#).expect("Invalid SKU regex")
});

static ID_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"\bid\s*=\s*"([^"]*)""#).expect("Invalid id attribute regex"));

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?s)<Name>(.*?)</Name>"#).expect("Invalid name regex"));

static SKU_DATA_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<SKUData>(.*?)</SKUData>"#).expect("Invalid SKU data regex")
});

static DATA_ITEM_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)<([A-Za-z_][\w.-]*)>(.*?)</([A-Za-z_][\w.-]*)>"#)
        .expect("Invalid data item regex")
});

/// One SKU declared on an item
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sku {
    pub id: String,
    pub name: Option<String>,
    /// `<SKUData>` children as (element name, text)
    pub data: Vec<(String, String)>,
}

/// Parse the SKUs of a SKU field value; SKUs without an id are skipped
pub fn parse_skus(xml: &str) -> Vec<Sku> {
    let mut skus = Vec::new();
    for caps in SKU_RE.captures_iter(xml) {
        let attrs = caps.get(1).map_or("", |m| m.as_str());
        let Some(id) = ID_ATTR_RE
            .captures(attrs)
            .and_then(|c| c.get(1))
            .map(|m| unescape(m.as_str().trim()))
            .filter(|id| !id.is_empty())
        else {
            tracing::debug!("skipping SKU without id");
            continue;
        };

        let body = caps.get(2).map_or("", |m| m.as_str());
        let name = NAME_RE
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| unescape(m.as_str().trim()))
            .filter(|n| !n.is_empty());
        let data = SKU_DATA_RE
            .captures(body)
            .and_then(|c| c.get(1))
            .map(|m| {
                DATA_ITEM_RE
                    .captures_iter(m.as_str())
                    .filter(|c| c[1] == c[3])
                    .map(|c| (c[1].to_string(), unescape(c[2].trim())))
                    .collect()
            })
            .unwrap_or_default();

        skus.push(Sku { id, name, data });
    }
    skus
}

/// Parsed SKUs of an item, empty when the field is missing or blank
pub fn item_skus(item: &Entity, config: &Config) -> Vec<Sku> {
    match item.field(&config.sku_field) {
        Some(field) if !field.is_empty() => field.text().map(parse_skus).unwrap_or_default(),
        _ => Vec::new(),
    }
}

/// SKU ids present in only one of two revisions
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SkuDiff {
    pub added: Vec<String>,
    pub removed: Vec<String>,
}

impl SkuDiff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

/// Symmetric difference of SKU ids between two field values
pub fn diff_skus(old: &str, new: &str) -> SkuDiff {
    let old_ids: BTreeSet<String> = parse_skus(old).into_iter().map(|s| s.id).collect();
    let new_ids: BTreeSet<String> = parse_skus(new).into_iter().map(|s| s.id).collect();
    SkuDiff {
        added: new_ids.difference(&old_ids).cloned().collect(),
        removed: old_ids.difference(&new_ids).cloned().collect(),
    }
}

fn unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
