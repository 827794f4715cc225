//! Hierarchy questions answered over structure rows
//!
//! Everything here is a pure function of the rows passed in.

use std::collections::{BTreeMap, HashSet};

use crate::core::entity::{parse_path, PathError, StructureEntity};
use crate::core::identity::EntityId;

/// Ancestor ids of a position, channel root first (excluding the entity itself)
pub fn parent_ids(row: &StructureEntity) -> Result<Vec<EntityId>, PathError> {
    let mut ids = row.path_ids()?;
    ids.pop();
    Ok(ids)
}

/// The parent along this particular path
pub fn parent_along_path(row: &StructureEntity) -> Result<Option<EntityId>, PathError> {
    Ok(parent_ids(row)?.last().copied())
}

/// Positions of `entity_id` reached from `parent_id` through `link_type`
pub fn find_in_structure<'r>(
    rows: &'r [StructureEntity],
    parent_id: EntityId,
    entity_id: EntityId,
    link_type: &str,
) -> Vec<&'r StructureEntity> {
    rows.iter()
        .filter(|row| {
            row.entity_id == entity_id
                && row.parent_id == Some(parent_id)
                && row.link_type.as_deref() == Some(link_type)
        })
        .collect()
}

/// For every channel node, whether `entity_rows` still place the entity
/// directly under it.
///
/// `entity_rows` are the current positions of the entity. A node with no
/// matching position maps to `false`.
pub fn should_exist_in_channel_nodes(
    channel_nodes: &[StructureEntity],
    entity_rows: &[StructureEntity],
) -> BTreeMap<EntityId, bool> {
    let parents: HashSet<EntityId> = entity_rows.iter().filter_map(|r| r.parent_id).collect();
    channel_nodes
        .iter()
        .map(|node| (node.entity_id, parents.contains(&node.entity_id)))
        .collect()
}

/// Rows forming the ancestry of `path`, root first; prefixes without a row are skipped
pub fn lineage_rows<'r>(rows: &'r [StructureEntity], path: &str) -> Vec<&'r StructureEntity> {
    let Some(ids) = parse_path(path) else {
        return Vec::new();
    };
    let mut prefix = String::new();
    let mut out = Vec::new();
    for id in ids {
        if !prefix.is_empty() {
            prefix.push('/');
        }
        prefix.push_str(&id.to_string());
        if let Some(row) = rows.iter().find(|r| r.path == prefix) {
            out.push(row);
        }
    }
    out
}

/// Drop rows with a path already seen, keeping the first occurrence
pub fn dedup_by_path(rows: Vec<StructureEntity>) -> Vec<StructureEntity> {
    let mut seen = HashSet::new();
    rows.into_iter()
        .filter(|row| seen.insert(row.path.clone()))
        .collect()
}

/// Order rows so every ancestor precedes its descendants
pub fn sort_parents_first(rows: &mut [StructureEntity]) {
    rows.sort_by_key(|row| row.path.matches('/').count());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::identity::EntityKind;

    fn row(id: u32, parent: Option<u32>, path: &str, kind: EntityKind, link: Option<&str>) -> StructureEntity {
        StructureEntity {
            entity_id: EntityId::new(id),
            parent_id: parent.map(EntityId::new),
            path: path.to_string(),
            kind,
            link_type: link.map(str::to_string),
            link_entity_id: None,
            sort_order: 0,
        }
    }

    fn rows() -> Vec<StructureEntity> {
        vec![
            row(1, None, "1", EntityKind::Channel, None),
            row(10, Some(1), "1/10", EntityKind::ChannelNode, Some("ChannelNodes")),
            row(11, Some(1), "1/11", EntityKind::ChannelNode, Some("ChannelNodes")),
            row(20, Some(10), "1/10/20", EntityKind::Product, Some("NodeProducts")),
            row(20, Some(11), "1/11/20", EntityKind::Product, Some("NodeProducts")),
            row(30, Some(20), "1/10/20/30", EntityKind::Item, Some("ProductItems")),
            row(30, Some(20), "1/11/20/30", EntityKind::Item, Some("ProductItems")),
        ]
    }

    #[test]
    fn test_parent_ids_and_parent_along_path() {
        let rows = rows();
        assert_eq!(
            parent_ids(&rows[5]).unwrap(),
            vec![EntityId::new(1), EntityId::new(10), EntityId::new(20)]
        );
        assert_eq!(parent_along_path(&rows[0]).unwrap(), None);
        assert_eq!(parent_along_path(&rows[4]).unwrap(), Some(EntityId::new(11)));
    }

    #[test]
    fn test_parent_ids_rejects_empty_segment() {
        let broken = row(10, Some(1), "1//10", EntityKind::ChannelNode, Some("ChannelNodes"));
        let err = parent_ids(&broken).unwrap_err();
        assert_eq!(err.entity_id, EntityId::new(10));
        assert!(parent_along_path(&broken).is_err());
    }

    #[test]
    fn test_find_in_structure_matches_link_type() {
        let rows = rows();
        assert_eq!(
            find_in_structure(&rows, EntityId::new(10), EntityId::new(20), "NodeProducts").len(),
            1
        );
        assert!(find_in_structure(&rows, EntityId::new(10), EntityId::new(20), "Other").is_empty());
    }

    #[test]
    fn test_should_exist_in_channel_nodes_uses_direct_parent() {
        let rows = rows();
        let nodes: Vec<StructureEntity> = rows
            .iter()
            .filter(|r| r.kind == EntityKind::ChannelNode)
            .cloned()
            .collect();
        let product_rows: Vec<StructureEntity> = rows
            .iter()
            .filter(|r| r.entity_id == EntityId::new(20) && r.parent_id == Some(EntityId::new(11)))
            .cloned()
            .collect();
        let membership = should_exist_in_channel_nodes(&nodes, &product_rows);
        assert_eq!(membership.get(&EntityId::new(10)), Some(&false));
        assert_eq!(membership.get(&EntityId::new(11)), Some(&true));
    }

    #[test]
    fn test_lineage_rows_root_first() {
        let rows = rows();
        let lineage: Vec<u32> = lineage_rows(&rows, "1/10/20/30")
            .iter()
            .map(|r| r.entity_id.get())
            .collect();
        assert_eq!(lineage, vec![1, 10, 20, 30]);
        assert!(lineage_rows(&rows, "bad//path").is_empty());
    }

    #[test]
    fn test_sort_and_dedup() {
        let mut rows = rows();
        rows.reverse();
        rows.push(rows[0].clone());
        let mut rows = dedup_by_path(rows);
        sort_parents_first(&mut rows);
        assert_eq!(rows.len(), 7);
        assert_eq!(rows[0].path, "1");
    }
}
