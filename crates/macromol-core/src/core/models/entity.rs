use super::hierarchy::FullId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::OnceLock;
use thiserror::Error;

/// Identifies a level of the structural hierarchy.
///
/// Every entity in a structure tree belongs to exactly one level:
/// Structure > Model > Chain > Residue > Atom.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Level {
    Structure,
    Model,
    Chain,
    Residue,
    Atom,
}

impl Level {
    /// Distance from the structure root; larger values are deeper.
    pub(crate) fn depth(self) -> u8 {
        match self {
            Level::Structure => 0,
            Level::Model => 1,
            Level::Chain => 2,
            Level::Residue => 3,
            Level::Atom => 4,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Level::Structure => "structure",
            Level::Model => "model",
            Level::Chain => "chain",
            Level::Residue => "residue",
            Level::Atom => "atom",
        };
        write!(f, "{}", name)
    }
}

/// Errors raised by tree mutations and lookups.
///
/// Structural conflicts (an id that already exists) are kept distinct from
/// lookup failures (an id that does not exist) so that callers can tell
/// "already present" apart from "not present".
#[derive(Debug, Error)]
pub enum HierarchyError {
    #[error("duplicate {level} id `{id}`")]
    DuplicateId { level: Level, id: String },

    #[error("{level} `{id}` not found")]
    NotFound { level: Level, id: String },

    #[error("duplicate disorder variant `{variant}` for {level} `{id}`")]
    DuplicateVariant {
        level: Level,
        id: String,
        variant: String,
    },

    #[error("unknown disorder variant `{variant}` for {level} `{id}`")]
    UnknownVariant {
        level: Level,
        id: String,
        variant: String,
    },

    #[error("entities span more than one hierarchy level ({first} and {second})")]
    HeterogeneousLevels { first: Level, second: Level },

    #[error("insertion position {position} is out of bounds for {len} children")]
    PositionOutOfBounds { position: usize, len: usize },
}

/// A typed annotation value attached to an entity.
///
/// Annotations are produced by external analysis tools (accessible surface
/// area, exposure metrics, and the like) and are never interpreted by this
/// library itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Annotation {
    Int(i64),
    Float(f64),
    Text(String),
    Vector(Vec<f64>),
}

/// The annotation bag carried by every hierarchy level.
pub type Annotations = HashMap<String, Annotation>;

/// Lazily populated full-id cache cell.
///
/// Population happens through a shared reference (`OnceLock`), so concurrent
/// read-only access is safe; invalidation requires exclusive access and is
/// driven by renames. Clones start cold so that deep copies never share or
/// inherit cached paths.
#[derive(Debug, Default)]
pub(crate) struct FullIdCache(OnceLock<FullId>);

impl Clone for FullIdCache {
    fn clone(&self) -> Self {
        FullIdCache::default()
    }
}

impl FullIdCache {
    pub(crate) fn get_or_init(&self, init: impl FnOnce() -> FullId) -> &FullId {
        self.0.get_or_init(init)
    }

    pub(crate) fn reset(&mut self) {
        self.0 = OnceLock::new();
    }
}

/// Ordered child storage shared by every level of the hierarchy.
///
/// Keeps children in insertion order next to an id index for O(1) lookup.
/// Invariant: every id in the index appears exactly once in the ordered
/// sequence and vice versa; no two children share an id. All mutations are
/// validated up front so a failed operation leaves the container untouched.
#[derive(Debug, Clone)]
pub(crate) struct Children<I, V> {
    entries: Vec<(I, V)>,
    index: HashMap<I, usize>,
}

impl<I, V> Default for Children<I, V> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }
}

impl<I, V> Children<I, V>
where
    I: Clone + Eq + Hash + fmt::Display,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, id: &I) -> bool {
        self.index.contains_key(id)
    }

    pub fn get(&self, id: &I) -> Option<&V> {
        self.index.get(id).map(|&pos| &self.entries[pos].1)
    }

    pub fn get_mut(&mut self, id: &I) -> Option<&mut V> {
        let pos = *self.index.get(id)?;
        Some(&mut self.entries[pos].1)
    }

    pub fn position(&self, id: &I) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = (&I, &V)> {
        self.entries.iter().map(|(id, v)| (id, v))
    }

    pub fn ids(&self) -> impl DoubleEndedIterator<Item = &I> {
        self.entries.iter().map(|(id, _)| id)
    }

    pub fn values(&self) -> impl DoubleEndedIterator<Item = &V> {
        self.entries.iter().map(|(_, v)| v)
    }

    /// Rejects a batch if it collides with existing children or contains
    /// internal duplicates. Called before any entry is inserted, so a
    /// failing batch leaves the container unchanged.
    pub fn validate_new_ids<'a>(
        &self,
        ids: impl Iterator<Item = &'a I>,
        level: Level,
    ) -> Result<(), HierarchyError>
    where
        I: 'a,
    {
        let mut seen: Vec<&I> = Vec::new();
        for id in ids {
            if self.contains(id) || seen.contains(&id) {
                return Err(HierarchyError::DuplicateId {
                    level,
                    id: id.to_string(),
                });
            }
            seen.push(id);
        }
        Ok(())
    }

    /// Appends an entry. The id must have been validated by the caller.
    pub fn push(&mut self, id: I, value: V) {
        self.index.insert(id.clone(), self.entries.len());
        self.entries.push((id, value));
    }

    /// Splices entries at `position`. Ids must have been validated.
    pub fn insert_at(
        &mut self,
        position: usize,
        items: Vec<(I, V)>,
    ) -> Result<(), HierarchyError> {
        if position > self.entries.len() {
            return Err(HierarchyError::PositionOutOfBounds {
                position,
                len: self.entries.len(),
            });
        }
        self.entries.splice(position..position, items);
        self.reindex();
        Ok(())
    }

    pub fn remove(&mut self, id: &I) -> Option<V> {
        let pos = self.index.remove(id)?;
        let (_, value) = self.entries.remove(pos);
        self.reindex();
        Some(value)
    }

    /// Atomically renames an entry: validates first, then updates both the
    /// ordered sequence and the index. On failure the container is unchanged.
    pub fn rename(&mut self, old: &I, new: I, level: Level) -> Result<(), HierarchyError> {
        if self.contains(&new) {
            return Err(HierarchyError::DuplicateId {
                level,
                id: new.to_string(),
            });
        }
        let pos = self
            .index
            .remove(old)
            .ok_or_else(|| HierarchyError::NotFound {
                level,
                id: old.to_string(),
            })?;
        self.index.insert(new.clone(), pos);
        self.entries[pos].0 = new;
        Ok(())
    }

    /// Replaces the value stored under an existing id, preserving its
    /// position in the ordered sequence.
    pub fn replace(&mut self, id: &I, value: V) -> Option<V> {
        let pos = *self.index.get(id)?;
        Some(std::mem::replace(&mut self.entries[pos].1, value))
    }

    fn reindex(&mut self) {
        self.index = self
            .entries
            .iter()
            .enumerate()
            .map(|(pos, (id, _))| (id.clone(), pos))
            .collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn filled() -> Children<String, u32> {
        let mut children = Children::new();
        children.push("a".to_string(), 1);
        children.push("b".to_string(), 2);
        children.push("c".to_string(), 3);
        children
    }

    #[test]
    fn push_preserves_insertion_order_and_lookup() {
        let children = filled();
        let ids: Vec<_> = children.ids().cloned().collect();
        assert_eq!(ids, vec!["a", "b", "c"]);
        assert_eq!(children.get(&"b".to_string()), Some(&2));
        assert_eq!(children.position(&"c".to_string()), Some(2));
    }

    #[test]
    fn validate_rejects_existing_and_batch_internal_duplicates() {
        let children = filled();
        let dup_existing = ["a".to_string(), "d".to_string()];
        let err = children
            .validate_new_ids(dup_existing.iter(), Level::Chain)
            .unwrap_err();
        assert!(matches!(err, HierarchyError::DuplicateId { .. }));

        let dup_internal = ["d".to_string(), "d".to_string()];
        let err = children
            .validate_new_ids(dup_internal.iter(), Level::Chain)
            .unwrap_err();
        assert!(matches!(err, HierarchyError::DuplicateId { .. }));

        let fresh = ["d".to_string(), "e".to_string()];
        assert!(children.validate_new_ids(fresh.iter(), Level::Chain).is_ok());
    }

    #[test]
    fn insert_at_splices_and_reindexes() {
        let mut children = filled();
        children
            .insert_at(1, vec![("x".to_string(), 9), ("y".to_string(), 8)])
            .unwrap();
        let ids: Vec<_> = children.ids().cloned().collect();
        assert_eq!(ids, vec!["a", "x", "y", "b", "c"]);
        assert_eq!(children.position(&"b".to_string()), Some(3));
    }

    #[test]
    fn insert_at_out_of_bounds_fails() {
        let mut children = filled();
        let err = children
            .insert_at(7, vec![("x".to_string(), 9)])
            .unwrap_err();
        assert!(matches!(err, HierarchyError::PositionOutOfBounds { .. }));
    }

    #[test]
    fn remove_drops_entry_and_reindexes() {
        let mut children = filled();
        assert_eq!(children.remove(&"a".to_string()), Some(1));
        assert!(children.remove(&"a".to_string()).is_none());
        assert_eq!(children.position(&"c".to_string()), Some(1));
        assert_eq!(children.len(), 2);
    }

    #[test]
    fn rename_is_atomic_on_collision() {
        let mut children = filled();
        let err = children
            .rename(&"a".to_string(), "b".to_string(), Level::Chain)
            .unwrap_err();
        assert!(matches!(err, HierarchyError::DuplicateId { .. }));
        // State unchanged after the failed rename.
        assert_eq!(children.get(&"a".to_string()), Some(&1));
        assert_eq!(children.get(&"b".to_string()), Some(&2));

        children
            .rename(&"a".to_string(), "z".to_string(), Level::Chain)
            .unwrap();
        assert!(children.get(&"a".to_string()).is_none());
        assert_eq!(children.get(&"z".to_string()), Some(&1));
        let ids: Vec<_> = children.ids().cloned().collect();
        assert_eq!(ids, vec!["z", "b", "c"]);
    }

    #[test]
    fn rename_missing_id_reports_not_found() {
        let mut children = filled();
        let err = children
            .rename(&"q".to_string(), "r".to_string(), Level::Residue)
            .unwrap_err();
        assert!(matches!(err, HierarchyError::NotFound { .. }));
    }

    #[test]
    fn replace_keeps_position() {
        let mut children = filled();
        assert_eq!(children.replace(&"b".to_string(), 20), Some(2));
        assert_eq!(children.get(&"b".to_string()), Some(&20));
        assert_eq!(children.position(&"b".to_string()), Some(1));
    }

    #[test]
    fn full_id_cache_clones_cold() {
        use crate::core::models::hierarchy::{FullId, IdPart};

        let cache = FullIdCache::default();
        let id = cache.get_or_init(|| FullId(vec![IdPart::Structure("1abc".into())]));
        assert_eq!(id.0.len(), 1);

        let copy = cache.clone();
        let fresh = copy.get_or_init(|| FullId(vec![IdPart::Structure("other".into())]));
        assert!(matches!(&fresh.0[0], IdPart::Structure(s) if s == "other"));
    }
}
