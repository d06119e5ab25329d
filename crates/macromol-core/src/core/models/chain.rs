use super::entity::{Annotations, Children, FullIdCache};
use super::ids::ModelKey;
use super::residue::{ResidueEntry, ResidueId};

/// A chain: an ordered collection of residue entries.
#[derive(Debug, Clone)]
pub struct Chain {
    /// Chain identifier (e.g. "A"). mmCIF asym ids may be longer than one
    /// character, so this is a string rather than a char.
    pub id: String,
    pub annotations: Annotations,
    pub(crate) parent: Option<ModelKey>,
    pub(crate) children: Children<ResidueId, ResidueEntry>,
    pub(crate) full_id: FullIdCache,
}

impl Chain {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            annotations: Annotations::new(),
            parent: None,
            children: Children::new(),
            full_id: FullIdCache::default(),
        }
    }

    /// The model this chain belongs to, if attached.
    pub fn parent(&self) -> Option<ModelKey> {
        self.parent
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn residue_ids(&self) -> impl Iterator<Item = &ResidueId> {
        self.children.ids()
    }

    pub fn residue_entry(&self, id: &ResidueId) -> Option<&ResidueEntry> {
        self.children.get(id)
    }

    pub fn residue_entry_mut(&mut self, id: &ResidueId) -> Option<&mut ResidueEntry> {
        self.children.get_mut(id)
    }

    /// Residue entries in insertion order.
    pub fn residue_entries(&self) -> impl Iterator<Item = (&ResidueId, &ResidueEntry)> {
        self.children.iter()
    }

    pub fn has_disordered_residues(&self) -> bool {
        self.children.values().any(ResidueEntry::is_disordered)
    }
}
