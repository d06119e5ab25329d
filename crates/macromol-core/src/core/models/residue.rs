use super::atom::AtomEntry;
use super::entity::{Annotations, Children, FullIdCache, HierarchyError, Level};
use super::ids::{ChainKey, ResidueKey};
use std::fmt;

/// Hetero classification of a residue.
///
/// Part of the residue id, so a water numbered 100 never collides with a
/// polymer residue numbered 100 in the same chain.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum HetFlag {
    /// A regular polymer residue.
    None,
    /// A water molecule.
    Water,
    /// Any other hetero group, tagged with its residue name.
    Het(String),
}

impl HetFlag {
    pub fn is_hetero(&self) -> bool {
        !matches!(self, HetFlag::None)
    }
}

impl fmt::Display for HetFlag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HetFlag::None => Ok(()),
            HetFlag::Water => write!(f, "W"),
            HetFlag::Het(name) => write!(f, "H_{}", name),
        }
    }
}

/// The composite residue id: (hetero flag, sequence number, insertion code).
///
/// The insertion code lets residues like "100A" coexist with "100" without
/// renumbering; the hetero flag keeps waters and ligands from colliding
/// with polymer residues at the same sequence position.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResidueId {
    pub het: HetFlag,
    pub seq: i32,
    pub icode: Option<char>,
}

impl ResidueId {
    /// A regular polymer residue id with no insertion code.
    pub fn new(seq: i32) -> Self {
        Self {
            het: HetFlag::None,
            seq,
            icode: None,
        }
    }

    pub fn with_icode(seq: i32, icode: char) -> Self {
        Self {
            het: HetFlag::None,
            seq,
            icode: Some(icode),
        }
    }

    pub fn water(seq: i32) -> Self {
        Self {
            het: HetFlag::Water,
            seq,
            icode: None,
        }
    }

    pub fn het(name: &str, seq: i32) -> Self {
        Self {
            het: HetFlag::Het(name.to_string()),
            seq,
            icode: None,
        }
    }
}

impl fmt::Display for ResidueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.het.is_hetero() {
            write!(f, "{} ", self.het)?;
        }
        write!(f, "{}", self.seq)?;
        if let Some(icode) = self.icode {
            write!(f, "{}", icode)?;
        }
        Ok(())
    }
}

/// A residue: an ordered collection of atom entries.
///
/// Point-mutation variants (two residue names observed at one sequence
/// position) are separate `Residue` nodes grouped by a [`DisorderedResidue`];
/// each variant owns its own atoms.
#[derive(Debug, Clone)]
pub struct Residue {
    pub id: ResidueId,
    /// Residue name (e.g. "ALA", "HOH").
    pub name: String,
    pub annotations: Annotations,
    pub(crate) parent: Option<ChainKey>,
    pub(crate) children: Children<String, AtomEntry>,
    pub(crate) full_id: FullIdCache,
}

impl Residue {
    pub fn new(id: ResidueId, name: &str) -> Self {
        Self {
            id,
            name: name.to_string(),
            annotations: Annotations::new(),
            parent: None,
            children: Children::new(),
            full_id: FullIdCache::default(),
        }
    }

    /// The chain this residue belongs to, if attached.
    pub fn parent(&self) -> Option<ChainKey> {
        self.parent
    }

    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    pub fn atom_names(&self) -> impl Iterator<Item = &str> {
        self.children.ids().map(String::as_str)
    }

    pub fn atom_entry(&self, name: &str) -> Option<&AtomEntry> {
        self.children.get(&name.to_string())
    }

    pub fn atom_entry_mut(&mut self, name: &str) -> Option<&mut AtomEntry> {
        self.children.get_mut(&name.to_string())
    }

    /// Atom entries in insertion order.
    pub fn atom_entries(&self) -> impl Iterator<Item = (&str, &AtomEntry)> {
        self.children.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    pub fn has_disordered_atoms(&self) -> bool {
        self.children.values().any(AtomEntry::is_disordered)
    }
}

/// Groups point-mutation variants of one residue position behind a single
/// selection, keyed by residue name.
#[derive(Debug, Clone)]
pub struct DisorderedResidue {
    id: ResidueId,
    variants: Vec<(String, ResidueKey)>,
    selected: usize,
}

impl DisorderedResidue {
    pub(crate) fn new(id: ResidueId, first_name: &str, first: ResidueKey) -> Self {
        Self {
            id,
            variants: vec![(first_name.to_string(), first)],
            selected: 0,
        }
    }

    pub fn id(&self) -> &ResidueId {
        &self.id
    }

    pub(crate) fn set_id(&mut self, id: ResidueId) {
        self.id = id;
    }

    /// Registers a new residue-name variant. Fails if the name is already
    /// present.
    pub fn add_variant(&mut self, name: &str, key: ResidueKey) -> Result<(), HierarchyError> {
        if self.variants.iter().any(|(id, _)| id == name) {
            return Err(HierarchyError::DuplicateVariant {
                level: Level::Residue,
                id: self.id.to_string(),
                variant: name.to_string(),
            });
        }
        self.variants.push((name.to_string(), key));
        Ok(())
    }

    /// Switches the active variant. Fails if the residue name is unknown.
    pub fn select(&mut self, name: &str) -> Result<(), HierarchyError> {
        let pos = self
            .variants
            .iter()
            .position(|(id, _)| id == name)
            .ok_or_else(|| HierarchyError::UnknownVariant {
                level: Level::Residue,
                id: self.id.to_string(),
                variant: name.to_string(),
            })?;
        self.selected = pos;
        Ok(())
    }

    pub fn selected_key(&self) -> ResidueKey {
        self.variants[self.selected].1
    }

    /// The residue name of the currently selected variant.
    pub fn selected_id(&self) -> &str {
        &self.variants[self.selected].0
    }

    pub fn get(&self, name: &str) -> Option<ResidueKey> {
        self.variants
            .iter()
            .find(|(id, _)| id == name)
            .map(|(_, key)| *key)
    }

    /// Residue names of all variants, sorted alphabetically.
    pub fn variant_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.variants.iter().map(|(id, _)| id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// (name, key) pairs in registration order.
    pub fn variants(&self) -> impl Iterator<Item = (&str, ResidueKey)> {
        self.variants.iter().map(|(id, key)| (id.as_str(), *key))
    }

    /// Variant keys in registration order.
    pub fn variant_keys(&self) -> impl Iterator<Item = ResidueKey> + '_ {
        self.variants.iter().map(|(_, key)| *key)
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// A residue slot inside a chain: either a single residue or a group of
/// point-mutation variants sharing one sequence position.
#[derive(Debug, Clone)]
pub enum ResidueEntry {
    Single(ResidueKey),
    Disordered(DisorderedResidue),
}

impl ResidueEntry {
    /// The key reads should resolve to right now; re-evaluated per call.
    pub fn selected_key(&self) -> ResidueKey {
        match self {
            ResidueEntry::Single(key) => *key,
            ResidueEntry::Disordered(group) => group.selected_key(),
        }
    }

    pub fn is_disordered(&self) -> bool {
        matches!(self, ResidueEntry::Disordered(_))
    }

    /// All residue keys behind this entry, variants in registration order.
    pub fn keys(&self) -> Vec<ResidueKey> {
        match self {
            ResidueEntry::Single(key) => vec![*key],
            ResidueEntry::Disordered(group) => group.variant_keys().collect(),
        }
    }

    pub fn as_disordered(&self) -> Option<&DisorderedResidue> {
        match self {
            ResidueEntry::Single(_) => None,
            ResidueEntry::Disordered(group) => Some(group),
        }
    }

    pub fn as_disordered_mut(&mut self) -> Option<&mut DisorderedResidue> {
        match self {
            ResidueEntry::Single(_) => None,
            ResidueEntry::Disordered(group) => Some(group),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn dummy_residue_key(n: u64) -> ResidueKey {
        ResidueKey::from(KeyData::from_ffi(n))
    }

    #[test]
    fn residue_ids_with_insertion_codes_do_not_collide() {
        let plain = ResidueId::new(100);
        let inserted = ResidueId::with_icode(100, 'A');
        assert_ne!(plain, inserted);
        assert_eq!(plain.to_string(), "100");
        assert_eq!(inserted.to_string(), "100A");
    }

    #[test]
    fn hetero_flag_is_part_of_the_id() {
        let polymer = ResidueId::new(42);
        let water = ResidueId::water(42);
        let ligand = ResidueId::het("GLC", 42);
        assert_ne!(polymer, water);
        assert_ne!(water, ligand);
        assert_eq!(water.to_string(), "W 42");
        assert_eq!(ligand.to_string(), "H_GLC 42");
        assert!(!polymer.het.is_hetero());
        assert!(ligand.het.is_hetero());
    }

    #[test]
    fn point_mutation_variants_select_by_name() {
        let ser = dummy_residue_key(1);
        let pro = dummy_residue_key(2);
        let mut group = DisorderedResidue::new(ResidueId::new(1), "SER", ser);
        group.add_variant("PRO", pro).unwrap();

        // First variant registered is the initially selected one.
        assert_eq!(group.selected_key(), ser);
        assert_eq!(group.variant_ids(), vec!["PRO", "SER"]);

        group.select("PRO").unwrap();
        assert_eq!(group.selected_key(), pro);

        let err = group.select("GLY").unwrap_err();
        assert!(matches!(err, HierarchyError::UnknownVariant { .. }));
    }

    #[test]
    fn duplicate_variant_name_is_rejected() {
        let mut group =
            DisorderedResidue::new(ResidueId::new(1), "SER", dummy_residue_key(1));
        let err = group.add_variant("SER", dummy_residue_key(2)).unwrap_err();
        assert!(matches!(err, HierarchyError::DuplicateVariant { .. }));
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn entry_keys_cover_all_variants() {
        let a = dummy_residue_key(1);
        let b = dummy_residue_key(2);
        let mut group = DisorderedResidue::new(ResidueId::new(5), "ARG", a);
        group.add_variant("GLN", b).unwrap();
        let entry = ResidueEntry::Disordered(group);
        assert!(entry.is_disordered());
        assert_eq!(entry.keys(), vec![a, b]);
        assert_eq!(entry.selected_key(), a);
    }
}
