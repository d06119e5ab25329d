use super::entity::{Annotations, FullIdCache, HierarchyError, Level};
use super::ids::{AtomKey, ResidueKey};
use nalgebra::Point3;
use std::collections::HashMap;

/// A single observed atom position.
///
/// Atoms are leaves of the hierarchy. `occupancy` is nullable because PDB
/// files may omit it, which is numerically distinct from an occupancy of
/// zero. The `altloc` code distinguishes alternate locations of the same
/// atom; atoms sharing a name but differing in altloc are grouped into a
/// [`DisorderedAtom`] during construction.
#[derive(Debug, Clone)]
pub struct Atom {
    /// The atom name (e.g. "CA", "N", "OXT").
    pub name: String,
    /// Serial number from the source file, if one was present.
    pub serial: Option<i64>,
    /// Alternate-location code, if any.
    pub altloc: Option<String>,
    /// Cartesian coordinates in Angstroms.
    pub coord: Point3<f64>,
    /// Fractional occupancy; `None` when the source file omitted it.
    pub occupancy: Option<f64>,
    /// Isotropic temperature factor.
    pub bfactor: f64,
    /// Element symbol; empty when unknown.
    pub element: String,
    /// Open-ended annotations set by external analysis tools.
    pub annotations: Annotations,
    pub(crate) parent: Option<ResidueKey>,
    pub(crate) full_id: FullIdCache,
}

/// Compares the observable payload; parent links and cache state are
/// intentionally excluded so that independent copies compare equal.
impl PartialEq for Atom {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.serial == other.serial
            && self.altloc == other.altloc
            && self.coord == other.coord
            && self.occupancy == other.occupancy
            && self.bfactor == other.bfactor
            && self.element == other.element
            && self.annotations == other.annotations
    }
}

impl Atom {
    /// Creates a detached atom with the given name and coordinates; all
    /// other fields start at their defaults.
    pub fn new(name: &str, coord: Point3<f64>) -> Self {
        Self {
            name: name.to_string(),
            serial: None,
            altloc: None,
            coord,
            occupancy: None,
            bfactor: 0.0,
            element: String::new(),
            annotations: HashMap::new(),
            parent: None,
            full_id: FullIdCache::default(),
        }
    }

    /// The residue this atom belongs to, if attached.
    pub fn parent(&self) -> Option<ResidueKey> {
        self.parent
    }
}

/// Groups the alternate locations of one atom behind a single selection.
///
/// Exactly one variant is selected at a time; the first variant registered
/// becomes the initially selected one. All reads that go through
/// [`AtomEntry::selected_key`] resolve the selection at call time.
#[derive(Debug, Clone)]
pub struct DisorderedAtom {
    name: String,
    variants: Vec<(String, AtomKey)>,
    selected: usize,
}

impl DisorderedAtom {
    pub(crate) fn new(name: &str, first_altloc: &str, first: AtomKey) -> Self {
        Self {
            name: name.to_string(),
            variants: vec![(first_altloc.to_string(), first)],
            selected: 0,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    /// Registers a new altloc variant. Fails if the altloc code is already
    /// present.
    pub fn add_variant(&mut self, altloc: &str, key: AtomKey) -> Result<(), HierarchyError> {
        if self.variants.iter().any(|(id, _)| id == altloc) {
            return Err(HierarchyError::DuplicateVariant {
                level: Level::Atom,
                id: self.name.clone(),
                variant: altloc.to_string(),
            });
        }
        self.variants.push((altloc.to_string(), key));
        Ok(())
    }

    /// Switches the active variant. Fails if the altloc code is unknown.
    pub fn select(&mut self, altloc: &str) -> Result<(), HierarchyError> {
        let pos = self
            .variants
            .iter()
            .position(|(id, _)| id == altloc)
            .ok_or_else(|| HierarchyError::UnknownVariant {
                level: Level::Atom,
                id: self.name.clone(),
                variant: altloc.to_string(),
            })?;
        self.selected = pos;
        Ok(())
    }

    pub fn selected_key(&self) -> AtomKey {
        self.variants[self.selected].1
    }

    /// The altloc code of the currently selected variant.
    pub fn selected_id(&self) -> &str {
        &self.variants[self.selected].0
    }

    pub fn get(&self, altloc: &str) -> Option<AtomKey> {
        self.variants
            .iter()
            .find(|(id, _)| id == altloc)
            .map(|(_, key)| *key)
    }

    /// Altloc codes of all variants, sorted alphabetically.
    pub fn variant_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.variants.iter().map(|(id, _)| id.as_str()).collect();
        ids.sort_unstable();
        ids
    }

    /// (altloc, key) pairs in registration order.
    pub fn variants(&self) -> impl Iterator<Item = (&str, AtomKey)> {
        self.variants.iter().map(|(id, key)| (id.as_str(), *key))
    }

    /// Variant keys in registration order.
    pub fn variant_keys(&self) -> impl Iterator<Item = AtomKey> + '_ {
        self.variants.iter().map(|(_, key)| *key)
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}

/// An atom slot inside a residue: either a single atom or a disordered
/// group of altloc variants sharing one name.
#[derive(Debug, Clone)]
pub enum AtomEntry {
    Single(AtomKey),
    Disordered(DisorderedAtom),
}

impl AtomEntry {
    /// The key reads should resolve to right now. For a disordered entry
    /// this is re-evaluated on every call, so switching the selection is
    /// immediately visible to all readers.
    pub fn selected_key(&self) -> AtomKey {
        match self {
            AtomEntry::Single(key) => *key,
            AtomEntry::Disordered(group) => group.selected_key(),
        }
    }

    pub fn is_disordered(&self) -> bool {
        matches!(self, AtomEntry::Disordered(_))
    }

    /// All atom keys behind this entry (one for a single atom, every
    /// variant in registration order for a disordered group).
    pub fn keys(&self) -> Vec<AtomKey> {
        match self {
            AtomEntry::Single(key) => vec![*key],
            AtomEntry::Disordered(group) => group.variant_keys().collect(),
        }
    }

    pub fn as_disordered(&self) -> Option<&DisorderedAtom> {
        match self {
            AtomEntry::Single(_) => None,
            AtomEntry::Disordered(group) => Some(group),
        }
    }

    pub fn as_disordered_mut(&mut self) -> Option<&mut DisorderedAtom> {
        match self {
            AtomEntry::Single(_) => None,
            AtomEntry::Disordered(group) => Some(group),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn dummy_atom_key(n: u64) -> AtomKey {
        AtomKey::from(KeyData::from_ffi(n))
    }

    #[test]
    fn new_atom_has_expected_defaults() {
        let atom = Atom::new("CA", Point3::new(1.0, 2.0, 3.0));
        assert_eq!(atom.name, "CA");
        assert_eq!(atom.coord, Point3::new(1.0, 2.0, 3.0));
        assert!(atom.serial.is_none());
        assert!(atom.altloc.is_none());
        assert!(atom.occupancy.is_none());
        assert_eq!(atom.bfactor, 0.0);
        assert_eq!(atom.element, "");
        assert!(atom.parent().is_none());
    }

    #[test]
    fn first_variant_is_initially_selected() {
        let a = dummy_atom_key(1);
        let b = dummy_atom_key(2);
        let mut group = DisorderedAtom::new("CA", "A", a);
        group.add_variant("B", b).unwrap();
        assert_eq!(group.selected_key(), a);
        assert_eq!(group.selected_id(), "A");
        assert_eq!(group.len(), 2);
    }

    #[test]
    fn select_switches_and_rejects_unknown_variants() {
        let a = dummy_atom_key(1);
        let b = dummy_atom_key(2);
        let mut group = DisorderedAtom::new("CA", "A", a);
        group.add_variant("B", b).unwrap();

        group.select("B").unwrap();
        assert_eq!(group.selected_key(), b);

        let err = group.select("Q").unwrap_err();
        assert!(matches!(err, HierarchyError::UnknownVariant { .. }));
        // A failed select leaves the previous selection in place.
        assert_eq!(group.selected_key(), b);
    }

    #[test]
    fn duplicate_altloc_is_rejected() {
        let a = dummy_atom_key(1);
        let b = dummy_atom_key(2);
        let mut group = DisorderedAtom::new("CA", "A", a);
        let err = group.add_variant("A", b).unwrap_err();
        assert!(matches!(err, HierarchyError::DuplicateVariant { .. }));
        assert_eq!(group.len(), 1);
    }

    #[test]
    fn variant_ids_are_sorted() {
        let mut group = DisorderedAtom::new("CA", "B", dummy_atom_key(1));
        group.add_variant("A", dummy_atom_key(2)).unwrap();
        group.add_variant("C", dummy_atom_key(3)).unwrap();
        assert_eq!(group.variant_ids(), vec!["A", "B", "C"]);
    }

    #[test]
    fn entry_resolution_tracks_selection_dynamically() {
        let a = dummy_atom_key(1);
        let b = dummy_atom_key(2);
        let mut entry = AtomEntry::Disordered(DisorderedAtom::new("OG", "A", a));
        entry
            .as_disordered_mut()
            .unwrap()
            .add_variant("B", b)
            .unwrap();
        assert_eq!(entry.selected_key(), a);
        entry.as_disordered_mut().unwrap().select("B").unwrap();
        assert_eq!(entry.selected_key(), b);
        assert_eq!(entry.keys(), vec![a, b]);
    }

    #[test]
    fn single_entry_is_transparent() {
        let key = dummy_atom_key(7);
        let entry = AtomEntry::Single(key);
        assert!(!entry.is_disordered());
        assert_eq!(entry.selected_key(), key);
        assert_eq!(entry.keys(), vec![key]);
        assert!(entry.as_disordered().is_none());
    }
}
