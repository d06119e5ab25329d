use super::atom::{Atom, AtomEntry, DisorderedAtom};
use super::chain::Chain;
use super::entity::{HierarchyError, Level};
use super::ids::{ChainKey, ModelKey, ResidueKey};
use super::model::Model;
use super::residue::{DisorderedResidue, Residue, ResidueEntry, ResidueId};
use super::structure::Structure;
use crate::core::utils::residues::het_flag;
use nalgebra::Point3;
use tracing::{debug, warn};

/// One atom worth of parsed data, format-independent.
///
/// Every parser reduces its input to a stream of these records; the
/// [`StructureBuilder`] consumes the stream and performs all grouping and
/// disorder resolution. External decoders (fixed-column PDB, binary
/// formats) can drive the same builder by producing the same records.
#[derive(Debug, Clone)]
pub struct AtomRecord {
    pub serial: Option<i64>,
    pub name: String,
    pub altloc: Option<String>,
    pub res_name: String,
    pub chain_id: String,
    pub res_seq: i32,
    pub icode: Option<char>,
    /// True for HETATM-group records.
    pub hetero: bool,
    pub coord: Point3<f64>,
    /// `None` when the source file omitted the occupancy.
    pub occupancy: Option<f64>,
    pub bfactor: Option<f64>,
    pub element: String,
    pub model_num: i32,
}

enum ResidueAction {
    NewSingle,
    Activate(ResidueKey),
    Convert { existing: ResidueKey, existing_name: String },
    AddVariant,
}

enum AtomAction {
    New,
    Duplicate,
    Convert { existing: AtomKeyWithAlt },
    AddVariant,
}

struct AtomKeyWithAlt {
    key: crate::core::models::ids::AtomKey,
    altloc: Option<String>,
}

/// Incrementally assembles a [`Structure`] from a record stream.
///
/// Consecutive records sharing (model number, chain id, residue id) land in
/// the same node. Atoms repeating a name with a different altloc are merged
/// into a disordered atom in place, preserving the original atom order;
/// residues repeating a sequence position with a different name become
/// point-mutation variants. Exact duplicates are structural conflicts, or
/// are skipped with a warning in permissive mode.
pub struct StructureBuilder {
    structure: Structure,
    permissive: bool,
    current_model: Option<(i32, ModelKey)>,
    current_chain: Option<(String, ChainKey)>,
    current_residue: Option<(ResidueId, ResidueKey)>,
    next_model_id: i32,
    skipped: usize,
}

impl StructureBuilder {
    pub fn new(id: &str) -> Self {
        Self {
            structure: Structure::new(id),
            permissive: false,
            current_model: None,
            current_chain: None,
            current_residue: None,
            next_model_id: 0,
            skipped: 0,
        }
    }

    /// In permissive mode duplicate atoms are skipped with a warning
    /// instead of aborting the build.
    pub fn permissive(mut self, permissive: bool) -> Self {
        self.permissive = permissive;
        self
    }

    pub fn add_record(&mut self, record: &AtomRecord) -> Result<(), HierarchyError> {
        self.ensure_model(record.model_num)?;
        self.ensure_chain(&record.chain_id)?;
        let residue_id = ResidueId {
            het: het_flag(record.hetero, &record.res_name),
            seq: record.res_seq,
            icode: record.icode,
        };
        self.ensure_residue(residue_id, &record.res_name)?;
        self.place_atom(record)
    }

    pub fn finish(self) -> Structure {
        debug!(
            models = self.structure.len(),
            atoms = self.structure.atoms_iter().count(),
            skipped = self.skipped,
            "structure assembled"
        );
        self.structure
    }

    /// Opens a new model whenever the file model number changes. Ids are
    /// positional (0..N-1); the file number is preserved as `serial_num`.
    fn ensure_model(&mut self, model_num: i32) -> Result<(), HierarchyError> {
        if matches!(self.current_model, Some((num, _)) if num == model_num) {
            return Ok(());
        }
        let id = self.next_model_id;
        self.next_model_id += 1;
        let key = self.structure.add_model(Model::with_serial(id, model_num))?;
        self.current_model = Some((model_num, key));
        self.current_chain = None;
        self.current_residue = None;
        Ok(())
    }

    fn ensure_chain(&mut self, chain_id: &str) -> Result<(), HierarchyError> {
        if matches!(&self.current_chain, Some((id, _)) if id == chain_id) {
            return Ok(());
        }
        let (_, model_key) = self
            .current_model
            .expect("a model is opened before any chain");
        // Interleaved chains re-activate the existing node.
        let key = match self.structure.model(model_key).unwrap().chain_key(chain_id) {
            Some(existing) => existing,
            None => self.structure.add_chain(model_key, Chain::new(chain_id))?,
        };
        self.current_chain = Some((chain_id.to_string(), key));
        self.current_residue = None;
        Ok(())
    }

    fn ensure_residue(&mut self, id: ResidueId, name: &str) -> Result<(), HierarchyError> {
        if let Some((current_id, current_key)) = &self.current_residue {
            if *current_id == id && self.structure.residues[*current_key].name == name {
                return Ok(());
            }
        }
        let chain_key = self
            .current_chain
            .as_ref()
            .expect("a chain is opened before any residue")
            .1;

        let action = match self.structure.chains[chain_key].residue_entry(&id) {
            None => ResidueAction::NewSingle,
            Some(ResidueEntry::Single(key)) => {
                if self.structure.residues[*key].name == name {
                    ResidueAction::Activate(*key)
                } else {
                    ResidueAction::Convert {
                        existing: *key,
                        existing_name: self.structure.residues[*key].name.clone(),
                    }
                }
            }
            Some(ResidueEntry::Disordered(group)) => match group.get(name) {
                Some(key) => ResidueAction::Activate(key),
                None => ResidueAction::AddVariant,
            },
        };

        let active = match action {
            ResidueAction::NewSingle => self
                .structure
                .add_residue(chain_key, Residue::new(id.clone(), name))?,
            ResidueAction::Activate(key) => key,
            ResidueAction::Convert {
                existing,
                existing_name,
            } => {
                let new_key = self.insert_residue_node(chain_key, &id, name);
                let mut group = DisorderedResidue::new(id.clone(), &existing_name, existing);
                group.add_variant(name, new_key)?;
                self.structure.chains[chain_key]
                    .children
                    .replace(&id, ResidueEntry::Disordered(group));
                new_key
            }
            ResidueAction::AddVariant => {
                let new_key = self.insert_residue_node(chain_key, &id, name);
                self.structure.chains[chain_key]
                    .children
                    .get_mut(&id)
                    .unwrap()
                    .as_disordered_mut()
                    .unwrap()
                    .add_variant(name, new_key)?;
                new_key
            }
        };
        self.current_residue = Some((id, active));
        Ok(())
    }

    /// Inserts a residue node directly into the arena without creating a
    /// chain entry; the caller wires it into a disorder group.
    fn insert_residue_node(&mut self, chain: ChainKey, id: &ResidueId, name: &str) -> ResidueKey {
        let mut residue = Residue::new(id.clone(), name);
        residue.parent = Some(chain);
        self.structure.residues.insert(residue)
    }

    fn place_atom(&mut self, record: &AtomRecord) -> Result<(), HierarchyError> {
        let residue_key = self
            .current_residue
            .as_ref()
            .expect("a residue is opened before any atom")
            .1;

        let action = match self.structure.residues[residue_key].atom_entry(&record.name) {
            None => AtomAction::New,
            Some(AtomEntry::Single(key)) => {
                let existing_alt = self.structure.atoms[*key].altloc.clone();
                if existing_alt == record.altloc {
                    AtomAction::Duplicate
                } else {
                    AtomAction::Convert {
                        existing: AtomKeyWithAlt {
                            key: *key,
                            altloc: existing_alt,
                        },
                    }
                }
            }
            Some(AtomEntry::Disordered(group)) => {
                if group.get(altloc_key(&record.altloc)).is_some() {
                    AtomAction::Duplicate
                } else {
                    AtomAction::AddVariant
                }
            }
        };

        match action {
            AtomAction::New => {
                let atom = self.make_atom(record, residue_key);
                let key = self.structure.atoms.insert(atom);
                self.structure.residues[residue_key]
                    .children
                    .push(record.name.clone(), AtomEntry::Single(key));
                Ok(())
            }
            AtomAction::Duplicate => {
                if self.permissive {
                    warn!(
                        atom = %record.name,
                        serial = ?record.serial,
                        "skipping atom defined twice at one position"
                    );
                    self.skipped += 1;
                    Ok(())
                } else {
                    Err(HierarchyError::DuplicateId {
                        level: Level::Atom,
                        id: record.name.clone(),
                    })
                }
            }
            AtomAction::Convert { existing } => {
                let atom = self.make_atom(record, residue_key);
                let key = self.structure.atoms.insert(atom);
                let mut group = DisorderedAtom::new(
                    &record.name,
                    altloc_key(&existing.altloc),
                    existing.key,
                );
                group.add_variant(altloc_key(&record.altloc), key)?;
                self.structure.residues[residue_key]
                    .children
                    .replace(&record.name, AtomEntry::Disordered(group));
                Ok(())
            }
            AtomAction::AddVariant => {
                let atom = self.make_atom(record, residue_key);
                let key = self.structure.atoms.insert(atom);
                self.structure.residues[residue_key]
                    .children
                    .get_mut(&record.name)
                    .unwrap()
                    .as_disordered_mut()
                    .unwrap()
                    .add_variant(altloc_key(&record.altloc), key)?;
                Ok(())
            }
        }
    }

    fn make_atom(&self, record: &AtomRecord, parent: ResidueKey) -> Atom {
        let mut atom = Atom::new(&record.name, record.coord);
        atom.serial = record.serial;
        atom.altloc = record.altloc.clone();
        atom.occupancy = record.occupancy;
        atom.bfactor = record.bfactor.unwrap_or(0.0);
        atom.element = record.element.clone();
        atom.parent = Some(parent);
        atom
    }
}

fn altloc_key(altloc: &Option<String>) -> &str {
    altloc.as_deref().unwrap_or("")
}
