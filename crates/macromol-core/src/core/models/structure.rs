use super::atom::{Atom, AtomEntry, DisorderedAtom};
use super::chain::Chain;
use super::entity::{Annotations, Children, FullIdCache, HierarchyError, Level};
use super::hierarchy::{EntityRef, FullId, IdPart};
use super::ids::{AtomKey, ChainKey, ModelKey, ResidueKey};
use super::model::Model;
use super::residue::{DisorderedResidue, Residue, ResidueEntry, ResidueId};
use nalgebra::{Matrix3, Vector3};
use slotmap::SlotMap;

/// A complete macromolecular structure.
///
/// The structure is the root of the Model → Chain → Residue → Atom
/// hierarchy and owns every node through per-level slot-map arenas. Child
/// order and id uniqueness are maintained by each node's ordered child
/// container; parent links are plain arena keys, so no ownership cycles
/// exist and a dropped subtree is simply removed from the arenas.
///
/// All mutation requires `&mut self`; shared references permit concurrent
/// read-only traversal, including lazy full-id cache population.
#[derive(Debug, Clone, Default)]
pub struct Structure {
    id: String,
    pub annotations: Annotations,
    pub(crate) models: SlotMap<ModelKey, Model>,
    pub(crate) chains: SlotMap<ChainKey, Chain>,
    pub(crate) residues: SlotMap<ResidueKey, Residue>,
    pub(crate) atoms: SlotMap<AtomKey, Atom>,
    pub(crate) children: Children<i32, ModelKey>,
    full_id: FullIdCache,
}

impl Structure {
    /// Creates a new, empty structure.
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            ..Self::default()
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Changes the structure id, invalidating every cached full id in the
    /// tree.
    pub fn set_id(&mut self, id: &str) {
        self.id = id.to_string();
        self.full_id.reset();
        for (_, model) in self.models.iter_mut() {
            model.full_id.reset();
        }
        for (_, chain) in self.chains.iter_mut() {
            chain.full_id.reset();
        }
        for (_, residue) in self.residues.iter_mut() {
            residue.full_id.reset();
        }
        for (_, atom) in self.atoms.iter_mut() {
            atom.full_id.reset();
        }
    }

    /// Number of models.
    pub fn len(&self) -> usize {
        self.children.len()
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    // --- Node accessors ---

    pub fn model(&self, key: ModelKey) -> Option<&Model> {
        self.models.get(key)
    }

    pub fn model_mut(&mut self, key: ModelKey) -> Option<&mut Model> {
        self.models.get_mut(key)
    }

    pub fn chain(&self, key: ChainKey) -> Option<&Chain> {
        self.chains.get(key)
    }

    pub fn chain_mut(&mut self, key: ChainKey) -> Option<&mut Chain> {
        self.chains.get_mut(key)
    }

    pub fn residue(&self, key: ResidueKey) -> Option<&Residue> {
        self.residues.get(key)
    }

    pub fn residue_mut(&mut self, key: ResidueKey) -> Option<&mut Residue> {
        self.residues.get_mut(key)
    }

    pub fn atom(&self, key: AtomKey) -> Option<&Atom> {
        self.atoms.get(key)
    }

    pub fn atom_mut(&mut self, key: AtomKey) -> Option<&mut Atom> {
        self.atoms.get_mut(key)
    }

    /// Finds a model by its positional id.
    pub fn model_by_id(&self, id: i32) -> Option<ModelKey> {
        self.children.get(&id).copied()
    }

    /// The first model in tree order, if any.
    pub fn first_model(&self) -> Option<ModelKey> {
        self.children.values().next().copied()
    }

    // --- Insertion ---

    /// Adds models, appending them in the given order.
    ///
    /// Fails with a structural-conflict error if any incoming id already
    /// exists or the batch contains internal duplicates; on failure nothing
    /// is inserted.
    pub fn add_models(&mut self, models: Vec<Model>) -> Result<Vec<ModelKey>, HierarchyError> {
        self.children
            .validate_new_ids(models.iter().map(|m| &m.id), Level::Model)?;
        let mut keys = Vec::with_capacity(models.len());
        for model in models {
            let id = model.id;
            let key = self.models.insert(model);
            self.children.push(id, key);
            keys.push(key);
        }
        Ok(keys)
    }

    pub fn add_model(&mut self, model: Model) -> Result<ModelKey, HierarchyError> {
        Ok(self.add_models(vec![model])?[0])
    }

    /// Splices models at an explicit position instead of appending.
    pub fn insert_models(
        &mut self,
        position: usize,
        models: Vec<Model>,
    ) -> Result<Vec<ModelKey>, HierarchyError> {
        if position > self.children.len() {
            return Err(HierarchyError::PositionOutOfBounds {
                position,
                len: self.children.len(),
            });
        }
        self.children
            .validate_new_ids(models.iter().map(|m| &m.id), Level::Model)?;
        let mut items = Vec::with_capacity(models.len());
        let mut keys = Vec::with_capacity(models.len());
        for model in models {
            let id = model.id;
            let key = self.models.insert(model);
            items.push((id, key));
            keys.push(key);
        }
        self.children.insert_at(position, items)?;
        Ok(keys)
    }

    /// Adds chains to a model, appending them in the given order.
    pub fn add_chains(
        &mut self,
        model: ModelKey,
        chains: Vec<Chain>,
    ) -> Result<Vec<ChainKey>, HierarchyError> {
        self.splice_chains(model, None, chains)
    }

    pub fn add_chain(&mut self, model: ModelKey, chain: Chain) -> Result<ChainKey, HierarchyError> {
        Ok(self.add_chains(model, vec![chain])?[0])
    }

    pub fn insert_chains(
        &mut self,
        model: ModelKey,
        position: usize,
        chains: Vec<Chain>,
    ) -> Result<Vec<ChainKey>, HierarchyError> {
        self.splice_chains(model, Some(position), chains)
    }

    fn splice_chains(
        &mut self,
        model: ModelKey,
        position: Option<usize>,
        chains: Vec<Chain>,
    ) -> Result<Vec<ChainKey>, HierarchyError> {
        {
            let node = self.models.get(model).ok_or_else(detached_model)?;
            if let Some(position) = position {
                if position > node.children.len() {
                    return Err(HierarchyError::PositionOutOfBounds {
                        position,
                        len: node.children.len(),
                    });
                }
            }
            node.children
                .validate_new_ids(chains.iter().map(|c| &c.id), Level::Chain)?;
        }
        let mut items = Vec::with_capacity(chains.len());
        let mut keys = Vec::with_capacity(chains.len());
        for mut chain in chains {
            chain.parent = Some(model);
            let id = chain.id.clone();
            let key = self.chains.insert(chain);
            items.push((id, key));
            keys.push(key);
        }
        let node = self.models.get_mut(model).unwrap();
        match position {
            Some(position) => node.children.insert_at(position, items)?,
            None => {
                for (id, key) in items {
                    node.children.push(id, key);
                }
            }
        }
        Ok(keys)
    }

    /// Adds residues to a chain, appending them in the given order.
    pub fn add_residues(
        &mut self,
        chain: ChainKey,
        residues: Vec<Residue>,
    ) -> Result<Vec<ResidueKey>, HierarchyError> {
        self.splice_residues(chain, None, residues)
    }

    pub fn add_residue(
        &mut self,
        chain: ChainKey,
        residue: Residue,
    ) -> Result<ResidueKey, HierarchyError> {
        Ok(self.add_residues(chain, vec![residue])?[0])
    }

    pub fn insert_residues(
        &mut self,
        chain: ChainKey,
        position: usize,
        residues: Vec<Residue>,
    ) -> Result<Vec<ResidueKey>, HierarchyError> {
        self.splice_residues(chain, Some(position), residues)
    }

    fn splice_residues(
        &mut self,
        chain: ChainKey,
        position: Option<usize>,
        residues: Vec<Residue>,
    ) -> Result<Vec<ResidueKey>, HierarchyError> {
        {
            let node = self.chains.get(chain).ok_or_else(detached_chain)?;
            if let Some(position) = position {
                if position > node.children.len() {
                    return Err(HierarchyError::PositionOutOfBounds {
                        position,
                        len: node.children.len(),
                    });
                }
            }
            node.children
                .validate_new_ids(residues.iter().map(|r| &r.id), Level::Residue)?;
        }
        let mut items = Vec::with_capacity(residues.len());
        let mut keys = Vec::with_capacity(residues.len());
        for mut residue in residues {
            residue.parent = Some(chain);
            let id = residue.id.clone();
            let key = self.residues.insert(residue);
            items.push((id, ResidueEntry::Single(key)));
            keys.push(key);
        }
        let node = self.chains.get_mut(chain).unwrap();
        match position {
            Some(position) => node.children.insert_at(position, items)?,
            None => {
                for (id, entry) in items {
                    node.children.push(id, entry);
                }
            }
        }
        Ok(keys)
    }

    /// Adds atoms to a residue, appending them in the given order. Atom
    /// names are the child ids; merging altloc variants of one name is the
    /// structure builder's job, so a repeated name here is a conflict.
    pub fn add_atoms(
        &mut self,
        residue: ResidueKey,
        atoms: Vec<Atom>,
    ) -> Result<Vec<AtomKey>, HierarchyError> {
        self.splice_atoms(residue, None, atoms)
    }

    pub fn add_atom(&mut self, residue: ResidueKey, atom: Atom) -> Result<AtomKey, HierarchyError> {
        Ok(self.add_atoms(residue, vec![atom])?[0])
    }

    pub fn insert_atoms(
        &mut self,
        residue: ResidueKey,
        position: usize,
        atoms: Vec<Atom>,
    ) -> Result<Vec<AtomKey>, HierarchyError> {
        self.splice_atoms(residue, Some(position), atoms)
    }

    fn splice_atoms(
        &mut self,
        residue: ResidueKey,
        position: Option<usize>,
        atoms: Vec<Atom>,
    ) -> Result<Vec<AtomKey>, HierarchyError> {
        {
            let node = self.residues.get(residue).ok_or_else(detached_residue)?;
            if let Some(position) = position {
                if position > node.children.len() {
                    return Err(HierarchyError::PositionOutOfBounds {
                        position,
                        len: node.children.len(),
                    });
                }
            }
            node.children
                .validate_new_ids(atoms.iter().map(|a| &a.name), Level::Atom)?;
        }
        let mut items = Vec::with_capacity(atoms.len());
        let mut keys = Vec::with_capacity(atoms.len());
        for mut atom in atoms {
            atom.parent = Some(residue);
            let name = atom.name.clone();
            let key = self.atoms.insert(atom);
            items.push((name, AtomEntry::Single(key)));
            keys.push(key);
        }
        let node = self.residues.get_mut(residue).unwrap();
        match position {
            Some(position) => node.children.insert_at(position, items)?,
            None => {
                for (name, entry) in items {
                    node.children.push(name, entry);
                }
            }
        }
        Ok(keys)
    }

    // --- Removal ---

    /// Removes a model and drops its entire subtree.
    pub fn remove_model(&mut self, id: i32) -> Result<(), HierarchyError> {
        let key = self
            .children
            .remove(&id)
            .ok_or_else(|| HierarchyError::NotFound {
                level: Level::Model,
                id: id.to_string(),
            })?;
        self.drop_model_subtree(key);
        Ok(())
    }

    /// Removes a chain from a model and drops its subtree.
    pub fn remove_chain(&mut self, model: ModelKey, id: &str) -> Result<(), HierarchyError> {
        let node = self.models.get_mut(model).ok_or_else(detached_model)?;
        let key = node
            .children
            .remove(&id.to_string())
            .ok_or_else(|| HierarchyError::NotFound {
                level: Level::Chain,
                id: id.to_string(),
            })?;
        self.drop_chain_subtree(key);
        Ok(())
    }

    /// Removes a residue position from a chain (all disorder variants) and
    /// drops the subtree.
    pub fn remove_residue(&mut self, chain: ChainKey, id: &ResidueId) -> Result<(), HierarchyError> {
        let node = self.chains.get_mut(chain).ok_or_else(detached_chain)?;
        let entry = node
            .children
            .remove(id)
            .ok_or_else(|| HierarchyError::NotFound {
                level: Level::Residue,
                id: id.to_string(),
            })?;
        for key in entry.keys() {
            self.drop_residue_subtree(key);
        }
        Ok(())
    }

    /// Detaches an atom position from a residue and returns the removed
    /// atoms (every altloc variant, registration order) with their parent
    /// references cleared.
    pub fn remove_atom(
        &mut self,
        residue: ResidueKey,
        name: &str,
    ) -> Result<Vec<Atom>, HierarchyError> {
        let node = self.residues.get_mut(residue).ok_or_else(detached_residue)?;
        let entry = node
            .children
            .remove(&name.to_string())
            .ok_or_else(|| HierarchyError::NotFound {
                level: Level::Atom,
                id: name.to_string(),
            })?;
        let mut removed = Vec::new();
        for key in entry.keys() {
            if let Some(mut atom) = self.atoms.remove(key) {
                atom.parent = None;
                atom.full_id.reset();
                removed.push(atom);
            }
        }
        Ok(removed)
    }

    fn drop_model_subtree(&mut self, key: ModelKey) {
        let chain_keys: Vec<ChainKey> = self
            .models
            .get(key)
            .map(|m| m.chain_keys().collect())
            .unwrap_or_default();
        for chain in chain_keys {
            self.drop_chain_subtree(chain);
        }
        self.models.remove(key);
    }

    fn drop_chain_subtree(&mut self, key: ChainKey) {
        let residue_keys: Vec<ResidueKey> = self
            .chains
            .get(key)
            .map(|c| c.children.values().flat_map(ResidueEntry::keys).collect())
            .unwrap_or_default();
        for residue in residue_keys {
            self.drop_residue_subtree(residue);
        }
        self.chains.remove(key);
    }

    fn drop_residue_subtree(&mut self, key: ResidueKey) {
        let atom_keys: Vec<AtomKey> = self
            .residues
            .get(key)
            .map(|r| r.children.values().flat_map(AtomEntry::keys).collect())
            .unwrap_or_default();
        for atom in atom_keys {
            self.atoms.remove(atom);
        }
        self.residues.remove(key);
    }

    // --- Renaming ---

    /// Renames a model. Fails on sibling collision and leaves the tree
    /// unchanged; on success all full ids cached below the model are
    /// invalidated.
    pub fn rename_model(&mut self, old: i32, new: i32) -> Result<(), HierarchyError> {
        self.children.rename(&old, new, Level::Model)?;
        let key = *self.children.get(&new).unwrap();
        self.models[key].id = new;
        self.reset_full_ids(EntityRef::Model(key));
        Ok(())
    }

    /// Renames a chain within its model; same atomicity and invalidation
    /// rules as [`Structure::rename_model`].
    pub fn rename_chain(
        &mut self,
        model: ModelKey,
        old: &str,
        new: &str,
    ) -> Result<(), HierarchyError> {
        let node = self.models.get_mut(model).ok_or_else(detached_model)?;
        node.children
            .rename(&old.to_string(), new.to_string(), Level::Chain)?;
        let key = *node.children.get(&new.to_string()).unwrap();
        self.chains[key].id = new.to_string();
        self.reset_full_ids(EntityRef::Chain(key));
        Ok(())
    }

    /// Renames a residue position within its chain; every disorder variant
    /// at that position takes the new id.
    pub fn rename_residue(
        &mut self,
        chain: ChainKey,
        old: &ResidueId,
        new: ResidueId,
    ) -> Result<(), HierarchyError> {
        let node = self.chains.get_mut(chain).ok_or_else(detached_chain)?;
        node.children.rename(old, new.clone(), Level::Residue)?;
        let entry = node.children.get_mut(&new).unwrap();
        if let Some(group) = entry.as_disordered_mut() {
            group.set_id(new.clone());
        }
        let keys = entry.keys();
        for key in &keys {
            self.residues[*key].id = new.clone();
        }
        for key in keys {
            self.reset_full_ids(EntityRef::Residue(key));
        }
        Ok(())
    }

    /// Renames an atom position within its residue; every altloc variant
    /// takes the new name.
    pub fn rename_atom(
        &mut self,
        residue: ResidueKey,
        old: &str,
        new: &str,
    ) -> Result<(), HierarchyError> {
        let node = self.residues.get_mut(residue).ok_or_else(detached_residue)?;
        node.children
            .rename(&old.to_string(), new.to_string(), Level::Atom)?;
        let entry = node.children.get_mut(&new.to_string()).unwrap();
        if let Some(group) = entry.as_disordered_mut() {
            group.set_name(new);
        }
        for key in entry.keys() {
            let atom = &mut self.atoms[key];
            atom.name = new.to_string();
            atom.full_id.reset();
        }
        Ok(())
    }

    // --- Full ids ---

    /// The full id of an entity: the tuple of ids from the structure root
    /// down to the entity, computed lazily and cached. Returns `None` for
    /// stale keys.
    pub fn full_id(&self, entity: EntityRef) -> Option<FullId> {
        match entity {
            EntityRef::Structure => Some(
                self.full_id
                    .get_or_init(|| FullId(vec![IdPart::Structure(self.id.clone())]))
                    .clone(),
            ),
            EntityRef::Model(key) => {
                let model = self.models.get(key)?;
                Some(
                    model
                        .full_id
                        .get_or_init(|| {
                            FullId(vec![
                                IdPart::Structure(self.id.clone()),
                                IdPart::Model(model.id),
                            ])
                        })
                        .clone(),
                )
            }
            EntityRef::Chain(key) => {
                let chain = self.chains.get(key)?;
                Some(
                    chain
                        .full_id
                        .get_or_init(|| {
                            let mut parts = vec![IdPart::Chain(chain.id.clone())];
                            self.push_ancestors_of_chain(chain.parent, &mut parts);
                            parts.reverse();
                            FullId(parts)
                        })
                        .clone(),
                )
            }
            EntityRef::Residue(key) => {
                let residue = self.residues.get(key)?;
                Some(
                    residue
                        .full_id
                        .get_or_init(|| {
                            let mut parts = vec![IdPart::Residue(residue.id.clone())];
                            if let Some(chain_key) = residue.parent {
                                if let Some(chain) = self.chains.get(chain_key) {
                                    parts.push(IdPart::Chain(chain.id.clone()));
                                    self.push_ancestors_of_chain(chain.parent, &mut parts);
                                }
                            }
                            parts.reverse();
                            FullId(parts)
                        })
                        .clone(),
                )
            }
            EntityRef::Atom(key) => {
                let atom = self.atoms.get(key)?;
                Some(
                    atom.full_id
                        .get_or_init(|| {
                            let mut parts = vec![IdPart::Atom {
                                name: atom.name.clone(),
                                altloc: atom.altloc.clone(),
                            }];
                            if let Some(residue_key) = atom.parent {
                                if let Some(residue) = self.residues.get(residue_key) {
                                    parts.push(IdPart::Residue(residue.id.clone()));
                                    if let Some(chain_key) = residue.parent {
                                        if let Some(chain) = self.chains.get(chain_key) {
                                            parts.push(IdPart::Chain(chain.id.clone()));
                                            self.push_ancestors_of_chain(chain.parent, &mut parts);
                                        }
                                    }
                                }
                            }
                            parts.reverse();
                            FullId(parts)
                        })
                        .clone(),
                )
            }
        }
    }

    fn push_ancestors_of_chain(&self, model: Option<ModelKey>, parts: &mut Vec<IdPart>) {
        if let Some(model_key) = model {
            if let Some(model) = self.models.get(model_key) {
                parts.push(IdPart::Model(model.id));
            }
        }
        parts.push(IdPart::Structure(self.id.clone()));
    }

    /// Clears the cached full ids of an entity and, transitively, of every
    /// descendant (all disorder variants included). O(subtree size).
    pub(crate) fn reset_full_ids(&mut self, entity: EntityRef) {
        for node in self.subtree_refs(entity) {
            match node {
                EntityRef::Structure => self.full_id.reset(),
                EntityRef::Model(key) => {
                    if let Some(model) = self.models.get_mut(key) {
                        model.full_id.reset();
                    }
                }
                EntityRef::Chain(key) => {
                    if let Some(chain) = self.chains.get_mut(key) {
                        chain.full_id.reset();
                    }
                }
                EntityRef::Residue(key) => {
                    if let Some(residue) = self.residues.get_mut(key) {
                        residue.full_id.reset();
                    }
                }
                EntityRef::Atom(key) => {
                    if let Some(atom) = self.atoms.get_mut(key) {
                        atom.full_id.reset();
                    }
                }
            }
        }
    }

    /// Collects an entity and every node below it, disorder variants
    /// included, in depth-first tree order.
    pub(crate) fn subtree_refs(&self, entity: EntityRef) -> Vec<EntityRef> {
        let mut out = Vec::new();
        let mut stack = vec![entity];
        while let Some(current) = stack.pop() {
            out.push(current);
            match current {
                EntityRef::Structure => {
                    stack.extend(self.children.values().rev().map(|&k| EntityRef::Model(k)));
                }
                EntityRef::Model(key) => {
                    if let Some(model) = self.models.get(key) {
                        stack.extend(
                            model
                                .children
                                .values()
                                .rev()
                                .map(|&k| EntityRef::Chain(k)),
                        );
                    }
                }
                EntityRef::Chain(key) => {
                    if let Some(chain) = self.chains.get(key) {
                        let keys: Vec<ResidueKey> =
                            chain.children.values().flat_map(ResidueEntry::keys).collect();
                        stack.extend(keys.into_iter().rev().map(EntityRef::Residue));
                    }
                }
                EntityRef::Residue(key) => {
                    if let Some(residue) = self.residues.get(key) {
                        let keys: Vec<AtomKey> =
                            residue.children.values().flat_map(AtomEntry::keys).collect();
                        stack.extend(keys.into_iter().rev().map(EntityRef::Atom));
                    }
                }
                EntityRef::Atom(_) => {}
            }
        }
        out
    }

    // --- Traversal ---

    /// Models in tree order.
    pub fn models_iter(&self) -> impl Iterator<Item = (ModelKey, &Model)> {
        self.children.values().map(|&key| (key, &self.models[key]))
    }

    /// Chains of one model, in tree order.
    pub fn chains_of(&self, model: ModelKey) -> impl Iterator<Item = (ChainKey, &Chain)> {
        self.models
            .get(model)
            .into_iter()
            .flat_map(|m| m.children.values().map(|&key| (key, &self.chains[key])))
    }

    /// Residues of one chain in tree order, resolving each disordered
    /// position to its currently selected variant.
    pub fn residues_of(&self, chain: ChainKey) -> impl Iterator<Item = (ResidueKey, &Residue)> {
        self.chains.get(chain).into_iter().flat_map(|c| {
            c.children.values().map(|entry| {
                let key = entry.selected_key();
                (key, &self.residues[key])
            })
        })
    }

    /// Atoms of one residue in tree order, resolving each disordered
    /// position to its currently selected variant.
    pub fn atoms_of(&self, residue: ResidueKey) -> impl Iterator<Item = (AtomKey, &Atom)> {
        self.residues.get(residue).into_iter().flat_map(|r| {
            r.children.values().map(|entry| {
                let key = entry.selected_key();
                (key, &self.atoms[key])
            })
        })
    }

    /// All chains in tree order.
    pub fn chains_iter(&self) -> impl Iterator<Item = (ChainKey, &Chain)> {
        self.models_iter()
            .flat_map(move |(key, _)| self.chains_of(key))
    }

    /// All residues in tree order (selected disorder variants).
    pub fn residues_iter(&self) -> impl Iterator<Item = (ResidueKey, &Residue)> {
        self.chains_iter()
            .flat_map(move |(key, _)| self.residues_of(key))
    }

    /// All atoms in tree order (selected disorder variants).
    pub fn atoms_iter(&self) -> impl Iterator<Item = (AtomKey, &Atom)> {
        self.residues_iter()
            .flat_map(move |(key, _)| self.atoms_of(key))
    }

    // --- Transformation ---

    /// Applies `new = rotation · coord + translation` to every atom in the
    /// structure, disorder variants included.
    pub fn transform(&mut self, rotation: &Matrix3<f64>, translation: &Vector3<f64>) {
        for (_, atom) in self.atoms.iter_mut() {
            atom.coord = rotation * atom.coord + translation;
        }
    }

    /// Applies a rotation+translation to every atom below an entity,
    /// disorder variants included.
    pub fn transform_entity(
        &mut self,
        entity: EntityRef,
        rotation: &Matrix3<f64>,
        translation: &Vector3<f64>,
    ) {
        let atom_keys: Vec<AtomKey> = self
            .subtree_refs(entity)
            .into_iter()
            .filter_map(|node| match node {
                EntityRef::Atom(key) => Some(key),
                _ => None,
            })
            .collect();
        for key in atom_keys {
            let atom = &mut self.atoms[key];
            atom.coord = rotation * atom.coord + translation;
        }
    }

    // --- Copying ---

    /// Builds a new structure containing deep copies of the given models,
    /// preserving their ids and serial numbers.
    pub fn extract_models(&self, ids: &[i32]) -> Result<Structure, HierarchyError> {
        let mut out = Structure::new(&self.id);
        for &id in ids {
            let key = self
                .model_by_id(id)
                .ok_or_else(|| HierarchyError::NotFound {
                    level: Level::Model,
                    id: id.to_string(),
                })?;
            let source = &self.models[key];
            let target = out.add_model(Model::with_serial(source.id, source.serial_num))?;
            out.models[target].annotations = source.annotations.clone();
            for chain_key in source.chain_keys().collect::<Vec<_>>() {
                self.copy_chain_into(chain_key, &mut out, target)?;
            }
        }
        Ok(out)
    }

    /// Builds a new single-model structure containing deep copies of the
    /// named chains from this structure's first model.
    pub fn extract_chains(&self, chain_ids: &[&str]) -> Result<Structure, HierarchyError> {
        let first = self.first_model().ok_or_else(|| HierarchyError::NotFound {
            level: Level::Model,
            id: "0".to_string(),
        })?;
        let source = &self.models[first];
        let mut out = Structure::new(&self.id);
        let target = out.add_model(Model::with_serial(source.id, source.serial_num))?;
        for &chain_id in chain_ids {
            let chain_key = source
                .chain_key(chain_id)
                .ok_or_else(|| HierarchyError::NotFound {
                    level: Level::Chain,
                    id: chain_id.to_string(),
                })?;
            self.copy_chain_into(chain_key, &mut out, target)?;
        }
        Ok(out)
    }

    /// Deep-copies one chain subtree into a model of another structure.
    /// Disorder groups, selections, and child order are preserved;
    /// coordinates are copied, never shared.
    pub(crate) fn copy_chain_into(
        &self,
        chain: ChainKey,
        target: &mut Structure,
        target_model: ModelKey,
    ) -> Result<ChainKey, HierarchyError> {
        let source = self.chains.get(chain).ok_or_else(detached_chain)?;
        {
            let model = target.models.get(target_model).ok_or_else(detached_model)?;
            if model.children.contains(&source.id) {
                return Err(HierarchyError::DuplicateId {
                    level: Level::Chain,
                    id: source.id.clone(),
                });
            }
        }
        let mut copy = Chain::new(&source.id);
        copy.annotations = source.annotations.clone();
        copy.parent = Some(target_model);
        let new_chain = target.chains.insert(copy);
        target
            .models
            .get_mut(target_model)
            .unwrap()
            .children
            .push(source.id.clone(), new_chain);

        for (residue_id, entry) in source.children.iter() {
            let new_entry = match entry {
                ResidueEntry::Single(key) => {
                    ResidueEntry::Single(self.copy_residue_into(*key, target, new_chain))
                }
                ResidueEntry::Disordered(group) => {
                    let mut variants = group.variants();
                    let (first_name, first_key) =
                        variants.next().expect("disordered group is never empty");
                    let new_first = self.copy_residue_into(first_key, target, new_chain);
                    let mut new_group =
                        DisorderedResidue::new(residue_id.clone(), first_name, new_first);
                    for (name, key) in variants {
                        let new_key = self.copy_residue_into(key, target, new_chain);
                        new_group.add_variant(name, new_key)?;
                    }
                    new_group.select(group.selected_id())?;
                    ResidueEntry::Disordered(new_group)
                }
            };
            target
                .chains
                .get_mut(new_chain)
                .unwrap()
                .children
                .push(residue_id.clone(), new_entry);
        }
        Ok(new_chain)
    }

    fn copy_residue_into(
        &self,
        residue: ResidueKey,
        target: &mut Structure,
        target_chain: ChainKey,
    ) -> ResidueKey {
        let source = &self.residues[residue];
        let mut copy = Residue::new(source.id.clone(), &source.name);
        copy.annotations = source.annotations.clone();
        copy.parent = Some(target_chain);
        let new_residue = target.residues.insert(copy);

        for (name, entry) in source.children.iter() {
            let new_entry = match entry {
                AtomEntry::Single(key) => {
                    AtomEntry::Single(self.copy_atom_into(*key, target, new_residue))
                }
                AtomEntry::Disordered(group) => {
                    let mut variants = group.variants();
                    let (first_altloc, first_key) =
                        variants.next().expect("disordered group is never empty");
                    let new_first = self.copy_atom_into(first_key, target, new_residue);
                    let mut new_group = DisorderedAtom::new(name, first_altloc, new_first);
                    for (altloc, key) in variants {
                        let new_key = self.copy_atom_into(key, target, new_residue);
                        // Altlocs are unique within the source group.
                        new_group.add_variant(altloc, new_key).unwrap();
                    }
                    new_group.select(group.selected_id()).unwrap();
                    AtomEntry::Disordered(new_group)
                }
            };
            target
                .residues
                .get_mut(new_residue)
                .unwrap()
                .children
                .push(name.clone(), new_entry);
        }
        new_residue
    }

    fn copy_atom_into(
        &self,
        atom: AtomKey,
        target: &mut Structure,
        target_residue: ResidueKey,
    ) -> AtomKey {
        let mut copy = self.atoms[atom].clone();
        copy.parent = Some(target_residue);
        target.atoms.insert(copy)
    }
}

fn detached_model() -> HierarchyError {
    HierarchyError::NotFound {
        level: Level::Model,
        id: "<detached>".to_string(),
    }
}

fn detached_chain() -> HierarchyError {
    HierarchyError::NotFound {
        level: Level::Chain,
        id: "<detached>".to_string(),
    }
}

fn detached_residue() -> HierarchyError {
    HierarchyError::NotFound {
        level: Level::Residue,
        id: "<detached>".to_string(),
    }
}

const COORD_EPSILON: f64 = 1e-6;

/// Recursive structural equality: same tree shape, ids, names, disorder
/// variants and atom payloads (coordinates compared within 1e-6 Angstrom to
/// absorb text round-trips). Structure-level ids are ignored so that the
/// same coordinates loaded from differently named sources compare equal.
pub fn structures_equal(a: &Structure, b: &Structure) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.models_iter()
        .zip(b.models_iter())
        .all(|((ka, ma), (kb, mb))| {
            ma.id == mb.id
                && ma.serial_num == mb.serial_num
                && chains_equal(a, ka, b, kb)
        })
}

fn chains_equal(a: &Structure, model_a: ModelKey, b: &Structure, model_b: ModelKey) -> bool {
    let chains_a: Vec<_> = a.chains_of(model_a).collect();
    let chains_b: Vec<_> = b.chains_of(model_b).collect();
    chains_a.len() == chains_b.len()
        && chains_a
            .iter()
            .zip(chains_b.iter())
            .all(|((ka, ca), (kb, cb))| ca.id == cb.id && residues_equal(a, *ka, b, *kb))
}

fn residues_equal(a: &Structure, chain_a: ChainKey, b: &Structure, chain_b: ChainKey) -> bool {
    let ca = &a.chains[chain_a];
    let cb = &b.chains[chain_b];
    if ca.children.len() != cb.children.len() {
        return false;
    }
    ca.children
        .iter()
        .zip(cb.children.iter())
        .all(|((id_a, entry_a), (id_b, entry_b))| {
            id_a == id_b
                && entry_a.keys().len() == entry_b.keys().len()
                && entry_a
                    .keys()
                    .into_iter()
                    .zip(entry_b.keys())
                    .all(|(ra, rb)| {
                        let res_a = &a.residues[ra];
                        let res_b = &b.residues[rb];
                        res_a.name == res_b.name && atoms_equal(a, ra, b, rb)
                    })
        })
}

fn atoms_equal(a: &Structure, residue_a: ResidueKey, b: &Structure, residue_b: ResidueKey) -> bool {
    let ra = &a.residues[residue_a];
    let rb = &b.residues[residue_b];
    if ra.children.len() != rb.children.len() {
        return false;
    }
    ra.children
        .iter()
        .zip(rb.children.iter())
        .all(|((name_a, entry_a), (name_b, entry_b))| {
            name_a == name_b
                && entry_a.keys().len() == entry_b.keys().len()
                && entry_a
                    .keys()
                    .into_iter()
                    .zip(entry_b.keys())
                    .all(|(aa, ab)| atom_payload_equal(&a.atoms[aa], &b.atoms[ab]))
        })
}

fn atom_payload_equal(a: &Atom, b: &Atom) -> bool {
    a.name == b.name
        && a.altloc == b.altloc
        && (a.coord - b.coord).norm() < COORD_EPSILON
        && a.occupancy == b.occupancy
        && a.element == b.element
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point3;

    struct TestRefs {
        model: ModelKey,
        chain_a: ChainKey,
        gly: ResidueKey,
        gly_ca: AtomKey,
    }

    fn create_test_structure() -> (Structure, TestRefs) {
        let mut structure = Structure::new("1abc");
        let model = structure.add_model(Model::new(0)).unwrap();
        let chain_a = structure.add_chain(model, Chain::new("A")).unwrap();
        let gly = structure
            .add_residue(chain_a, Residue::new(ResidueId::new(1), "GLY"))
            .unwrap();
        let gly_n = Atom::new("N", Point3::new(0.0, 0.0, 0.0));
        let gly_ca = Atom::new("CA", Point3::new(1.4, 0.0, 0.0));
        structure.add_atom(gly, gly_n).unwrap();
        let gly_ca = structure.add_atom(gly, gly_ca).unwrap();
        let ala = structure
            .add_residue(chain_a, Residue::new(ResidueId::new(2), "ALA"))
            .unwrap();
        structure
            .add_atom(ala, Atom::new("CA", Point3::new(2.0, 1.0, 0.0)))
            .unwrap();
        let refs = TestRefs {
            model,
            chain_a,
            gly,
            gly_ca,
        };
        (structure, refs)
    }

    mod insertion {
        use super::*;

        #[test]
        fn add_and_lookup() {
            let (structure, refs) = create_test_structure();
            assert_eq!(structure.len(), 1);
            assert_eq!(structure.model_by_id(0), Some(refs.model));
            assert!(structure.model_by_id(1).is_none());
            assert_eq!(structure.atoms_iter().count(), 3);
            assert_eq!(structure.residues_iter().count(), 2);
        }

        #[test]
        fn duplicate_id_in_batch_leaves_children_unchanged() {
            let (mut structure, refs) = create_test_structure();
            let before: Vec<String> = structure.models[refs.model]
                .chain_ids()
                .map(str::to_string)
                .collect();
            let err = structure
                .add_chains(refs.model, vec![Chain::new("B"), Chain::new("B")])
                .unwrap_err();
            assert!(matches!(err, HierarchyError::DuplicateId { .. }));
            let after: Vec<String> = structure.models[refs.model]
                .chain_ids()
                .map(str::to_string)
                .collect();
            assert_eq!(before, after);
            // The arena must not keep orphans either.
            assert_eq!(structure.chains.len(), 1);
        }

        #[test]
        fn duplicate_of_existing_id_is_rejected() {
            let (mut structure, refs) = create_test_structure();
            let err = structure
                .add_chain(refs.model, Chain::new("A"))
                .unwrap_err();
            assert!(matches!(err, HierarchyError::DuplicateId { .. }));
        }

        #[test]
        fn insert_at_position_preserves_order() {
            let (mut structure, refs) = create_test_structure();
            structure
                .add_chains(refs.model, vec![Chain::new("C")])
                .unwrap();
            structure
                .insert_chains(refs.model, 1, vec![Chain::new("B")])
                .unwrap();
            let ids: Vec<&str> = structure.models[refs.model].chain_ids().collect();
            assert_eq!(ids, vec!["A", "B", "C"]);
        }

        #[test]
        fn insert_out_of_bounds_is_rejected_without_orphans() {
            let (mut structure, refs) = create_test_structure();
            let err = structure
                .insert_chains(refs.model, 5, vec![Chain::new("B")])
                .unwrap_err();
            assert!(matches!(err, HierarchyError::PositionOutOfBounds { .. }));
            assert_eq!(structure.chains.len(), 1);
        }
    }

    mod removal {
        use super::*;

        #[test]
        fn remove_residue_drops_its_atoms_from_the_arena() {
            let (mut structure, refs) = create_test_structure();
            assert_eq!(structure.atoms.len(), 3);
            structure
                .remove_residue(refs.chain_a, &ResidueId::new(1))
                .unwrap();
            assert_eq!(structure.atoms.len(), 1);
            assert!(structure.atom(refs.gly_ca).is_none());
            assert_eq!(structure.chains[refs.chain_a].len(), 1);
        }

        #[test]
        fn remove_atom_returns_detached_atoms() {
            let (mut structure, refs) = create_test_structure();
            let removed = structure.remove_atom(refs.gly, "CA").unwrap();
            assert_eq!(removed.len(), 1);
            assert_eq!(removed[0].name, "CA");
            assert!(removed[0].parent().is_none());
            assert!(structure.residues[refs.gly].atom_entry("CA").is_none());
        }

        #[test]
        fn remove_missing_id_reports_not_found() {
            let (mut structure, refs) = create_test_structure();
            let err = structure.remove_chain(refs.model, "Z").unwrap_err();
            assert!(matches!(
                err,
                HierarchyError::NotFound {
                    level: Level::Chain,
                    ..
                }
            ));
            let err = structure.remove_model(9).unwrap_err();
            assert!(matches!(err, HierarchyError::NotFound { .. }));
        }
    }

    mod renaming_and_full_ids {
        use super::*;

        #[test]
        fn full_id_is_cached_and_idempotent() {
            let (structure, refs) = create_test_structure();
            let first = structure.full_id(EntityRef::Atom(refs.gly_ca)).unwrap();
            let second = structure.full_id(EntityRef::Atom(refs.gly_ca)).unwrap();
            assert_eq!(first, second);
            assert_eq!(first.to_string(), "1abc/0/A/1/CA");
        }

        #[test]
        fn rename_invalidates_descendant_full_ids() {
            let (mut structure, refs) = create_test_structure();
            let before = structure.full_id(EntityRef::Atom(refs.gly_ca)).unwrap();
            structure.rename_chain(refs.model, "A", "Q").unwrap();
            let after = structure.full_id(EntityRef::Atom(refs.gly_ca)).unwrap();
            assert_ne!(before, after);
            assert_eq!(after.to_string(), "1abc/0/Q/1/CA");
        }

        #[test]
        fn rename_round_trip_restores_full_ids() {
            let (mut structure, refs) = create_test_structure();
            let atoms: Vec<AtomKey> = structure.atoms_iter().map(|(key, _)| key).collect();
            let before: Vec<FullId> = atoms
                .iter()
                .map(|&key| structure.full_id(EntityRef::Atom(key)).unwrap())
                .collect();
            structure.rename_chain(refs.model, "A", "B").unwrap();
            structure.rename_chain(refs.model, "B", "A").unwrap();
            let after: Vec<FullId> = atoms
                .iter()
                .map(|&key| structure.full_id(EntityRef::Atom(key)).unwrap())
                .collect();
            assert_eq!(before, after);
        }

        #[test]
        fn rename_conflict_is_atomic() {
            let (mut structure, refs) = create_test_structure();
            structure.add_chain(refs.model, Chain::new("B")).unwrap();
            let err = structure.rename_chain(refs.model, "A", "B").unwrap_err();
            assert!(matches!(err, HierarchyError::DuplicateId { .. }));
            let ids: Vec<&str> = structure.models[refs.model].chain_ids().collect();
            assert_eq!(ids, vec!["A", "B"]);
            // Cached paths still reflect the old (unchanged) id.
            let full_id = structure.full_id(EntityRef::Chain(refs.chain_a)).unwrap();
            assert_eq!(full_id.to_string(), "1abc/0/A");
        }

        #[test]
        fn set_id_invalidates_the_whole_tree() {
            let (mut structure, refs) = create_test_structure();
            let before = structure.full_id(EntityRef::Atom(refs.gly_ca)).unwrap();
            structure.set_id("2xyz");
            let after = structure.full_id(EntityRef::Atom(refs.gly_ca)).unwrap();
            assert_ne!(before, after);
            assert!(after.to_string().starts_with("2xyz/"));
        }

        #[test]
        fn rename_residue_with_insertion_code() {
            let (mut structure, refs) = create_test_structure();
            structure
                .rename_residue(refs.chain_a, &ResidueId::new(1), ResidueId::with_icode(100, 'A'))
                .unwrap();
            assert_eq!(
                structure.residues[refs.gly].id,
                ResidueId::with_icode(100, 'A')
            );
            let full_id = structure.full_id(EntityRef::Residue(refs.gly)).unwrap();
            assert_eq!(full_id.to_string(), "1abc/0/A/100A");
        }
    }

    mod copying_and_transform {
        use super::*;

        #[test]
        fn clone_is_a_deep_copy() {
            let (structure, refs) = create_test_structure();
            let mut copy = structure.clone();
            let key = copy
                .atoms
                .iter()
                .find(|(_, atom)| atom.name == "CA")
                .map(|(key, _)| key)
                .unwrap();
            copy.atoms[key].coord = Point3::new(99.0, 99.0, 99.0);
            // The original's coordinates are untouched.
            assert_eq!(
                structure.atoms[refs.gly_ca].coord,
                Point3::new(1.4, 0.0, 0.0)
            );
        }

        #[test]
        fn extract_chains_copies_coordinates_independently() {
            let (structure, refs) = create_test_structure();
            let mut extracted = structure.extract_chains(&["A"]).unwrap();
            assert_eq!(extracted.len(), 1);
            assert_eq!(extracted.atoms_iter().count(), 3);
            let key = extracted.atoms_iter().next().map(|(key, _)| key).unwrap();
            extracted.atoms[key].coord = Point3::new(50.0, 0.0, 0.0);
            assert_eq!(
                structure.atoms_iter().next().unwrap().1.coord,
                Point3::new(0.0, 0.0, 0.0)
            );
            let _ = refs;
        }

        #[test]
        fn extract_missing_chain_reports_not_found() {
            let (structure, _) = create_test_structure();
            let err = structure.extract_chains(&["Z"]).unwrap_err();
            assert!(matches!(err, HierarchyError::NotFound { .. }));
        }

        #[test]
        fn extract_models_preserves_serial_numbers() {
            let mut structure = Structure::new("x");
            structure.add_model(Model::with_serial(0, 4)).unwrap();
            structure.add_model(Model::with_serial(1, 7)).unwrap();
            let extracted = structure.extract_models(&[1]).unwrap();
            let (_, model) = extracted.models_iter().next().unwrap();
            assert_eq!(model.id, 1);
            assert_eq!(model.serial_num, 7);
        }

        #[test]
        fn transform_translates_every_atom() {
            let (mut structure, refs) = create_test_structure();
            structure.transform(&Matrix3::identity(), &Vector3::new(0.0, 0.0, 1.0));
            assert_eq!(
                structure.atoms[refs.gly_ca].coord,
                Point3::new(1.4, 0.0, 1.0)
            );
        }

        #[test]
        fn annotations_are_carried_and_copied_uninterpreted() {
            use crate::core::models::entity::Annotation;

            let (mut structure, refs) = create_test_structure();
            structure.atoms[refs.gly_ca]
                .annotations
                .insert("asa".to_string(), Annotation::Float(42.5));
            structure
                .annotations
                .insert("source".to_string(), Annotation::Text("x-ray".to_string()));

            let copy = structure.clone();
            let key = copy
                .atoms
                .iter()
                .find(|(_, atom)| atom.name == "CA" && !atom.annotations.is_empty())
                .map(|(key, _)| key)
                .unwrap();
            assert_eq!(
                copy.atoms[key].annotations.get("asa"),
                Some(&Annotation::Float(42.5))
            );
            assert_eq!(
                copy.annotations.get("source"),
                Some(&Annotation::Text("x-ray".to_string()))
            );
        }

        #[test]
        fn structures_equal_compares_content_not_ids() {
            let (structure, _) = create_test_structure();
            let mut copy = structure.clone();
            copy.set_id("renamed");
            assert!(structures_equal(&structure, &copy));

            let key = copy.atoms_iter().next().map(|(key, _)| key).unwrap();
            copy.atoms[key].coord = Point3::new(8.0, 8.0, 8.0);
            assert!(!structures_equal(&structure, &copy));
        }
    }
}
