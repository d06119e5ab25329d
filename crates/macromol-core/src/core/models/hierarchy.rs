use super::entity::{HierarchyError, Level};
use super::ids::{AtomKey, ChainKey, ModelKey, ResidueKey};
use super::residue::ResidueId;
use super::structure::Structure;
use std::fmt;

/// One segment of a full id, from the structure root down to an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IdPart {
    Structure(String),
    Model(i32),
    Chain(String),
    Residue(ResidueId),
    Atom { name: String, altloc: Option<String> },
}

impl fmt::Display for IdPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IdPart::Structure(id) => write!(f, "{}", id),
            IdPart::Model(id) => write!(f, "{}", id),
            IdPart::Chain(id) => write!(f, "{}", id),
            IdPart::Residue(id) => write!(f, "{}", id),
            IdPart::Atom { name, altloc } => match altloc {
                Some(alt) => write!(f, "{}:{}", name, alt),
                None => write!(f, "{}", name),
            },
        }
    }
}

/// The tuple of ids locating an entity inside its structure tree.
///
/// A residue full id looks like `1abc/0/A/10`: structure "1abc", model 0,
/// chain "A", residue 10.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FullId(pub Vec<IdPart>);

impl fmt::Display for FullId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, part) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "/")?;
            }
            write!(f, "{}", part)?;
        }
        Ok(())
    }
}

/// A dynamically typed handle to any entity in a structure tree.
///
/// Used where lists mix hierarchy levels (level checks happen at run time)
/// or where an operation is level-agnostic, such as [`unfold_entities`] and
/// subtree transforms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityRef {
    Structure,
    Model(ModelKey),
    Chain(ChainKey),
    Residue(ResidueKey),
    Atom(AtomKey),
}

impl EntityRef {
    pub fn level(&self) -> Level {
        match self {
            EntityRef::Structure => Level::Structure,
            EntityRef::Model(_) => Level::Model,
            EntityRef::Chain(_) => Level::Chain,
            EntityRef::Residue(_) => Level::Residue,
            EntityRef::Atom(_) => Level::Atom,
        }
    }
}

/// Flattens a homogeneous list of entities to a target hierarchy level.
///
/// Descending (e.g. chains to atoms) walks each subtree depth-first in tree
/// order through the currently selected disorder variants. Ascending (e.g.
/// atoms to chains) follows parent references and deduplicates while
/// preserving first-occurrence order. A list mixing entities from different
/// levels is rejected with [`HierarchyError::HeterogeneousLevels`]; an empty
/// list unfolds to an empty list.
pub fn unfold_entities(
    structure: &Structure,
    entities: &[EntityRef],
    target: Level,
) -> Result<Vec<EntityRef>, HierarchyError> {
    let Some(first) = entities.first() else {
        return Ok(Vec::new());
    };
    let source = first.level();
    for entity in entities {
        if entity.level() != source {
            return Err(HierarchyError::HeterogeneousLevels {
                first: source,
                second: entity.level(),
            });
        }
    }

    if target.depth() == source.depth() {
        return Ok(entities.to_vec());
    }

    if target.depth() > source.depth() {
        let mut out = Vec::new();
        for entity in entities {
            descend(structure, *entity, target, &mut out)?;
        }
        return Ok(out);
    }

    let mut out = Vec::new();
    for entity in entities {
        let mut current = *entity;
        while current.level().depth() > target.depth() {
            current = parent_of(structure, current)?;
        }
        if !out.contains(&current) {
            out.push(current);
        }
    }
    Ok(out)
}

fn descend(
    structure: &Structure,
    entity: EntityRef,
    target: Level,
    out: &mut Vec<EntityRef>,
) -> Result<(), HierarchyError> {
    if entity.level() == target {
        out.push(entity);
        return Ok(());
    }
    for child in children_of(structure, entity)? {
        descend(structure, child, target, out)?;
    }
    Ok(())
}

fn children_of(
    structure: &Structure,
    entity: EntityRef,
) -> Result<Vec<EntityRef>, HierarchyError> {
    match entity {
        EntityRef::Structure => Ok(structure
            .models_iter()
            .map(|(key, _)| EntityRef::Model(key))
            .collect()),
        EntityRef::Model(key) => {
            let model = structure.model(key).ok_or_else(|| stale(Level::Model))?;
            Ok(model.chain_keys().map(EntityRef::Chain).collect())
        }
        EntityRef::Chain(key) => {
            let chain = structure.chain(key).ok_or_else(|| stale(Level::Chain))?;
            Ok(chain
                .residue_entries()
                .map(|(_, entry)| EntityRef::Residue(entry.selected_key()))
                .collect())
        }
        EntityRef::Residue(key) => {
            let residue = structure
                .residue(key)
                .ok_or_else(|| stale(Level::Residue))?;
            Ok(residue
                .atom_entries()
                .map(|(_, entry)| EntityRef::Atom(entry.selected_key()))
                .collect())
        }
        EntityRef::Atom(_) => Ok(Vec::new()),
    }
}

fn parent_of(structure: &Structure, entity: EntityRef) -> Result<EntityRef, HierarchyError> {
    match entity {
        EntityRef::Structure => Ok(EntityRef::Structure),
        EntityRef::Model(_) => Ok(EntityRef::Structure),
        EntityRef::Chain(key) => {
            let chain = structure.chain(key).ok_or_else(|| stale(Level::Chain))?;
            chain
                .parent()
                .map(EntityRef::Model)
                .ok_or_else(|| stale(Level::Model))
        }
        EntityRef::Residue(key) => {
            let residue = structure
                .residue(key)
                .ok_or_else(|| stale(Level::Residue))?;
            residue
                .parent()
                .map(EntityRef::Chain)
                .ok_or_else(|| stale(Level::Chain))
        }
        EntityRef::Atom(key) => {
            let atom = structure.atom(key).ok_or_else(|| stale(Level::Atom))?;
            atom.parent()
                .map(EntityRef::Residue)
                .ok_or_else(|| stale(Level::Residue))
        }
    }
}

fn stale(level: Level) -> HierarchyError {
    HierarchyError::NotFound {
        level,
        id: "<detached>".to_string(),
    }
}
