//! Biological-assembly reconstruction.
//!
//! A deposited structure file contains the asymmetric unit; the
//! biologically relevant multimer is obtained by applying rotation and
//! translation operators to (subsets of) its chains. The operators come
//! from legacy `REMARK 350` text ([`remark`]) or from the
//! `_pdbx_struct_assembly_gen` / `_pdbx_struct_oper_list` mmCIF categories
//! ([`mmcif`]); once parsed, both sources produce the same
//! [`Bioassembly`] description and go through the same generation step.

pub mod mmcif;
pub mod remark;

pub use remark::Remark350Parser;

use crate::core::io::mmcif::CifDict;
use crate::core::models::entity::HierarchyError;
use crate::core::models::hierarchy::EntityRef;
use crate::core::models::model::Model;
use crate::core::models::structure::Structure;
use nalgebra::{Matrix3, Point3, Vector3};
use std::collections::HashMap;
use thiserror::Error;

/// A rigid-body operator: `new = rotation · coord + translation`.
///
/// The rotation is assembled from nine scalar components addressed by
/// explicit (row, column) indices, never from a flat list, so the matrix
/// layout of the source cannot be silently transposed.
#[derive(Debug, Clone, PartialEq)]
pub struct Transformation {
    pub rotation: Matrix3<f64>,
    pub translation: Vector3<f64>,
}

impl Transformation {
    pub fn new(rotation: Matrix3<f64>, translation: Vector3<f64>) -> Self {
        Self {
            rotation,
            translation,
        }
    }

    pub fn identity() -> Self {
        Self {
            rotation: Matrix3::identity(),
            translation: Vector3::zeros(),
        }
    }

    pub fn apply(&self, point: &Point3<f64>) -> Point3<f64> {
        self.rotation * point + self.translation
    }
}

/// One biological assembly: the chains it is built from and the operators
/// applied to them, in declaration order.
#[derive(Debug, Clone)]
pub struct Bioassembly {
    pub id: String,
    pub chain_ids: Vec<String>,
    pub transformations: Vec<Transformation>,
}

#[derive(Debug, Error)]
pub enum AssemblyError {
    #[error("bioassembly `{id}` not found")]
    NotFound { id: String },

    #[error("chain `{chain}` required by bioassembly `{id}` is missing from the structure")]
    MissingChain { id: String, chain: String },

    #[error("structure has no models to build an assembly from")]
    EmptyStructure,

    #[error("line {line} is not a `REMARK 350` record")]
    BadRemarkPrefix { line: usize },

    #[error("malformed REMARK 350 data on line {line}: {message}")]
    MalformedRemark { line: usize, message: String },

    #[error("incomplete REMARK 350 assembly `{id}`: {message}")]
    IncompleteRemark { id: String, message: String },

    #[error("duplicate REMARK 350 biomolecule `{id}`")]
    DuplicateAssembly { id: String },

    #[error("operator `{id}` missing from _pdbx_struct_oper_list")]
    OperatorNotFound { id: String },

    #[error("invalid operator component `{item}`: `{value}`")]
    BadOperator { item: String, value: String },

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

/// Builds one biological assembly from a base structure.
///
/// For each operator, in declaration order, a new model is created and the
/// named chains are copied into it from the base structure's first model
/// (chains sorted by id); the operator is then applied to every atom of
/// the new model, disorder variants included.
pub fn generate(structure: &Structure, assembly: &Bioassembly) -> Result<Structure, AssemblyError> {
    let first_model = structure.first_model().ok_or(AssemblyError::EmptyStructure)?;

    let mut chain_ids = assembly.chain_ids.clone();
    chain_ids.sort();

    let mut output = Structure::new(structure.id());
    for (index, transformation) in assembly.transformations.iter().enumerate() {
        let model_key = output.add_model(Model::new(index as i32))?;
        for chain_id in &chain_ids {
            let chain_key = structure
                .model(first_model)
                .and_then(|model| model.chain_key(chain_id))
                .ok_or_else(|| AssemblyError::MissingChain {
                    id: assembly.id.clone(),
                    chain: chain_id.clone(),
                })?;
            structure.copy_chain_into(chain_key, &mut output, model_key)?;
        }
        output.transform_entity(
            EntityRef::Model(model_key),
            &transformation.rotation,
            &transformation.translation,
        );
    }
    Ok(output)
}

/// Looks up `assembly_id` in a parsed REMARK 350 map and generates it.
/// Assembly id "0" denotes "no assembly" and returns the asymmetric unit
/// unchanged.
pub fn generate_by_id(
    structure: &Structure,
    assemblies: &HashMap<String, Bioassembly>,
    assembly_id: &str,
) -> Result<Structure, AssemblyError> {
    if assembly_id == "0" {
        return Ok(structure.clone());
    }
    let assembly = assemblies
        .get(assembly_id)
        .ok_or_else(|| AssemblyError::NotFound {
            id: assembly_id.to_string(),
        })?;
    generate(structure, assembly)
}

/// Generates an assembly described by the mmCIF categories of `dict`.
/// Assembly id "0" returns the asymmetric unit unchanged.
pub fn generate_from_dict(
    structure: &Structure,
    dict: &CifDict,
    assembly_id: &str,
) -> Result<Structure, AssemblyError> {
    if assembly_id == "0" {
        return Ok(structure.clone());
    }
    let assembly = mmcif::bioassembly_from_dict(dict, assembly_id)?;
    generate(structure, &assembly)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::chain::Chain;
    use crate::core::models::residue::{Residue, ResidueId};
    use crate::core::models::structure::structures_equal;
    use crate::core::models::atom::Atom;

    fn base_structure() -> Structure {
        let mut structure = Structure::new("1xyz");
        let model = structure.add_model(Model::new(0)).unwrap();
        let chain_a = structure.add_chain(model, Chain::new("A")).unwrap();
        let residue = structure
            .add_residue(chain_a, Residue::new(ResidueId::new(1), "GLY"))
            .unwrap();
        structure
            .add_atom(residue, Atom::new("N", Point3::new(1.0, 2.0, 3.0)))
            .unwrap();
        structure
            .add_atom(residue, Atom::new("CA", Point3::new(2.0, 2.0, 3.0)))
            .unwrap();
        let chain_b = structure.add_chain(model, Chain::new("B")).unwrap();
        let residue_b = structure
            .add_residue(chain_b, Residue::new(ResidueId::new(1), "ALA"))
            .unwrap();
        structure
            .add_atom(residue_b, Atom::new("CA", Point3::new(-1.0, 0.0, 0.0)))
            .unwrap();
        structure
    }

    #[test]
    fn identity_plus_translation_shifts_every_atom() {
        let structure = base_structure();
        let assembly = Bioassembly {
            id: "1".to_string(),
            chain_ids: vec!["A".to_string()],
            transformations: vec![Transformation::new(
                Matrix3::identity(),
                Vector3::new(0.0, 0.0, 1.0),
            )],
        };
        let generated = generate(&structure, &assembly).unwrap();

        assert_eq!(generated.len(), 1);
        assert_eq!(generated.chains_iter().count(), 1);
        let coords: Vec<Point3<f64>> =
            generated.atoms_iter().map(|(_, atom)| atom.coord).collect();
        assert_eq!(
            coords,
            vec![Point3::new(1.0, 2.0, 4.0), Point3::new(2.0, 2.0, 4.0)]
        );
        // The base structure is untouched.
        assert_eq!(
            structure.atoms_iter().next().unwrap().1.coord,
            Point3::new(1.0, 2.0, 3.0)
        );
    }

    #[test]
    fn one_model_per_operator_in_declaration_order() {
        let structure = base_structure();
        let assembly = Bioassembly {
            id: "1".to_string(),
            chain_ids: vec!["B".to_string(), "A".to_string()],
            transformations: vec![
                Transformation::identity(),
                Transformation::new(Matrix3::identity(), Vector3::new(10.0, 0.0, 0.0)),
            ],
        };
        let generated = generate(&structure, &assembly).unwrap();

        assert_eq!(generated.len(), 2);
        let model_ids: Vec<i32> = generated.models_iter().map(|(_, m)| m.id).collect();
        assert_eq!(model_ids, vec![0, 1]);
        // Chains come out sorted by id within each model.
        let (first_key, _) = generated.models_iter().next().unwrap();
        let ids: Vec<&str> = generated
            .model(first_key)
            .unwrap()
            .chain_ids()
            .collect();
        assert_eq!(ids, vec!["A", "B"]);

        // Second model carries the translated copy.
        let second_key = generated.models_iter().nth(1).unwrap().0;
        let coord = generated.chains_of(second_key).next().map(|(key, _)| {
            let residue = generated.residues_of(key).next().unwrap().0;
            generated.atoms_of(residue).next().unwrap().1.coord
        });
        assert_eq!(coord, Some(Point3::new(11.0, 2.0, 3.0)));
    }

    #[test]
    fn assembly_id_zero_returns_the_asymmetric_unit() {
        let structure = base_structure();
        let generated = generate_by_id(&structure, &HashMap::new(), "0").unwrap();
        assert!(structures_equal(&structure, &generated));
    }

    #[test]
    fn unknown_assembly_id_is_a_lookup_error() {
        let structure = base_structure();
        let err = generate_by_id(&structure, &HashMap::new(), "2").unwrap_err();
        assert!(matches!(err, AssemblyError::NotFound { .. }));
    }

    #[test]
    fn missing_chain_is_reported_with_the_assembly_id() {
        let structure = base_structure();
        let assembly = Bioassembly {
            id: "1".to_string(),
            chain_ids: vec!["Z".to_string()],
            transformations: vec![Transformation::identity()],
        };
        let err = generate(&structure, &assembly).unwrap_err();
        match err {
            AssemblyError::MissingChain { id, chain } => {
                assert_eq!(id, "1");
                assert_eq!(chain, "Z");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn mmcif_file_to_assembly_end_to_end() {
        use crate::core::io::mmcif::{CifDict, MmcifParser};

        let text = "\
data_demo
loop_
_atom_site.group_PDB
_atom_site.id
_atom_site.label_atom_id
_atom_site.label_alt_id
_atom_site.label_comp_id
_atom_site.auth_asym_id
_atom_site.auth_seq_id
_atom_site.Cartn_x
_atom_site.Cartn_y
_atom_site.Cartn_z
ATOM 1 CA . GLY A 1 1.0 2.0 3.0
loop_
_pdbx_struct_assembly_gen.assembly_id
_pdbx_struct_assembly_gen.oper_expression
_pdbx_struct_assembly_gen.asym_id_list
1 1 A
loop_
_pdbx_struct_oper_list.id
_pdbx_struct_oper_list.matrix[1][1]
_pdbx_struct_oper_list.matrix[1][2]
_pdbx_struct_oper_list.matrix[1][3]
_pdbx_struct_oper_list.vector[1]
_pdbx_struct_oper_list.matrix[2][1]
_pdbx_struct_oper_list.matrix[2][2]
_pdbx_struct_oper_list.matrix[2][3]
_pdbx_struct_oper_list.vector[2]
_pdbx_struct_oper_list.matrix[3][1]
_pdbx_struct_oper_list.matrix[3][2]
_pdbx_struct_oper_list.matrix[3][3]
_pdbx_struct_oper_list.vector[3]
1 1.0 0.0 0.0 0.0 0.0 1.0 0.0 0.0 0.0 0.0 1.0 1.0
";
        let dict = CifDict::parse(text).unwrap();
        let structure = MmcifParser::new().build_structure("demo", &dict).unwrap();
        let generated = generate_from_dict(&structure, &dict, "1").unwrap();

        assert_eq!(generated.len(), 1);
        let coord = generated.atoms_iter().next().unwrap().1.coord;
        assert_eq!(coord, Point3::new(1.0, 2.0, 4.0));
    }

    #[test]
    fn transformation_applies_rotation_then_translation() {
        // 90 degree rotation about z: x -> y.
        let rotation = Matrix3::new(0.0, -1.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0);
        let transformation = Transformation::new(rotation, Vector3::new(5.0, 0.0, 0.0));
        let moved = transformation.apply(&Point3::new(1.0, 0.0, 0.0));
        assert!((moved - Point3::new(5.0, 1.0, 0.0)).norm() < 1e-12);
    }
}
