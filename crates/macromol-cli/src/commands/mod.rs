pub mod assembly;
pub mod convert;
pub mod info;

use crate::error::{CliError, Result};
use macromol::core::io::mmcif::{CifDict, MmcifFile};
use macromol::core::io::pdb::{PdbFile, PdbMetadata};
use macromol::core::io::traits::StructureReader;
use macromol::core::io::ParserOptions;
use macromol::core::models::structure::Structure;
use std::path::Path;

/// A parsed input file together with the format-specific payload the
/// assembly generator needs (the flat mmCIF dictionary or the captured
/// REMARK 350 lines).
pub enum LoadedFile {
    Mmcif {
        structure: Structure,
        dict: CifDict,
    },
    Pdb {
        structure: Structure,
        metadata: PdbMetadata,
    },
}

impl LoadedFile {
    pub fn structure(&self) -> &Structure {
        match self {
            LoadedFile::Mmcif { structure, .. } => structure,
            LoadedFile::Pdb { structure, .. } => structure,
        }
    }
}

pub fn load(path: &Path, options: &ParserOptions) -> Result<LoadedFile> {
    let extension = path
        .extension()
        .and_then(|extension| extension.to_str())
        .map(str::to_ascii_lowercase)
        .unwrap_or_default();
    match extension.as_str() {
        "cif" | "mmcif" => {
            let (structure, dict) =
                MmcifFile::read_from_path(path, options).map_err(|source| CliError::Mmcif {
                    path: path.to_path_buf(),
                    source,
                })?;
            Ok(LoadedFile::Mmcif { structure, dict })
        }
        "pdb" | "ent" => {
            let (structure, metadata) =
                PdbFile::read_from_path(path, options).map_err(|source| CliError::Pdb {
                    path: path.to_path_buf(),
                    source,
                })?;
            Ok(LoadedFile::Pdb {
                structure,
                metadata,
            })
        }
        _ => Err(CliError::Argument(format!(
            "cannot infer format of '{}' (expected .cif, .mmcif, .pdb or .ent)",
            path.display()
        ))),
    }
}
