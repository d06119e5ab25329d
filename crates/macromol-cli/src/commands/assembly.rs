use super::{load, LoadedFile};
use crate::cli::AssemblyArgs;
use crate::error::{CliError, Result};
use macromol::core::assembly::{self, remark};
use macromol::core::io::pdb::PdbFile;
use macromol::core::io::traits::StructureWriter;
use macromol::core::io::ParserOptions;
use macromol::core::models::structure::Structure;
use tracing::info;

pub fn run(args: &AssemblyArgs, options: &ParserOptions) -> Result<()> {
    let loaded = load(&args.input, options)?;
    let generated: Structure = match &loaded {
        LoadedFile::Mmcif { structure, dict } => {
            assembly::generate_from_dict(structure, dict, &args.assembly_id)?
        }
        LoadedFile::Pdb {
            structure,
            metadata,
        } => {
            let assemblies =
                remark::parse_remark_350(metadata.remark350.iter().map(String::as_str))?;
            assembly::generate_by_id(structure, &assemblies, &args.assembly_id)?
        }
    };

    PdbFile::write_to_path(&generated, &args.output).map_err(|source| CliError::Pdb {
        path: args.output.clone(),
        source,
    })?;
    info!(
        input = %args.input.display(),
        assembly = %args.assembly_id,
        models = generated.len(),
        atoms = generated.atoms_iter().count(),
        output = %args.output.display(),
        "assembly written"
    );
    Ok(())
}
