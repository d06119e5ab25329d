use super::load;
use crate::cli::ConvertArgs;
use crate::error::Result;
use macromol::core::io::pdb::PdbFile;
use macromol::core::io::traits::StructureWriter;
use macromol::core::io::ParserOptions;
use tracing::info;

pub fn run(args: &ConvertArgs, options: &ParserOptions) -> Result<()> {
    let loaded = load(&args.input, options)?;
    let structure = loaded.structure();
    PdbFile::write_to_path(structure, &args.output).map_err(|source| crate::error::CliError::Pdb {
        path: args.output.clone(),
        source,
    })?;
    info!(
        input = %args.input.display(),
        output = %args.output.display(),
        atoms = structure.atoms_iter().count(),
        "conversion finished"
    );
    Ok(())
}
