use macromol::core::assembly::AssemblyError;
use macromol::core::io::mmcif::MmcifError;
use macromol::core::io::pdb::PdbError;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("Failed to parse '{path}': {source}", path = path.display())]
    Mmcif {
        path: PathBuf,
        #[source]
        source: MmcifError,
    },

    #[error("Failed to parse '{path}': {source}", path = path.display())]
    Pdb {
        path: PathBuf,
        #[source]
        source: PdbError,
    },

    #[error(transparent)]
    Assembly(#[from] AssemblyError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid argument: {0}")]
    Argument(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
