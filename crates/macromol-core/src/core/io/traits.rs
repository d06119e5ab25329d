use super::ParserOptions;
use crate::core::models::structure::Structure;
use std::error::Error;
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// A format that can populate a [`Structure`] from text.
///
/// `Metadata` carries whatever the format yields beside the atoms (the
/// flat mmCIF dictionary, captured PDB remark lines); callers that only
/// want the structure can discard it.
pub trait StructureReader {
    type Metadata;
    type Error: Error + From<io::Error>;

    /// Reads a structure from a buffered reader, using `id` as the
    /// structure id.
    fn read_from(
        reader: &mut impl BufRead,
        id: &str,
        options: &ParserOptions,
    ) -> Result<(Structure, Self::Metadata), Self::Error>;

    /// Reads a structure from a file path; the file stem becomes the
    /// structure id.
    fn read_from_path<P: AsRef<Path>>(
        path: P,
        options: &ParserOptions,
    ) -> Result<(Structure, Self::Metadata), Self::Error> {
        let id = path
            .as_ref()
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("structure")
            .to_string();
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        Self::read_from(&mut reader, &id, options)
    }
}

/// A format that can serialize a [`Structure`] back to text.
pub trait StructureWriter {
    type Error: Error + From<io::Error>;

    fn write_to(structure: &Structure, writer: &mut impl Write) -> Result<(), Self::Error>;

    fn write_to_path<P: AsRef<Path>>(
        structure: &Structure,
        path: P,
    ) -> Result<(), Self::Error> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        Self::write_to(structure, &mut writer)
    }
}
