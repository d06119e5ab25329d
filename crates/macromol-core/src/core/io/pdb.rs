use crate::core::io::traits::{StructureReader, StructureWriter};
use crate::core::io::ParserOptions;
use crate::core::models::builder::{AtomRecord, StructureBuilder};
use crate::core::models::entity::HierarchyError;
use crate::core::models::structure::Structure;
use nalgebra::Point3;
use std::io::{self, BufRead, Write};
use thiserror::Error;

/// Non-atom payload captured while reading a PDB file.
///
/// The raw `REMARK 350` lines are kept verbatim for the biological
/// assembly parser.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PdbMetadata {
    pub remark350: Vec<String>,
}

#[derive(Debug, Error)]
pub enum PdbError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Parse error on line {line}: {kind}")]
    Parse {
        line: usize,
        kind: PdbParseErrorKind,
    },
    #[error("Missing required record: {0}")]
    MissingRecord(String),
    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}

#[derive(Debug, Error)]
pub enum PdbParseErrorKind {
    #[error("Invalid integer format in columns {columns} (value: '{value}')")]
    InvalidInt { columns: String, value: String },
    #[error("Invalid float format in columns {columns} (value: '{value}')")]
    InvalidFloat { columns: String, value: String },
    #[error("Required field in columns {columns} is empty")]
    MissingRequiredField { columns: String },
    #[error("Line is too short for ATOM/HETATM record (must be at least 54 chars)")]
    LineTooShort,
}

fn slice_and_trim(line: &str, start: usize, end: usize) -> &str {
    line.get(start..end).unwrap_or("").trim()
}

/// The legacy fixed-column PDB format.
///
/// The reader is deliberately thin: per-field string slicing that reduces
/// each ATOM/HETATM line to an [`AtomRecord`] and hands it to the shared
/// structure builder, which owns all grouping and disorder logic.
pub struct PdbFile;

impl StructureReader for PdbFile {
    type Metadata = PdbMetadata;
    type Error = PdbError;

    fn read_from(
        reader: &mut impl BufRead,
        id: &str,
        options: &ParserOptions,
    ) -> Result<(Structure, Self::Metadata), Self::Error> {
        let mut builder = StructureBuilder::new(id).permissive(options.permissive);
        let mut metadata = PdbMetadata::default();
        let mut current_model_num: i32 = 1;
        let mut seen_atoms = false;

        for (line_index, line_result) in reader.lines().enumerate() {
            let line = line_result?;
            let line_no = line_index + 1;
            let record_type = slice_and_trim(&line, 0, 6);

            match record_type {
                "ATOM" | "HETATM" => {
                    match parse_atom_line(&line, line_no, record_type == "HETATM") {
                        Ok(mut record) => {
                            record.model_num = current_model_num;
                            seen_atoms = true;
                            builder.add_record(&record)?;
                        }
                        Err(error) if options.permissive => {
                            tracing::warn!(line = line_no, "skipping malformed atom line: {error}");
                        }
                        Err(error) => return Err(error),
                    }
                }
                "MODEL" => {
                    let serial_str = line.get(6..).map(str::trim).unwrap_or("");
                    current_model_num =
                        serial_str.parse().map_err(|_| PdbError::Parse {
                            line: line_no,
                            kind: PdbParseErrorKind::InvalidInt {
                                columns: "11-14".into(),
                                value: serial_str.into(),
                            },
                        })?;
                }
                "ENDMDL" => {}
                "REMARK" => {
                    if line.starts_with("REMARK 350") {
                        metadata.remark350.push(line.clone());
                    }
                }
                "END" => break,
                _ => {}
            }
        }

        if !seen_atoms {
            return Err(PdbError::MissingRecord("ATOM/HETATM records".into()));
        }
        Ok((builder.finish(), metadata))
    }
}

fn parse_atom_line(line: &str, line_no: usize, hetero: bool) -> Result<AtomRecord, PdbError> {
    if line.len() < 54 {
        return Err(PdbError::Parse {
            line: line_no,
            kind: PdbParseErrorKind::LineTooShort,
        });
    }

    let name = slice_and_trim(line, 12, 16);
    if name.is_empty() {
        return Err(PdbError::Parse {
            line: line_no,
            kind: PdbParseErrorKind::MissingRequiredField {
                columns: "13-16".into(),
            },
        });
    }

    let serial_str = slice_and_trim(line, 6, 11);
    let serial = if serial_str.is_empty() {
        None
    } else {
        Some(serial_str.parse::<i64>().map_err(|_| PdbError::Parse {
            line: line_no,
            kind: PdbParseErrorKind::InvalidInt {
                columns: "7-11".into(),
                value: serial_str.into(),
            },
        })?)
    };

    let altloc = slice_and_trim(line, 16, 17);
    let res_name = slice_and_trim(line, 17, 20);
    let chain_id = slice_and_trim(line, 21, 22);
    let seq_str = slice_and_trim(line, 22, 26);
    let res_seq: i32 = seq_str.parse().map_err(|_| PdbError::Parse {
        line: line_no,
        kind: PdbParseErrorKind::InvalidInt {
            columns: "23-26".into(),
            value: seq_str.into(),
        },
    })?;
    let icode = slice_and_trim(line, 26, 27).chars().next();

    let mut coords = [0.0f64; 3];
    for (slot, (start, end)) in coords.iter_mut().zip([(30, 38), (38, 46), (46, 54)]) {
        let value = slice_and_trim(line, start, end);
        *slot = value.parse().map_err(|_| PdbError::Parse {
            line: line_no,
            kind: PdbParseErrorKind::InvalidFloat {
                columns: format!("{}-{}", start + 1, end),
                value: value.into(),
            },
        })?;
    }

    let occupancy = parse_optional_float(line, 54, 60, line_no)?;
    let bfactor = parse_optional_float(line, 60, 66, line_no)?;
    let element = slice_and_trim(line, 76, 78).to_string();

    Ok(AtomRecord {
        serial,
        name: name.to_string(),
        altloc: if altloc.is_empty() {
            None
        } else {
            Some(altloc.to_string())
        },
        res_name: res_name.to_string(),
        chain_id: chain_id.to_string(),
        res_seq,
        icode,
        hetero,
        coord: Point3::new(coords[0], coords[1], coords[2]),
        occupancy,
        bfactor,
        element,
        model_num: 1,
    })
}

/// An empty field is "unknown" (distinct from zero); an unparseable one is
/// an error.
fn parse_optional_float(
    line: &str,
    start: usize,
    end: usize,
    line_no: usize,
) -> Result<Option<f64>, PdbError> {
    let value = slice_and_trim(line, start, end);
    if value.is_empty() {
        return Ok(None);
    }
    value
        .parse()
        .map(Some)
        .map_err(|_| PdbError::Parse {
            line: line_no,
            kind: PdbParseErrorKind::InvalidFloat {
                columns: format!("{}-{}", start + 1, end),
                value: value.into(),
            },
        })
}

impl StructureWriter for PdbFile {
    type Error = PdbError;

    /// Serializes the structure, reconstructing every per-atom field.
    ///
    /// Every disorder variant is written (all altlocs, all point-mutation
    /// residues). MODEL/ENDMDL records wrap the atoms only for multi-model
    /// structures, and exactly one END terminates the file either way.
    fn write_to(structure: &Structure, writer: &mut impl Write) -> Result<(), Self::Error> {
        let multi_model = structure.len() > 1;
        let mut next_serial: i64 = 1;

        for (model_key, model) in structure.models_iter() {
            if multi_model {
                writeln!(writer, "MODEL     {:>4}", model.serial_num)?;
            }
            for (_, chain) in structure.chains_of(model_key) {
                let chain_char = chain.id.chars().next().unwrap_or(' ');
                for (_, residue_entry) in chain.residue_entries() {
                    for residue_key in residue_entry.keys() {
                        let residue = structure.residue(residue_key).expect("tree is consistent");
                        let record_type = if residue.id.het.is_hetero() {
                            "HETATM"
                        } else {
                            "ATOM"
                        };
                        for (_, atom_entry) in residue.atom_entries() {
                            for atom_key in atom_entry.keys() {
                                let atom =
                                    structure.atom(atom_key).expect("tree is consistent");
                                let serial = atom.serial.unwrap_or(next_serial);
                                next_serial = serial + 1;
                                let occupancy = match atom.occupancy {
                                    Some(value) => format!("{:>6.2}", value),
                                    None => " ".repeat(6),
                                };
                                writeln!(
                                    writer,
                                    "{:<6}{:>5} {:<4}{}{:>3} {}{:>4}{}   {:>8.3}{:>8.3}{:>8.3}{}{:>6.2}          {:>2}",
                                    record_type,
                                    serial,
                                    pad_atom_name(&atom.name),
                                    atom.altloc.as_deref().unwrap_or(" "),
                                    residue.name,
                                    chain_char,
                                    residue.id.seq,
                                    residue.id.icode.unwrap_or(' '),
                                    atom.coord.x,
                                    atom.coord.y,
                                    atom.coord.z,
                                    occupancy,
                                    atom.bfactor,
                                    atom.element,
                                )?;
                            }
                        }
                    }
                }
                writeln!(writer, "TER")?;
            }
            if multi_model {
                writeln!(writer, "ENDMDL")?;
            }
        }
        writeln!(writer, "END")?;
        Ok(())
    }
}

/// PDB atom-name alignment: names shorter than four characters start in
/// column 14, four-character names in column 13.
fn pad_atom_name(name: &str) -> String {
    if name.len() >= 4 {
        name.to_string()
    } else {
        format!(" {}", name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::models::structure::structures_equal;
    use std::io::BufReader;

    const SMALL_PDB: &str = "\
HEADER    HYDROLASE
REMARK 350 BIOMOLECULE: 1
REMARK 350 APPLY THE FOLLOWING TO CHAINS: A
REMARK 350   BIOMT1   1  1.000000  0.000000  0.000000        0.00000
REMARK 350   BIOMT2   1  0.000000  1.000000  0.000000        0.00000
REMARK 350   BIOMT3   1  0.000000  0.000000  1.000000        0.00000
ATOM      1  N   ALA A   1      10.000  20.000  30.000  1.00 15.00           N
ATOM      2  CA  ALA A   1      11.000  21.000  31.000  1.00 16.00           C
ATOM      3  CA ASER A   2      12.000  22.000  32.000  0.60 17.00           C
ATOM      4  CA BSER A   2      12.500  22.000  32.000  0.40 17.00           C
HETATM    5  O   HOH A 101      13.000  23.000  33.000  1.00 18.00           O
END
";

    fn read(text: &str) -> (Structure, PdbMetadata) {
        let mut reader = BufReader::new(text.as_bytes());
        PdbFile::read_from(&mut reader, "test", &ParserOptions::default()).unwrap()
    }

    #[test]
    fn reads_atoms_hetatms_and_disorder() {
        let (structure, metadata) = read(SMALL_PDB);
        assert_eq!(structure.len(), 1);
        assert_eq!(structure.residues_iter().count(), 3);
        // Two altlocs collapse into one disordered position.
        assert_eq!(structure.atoms_iter().count(), 4);

        let (_, residue) = structure.residues_iter().nth(1).unwrap();
        let entry = residue.atom_entry("CA").unwrap();
        assert_eq!(entry.as_disordered().unwrap().variant_ids(), vec!["A", "B"]);

        let water = structure.residues_iter().last().unwrap().1;
        assert!(water.id.het.is_hetero());
        assert_eq!(water.id.seq, 101);

        // REMARK 350 lines are captured verbatim for the assembly parser.
        assert_eq!(metadata.remark350.len(), 6);
        assert!(metadata.remark350[0].starts_with("REMARK 350 BIOMOLECULE"));
    }

    #[test]
    fn model_records_split_models_and_keep_serials() {
        let text = "\
MODEL        1
ATOM      1  CA  ALA A   1      10.000  20.000  30.000  1.00 15.00           C
ENDMDL
MODEL        2
ATOM      1  CA  ALA A   1      10.500  20.000  30.000  1.00 15.00           C
ENDMDL
END
";
        let (structure, _) = read(text);
        assert_eq!(structure.len(), 2);
        let models: Vec<(i32, i32)> = structure
            .models_iter()
            .map(|(_, m)| (m.id, m.serial_num))
            .collect();
        assert_eq!(models, vec![(0, 1), (1, 2)]);
    }

    #[test]
    fn missing_occupancy_is_unknown() {
        let text = "\
ATOM      1  CA  ALA A   1      10.000  20.000  30.000
END
";
        let (structure, _) = read(text);
        let atom = structure.atoms_iter().next().unwrap().1;
        assert_eq!(atom.occupancy, None);
    }

    #[test]
    fn short_line_is_rejected() {
        let text = "ATOM      1  CA  ALA A   1      10.000\nEND\n";
        let mut reader = BufReader::new(text.as_bytes());
        let err = PdbFile::read_from(&mut reader, "test", &ParserOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            PdbError::Parse {
                line: 1,
                kind: PdbParseErrorKind::LineTooShort,
            }
        ));
    }

    #[test]
    fn bad_coordinate_is_rejected_with_columns() {
        let text = "\
ATOM      1  CA  ALA A   1      10.000  twenty  30.000  1.00 15.00           C
END
";
        let mut reader = BufReader::new(text.as_bytes());
        let err = PdbFile::read_from(&mut reader, "test", &ParserOptions::default()).unwrap_err();
        match err {
            PdbError::Parse {
                kind: PdbParseErrorKind::InvalidFloat { columns, value },
                ..
            } => {
                assert_eq!(columns, "39-46");
                assert_eq!(value, "twenty");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn empty_file_is_missing_records() {
        let mut reader = BufReader::new("HEADER    EMPTY\nEND\n".as_bytes());
        let err = PdbFile::read_from(&mut reader, "test", &ParserOptions::default()).unwrap_err();
        assert!(matches!(err, PdbError::MissingRecord(_)));
    }

    #[test]
    fn writer_emits_all_altlocs_and_one_end() {
        let (structure, _) = read(SMALL_PDB);
        let mut output = Vec::new();
        PdbFile::write_to(&structure, &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();

        let end_lines = text.lines().filter(|line| line.trim_end() == "END").count();
        assert_eq!(end_lines, 1);
        assert_eq!(text.matches("ATOM  ").count(), 4);
        assert_eq!(text.matches("HETATM").count(), 1);
        assert!(text.contains(" CA ASER"));
        assert!(text.contains(" CA BSER"));
        // Single-model output carries no MODEL/ENDMDL wrapping.
        assert!(!text.contains("MODEL"));
    }

    #[test]
    fn writer_wraps_multi_model_files_with_one_end() {
        let text = "\
MODEL        1
ATOM      1  CA  ALA A   1      10.000  20.000  30.000  1.00 15.00           C
ENDMDL
MODEL        2
ATOM      1  CA  ALA A   1      10.500  20.000  30.000  1.00 15.00           C
ENDMDL
END
";
        let (structure, _) = read(text);
        let mut output = Vec::new();
        PdbFile::write_to(&structure, &mut output).unwrap();
        let written = String::from_utf8(output).unwrap();

        assert_eq!(written.matches("MODEL ").count(), 2);
        assert_eq!(written.matches("ENDMDL").count(), 2);
        // Exactly one terminating END for the whole file, not one per model.
        let end_lines = written
            .lines()
            .filter(|line| line.trim_end() == "END")
            .count();
        assert_eq!(end_lines, 1);
    }

    #[test]
    fn path_round_trip_through_the_reader_and_writer_traits() {
        let (structure, _) = read(SMALL_PDB);
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.pdb");

        PdbFile::write_to_path(&structure, &path).unwrap();
        let (reparsed, _) = PdbFile::read_from_path(&path, &ParserOptions::default()).unwrap();

        // The file stem becomes the structure id.
        assert_eq!(reparsed.id(), "out");
        assert!(structures_equal(&structure, &reparsed));
    }

    #[test]
    fn write_read_round_trip_preserves_the_tree() {
        let (structure, _) = read(SMALL_PDB);
        let mut output = Vec::new();
        PdbFile::write_to(&structure, &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();
        let (reparsed, _) = read(&text);
        assert!(structures_equal(&structure, &reparsed));
    }
}
