use super::dict::CifDict;
use super::MmcifError;
use crate::core::io::traits::StructureReader;
use crate::core::io::ParserOptions;
use crate::core::models::builder::{AtomRecord, StructureBuilder};
use crate::core::models::structure::Structure;
use nalgebra::Point3;
use std::fs;
use std::io::BufRead;
use std::path::Path;
use tracing::warn;

/// Builds [`Structure`]s from the `_atom_site` loop of a flat mmCIF
/// dictionary.
///
/// Consecutive rows sharing (model number, chain id, residue id) group
/// into one residue; altloc and point-mutation disorder resolve through
/// the shared [`StructureBuilder`]. Model ids are reassigned positionally
/// (0..N-1) while `serial_num` preserves the file's
/// `pdbx_PDB_model_num`.
#[derive(Debug, Clone, Default)]
pub struct MmcifParser {
    options: ParserOptions,
}

impl MmcifParser {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ParserOptions) -> Self {
        Self { options }
    }

    /// Parses mmCIF text into a structure with the given id.
    pub fn parse_str(&self, id: &str, text: &str) -> Result<Structure, MmcifError> {
        let dict = CifDict::parse(text)?;
        self.build_structure(id, &dict)
    }

    /// Parses a file, returning the structure and the flat dictionary so
    /// that callers can query further categories (assemblies, metadata).
    /// The file stem becomes the structure id.
    pub fn parse_path<P: AsRef<Path>>(&self, path: P) -> Result<(Structure, CifDict), MmcifError> {
        let id = path
            .as_ref()
            .file_stem()
            .and_then(|stem| stem.to_str())
            .unwrap_or("structure")
            .to_string();
        let text = fs::read_to_string(path)?;
        let dict = CifDict::parse(&text)?;
        let structure = self.build_structure(&id, &dict)?;
        Ok((structure, dict))
    }

    /// Builds a structure from an already-tokenized dictionary.
    pub fn build_structure(&self, id: &str, dict: &CifDict) -> Result<Structure, MmcifError> {
        let names = required(dict, "_atom_site.label_atom_id")?;
        let row_count = names.len();

        let comps = required(dict, "_atom_site.label_comp_id")?;
        let xs = required(dict, "_atom_site.Cartn_x")?;
        let ys = required(dict, "_atom_site.Cartn_y")?;
        let zs = required(dict, "_atom_site.Cartn_z")?;

        let label_asym = optional(dict, "_atom_site.label_asym_id");
        let auth_asym = optional(dict, "_atom_site.auth_asym_id");
        let chains = if self.options.use_auth_id {
            auth_asym.or(label_asym)
        } else {
            label_asym.or(auth_asym)
        }
        .ok_or(MmcifError::MissingColumn {
            item: "_atom_site.label_asym_id".to_string(),
        })?;

        let label_seq = optional(dict, "_atom_site.label_seq_id");
        let auth_seq = optional(dict, "_atom_site.auth_seq_id");
        let (primary_seq, fallback_seq) = if self.options.use_auth_id {
            (auth_seq, label_seq)
        } else {
            (label_seq, auth_seq)
        };
        if primary_seq.is_none() && fallback_seq.is_none() {
            return Err(MmcifError::MissingColumn {
                item: "_atom_site.auth_seq_id".to_string(),
            });
        }

        let serials = optional(dict, "_atom_site.id");
        let altlocs = optional(dict, "_atom_site.label_alt_id");
        let icodes = optional(dict, "_atom_site.pdbx_PDB_ins_code");
        let occupancies = optional(dict, "_atom_site.occupancy");
        let bfactors = optional(dict, "_atom_site.B_iso_or_equiv");
        let elements = optional(dict, "_atom_site.type_symbol");
        let groups = optional(dict, "_atom_site.group_PDB");
        let model_nums = optional(dict, "_atom_site.pdbx_PDB_model_num");

        for (item, column) in [
            ("_atom_site.label_comp_id", Some(comps)),
            ("_atom_site.label_asym_id", Some(chains)),
            ("_atom_site.Cartn_x", Some(xs)),
            ("_atom_site.Cartn_y", Some(ys)),
            ("_atom_site.Cartn_z", Some(zs)),
            ("_atom_site.id", serials),
            ("_atom_site.label_alt_id", altlocs),
            ("_atom_site.occupancy", occupancies),
            ("_atom_site.pdbx_PDB_model_num", model_nums),
        ] {
            if let Some(column) = column {
                if column.len() != row_count {
                    return Err(MmcifError::ColumnLengthMismatch {
                        item: item.to_string(),
                        expected: row_count,
                        found: column.len(),
                    });
                }
            }
        }

        let mut builder = StructureBuilder::new(id).permissive(self.options.permissive);
        for row in 0..row_count {
            let serial_str = cell(serials, row);
            let serial = serial_str.and_then(|value| value.parse::<i64>().ok());

            let coord = match self.parse_coords(xs, ys, zs, row, serial_str) {
                Ok(coord) => coord,
                Err(error) if self.options.permissive => {
                    warn!(row, "skipping atom with unparseable coordinates: {error}");
                    continue;
                }
                Err(error) => return Err(error),
            };

            let seq = match self.parse_seq(primary_seq, fallback_seq, row) {
                Ok(seq) => seq,
                Err(error) if self.options.permissive => {
                    warn!(row, "skipping atom without a sequence id: {error}");
                    continue;
                }
                Err(error) => return Err(error),
            };

            let occupancy =
                self.parse_optional_f64(occupancies, "_atom_site.occupancy", row)?;
            let bfactor =
                self.parse_optional_f64(bfactors, "_atom_site.B_iso_or_equiv", row)?;

            let model_num = match cell(model_nums, row) {
                Some(value) => value.parse::<i32>().map_err(|_| MmcifError::InvalidValue {
                    item: "_atom_site.pdbx_PDB_model_num".to_string(),
                    value: value.to_string(),
                    row,
                })?,
                None => 1,
            };

            let record = AtomRecord {
                serial,
                name: names[row].clone(),
                altloc: cell(altlocs, row).map(str::to_string),
                res_name: comps[row].clone(),
                chain_id: chains[row].clone(),
                res_seq: seq,
                icode: cell(icodes, row).and_then(|value| value.chars().next()),
                hetero: cell(groups, row) == Some("HETATM"),
                coord,
                occupancy,
                bfactor,
                element: cell(elements, row).unwrap_or_default().to_string(),
                model_num,
            };
            builder.add_record(&record)?;
        }
        Ok(builder.finish())
    }

    fn parse_coords(
        &self,
        xs: &[String],
        ys: &[String],
        zs: &[String],
        row: usize,
        serial: Option<&str>,
    ) -> Result<Point3<f64>, MmcifError> {
        let mut values = [0.0f64; 3];
        for (slot, column) in values.iter_mut().zip([xs, ys, zs]) {
            let raw = &column[row];
            *slot = normalize(raw)
                .and_then(|value| value.parse::<f64>().ok())
                .ok_or_else(|| MmcifError::BadCoordinate {
                    serial: serial.unwrap_or("?").to_string(),
                    value: raw.clone(),
                })?;
        }
        Ok(Point3::new(values[0], values[1], values[2]))
    }

    /// The chosen sequence column feeds the residue id; rows where it is
    /// unknown (water and ligand rows leave `label_seq_id` blank) fall
    /// back to the other column.
    fn parse_seq(
        &self,
        primary: Option<&[String]>,
        fallback: Option<&[String]>,
        row: usize,
    ) -> Result<i32, MmcifError> {
        let raw = cell(primary, row).or_else(|| cell(fallback, row)).ok_or_else(|| {
            MmcifError::InvalidValue {
                item: "_atom_site.auth_seq_id".to_string(),
                value: "?".to_string(),
                row,
            }
        })?;
        raw.parse::<i32>().map_err(|_| MmcifError::InvalidValue {
            item: "_atom_site.auth_seq_id".to_string(),
            value: raw.to_string(),
            row,
        })
    }

    /// Missing occupancy is "unknown", not an error; an unparseable number
    /// is an error unless the permissive mode downgrades it.
    fn parse_optional_f64(
        &self,
        column: Option<&[String]>,
        item: &str,
        row: usize,
    ) -> Result<Option<f64>, MmcifError> {
        let Some(raw) = cell(column, row) else {
            return Ok(None);
        };
        match raw.parse::<f64>() {
            Ok(value) => Ok(Some(value)),
            Err(_) if self.options.permissive => {
                warn!(row, item, value = raw, "treating unparseable number as unknown");
                Ok(None)
            }
            Err(_) => Err(MmcifError::InvalidValue {
                item: item.to_string(),
                value: raw.to_string(),
                row,
            }),
        }
    }
}

/// Marker for the mmCIF format in the generic reader interface; the
/// metadata it yields is the flat dictionary.
pub struct MmcifFile;

impl StructureReader for MmcifFile {
    type Metadata = CifDict;
    type Error = MmcifError;

    fn read_from(
        reader: &mut impl BufRead,
        id: &str,
        options: &ParserOptions,
    ) -> Result<(Structure, Self::Metadata), Self::Error> {
        let dict = CifDict::read_from(reader)?;
        let structure = MmcifParser::with_options(*options).build_structure(id, &dict)?;
        Ok((structure, dict))
    }
}

fn required<'d>(dict: &'d CifDict, item: &str) -> Result<&'d [String], MmcifError> {
    dict.get(item)
        .map(|value| value.as_slice())
        .ok_or_else(|| MmcifError::MissingColumn {
            item: item.to_string(),
        })
}

fn optional<'d>(dict: &'d CifDict, item: &str) -> Option<&'d [String]> {
    dict.get(item).map(|value| value.as_slice())
}

/// One cell of an optional column, with the mmCIF unknown/inapplicable
/// markers normalized away.
fn cell(column: Option<&[String]>, row: usize) -> Option<&str> {
    column
        .and_then(|values| values.get(row))
        .map(String::as_str)
        .and_then(normalize)
}

fn normalize(value: &str) -> Option<&str> {
    match value {
        "" | "?" | "." => None,
        _ => Some(value),
    }
}
