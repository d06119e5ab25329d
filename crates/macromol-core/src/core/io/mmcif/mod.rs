//! mmCIF/PDBx reading: a line-oriented tokenizer that flattens a file into
//! a `"_category.item"` → value(s) dictionary, and a structure parser that
//! walks the `_atom_site` loop of that dictionary.

pub mod dict;
pub mod parser;

pub use dict::{CifDict, CifValue};
pub use parser::{MmcifFile, MmcifParser};

use crate::core::models::entity::HierarchyError;
use std::io;
use thiserror::Error;

/// Errors raised while tokenizing mmCIF text or building a structure from
/// the flat dictionary. Format errors are fatal for the current parse; a
/// half-built hierarchy with unresolved disorder is worse than failing
/// fast.
#[derive(Debug, Error)]
pub enum MmcifError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("syntax error on line {line}: {message}")]
    Syntax { line: usize, message: String },

    #[error("unterminated quoted string on line {line}")]
    UnterminatedQuote { line: usize },

    #[error("unterminated multi-line text field starting on line {line}")]
    UnterminatedTextField { line: usize },

    #[error("malformed loop in category `{category}` starting on line {line}: data rows do not fill the declared columns")]
    MalformedLoop { category: String, line: usize },

    #[error("missing required item `{item}`")]
    MissingColumn { item: String },

    #[error("column `{item}` has {found} rows, expected {expected}")]
    ColumnLengthMismatch {
        item: String,
        expected: usize,
        found: usize,
    },

    #[error("bad coordinate for atom serial {serial}: `{value}`")]
    BadCoordinate { serial: String, value: String },

    #[error("invalid value `{value}` for item `{item}` in row {row}")]
    InvalidValue {
        item: String,
        value: String,
        row: usize,
    },

    #[error(transparent)]
    Hierarchy(#[from] HierarchyError),
}
