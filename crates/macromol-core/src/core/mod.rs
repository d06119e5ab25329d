//! # Core Module
//!
//! The building blocks of the library: the hierarchical structure model,
//! the file-format parsers that populate it, and the biological-assembly
//! generator that expands it.
//!
//! ## Architecture
//!
//! - **Structure representation** ([`models`]) - the entity tree with
//!   identity invariants, disorder resolution, and full-id caching
//! - **File I/O** ([`io`]) - the mmCIF tokenizer/dictionary builder and
//!   structure parser, plus the thin fixed-column PDB reader and writer
//! - **Assembly expansion** ([`assembly`]) - REMARK 350 and mmCIF symmetry
//!   operators applied to chains to reconstruct biological assemblies
//! - **Utilities** ([`utils`]) - static residue classification tables
//!
//! Data flows in one direction: raw text → tokenizer → flat dictionary →
//! record stream → structure builder → [`models::structure::Structure`].
//! The assembly generator consumes a built structure plus the same flat
//! dictionary (or raw REMARK 350 lines) and produces a new structure with
//! replicated, transformed models.

pub mod assembly;
pub mod io;
pub mod models;
pub mod utils;
