//! Input/output for macromolecular file formats.
//!
//! Each format front-end reduces its input to a stream of
//! [`crate::core::models::builder::AtomRecord`]s and drives the shared
//! structure builder, so grouping and disorder resolution behave
//! identically across formats. The mmCIF reader additionally exposes its
//! flat dictionary, which downstream consumers (notably the assembly
//! generator) query for non-atom categories.

pub mod mmcif;
pub mod pdb;
pub mod traits;

use serde::{Deserialize, Serialize};

/// Caller-chosen parsing behavior, shared by all format front-ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserOptions {
    /// Downgrade recoverable format errors (unparseable coordinate or
    /// occupancy, duplicate atom) to a warning plus a best-effort default
    /// instead of aborting the parse.
    pub permissive: bool,
    /// Use the author-assigned (`auth`) chain and sequence ids where the
    /// format distinguishes them from label ids. Affects only which column
    /// feeds the ids, never the grouping logic.
    pub use_auth_id: bool,
}

impl Default for ParserOptions {
    fn default() -> Self {
        Self {
            permissive: false,
            use_auth_id: true,
        }
    }
}
