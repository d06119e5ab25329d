//! Small shared utilities: static residue-name tables and classification
//! helpers used during structure construction.

pub mod residues;
