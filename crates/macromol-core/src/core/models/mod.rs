//! # Core Models Module
//!
//! The fundamental data structures representing a macromolecular structure
//! as a Structure → Model → Chain → Residue → Atom hierarchy.
//!
//! ## Overview
//!
//! A [`structure::Structure`] owns every node of its tree through per-level
//! slot-map arenas; parent links are plain arena keys, so the tree has no
//! ownership cycles and subtrees disappear when removed from their parent.
//! The models are designed to:
//!
//! - **Preserve file order** - children keep insertion order next to an
//!   id index for O(1) lookup
//! - **Enforce identity invariants** - sibling ids are unique; adds and
//!   renames validate atomically and never leave partial state
//! - **Represent disorder faithfully** - altloc atom variants and
//!   point-mutation residue variants group behind a single selection
//! - **Locate any entity** - lazily cached full ids, invalidated on rename
//!
//! ## Key Components
//!
//! - [`atom`] - atom leaves and altloc disorder groups
//! - [`residue`] - composite residue ids and point-mutation groups
//! - [`chain`] / [`model`] - the intermediate container levels
//! - [`structure`] - the arena-owning root with all tree operations
//! - [`builder`] - the record-stream state machine used by every parser
//! - [`hierarchy`] - dynamic entity handles, full ids, level unfolding
//! - [`entity`] - the shared child container, errors, and annotations
//! - [`ids`] - typed arena keys

pub mod atom;
pub mod builder;
pub mod chain;
pub mod entity;
pub mod hierarchy;
pub mod ids;
pub mod model;
pub mod residue;
pub mod structure;
