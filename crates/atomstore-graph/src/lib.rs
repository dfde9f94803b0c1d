//! Atomstore Graph - The live in-memory hypergraph
//!
//! This crate provides the hypergraph that storage endpoints read from and
//! write into:
//! - Atoms: content-addressed nodes (leaves) and links (ordered compounds)
//! - Values: typed data attached to atoms under key atoms
//! - AtomSpace: the shared container with incoming-set indexing

mod atom;
mod error;
mod space;
mod value;

pub use atom::{Atom, AtomType, Handle};
pub use error::{GraphError, Result};
pub use space::AtomSpace;
pub use value::Value;
