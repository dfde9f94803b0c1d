//! Error types for graph operations

use thiserror::Error;

pub type Result<T> = std::result::Result<T, GraphError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("AtomSpace is read-only")]
    ReadOnly,

    #[error("Atom not in AtomSpace: {0}")]
    NotFound(String),
}
