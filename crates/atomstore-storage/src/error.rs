//! Error types for storage operations

use crate::Capability;
use atomstore_graph::GraphError;
use std::io;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage not open: {0}")]
    NotOpen(String),

    #[error("Read-only AtomSpace: cannot write to storage")]
    ReadOnly,

    #[error("{endpoint} does not support {capability}")]
    Unsupported {
        endpoint: String,
        capability: Capability,
    },

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unknown storage type `{0}`; register it before opening")]
    UnknownType(String),

    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    #[error("Storage failed: {0}")]
    Failed(String),

    #[error("Graph error: {0}")]
    Graph(GraphError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<GraphError> for StorageError {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::ReadOnly => StorageError::ReadOnly,
            other => StorageError::Graph(other),
        }
    }
}
