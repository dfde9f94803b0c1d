//! Atomstore - Persistence endpoints for a shared in-memory hypergraph
//!
//! This is the root workspace crate that hosts end-to-end tests.
//! The implementation lives in the workspace member crates.

// Re-export main crates for convenience
pub use atomstore_graph as graph;
pub use atomstore_storage as storage;
