//! Atomstore Storage - Persistence endpoints for the live hypergraph
//!
//! This crate provides:
//! - The storage node contract (capability-flagged, layered hooks)
//! - A caller-facing endpoint enforcing open/read-only/capability checks
//!   and the two-phase removal protocol
//! - Proxy policies: pass-through, caching, round-robin reads and
//!   adaptive write-back buffering
//! - Declarative endpoint records and a type registry
//! - A control channel driven through ordinary value writes
//! - In-memory and file-backed reference backends

mod capability;
mod config;
mod control;
mod endpoint;
mod error;
mod file;
mod memory;
mod provider;
mod proxy;
mod registry;
pub mod testing;

pub use capability::{Capabilities, Capability};
pub use config::{Delegates, EndpointSpec, ParameterRecord, ProxyParameters, Target, TargetSpecs};
pub use control::ControlKey;
pub use endpoint::StorageEndpoint;
pub use error::{Result, StorageError};
pub use file::FileStorage;
pub use memory::{MemoryStorage, QueryEvaluator};
pub use provider::{unsupported, StorageNode};
pub use proxy::{
    CachingProxy, PassThruProxy, QueueAverages, SequentialReadProxy, WriteBufferConfig,
    WriteBufferProxy, WriteBufferStats,
};
pub use registry::{Constructor, Registry};
