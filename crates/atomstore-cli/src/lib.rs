//! Commands behind the `atomstore` binary
//!
//! Each command returns a report; printing is left to the binary.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::info;

use atomstore_graph::AtomSpace;
use atomstore_storage::{
    Capabilities, EndpointSpec, FileStorage, ProxyParameters, Registry, Result, StorageEndpoint,
    StorageError, StorageNode, WriteBufferProxy, WriteBufferStats,
};

/// Atom counts of one snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct SnapshotStats {
    pub atoms: usize,
    pub types: BTreeMap<String, usize>,
}

#[derive(Debug, Clone)]
pub struct CopyReport {
    /// Atoms handed to the write buffer
    pub atoms_queued: usize,
    pub buffer: WriteBufferStats,
    pub elapsed: Duration,
}

#[derive(Debug, Clone)]
pub struct CheckReport {
    pub endpoint: String,
    pub connected: bool,
    pub capabilities: Capabilities,
    /// Monitor output, taken while the endpoint was open
    pub monitor: String,
}

/// Open a snapshot file and load all of it into `space`
pub fn load_file(path: &Path, space: &Arc<AtomSpace>) -> Result<StorageEndpoint> {
    if !path.exists() {
        return Err(StorageError::Configuration(format!(
            "no such snapshot: {}",
            path.display()
        )));
    }
    let node = Arc::new(FileStorage::new(path.to_string_lossy(), Arc::clone(space)));
    let endpoint = StorageEndpoint::new(node, Arc::clone(space));
    endpoint.open()?;
    endpoint.load_whole_graph()?;
    Ok(endpoint)
}

pub fn stats(file: &Path) -> Result<SnapshotStats> {
    let space = Arc::new(AtomSpace::new());
    let endpoint = load_file(file, &space)?;
    // Only reading: nothing to write back
    space.set_read_only(true);

    let mut types: BTreeMap<String, usize> = BTreeMap::new();
    for atom in space.atoms() {
        *types.entry(atom.atom_type().to_string()).or_default() += 1;
    }
    endpoint.close()?;

    Ok(SnapshotStats {
        atoms: space.len(),
        types,
    })
}

/// Copy every atom of `src` into `dst` through a write buffer
pub fn copy(src: &Path, dst: &Path, decay: f64) -> Result<CopyReport> {
    let space = Arc::new(AtomSpace::new());
    let source = load_file(src, &space)?;
    source.close()?;

    let target: Arc<dyn StorageNode> =
        Arc::new(FileStorage::new(dst.to_string_lossy(), Arc::clone(&space)));
    let buffer = Arc::new(WriteBufferProxy::new("copy", Arc::clone(&space)));
    buffer.set_parameters(ProxyParameters::single(target).with_decay(decay))?;
    let sink = StorageEndpoint::new(buffer.clone(), Arc::clone(&space));
    sink.open()?;

    let start = Instant::now();
    let atoms = space.atoms();
    for atom in &atoms {
        sink.store_atom(atom)?;
    }
    info!(atoms = atoms.len(), "all atoms queued");
    sink.close()?;

    Ok(CopyReport {
        atoms_queued: atoms.len(),
        buffer: buffer.stats(),
        elapsed: start.elapsed(),
    })
}

/// Build the endpoint a JSON record describes, open it and report on it
pub fn check(config: &Path) -> Result<CheckReport> {
    let spec = EndpointSpec::from_json_file(config)?;
    let space = Arc::new(AtomSpace::new());
    let endpoint = StorageEndpoint::from_spec(&spec, space, Arc::new(Registry::with_defaults()))?;

    endpoint.open()?;
    let report = CheckReport {
        endpoint: endpoint.to_string(),
        connected: endpoint.connected(),
        capabilities: endpoint.capabilities(),
        monitor: endpoint.monitor(),
    };
    endpoint.close()?;
    Ok(report)
}
