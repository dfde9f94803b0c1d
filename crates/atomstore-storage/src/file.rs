//! File-backed storage
//!
//! A [`MemoryStorage`] persisted as a single bincode snapshot. The snapshot
//! is loaded on `open()` and rewritten on `barrier()` and `close()`.

use crate::memory::Snapshot;
use crate::{Capabilities, MemoryStorage, Result, StorageNode};
use atomstore_graph::{AtomSpace, AtomType, Handle, Value};
use std::fs;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

pub struct FileStorage {
    path: PathBuf,
    store: MemoryStorage,
}

impl FileStorage {
    /// Create a storage node for the snapshot at `path`; the node name is the path
    pub fn new(path: impl Into<String>, space: Arc<AtomSpace>) -> Self {
        let name = path.into();
        Self {
            path: PathBuf::from(&name),
            store: MemoryStorage::new(name, space),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of stored atoms
    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    fn load(&self) -> Result<()> {
        if !self.path.exists() {
            debug!(path = %self.path.display(), "no snapshot yet; starting empty");
            return Ok(());
        }
        let reader = BufReader::new(fs::File::open(&self.path)?);
        let snapshot: Snapshot = bincode::deserialize_from(reader)?;
        self.store.restore(snapshot);
        Ok(())
    }

    /// Write the snapshot next to the target, then rename over it
    fn save(&self) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let tmp = self.path.with_extension("tmp");
        {
            let writer = BufWriter::new(fs::File::create(&tmp)?);
            bincode::serialize_into(writer, &self.store.snapshot())?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), atoms = self.store.len(), "snapshot written");
        Ok(())
    }
}

impl StorageNode for FileStorage {
    fn name(&self) -> &str {
        self.store.name()
    }

    fn type_name(&self) -> &'static str {
        "FileStorage"
    }

    fn open(&self) -> Result<()> {
        self.load()?;
        self.store.open()?;
        info!(path = %self.path.display(), atoms = self.store.len(), "file storage opened");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        if self.store.connected() {
            self.save()?;
        }
        self.store.close()
    }

    fn connected(&self) -> bool {
        self.store.connected()
    }

    fn capabilities(&self) -> Capabilities {
        self.store.capabilities()
    }

    fn monitor(&self) -> String {
        format!(
            "FileStorage {}: {} atoms, {}",
            self.path.display(),
            self.store.len(),
            if self.connected() { "open" } else { "closed" }
        )
    }

    fn fetch_atom(&self, atom: &Handle) -> Result<()> {
        self.store.fetch_atom(atom)
    }

    fn fetch_value(&self, atom: &Handle, key: &Handle) -> Result<()> {
        self.store.fetch_value(atom, key)
    }

    fn fetch_incoming_set(&self, atom: &Handle) -> Result<()> {
        self.store.fetch_incoming_set(atom)
    }

    fn fetch_incoming_by_type(&self, atom: &Handle, atom_type: &AtomType) -> Result<()> {
        self.store.fetch_incoming_by_type(atom, atom_type)
    }

    fn store_atom(&self, atom: &Handle) -> Result<()> {
        self.store.store_atom(atom)
    }

    fn store_value(&self, atom: &Handle, key: &Handle) -> Result<()> {
        self.store.store_value(atom, key)
    }

    fn update_value(&self, atom: &Handle, key: &Handle, delta: &Value) -> Result<()> {
        self.store.update_value(atom, key, delta)
    }

    fn fetch_all_of_type(&self, atom_type: &AtomType) -> Result<()> {
        self.store.fetch_all_of_type(atom_type)
    }

    fn load_whole_graph(&self) -> Result<()> {
        self.store.load_whole_graph()
    }

    fn store_whole_graph(&self) -> Result<()> {
        self.store.store_whole_graph()
    }

    fn pre_remove_atom(&self, atom: &Handle, recursive: bool) -> Result<()> {
        self.store.pre_remove_atom(atom, recursive)
    }

    fn post_remove_atom(&self, atom: &Handle, recursive: bool, extracted_ok: bool) -> Result<()> {
        self.store.post_remove_atom(atom, recursive, extracted_ok)
    }

    fn barrier(&self) -> Result<()> {
        if self.store.connected() {
            self.save()?;
        }
        Ok(())
    }
}
