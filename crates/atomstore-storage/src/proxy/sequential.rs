use super::{close_all, open_all, ProxyCore};
use crate::registry::ProxyType;
use crate::{Capabilities, ProxyParameters, Registry, Result, StorageNode};
use atomstore_graph::{AtomSpace, AtomType, Handle};
use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::info;

/// Spreads reads over equivalent replicas, one delegate per call
///
/// Each read goes to the delegate under the cursor and is followed by a
/// barrier on that delegate; the cursor then moves on, wrapping. A failed
/// read leaves the cursor where it was. `barrier()` reaches every
/// delegate. With no delegates every read is a no-op.
pub struct SequentialReadProxy {
    core: ProxyCore,
    readers: RwLock<Vec<Arc<dyn StorageNode>>>,
    cursor: Mutex<usize>,
    opened: AtomicBool,
}

impl SequentialReadProxy {
    pub fn new(name: impl Into<String>, space: Arc<AtomSpace>) -> Self {
        Self::with_registry(name, space, Arc::new(Registry::with_defaults()))
    }

    pub fn with_registry(
        name: impl Into<String>,
        space: Arc<AtomSpace>,
        registry: Arc<Registry>,
    ) -> Self {
        Self {
            core: ProxyCore::new(name, space, registry),
            readers: RwLock::new(Vec::new()),
            cursor: Mutex::new(0),
            opened: AtomicBool::new(false),
        }
    }

    /// Index of the delegate that will serve the next read
    pub fn cursor(&self) -> usize {
        *self.cursor.lock()
    }

    fn rotate(&self, read: impl FnOnce(&dyn StorageNode) -> Result<()>) -> Result<()> {
        let readers = self.readers.read();
        if readers.is_empty() {
            return Ok(());
        }
        let mut cursor = self.cursor.lock();
        let index = *cursor % readers.len();
        let reader = &readers[index];

        read(reader.as_ref())?;
        reader.barrier()?;
        *cursor = (index + 1) % readers.len();
        Ok(())
    }
}

impl ProxyType for SequentialReadProxy {
    fn create(name: &str, space: Arc<AtomSpace>, registry: Arc<Registry>) -> Self {
        Self::with_registry(name, space, registry)
    }
}

impl StorageNode for SequentialReadProxy {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn type_name(&self) -> &'static str {
        "SequentialReadProxy"
    }

    fn open(&self) -> Result<()> {
        let readers = self.core.setup()?;
        open_all(&readers)?;
        info!(proxy = %self.name(), readers = readers.len(), "sequential read proxy opened");

        *self.readers.write() = readers;
        *self.cursor.lock() = 0;
        self.opened.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.opened.store(false, Ordering::SeqCst);
        let readers = std::mem::take(&mut *self.readers.write());
        close_all(&readers)
    }

    fn connected(&self) -> bool {
        self.opened.load(Ordering::SeqCst) && self.readers.read().iter().all(|r| r.connected())
    }

    /// Reads every delegate supports; any of them may serve the next call
    fn capabilities(&self) -> Capabilities {
        self.readers
            .read()
            .iter()
            .fold(Capabilities::readers(), |caps, reader| {
                caps.intersect(reader.capabilities())
            })
    }

    fn monitor(&self) -> String {
        let readers = self.readers.read();
        let mut report = format!(
            "SequentialReadProxy {}: {} readers, next {}\n",
            self.name(),
            readers.len(),
            self.cursor()
        );
        for reader in readers.iter() {
            report.push_str(&format!("  {}\n", reader.monitor()));
        }
        report
    }

    fn set_parameters(&self, parameters: ProxyParameters) -> Result<()> {
        self.core.set_parameters(parameters)
    }

    fn fetch_atom(&self, atom: &Handle) -> Result<()> {
        self.rotate(|reader| reader.fetch_atom(atom))
    }

    fn fetch_value(&self, atom: &Handle, key: &Handle) -> Result<()> {
        self.rotate(|reader| reader.fetch_value(atom, key))
    }

    fn fetch_incoming_set(&self, atom: &Handle) -> Result<()> {
        self.rotate(|reader| reader.fetch_incoming_set(atom))
    }

    fn fetch_incoming_by_type(&self, atom: &Handle, atom_type: &AtomType) -> Result<()> {
        self.rotate(|reader| reader.fetch_incoming_by_type(atom, atom_type))
    }

    fn fetch_all_of_type(&self, atom_type: &AtomType) -> Result<()> {
        self.rotate(|reader| reader.fetch_all_of_type(atom_type))
    }

    fn barrier(&self) -> Result<()> {
        for reader in self.readers.read().iter() {
            reader.barrier()?;
        }
        Ok(())
    }
}
