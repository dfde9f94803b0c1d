//! Test support: a backend that records every hook it receives
//!
//! `RecordingStorage` wraps a [`MemoryStorage`] and logs each call before
//! delegating, so tests can assert on exactly what a proxy forwarded.
//! Write latency, write failures and removal failures can be injected.

use crate::{Capabilities, MemoryStorage, Result, StorageError, StorageNode};
use atomstore_graph::{AtomSpace, AtomType, Handle, Value};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// One hook invocation
#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Open,
    Close,
    FetchAtom(Handle),
    FetchValue(Handle, Handle),
    FetchIncomingSet(Handle),
    FetchIncomingByType(Handle, AtomType),
    FetchAllOfType(AtomType),
    LoadWholeGraph,
    StoreWholeGraph,
    StoreAtom(Handle),
    StoreValue(Handle, Handle),
    UpdateValue(Handle, Handle, Value),
    PreRemove(Handle, bool),
    PostRemove(Handle, bool, bool),
    RunQuery(Handle, Handle),
    Barrier,
}

pub struct RecordingStorage {
    inner: MemoryStorage,
    calls: Mutex<Vec<Call>>,
    write_delay: Option<Duration>,
    fail_open: bool,
    fail_writes: AtomicBool,
    fail_removals: AtomicBool,
}

impl RecordingStorage {
    pub fn new(name: impl Into<String>, space: Arc<AtomSpace>) -> Self {
        Self {
            inner: MemoryStorage::new(name, space),
            calls: Mutex::new(Vec::new()),
            write_delay: None,
            fail_open: false,
            fail_writes: AtomicBool::new(false),
            fail_removals: AtomicBool::new(false),
        }
    }

    /// Sleep this long in every store
    pub fn with_write_delay(mut self, delay: Duration) -> Self {
        self.write_delay = Some(delay);
        self
    }

    /// Make `open()` fail
    pub fn fail_open(mut self, fail: bool) -> Self {
        self.fail_open = fail;
        self
    }

    /// Make every store fail from now on (or stop failing)
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `pre_remove_atom` fail from now on (or stop failing)
    pub fn fail_removals(&self, fail: bool) {
        self.fail_removals.store(fail, Ordering::SeqCst);
    }

    /// The wrapped backend
    pub fn inner(&self) -> &MemoryStorage {
        &self.inner
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().clone()
    }

    pub fn count(&self, pred: impl Fn(&Call) -> bool) -> usize {
        self.calls.lock().iter().filter(|c| pred(c)).count()
    }

    /// Atoms received through `store_atom`, in arrival order
    pub fn stored_atoms(&self) -> Vec<Handle> {
        self.calls
            .lock()
            .iter()
            .filter_map(|c| match c {
                Call::StoreAtom(atom) => Some(Arc::clone(atom)),
                _ => None,
            })
            .collect()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    fn record(&self, call: Call) {
        self.calls.lock().push(call);
    }

    fn before_write(&self) -> Result<()> {
        if let Some(delay) = self.write_delay {
            thread::sleep(delay);
        }
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Failed(format!(
                "injected write failure in {}",
                self.inner.name()
            )));
        }
        Ok(())
    }
}

impl StorageNode for RecordingStorage {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn type_name(&self) -> &'static str {
        "RecordingStorage"
    }

    fn open(&self) -> Result<()> {
        if self.fail_open {
            return Err(StorageError::Failed(format!(
                "injected open failure in {}",
                self.inner.name()
            )));
        }
        self.record(Call::Open);
        self.inner.open()
    }

    fn close(&self) -> Result<()> {
        self.record(Call::Close);
        self.inner.close()
    }

    fn connected(&self) -> bool {
        self.inner.connected()
    }

    fn capabilities(&self) -> Capabilities {
        self.inner.capabilities()
    }

    fn monitor(&self) -> String {
        format!("RecordingStorage {}: {} calls", self.name(), self.calls.lock().len())
    }

    fn fetch_atom(&self, atom: &Handle) -> Result<()> {
        self.record(Call::FetchAtom(Arc::clone(atom)));
        self.inner.fetch_atom(atom)
    }

    fn fetch_value(&self, atom: &Handle, key: &Handle) -> Result<()> {
        self.record(Call::FetchValue(Arc::clone(atom), Arc::clone(key)));
        self.inner.fetch_value(atom, key)
    }

    fn fetch_incoming_set(&self, atom: &Handle) -> Result<()> {
        self.record(Call::FetchIncomingSet(Arc::clone(atom)));
        self.inner.fetch_incoming_set(atom)
    }

    fn fetch_incoming_by_type(&self, atom: &Handle, atom_type: &AtomType) -> Result<()> {
        self.record(Call::FetchIncomingByType(Arc::clone(atom), atom_type.clone()));
        self.inner.fetch_incoming_by_type(atom, atom_type)
    }

    fn store_atom(&self, atom: &Handle) -> Result<()> {
        self.before_write()?;
        self.record(Call::StoreAtom(Arc::clone(atom)));
        self.inner.store_atom(atom)
    }

    fn store_value(&self, atom: &Handle, key: &Handle) -> Result<()> {
        self.before_write()?;
        self.record(Call::StoreValue(Arc::clone(atom), Arc::clone(key)));
        self.inner.store_value(atom, key)
    }

    fn update_value(&self, atom: &Handle, key: &Handle, delta: &Value) -> Result<()> {
        self.before_write()?;
        self.record(Call::UpdateValue(Arc::clone(atom), Arc::clone(key), delta.clone()));
        self.inner.update_value(atom, key, delta)
    }

    fn fetch_all_of_type(&self, atom_type: &AtomType) -> Result<()> {
        self.record(Call::FetchAllOfType(atom_type.clone()));
        self.inner.fetch_all_of_type(atom_type)
    }

    fn load_whole_graph(&self) -> Result<()> {
        self.record(Call::LoadWholeGraph);
        self.inner.load_whole_graph()
    }

    fn store_whole_graph(&self) -> Result<()> {
        self.before_write()?;
        self.record(Call::StoreWholeGraph);
        self.inner.store_whole_graph()
    }

    fn pre_remove_atom(&self, atom: &Handle, recursive: bool) -> Result<()> {
        self.record(Call::PreRemove(Arc::clone(atom), recursive));
        if self.fail_removals.load(Ordering::SeqCst) {
            return Err(StorageError::Failed(format!(
                "injected removal failure in {}",
                self.inner.name()
            )));
        }
        self.inner.pre_remove_atom(atom, recursive)
    }

    fn post_remove_atom(&self, atom: &Handle, recursive: bool, extracted_ok: bool) -> Result<()> {
        self.record(Call::PostRemove(Arc::clone(atom), recursive, extracted_ok));
        self.inner.post_remove_atom(atom, recursive, extracted_ok)
    }

    fn run_query(
        &self,
        query: &Handle,
        key: &Handle,
        metadata: Option<&Handle>,
        fresh: bool,
    ) -> Result<()> {
        self.record(Call::RunQuery(Arc::clone(query), Arc::clone(key)));
        self.inner.run_query(query, key, metadata, fresh)
    }

    fn barrier(&self) -> Result<()> {
        self.record(Call::Barrier);
        self.inner.barrier()
    }
}
