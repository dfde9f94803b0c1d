use super::ProxyCore;
use crate::registry::ProxyType;
use crate::{Capabilities, ProxyParameters, Registry, Result, StorageError, StorageNode};
use atomstore_graph::{AtomSpace, AtomType, Handle, Value};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

/// Forwards every operation, unchanged, to exactly one delegate
pub struct PassThruProxy {
    core: ProxyCore,
    target: RwLock<Option<Arc<dyn StorageNode>>>,
}

impl PassThruProxy {
    /// Create a proxy resolving delegate specs through the default registry
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
            target: RwLock::new(None),
        }
    }

    pub(crate) fn core(&self) -> &ProxyCore {
        &self.core
    }

    /// Open the single delegate, naming `type_name` in configuration errors
    pub(crate) fn open_as(&self, type_name: &str) -> Result<()> {
        let target = self.core.setup_single(type_name)?;
        target.open()?;
        info!(proxy = %self.core.name(), target = %target.name(), "{} opened", type_name);
        *self.target.write() = Some(target);
        Ok(())
    }

    fn target(&self) -> Result<Arc<dyn StorageNode>> {
        self.target
            .read()
            .clone()
            .ok_or_else(|| StorageError::NotOpen(self.core.name().to_string()))
    }
}

impl ProxyType for PassThruProxy {
    fn create(name: &str, space: Arc<AtomSpace>, registry: Arc<Registry>) -> Self {
        Self::with_registry(name, space, registry)
    }
}

impl StorageNode for PassThruProxy {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn type_name(&self) -> &'static str {
        "PassThruProxy"
    }

    fn open(&self) -> Result<()> {
        self.open_as(self.type_name())
    }

    fn close(&self) -> Result<()> {
        let target = self.target.write().take();
        match target {
            Some(target) => target.close(),
            None => Ok(()),
        }
    }

    fn connected(&self) -> bool {
        self.target.read().as_ref().is_some_and(|t| t.connected())
    }

    /// The delegate's capabilities while open, everything while closed
    fn capabilities(&self) -> Capabilities {
        match self.target.read().as_ref() {
            Some(target) => target.capabilities(),
            None => Capabilities::all(),
        }
    }

    fn monitor(&self) -> String {
        match self.target.read().as_ref() {
            Some(target) => format!("PassThruProxy {} -> {}", self.name(), target.monitor()),
            None => format!("PassThruProxy {}: closed", self.name()),
        }
    }

    fn set_parameters(&self, parameters: ProxyParameters) -> Result<()> {
        self.core.set_parameters(parameters)
    }

    fn fetch_atom(&self, atom: &Handle) -> Result<()> {
        self.target()?.fetch_atom(atom)
    }

    fn fetch_value(&self, atom: &Handle, key: &Handle) -> Result<()> {
        self.target()?.fetch_value(atom, key)
    }

    fn fetch_incoming_set(&self, atom: &Handle) -> Result<()> {
        self.target()?.fetch_incoming_set(atom)
    }

    fn fetch_incoming_by_type(&self, atom: &Handle, atom_type: &AtomType) -> Result<()> {
        self.target()?.fetch_incoming_by_type(atom, atom_type)
    }

    fn store_atom(&self, atom: &Handle) -> Result<()> {
        self.target()?.store_atom(atom)
    }

    fn store_value(&self, atom: &Handle, key: &Handle) -> Result<()> {
        self.target()?.store_value(atom, key)
    }

    fn update_value(&self, atom: &Handle, key: &Handle, delta: &Value) -> Result<()> {
        self.target()?.update_value(atom, key, delta)
    }

    fn fetch_all_of_type(&self, atom_type: &AtomType) -> Result<()> {
        self.target()?.fetch_all_of_type(atom_type)
    }

    fn load_whole_graph(&self) -> Result<()> {
        self.target()?.load_whole_graph()
    }

    fn store_whole_graph(&self) -> Result<()> {
        self.target()?.store_whole_graph()
    }

    fn pre_remove_atom(&self, atom: &Handle, recursive: bool) -> Result<()> {
        self.target()?.pre_remove_atom(atom, recursive)
    }

    fn post_remove_atom(&self, atom: &Handle, recursive: bool, extracted_ok: bool) -> Result<()> {
        self.target()?.post_remove_atom(atom, recursive, extracted_ok)
    }

    fn run_query(
        &self,
        query: &Handle,
        key: &Handle,
        metadata: Option<&Handle>,
        fresh: bool,
    ) -> Result<()> {
        self.target()?.run_query(query, key, metadata, fresh)
    }

    fn barrier(&self) -> Result<()> {
        let target = self.target.read().clone();
        match target {
            Some(target) => target.barrier(),
            None => Ok(()),
        }
    }
}
