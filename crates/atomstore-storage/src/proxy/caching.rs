use super::ProxyCore;
use crate::registry::ProxyType;
use crate::{Capabilities, Capability, ProxyParameters, Registry, Result, StorageNode};
use atomstore_graph::{AtomSpace, AtomType, Handle};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, info};

/// Read-through proxy that skips fetches already satisfied by the live graph
///
/// There is no separate cache: an atom carrying annotations, a non-empty
/// incoming set or a present value counts as materialized. Staleness is
/// bounded only by how long atoms stay resident. Every forwarded fetch is
/// followed by a barrier on the reader.
pub struct CachingProxy {
    core: ProxyCore,
    reader: RwLock<Option<Arc<dyn StorageNode>>>,
}

impl CachingProxy {
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
            reader: RwLock::new(None),
        }
    }

    /// Run `fetch` on the reader and wait for it; a no-op while closed
    fn forward(&self, fetch: impl FnOnce(&dyn StorageNode) -> Result<()>) -> Result<()> {
        let reader = self.reader.read().clone();
        let Some(reader) = reader else {
            return Ok(());
        };
        fetch(reader.as_ref())?;
        reader.barrier()
    }

    fn skip(&self, what: &str, atom: &Handle) -> Result<()> {
        debug!(proxy = %self.name(), atom = %atom, "{} already resident", what);
        Ok(())
    }
}

impl ProxyType for CachingProxy {
    fn create(name: &str, space: Arc<AtomSpace>, registry: Arc<Registry>) -> Self {
        Self::with_registry(name, space, registry)
    }
}

impl StorageNode for CachingProxy {
    fn name(&self) -> &str {
        self.core.name()
    }

    fn type_name(&self) -> &'static str {
        "CachingProxy"
    }

    fn open(&self) -> Result<()> {
        let reader = self.core.setup_single(self.type_name())?;
        reader.open()?;
        info!(proxy = %self.name(), reader = %reader.name(), "caching proxy opened");
        *self.reader.write() = Some(reader);
        Ok(())
    }

    fn close(&self) -> Result<()> {
        let reader = self.reader.write().take();
        match reader {
            Some(reader) => reader.close(),
            None => Ok(()),
        }
    }

    fn connected(&self) -> bool {
        self.reader.read().as_ref().is_some_and(|r| r.connected())
    }

    fn capabilities(&self) -> Capabilities {
        let own = Capabilities::readers().with(Capability::RunQuery);
        match self.reader.read().as_ref() {
            Some(reader) => own.intersect(reader.capabilities()),
            None => own,
        }
    }

    fn monitor(&self) -> String {
        match self.reader.read().as_ref() {
            Some(reader) => format!("CachingProxy {} -> {}", self.name(), reader.monitor()),
            None => format!("CachingProxy {}: closed", self.name()),
        }
    }

    fn set_parameters(&self, parameters: ProxyParameters) -> Result<()> {
        self.core.set_parameters(parameters)
    }

    fn fetch_atom(&self, atom: &Handle) -> Result<()> {
        // The atom itself is already in the space by now; only its
        // annotations tell whether it was ever fetched.
        if self.core.space().have_values(atom) {
            return self.skip("annotations", atom);
        }
        self.forward(|reader| reader.fetch_atom(atom))
    }

    fn fetch_value(&self, atom: &Handle, key: &Handle) -> Result<()> {
        if self.core.space().get_value(atom, key).is_some() {
            return self.skip("value", atom);
        }
        self.forward(|reader| reader.fetch_value(atom, key))
    }

    fn fetch_incoming_set(&self, atom: &Handle) -> Result<()> {
        if self.core.space().incoming_size(atom) > 0 {
            return self.skip("incoming set", atom);
        }
        self.forward(|reader| reader.fetch_incoming_set(atom))
    }

    fn fetch_incoming_by_type(&self, atom: &Handle, atom_type: &AtomType) -> Result<()> {
        if self.core.space().incoming_size_by_type(atom, atom_type) > 0 {
            return self.skip("typed incoming set", atom);
        }
        self.forward(|reader| reader.fetch_incoming_by_type(atom, atom_type))
    }

    fn fetch_all_of_type(&self, atom_type: &AtomType) -> Result<()> {
        self.forward(|reader| reader.fetch_all_of_type(atom_type))
    }

    fn run_query(
        &self,
        query: &Handle,
        key: &Handle,
        metadata: Option<&Handle>,
        fresh: bool,
    ) -> Result<()> {
        if !fresh && self.core.space().get_value(query, key).is_some() {
            return self.skip("query result", query);
        }
        self.forward(|reader| reader.run_query(query, key, metadata, fresh))
    }

    fn barrier(&self) -> Result<()> {
        let reader = self.reader.read().clone();
        match reader {
            Some(reader) => reader.barrier(),
            None => Ok(()),
        }
    }
}
