//! Caller-facing storage endpoint
//!
//! A [`StorageEndpoint`] pairs a storage node with the live AtomSpace. It
//! is the layer that enforces the contract on behalf of every node:
//! not-open and read-only checks, capability checks before a hook is
//! invoked, atom insertion ahead of fetches, recursive incoming fetches,
//! query validation and the two-phase removal protocol. Nodes only ever
//! see well-formed requests.

use crate::{
    Capabilities, Capability, ControlKey, EndpointSpec, Registry, Result, StorageError,
    StorageNode,
};
use atomstore_graph::{AtomSpace, AtomType, Handle, Value};
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Clone)]
pub struct StorageEndpoint {
    node: Arc<dyn StorageNode>,
    space: Arc<AtomSpace>,
}

impl StorageEndpoint {
    pub fn new(node: Arc<dyn StorageNode>, space: Arc<AtomSpace>) -> Self {
        Self { node, space }
    }

    /// Build the node described by `spec` through `registry`
    pub fn from_spec(
        spec: &EndpointSpec,
        space: Arc<AtomSpace>,
        registry: Arc<Registry>,
    ) -> Result<Self> {
        let node = registry.build(spec, &space)?;
        Ok(Self::new(node, space))
    }

    pub fn node(&self) -> &Arc<dyn StorageNode> {
        &self.node
    }

    pub fn space(&self) -> &Arc<AtomSpace> {
        &self.space
    }

    // ========== Lifecycle ==========

    pub fn open(&self) -> Result<()> {
        self.node.open()?;
        info!(endpoint = %self, "storage endpoint opened");
        Ok(())
    }

    pub fn close(&self) -> Result<()> {
        self.node.close()?;
        info!(endpoint = %self, "storage endpoint closed");
        Ok(())
    }

    pub fn connected(&self) -> bool {
        self.node.connected()
    }

    pub fn capabilities(&self) -> Capabilities {
        self.node.capabilities()
    }

    pub fn monitor(&self) -> String {
        self.node.monitor()
    }

    /// Block until every write issued so far is committed
    ///
    /// Callable whether or not the endpoint is open.
    pub fn barrier(&self) -> Result<()> {
        self.node.barrier()
    }

    // ========== Reads ==========

    /// Replace the atom's annotations with the stored copy
    ///
    /// Returns the handle held by the AtomSpace.
    pub fn fetch_atom(&self, atom: &Handle) -> Result<Handle> {
        self.check(Capability::FetchAtom)?;
        let held = self.space.add_atom(atom)?;
        self.node.fetch_atom(&held)?;
        Ok(held)
    }

    pub fn fetch_value(&self, atom: &Handle, key: &Handle) -> Result<Handle> {
        self.check(Capability::FetchValue)?;
        let held = self.space.add_atom(atom)?;
        self.space.add_atom(key)?;
        self.node.fetch_value(&held, key)?;
        Ok(held)
    }

    /// Load the stored incoming set of an atom already in the AtomSpace
    ///
    /// Returns `None` if the atom is not in the AtomSpace. A recursive
    /// fetch repeats on every link it brings in.
    pub fn fetch_incoming_set(&self, atom: &Handle, recursive: bool) -> Result<Option<Handle>> {
        self.check(Capability::FetchIncomingSet)?;
        let Some(held) = self.space.get_atom(atom) else {
            return Ok(None);
        };
        self.node.fetch_incoming_set(&held)?;
        if !recursive {
            return Ok(Some(held));
        }

        let mut seen = HashSet::new();
        seen.insert(Arc::clone(&held));
        let mut stack = self.space.incoming_set(&held);
        while let Some(link) = stack.pop() {
            if !seen.insert(Arc::clone(&link)) {
                continue;
            }
            self.node.fetch_incoming_set(&link)?;
            stack.extend(self.space.incoming_set(&link));
        }
        Ok(Some(held))
    }

    pub fn fetch_incoming_by_type(
        &self,
        atom: &Handle,
        atom_type: &AtomType,
    ) -> Result<Option<Handle>> {
        self.check(Capability::FetchIncomingByType)?;
        let Some(held) = self.space.get_atom(atom) else {
            return Ok(None);
        };
        self.node.fetch_incoming_by_type(&held, atom_type)?;
        Ok(Some(held))
    }

    pub fn fetch_all_of_type(&self, atom_type: &AtomType) -> Result<()> {
        self.check(Capability::FetchAllOfType)?;
        self.node.fetch_all_of_type(atom_type)
    }

    pub fn load_whole_graph(&self) -> Result<()> {
        self.check(Capability::LoadWholeGraph)?;
        self.node.load_whole_graph()
    }

    // ========== Writes ==========

    pub fn store_whole_graph(&self) -> Result<()> {
        self.check_write(Capability::StoreWholeGraph)?;
        self.node.store_whole_graph()
    }

    pub fn store_atom(&self, atom: &Handle) -> Result<()> {
        self.check_write(Capability::StoreAtom)?;
        self.node.store_atom(atom)
    }

    pub fn store_value(&self, atom: &Handle, key: &Handle) -> Result<()> {
        self.check_write(Capability::StoreValue)?;
        self.node.store_value(atom, key)
    }

    pub fn update_value(&self, atom: &Handle, key: &Handle, delta: &Value) -> Result<()> {
        self.check_write(Capability::UpdateValue)?;
        self.node.update_value(atom, key, delta)
    }

    /// Remove an atom from the AtomSpace and from storage
    ///
    /// Returns false, touching nothing, when the atom is absent or when a
    /// non-recursive removal meets a non-empty incoming set. With a
    /// read-only AtomSpace the atom is only dropped from memory.
    pub fn remove_atom(&self, atom: &Handle, recursive: bool) -> Result<bool> {
        self.check_open()?;
        let Some(held) = self.space.get_atom(atom) else {
            return Ok(false);
        };
        if !recursive && self.space.incoming_size(&held) > 0 {
            debug!(endpoint = %self, atom = %held, "atom still has links above it; not removed");
            return Ok(false);
        }

        let persist = !self.space.is_read_only();
        if persist {
            self.require(Capability::RemoveAtom)?;
            self.node.pre_remove_atom(&held, recursive)?;
        }
        let extracted = self.space.extract_atom(&held, recursive);
        if persist {
            self.node.post_remove_atom(&held, recursive, extracted)?;
        }
        Ok(extracted)
    }

    // ========== Queries ==========

    /// Run an executable query and return the result cached at `key`
    pub fn run_query(
        &self,
        query: &Handle,
        key: &Handle,
        metadata: Option<&Handle>,
        fresh: bool,
    ) -> Result<Option<Value>> {
        self.check(Capability::RunQuery)?;
        if !query.is_executable() {
            return Err(StorageError::MalformedRequest(format!(
                "expected an executable query, got {}",
                query.atom_type()
            )));
        }
        let held = self.space.add_atom(query)?;
        self.space.add_atom(key)?;
        self.node.run_query(&held, key, metadata, fresh)?;
        Ok(self.space.get_value(&held, key))
    }

    // ========== Control channel ==========

    /// Write a value on the endpoint's own atom
    ///
    /// Reserved keys (see [`ControlKey`]) trigger the matching operation,
    /// taking their atom operand from a `Value::Atom`. Any other key is
    /// stored as an ordinary annotation.
    pub fn set_value(&self, key: &Handle, value: Option<Value>) -> Result<()> {
        let Some(control) = ControlKey::from_key(key) else {
            self.space.set_value(&self.node.atom(), key, value)?;
            return Ok(());
        };
        debug!(endpoint = %self, message = %control, "control message");

        match control {
            ControlKey::Open => self.open(),
            ControlKey::Close => self.close(),
            ControlKey::LoadAtomSpace => self.load_whole_graph(),
            ControlKey::StoreAtomSpace => self.store_whole_graph(),
            ControlKey::Barrier => self.barrier(),
            ControlKey::Delete => self.remove_atom(&operand(control, value)?, false).map(drop),
            ControlKey::DeleteRecursive => {
                self.remove_atom(&operand(control, value)?, true).map(drop)
            }
            ControlKey::StoreAtom => self.store_atom(&operand(control, value)?),
            ControlKey::FetchAtom => self.fetch_atom(&operand(control, value)?).map(drop),
            ControlKey::Monitor => Err(StorageError::MalformedRequest(format!(
                "{} is read-only",
                control
            ))),
        }
    }

    /// Read a value from the endpoint's own atom
    ///
    /// The monitor key answers with the node's status report.
    pub fn get_value(&self, key: &Handle) -> Option<Value> {
        match ControlKey::from_key(key) {
            Some(ControlKey::Monitor) => Some(Value::strings([self.node.monitor()])),
            _ => self.space.get_value(&self.node.atom(), key),
        }
    }

    // ========== Checks ==========

    fn check_open(&self) -> Result<()> {
        if self.node.connected() {
            Ok(())
        } else {
            Err(StorageError::NotOpen(self.to_string()))
        }
    }

    fn require(&self, capability: Capability) -> Result<()> {
        if self.node.capabilities().supports(capability) {
            Ok(())
        } else {
            Err(crate::unsupported(self.node.as_ref(), capability))
        }
    }

    fn check(&self, capability: Capability) -> Result<()> {
        self.check_open()?;
        self.require(capability)
    }

    fn check_write(&self, capability: Capability) -> Result<()> {
        self.check(capability)?;
        if self.space.is_read_only() {
            return Err(StorageError::ReadOnly);
        }
        Ok(())
    }
}

fn operand(control: ControlKey, value: Option<Value>) -> Result<Handle> {
    match value {
        Some(Value::Atom(atom)) => Ok(atom),
        other => Err(StorageError::MalformedRequest(format!(
            "{} expects an atom operand, got {}",
            control,
            other.map_or_else(|| "nothing".to_string(), |v| v.to_string())
        ))),
    }
}

impl fmt::Display for StorageEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.node.type_name(), self.node.name())
    }
}

impl fmt::Debug for StorageEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageEndpoint")
            .field("type", &self.node.type_name())
            .field("name", &self.node.name())
            .field("connected", &self.node.connected())
            .finish()
    }
}
