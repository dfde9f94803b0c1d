//! Storage node trait: the contract every backend and proxy implements

use crate::{Capabilities, Capability, ProxyParameters, Result, StorageError};
use atomstore_graph::{Atom, AtomType, Handle, Value};

/// A storage backend (or a proxy over other backends)
///
/// Nodes are shared as `Arc<dyn StorageNode>` between the application and
/// any proxies that delegate to them, so every method takes `&self`.
/// Atoms handed to the hooks below are already present in the live
/// AtomSpace the node was created for; fetches write into that AtomSpace.
///
/// Operations are grouped in three layers:
/// - Layer 1: Lifecycle and discovery (open, close, capabilities)
/// - Layer 2: Targeted reads and writes (single atoms, values, incoming sets)
/// - Layer 3: Bulk transfer, removal, queries and synchronization
///
/// Every optional hook defaults to `StorageError::Unsupported`; nodes
/// advertise what they override through [`StorageNode::capabilities`].
pub trait StorageNode: Send + Sync {
    // ========== Layer 1: Lifecycle and discovery ==========

    /// Name of this node (a URI, file path or proxy label)
    fn name(&self) -> &str;

    /// Registered type name (e.g. "WriteBufferProxy")
    fn type_name(&self) -> &'static str;

    /// Establish the backend connection
    fn open(&self) -> Result<()>;

    /// Release the backend connection, flushing anything still pending
    fn close(&self) -> Result<()>;

    /// Whether the connection is alive right now
    fn connected(&self) -> bool;

    /// Operations this node implements
    fn capabilities(&self) -> Capabilities;

    /// Human-readable status report
    fn monitor(&self) -> String {
        format!("{} {} does not implement a monitor.", self.type_name(), self.name())
    }

    /// Attach a proxy parameter record; only proxies accept one
    fn set_parameters(&self, _parameters: ProxyParameters) -> Result<()> {
        Err(StorageError::Configuration(format!(
            "{} {} does not accept proxy parameters",
            self.type_name(),
            self.name()
        )))
    }

    /// The atom naming this node in the live graph
    fn atom(&self) -> Handle {
        Atom::node(self.type_name(), self.name())
    }

    // ========== Layer 2: Targeted reads and writes ==========

    /// Replace every annotation on `atom` with the stored copy
    fn fetch_atom(&self, _atom: &Handle) -> Result<()> {
        Err(unsupported(self, Capability::FetchAtom))
    }

    /// Replace the value on `atom` at `key` with the stored copy
    fn fetch_value(&self, _atom: &Handle, _key: &Handle) -> Result<()> {
        Err(unsupported(self, Capability::FetchValue))
    }

    /// Load the stored incoming set of `atom`
    fn fetch_incoming_set(&self, _atom: &Handle) -> Result<()> {
        Err(unsupported(self, Capability::FetchIncomingSet))
    }

    /// Load the stored incoming set of `atom`, restricted to one link type
    fn fetch_incoming_by_type(&self, _atom: &Handle, _atom_type: &AtomType) -> Result<()> {
        Err(unsupported(self, Capability::FetchIncomingByType))
    }

    /// Persist `atom` together with all of its current annotations
    fn store_atom(&self, _atom: &Handle) -> Result<()> {
        Err(unsupported(self, Capability::StoreAtom))
    }

    /// Persist the current value on `atom` at `key`
    fn store_value(&self, _atom: &Handle, _key: &Handle) -> Result<()> {
        Err(unsupported(self, Capability::StoreValue))
    }

    /// Apply `delta` to the stored value; the merge rule is backend-defined
    fn update_value(&self, _atom: &Handle, _key: &Handle, _delta: &Value) -> Result<()> {
        Err(unsupported(self, Capability::UpdateValue))
    }

    // ========== Layer 3: Bulk, removal, queries, synchronization ==========

    /// Load every stored atom of the given type
    fn fetch_all_of_type(&self, _atom_type: &AtomType) -> Result<()> {
        Err(unsupported(self, Capability::FetchAllOfType))
    }

    /// Load the entire stored graph into the live AtomSpace
    fn load_whole_graph(&self) -> Result<()> {
        Err(unsupported(self, Capability::LoadWholeGraph))
    }

    /// Persist the entire live AtomSpace
    fn store_whole_graph(&self) -> Result<()> {
        Err(unsupported(self, Capability::StoreWholeGraph))
    }

    /// First removal phase, called while `atom` is still in the live graph
    fn pre_remove_atom(&self, _atom: &Handle, _recursive: bool) -> Result<()> {
        Err(unsupported(self, Capability::RemoveAtom))
    }

    /// Second removal phase, told whether the live extraction succeeded
    fn post_remove_atom(&self, _atom: &Handle, _recursive: bool, _extracted_ok: bool) -> Result<()> {
        Err(unsupported(self, Capability::RemoveAtom))
    }

    /// Run an executable query; the result is cached on `query` at `key`
    fn run_query(
        &self,
        _query: &Handle,
        _key: &Handle,
        _metadata: Option<&Handle>,
        _fresh: bool,
    ) -> Result<()> {
        Err(unsupported(self, Capability::RunQuery))
    }

    /// Block until every write issued so far is committed
    ///
    /// Must be idempotent, and a no-op when nothing is pending.
    fn barrier(&self) -> Result<()> {
        Ok(())
    }
}

/// Build the `Unsupported` error for a node
pub fn unsupported<N: StorageNode + ?Sized>(node: &N, capability: Capability) -> StorageError {
    StorageError::Unsupported {
        endpoint: format!("{} {}", node.type_name(), node.name()),
        capability,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// A node that implements nothing but the lifecycle
    struct Bare;

    impl StorageNode for Bare {
        fn name(&self) -> &str {
            "bare"
        }

        fn type_name(&self) -> &'static str {
            "BareStorage"
        }

        fn open(&self) -> Result<()> {
            Ok(())
        }

        fn close(&self) -> Result<()> {
            Ok(())
        }

        fn connected(&self) -> bool {
            true
        }

        fn capabilities(&self) -> Capabilities {
            Capabilities::none()
        }
    }

    #[test]
    fn test_defaults_are_unsupported() {
        let node = Bare;
        let atom = Atom::node("ConceptNode", "x");

        match node.store_atom(&atom) {
            Err(StorageError::Unsupported { endpoint, capability }) => {
                assert_eq!(endpoint, "BareStorage bare");
                assert_eq!(capability, Capability::StoreAtom);
            }
            other => panic!("expected Unsupported, got {:?}", other),
        }
        assert!(node.post_remove_atom(&atom, false, true).is_err());
        assert!(node.barrier().is_ok());
        assert!(node.set_parameters(ProxyParameters::list(Vec::new())).is_err());
    }

    #[test]
    fn test_node_atom() {
        let node = Bare;
        assert_eq!(*node.atom(), *Atom::node("BareStorage", "bare"));
        assert!(node.monitor().contains("does not implement a monitor"));
    }
}
