//! Proxy policies composing other storage nodes
//!
//! A proxy reads its delegate list once, at `open()`, from the parameter
//! record attached with [`StorageNode::set_parameters`]. Delegates are
//! either live nodes or specs instantiated through the [`Registry`].

mod caching;
mod passthru;
mod queue;
mod sequential;
mod write_buffer;

pub use caching::CachingProxy;
pub use passthru::PassThruProxy;
pub use sequential::SequentialReadProxy;
pub use write_buffer::{QueueAverages, WriteBufferConfig, WriteBufferProxy, WriteBufferStats};

use crate::{ProxyParameters, Registry, Result, StorageError, StorageNode};
use atomstore_graph::AtomSpace;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::warn;

/// State shared by every proxy policy
pub(crate) struct ProxyCore {
    name: String,
    space: Arc<AtomSpace>,
    registry: Arc<Registry>,
    parameters: Mutex<Option<ProxyParameters>>,
}

impl ProxyCore {
    pub fn new(name: impl Into<String>, space: Arc<AtomSpace>, registry: Arc<Registry>) -> Self {
        Self {
            name: name.into(),
            space,
            registry,
            parameters: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn space(&self) -> &Arc<AtomSpace> {
        &self.space
    }

    /// Validate and attach a parameter record, replacing any earlier one
    pub fn set_parameters(&self, parameters: ProxyParameters) -> Result<()> {
        parameters.validate()?;
        *self.parameters.lock() = Some(parameters);
        Ok(())
    }

    /// Decay time from the attached record, if any
    pub fn decay(&self) -> Option<f64> {
        self.parameters.lock().as_ref().and_then(|p| p.decay)
    }

    /// Resolve the attached record into delegate nodes
    ///
    /// No record means no delegates.
    pub fn setup(&self) -> Result<Vec<Arc<dyn StorageNode>>> {
        let parameters = self.parameters.lock().clone();
        match parameters {
            Some(parameters) => parameters.resolve(&self.registry, &self.space),
            None => Ok(Vec::new()),
        }
    }

    /// Resolve exactly one delegate
    pub fn setup_single(&self, type_name: &str) -> Result<Arc<dyn StorageNode>> {
        let mut nodes = self.setup()?;
        if nodes.len() != 1 {
            return Err(StorageError::Configuration(format!(
                "{} {} expects exactly one storage node, got {}",
                type_name,
                self.name,
                nodes.len()
            )));
        }
        Ok(nodes.remove(0))
    }
}

/// Open every node, or none
///
/// On the first failure the nodes opened so far are closed again and the
/// error is returned.
pub(crate) fn open_all(nodes: &[Arc<dyn StorageNode>]) -> Result<()> {
    for (i, node) in nodes.iter().enumerate() {
        if let Err(err) = node.open() {
            for opened in &nodes[..i] {
                if let Err(close_err) = opened.close() {
                    warn!(
                        node = %opened.name(),
                        error = %close_err,
                        "failed to close delegate after aborted open"
                    );
                }
            }
            return Err(err);
        }
    }
    Ok(())
}

/// Close every node, reporting the first failure
pub(crate) fn close_all(nodes: &[Arc<dyn StorageNode>]) -> Result<()> {
    let mut first = None;
    for node in nodes {
        if let Err(err) = node.close() {
            warn!(node = %node.name(), error = %err, "delegate failed to close");
            first.get_or_insert(err);
        }
    }
    first.map_or(Ok(()), Err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::RecordingStorage;
    use crate::{EndpointSpec, ParameterRecord};

    fn core(space: &Arc<AtomSpace>) -> ProxyCore {
        ProxyCore::new("proxy", Arc::clone(space), Arc::new(Registry::with_defaults()))
    }

    #[test]
    fn test_setup_without_parameters() {
        let space = Arc::new(AtomSpace::new());
        let core = core(&space);
        assert!(core.setup().unwrap().is_empty());
        assert!(matches!(
            core.setup_single("PassThruProxy"),
            Err(StorageError::Configuration(_))
        ));
    }

    #[test]
    fn test_setup_resolves_specs() {
        let space = Arc::new(AtomSpace::new());
        let core = core(&space);
        let record = ParameterRecord::list(vec![
            EndpointSpec::new("MemoryStorage", "a"),
            EndpointSpec::new("MemoryStorage", "b"),
        ])
        .with_decay(3.0);
        core.set_parameters(record.into()).unwrap();

        let nodes = core.setup().unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[1].name(), "b");
        assert_eq!(core.decay(), Some(3.0));
    }

    #[test]
    fn test_unknown_delegate_type() {
        let space = Arc::new(AtomSpace::new());
        let core = core(&space);
        let record = ParameterRecord::single(EndpointSpec::new("PostgresStorage", "pg"));
        core.set_parameters(record.into()).unwrap();

        match core.setup() {
            Err(StorageError::UnknownType(name)) => assert_eq!(name, "PostgresStorage"),
            other => panic!("expected UnknownType, got {:?}", other.map(|n| n.len())),
        }
    }

    #[test]
    fn test_open_all_rolls_back() {
        let space = Arc::new(AtomSpace::new());
        let good = Arc::new(RecordingStorage::new("good", Arc::clone(&space)));
        let bad = Arc::new(RecordingStorage::new("bad", Arc::clone(&space)).fail_open(true));
        let nodes: Vec<Arc<dyn StorageNode>> = vec![good.clone(), bad];

        assert!(open_all(&nodes).is_err());
        assert!(!good.connected());
    }
}
