//! Registry of storage node types
//!
//! Maps type names to constructors so that delegates named in a
//! configuration record can be instantiated. The registry is an explicit
//! object handed to whoever resolves configuration; tests register fake
//! backend types on their own instance.

use crate::{
    CachingProxy, EndpointSpec, FileStorage, MemoryStorage, PassThruProxy, Result,
    SequentialReadProxy, StorageError, StorageNode, WriteBufferProxy,
};
use atomstore_graph::AtomSpace;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// Builds a node from its spec
///
/// The registry is passed along so proxies can resolve their own
/// delegates when they are opened.
pub type Constructor =
    fn(&EndpointSpec, &Arc<AtomSpace>, Arc<Registry>) -> Result<Arc<dyn StorageNode>>;

pub struct Registry {
    constructors: HashMap<String, Constructor>,
}

impl Registry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            constructors: HashMap::new(),
        }
    }

    /// A registry knowing every node type in this crate
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register("MemoryStorage", build_memory);
        registry.register("FileStorage", build_file);
        registry.register("PassThruProxy", build_proxy::<PassThruProxy>);
        registry.register("CachingProxy", build_proxy::<CachingProxy>);
        registry.register("SequentialReadProxy", build_proxy::<SequentialReadProxy>);
        registry.register("WriteBufferProxy", build_proxy::<WriteBufferProxy>);
        registry
    }

    /// Register (or replace) a constructor
    pub fn register(&mut self, type_name: impl Into<String>, constructor: Constructor) {
        self.constructors.insert(type_name.into(), constructor);
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.constructors.contains_key(type_name)
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.constructors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Instantiate the node described by `spec`
    ///
    /// Fails with `UnknownType` naming the type when it was never
    /// registered. Parameter records are attached but not resolved; a
    /// proxy resolves its delegates when it is opened.
    pub fn build(self: Arc<Self>, spec: &EndpointSpec, space: &Arc<AtomSpace>) -> Result<Arc<dyn StorageNode>> {
        let constructor = *self
            .constructors
            .get(&spec.type_name)
            .ok_or_else(|| StorageError::UnknownType(spec.type_name.clone()))?;
        constructor(spec, space, self)
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("types", &self.type_names())
            .finish()
    }
}

/// Proxy types constructible from a name, a space and a registry
pub(crate) trait ProxyType: StorageNode + Sized + 'static {
    fn create(name: &str, space: Arc<AtomSpace>, registry: Arc<Registry>) -> Self;
}

fn build_proxy<P: ProxyType>(
    spec: &EndpointSpec,
    space: &Arc<AtomSpace>,
    registry: Arc<Registry>,
) -> Result<Arc<dyn StorageNode>> {
    let proxy = P::create(&spec.name, Arc::clone(space), registry);
    if let Some(record) = &spec.parameters {
        proxy.set_parameters(record.clone().into())?;
    }
    Ok(Arc::new(proxy))
}

fn reject_parameters(spec: &EndpointSpec) -> Result<()> {
    if spec.parameters.is_some() {
        return Err(StorageError::Configuration(format!(
            "{} {} does not accept proxy parameters",
            spec.type_name, spec.name
        )));
    }
    Ok(())
}

fn build_memory(
    spec: &EndpointSpec,
    space: &Arc<AtomSpace>,
    _registry: Arc<Registry>,
) -> Result<Arc<dyn StorageNode>> {
    reject_parameters(spec)?;
    Ok(Arc::new(MemoryStorage::new(&spec.name, Arc::clone(space))))
}

fn build_file(
    spec: &EndpointSpec,
    space: &Arc<AtomSpace>,
    _registry: Arc<Registry>,
) -> Result<Arc<dyn StorageNode>> {
    reject_parameters(spec)?;
    Ok(Arc::new(FileStorage::new(&spec.name, Arc::clone(space))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ParameterRecord;

    #[test]
    fn test_defaults_registered() {
        let registry = Registry::with_defaults();
        assert_eq!(
            registry.type_names(),
            vec![
                "CachingProxy",
                "FileStorage",
                "MemoryStorage",
                "PassThruProxy",
                "SequentialReadProxy",
                "WriteBufferProxy",
            ]
        );
    }

    #[test]
    fn test_build_unknown_type() {
        let registry = Arc::new(Registry::with_defaults());
        let space = Arc::new(AtomSpace::new());
        let spec = EndpointSpec::new("RocksStorage", "rocks:///tmp/x");

        match registry.build(&spec, &space) {
            Err(StorageError::UnknownType(name)) => assert_eq!(name, "RocksStorage"),
            Err(other) => panic!("expected UnknownType, got {}", other),
            Ok(_) => panic!("expected UnknownType"),
        }
    }

    #[test]
    fn test_build_proxy_with_parameters() {
        let registry = Arc::new(Registry::with_defaults());
        let space = Arc::new(AtomSpace::new());
        let spec = EndpointSpec::new("CachingProxy", "cache")
            .with_parameters(ParameterRecord::single(EndpointSpec::new("MemoryStorage", "m")));

        let node = registry.build(&spec, &space).unwrap();
        assert_eq!(node.type_name(), "CachingProxy");
        assert_eq!(node.name(), "cache");
        assert!(!node.connected());
    }

    #[test]
    fn test_backends_reject_parameters() {
        let registry = Arc::new(Registry::with_defaults());
        let space = Arc::new(AtomSpace::new());
        let spec = EndpointSpec::new("MemoryStorage", "m")
            .with_parameters(ParameterRecord::list(Vec::new()));

        assert!(matches!(
            registry.build(&spec, &space),
            Err(StorageError::Configuration(_))
        ));
    }

    #[test]
    fn test_register_custom_type() {
        fn build_named(
            spec: &EndpointSpec,
            space: &Arc<AtomSpace>,
            _registry: Arc<Registry>,
        ) -> Result<Arc<dyn StorageNode>> {
            Ok(Arc::new(MemoryStorage::new(
                format!("custom:{}", spec.name),
                Arc::clone(space),
            )))
        }

        let mut registry = Registry::new();
        registry.register("CustomStorage", build_named);
        assert!(registry.contains("CustomStorage"));
        assert!(!registry.contains("MemoryStorage"));

        let registry = Arc::new(registry);
        let space = Arc::new(AtomSpace::new());
        let node = registry
            .build(&EndpointSpec::new("CustomStorage", "x"), &space)
            .unwrap();
        assert_eq!(node.name(), "custom:x");
    }
}
