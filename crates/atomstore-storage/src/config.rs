//! Proxy configuration records
//!
//! A proxy learns its delegates from a parameter record attached before
//! `open()`. The record names either a single delegate or an ordered list.
//! Delegates are given either as already-constructed nodes, or as
//! [`EndpointSpec`]s that the [`Registry`](crate::Registry) instantiates.
//!
//! The serde form is what a JSON configuration file holds:
//!
//! ```json
//! {
//!   "type": "WriteBufferProxy",
//!   "name": "buffered",
//!   "parameters": {
//!     "targets": [{ "type": "FileStorage", "name": "/var/lib/atoms.bin" }],
//!     "decay": 5.0
//!   }
//! }
//! ```

use crate::{Registry, Result, StorageError, StorageNode};
use atomstore_graph::AtomSpace;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Declarative description of a storage node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EndpointSpec {
    /// Registered type name
    #[serde(rename = "type")]
    pub type_name: String,

    /// Node name (a URI, file path or proxy label)
    pub name: String,

    /// Parameter record, for proxy types
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parameters: Option<ParameterRecord>,
}

impl EndpointSpec {
    pub fn new(type_name: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            name: name.into(),
            parameters: None,
        }
    }

    pub fn with_parameters(mut self, parameters: ParameterRecord) -> Self {
        self.parameters = Some(parameters);
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Serializable parameter record of a proxy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterRecord {
    pub targets: TargetSpecs,

    /// Write-buffer decay time, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decay: Option<f64>,
}

impl ParameterRecord {
    pub fn single(target: EndpointSpec) -> Self {
        Self {
            targets: TargetSpecs::One(Box::new(target)),
            decay: None,
        }
    }

    pub fn list(targets: Vec<EndpointSpec>) -> Self {
        Self {
            targets: TargetSpecs::Many(targets),
            decay: None,
        }
    }

    pub fn with_decay(mut self, seconds: f64) -> Self {
        self.decay = Some(seconds);
        self
    }
}

/// A single delegate or an ordered list of them
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TargetSpecs {
    One(Box<EndpointSpec>),
    Many(Vec<EndpointSpec>),
}

/// A delegate named in a parameter record
#[derive(Clone)]
pub enum Target {
    /// An already-constructed node
    Node(Arc<dyn StorageNode>),
    /// A node to instantiate through the registry at open time
    Spec(EndpointSpec),
}

impl fmt::Debug for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Node(node) => write!(f, "Node({} {})", node.type_name(), node.name()),
            Target::Spec(spec) => f.debug_tuple("Spec").field(spec).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Delegates {
    Single(Target),
    List(Vec<Target>),
}

/// Runtime parameter record attached to a proxy before `open()`
#[derive(Debug, Clone)]
pub struct ProxyParameters {
    pub delegates: Delegates,
    /// Write-buffer decay time, in seconds
    pub decay: Option<f64>,
}

impl ProxyParameters {
    pub fn single(node: Arc<dyn StorageNode>) -> Self {
        Self {
            delegates: Delegates::Single(Target::Node(node)),
            decay: None,
        }
    }

    pub fn list(nodes: impl IntoIterator<Item = Arc<dyn StorageNode>>) -> Self {
        Self {
            delegates: Delegates::List(nodes.into_iter().map(Target::Node).collect()),
            decay: None,
        }
    }

    pub fn with_decay(mut self, seconds: f64) -> Self {
        self.decay = Some(seconds);
        self
    }

    pub fn targets(&self) -> &[Target] {
        match &self.delegates {
            Delegates::Single(target) => std::slice::from_ref(target),
            Delegates::List(targets) => targets,
        }
    }

    /// Check the record shape without instantiating anything
    pub fn validate(&self) -> Result<()> {
        if let Some(decay) = self.decay {
            if !(decay.is_finite() && decay > 0.0) {
                return Err(StorageError::Configuration(format!(
                    "decay time must be a positive number of seconds, got {}",
                    decay
                )));
            }
        }
        Ok(())
    }

    /// Turn every target into a node, instantiating specs via `registry`
    ///
    /// Fails on the first spec whose type is not registered; nothing is
    /// opened here.
    pub fn resolve(
        &self,
        registry: &Arc<Registry>,
        space: &Arc<AtomSpace>,
    ) -> Result<Vec<Arc<dyn StorageNode>>> {
        self.targets()
            .iter()
            .map(|target| match target {
                Target::Node(node) => Ok(Arc::clone(node)),
                Target::Spec(spec) => Arc::clone(registry).build(spec, space),
            })
            .collect()
    }
}

impl From<ParameterRecord> for ProxyParameters {
    fn from(record: ParameterRecord) -> Self {
        let delegates = match record.targets {
            TargetSpecs::One(spec) => Delegates::Single(Target::Spec(*spec)),
            TargetSpecs::Many(specs) => Delegates::List(specs.into_iter().map(Target::Spec).collect()),
        };
        Self {
            delegates,
            decay: record.decay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_nested_record() {
        let json = r#"{
            "type": "SequentialReadProxy",
            "name": "replicas",
            "parameters": {
                "targets": [
                    { "type": "MemoryStorage", "name": "a" },
                    {
                        "type": "CachingProxy",
                        "name": "cached-b",
                        "parameters": { "targets": { "type": "MemoryStorage", "name": "b" } }
                    }
                ]
            }
        }"#;

        let spec = EndpointSpec::from_json(json).unwrap();
        assert_eq!(spec.type_name, "SequentialReadProxy");
        let params = spec.parameters.clone().unwrap();
        let TargetSpecs::Many(targets) = &params.targets else {
            panic!("expected a list of targets");
        };
        assert_eq!(targets.len(), 2);
        assert!(matches!(
            targets[1].parameters.as_ref().map(|p| &p.targets),
            Some(TargetSpecs::One(_))
        ));

        let reparsed = EndpointSpec::from_json(&spec.to_json().unwrap()).unwrap();
        assert_eq!(reparsed, spec);
    }

    #[test]
    fn test_record_into_parameters() {
        let record = ParameterRecord::single(EndpointSpec::new("MemoryStorage", "m")).with_decay(2.5);
        let params: ProxyParameters = record.into();
        assert_eq!(params.targets().len(), 1);
        assert_eq!(params.decay, Some(2.5));
        assert!(matches!(params.delegates, Delegates::Single(Target::Spec(_))));
    }

    #[test]
    fn test_validate_decay() {
        let params = ProxyParameters::list(Vec::new());
        assert!(params.clone().with_decay(1.0).validate().is_ok());
        assert!(matches!(
            params.clone().with_decay(0.0).validate(),
            Err(StorageError::Configuration(_))
        ));
        assert!(params.with_decay(f64::NAN).validate().is_err());
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            EndpointSpec::from_json(r#"{ "name": "no type" }"#),
            Err(StorageError::Json(_))
        ));
    }
}
