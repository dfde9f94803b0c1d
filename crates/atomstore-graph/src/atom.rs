//! Atom schema: content-addressed nodes and links

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Shared reference to an atom
///
/// Equality and hashing go through to the atom's content, so two handles
/// built independently from the same type and name (or outgoing set)
/// compare equal.
pub type Handle = Arc<Atom>;

/// Link types that can be handed to a backend as an executable query
const EXECUTABLE_TYPES: &[&str] = &[
    "MeetLink",
    "JoinLink",
    "QueryLink",
    "BindLink",
    "GetLink",
    "PatternLink",
];

/// Type tag of an atom (e.g. "ConceptNode", "EvaluationLink")
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AtomType(String);

impl AtomType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether atoms of this type can be run as a query
    pub fn is_executable(&self) -> bool {
        EXECUTABLE_TYPES.contains(&self.0.as_str())
    }
}

impl From<&str> for AtomType {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for AtomType {
    fn from(name: String) -> Self {
        Self(name)
    }
}

impl fmt::Display for AtomType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// An immutable hypergraph atom
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Atom {
    /// Leaf atom carrying a name
    Node { atom_type: AtomType, name: String },
    /// Compound atom over an ordered sequence of atoms
    Link {
        atom_type: AtomType,
        outgoing: Vec<Handle>,
    },
}

impl Atom {
    /// Create a node handle
    pub fn node(atom_type: impl Into<AtomType>, name: impl Into<String>) -> Handle {
        Arc::new(Atom::Node {
            atom_type: atom_type.into(),
            name: name.into(),
        })
    }

    /// Create a link handle
    pub fn link(atom_type: impl Into<AtomType>, outgoing: Vec<Handle>) -> Handle {
        Arc::new(Atom::Link {
            atom_type: atom_type.into(),
            outgoing,
        })
    }

    pub fn atom_type(&self) -> &AtomType {
        match self {
            Atom::Node { atom_type, .. } | Atom::Link { atom_type, .. } => atom_type,
        }
    }

    pub fn is_node(&self) -> bool {
        matches!(self, Atom::Node { .. })
    }

    pub fn is_link(&self) -> bool {
        matches!(self, Atom::Link { .. })
    }

    /// Name of a node, `None` for links
    pub fn name(&self) -> Option<&str> {
        match self {
            Atom::Node { name, .. } => Some(name),
            Atom::Link { .. } => None,
        }
    }

    /// Outgoing set of a link, empty for nodes
    pub fn outgoing(&self) -> &[Handle] {
        match self {
            Atom::Node { .. } => &[],
            Atom::Link { outgoing, .. } => outgoing,
        }
    }

    pub fn arity(&self) -> usize {
        self.outgoing().len()
    }

    /// Whether this atom can be run as a query
    pub fn is_executable(&self) -> bool {
        self.is_link() && self.atom_type().is_executable()
    }
}

impl fmt::Display for Atom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Atom::Node { atom_type, name } => write!(f, "({} {:?})", atom_type, name),
            Atom::Link { atom_type, outgoing } => {
                write!(f, "({}", atom_type)?;
                for child in outgoing {
                    write!(f, " {}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}
