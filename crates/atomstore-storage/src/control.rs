//! Control messages addressed through reserved value keys
//!
//! Writing a value under one of these keys on an endpoint triggers the
//! corresponding action instead of storing the value.

use atomstore_graph::Atom;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ControlKey {
    Open,
    Close,
    LoadAtomSpace,
    StoreAtomSpace,
    Barrier,
    Delete,
    DeleteRecursive,
    StoreAtom,
    FetchAtom,
    /// Read-only: answered by `get_value`
    Monitor,
}

impl ControlKey {
    pub const ALL: [ControlKey; 10] = [
        ControlKey::Open,
        ControlKey::Close,
        ControlKey::LoadAtomSpace,
        ControlKey::StoreAtomSpace,
        ControlKey::Barrier,
        ControlKey::Delete,
        ControlKey::DeleteRecursive,
        ControlKey::StoreAtom,
        ControlKey::FetchAtom,
        ControlKey::Monitor,
    ];

    /// Reserved key name
    pub fn key_name(&self) -> &'static str {
        match self {
            ControlKey::Open => "*-open-*",
            ControlKey::Close => "*-close-*",
            ControlKey::LoadAtomSpace => "*-load-atomspace-*",
            ControlKey::StoreAtomSpace => "*-store-atomspace-*",
            ControlKey::Barrier => "*-barrier-*",
            ControlKey::Delete => "*-delete-*",
            ControlKey::DeleteRecursive => "*-delete-recursive-*",
            ControlKey::StoreAtom => "*-store-atom-*",
            ControlKey::FetchAtom => "*-fetch-atom-*",
            ControlKey::Monitor => "*-monitor-*",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|key| key.key_name() == name)
    }

    /// Decode a key atom; only nodes can name a control message
    pub fn from_key(key: &Atom) -> Option<Self> {
        key.name().and_then(Self::from_name)
    }

    /// Whether the message needs an atom operand
    pub fn takes_operand(&self) -> bool {
        matches!(
            self,
            ControlKey::Delete
                | ControlKey::DeleteRecursive
                | ControlKey::StoreAtom
                | ControlKey::FetchAtom
        )
    }
}

impl fmt::Display for ControlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key_name())
    }
}
