//! Capability flags advertised by storage nodes
//!
//! A generic caller consults these before invoking an operation, instead of
//! invoking it and catching `Unsupported`.

use std::fmt;

/// A single optional storage operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    FetchAtom,
    FetchValue,
    FetchIncomingSet,
    FetchIncomingByType,
    FetchAllOfType,
    LoadWholeGraph,
    StoreWholeGraph,
    StoreAtom,
    StoreValue,
    UpdateValue,
    RemoveAtom,
    RunQuery,
}

impl Capability {
    pub const ALL: [Capability; 12] = [
        Capability::FetchAtom,
        Capability::FetchValue,
        Capability::FetchIncomingSet,
        Capability::FetchIncomingByType,
        Capability::FetchAllOfType,
        Capability::LoadWholeGraph,
        Capability::StoreWholeGraph,
        Capability::StoreAtom,
        Capability::StoreValue,
        Capability::UpdateValue,
        Capability::RemoveAtom,
        Capability::RunQuery,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::FetchAtom => "fetch_atom",
            Capability::FetchValue => "fetch_value",
            Capability::FetchIncomingSet => "fetch_incoming_set",
            Capability::FetchIncomingByType => "fetch_incoming_by_type",
            Capability::FetchAllOfType => "fetch_all_of_type",
            Capability::LoadWholeGraph => "load_whole_graph",
            Capability::StoreWholeGraph => "store_whole_graph",
            Capability::StoreAtom => "store_atom",
            Capability::StoreValue => "store_value",
            Capability::UpdateValue => "update_value",
            Capability::RemoveAtom => "remove_atom",
            Capability::RunQuery => "run_query",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of operations a storage node implements
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub have_fetch_atom: bool,
    pub have_fetch_value: bool,
    pub have_fetch_incoming_set: bool,
    pub have_fetch_incoming_by_type: bool,
    pub have_fetch_all_of_type: bool,
    pub have_load_whole_graph: bool,
    pub have_store_whole_graph: bool,
    pub have_store_atom: bool,
    pub have_store_value: bool,
    pub have_update_value: bool,
    pub have_remove_atom: bool,
    pub have_run_query: bool,
}

impl Capabilities {
    /// No optional operations
    pub fn none() -> Self {
        Self::default()
    }

    /// Every operation
    pub fn all() -> Self {
        Capability::ALL
            .iter()
            .fold(Self::none(), |caps, c| caps.with(*c))
    }

    /// The targeted read operations a read-oriented proxy intercepts
    pub fn readers() -> Self {
        Self::none()
            .with(Capability::FetchAtom)
            .with(Capability::FetchValue)
            .with(Capability::FetchIncomingSet)
            .with(Capability::FetchIncomingByType)
            .with(Capability::FetchAllOfType)
    }

    pub fn with(mut self, capability: Capability) -> Self {
        *self.flag_mut(capability) = true;
        self
    }

    pub fn without(mut self, capability: Capability) -> Self {
        *self.flag_mut(capability) = false;
        self
    }

    pub fn supports(&self, capability: Capability) -> bool {
        match capability {
            Capability::FetchAtom => self.have_fetch_atom,
            Capability::FetchValue => self.have_fetch_value,
            Capability::FetchIncomingSet => self.have_fetch_incoming_set,
            Capability::FetchIncomingByType => self.have_fetch_incoming_by_type,
            Capability::FetchAllOfType => self.have_fetch_all_of_type,
            Capability::LoadWholeGraph => self.have_load_whole_graph,
            Capability::StoreWholeGraph => self.have_store_whole_graph,
            Capability::StoreAtom => self.have_store_atom,
            Capability::StoreValue => self.have_store_value,
            Capability::UpdateValue => self.have_update_value,
            Capability::RemoveAtom => self.have_remove_atom,
            Capability::RunQuery => self.have_run_query,
        }
    }

    /// Operations supported by both sets
    pub fn intersect(self, other: Capabilities) -> Self {
        Capability::ALL
            .iter()
            .filter(|c| self.supports(**c) && other.supports(**c))
            .fold(Self::none(), |caps, c| caps.with(*c))
    }

    /// Supported operations, in declaration order
    pub fn supported(&self) -> Vec<Capability> {
        Capability::ALL
            .iter()
            .copied()
            .filter(|c| self.supports(*c))
            .collect()
    }

    fn flag_mut(&mut self, capability: Capability) -> &mut bool {
        match capability {
            Capability::FetchAtom => &mut self.have_fetch_atom,
            Capability::FetchValue => &mut self.have_fetch_value,
            Capability::FetchIncomingSet => &mut self.have_fetch_incoming_set,
            Capability::FetchIncomingByType => &mut self.have_fetch_incoming_by_type,
            Capability::FetchAllOfType => &mut self.have_fetch_all_of_type,
            Capability::LoadWholeGraph => &mut self.have_load_whole_graph,
            Capability::StoreWholeGraph => &mut self.have_store_whole_graph,
            Capability::StoreAtom => &mut self.have_store_atom,
            Capability::StoreValue => &mut self.have_store_value,
            Capability::UpdateValue => &mut self.have_update_value,
            Capability::RemoveAtom => &mut self.have_remove_atom,
            Capability::RunQuery => &mut self.have_run_query,
        }
    }
}

impl fmt::Display for Capabilities {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.supported().iter().map(|c| c.as_str()).collect();
        write!(f, "[{}]", names.join(", "))
    }
}
