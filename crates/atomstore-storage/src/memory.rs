//! In-memory storage implementation
//!
//! Keeps its own copy of atoms and their annotations, separate from the live
//! AtomSpace, so that fetch/store round trips behave like a real backend.

use crate::{Capabilities, Capability, Result, StorageError, StorageNode};
use atomstore_graph::{AtomSpace, AtomType, Handle, Value};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Evaluates an executable query against the live AtomSpace
pub type QueryEvaluator = Arc<dyn Fn(&AtomSpace, &Handle) -> Result<Value> + Send + Sync>;

/// Stored atoms with a secondary incoming index
#[derive(Debug, Default)]
pub(crate) struct Table {
    atoms: HashMap<Handle, HashMap<Handle, Value>>,
    incoming: HashMap<Handle, HashSet<Handle>>,
}

impl Table {
    /// Insert an atom and its outgoing set, keeping existing annotations
    fn insert(&mut self, atom: &Handle) {
        if self.atoms.contains_key(&**atom) {
            return;
        }
        for child in atom.outgoing() {
            self.insert(child);
            self.incoming
                .entry(Arc::clone(child))
                .or_default()
                .insert(Arc::clone(atom));
        }
        self.atoms.insert(Arc::clone(atom), HashMap::new());
    }

    fn set_value(&mut self, atom: &Handle, key: &Handle, value: Option<Value>) {
        self.insert(atom);
        self.insert(key);
        if let Some(values) = self.atoms.get_mut(&**atom) {
            match value {
                Some(v) => {
                    values.insert(Arc::clone(key), v);
                }
                None => {
                    values.remove(&**key);
                }
            }
        }
    }

    fn value(&self, atom: &Handle, key: &Handle) -> Option<Value> {
        self.atoms.get(&**atom).and_then(|values| values.get(&**key).cloned())
    }

    fn incoming(&self, atom: &Handle) -> Vec<Handle> {
        self.incoming
            .get(&**atom)
            .map(|links| links.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// The atom plus everything above it in the stored incoming index
    fn closure(&self, atom: &Handle) -> Vec<Handle> {
        let mut seen = HashSet::new();
        let mut stack = vec![Arc::clone(atom)];
        let mut order = Vec::new();
        while let Some(next) = stack.pop() {
            if !seen.insert(Arc::clone(&next)) {
                continue;
            }
            stack.extend(self.incoming(&next));
            order.push(next);
        }
        order
    }

    fn remove(&mut self, atom: &Handle) {
        if self.atoms.remove(&**atom).is_none() {
            return;
        }
        self.incoming.remove(&**atom);
        for child in atom.outgoing() {
            if let Some(links) = self.incoming.get_mut(&**child) {
                links.remove(&**atom);
            }
        }
    }
}

/// Serializable image of a [`Table`]
#[derive(Debug, Default, Serialize, Deserialize)]
pub(crate) struct Snapshot {
    atoms: Vec<(Handle, Vec<(Handle, Value)>)>,
}

/// In-memory storage node
///
/// Fast, non-persistent storage primarily for testing and as a building
/// block for file-backed storage. All data is lost when it is dropped.
pub struct MemoryStorage {
    name: String,
    space: Arc<AtomSpace>,
    open: AtomicBool,
    table: RwLock<Table>,
    evaluator: Option<QueryEvaluator>,
    /// Atoms to drop once extraction from the live graph is confirmed
    pending_removal: Mutex<HashMap<Handle, Vec<Handle>>>,
}

impl MemoryStorage {
    /// Create a new empty storage node writing into `space`
    pub fn new(name: impl Into<String>, space: Arc<AtomSpace>) -> Self {
        Self {
            name: name.into(),
            space,
            open: AtomicBool::new(false),
            table: RwLock::new(Table::default()),
            evaluator: None,
            pending_removal: Mutex::new(HashMap::new()),
        }
    }

    /// Enable `run_query` with the given evaluator
    pub fn with_query_evaluator(mut self, evaluator: QueryEvaluator) -> Self {
        self.evaluator = Some(evaluator);
        self
    }

    pub fn space(&self) -> &Arc<AtomSpace> {
        &self.space
    }

    /// Number of stored atoms
    pub fn len(&self) -> usize {
        self.table.read().atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.read().atoms.is_empty()
    }

    /// Whether the atom is stored
    pub fn contains(&self, atom: &Handle) -> bool {
        self.table.read().atoms.contains_key(&**atom)
    }

    /// The stored value on `atom` at `key`
    pub fn stored_value(&self, atom: &Handle, key: &Handle) -> Option<Value> {
        self.table.read().value(atom, key)
    }

    /// Write `atom` with the given annotations straight into the table
    ///
    /// Bypasses the live graph; used to seed a backend.
    pub fn insert(&self, atom: &Handle, values: HashMap<Handle, Value>) {
        let mut table = self.table.write();
        table.insert(atom);
        for (key, value) in values {
            table.set_value(atom, &key, Some(value));
        }
    }

    pub(crate) fn snapshot(&self) -> Snapshot {
        let table = self.table.read();
        let atoms = table
            .atoms
            .iter()
            .map(|(atom, values)| {
                let values = values
                    .iter()
                    .map(|(k, v)| (Arc::clone(k), v.clone()))
                    .collect();
                (Arc::clone(atom), values)
            })
            .collect();
        Snapshot { atoms }
    }

    pub(crate) fn restore(&self, snapshot: Snapshot) {
        let mut table = self.table.write();
        *table = Table::default();
        for (atom, values) in snapshot.atoms {
            table.insert(&atom);
            for (key, value) in values {
                table.set_value(&atom, &key, Some(value));
            }
        }
    }

    fn check_open(&self) -> Result<()> {
        if self.open.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::NotOpen(self.name.clone()))
        }
    }

    /// Copy the stored version of an atom into the live graph, clobbering
    fn load(&self, atom: &Handle) -> Result<()> {
        let values = self.table.read().atoms.get(&**atom).cloned();
        match values {
            Some(values) => self.space.replace_values(atom, values)?,
            None => {
                self.space.add_atom(atom)?;
            }
        }
        Ok(())
    }

    fn load_all(&self, atoms: Vec<Handle>) -> Result<()> {
        for atom in &atoms {
            self.load(atom)?;
        }
        Ok(())
    }
}

impl StorageNode for MemoryStorage {
    fn name(&self) -> &str {
        &self.name
    }

    fn type_name(&self) -> &'static str {
        "MemoryStorage"
    }

    fn open(&self) -> Result<()> {
        self.open.store(true, Ordering::SeqCst);
        info!(name = %self.name, "memory storage opened");
        Ok(())
    }

    fn close(&self) -> Result<()> {
        self.open.store(false, Ordering::SeqCst);
        info!(name = %self.name, "memory storage closed");
        Ok(())
    }

    fn connected(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn capabilities(&self) -> Capabilities {
        let caps = Capabilities::all();
        if self.evaluator.is_some() {
            caps
        } else {
            caps.without(Capability::RunQuery)
        }
    }

    fn monitor(&self) -> String {
        format!(
            "MemoryStorage {}: {} atoms stored, {}",
            self.name,
            self.len(),
            if self.connected() { "open" } else { "closed" }
        )
    }

    fn fetch_atom(&self, atom: &Handle) -> Result<()> {
        self.check_open()?;
        if self.contains(atom) {
            self.load(atom)?;
        }
        Ok(())
    }

    fn fetch_value(&self, atom: &Handle, key: &Handle) -> Result<()> {
        self.check_open()?;
        if !self.contains(atom) {
            return Ok(());
        }
        let value = self.table.read().value(atom, key);
        self.space.set_value(atom, key, value)?;
        Ok(())
    }

    fn fetch_incoming_set(&self, atom: &Handle) -> Result<()> {
        self.check_open()?;
        let links = self.table.read().incoming(atom);
        self.load_all(links)
    }

    fn fetch_incoming_by_type(&self, atom: &Handle, atom_type: &AtomType) -> Result<()> {
        self.check_open()?;
        let links: Vec<Handle> = self
            .table
            .read()
            .incoming(atom)
            .into_iter()
            .filter(|link| link.atom_type() == atom_type)
            .collect();
        self.load_all(links)
    }

    fn store_atom(&self, atom: &Handle) -> Result<()> {
        self.check_open()?;
        let values = self.space.values(atom);
        let mut table = self.table.write();
        table.insert(atom);
        if let Some(stored) = table.atoms.get_mut(&**atom) {
            stored.clear();
        }
        for (key, value) in values {
            table.set_value(atom, &key, Some(value));
        }
        Ok(())
    }

    fn store_value(&self, atom: &Handle, key: &Handle) -> Result<()> {
        self.check_open()?;
        let value = self.space.get_value(atom, key);
        self.table.write().set_value(atom, key, value);
        Ok(())
    }

    fn update_value(&self, atom: &Handle, key: &Handle, delta: &Value) -> Result<()> {
        self.check_open()?;
        let mut table = self.table.write();
        let merged = match table.value(atom, key) {
            Some(current) => current.merge_delta(delta),
            None => delta.clone(),
        };
        table.set_value(atom, key, Some(merged));
        Ok(())
    }

    fn fetch_all_of_type(&self, atom_type: &AtomType) -> Result<()> {
        self.check_open()?;
        let atoms: Vec<Handle> = self
            .table
            .read()
            .atoms
            .keys()
            .filter(|atom| atom.atom_type() == atom_type)
            .cloned()
            .collect();
        self.load_all(atoms)
    }

    fn load_whole_graph(&self) -> Result<()> {
        self.check_open()?;
        let atoms: Vec<Handle> = self.table.read().atoms.keys().cloned().collect();
        debug!(name = %self.name, count = atoms.len(), "loading whole graph");
        self.load_all(atoms)
    }

    fn store_whole_graph(&self) -> Result<()> {
        self.check_open()?;
        let atoms = self.space.atoms();
        debug!(name = %self.name, count = atoms.len(), "storing whole graph");
        for atom in &atoms {
            self.store_atom(atom)?;
        }
        Ok(())
    }

    fn pre_remove_atom(&self, atom: &Handle, recursive: bool) -> Result<()> {
        self.check_open()?;
        let doomed = {
            let table = self.table.read();
            if recursive {
                table.closure(atom)
            } else if table.incoming(atom).is_empty() {
                vec![Arc::clone(atom)]
            } else {
                warn!(
                    name = %self.name,
                    atom = %atom,
                    "stored atom still has links above it; keeping it"
                );
                Vec::new()
            }
        };
        self.pending_removal.lock().insert(Arc::clone(atom), doomed);
        Ok(())
    }

    fn post_remove_atom(&self, atom: &Handle, _recursive: bool, extracted_ok: bool) -> Result<()> {
        self.check_open()?;
        let doomed = self.pending_removal.lock().remove(&**atom).unwrap_or_default();
        if extracted_ok {
            let mut table = self.table.write();
            for victim in &doomed {
                table.remove(victim);
            }
        }
        Ok(())
    }

    fn run_query(
        &self,
        query: &Handle,
        key: &Handle,
        metadata: Option<&Handle>,
        fresh: bool,
    ) -> Result<()> {
        self.check_open()?;
        let Some(evaluator) = &self.evaluator else {
            return Err(crate::provider::unsupported(self, Capability::RunQuery));
        };

        let cached = if fresh {
            None
        } else {
            self.table.read().value(query, key)
        };
        let result = match cached {
            Some(result) => result,
            None => {
                let result = evaluator(&self.space, query)?;
                self.table.write().set_value(query, key, Some(result.clone()));
                if let Some(meta) = metadata {
                    let stamp = SystemTime::now()
                        .duration_since(UNIX_EPOCH)
                        .map(|d| d.as_secs_f64())
                        .unwrap_or_default();
                    let stamp = Value::floats(vec![stamp]);
                    self.table.write().set_value(query, meta, Some(stamp.clone()));
                    self.space.set_value(query, meta, Some(stamp))?;
                }
                result
            }
        };
        self.space.set_value(query, key, Some(result))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use atomstore_graph::Atom;
    use std::sync::atomic::AtomicUsize;

    fn opened() -> (Arc<AtomSpace>, MemoryStorage) {
        let space = Arc::new(AtomSpace::new());
        let storage = MemoryStorage::new("mem", Arc::clone(&space));
        storage.open().unwrap();
        (space, storage)
    }

    #[test]
    fn test_store_then_fetch_clobbers() {
        let (space, storage) = opened();
        let cat = Atom::node("ConceptNode", "cat");
        let weight = Atom::node("PredicateNode", "weight");
        let color = Atom::node("PredicateNode", "color");

        space.set_value(&cat, &weight, Some(Value::floats(vec![4.0]))).unwrap();
        storage.store_atom(&cat).unwrap();

        // Local edits diverge from the stored copy
        space.set_value(&cat, &weight, Some(Value::floats(vec![9.0]))).unwrap();
        space.set_value(&cat, &color, Some(Value::strings(["grey"]))).unwrap();

        storage.fetch_atom(&cat).unwrap();
        assert_eq!(space.get_value(&cat, &weight), Some(Value::floats(vec![4.0])));
        assert_eq!(space.get_value(&cat, &color), None);
    }

    #[test]
    fn test_incoming_fetch() {
        let (space, storage) = opened();
        let cat = Atom::node("ConceptNode", "cat");
        let animal = Atom::node("ConceptNode", "animal");
        let inh = Atom::link("InheritanceLink", vec![cat.clone(), animal.clone()]);
        let list = Atom::link("ListLink", vec![cat.clone()]);
        storage.insert(&inh, HashMap::new());
        storage.insert(&list, HashMap::new());

        space.add_atom(&cat).unwrap();
        storage
            .fetch_incoming_by_type(&cat, &AtomType::from("ListLink"))
            .unwrap();
        assert_eq!(space.incoming_set(&cat), vec![list]);

        storage.fetch_incoming_set(&cat).unwrap();
        assert_eq!(space.incoming_size(&cat), 2);
        assert!(space.contains(&animal));
    }

    #[test]
    fn test_update_value_merges() {
        let (_space, storage) = opened();
        let cat = Atom::node("ConceptNode", "cat");
        let count = Atom::node("PredicateNode", "count");

        storage.update_value(&cat, &count, &Value::floats(vec![1.0])).unwrap();
        storage.update_value(&cat, &count, &Value::floats(vec![2.0])).unwrap();
        assert_eq!(storage.stored_value(&cat, &count), Some(Value::floats(vec![3.0])));
    }

    #[test]
    fn test_two_phase_remove() {
        let (space, storage) = opened();
        let cat = Atom::node("ConceptNode", "cat");
        let animal = Atom::node("ConceptNode", "animal");
        let inh = Atom::link("InheritanceLink", vec![cat.clone(), animal.clone()]);
        space.add_atom(&inh).unwrap();
        storage.store_atom(&inh).unwrap();
        assert_eq!(storage.len(), 3);

        // Extraction failed: nothing dropped
        storage.pre_remove_atom(&cat, true).unwrap();
        storage.post_remove_atom(&cat, true, false).unwrap();
        assert_eq!(storage.len(), 3);

        storage.pre_remove_atom(&cat, true).unwrap();
        storage.post_remove_atom(&cat, true, true).unwrap();
        assert!(!storage.contains(&cat));
        assert!(!storage.contains(&inh));
        assert!(storage.contains(&animal));
    }

    #[test]
    fn test_closed_storage_refuses() {
        let space = Arc::new(AtomSpace::new());
        let storage = MemoryStorage::new("mem", space);
        let cat = Atom::node("ConceptNode", "cat");
        assert!(matches!(storage.store_atom(&cat), Err(StorageError::NotOpen(_))));
        assert!(!storage.connected());
    }

    #[test]
    fn test_query_cached_unless_fresh() {
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&runs);
        let evaluator: QueryEvaluator = Arc::new(move |_space: &AtomSpace, _query: &Handle| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            Ok::<_, StorageError>(Value::floats(vec![n as f64]))
        });

        let space = Arc::new(AtomSpace::new());
        let storage = MemoryStorage::new("mem", Arc::clone(&space)).with_query_evaluator(evaluator);
        storage.open().unwrap();
        assert!(storage.capabilities().supports(Capability::RunQuery));

        let query = Atom::link("MeetLink", vec![Atom::node("VariableNode", "$x")]);
        let key = Atom::node("PredicateNode", "results");
        let meta = Atom::node("PredicateNode", "query-time");
        space.add_atom(&query).unwrap();

        storage.run_query(&query, &key, Some(&meta), false).unwrap();
        storage.run_query(&query, &key, None, false).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(space.get_value(&query, &key), Some(Value::floats(vec![1.0])));
        assert!(space.get_value(&query, &meta).is_some());

        storage.run_query(&query, &key, None, true).unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 2);
        assert_eq!(space.get_value(&query, &key), Some(Value::floats(vec![2.0])));
    }

    #[test]
    fn test_snapshot_restore() {
        let (space, storage) = opened();
        let cat = Atom::node("ConceptNode", "cat");
        let key = Atom::node("PredicateNode", "k");
        let inh = Atom::link("InheritanceLink", vec![cat.clone(), Atom::node("ConceptNode", "animal")]);
        space.add_atom(&inh).unwrap();
        space.set_value(&cat, &key, Some(Value::strings(["v"]))).unwrap();
        storage.store_whole_graph().unwrap();

        let other = MemoryStorage::new("copy", Arc::new(AtomSpace::new()));
        other.restore(storage.snapshot());
        assert_eq!(other.len(), storage.len());
        assert_eq!(other.stored_value(&cat, &key), Some(Value::strings(["v"])));
        assert_eq!(other.table.read().incoming(&cat), vec![inh]);
    }
}
