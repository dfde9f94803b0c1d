//! The live AtomSpace: atoms, their annotations, and incoming sets

use crate::{Atom, AtomType, GraphError, Handle, Result, Value};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};

/// Per-atom state held by the AtomSpace
#[derive(Debug, Default)]
struct Entry {
    /// Key -> value annotations
    values: HashMap<Handle, Value>,
    /// Links that contain this atom in their outgoing set
    incoming: HashSet<Handle>,
}

/// Shared, thread-safe hypergraph container
///
/// Outgoing sets live in the atoms themselves; the space maintains the
/// reverse (incoming) index, so both directions can be navigated.
/// Structural mutation is not coordinated with storage endpoints: callers
/// must not race an add/remove of an atom against a fetch of that atom.
#[derive(Debug, Default)]
pub struct AtomSpace {
    atoms: RwLock<HashMap<Handle, Entry>>,
    read_only: AtomicBool,
}

impl AtomSpace {
    /// Create a new empty, writable AtomSpace
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_read_only(&self, read_only: bool) {
        self.read_only.store(read_only, Ordering::SeqCst);
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only.load(Ordering::SeqCst)
    }

    /// Insert an atom (and, for links, its outgoing set)
    ///
    /// Returns the handle held by the space. Adding an atom that is already
    /// present is permitted on a read-only space; adding a new one is not.
    pub fn add_atom(&self, atom: &Handle) -> Result<Handle> {
        if let Some((held, _)) = self.atoms.read().get_key_value(&**atom) {
            return Ok(held.clone());
        }
        if self.is_read_only() {
            return Err(GraphError::ReadOnly);
        }
        let mut atoms = self.atoms.write();
        Ok(insert(&mut atoms, atom))
    }

    /// Look up the handle held by the space for this atom
    pub fn get_atom(&self, atom: &Atom) -> Option<Handle> {
        self.atoms
            .read()
            .get_key_value(atom)
            .map(|(held, _)| held.clone())
    }

    pub fn contains(&self, atom: &Atom) -> bool {
        self.atoms.read().contains_key(atom)
    }

    /// Remove an atom from the space
    ///
    /// Returns false if the atom is absent, or if it still has a non-empty
    /// incoming set and `recursive` is false. A recursive extraction removes
    /// the whole incoming closure first. Extraction is permitted on a
    /// read-only space, since it only frees memory.
    pub fn extract_atom(&self, atom: &Atom, recursive: bool) -> bool {
        let mut atoms = self.atoms.write();
        extract(&mut atoms, atom, recursive)
    }

    /// Get the value stored on `atom` at `key`
    pub fn get_value(&self, atom: &Atom, key: &Atom) -> Option<Value> {
        self.atoms
            .read()
            .get(atom)
            .and_then(|entry| entry.values.get(key).cloned())
    }

    /// Set (or, with `None`, clear) the value on `atom` at `key`
    ///
    /// Both the atom and the key are added to the space if needed.
    pub fn set_value(&self, atom: &Handle, key: &Handle, value: Option<Value>) -> Result<()> {
        if self.is_read_only() {
            return Err(GraphError::ReadOnly);
        }
        let atom = self.add_atom(atom)?;
        let key = self.add_atom(key)?;

        let mut atoms = self.atoms.write();
        let entry = atoms
            .get_mut(&*atom)
            .ok_or_else(|| GraphError::NotFound(atom.to_string()))?;
        match value {
            Some(v) => {
                entry.values.insert(key, v);
            }
            None => {
                entry.values.remove(&*key);
            }
        }
        Ok(())
    }

    /// Replace every annotation on `atom` with `values`
    ///
    /// This clobbers: keys absent from `values` are dropped.
    pub fn replace_values(&self, atom: &Handle, values: HashMap<Handle, Value>) -> Result<()> {
        if self.is_read_only() {
            return Err(GraphError::ReadOnly);
        }
        let atom = self.add_atom(atom)?;
        let mut held = HashMap::with_capacity(values.len());
        for (key, value) in values {
            held.insert(self.add_atom(&key)?, value);
        }

        let mut atoms = self.atoms.write();
        let entry = atoms
            .get_mut(&*atom)
            .ok_or_else(|| GraphError::NotFound(atom.to_string()))?;
        entry.values = held;
        Ok(())
    }

    /// All annotations on an atom
    pub fn values(&self, atom: &Atom) -> HashMap<Handle, Value> {
        self.atoms
            .read()
            .get(atom)
            .map(|entry| entry.values.clone())
            .unwrap_or_default()
    }

    /// Keys under which the atom carries values
    pub fn keys(&self, atom: &Atom) -> Vec<Handle> {
        self.atoms
            .read()
            .get(atom)
            .map(|entry| entry.values.keys().cloned().collect())
            .unwrap_or_default()
    }

    /// Whether the atom carries any annotations at all
    pub fn have_values(&self, atom: &Atom) -> bool {
        self.atoms
            .read()
            .get(atom)
            .is_some_and(|entry| !entry.values.is_empty())
    }

    pub fn incoming_set(&self, atom: &Atom) -> Vec<Handle> {
        self.atoms
            .read()
            .get(atom)
            .map(|entry| entry.incoming.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn incoming_by_type(&self, atom: &Atom, atom_type: &AtomType) -> Vec<Handle> {
        self.atoms
            .read()
            .get(atom)
            .map(|entry| {
                entry
                    .incoming
                    .iter()
                    .filter(|link| link.atom_type() == atom_type)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn incoming_size(&self, atom: &Atom) -> usize {
        self.atoms
            .read()
            .get(atom)
            .map_or(0, |entry| entry.incoming.len())
    }

    pub fn incoming_size_by_type(&self, atom: &Atom, atom_type: &AtomType) -> usize {
        self.atoms.read().get(atom).map_or(0, |entry| {
            entry
                .incoming
                .iter()
                .filter(|link| link.atom_type() == atom_type)
                .count()
        })
    }

    pub fn atoms_of_type(&self, atom_type: &AtomType) -> Vec<Handle> {
        self.atoms
            .read()
            .keys()
            .filter(|atom| atom.atom_type() == atom_type)
            .cloned()
            .collect()
    }

    /// Every atom in the space, in no particular order
    pub fn atoms(&self) -> Vec<Handle> {
        self.atoms.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.atoms.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.read().is_empty()
    }

    /// Drop every atom. Permitted on a read-only space.
    pub fn clear(&self) {
        self.atoms.write().clear();
    }
}

fn insert(atoms: &mut HashMap<Handle, Entry>, atom: &Handle) -> Handle {
    if let Some((held, _)) = atoms.get_key_value(&**atom) {
        return held.clone();
    }
    for child in atom.outgoing() {
        let child = insert(atoms, child);
        if let Some(entry) = atoms.get_mut(&*child) {
            entry.incoming.insert(atom.clone());
        }
    }
    atoms.insert(atom.clone(), Entry::default());
    atom.clone()
}

fn extract(atoms: &mut HashMap<Handle, Entry>, atom: &Atom, recursive: bool) -> bool {
    let parents: Vec<Handle> = match atoms.get(atom) {
        None => return false,
        Some(entry) => entry.incoming.iter().cloned().collect(),
    };
    if !parents.is_empty() {
        if !recursive {
            return false;
        }
        for parent in parents {
            extract(atoms, &parent, true);
        }
    }

    let Some((held, _)) = atoms.remove_entry(atom) else {
        return false;
    };
    for child in held.outgoing() {
        if let Some(entry) = atoms.get_mut(&**child) {
            entry.incoming.remove(&held);
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (AtomSpace, Handle, Handle, Handle) {
        let space = AtomSpace::new();
        let cat = Atom::node("ConceptNode", "cat");
        let animal = Atom::node("ConceptNode", "animal");
        let link = Atom::link("InheritanceLink", vec![cat.clone(), animal.clone()]);
        space.add_atom(&link).unwrap();
        (space, cat, animal, link)
    }

    #[test]
    fn test_add_indexes_incoming() {
        let (space, cat, animal, link) = sample();

        assert_eq!(space.len(), 3);
        assert_eq!(space.incoming_set(&cat), vec![link.clone()]);
        assert_eq!(space.incoming_size(&animal), 1);
        assert_eq!(space.incoming_size(&link), 0);
        assert_eq!(
            space.incoming_by_type(&cat, &AtomType::from("InheritanceLink")),
            vec![link]
        );
        assert!(space
            .incoming_by_type(&cat, &AtomType::from("ListLink"))
            .is_empty());
    }

    #[test]
    fn test_add_existing_returns_held_handle() {
        let (space, cat, _, _) = sample();
        let again = space.add_atom(&Atom::node("ConceptNode", "cat")).unwrap();
        assert!(std::sync::Arc::ptr_eq(&again, &space.get_atom(&cat).unwrap()));
        assert_eq!(space.len(), 3);
    }

    #[test]
    fn test_extract_non_recursive_rejects_incoming() {
        let (space, cat, _, link) = sample();

        assert!(!space.extract_atom(&cat, false));
        assert!(space.contains(&cat));

        assert!(space.extract_atom(&link, false));
        assert_eq!(space.incoming_size(&cat), 0);
        assert!(space.extract_atom(&cat, false));
        assert!(!space.extract_atom(&cat, false));
    }

    #[test]
    fn test_extract_recursive_removes_closure() {
        let (space, cat, animal, link) = sample();
        let outer = Atom::link("ListLink", vec![link.clone()]);
        space.add_atom(&outer).unwrap();

        assert!(space.extract_atom(&cat, true));
        assert!(!space.contains(&cat));
        assert!(!space.contains(&link));
        assert!(!space.contains(&outer));
        assert!(space.contains(&animal));
        assert_eq!(space.incoming_size(&animal), 0);
    }

    #[test]
    fn test_values_set_clear_replace() {
        let (space, cat, _, _) = sample();
        let key = Atom::node("PredicateNode", "weight");
        let other = Atom::node("PredicateNode", "color");

        assert!(!space.have_values(&cat));
        space
            .set_value(&cat, &key, Some(Value::floats(vec![4.2])))
            .unwrap();
        space
            .set_value(&cat, &other, Some(Value::strings(["grey"])))
            .unwrap();
        assert!(space.have_values(&cat));
        assert_eq!(space.keys(&cat).len(), 2);

        space.set_value(&cat, &other, None).unwrap();
        assert_eq!(space.get_value(&cat, &other), None);

        let mut fresh = HashMap::new();
        fresh.insert(other.clone(), Value::strings(["black"]));
        space.replace_values(&cat, fresh).unwrap();
        assert_eq!(space.get_value(&cat, &key), None);
        assert_eq!(space.get_value(&cat, &other), Some(Value::strings(["black"])));
    }

    #[test]
    fn test_read_only() {
        let (space, cat, _, link) = sample();
        space.set_read_only(true);

        assert!(space.add_atom(&cat).is_ok());
        assert_eq!(
            space.add_atom(&Atom::node("ConceptNode", "dog")),
            Err(GraphError::ReadOnly)
        );
        assert_eq!(
            space.set_value(&cat, &cat, Some(Value::floats(vec![1.0]))),
            Err(GraphError::ReadOnly)
        );

        // Freeing memory is still allowed
        assert!(space.extract_atom(&link, false));
    }

    #[test]
    fn test_atoms_of_type() {
        let (space, _, _, _) = sample();
        assert_eq!(space.atoms_of_type(&AtomType::from("ConceptNode")).len(), 2);
        assert_eq!(space.atoms_of_type(&AtomType::from("ListLink")).len(), 0);
        assert_eq!(space.atoms().len(), 3);
    }
}
