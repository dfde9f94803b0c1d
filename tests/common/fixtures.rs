use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use atomstore::graph::{Atom, AtomSpace, Handle};
use atomstore::storage::testing::RecordingStorage;
use atomstore::storage::{ProxyParameters, StorageNode, WriteBufferProxy};

pub fn new_space() -> Arc<AtomSpace> {
    Arc::new(AtomSpace::new())
}

pub fn concept(name: &str) -> Handle {
    Atom::node("ConceptNode", name)
}

pub fn predicate(name: &str) -> Handle {
    Atom::node("PredicateNode", name)
}

pub fn recording(space: &Arc<AtomSpace>, name: &str) -> Arc<RecordingStorage> {
    Arc::new(RecordingStorage::new(name, Arc::clone(space)))
}

/// `n` distinct concepts, already added to the space
pub fn concepts(space: &AtomSpace, n: usize) -> Vec<Handle> {
    (0..n)
        .map(|i| {
            space
                .add_atom(&concept(&format!("concept-{}", i)))
                .expect("space is writable")
        })
        .collect()
}

/// `(InheritanceLink cat animal)`, added to the space
pub fn cat_is_animal(space: &AtomSpace) -> (Handle, Handle, Handle) {
    let cat = concept("cat");
    let animal = concept("animal");
    let link = Atom::link("InheritanceLink", vec![cat.clone(), animal.clone()]);
    space.add_atom(&link).expect("space is writable");
    (cat, animal, link)
}

/// An opened write buffer over `backend`
pub fn buffered(
    space: &Arc<AtomSpace>,
    backend: Arc<dyn StorageNode>,
    decay: f64,
) -> Arc<WriteBufferProxy> {
    let proxy = Arc::new(WriteBufferProxy::new("buffer", Arc::clone(space)));
    proxy
        .set_parameters(ProxyParameters::single(backend).with_decay(decay))
        .expect("valid parameters");
    proxy.open().expect("write buffer opens");
    proxy
}

pub fn fixture_path(name: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Load a test fixture from tests/fixtures/
pub fn load_fixture(name: &str) -> String {
    fs::read_to_string(fixture_path(name))
        .unwrap_or_else(|e| panic!("Failed to load fixture {}: {}", name, e))
}
