use std::collections::HashSet;

use atomstore::graph::Handle;
use atomstore::storage::testing::{Call, RecordingStorage};

/// Assert the backend received exactly these atoms through `store_atom`,
/// each once, in any order
pub fn assert_stored_exactly(backend: &RecordingStorage, expected: &[Handle]) {
    let stored = backend.stored_atoms();
    let distinct: HashSet<&Handle> = stored.iter().collect();
    assert_eq!(
        distinct.len(),
        stored.len(),
        "backend received duplicate stores"
    );
    assert_eq!(
        stored.len(),
        expected.len(),
        "expected {} stores, backend received {}",
        expected.len(),
        stored.len()
    );
    for atom in expected {
        assert!(distinct.contains(atom), "missing store for {}", atom);
    }
}

/// Assert no call of the given shape reached the backend
pub fn assert_never_called(backend: &RecordingStorage, what: &str, pred: impl Fn(&Call) -> bool) {
    let hits = backend.count(pred);
    assert_eq!(hits, 0, "backend received {} unexpected {} calls", hits, what);
}
