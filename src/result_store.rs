use crate::types::Measurement;
use std::sync::{Arc, Mutex, MutexGuard};

/// Measurements appended by concurrent probe tasks.
pub type ResultStore = Arc<Mutex<Vec<Measurement>>>;

pub fn new_store() -> ResultStore {
    Arc::new(Mutex::new(vec![]))
}

// A panicking task can only poison the lock between whole pushes, so the vec
// behind a poisoned guard is still consistent.
fn lock(store: &ResultStore) -> MutexGuard<'_, Vec<Measurement>> {
    store.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn append(store: &ResultStore, measurement: Measurement) {
    lock(store).push(measurement);
}

/// Move everything out of the store, leaving it empty.
pub fn take(store: &ResultStore) -> Vec<Measurement> {
    std::mem::take(&mut *lock(store))
}
