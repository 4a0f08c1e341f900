use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Most recent value per storage name.
///
/// Written only by the P1 worker, read by alarm evaluation and by the remote
/// variable handler, hence the lock.
#[derive(Clone, Default)]
pub struct LastValueCache {
    values: Arc<RwLock<HashMap<String, f64>>>,
}

impl LastValueCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, f64>> {
        self.values.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, f64>> {
        self.values.write().unwrap_or_else(|e| e.into_inner())
    }

    pub fn set(&self, name: &str, value: f64) {
        self.write().insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.read().get(name).copied()
    }

    pub fn remove(&self, name: &str) -> Option<f64> {
        self.write().remove(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().contains_key(name)
    }

    pub fn snapshot(&self) -> HashMap<String, f64> {
        self.read().clone()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }
}
