//! Per-job persisted key/value state.

use std::sync::{Mutex, PoisonError};

use serde_json::Value;

/// Insertion-ordered value store scoped to one job.
///
/// Persist-value actions write here and persisted-value filters read here,
/// so a job can recognize inputs it already handled in earlier runs. The
/// store is passed through the execution context, never held as global
/// state. SingleThreaded stages are the only writers within a run and the
/// engine keeps at most one run of a job active, so the lock is
/// uncontended in practice.
#[derive(Debug, Default)]
pub struct JobStateStore {
    values: Mutex<Vec<Value>>,
}

impl JobStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Persist a value if it is not present yet. Returns true when the value
    /// was newly added.
    pub fn persist(&self, value: Value) -> bool {
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        if values.contains(&value) {
            return false;
        }
        values.push(value);
        true
    }

    pub fn contains(&self, value: &Value) -> bool {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(value)
    }

    /// Drop everything but the newest `keep` values. Zero disables trimming.
    pub fn trim(&self, keep: usize) {
        if keep == 0 {
            return;
        }
        let mut values = self.values.lock().unwrap_or_else(PoisonError::into_inner);
        let len = values.len();
        if len > keep {
            values.drain(0..len - keep);
        }
    }

    pub fn len(&self) -> usize {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of the stored values, oldest first.
    pub fn values(&self) -> Vec<Value> {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn clear(&self) {
        self.values
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_persist_deduplicates() {
        let store = JobStateStore::new();
        assert!(store.persist(json!("a.txt")));
        assert!(!store.persist(json!("a.txt")));
        assert!(store.persist(json!("b.txt")));
        assert_eq!(store.len(), 2);
        assert!(store.contains(&json!("a.txt")));
    }

    #[test]
    fn test_trim_keeps_newest() {
        let store = JobStateStore::new();
        for i in 0..5 {
            store.persist(json!(i));
        }
        store.trim(2);
        assert_eq!(store.values(), vec![json!(3), json!(4)]);

        store.trim(0);
        assert_eq!(store.len(), 2);
    }
}
