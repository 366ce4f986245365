//! An in-memory stand-in for the Kubernetes API, used to unit-test
//! control-flow logic (finalizer sequencing, condition transitions) without
//! a live API server.

use std::collections::HashMap;
use std::sync::Mutex;

/// Objects keyed by `(kind, namespace/name)`, stored as raw JSON so any CRD
/// shape can be exercised without a generic type parameter per test.
#[derive(Default)]
pub struct FakeStore {
    objects: Mutex<HashMap<(String, String), serde_json::Value>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(kind: &str, namespace: &str, name: &str) -> (String, String) {
        (kind.to_string(), format!("{namespace}/{name}"))
    }

    pub fn put(&self, kind: &str, namespace: &str, name: &str, value: serde_json::Value) {
        self.objects.lock().unwrap().insert(Self::key(kind, namespace, name), value);
    }

    pub fn get(&self, kind: &str, namespace: &str, name: &str) -> Option<serde_json::Value> {
        self.objects.lock().unwrap().get(&Self::key(kind, namespace, name)).cloned()
    }

    pub fn delete(&self, kind: &str, namespace: &str, name: &str) -> bool {
        self.objects.lock().unwrap().remove(&Self::key(kind, namespace, name)).is_some()
    }

    pub fn list_kind(&self, kind: &str) -> Vec<serde_json::Value> {
        self.objects
            .lock()
            .unwrap()
            .iter()
            .filter(|((k, _), _)| k == kind)
            .map(|(_, v)| v.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.objects.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_then_get_round_trips() {
        let store = FakeStore::new();
        store.put("Promise", "kratix-platform-system", "postgres", serde_json::json!({"status": "Available"}));
        assert_eq!(store.get("Promise", "kratix-platform-system", "postgres").unwrap()["status"], "Available");
    }

    #[test]
    fn delete_reports_whether_something_was_removed() {
        let store = FakeStore::new();
        assert!(!store.delete("Work", "ns", "missing"));
        store.put("Work", "ns", "present", serde_json::json!({}));
        assert!(store.delete("Work", "ns", "present"));
    }

    #[test]
    fn list_kind_filters_by_kind() {
        let store = FakeStore::new();
        store.put("Promise", "ns", "a", serde_json::json!({}));
        store.put("Work", "ns", "b", serde_json::json!({}));
        assert_eq!(store.list_kind("Promise").len(), 1);
    }
}
