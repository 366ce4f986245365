//! Tracks one [`DynamicControllerHandle`] per live Promise (§4.5).
//!
//! `controller-runtime`-style frameworks cannot unregister a running
//! `Controller` once started, so "removing" a Promise's controller means
//! disabling its handle and, once the Promise finishes deleting, asking the
//! whole process to restart so the supervisor drops the dead controller for
//! good.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use kube::core::GroupVersionKind;
use thiserror::Error;
use tokio::sync::Notify;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("no controller registered for promise UID {0}")]
    UnknownPromise(String),
    #[error("dynamic controller registry mutex was poisoned")]
    PoisonedLock,
}

/// Per-Promise state shared with its dynamically spawned resource-request controller.
pub struct DynamicControllerHandle {
    pub promise_uid: String,
    pub gvk: Mutex<GroupVersionKind>,
    pub promise_identifier: String,
    pub can_create_resources: Arc<AtomicBool>,
    pub enabled: Arc<AtomicBool>,
    pub pipeline_images: Mutex<Vec<String>>,
    pub cluster_selectors: Mutex<BTreeMap<String, String>>,
}

impl DynamicControllerHandle {
    fn new(
        promise_uid: String,
        gvk: GroupVersionKind,
        promise_identifier: String,
        pipeline_images: Vec<String>,
        cluster_selectors: BTreeMap<String, String>,
    ) -> Self {
        Self {
            promise_uid,
            gvk: Mutex::new(gvk),
            promise_identifier,
            can_create_resources: Arc::new(AtomicBool::new(false)),
            enabled: Arc::new(AtomicBool::new(true)),
            pipeline_images: Mutex::new(pipeline_images),
            cluster_selectors: Mutex::new(cluster_selectors),
        }
    }
}

/// Result of [`DynamicControllerRegistry::ensure`]: whether the caller must
/// spawn a fresh resource-request controller task.
pub enum EnsureOutcome {
    Created(Arc<DynamicControllerHandle>),
    AlreadyRunning(Arc<DynamicControllerHandle>),
}

pub struct DynamicControllerRegistry {
    handles: Mutex<HashMap<String, Arc<DynamicControllerHandle>>>,
    restart_requested: Notify,
}

impl Default for DynamicControllerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl DynamicControllerRegistry {
    pub fn new() -> Self {
        Self {
            handles: Mutex::new(HashMap::new()),
            restart_requested: Notify::new(),
        }
    }

    /// Register `promise_uid`'s controller if it's new; otherwise update its
    /// mutable fields in place and report that the caller need not spawn
    /// another controller task.
    pub fn ensure(
        &self,
        promise_uid: &str,
        gvk: GroupVersionKind,
        promise_identifier: String,
        pipeline_images: Vec<String>,
        cluster_selectors: BTreeMap<String, String>,
    ) -> Result<EnsureOutcome, RegistryError> {
        let mut handles = self.handles.lock().map_err(|_| RegistryError::PoisonedLock)?;

        if let Some(existing) = handles.get(promise_uid) {
            *existing.gvk.lock().map_err(|_| RegistryError::PoisonedLock)? = gvk;
            *existing.pipeline_images.lock().map_err(|_| RegistryError::PoisonedLock)? = pipeline_images;
            *existing.cluster_selectors.lock().map_err(|_| RegistryError::PoisonedLock)? = cluster_selectors;
            return Ok(EnsureOutcome::AlreadyRunning(existing.clone()));
        }

        let handle = Arc::new(DynamicControllerHandle::new(
            promise_uid.to_string(),
            gvk,
            promise_identifier,
            pipeline_images,
            cluster_selectors,
        ));
        handles.insert(promise_uid.to_string(), handle.clone());
        Ok(EnsureOutcome::Created(handle))
    }

    pub fn set_enabled(&self, promise_uid: &str, enabled: bool) -> Result<(), RegistryError> {
        let handles = self.handles.lock().map_err(|_| RegistryError::PoisonedLock)?;
        let handle = handles
            .get(promise_uid)
            .ok_or_else(|| RegistryError::UnknownPromise(promise_uid.to_string()))?;
        handle.enabled.store(enabled, Ordering::SeqCst);
        Ok(())
    }

    pub fn set_can_create_resources(&self, promise_uid: &str, can_create: bool) -> Result<(), RegistryError> {
        let handles = self.handles.lock().map_err(|_| RegistryError::PoisonedLock)?;
        let handle = handles
            .get(promise_uid)
            .ok_or_else(|| RegistryError::UnknownPromise(promise_uid.to_string()))?;
        handle.can_create_resources.store(can_create, Ordering::SeqCst);
        Ok(())
    }

    pub fn get(&self, promise_uid: &str) -> Result<Arc<DynamicControllerHandle>, RegistryError> {
        let handles = self.handles.lock().map_err(|_| RegistryError::PoisonedLock)?;
        handles
            .get(promise_uid)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownPromise(promise_uid.to_string()))
    }

    /// Ask the top-level process to exit so its supervisor restarts it,
    /// dropping every disabled controller for good. Call after a Promise
    /// delete's finalizers have all been removed.
    pub fn restart(&self) {
        self.restart_requested.notify_one();
    }

    /// Resolves once [`restart`](Self::restart) has been called.
    pub async fn wait_for_restart(&self) {
        self.restart_requested.notified().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gvk() -> GroupVersionKind {
        GroupVersionKind { group: "platform.kratix.io".into(), version: "v1alpha1".into(), kind: "Postgres".into() }
    }

    #[test]
    fn ensure_creates_then_updates_in_place() {
        let registry = DynamicControllerRegistry::new();
        let outcome = registry.ensure("uid-1", gvk(), "postgres".into(), vec!["img:v1".into()], BTreeMap::new()).unwrap();
        assert!(matches!(outcome, EnsureOutcome::Created(_)));

        let outcome = registry.ensure("uid-1", gvk(), "postgres".into(), vec!["img:v2".into()], BTreeMap::new()).unwrap();
        assert!(matches!(outcome, EnsureOutcome::AlreadyRunning(_)));

        let handle = registry.get("uid-1").unwrap();
        assert_eq!(*handle.pipeline_images.lock().unwrap(), vec!["img:v2".to_string()]);
    }

    #[test]
    fn recreated_promise_under_new_uid_gets_a_fresh_handle() {
        let registry = DynamicControllerRegistry::new();
        registry.ensure("uid-1", gvk(), "postgres".into(), vec![], BTreeMap::new()).unwrap();
        registry.set_enabled("uid-1", false).unwrap();

        let outcome = registry.ensure("uid-2", gvk(), "postgres".into(), vec![], BTreeMap::new()).unwrap();
        assert!(matches!(outcome, EnsureOutcome::Created(_)));

        let old = registry.get("uid-1").unwrap();
        assert!(!old.enabled.load(Ordering::SeqCst));
        let new = registry.get("uid-2").unwrap();
        assert!(new.enabled.load(Ordering::SeqCst));
    }

    #[test]
    fn unknown_promise_is_an_error() {
        let registry = DynamicControllerRegistry::new();
        assert!(matches!(registry.set_enabled("missing", false), Err(RegistryError::UnknownPromise(_))));
    }
}
