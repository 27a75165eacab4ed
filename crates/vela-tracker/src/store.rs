//! Persistence contract for ResourceTracker documents.

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use vela_core::error::TrackerError;
use vela_core::tracker::ResourceTracker;

/// Reads and writes ResourceTracker documents. One active tracker per
/// `(application, revision)` plus one root tracker per application used
/// across revisions for GC (§3).
#[async_trait]
pub trait TrackerStore: Send + Sync {
    async fn get(
        &self,
        application: &str,
        revision_name: &str,
    ) -> Result<Option<ResourceTracker>, TrackerError>;

    async fn put(&self, tracker: ResourceTracker) -> Result<(), TrackerError>;

    async fn delete(&self, application: &str, revision_name: &str) -> Result<(), TrackerError>;

    async fn get_root(&self, application: &str) -> Result<ResourceTracker, TrackerError>;

    async fn put_root(&self, tracker: ResourceTracker) -> Result<(), TrackerError>;

    /// Every retained per-revision tracker for `application`, in no
    /// particular order.
    async fn list(&self, application: &str) -> Result<Vec<ResourceTracker>, TrackerError>;
}

/// An in-memory `TrackerStore`, used by tests and by the pre-start canary
/// check's dry run before a real backend is configured.
#[derive(Default)]
pub struct InMemoryTrackerStore {
    trackers: Mutex<BTreeMap<(String, String), ResourceTracker>>,
    roots: Mutex<BTreeMap<String, ResourceTracker>>,
}

impl InMemoryTrackerStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl TrackerStore for InMemoryTrackerStore {
    async fn get(
        &self,
        application: &str,
        revision_name: &str,
    ) -> Result<Option<ResourceTracker>, TrackerError> {
        Ok(self
            .trackers
            .lock()
            .unwrap()
            .get(&(application.to_string(), revision_name.to_string()))
            .cloned())
    }

    async fn put(&self, tracker: ResourceTracker) -> Result<(), TrackerError> {
        let revision_name = tracker.revision_name.clone().ok_or_else(|| TrackerError::WriteFailed {
            application: tracker.application_name.clone(),
            reason: "cannot put a root tracker through put(); use put_root()".to_string(),
        })?;
        self.trackers
            .lock()
            .unwrap()
            .insert((tracker.application_name.clone(), revision_name), tracker);
        Ok(())
    }

    async fn delete(&self, application: &str, revision_name: &str) -> Result<(), TrackerError> {
        self.trackers
            .lock()
            .unwrap()
            .remove(&(application.to_string(), revision_name.to_string()));
        Ok(())
    }

    async fn get_root(&self, application: &str) -> Result<ResourceTracker, TrackerError> {
        Ok(self
            .roots
            .lock()
            .unwrap()
            .get(application)
            .cloned()
            .unwrap_or_else(|| ResourceTracker::root(application)))
    }

    async fn put_root(&self, tracker: ResourceTracker) -> Result<(), TrackerError> {
        self.roots
            .lock()
            .unwrap()
            .insert(tracker.application_name.clone(), tracker);
        Ok(())
    }

    async fn list(&self, application: &str) -> Result<Vec<ResourceTracker>, TrackerError> {
        Ok(self
            .trackers
            .lock()
            .unwrap()
            .iter()
            .filter(|((app, _), _)| app == application)
            .map(|(_, t)| t.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::tracker::{DeletionPolicy, ResourceTrackerEntry};

    fn entry(name: &str) -> ResourceTrackerEntry {
        ResourceTrackerEntry {
            cluster: "local".into(),
            api_version: "apps/v1".into(),
            kind: "Deployment".into(),
            namespace: "default".into(),
            name: name.into(),
            uid: None,
            creator_revision: "web-v1".into(),
            deletion_policy: DeletionPolicy::Delete,
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryTrackerStore::new();
        let mut tracker = ResourceTracker::new("web", "web-v1");
        tracker.entries.push(entry("web"));
        store.put(tracker.clone()).await.unwrap();

        let loaded = store.get("web", "web-v1").await.unwrap().unwrap();
        assert_eq!(loaded.entries.len(), 1);
    }

    #[tokio::test]
    async fn missing_tracker_is_none() {
        let store = InMemoryTrackerStore::new();
        assert!(store.get("web", "web-v1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn root_tracker_defaults_when_absent() {
        let store = InMemoryTrackerStore::new();
        let root = store.get_root("web").await.unwrap();
        assert!(root.is_root());
        assert!(root.entries.is_empty());
    }
}
