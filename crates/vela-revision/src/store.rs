//! Persistence contract for ApplicationRevision documents (§4.6).

use std::collections::BTreeMap;
use std::sync::Mutex;

use async_trait::async_trait;

use vela_core::error::TrackerError;
use vela_core::revision::ApplicationRevision;

/// Reads, writes, and lists the immutable ApplicationRevisions retained for
/// an application. Revisions are never mutated once stored; retention
/// removes them outright.
#[async_trait]
pub trait RevisionStore: Send + Sync {
    async fn get(&self, application: &str, revision_number: u64) -> Result<Option<ApplicationRevision>, TrackerError>;

    async fn put(&self, revision: ApplicationRevision) -> Result<(), TrackerError>;

    async fn delete(&self, application: &str, revision_number: u64) -> Result<(), TrackerError>;

    /// Every retained revision for `application`, in no particular order.
    async fn list(&self, application: &str) -> Result<Vec<ApplicationRevision>, TrackerError>;
}

/// An in-memory `RevisionStore`, used by tests and the pre-start canary
/// check's dry run before a real backend is configured.
#[derive(Default)]
pub struct InMemoryRevisionStore {
    revisions: Mutex<BTreeMap<(String, u64), ApplicationRevision>>,
}

impl InMemoryRevisionStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RevisionStore for InMemoryRevisionStore {
    async fn get(&self, application: &str, revision_number: u64) -> Result<Option<ApplicationRevision>, TrackerError> {
        Ok(self
            .revisions
            .lock()
            .unwrap()
            .get(&(application.to_string(), revision_number))
            .cloned())
    }

    async fn put(&self, revision: ApplicationRevision) -> Result<(), TrackerError> {
        self.revisions.lock().unwrap().insert(
            (revision.application_name.clone(), revision.revision_number),
            revision,
        );
        Ok(())
    }

    async fn delete(&self, application: &str, revision_number: u64) -> Result<(), TrackerError> {
        self.revisions
            .lock()
            .unwrap()
            .remove(&(application.to_string(), revision_number));
        Ok(())
    }

    async fn list(&self, application: &str) -> Result<Vec<ApplicationRevision>, TrackerError> {
        Ok(self
            .revisions
            .lock()
            .unwrap()
            .iter()
            .filter(|((app, _), _)| app == application)
            .map(|(_, r)| r.clone())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::model::ApplicationSpec;
    use vela_core::revision::Compression;

    fn revision(number: u64) -> ApplicationRevision {
        ApplicationRevision {
            application_name: "web".into(),
            namespace: "default".into(),
            revision_hash: format!("h{number}"),
            revision_number: number,
            spec: ApplicationSpec {
                name: "web".into(),
                namespace: "default".into(),
                components: vec![],
                policies: vec![],
                workflow: None,
            },
            component_definitions: vec![],
            trait_definitions: vec![],
            policy_definitions: vec![],
            workflow_step_definitions: vec![],
            compression: Compression::None,
            created_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let store = InMemoryRevisionStore::new();
        store.put(revision(1)).await.unwrap();
        let loaded = store.get("web", 1).await.unwrap().unwrap();
        assert_eq!(loaded.revision_hash, "h1");
    }

    #[tokio::test]
    async fn delete_removes_revision() {
        let store = InMemoryRevisionStore::new();
        store.put(revision(1)).await.unwrap();
        store.delete("web", 1).await.unwrap();
        assert!(store.get("web", 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn list_returns_only_matching_application() {
        let store = InMemoryRevisionStore::new();
        store.put(revision(1)).await.unwrap();
        let mut other = revision(1);
        other.application_name = "db".into();
        store.put(other).await.unwrap();

        let listed = store.list("web").await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].application_name, "web");
    }
}
