//! ResourceTracker entries: the ledger of objects dispatched by a revision.

use serde::{Deserialize, Serialize};

/// What happens to a tracked object when its entry is swept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DeletionPolicy {
    #[default]
    Delete,
    Orphan,
    OnCascadingDelete,
}

/// One object the engine has dispatched, recorded so GC can find and remove it
/// when it is no longer asserted by a live revision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ResourceTrackerEntry {
    pub cluster: String,
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: Option<String>,
    /// The application revision that created this entry.
    pub creator_revision: String,
    pub deletion_policy: DeletionPolicy,
}

impl ResourceTrackerEntry {
    /// The `(cluster, GVK, ns, name)` identity used for idempotence and GC diffing.
    pub fn identity(&self) -> (String, String, String, String, String) {
        (
            self.cluster.clone(),
            self.api_version.clone(),
            self.kind.clone(),
            self.namespace.clone(),
            self.name.clone(),
        )
    }
}

/// A per-`(application, revision)` ledger, plus the root ledger used across
/// revisions for GC bookkeeping (see [`ResourceTracker::root`]).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct ResourceTracker {
    pub application_name: String,
    /// `None` for the root tracker.
    pub revision_name: Option<String>,
    pub entries: Vec<ResourceTrackerEntry>,
}

impl ResourceTracker {
    pub fn new(application_name: impl Into<String>, revision_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            revision_name: Some(revision_name.into()),
            entries: Vec::new(),
        }
    }

    pub fn root(application_name: impl Into<String>) -> Self {
        Self {
            application_name: application_name.into(),
            revision_name: None,
            entries: Vec::new(),
        }
    }

    pub fn is_root(&self) -> bool {
        self.revision_name.is_none()
    }
}
