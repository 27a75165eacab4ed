//! Multi-cluster Dispatcher.
//!
//! `Dispatch(cluster, obj) -> {Applied, NoChange, Failed}`: submits a dry-run
//! (when enabled), then upserts by `Get`/`Create`/three-way-merge-`Patch`,
//! and reports the record the caller should write into the application's
//! ResourceTracker.

mod gvk;
mod kube_cluster;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{info, instrument, warn};

use vela_core::error::DispatchError;
use vela_core::merge::deep_merge;

pub use gvk::{Gvk, ObjectRef};
pub use kube_cluster::KubeClusterCapability;

/// A named capability to call a member cluster (§6): `cluster-name = "local"`
/// denotes the control-plane cluster itself. Implementations resolve
/// credentials from process-wide state keyed by `cluster`.
#[async_trait]
pub trait ClusterCapability: Send + Sync {
    async fn get(&self, cluster: &str, obj_ref: &ObjectRef) -> Result<Option<Value>, DispatchError>;

    async fn create(&self, cluster: &str, object: &Value) -> Result<Value, DispatchError>;

    /// Applies `object`'s fields onto the live object at `obj_ref`, returning
    /// the resulting object as persisted.
    async fn patch(
        &self,
        cluster: &str,
        obj_ref: &ObjectRef,
        object: &Value,
    ) -> Result<Value, DispatchError>;

    /// Submits `object` as a server-side dry run; an error here means the
    /// cluster would reject the real apply.
    async fn dry_run(&self, cluster: &str, object: &Value) -> Result<(), DispatchError>;
}

/// Identity the caller should record in the ResourceTracker after a
/// successful dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct DispatchRecord {
    pub cluster: String,
    pub api_version: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
    pub uid: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    Applied(DispatchRecord),
    NoChange(DispatchRecord),
    Failed(DispatchError),
}

pub struct Dispatcher<C: ClusterCapability> {
    capability: C,
    dry_run_before_dispatch: bool,
}

impl<C: ClusterCapability> Dispatcher<C> {
    pub fn new(capability: C, dry_run_before_dispatch: bool) -> Self {
        Self {
            capability,
            dry_run_before_dispatch,
        }
    }

    /// Dispatches `object` to `cluster`. Malformed objects (no GVK/name) are
    /// programmer errors upstream in the renderer and are propagated as
    /// `Err`; everything the target cluster itself rejects is folded into
    /// `DispatchOutcome::Failed` so the workflow step can decide whether to
    /// retry without the caller having to match on both a `Result` and an
    /// enum.
    #[instrument(skip(self, object), fields(cluster = %cluster))]
    pub async fn dispatch(&self, cluster: &str, object: &Value) -> Result<DispatchOutcome, DispatchError> {
        let obj_ref = ObjectRef::from_object(object)?;

        if self.dry_run_before_dispatch {
            if let Err(e) = self.capability.dry_run(cluster, object).await {
                warn!(error = %e, "dry-run rejected dispatch");
                return Ok(DispatchOutcome::Failed(e));
            }
        }

        let existing = match self.capability.get(cluster, &obj_ref).await {
            Ok(existing) => existing,
            Err(e) => return Ok(DispatchOutcome::Failed(e)),
        };

        match existing {
            None => match self.capability.create(cluster, object).await {
                Ok(created) => {
                    info!("created new object");
                    Ok(DispatchOutcome::Applied(record(cluster, &obj_ref, &created)))
                }
                Err(e) => Ok(DispatchOutcome::Failed(e)),
            },
            Some(current) => {
                let desired = deep_merge(current.clone(), object.clone());
                if desired == current {
                    return Ok(DispatchOutcome::NoChange(record(cluster, &obj_ref, &current)));
                }
                match self.capability.patch(cluster, &obj_ref, object).await {
                    Ok(patched) => {
                        info!("patched existing object");
                        Ok(DispatchOutcome::Applied(record(cluster, &obj_ref, &patched)))
                    }
                    Err(e) => Ok(DispatchOutcome::Failed(e)),
                }
            }
        }
    }
}

fn record(cluster: &str, obj_ref: &ObjectRef, object: &Value) -> DispatchRecord {
    DispatchRecord {
        cluster: cluster.to_string(),
        api_version: obj_ref.gvk.api_version.clone(),
        kind: obj_ref.gvk.kind.clone(),
        namespace: obj_ref.namespace.clone(),
        name: obj_ref.name.clone(),
        uid: object
            .get("metadata")
            .and_then(|m| m.get("uid"))
            .and_then(Value::as_str)
            .map(String::from),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeCluster {
        objects: Mutex<std::collections::HashMap<(String, String, String, String), Value>>,
        dry_run_rejects: bool,
    }

    #[async_trait]
    impl ClusterCapability for FakeCluster {
        async fn get(&self, cluster: &str, obj_ref: &ObjectRef) -> Result<Option<Value>, DispatchError> {
            let key = (
                cluster.to_string(),
                obj_ref.gvk.kind.clone(),
                obj_ref.namespace.clone(),
                obj_ref.name.clone(),
            );
            Ok(self.objects.lock().unwrap().get(&key).cloned())
        }

        async fn create(&self, cluster: &str, object: &Value) -> Result<Value, DispatchError> {
            let obj_ref = ObjectRef::from_object(object)?;
            let mut object = object.clone();
            object["metadata"]["uid"] = json!("uid-1");
            let key = (
                cluster.to_string(),
                obj_ref.gvk.kind.clone(),
                obj_ref.namespace.clone(),
                obj_ref.name.clone(),
            );
            self.objects.lock().unwrap().insert(key, object.clone());
            Ok(object)
        }

        async fn patch(
            &self,
            cluster: &str,
            obj_ref: &ObjectRef,
            object: &Value,
        ) -> Result<Value, DispatchError> {
            let key = (
                cluster.to_string(),
                obj_ref.gvk.kind.clone(),
                obj_ref.namespace.clone(),
                obj_ref.name.clone(),
            );
            let mut objects = self.objects.lock().unwrap();
            let current = objects.get(&key).cloned().unwrap_or(json!({}));
            let merged = deep_merge(current, object.clone());
            objects.insert(key, merged.clone());
            Ok(merged)
        }

        async fn dry_run(&self, _cluster: &str, _object: &Value) -> Result<(), DispatchError> {
            if self.dry_run_rejects {
                Err(DispatchError::DryRunRejected {
                    cluster: "local".into(),
                    kind: "Deployment".into(),
                    name: "web".into(),
                    reason: "admission webhook denied".into(),
                })
            } else {
                Ok(())
            }
        }
    }

    fn deployment(image: &str) -> Value {
        json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"namespace": "default", "name": "web"},
            "spec": {"image": image}
        })
    }

    #[tokio::test]
    async fn first_dispatch_creates_and_records() {
        let dispatcher = Dispatcher::new(FakeCluster::default(), true);
        let outcome = dispatcher.dispatch("local", &deployment("nginx:1.0")).await.unwrap();
        match outcome {
            DispatchOutcome::Applied(record) => {
                assert_eq!(record.kind, "Deployment");
                assert_eq!(record.uid.as_deref(), Some("uid-1"));
            }
            other => panic!("expected Applied, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeated_dispatch_with_identical_content_is_no_change() {
        let dispatcher = Dispatcher::new(FakeCluster::default(), true);
        dispatcher.dispatch("local", &deployment("nginx:1.0")).await.unwrap();
        let second = dispatcher.dispatch("local", &deployment("nginx:1.0")).await.unwrap();
        assert!(matches!(second, DispatchOutcome::NoChange(_)));
    }

    #[tokio::test]
    async fn dispatch_idempotence_applied_then_no_change() {
        let dispatcher = Dispatcher::new(FakeCluster::default(), false);
        let first = dispatcher.dispatch("local", &deployment("nginx:1.0")).await.unwrap();
        assert!(matches!(first, DispatchOutcome::Applied(_)));
        let second = dispatcher.dispatch("local", &deployment("nginx:1.0")).await.unwrap();
        assert!(matches!(second, DispatchOutcome::NoChange(_)));
    }

    #[tokio::test]
    async fn changed_content_is_applied_in_place() {
        let dispatcher = Dispatcher::new(FakeCluster::default(), true);
        dispatcher.dispatch("local", &deployment("nginx:1.0")).await.unwrap();
        let outcome = dispatcher.dispatch("local", &deployment("nginx:1.1")).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Applied(_)));
    }

    #[tokio::test]
    async fn dry_run_rejection_aborts_before_any_write() {
        let dispatcher = Dispatcher::new(
            FakeCluster {
                dry_run_rejects: true,
                ..Default::default()
            },
            true,
        );
        let outcome = dispatcher.dispatch("local", &deployment("nginx:1.0")).await.unwrap();
        assert!(matches!(outcome, DispatchOutcome::Failed(_)));
    }

    #[tokio::test]
    async fn malformed_object_is_a_hard_error() {
        let dispatcher = Dispatcher::new(FakeCluster::default(), true);
        let err = dispatcher.dispatch("local", &json!({"kind": "Deployment"})).await;
        assert!(err.is_err());
    }
}
