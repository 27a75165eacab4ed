//! `ClusterCapability` backed by real Kubernetes clusters, reached through
//! `kube`. One `kube::Client` per named cluster (`"local"` denotes the
//! control-plane cluster itself); GVKs are resolved against each cluster's
//! discovery document at dispatch time since member clusters may not share
//! the control plane's installed CRDs.

use std::collections::HashMap;

use async_trait::async_trait;
use kube::api::{Api, DynamicObject, Patch, PatchParams, PostParams};
use kube::core::GroupVersionKind;
use kube::discovery::{pinned_kind, Scope};
use kube::Client;
use serde_json::Value;
use tracing::instrument;

use vela_core::error::DispatchError;

use crate::gvk::ObjectRef;
use crate::ClusterCapability;

const FIELD_MANAGER: &str = "vela-reconciler";

/// Maps a cluster name to the client used to reach it. Populated once at
/// controller startup from the configured member-cluster list; never
/// mutated afterward, so lookups need no locking.
pub struct KubeClusterCapability {
    clients: HashMap<String, Client>,
}

impl KubeClusterCapability {
    pub fn new(clients: HashMap<String, Client>) -> Self {
        Self { clients }
    }

    fn client_for(&self, cluster: &str) -> Result<Client, DispatchError> {
        self.clients
            .get(cluster)
            .cloned()
            .ok_or_else(|| DispatchError::ClusterUnreachable {
                cluster: cluster.to_string(),
                reason: "no client registered for this cluster".to_string(),
            })
    }

    async fn api_for(&self, cluster: &str, obj_ref: &ObjectRef) -> Result<Api<DynamicObject>, DispatchError> {
        let client = self.client_for(cluster)?;
        let gvk = parse_gvk(&obj_ref.gvk.api_version, &obj_ref.gvk.kind);
        let (api_resource, capabilities) = pinned_kind(&client, &gvk).await.map_err(|e| {
            DispatchError::ClusterUnreachable {
                cluster: cluster.to_string(),
                reason: format!(
                    "discovery failed for {}/{}: {e}",
                    obj_ref.gvk.api_version, obj_ref.gvk.kind
                ),
            }
        })?;
        Ok(match capabilities.scope {
            Scope::Namespaced => Api::namespaced_with(client, &obj_ref.namespace, &api_resource),
            Scope::Cluster => Api::all_with(client, &api_resource),
        })
    }
}

fn parse_gvk(api_version: &str, kind: &str) -> GroupVersionKind {
    match api_version.split_once('/') {
        Some((group, version)) => GroupVersionKind {
            group: group.to_string(),
            version: version.to_string(),
            kind: kind.to_string(),
        },
        None => GroupVersionKind {
            group: String::new(),
            version: api_version.to_string(),
            kind: kind.to_string(),
        },
    }
}

fn to_value(object: DynamicObject) -> Result<Value, DispatchError> {
    serde_json::to_value(object).map_err(|e| DispatchError::MalformedObject { reason: e.to_string() })
}

fn classify(cluster: &str, obj_ref: &ObjectRef, error: kube::Error) -> DispatchError {
    match &error {
        kube::Error::Api(resp) if resp.code == 409 => DispatchError::Conflict {
            cluster: cluster.to_string(),
            kind: obj_ref.gvk.kind.clone(),
            namespace: obj_ref.namespace.clone(),
            name: obj_ref.name.clone(),
        },
        kube::Error::Api(resp) if resp.code == 403 => DispatchError::Forbidden {
            cluster: cluster.to_string(),
            kind: obj_ref.gvk.kind.clone(),
            namespace: obj_ref.namespace.clone(),
            name: obj_ref.name.clone(),
        },
        _ => DispatchError::ClusterUnreachable {
            cluster: cluster.to_string(),
            reason: error.to_string(),
        },
    }
}

#[async_trait]
impl ClusterCapability for KubeClusterCapability {
    #[instrument(skip(self, obj_ref), fields(cluster = %cluster, kind = %obj_ref.gvk.kind, name = %obj_ref.name))]
    async fn get(&self, cluster: &str, obj_ref: &ObjectRef) -> Result<Option<Value>, DispatchError> {
        let api = self.api_for(cluster, obj_ref).await?;
        match api.get_opt(&obj_ref.name).await {
            Ok(Some(object)) => Ok(Some(to_value(object)?)),
            Ok(None) => Ok(None),
            Err(e) => Err(classify(cluster, obj_ref, e)),
        }
    }

    #[instrument(skip(self, object), fields(cluster = %cluster))]
    async fn create(&self, cluster: &str, object: &Value) -> Result<Value, DispatchError> {
        let obj_ref = ObjectRef::from_object(object)?;
        let api = self.api_for(cluster, &obj_ref).await?;
        let desired: DynamicObject =
            serde_json::from_value(object.clone()).map_err(|e| DispatchError::MalformedObject { reason: e.to_string() })?;
        let created = api
            .create(&PostParams::default(), &desired)
            .await
            .map_err(|e| classify(cluster, &obj_ref, e))?;
        to_value(created)
    }

    #[instrument(skip(self, object), fields(cluster = %cluster))]
    async fn patch(&self, cluster: &str, obj_ref: &ObjectRef, object: &Value) -> Result<Value, DispatchError> {
        let api = self.api_for(cluster, obj_ref).await?;
        let params = PatchParams::apply(FIELD_MANAGER);
        let patched = api
            .patch(&obj_ref.name, &params, &Patch::Apply(object))
            .await
            .map_err(|e| classify(cluster, obj_ref, e))?;
        to_value(patched)
    }

    #[instrument(skip(self, object), fields(cluster = %cluster))]
    async fn dry_run(&self, cluster: &str, object: &Value) -> Result<(), DispatchError> {
        let obj_ref = ObjectRef::from_object(object)?;
        let api = self.api_for(cluster, &obj_ref).await?;
        let params = PatchParams {
            dry_run: true,
            ..PatchParams::apply(FIELD_MANAGER)
        };
        api.patch(&obj_ref.name, &params, &Patch::Apply(object))
            .await
            .map_err(|e| DispatchError::DryRunRejected {
                cluster: cluster.to_string(),
                kind: obj_ref.gvk.kind.clone(),
                name: obj_ref.name.clone(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
