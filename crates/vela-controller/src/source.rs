//! Watches the `Application` custom resource on the control-plane cluster
//! and turns each admitted object into a typed [`ApplicationSpec`] plus its
//! shard label, ready for the [`Reconciler`](vela_reconciler::Reconciler).

use futures::Stream;
use kube::api::{Api, DynamicObject, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::discovery::{pinned_kind, Scope};
use kube::runtime::watcher::{self, Config as WatcherConfig};
use kube::runtime::WatchStreamExt;
use kube::Client;
use serde_json::Value;
use thiserror::Error;

use vela_core::model::ApplicationSpec;

pub const APPLICATION_GROUP: &str = "core.oam.dev";
pub const APPLICATION_VERSION: &str = "v1beta1";
pub const APPLICATION_KIND: &str = "Application";

const FIELD_MANAGER: &str = "vela-controller";

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to discover the Application CRD: {0}")]
    Discovery(#[source] kube::Error),

    #[error("object {name:?} has a malformed spec: {reason}")]
    MalformedSpec { name: String, reason: String },

    #[error("failed to patch application {name:?}: {source}")]
    PatchFailed { name: String, #[source] source: kube::Error },
}

/// A single observed `Application`, decoupled from the Kubernetes object
/// shape the reconciler has no business knowing about.
#[derive(Debug, Clone)]
pub struct ObservedApplication {
    pub spec: ApplicationSpec,
    pub shard_label: Option<String>,
}

/// Builds a watch stream over every `Application` object on the cluster
/// reached by `client`, yielding one item per apply/update event.
pub async fn watch_applications(
    client: Client,
) -> Result<impl Stream<Item = Result<DynamicObject, watcher::Error>>, SourceError> {
    let gvk = GroupVersionKind {
        group: APPLICATION_GROUP.to_string(),
        version: APPLICATION_VERSION.to_string(),
        kind: APPLICATION_KIND.to_string(),
    };
    let (api_resource, _capabilities) = pinned_kind(&client, &gvk).await.map_err(SourceError::Discovery)?;
    let api: Api<DynamicObject> = Api::all_with(client, &api_resource);
    Ok(watcher::watcher(api, WatcherConfig::default()).applied_objects())
}

/// Decodes a raw `Application` object's `.spec` plus metadata into an
/// [`ObservedApplication`]. The CRD's `spec` subresource omits `name`/
/// `namespace` (they live under `metadata`); this stitches them back in
/// before handing the document to `serde`.
pub fn observe(object: &DynamicObject) -> Result<ObservedApplication, SourceError> {
    let name = object.metadata.name.clone().unwrap_or_default();
    let namespace = object.metadata.namespace.clone().unwrap_or_else(|| "default".to_string());

    let mut spec_value = object.data.get("spec").cloned().unwrap_or(Value::Object(Default::default()));
    if let Some(map) = spec_value.as_object_mut() {
        map.insert("name".to_string(), Value::String(name.clone()));
        map.insert("namespace".to_string(), Value::String(namespace));
    }

    let spec: ApplicationSpec = serde_json::from_value(spec_value).map_err(|e| SourceError::MalformedSpec {
        name,
        reason: e.to_string(),
    })?;

    let shard_label = object
        .metadata
        .labels
        .as_ref()
        .and_then(|labels| labels.get(vela_core::labels::SHARD_ID))
        .cloned();

    Ok(ObservedApplication { spec, shard_label })
}

/// Patches `core.oam.dev/shard-id=shard_id` onto the named Application, used
/// by the master shard to place a newly-seen, unlabeled Application (§4.9).
pub async fn patch_shard_label(
    client: Client,
    namespace: &str,
    name: &str,
    shard_id: &str,
) -> Result<(), SourceError> {
    let gvk = GroupVersionKind {
        group: APPLICATION_GROUP.to_string(),
        version: APPLICATION_VERSION.to_string(),
        kind: APPLICATION_KIND.to_string(),
    };
    let (api_resource, capabilities) = pinned_kind(&client, &gvk).await.map_err(SourceError::Discovery)?;
    let api: Api<DynamicObject> = match capabilities.scope {
        Scope::Namespaced => Api::namespaced_with(client, namespace, &api_resource),
        Scope::Cluster => Api::all_with(client, &api_resource),
    };

    let patch = serde_json::json!({
        "metadata": { "labels": { vela_core::labels::SHARD_ID: shard_id } }
    });
    api.patch(name, &PatchParams::apply(FIELD_MANAGER), &Patch::Merge(&patch))
        .await
        .map_err(|e| SourceError::PatchFailed {
            name: name.to_string(),
            source: e,
        })?;
    Ok(())
}
