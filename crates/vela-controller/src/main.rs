//! `vela-controller`: watches `Application` objects on the control-plane
//! cluster and drives each to its rendered state (§4.7).
//!
//! Revision history and resource trackers are held in-memory via
//! `vela_revision::InMemoryRevisionStore`/`vela_tracker::InMemoryTrackerStore`,
//! keyed by application name (see DESIGN.md's Open Question 2).

mod config;
mod definitions;
mod source;
mod telemetry;

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use kube::api::{Api, DeleteParams, DynamicObject, Patch, PatchParams};
use kube::core::GroupVersionKind;
use kube::discovery::{pinned_kind, Scope};
use kube::Client;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

use vela_core::revision::ApplicationRevision;
use vela_core::tracker::ResourceTracker;
use vela_dispatch::KubeClusterCapability;
use vela_evaluator::MergeEvaluator;
use vela_reconciler::sharding::{ShardDecision, ShardRouter};
use vela_reconciler::Reconciler;
use vela_registry::CapabilityRegistry;
use vela_revision::{InMemoryRevisionStore, RevisionStore};
use vela_tracker::{InMemoryTrackerStore, TrackerStore};

const LOCAL_CLUSTER: &str = "local";

struct AppState {
    revisions: InMemoryRevisionStore,
    trackers: InMemoryTrackerStore,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    let cli = config::Cli::parse();
    let process_config = config::load(&cli).context("failed to load configuration")?;
    telemetry::init(&cli.log_format);

    info!(shard_id = %process_config.shard_id, concurrent_reconciles = process_config.concurrent_reconciles, "starting vela-controller");

    let enabled_compression: Vec<_> = [
        process_config.application_revision_compression(),
        process_config.resource_tracker_compression(),
    ]
    .into_iter()
    .collect();
    vela_reconciler::prestart::verify_compression_round_trips(&enabled_compression)
        .context("pre-start compression canary failed")?;

    let client = Client::try_default().await.context("failed to build Kubernetes client")?;
    let mut clients = HashMap::new();
    clients.insert(LOCAL_CLUSTER.to_string(), client.clone());
    let cluster = KubeClusterCapability::new(clients.clone());
    let deleter = Arc::new(KubeResourceDeleter::new(clients));

    let registry = Arc::new(CapabilityRegistry::new());
    let evaluator = Arc::new(MergeEvaluator::new());
    let reconciler = Arc::new(Reconciler::new(
        process_config.clone(),
        registry.clone(),
        evaluator,
        cluster,
    ));
    let router = Arc::new(ShardRouter::new(
        process_config.shard_id.clone(),
        process_config.schedulable_shards.clone(),
    ));
    let state = Arc::new(AppState {
        revisions: InMemoryRevisionStore::new(),
        trackers: InMemoryTrackerStore::new(),
    });
    let permits = Arc::new(Semaphore::new(process_config.concurrent_reconciles));

    let mut stream = source::watch_applications(client).await.context("failed to start Application watch")?;
    while let Some(next) = stream.next().await {
        let object = match next {
            Ok(object) => object,
            Err(e) => {
                warn!(error = %e, "application watch stream error");
                continue;
            }
        };

        let observed = match source::observe(&object) {
            Ok(observed) => observed,
            Err(e) => {
                warn!(error = %e, "skipping malformed application");
                continue;
            }
        };

        match router.route(observed.shard_label.as_deref()) {
            ShardDecision::NotOwned => continue,
            ShardDecision::Assign { shard_id } => {
                match source::patch_shard_label(client.clone(), &observed.spec.namespace, &observed.spec.name, &shard_id).await {
                    Ok(()) => info!(shard_id = %shard_id, application = %observed.spec.name, "assigned unlabeled application to shard"),
                    Err(e) => warn!(error = %e, application = %observed.spec.name, "failed to assign shard label"),
                }
                continue;
            }
            ShardDecision::Own => {}
        }

        let permit = permits.clone().acquire_owned().await.expect("semaphore never closed");
        let reconciler = reconciler.clone();
        let registry = registry.clone();
        let state = state.clone();
        let deleter = deleter.clone();

        tokio::spawn(async move {
            let _permit = permit;
            if let Err(e) = reconcile_one(&reconciler, &registry, &state, &deleter, observed.spec).await {
                error!(error = %e, "reconcile failed");
            }
        });
    }

    Ok(())
}

async fn reconcile_one(
    reconciler: &Reconciler<KubeClusterCapability>,
    registry: &CapabilityRegistry,
    state: &AppState,
    deleter: &KubeResourceDeleter,
    spec: vela_core::model::ApplicationSpec,
) -> Result<()> {
    let app_key = spec.name.clone();
    let current_revision = latest_revision(state, &app_key).await?;
    let pinned = definitions::pin(registry, &spec).context("unresolved definition reference")?;

    let render_ctx = vela_render::RenderContext {
        app_name: spec.name.clone(),
        app_revision: current_revision.as_ref().map(|r| r.revision_name()).unwrap_or_default(),
        revision_hash: current_revision.as_ref().map(|r| r.revision_hash.clone()).unwrap_or_default(),
        namespace: spec.namespace.clone(),
        cluster: LOCAL_CLUSTER.to_string(),
    };

    let mut prior_tracker = state.trackers.get_root(&app_key).await.unwrap_or_else(|_| ResourceTracker::root(&app_key));
    let mut live_tracker = ResourceTracker::new(&app_key, "pending");

    let outcome = reconciler
        .reconcile(
            &spec,
            current_revision.as_ref(),
            pinned,
            &render_ctx,
            LOCAL_CLUSTER,
            &mut live_tracker,
            &mut prior_tracker,
            deleter,
        )
        .await;

    if let Some(revision) = outcome.revision {
        state.revisions.put(revision).await.context("failed to persist revision")?;
    }
    state.trackers.put_root(prior_tracker).await.context("failed to persist root tracker")?;

    info!(
        application = %spec.name,
        phase = ?outcome.status.workflow_phase,
        requeue_after_secs = outcome.requeue_after.as_secs(),
        "reconcile complete"
    );
    Ok(())
}

async fn latest_revision(state: &AppState, app_key: &str) -> Result<Option<ApplicationRevision>> {
    let revisions = state.revisions.list(app_key).await.context("failed to list revisions")?;
    Ok(revisions.into_iter().max_by_key(|r| r.revision_number))
}

const GC_FIELD_MANAGER: &str = "vela-controller-gc";

/// `ResourceDeleter` backed by the same per-cluster clients the dispatcher
/// uses, resolving each entry's GVK against its cluster's discovery document
/// since tracker entries only carry `api_version`/`kind` strings.
struct KubeResourceDeleter {
    clients: HashMap<String, Client>,
}

impl KubeResourceDeleter {
    fn new(clients: HashMap<String, Client>) -> Self {
        Self { clients }
    }

    async fn api_for(
        &self,
        entry: &vela_core::tracker::ResourceTrackerEntry,
    ) -> Result<Api<DynamicObject>, vela_core::error::DispatchError> {
        let client = self.clients.get(&entry.cluster).cloned().ok_or_else(|| {
            vela_core::error::DispatchError::ClusterUnreachable {
                cluster: entry.cluster.clone(),
                reason: "no client registered for this cluster".to_string(),
            }
        })?;
        let gvk = match entry.api_version.split_once('/') {
            Some((group, version)) => GroupVersionKind {
                group: group.to_string(),
                version: version.to_string(),
                kind: entry.kind.clone(),
            },
            None => GroupVersionKind {
                group: String::new(),
                version: entry.api_version.clone(),
                kind: entry.kind.clone(),
            },
        };
        let (api_resource, capabilities) =
            pinned_kind(&client, &gvk).await.map_err(|e| vela_core::error::DispatchError::ClusterUnreachable {
                cluster: entry.cluster.clone(),
                reason: format!("discovery failed for {}/{}: {e}", entry.api_version, entry.kind),
            })?;
        Ok(match capabilities.scope {
            Scope::Namespaced => Api::namespaced_with(client, &entry.namespace, &api_resource),
            Scope::Cluster => Api::all_with(client, &api_resource),
        })
    }
}

#[async_trait::async_trait]
impl vela_tracker::ResourceDeleter for KubeResourceDeleter {
    async fn delete(&self, entry: &vela_core::tracker::ResourceTrackerEntry) -> Result<bool, vela_core::error::DispatchError> {
        let api = self.api_for(entry).await?;
        match api.delete(&entry.name, &DeleteParams::default()).await {
            Ok(_) => Ok(true),
            Err(kube::Error::Api(resp)) if resp.code == 404 => Ok(false),
            Err(e) => Err(vela_core::error::DispatchError::ClusterUnreachable {
                cluster: entry.cluster.clone(),
                reason: e.to_string(),
            }),
        }
    }

    async fn mark_orphaned(&self, entry: &vela_core::tracker::ResourceTrackerEntry) -> Result<(), vela_core::error::DispatchError> {
        let api = self.api_for(entry).await?;
        let patch = serde_json::json!({
            "metadata": {
                "annotations": {
                    vela_core::labels::TRAIT_POLICY_ORPHAN: vela_core::labels::TRAIT_POLICY_ORPHAN_VALUE,
                }
            }
        });
        api.patch(&entry.name, &PatchParams::apply(GC_FIELD_MANAGER), &Patch::Merge(&patch))
            .await
            .map_err(|e| vela_core::error::DispatchError::ClusterUnreachable {
                cluster: entry.cluster.clone(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}
