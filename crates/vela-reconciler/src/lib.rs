//! Top-level per-Application reconcile loop (§4.7): sharding guard, revision
//! reconciliation, validation, workflow execution, garbage collection, and
//! status publication.

pub mod prestart;
pub mod sharding;
pub mod status;
pub mod validation;
pub mod workflow;

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use vela_core::config::ProcessConfig;
use vela_core::model::ApplicationSpec;
use vela_core::revision::ApplicationRevision;
use vela_core::tracker::{DeletionPolicy, ResourceTracker, ResourceTrackerEntry};
use vela_dispatch::{ClusterCapability, DispatchOutcome, Dispatcher};
use vela_evaluator::TemplateEvaluator;
use vela_registry::CapabilityRegistry;
use vela_render::{RenderContext, Renderer};
use vela_revision::{reconcile_revision, PinnedDefinitions};
use vela_tracker::{GcConfig, ResourceDeleter};
use vela_workflow::{
    ActivityError, ExecutorError, InMemoryWorkflowEventStore, WorkflowEvent, WorkflowExecutor,
    WorkflowStatus,
};

use status::{ApplicationStatus, ComponentHealth, ComponentStatus, WorkflowPhase};
use workflow::{ApplicationWorkflow, ApplicationWorkflowInput};

/// Everything a single reconcile pass needs, wired once at controller
/// startup and shared (read-mostly) across every worker. The workflow
/// engine's event store is in-memory for the lifetime of this Reconciler,
/// matching `vela_revision::InMemoryRevisionStore`/
/// `vela_tracker::InMemoryTrackerStore`'s precedent elsewhere in this
/// codebase; a deployment that needs workflows to survive a process
/// restart would swap in `vela_workflow::PostgresWorkflowEventStore`.
pub struct Reconciler<C: ClusterCapability> {
    pub config: ProcessConfig,
    pub registry: Arc<CapabilityRegistry>,
    pub renderer: Renderer,
    pub dispatcher: Dispatcher<C>,
    workflow_executor: WorkflowExecutor<InMemoryWorkflowEventStore>,
    workflow_ids: Mutex<HashMap<String, Uuid>>,
}

/// Outcome of one full reconcile pass over an Application, ready to publish.
#[derive(Debug)]
pub struct ReconcileOutcome {
    pub revision: Option<ApplicationRevision>,
    pub status: ApplicationStatus,
    pub requeue_after: Duration,
}

impl<C: ClusterCapability> Reconciler<C> {
    pub fn new(
        config: ProcessConfig,
        registry: Arc<CapabilityRegistry>,
        evaluator: Arc<dyn TemplateEvaluator>,
        cluster: C,
    ) -> Self {
        let renderer = Renderer::new(registry.clone(), evaluator);
        let dispatcher = Dispatcher::new(cluster, config.pre_dispatch_dry_run);
        let mut workflow_executor = WorkflowExecutor::new(InMemoryWorkflowEventStore::new());
        workflow_executor.register::<ApplicationWorkflow>();
        Self {
            config,
            registry,
            renderer,
            dispatcher,
            workflow_executor,
            workflow_ids: Mutex::new(HashMap::new()),
        }
    }

    /// §4.7 steps 2-6 for a single Application. Sharding (step 1) and
    /// requeue scheduling (step 7) are the caller's responsibility since
    /// they depend on the worker pool, not on any single Application's state.
    pub async fn reconcile<D: ResourceDeleter>(
        &self,
        spec: &ApplicationSpec,
        current_revision: Option<&ApplicationRevision>,
        definitions: PinnedDefinitions,
        render_ctx: &RenderContext,
        cluster: &str,
        live_tracker: &mut ResourceTracker,
        prior_tracker: &mut ResourceTracker,
        deleter: &D,
    ) -> ReconcileOutcome {
        let compression = self.config.application_revision_compression();

        let new_revision = match reconcile_revision(current_revision, spec, definitions, compression) {
            Ok(rev) => rev,
            Err(e) => {
                warn!(error = %e, "revision reconcile failed");
                return ReconcileOutcome {
                    revision: None,
                    status: failed_status(current_revision, e.to_string()),
                    requeue_after: Duration::from_secs(self.config.max_workflow_failed_backoff_seconds),
                };
            }
        };

        if let Err(e) = validation::validate(spec, &self.registry) {
            return ReconcileOutcome {
                revision: new_revision,
                status: failed_status(current_revision, e.to_string()),
                requeue_after: Duration::from_secs(self.config.max_workflow_failed_backoff_seconds),
            };
        }

        let revision_name = new_revision
            .as_ref()
            .map(|r| r.revision_name())
            .or_else(|| current_revision.map(|r| r.revision_name()))
            .unwrap_or_default();

        let (phase, components, workflow_error) = self
            .run_workflow(spec, render_ctx, cluster, &revision_name, live_tracker)
            .await;

        let gc_config = GcConfig::default();
        let mut rng = rand::thread_rng();
        let _gc_report = vela_tracker::mark_and_sweep(
            deleter,
            live_tracker,
            prior_tracker,
            current_revision.is_some(),
            &gc_config,
            &mut rng,
        )
        .await;

        info!(revision = %revision_name, ?phase, "reconcile pass complete");

        let requeue_after = status::requeue_backoff(
            phase,
            0,
            Duration::from_secs(self.config.application_re_sync_period_seconds),
            Duration::from_secs(self.config.max_workflow_wait_backoff_seconds),
            Duration::from_secs(self.config.max_workflow_failed_backoff_seconds),
        );

        ReconcileOutcome {
            revision: new_revision,
            status: ApplicationStatus {
                components,
                workflow_phase: phase,
                revision_pointer: revision_name,
                last_error: workflow_error,
            },
            requeue_after,
        }
    }

    /// Starts (or resumes) this Application's `ApplicationWorkflow` and
    /// drives it to completion or suspension, executing each ready step's
    /// render+dispatch inline. There is no standalone worker pool polling
    /// `vela_workflow`'s task queue in this controller, so the reconcile
    /// pass plays that role itself: after each activity outcome is recorded
    /// the event log is re-read for newly scheduled activities, which is
    /// how DAG mode's independently-ready steps and step retries surface.
    async fn run_workflow(
        &self,
        spec: &ApplicationSpec,
        render_ctx: &RenderContext,
        cluster: &str,
        revision_name: &str,
        live_tracker: &mut ResourceTracker,
    ) -> (WorkflowPhase, Vec<ComponentStatus>, Option<String>) {
        let workflow_input = ApplicationWorkflowInput {
            application_name: spec.name.clone(),
            workflow: spec.effective_workflow(),
            max_step_error_retries: self.config.max_workflow_step_error_retry_times,
        };

        let workflow_id = match self.start_or_resume_workflow(workflow_input).await {
            Ok(id) => id,
            Err(e) => {
                warn!(error = %e, "failed to start application workflow");
                return (WorkflowPhase::Failed, Vec::new(), Some(e.to_string()));
            }
        };

        let mut component_status: HashMap<String, ComponentStatus> = HashMap::new();
        let mut first_error: Option<String> = None;

        loop {
            let events = match self.workflow_executor.store().load_events(workflow_id).await {
                Ok(events) => events,
                Err(e) => {
                    warn!(error = %e, "failed to load workflow events");
                    first_error.get_or_insert(e.to_string());
                    break;
                }
            };
            let pending = pending_activities(&events);
            if pending.is_empty() {
                break;
            }

            for (activity_id, activity_type, input) in pending {
                match self
                    .execute_step(spec, &activity_type, &input, render_ctx, cluster, revision_name, live_tracker)
                    .await
                {
                    Ok((result, component_name)) => {
                        if let Some(name) = component_name {
                            component_status.insert(
                                name.clone(),
                                ComponentStatus { name, health: ComponentHealth::Healthy, last_error: None },
                            );
                        }
                        if let Err(e) = self.workflow_executor.on_activity_completed(workflow_id, &activity_id, result).await {
                            warn!(error = %e, %activity_id, "failed to record activity completion");
                            first_error.get_or_insert(e.to_string());
                        }
                    }
                    Err((activity_err, component_name)) => {
                        first_error.get_or_insert(activity_err.message.clone());
                        if let Some(name) = component_name {
                            component_status.insert(
                                name.clone(),
                                ComponentStatus {
                                    name,
                                    health: ComponentHealth::Unhealthy,
                                    last_error: Some(activity_err.message.clone()),
                                },
                            );
                        }
                        if let Err(e) = self
                            .workflow_executor
                            .on_activity_failed(workflow_id, &activity_id, activity_err, false)
                            .await
                        {
                            warn!(error = %e, %activity_id, "failed to record activity failure");
                            first_error.get_or_insert(e.to_string());
                        }
                    }
                }
            }
        }

        let phase = match self.workflow_executor.store().get_workflow_status(workflow_id).await {
            Ok(WorkflowStatus::Completed) => WorkflowPhase::Succeeded,
            Ok(WorkflowStatus::Failed) => WorkflowPhase::Failed,
            Ok(WorkflowStatus::Cancelled) => WorkflowPhase::Terminated,
            Ok(WorkflowStatus::Running) => WorkflowPhase::Suspended,
            Ok(WorkflowStatus::Pending) => WorkflowPhase::Initializing,
            Err(e) => {
                first_error.get_or_insert(e.to_string());
                WorkflowPhase::Failed
            }
        };

        if phase == WorkflowPhase::Failed && first_error.is_none() {
            if let Ok(info) = self.workflow_executor.store().get_workflow_info(workflow_id).await {
                first_error = info.error.map(|e| e.message);
            }
        }

        let components = spec
            .components
            .iter()
            .map(|c| {
                component_status.remove(&c.name).unwrap_or(ComponentStatus {
                    name: c.name.clone(),
                    health: ComponentHealth::Healthy,
                    last_error: None,
                })
            })
            .collect();

        (phase, components, first_error)
    }

    /// Returns the workflow id driving `input.application_name`, reusing a
    /// non-terminal one from a prior reconcile pass (so a `suspend` step
    /// stays suspended across passes rather than restarting) or starting a
    /// fresh workflow otherwise.
    async fn start_or_resume_workflow(&self, input: ApplicationWorkflowInput) -> Result<Uuid, ExecutorError> {
        let existing = self
            .workflow_ids
            .lock()
            .expect("workflow_ids lock poisoned")
            .get(&input.application_name)
            .copied();

        if let Some(id) = existing {
            if let Ok(status) = self.workflow_executor.store().get_workflow_status(id).await {
                if !matches!(status, WorkflowStatus::Completed | WorkflowStatus::Failed | WorkflowStatus::Cancelled) {
                    return Ok(id);
                }
            }
        }

        let application_name = input.application_name.clone();
        let id = self.workflow_executor.start_workflow::<ApplicationWorkflow>(input, None).await?;
        self.workflow_ids.lock().expect("workflow_ids lock poisoned").insert(application_name, id);
        Ok(id)
    }

    /// Executes one ready workflow step: `apply-component`/`deploy` render
    /// and dispatch the named component; `step-group` has no nested
    /// sub-step list on `WorkflowStepSpec` to execute, so it completes as
    /// an immediate no-op join point. Returns the component name touched
    /// (if any) alongside the result so the caller can fold it into
    /// per-component status.
    async fn execute_step(
        &self,
        spec: &ApplicationSpec,
        activity_type: &str,
        input: &serde_json::Value,
        render_ctx: &RenderContext,
        cluster: &str,
        revision_name: &str,
        live_tracker: &mut ResourceTracker,
    ) -> Result<(serde_json::Value, Option<String>), (ActivityError, Option<String>)> {
        match activity_type {
            workflow::STEP_TYPE_APPLY_COMPONENT | workflow::STEP_TYPE_DEPLOY => {
                let component_name = input
                    .get("component")
                    .and_then(serde_json::Value::as_str)
                    .ok_or_else(|| (ActivityError::non_retryable("workflow step is missing a \"component\" property"), None))?;

                let component = spec
                    .components
                    .iter()
                    .find(|c| c.name == component_name)
                    .ok_or_else(|| {
                        (
                            ActivityError::non_retryable(format!("unknown component {component_name:?}")),
                            Some(component_name.to_string()),
                        )
                    })?;

                let rendered = self
                    .renderer
                    .render(component, render_ctx)
                    .map_err(|e| (ActivityError::non_retryable(e.to_string()), Some(component_name.to_string())))?;

                for object in std::iter::once(&rendered.workload).chain(rendered.auxiliary.iter()) {
                    match self.dispatcher.dispatch(cluster, object).await {
                        Ok(DispatchOutcome::Applied(record) | DispatchOutcome::NoChange(record)) => {
                            live_tracker.entries.push(ResourceTrackerEntry {
                                cluster: record.cluster,
                                api_version: record.api_version,
                                kind: record.kind,
                                namespace: record.namespace,
                                name: record.name,
                                uid: record.uid,
                                creator_revision: revision_name.to_string(),
                                deletion_policy: DeletionPolicy::Delete,
                            });
                        }
                        Ok(DispatchOutcome::Failed(e)) => {
                            return Err((ActivityError::retryable(e.to_string()), Some(component_name.to_string())))
                        }
                        Err(e) => return Err((ActivityError::retryable(e.to_string()), Some(component_name.to_string()))),
                    }
                }

                Ok((serde_json::json!({ "component": component_name }), Some(component_name.to_string())))
            }
            workflow::STEP_TYPE_STEP_GROUP => Ok((serde_json::json!({}), None)),
            other => Err((ActivityError::non_retryable(format!("unknown workflow step type {other:?}")), None)),
        }
    }
}

/// Reconstructs the set of activities currently scheduled-but-not-yet-
/// resolved for a workflow by folding its event log in order: an
/// `ActivityScheduled` adds an entry, a terminal `ActivityCompleted`/
/// `ActivityFailed` removes it (a retried step reappears via its own later
/// `ActivityScheduled` event).
fn pending_activities(events: &[(i32, WorkflowEvent)]) -> Vec<(String, String, serde_json::Value)> {
    let mut scheduled: BTreeMap<String, (String, serde_json::Value)> = BTreeMap::new();
    for (_, event) in events {
        match event {
            WorkflowEvent::ActivityScheduled { activity_id, activity_type, input, .. } => {
                scheduled.insert(activity_id.clone(), (activity_type.clone(), input.clone()));
            }
            WorkflowEvent::ActivityCompleted { activity_id, .. } | WorkflowEvent::ActivityFailed { activity_id, .. } => {
                scheduled.remove(activity_id);
            }
            _ => {}
        }
    }
    scheduled.into_iter().map(|(id, (t, i))| (id, t, i)).collect()
}

fn failed_status(current_revision: Option<&ApplicationRevision>, reason: String) -> ApplicationStatus {
    ApplicationStatus {
        components: Vec::new(),
        workflow_phase: WorkflowPhase::Failed,
        revision_pointer: current_revision.map(|r| r.revision_name()).unwrap_or_default(),
        last_error: Some(reason),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use vela_core::definition::{Definition, DefinitionHealth, DefinitionKind, TraitStage};
    use vela_core::error::DispatchError;
    use vela_core::model::ComponentSpec;
    use vela_dispatch::ObjectRef;
    use vela_evaluator::{EvalContext, EvaluationResult, EvaluatorError};
    use vela_tracker::ResourceTrackerEntry;

    struct EchoEvaluator;
    impl TemplateEvaluator for EchoEvaluator {
        fn evaluate(&self, body: &serde_json::Value, _ctx: &EvalContext, _parameter: &serde_json::Value) -> Result<EvaluationResult, EvaluatorError> {
            Ok(EvaluationResult {
                output: body.get("output").cloned().unwrap_or(serde_json::json!({
                    "apiVersion": "apps/v1",
                    "kind": "Deployment",
                    "metadata": {"namespace": "default", "name": "web"},
                })),
                outputs: Default::default(),
                health: None,
            })
        }
        fn validate(&self, _body: &serde_json::Value) -> Result<serde_json::Value, EvaluatorError> {
            Ok(serde_json::json!({}))
        }
    }

    #[derive(Default)]
    struct FakeCluster;
    #[async_trait]
    impl ClusterCapability for FakeCluster {
        async fn get(&self, _cluster: &str, _obj_ref: &ObjectRef) -> Result<Option<serde_json::Value>, DispatchError> {
            Ok(None)
        }
        async fn create(&self, _cluster: &str, object: &serde_json::Value) -> Result<serde_json::Value, DispatchError> {
            Ok(object.clone())
        }
        async fn patch(&self, _cluster: &str, _obj_ref: &ObjectRef, object: &serde_json::Value) -> Result<serde_json::Value, DispatchError> {
            Ok(object.clone())
        }
        async fn dry_run(&self, _cluster: &str, _object: &serde_json::Value) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    struct NoopDeleter;
    #[async_trait]
    impl ResourceDeleter for NoopDeleter {
        async fn delete(&self, _entry: &ResourceTrackerEntry) -> Result<bool, DispatchError> {
            Ok(true)
        }

        async fn mark_orphaned(&self, _entry: &ResourceTrackerEntry) -> Result<(), DispatchError> {
            Ok(())
        }
    }

    fn registry() -> Arc<CapabilityRegistry> {
        let registry = CapabilityRegistry::new();
        registry.register(Definition {
            kind: DefinitionKind::Component,
            name: "webservice".into(),
            revision_hash: "h1".into(),
            revision_number: 1,
            workload_kind: Some("Deployment".into()),
            schematic: serde_json::json!({}),
            applies_to_workloads: vec![],
            conflicts_with: vec![],
            pod_disruptive: false,
            stage: TraitStage::Default,
            health: DefinitionHealth::Healthy,
        });
        registry.register(Definition {
            kind: DefinitionKind::WorkflowStep,
            name: "apply-component".into(),
            revision_hash: "h1".into(),
            revision_number: 1,
            workload_kind: None,
            schematic: serde_json::json!({}),
            applies_to_workloads: vec![],
            conflicts_with: vec![],
            pod_disruptive: false,
            stage: TraitStage::Default,
            health: DefinitionHealth::Healthy,
        });
        Arc::new(registry)
    }

    fn spec() -> ApplicationSpec {
        ApplicationSpec {
            name: "web".into(),
            namespace: "default".into(),
            components: vec![ComponentSpec {
                name: "web".into(),
                component_type: "webservice".into(),
                properties: serde_json::json!({}),
                traits: vec![],
                depends_on: vec![],
                inputs: Default::default(),
                outputs: Default::default(),
            }],
            policies: vec![],
            workflow: None,
        }
    }

    #[tokio::test]
    async fn first_reconcile_creates_revision_and_succeeds() {
        let registry = registry();
        let reconciler = Reconciler::new(
            ProcessConfig::default(),
            registry.clone(),
            Arc::new(EchoEvaluator),
            FakeCluster::default(),
        );
        let ctx = RenderContext {
            app_name: "web".into(),
            app_revision: "web-v1".into(),
            revision_hash: "h1".into(),
            namespace: "default".into(),
            cluster: "local".into(),
        };
        let mut live = ResourceTracker::root("web");
        let mut prior = ResourceTracker::root("web");

        let outcome = reconciler
            .reconcile(
                &spec(),
                None,
                PinnedDefinitions {
                    components: vec![],
                    traits: vec![],
                    policies: vec![],
                    workflow_steps: vec![],
                },
                &ctx,
                "local",
                &mut live,
                &mut prior,
                &NoopDeleter,
            )
            .await;

        assert!(outcome.revision.is_some());
        assert_eq!(outcome.status.workflow_phase, WorkflowPhase::Succeeded);
        assert!(outcome.status.is_healthy());
    }
}
