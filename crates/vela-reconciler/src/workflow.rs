//! The Application's workflow of steps as a `vela_workflow::Workflow` state
//! machine: `apply-component`, `suspend`, `deploy`, and `step-group` step
//! types, in either `StepByStep` or `DAG` mode (§4.3).

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use vela_core::model::{WorkflowMode, WorkflowSpec, WorkflowStepSpec};
use vela_workflow::activity::ActivityError;
use vela_workflow::workflow::{WorkflowAction, WorkflowError, WorkflowSignal};
use vela_workflow::Workflow;

pub const STEP_TYPE_APPLY_COMPONENT: &str = "apply-component";
pub const STEP_TYPE_SUSPEND: &str = "suspend";
pub const STEP_TYPE_DEPLOY: &str = "deploy";
pub const STEP_TYPE_STEP_GROUP: &str = "step-group";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationWorkflowInput {
    pub application_name: String,
    pub workflow: WorkflowSpec,
    pub max_step_error_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationWorkflowOutput {
    pub step_outputs: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
enum StepState {
    Pending,
    Running,
    Suspended,
    Succeeded,
    Skipped,
    Failed,
}

#[derive(Debug)]
pub struct ApplicationWorkflow {
    input: ApplicationWorkflowInput,
    steps: Vec<WorkflowStepSpec>,
    state: HashMap<String, StepState>,
    retry_counts: HashMap<String, u32>,
    outputs: BTreeMap<String, serde_json::Value>,
    terminated: bool,
    error: Option<WorkflowError>,
}

impl ApplicationWorkflow {
    fn step(&self, name: &str) -> &WorkflowStepSpec {
        self.steps.iter().find(|s| s.name == name).expect("unknown step name")
    }

    fn is_ready(&self, step: &WorkflowStepSpec) -> bool {
        self.state.get(&step.name) == Some(&StepState::Pending)
            && step.depends_on.iter().all(|dep| {
                matches!(
                    self.state.get(dep),
                    Some(StepState::Succeeded) | Some(StepState::Skipped)
                )
            })
    }

    /// Steps eligible to run right now, respecting the declared mode.
    fn ready_steps(&self) -> Vec<String> {
        match self.input.workflow.mode {
            WorkflowMode::Dag => self
                .steps
                .iter()
                .filter(|s| self.is_ready(s))
                .map(|s| s.name.clone())
                .collect(),
            WorkflowMode::StepByStep => self
                .steps
                .iter()
                .find(|s| self.is_ready(s))
                .map(|s| vec![s.name.clone()])
                .unwrap_or_default(),
        }
    }

    fn dispatch_ready(&mut self) -> Vec<WorkflowAction> {
        let ready = self.ready_steps();
        let mut actions = Vec::with_capacity(ready.len());
        for name in ready {
            let step = self.step(&name).clone();
            self.state.insert(name.clone(), StepState::Running);
            match step.step_type.as_str() {
                STEP_TYPE_SUSPEND => {
                    self.state.insert(name.clone(), StepState::Suspended);
                }
                _ => {
                    actions.push(WorkflowAction::schedule_activity(
                        name,
                        step.step_type.clone(),
                        step.properties.clone(),
                    ));
                }
            }
        }
        actions
    }

    fn all_terminal(&self) -> bool {
        self.steps
            .iter()
            .all(|s| matches!(self.state.get(&s.name), Some(StepState::Succeeded) | Some(StepState::Skipped)))
    }

    fn any_failed(&self) -> bool {
        self.state.values().any(|s| *s == StepState::Failed)
    }

    fn finish_if_done(&mut self) -> Vec<WorkflowAction> {
        if self.any_failed() {
            let error = WorkflowError::new("one or more workflow steps failed");
            self.error = Some(error.clone());
            return vec![WorkflowAction::fail(error)];
        }
        if self.all_terminal() {
            let result = serde_json::to_value(ApplicationWorkflowOutput {
                step_outputs: self.outputs.clone(),
            })
            .expect("ApplicationWorkflowOutput is always serializable");
            return vec![WorkflowAction::complete(result)];
        }
        Vec::new()
    }
}

impl Workflow for ApplicationWorkflow {
    const TYPE: &'static str = "application_workflow";
    type Input = ApplicationWorkflowInput;
    type Output = ApplicationWorkflowOutput;

    fn new(input: Self::Input) -> Self {
        let steps = input.workflow.steps.clone();
        let state = steps.iter().map(|s| (s.name.clone(), StepState::Pending)).collect();
        Self {
            input,
            steps,
            state,
            retry_counts: HashMap::new(),
            outputs: BTreeMap::new(),
            terminated: false,
            error: None,
        }
    }

    fn on_start(&mut self) -> Vec<WorkflowAction> {
        if self.steps.is_empty() {
            return vec![WorkflowAction::complete(
                serde_json::to_value(ApplicationWorkflowOutput::default_empty()).unwrap(),
            )];
        }
        let actions = self.dispatch_ready();
        if actions.is_empty() {
            // every ready step this round was a `suspend`; nothing to schedule.
            return self.finish_if_done();
        }
        actions
    }

    fn on_activity_completed(&mut self, activity_id: &str, result: serde_json::Value) -> Vec<WorkflowAction> {
        self.state.insert(activity_id.to_string(), StepState::Succeeded);
        self.outputs.insert(activity_id.to_string(), result);
        let mut actions = self.dispatch_ready();
        if actions.is_empty() {
            actions = self.finish_if_done();
        }
        actions
    }

    fn on_activity_failed(&mut self, activity_id: &str, error: &ActivityError) -> Vec<WorkflowAction> {
        let retries = self.retry_counts.entry(activity_id.to_string()).or_insert(0);
        *retries += 1;
        if *retries <= self.input.max_step_error_retries && error.retryable {
            self.state.insert(activity_id.to_string(), StepState::Pending);
            return self.dispatch_ready();
        }
        self.state.insert(activity_id.to_string(), StepState::Failed);
        self.finish_if_done()
    }

    fn on_signal(&mut self, signal: &WorkflowSignal) -> Vec<WorkflowAction> {
        if signal.is_cancel() || signal.is_shutdown() {
            self.terminated = true;
            return vec![WorkflowAction::fail(WorkflowError::new("workflow terminated"))];
        }
        if signal.is_resume() {
            let suspended: Vec<String> = self
                .state
                .iter()
                .filter(|(_, s)| **s == StepState::Suspended)
                .map(|(name, _)| name.clone())
                .collect();
            for name in suspended {
                self.state.insert(name, StepState::Succeeded);
            }
            let mut actions = self.dispatch_ready();
            if actions.is_empty() {
                actions = self.finish_if_done();
            }
            return actions;
        }
        Vec::new()
    }

    fn is_completed(&self) -> bool {
        self.terminated || self.any_failed() || self.all_terminal()
    }

    fn result(&self) -> Option<Self::Output> {
        if self.terminated || self.any_failed() || !self.all_terminal() {
            return None;
        }
        Some(ApplicationWorkflowOutput {
            step_outputs: self.outputs.clone(),
        })
    }

    fn error(&self) -> Option<WorkflowError> {
        self.error.clone()
    }
}

impl ApplicationWorkflowOutput {
    fn default_empty() -> Self {
        Self {
            step_outputs: BTreeMap::new(),
        }
    }
}
