//! Published Application status (§4.7 step 6) and the terminal/transient
//! requeue backoff (§4.7 step 7, §6 `max-workflow-*-backoff-time`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ComponentHealth {
    Healthy,
    Unhealthy,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentStatus {
    pub name: String,
    pub health: ComponentHealth,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum WorkflowPhase {
    Initializing,
    Running,
    Suspended,
    Succeeded,
    Failed,
    Terminated,
}

impl WorkflowPhase {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowPhase::Succeeded | WorkflowPhase::Failed | WorkflowPhase::Terminated
        )
    }
}

/// What gets published back to the cluster after one reconcile pass.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationStatus {
    pub components: Vec<ComponentStatus>,
    pub workflow_phase: WorkflowPhase,
    /// Name of the ApplicationRevision currently in effect.
    pub revision_pointer: String,
    pub last_error: Option<String>,
}

impl ApplicationStatus {
    pub fn is_healthy(&self) -> bool {
        self.last_error.is_none()
            && self
                .components
                .iter()
                .all(|c| c.health == ComponentHealth::Healthy)
    }
}

/// Requeue delay for the next reconcile pass, given the current workflow
/// phase and how many consecutive transient failures preceded it.
///
/// Terminal phases (`Succeeded`) fall back to the normal resync period.
/// `Suspended` waits up to `max_workflow_wait_backoff`. Transient failures
/// back off exponentially (base 1s, doubling) capped at
/// `max_workflow_failed_backoff`.
pub fn requeue_backoff(
    phase: WorkflowPhase,
    consecutive_failures: u32,
    resync_period: Duration,
    max_wait_backoff: Duration,
    max_failed_backoff: Duration,
) -> Duration {
    match phase {
        WorkflowPhase::Succeeded | WorkflowPhase::Terminated => resync_period,
        WorkflowPhase::Suspended => max_wait_backoff,
        WorkflowPhase::Failed => {
            let exp = 1u64.saturating_shl(consecutive_failures.min(20));
            Duration::from_secs(exp).min(max_failed_backoff)
        }
        WorkflowPhase::Initializing | WorkflowPhase::Running => Duration::from_secs(0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn succeeded_uses_resync_period() {
        let d = requeue_backoff(
            WorkflowPhase::Succeeded,
            0,
            Duration::from_secs(300),
            Duration::from_secs(60),
            Duration::from_secs(300),
        );
        assert_eq!(d, Duration::from_secs(300));
    }

    #[test]
    fn suspended_uses_wait_backoff() {
        let d = requeue_backoff(
            WorkflowPhase::Suspended,
            0,
            Duration::from_secs(300),
            Duration::from_secs(60),
            Duration::from_secs(300),
        );
        assert_eq!(d, Duration::from_secs(60));
    }

    #[test]
    fn failed_backs_off_exponentially_up_to_cap() {
        let max = Duration::from_secs(300);
        let d0 = requeue_backoff(WorkflowPhase::Failed, 0, Duration::from_secs(300), Duration::from_secs(60), max);
        let d3 = requeue_backoff(WorkflowPhase::Failed, 3, Duration::from_secs(300), Duration::from_secs(60), max);
        let d_many = requeue_backoff(WorkflowPhase::Failed, 20, Duration::from_secs(300), Duration::from_secs(60), max);
        assert_eq!(d0, Duration::from_secs(1));
        assert_eq!(d3, Duration::from_secs(8));
        assert_eq!(d_many, max);
    }

    #[test]
    fn is_healthy_requires_no_error_and_all_components_healthy() {
        let status = ApplicationStatus {
            components: vec![ComponentStatus {
                name: "web".into(),
                health: ComponentHealth::Healthy,
                last_error: None,
            }],
            workflow_phase: WorkflowPhase::Succeeded,
            revision_pointer: "web-v1".into(),
            last_error: None,
        };
        assert!(status.is_healthy());
    }
}
