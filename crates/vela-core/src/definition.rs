//! ComponentDefinition / TraitDefinition / PolicyDefinition / WorkflowStepDefinition
//! and their shared revisioning.

use serde::{Deserialize, Serialize};

/// Which of the four definition kinds a [`Definition`] belongs to.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum DefinitionKind {
    Component,
    Trait,
    Policy,
    WorkflowStep,
}

impl std::fmt::Display for DefinitionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            DefinitionKind::Component => "component",
            DefinitionKind::Trait => "trait",
            DefinitionKind::Policy => "policy",
            DefinitionKind::WorkflowStep => "workflowstep",
        };
        write!(f, "{s}")
    }
}

/// Whether a trait runs before dispatch (can still influence the rendered object)
/// or in the default stage (after the workload has been rendered).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum TraitStage {
    #[default]
    Default,
    PreDispatch,
}

/// Health of a loaded definition.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum DefinitionHealth {
    #[default]
    Healthy,
    Unhealthy {
        reason: String,
    },
}

/// A versioned Component/Trait/Policy/WorkflowStep definition.
///
/// `(name, revision_hash)` is immutable once created: trait/policy/component
/// edits that change only labels/annotations do not produce a new revision.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Definition {
    pub kind: DefinitionKind,
    pub name: String,
    /// Content hash of `schematic` plus the fields below; identifies this revision.
    pub revision_hash: String,
    pub revision_number: u64,
    /// Workload kind this definition produces (components only).
    #[serde(default)]
    pub workload_kind: Option<String>,
    /// The template body, opaque to the registry; interpreted by the evaluator.
    pub schematic: serde_json::Value,
    /// Component kinds a trait may attach to (traits only; empty means "any").
    #[serde(default, rename = "appliesToWorkloads")]
    pub applies_to_workloads: Vec<String>,
    /// Trait types this trait cannot be combined with on the same component (traits only).
    #[serde(default, rename = "conflictsWith")]
    pub conflicts_with: Vec<String>,
    /// Whether applying this trait forces a pod restart (traits only; informational).
    #[serde(default, rename = "podDisruptive")]
    pub pod_disruptive: bool,
    #[serde(default)]
    pub stage: TraitStage,
    #[serde(default)]
    pub health: DefinitionHealth,
}

impl Definition {
    pub fn is_healthy(&self) -> bool {
        matches!(self.health, DefinitionHealth::Healthy)
    }

    /// Whether `other` is a trait type this definition conflicts with.
    pub fn conflicts_with(&self, other_trait_type: &str) -> bool {
        self.conflicts_with.iter().any(|t| t == other_trait_type)
    }

    /// Whether this trait may attach to a workload of the given kind.
    /// An empty `applies_to_workloads` list means "any kind".
    pub fn applies_to(&self, workload_kind: &str) -> bool {
        self.applies_to_workloads.is_empty()
            || self
                .applies_to_workloads
                .iter()
                .any(|k| k == workload_kind)
    }
}

/// Immutable identity of a definition revision, as referenced by an
/// ApplicationRevision's pinned definition set.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionRevisionRef {
    pub kind: DefinitionKind,
    pub name: String,
    pub revision_hash: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn def(conflicts: Vec<&str>) -> Definition {
        Definition {
            kind: DefinitionKind::Trait,
            name: "scaler".into(),
            revision_hash: "abc".into(),
            revision_number: 1,
            workload_kind: None,
            schematic: serde_json::json!({}),
            applies_to_workloads: vec![],
            conflicts_with: conflicts.into_iter().map(String::from).collect(),
            pod_disruptive: false,
            stage: TraitStage::Default,
            health: DefinitionHealth::Healthy,
        }
    }

    #[test]
    fn applies_to_any_when_unrestricted() {
        assert!(def(vec![]).applies_to("webservice"));
    }

    #[test]
    fn conflicts_with_checks_membership() {
        let d = def(vec!["ingress"]);
        assert!(d.conflicts_with("ingress"));
        assert!(!d.conflicts_with("scaler"));
    }

    #[test]
    fn unhealthy_definition_reports_reason() {
        let mut d = def(vec![]);
        d.health = DefinitionHealth::Unhealthy {
            reason: "bad template".into(),
        };
        assert!(!d.is_healthy());
    }
}
