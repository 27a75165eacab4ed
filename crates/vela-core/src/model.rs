//! The user-authored Application document and its nested specs.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A reference to a trait attached to a component.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TraitSpec {
    #[serde(rename = "type")]
    pub trait_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// One deployable unit within an Application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ComponentSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub component_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
    #[serde(default)]
    pub traits: Vec<TraitSpec>,
    #[serde(default, rename = "dependsOn")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

/// Cross-cutting configuration referencing a PolicyDefinition (placement, health, override).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PolicySpec {
    pub name: String,
    #[serde(rename = "type")]
    pub policy_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Execution mode for the workflow engine.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum WorkflowMode {
    #[default]
    StepByStep,
    #[serde(rename = "DAG")]
    Dag,
}

/// One entry in `workflow.steps`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WorkflowStepSpec {
    pub name: String,
    #[serde(rename = "type")]
    pub step_type: String,
    #[serde(default)]
    pub properties: serde_json::Value,
    #[serde(default, rename = "dependsOn")]
    pub depends_on: Vec<String>,
    #[serde(default)]
    pub inputs: BTreeMap<String, String>,
    #[serde(default)]
    pub outputs: BTreeMap<String, String>,
}

/// The optional `workflow` block of an Application.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct WorkflowSpec {
    #[serde(default)]
    pub mode: WorkflowMode,
    pub steps: Vec<WorkflowStepSpec>,
}

/// The user-authored top-level document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationSpec {
    pub name: String,
    pub namespace: String,
    pub components: Vec<ComponentSpec>,
    #[serde(default)]
    pub policies: Vec<PolicySpec>,
    #[serde(default)]
    pub workflow: Option<WorkflowSpec>,
}

impl ApplicationSpec {
    /// Component, policy, and workflow step names must each be unique within their list.
    /// Returns the first duplicate name found, tagged with which list it came from.
    pub fn validate_unique_names(&self) -> Result<(), DuplicateNameError> {
        check_unique(
            self.components.iter().map(|c| c.name.as_str()),
            "component",
        )?;
        check_unique(self.policies.iter().map(|p| p.name.as_str()), "policy")?;
        if let Some(workflow) = &self.workflow {
            check_unique(
                workflow.steps.iter().map(|s| s.name.as_str()),
                "workflow step",
            )?;
        }
        Ok(())
    }

    /// Synthesizes a default "deploy" workflow (one `apply-component` step per
    /// component, in declaration order) when the Application has no explicit
    /// `workflow` block.
    pub fn effective_workflow(&self) -> WorkflowSpec {
        if let Some(workflow) = &self.workflow {
            return workflow.clone();
        }
        WorkflowSpec {
            mode: WorkflowMode::StepByStep,
            steps: self
                .components
                .iter()
                .map(|c| WorkflowStepSpec {
                    name: format!("apply-{}", c.name),
                    step_type: "apply-component".to_string(),
                    properties: serde_json::json!({ "component": c.name }),
                    depends_on: Vec::new(),
                    inputs: BTreeMap::new(),
                    outputs: BTreeMap::new(),
                })
                .collect(),
        }
    }
}

fn check_unique<'a>(
    names: impl Iterator<Item = &'a str>,
    list: &'static str,
) -> Result<(), DuplicateNameError> {
    let mut seen = std::collections::HashSet::new();
    for name in names {
        if !seen.insert(name) {
            return Err(DuplicateNameError {
                list,
                name: name.to_string(),
            });
        }
    }
    Ok(())
}

#[derive(Debug, Clone, thiserror::Error, PartialEq)]
#[error("duplicate {list} name {name:?}")]
pub struct DuplicateNameError {
    pub list: &'static str,
    pub name: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app(components: Vec<&str>) -> ApplicationSpec {
        ApplicationSpec {
            name: "app".into(),
            namespace: "default".into(),
            components: components
                .into_iter()
                .map(|n| ComponentSpec {
                    name: n.to_string(),
                    component_type: "webservice".into(),
                    properties: serde_json::json!({}),
                    traits: vec![],
                    depends_on: vec![],
                    inputs: BTreeMap::new(),
                    outputs: BTreeMap::new(),
                })
                .collect(),
            policies: vec![],
            workflow: None,
        }
    }

    #[test]
    fn unique_component_names_pass() {
        app(vec!["web", "db"]).validate_unique_names().unwrap();
    }

    #[test]
    fn duplicate_component_names_fail() {
        let err = app(vec!["web", "web"]).validate_unique_names().unwrap_err();
        assert_eq!(err.list, "component");
        assert_eq!(err.name, "web");
    }

    #[test]
    fn default_workflow_synthesizes_one_apply_step_per_component() {
        let a = app(vec!["web", "db"]);
        let wf = a.effective_workflow();
        assert_eq!(wf.steps.len(), 2);
        assert_eq!(wf.steps[0].name, "apply-web");
        assert_eq!(wf.steps[0].step_type, "apply-component");
    }
}
