//! Structural validation (§4.7 step 3, §7 `ValidationError`): duplicate
//! names, unresolved `type` references, inapplicable traits, and workflow
//! step dependency cycles.

use std::collections::{HashMap, HashSet};

use thiserror::Error;

use vela_core::definition::DefinitionKind;
use vela_core::model::{ApplicationSpec, WorkflowMode, WorkflowStepSpec};
use vela_registry::CapabilityRegistry;

#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    #[error("duplicate {list} name {name:?}")]
    DuplicateName { list: &'static str, name: String },
    #[error("component {component:?} references unknown component type {type_name:?}")]
    UnknownComponentType { component: String, type_name: String },
    #[error("component {component:?} trait {trait_type:?} has no registered TraitDefinition")]
    UnknownTraitType { component: String, trait_type: String },
    #[error("policy {policy:?} references unknown policy type {type_name:?}")]
    UnknownPolicyType { policy: String, type_name: String },
    #[error("workflow step {step:?} references unknown step type {type_name:?}")]
    UnknownStepType { step: String, type_name: String },
    #[error("trait {trait_type:?} on component {component:?} is not applicable to workload kind {workload_kind:?}")]
    TraitNotApplicable {
        component: String,
        trait_type: String,
        workload_kind: String,
    },
    #[error("traits {a:?} and {b:?} on component {component:?} conflict")]
    TraitsConflict { component: String, a: String, b: String },
    #[error("workflow step dependency graph contains a cycle at {step:?}")]
    DependencyCycle { step: String },
    #[error("workflow step {step:?} depends on unknown step {depends_on:?}")]
    UnknownDependency { step: String, depends_on: String },
}

/// Runs every structural check in §4.7 step 3 against `spec`, resolving
/// `type` references through `registry`. Returns the first error found, or
/// every error if the caller calls the individual checks directly.
pub fn validate(spec: &ApplicationSpec, registry: &CapabilityRegistry) -> Result<(), ValidationError> {
    spec.validate_unique_names()
        .map_err(|e| ValidationError::DuplicateName { list: e.list, name: e.name })?;

    for component in &spec.components {
        let def = registry
            .lookup(DefinitionKind::Component, &component.component_type)
            .map_err(|_| ValidationError::UnknownComponentType {
                component: component.name.clone(),
                type_name: component.component_type.clone(),
            })?;
        let workload_kind = def.workload_kind.clone().unwrap_or(def.name.clone());

        let mut applied_traits: Vec<String> = Vec::new();
        for t in &component.traits {
            let trait_def = registry
                .lookup(DefinitionKind::Trait, &t.trait_type)
                .map_err(|_| ValidationError::UnknownTraitType {
                    component: component.name.clone(),
                    trait_type: t.trait_type.clone(),
                })?;
            if !trait_def.applies_to(&workload_kind) {
                return Err(ValidationError::TraitNotApplicable {
                    component: component.name.clone(),
                    trait_type: t.trait_type.clone(),
                    workload_kind,
                });
            }
            if let Some(conflicting) = applied_traits
                .iter()
                .find(|applied| trait_def.conflicts_with(applied))
            {
                return Err(ValidationError::TraitsConflict {
                    component: component.name.clone(),
                    a: t.trait_type.clone(),
                    b: conflicting.clone(),
                });
            }
            applied_traits.push(t.trait_type.clone());
        }
    }

    for policy in &spec.policies {
        registry
            .lookup(DefinitionKind::Policy, &policy.policy_type)
            .map_err(|_| ValidationError::UnknownPolicyType {
                policy: policy.name.clone(),
                type_name: policy.policy_type.clone(),
            })?;
    }

    let workflow = spec.effective_workflow();
    for step in &workflow.steps {
        registry
            .lookup(DefinitionKind::WorkflowStep, &step.step_type)
            .map_err(|_| ValidationError::UnknownStepType {
                step: step.name.clone(),
                type_name: step.step_type.clone(),
            })?;
    }

    check_dependencies_resolve(&workflow.steps)?;
    if workflow.mode == WorkflowMode::Dag {
        check_acyclic(&workflow.steps)?;
    }

    Ok(())
}

fn check_dependencies_resolve(steps: &[WorkflowStepSpec]) -> Result<(), ValidationError> {
    let names: HashSet<&str> = steps.iter().map(|s| s.name.as_str()).collect();
    for step in steps {
        for dep in &step.depends_on {
            if !names.contains(dep.as_str()) {
                return Err(ValidationError::UnknownDependency {
                    step: step.name.clone(),
                    depends_on: dep.clone(),
                });
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm: repeatedly removes steps with no unresolved
/// dependencies. Anything left over once no more can be removed participates
/// in a cycle.
fn check_acyclic(steps: &[WorkflowStepSpec]) -> Result<(), ValidationError> {
    let mut indegree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for step in steps {
        indegree.entry(step.name.as_str()).or_insert(0);
        for dep in &step.depends_on {
            *indegree.entry(step.name.as_str()).or_insert(0) += 1;
            dependents.entry(dep.as_str()).or_default().push(step.name.as_str());
        }
    }

    let mut queue: Vec<&str> = indegree
        .iter()
        .filter(|(_, &deg)| deg == 0)
        .map(|(&name, _)| name)
        .collect();
    queue.sort_unstable();

    let mut visited = 0usize;
    while let Some(name) = queue.pop() {
        visited += 1;
        if let Some(children) = dependents.get(name) {
            for &child in children {
                let deg = indegree.get_mut(child).unwrap();
                *deg -= 1;
                if *deg == 0 {
                    queue.push(child);
                }
            }
        }
    }

    if visited != steps.len() {
        let stuck = steps
            .iter()
            .find(|s| indegree.get(s.name.as_str()).copied().unwrap_or(0) > 0)
            .map(|s| s.name.clone())
            .unwrap_or_default();
        return Err(ValidationError::DependencyCycle { step: stuck });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use vela_core::definition::{Definition, DefinitionHealth};
    use vela_core::model::{ComponentSpec, WorkflowSpec};

    fn def(kind: DefinitionKind, name: &str, applies_to: Vec<&str>) -> Definition {
        Definition {
            kind,
            name: name.to_string(),
            revision_hash: "h1".into(),
            revision_number: 1,
            workload_kind: None,
            schematic: serde_json::json!({}),
            applies_to_workloads: applies_to.into_iter().map(String::from).collect(),
            conflicts_with: vec![],
            pod_disruptive: false,
            stage: vela_core::definition::TraitStage::Default,
            health: DefinitionHealth::Healthy,
        }
    }

    fn registry_with(kind: DefinitionKind, name: &str, applicable: Vec<&str>) -> CapabilityRegistry {
        let registry = CapabilityRegistry::new();
        registry.register(def(kind, name, applicable));
        registry
    }

    fn step(name: &str, depends_on: Vec<&str>) -> WorkflowStepSpec {
        WorkflowStepSpec {
            name: name.into(),
            step_type: "apply-component".into(),
            properties: serde_json::json!({}),
            depends_on: depends_on.into_iter().map(String::from).collect(),
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    fn component(name: &str) -> ComponentSpec {
        ComponentSpec {
            name: name.into(),
            component_type: "webservice".into(),
            properties: serde_json::json!({}),
            traits: vec![],
            depends_on: vec![],
            inputs: BTreeMap::new(),
            outputs: BTreeMap::new(),
        }
    }

    #[test]
    fn unknown_component_type_is_rejected() {
        let registry = CapabilityRegistry::new();
        let spec = ApplicationSpec {
            name: "app".into(),
            namespace: "default".into(),
            components: vec![component("web")],
            policies: vec![],
            workflow: None,
        };
        let err = validate(&spec, &registry).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownComponentType { .. }));
    }

    #[test]
    fn acyclic_dag_passes() {
        let registry = registry_with(DefinitionKind::WorkflowStep, "apply-component", vec![]);
        let wf = WorkflowSpec {
            mode: WorkflowMode::Dag,
            steps: vec![step("a", vec![]), step("b", vec!["a"])],
        };
        let spec = ApplicationSpec {
            name: "app".into(),
            namespace: "default".into(),
            components: vec![],
            policies: vec![],
            workflow: Some(wf),
        };
        validate(&spec, &registry).unwrap();
    }

    #[test]
    fn cyclic_dag_is_rejected() {
        let registry = registry_with(DefinitionKind::WorkflowStep, "apply-component", vec![]);
        let wf = WorkflowSpec {
            mode: WorkflowMode::Dag,
            steps: vec![step("a", vec!["b"]), step("b", vec!["a"])],
        };
        let spec = ApplicationSpec {
            name: "app".into(),
            namespace: "default".into(),
            components: vec![],
            policies: vec![],
            workflow: Some(wf),
        };
        let err = validate(&spec, &registry).unwrap_err();
        assert!(matches!(err, ValidationError::DependencyCycle { .. }));
    }

    #[test]
    fn dependency_on_unknown_step_is_rejected() {
        let registry = registry_with(DefinitionKind::WorkflowStep, "apply-component", vec![]);
        let wf = WorkflowSpec {
            mode: WorkflowMode::StepByStep,
            steps: vec![step("a", vec!["ghost"])],
        };
        let spec = ApplicationSpec {
            name: "app".into(),
            namespace: "default".into(),
            components: vec![],
            policies: vec![],
            workflow: Some(wf),
        };
        let err = validate(&spec, &registry).unwrap_err();
        assert!(matches!(err, ValidationError::UnknownDependency { .. }));
    }

    #[test]
    fn trait_not_applicable_is_rejected() {
        let registry = registry_with(DefinitionKind::Component, "webservice", vec![]);
        registry.register(def(DefinitionKind::Trait, "ingress", vec!["worker"]));
        registry.register(def(DefinitionKind::WorkflowStep, "apply-component", vec![]));
        let mut c = component("web");
        c.traits.push(vela_core::model::TraitSpec {
            trait_type: "ingress".into(),
            properties: serde_json::json!({}),
        });
        let spec = ApplicationSpec {
            name: "app".into(),
            namespace: "default".into(),
            components: vec![c],
            policies: vec![],
            workflow: None,
        };
        let err = validate(&spec, &registry).unwrap_err();
        assert!(matches!(err, ValidationError::TraitNotApplicable { .. }));
    }

    #[test]
    fn conflicting_traits_are_rejected_before_any_dispatch() {
        let registry = registry_with(DefinitionKind::Component, "webservice", vec![]);
        registry.register(def(DefinitionKind::Trait, "a", vec![]));
        let mut b = def(DefinitionKind::Trait, "b", vec![]);
        b.conflicts_with = vec!["a".into()];
        registry.register(b);
        registry.register(def(DefinitionKind::WorkflowStep, "apply-component", vec![]));

        let mut c = component("web");
        c.traits.push(vela_core::model::TraitSpec {
            trait_type: "a".into(),
            properties: serde_json::json!({}),
        });
        c.traits.push(vela_core::model::TraitSpec {
            trait_type: "b".into(),
            properties: serde_json::json!({}),
        });
        let spec = ApplicationSpec {
            name: "app".into(),
            namespace: "default".into(),
            components: vec![c],
            policies: vec![],
            workflow: None,
        };
        let err = validate(&spec, &registry).unwrap_err();
        assert!(matches!(err, ValidationError::TraitsConflict { .. }));
    }
}
