//! Resolves every Component/Trait/Policy/WorkflowStep definition an
//! Application references into the [`PinnedDefinitions`] the revision
//! manager hashes against.

use vela_core::definition::{Definition, DefinitionKind};
use vela_core::model::ApplicationSpec;
use vela_registry::{CapabilityRegistry, RegistryError};
use vela_revision::PinnedDefinitions;

pub fn pin(registry: &CapabilityRegistry, spec: &ApplicationSpec) -> Result<PinnedDefinitions, RegistryError> {
    let mut components = Vec::new();
    let mut traits = Vec::new();

    for component in &spec.components {
        components.push(lookup(registry, DefinitionKind::Component, &component.component_type)?);
        for t in &component.traits {
            traits.push(lookup(registry, DefinitionKind::Trait, &t.trait_type)?);
        }
    }

    let mut policies = Vec::new();
    for policy in &spec.policies {
        policies.push(lookup(registry, DefinitionKind::Policy, &policy.policy_type)?);
    }

    let mut workflow_steps = Vec::new();
    for step in &spec.effective_workflow().steps {
        workflow_steps.push(lookup(registry, DefinitionKind::WorkflowStep, &step.step_type)?);
    }

    Ok(PinnedDefinitions {
        components,
        traits,
        policies,
        workflow_steps,
    })
}

fn lookup(registry: &CapabilityRegistry, kind: DefinitionKind, name: &str) -> Result<Definition, RegistryError> {
    registry.lookup(kind, name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use vela_core::definition::{DefinitionHealth, TraitStage};
    use vela_core::model::{ComponentSpec, TraitSpec};

    fn def(kind: DefinitionKind, name: &str) -> Definition {
        Definition {
            kind,
            name: name.to_string(),
            revision_hash: "h1".into(),
            revision_number: 1,
            workload_kind: Some("Deployment".into()),
            schematic: serde_json::json!({"output": {}}),
            applies_to_workloads: vec![],
            conflicts_with: vec![],
            pod_disruptive: false,
            stage: TraitStage::Default,
            health: DefinitionHealth::Healthy,
        }
    }

    fn spec() -> ApplicationSpec {
        ApplicationSpec {
            name: "web".into(),
            namespace: "default".into(),
            components: vec![ComponentSpec {
                name: "web".into(),
                component_type: "webservice".into(),
                properties: serde_json::json!({}),
                traits: vec![TraitSpec {
                    trait_type: "scaler".into(),
                    properties: serde_json::json!({}),
                }],
                depends_on: vec![],
                inputs: BTreeMap::new(),
                outputs: BTreeMap::new(),
            }],
            policies: vec![],
            workflow: None,
        }
    }

    #[test]
    fn pins_every_referenced_definition() {
        let registry = CapabilityRegistry::new();
        registry.register(def(DefinitionKind::Component, "webservice"));
        registry.register(def(DefinitionKind::Trait, "scaler"));
        registry.register(def(DefinitionKind::WorkflowStep, "apply-component"));

        let pinned = pin(&registry, &spec()).unwrap();
        assert_eq!(pinned.components.len(), 1);
        assert_eq!(pinned.traits.len(), 1);
        assert_eq!(pinned.workflow_steps.len(), 1);
    }

    #[test]
    fn missing_definition_surfaces_not_found() {
        let registry = CapabilityRegistry::new();
        let err = pin(&registry, &spec()).unwrap_err();
        assert!(matches!(err, RegistryError::NotFound { .. }));
    }
}
