//! Renderer: for each component, looks up its ComponentDefinition, invokes
//! the evaluator to produce the workload plus auxiliary objects, applies
//! traits in declaration order, and labels every resulting object.

mod label;
mod patch;

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use vela_core::definition::DefinitionKind;
use vela_core::error::RenderError;
use vela_core::model::ComponentSpec;
use vela_evaluator::{EvalContext, TemplateEvaluator};
use vela_registry::CapabilityRegistry;

pub use patch::{apply_patch, patch_strategy_of, PatchStrategy};

/// Render-time context shared by every component in one reconcile pass.
#[derive(Debug, Clone)]
pub struct RenderContext {
    pub app_name: String,
    pub app_revision: String,
    pub revision_hash: String,
    pub namespace: String,
    pub cluster: String,
}

/// The result of rendering one component: the primary workload object, the
/// logical list of applied traits (for status reporting), and every
/// auxiliary object produced by the component and its traits.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedComponent {
    pub workload: Value,
    pub applied_traits: Vec<String>,
    pub auxiliary: Vec<Value>,
}

pub struct Renderer {
    registry: Arc<CapabilityRegistry>,
    evaluator: Arc<dyn TemplateEvaluator>,
}

impl Renderer {
    pub fn new(registry: Arc<CapabilityRegistry>, evaluator: Arc<dyn TemplateEvaluator>) -> Self {
        Self { registry, evaluator }
    }

    /// Renders one component. Pure function of `(component, definitions
    /// pinned in the registry, context)`: the same inputs always produce
    /// byte-identical objects, which the content hash and dispatcher's
    /// dry-run/no-change comparisons both depend on.
    pub fn render(
        &self,
        component: &ComponentSpec,
        ctx: &RenderContext,
    ) -> Result<RenderedComponent, RenderError> {
        let comp_def = self
            .registry
            .lookup(DefinitionKind::Component, &component.component_type)
            .map_err(|_| RenderError::DefinitionNotFound {
                component: component.name.clone(),
                definition_type: component.component_type.clone(),
            })?;

        let eval_ctx = EvalContext {
            name: component.name.clone(),
            namespace: ctx.namespace.clone(),
            app_name: ctx.app_name.clone(),
            app_revision: ctx.app_revision.clone(),
            cluster: ctx.cluster.clone(),
            inputs: BTreeMap::new(),
        };

        let evaluated = self
            .evaluator
            .evaluate(&comp_def.schematic, &eval_ctx, &component.properties)
            .map_err(|e| RenderError::EvaluationFailed {
                component: component.name.clone(),
                reason: e.to_string(),
            })?;

        let mut workload = evaluated.output;
        let workload_kind = comp_def
            .workload_kind
            .clone()
            .or_else(|| workload.get("kind").and_then(Value::as_str).map(String::from))
            .unwrap_or_else(|| "Unknown".to_string());

        // outputs{…} is a BTreeMap, iterated lexicographically by key already.
        let mut auxiliary: Vec<Value> = evaluated
            .outputs
            .into_values()
            .map(|mut aux| {
                label::label_workload(&mut aux, &component.name, &workload_kind, ctx);
                aux
            })
            .collect();

        let mut applied_traits: Vec<String> = Vec::new();
        for t in &component.traits {
            let trait_def = self
                .registry
                .lookup(DefinitionKind::Trait, &t.trait_type)
                .map_err(|_| RenderError::DefinitionNotFound {
                    component: component.name.clone(),
                    definition_type: t.trait_type.clone(),
                })?;

            if !trait_def.applies_to(&workload_kind) {
                return Err(RenderError::TraitNotApplicable {
                    component: component.name.clone(),
                    trait_type: t.trait_type.clone(),
                    workload_kind: workload_kind.clone(),
                });
            }

            if let Some(conflicting) = applied_traits
                .iter()
                .find(|applied| trait_def.conflicts_with(applied))
            {
                return Err(RenderError::TraitsConflict {
                    component: component.name.clone(),
                    a: t.trait_type.clone(),
                    b: conflicting.clone(),
                });
            }

            let trait_eval = self
                .evaluator
                .evaluate(&trait_def.schematic, &eval_ctx, &t.properties)
                .map_err(|e| RenderError::EvaluationFailed {
                    component: component.name.clone(),
                    reason: e.to_string(),
                })?;

            if !is_empty_patch(&trait_eval.output) {
                let strategy = patch_strategy_of(&trait_def.schematic);
                workload = apply_patch(&workload, &trait_eval.output, &strategy);
            }

            for (resource_name, mut aux) in trait_eval.outputs {
                label::label_trait_object(&mut aux, &component.name, &t.trait_type, &resource_name, ctx);
                auxiliary.push(aux);
            }

            applied_traits.push(t.trait_type.clone());
        }

        label::label_workload(&mut workload, &component.name, &workload_kind, ctx);

        Ok(RenderedComponent {
            workload,
            applied_traits,
            auxiliary,
        })
    }
}

fn is_empty_patch(v: &Value) -> bool {
    v.is_null() || v == &Value::Object(Default::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use vela_core::definition::{Definition, DefinitionHealth, TraitStage};
    use vela_core::model::{ComponentSpec, TraitSpec};
    use vela_evaluator::MergeEvaluator;

    fn component_def(schematic: Value) -> Definition {
        Definition {
            kind: DefinitionKind::Component,
            name: "webservice".into(),
            revision_hash: "comp-h1".into(),
            revision_number: 1,
            workload_kind: Some("Deployment".into()),
            schematic,
            applies_to_workloads: vec![],
            conflicts_with: vec![],
            pod_disruptive: false,
            stage: TraitStage::Default,
            health: DefinitionHealth::Healthy,
        }
    }

    fn trait_def(name: &str, schematic: Value, conflicts_with: Vec<&str>) -> Definition {
        Definition {
            kind: DefinitionKind::Trait,
            name: name.into(),
            revision_hash: format!("{name}-h1"),
            revision_number: 1,
            workload_kind: None,
            schematic,
            applies_to_workloads: vec![],
            conflicts_with: conflicts_with.into_iter().map(String::from).collect(),
            pod_disruptive: false,
            stage: TraitStage::Default,
            health: DefinitionHealth::Healthy,
        }
    }

    fn ctx() -> RenderContext {
        RenderContext {
            app_name: "my-app".into(),
            app_revision: "my-app-v1".into(),
            revision_hash: "apprev-h1".into(),
            namespace: "default".into(),
            cluster: "local".into(),
        }
    }

    fn renderer_with(defs: Vec<Definition>) -> Renderer {
        let registry = Arc::new(CapabilityRegistry::new());
        for d in defs {
            registry.register(d);
        }
        Renderer::new(registry, Arc::new(MergeEvaluator::new()))
    }

    fn web_component(traits: Vec<TraitSpec>) -> ComponentSpec {
        ComponentSpec {
            name: "web".into(),
            component_type: "webservice".into(),
            properties: serde_json::json!({"spec": {"image": "nginx:1.0"}}),
            traits,
            depends_on: vec![],
            inputs: Default::default(),
            outputs: Default::default(),
        }
    }

    #[test]
    fn s1_first_apply_renders_workload_with_trait_patch_and_labels() {
        let comp = component_def(serde_json::json!({
            "output": {"kind": "Deployment", "spec": {"replicas": 1}}
        }));
        let scaler = trait_def(
            "scaler",
            serde_json::json!({"patchStrategy": "merge", "output": {"spec": {"replicas": 3}}}),
            vec![],
        );
        let renderer = renderer_with(vec![comp, scaler]);
        let component = web_component(vec![TraitSpec {
            trait_type: "scaler".into(),
            properties: serde_json::json!({}),
        }]);

        let rendered = renderer.render(&component, &ctx()).unwrap();
        assert_eq!(rendered.workload["spec"]["replicas"], 3);
        assert_eq!(
            rendered.workload["metadata"]["labels"][vela_core::labels::APP_NAME],
            "my-app"
        );
        assert_eq!(rendered.applied_traits, vec!["scaler".to_string()]);
    }

    #[test]
    fn rendering_is_deterministic() {
        let comp = component_def(serde_json::json!({"output": {"kind": "Deployment"}}));
        let renderer = renderer_with(vec![comp]);
        let component = web_component(vec![]);

        let a = renderer.render(&component, &ctx()).unwrap();
        let b = renderer.render(&component, &ctx()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn s6_conflicting_traits_are_rejected() {
        let comp = component_def(serde_json::json!({"output": {"kind": "Deployment"}}));
        let a = trait_def("a", serde_json::json!({"output": {}}), vec!["b"]);
        let b = trait_def("b", serde_json::json!({"output": {}}), vec!["a"]);
        let renderer = renderer_with(vec![comp, a, b]);
        let component = web_component(vec![
            TraitSpec {
                trait_type: "a".into(),
                properties: serde_json::json!({}),
            },
            TraitSpec {
                trait_type: "b".into(),
                properties: serde_json::json!({}),
            },
        ]);

        let err = renderer.render(&component, &ctx()).unwrap_err();
        assert!(matches!(err, RenderError::TraitsConflict { .. }));
    }

    #[test]
    fn trait_not_applicable_to_workload_kind_is_rejected() {
        let comp = component_def(serde_json::json!({"output": {"kind": "Deployment"}}));
        let mut restricted = trait_def("ingress", serde_json::json!({"output": {}}), vec![]);
        restricted.applies_to_workloads = vec!["StatefulSet".into()];
        let renderer = renderer_with(vec![comp, restricted]);
        let component = web_component(vec![TraitSpec {
            trait_type: "ingress".into(),
            properties: serde_json::json!({}),
        }]);

        let err = renderer.render(&component, &ctx()).unwrap_err();
        assert!(matches!(err, RenderError::TraitNotApplicable { .. }));
    }

    #[test]
    fn missing_definition_is_a_render_error() {
        let renderer = renderer_with(vec![]);
        let component = web_component(vec![]);
        let err = renderer.render(&component, &ctx()).unwrap_err();
        assert!(matches!(err, RenderError::DefinitionNotFound { .. }));
    }
}
