use std::collections::BTreeMap;

use serde_json::Value;

use crate::{EvalContext, EvaluationResult, EvaluatorError, TemplateEvaluator};

/// A minimal reference evaluator: `schematic` is a JSON object with an
/// `output` skeleton, an optional `outputs` map, an optional `health`
/// template, and an optional `schema`. `parameter` is deep-merged onto
/// `output` (parameter wins on conflicting scalar/array keys; objects merge
/// recursively). String leaves of the form `"${context.field}"` are
/// substituted with the matching field of [`EvalContext`] before merging.
#[derive(Debug, Default)]
pub struct MergeEvaluator;

impl MergeEvaluator {
    pub fn new() -> Self {
        Self
    }
}

impl TemplateEvaluator for MergeEvaluator {
    fn evaluate(
        &self,
        body: &Value,
        context: &EvalContext,
        parameter: &Value,
    ) -> Result<EvaluationResult, EvaluatorError> {
        let body = body.as_object().ok_or_else(|| EvaluatorError::MalformedBody {
            reason: "schematic must be a JSON object".to_string(),
        })?;

        let base_output = body.get("output").cloned().unwrap_or(Value::Object(Default::default()));
        let substituted = substitute_context(base_output, context);
        let output = deep_merge(substituted, parameter.clone());

        let mut outputs = BTreeMap::new();
        if let Some(raw_outputs) = body.get("outputs").and_then(Value::as_object) {
            for (name, tmpl) in raw_outputs {
                outputs.insert(name.clone(), substitute_context(tmpl.clone(), context));
            }
        }

        let health = body.get("health").cloned().map(|h| substitute_context(h, context));

        Ok(EvaluationResult {
            output,
            outputs,
            health,
        })
    }

    fn validate(&self, body: &Value) -> Result<Value, EvaluatorError> {
        let body = body.as_object().ok_or_else(|| EvaluatorError::MalformedBody {
            reason: "schematic must be a JSON object".to_string(),
        })?;
        Ok(body.get("schema").cloned().unwrap_or(Value::Object(Default::default())))
    }
}

/// Recursively replaces string leaves matching `${context.<field>}` with the
/// corresponding field of `context`. Unknown fields are left untouched.
fn substitute_context(value: Value, context: &EvalContext) -> Value {
    match value {
        Value::String(s) => Value::String(resolve_placeholder(&s, context).unwrap_or(s)),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .map(|v| substitute_context(v, context))
                .collect(),
        ),
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (k, substitute_context(v, context)))
                .collect(),
        ),
        other => other,
    }
}

fn resolve_placeholder(s: &str, context: &EvalContext) -> Option<String> {
    let inner = s.strip_prefix("${context.")?.strip_suffix('}')?;
    match inner {
        "name" => Some(context.name.clone()),
        "namespace" => Some(context.namespace.clone()),
        "appName" => Some(context.app_name.clone()),
        "appRevision" => Some(context.app_revision.clone()),
        "cluster" => Some(context.cluster.clone()),
        _ => None,
    }
}

/// Deep-merges `overlay` onto `base`: matching object keys merge recursively,
/// anything else (scalars, arrays, type mismatches) is replaced wholesale by
/// `overlay`.
fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut base_map), Value::Object(overlay_map)) => {
            for (k, v) in overlay_map {
                let merged = match base_map.remove(&k) {
                    Some(existing) => deep_merge(existing, v),
                    None => v,
                };
                base_map.insert(k, merged);
            }
            Value::Object(base_map)
        }
        (_, overlay) => overlay,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx() -> EvalContext {
        EvalContext {
            name: "web".into(),
            namespace: "default".into(),
            app_name: "my-app".into(),
            app_revision: "my-app-v1".into(),
            cluster: "local".into(),
            inputs: BTreeMap::new(),
        }
    }

    #[test]
    fn parameter_overlays_output_skeleton() {
        let body = json!({
            "output": {"kind": "Deployment", "spec": {"replicas": 1}}
        });
        let result = MergeEvaluator::new()
            .evaluate(&body, &ctx(), &json!({"spec": {"replicas": 3}}))
            .unwrap();
        assert_eq!(result.output["spec"]["replicas"], 3);
        assert_eq!(result.output["kind"], "Deployment");
    }

    #[test]
    fn context_placeholders_are_substituted() {
        let body = json!({
            "output": {"metadata": {"name": "${context.name}", "namespace": "${context.namespace}"}}
        });
        let result = MergeEvaluator::new().evaluate(&body, &ctx(), &json!({})).unwrap();
        assert_eq!(result.output["metadata"]["name"], "web");
        assert_eq!(result.output["metadata"]["namespace"], "default");
    }

    #[test]
    fn outputs_and_health_are_carried_through() {
        let body = json!({
            "output": {},
            "outputs": {"svc": {"kind": "Service"}},
            "health": {"expression": "status.readyReplicas == spec.replicas"}
        });
        let result = MergeEvaluator::new().evaluate(&body, &ctx(), &json!({})).unwrap();
        assert_eq!(result.outputs["svc"]["kind"], "Service");
        assert!(result.health.is_some());
    }

    #[test]
    fn non_object_schematic_is_rejected() {
        let err = MergeEvaluator::new()
            .evaluate(&json!("not an object"), &ctx(), &json!({}))
            .unwrap_err();
        assert!(matches!(err, EvaluatorError::MalformedBody { .. }));
    }

    #[test]
    fn evaluation_is_deterministic() {
        let body = json!({"output": {"a": 1}});
        let a = MergeEvaluator::new().evaluate(&body, &ctx(), &json!({})).unwrap();
        let b = MergeEvaluator::new().evaluate(&body, &ctx(), &json!({})).unwrap();
        assert_eq!(a, b);
    }
}
