//! Trait patch strategies: `replace`, `merge`, `patchKey=<field>`, `retainKeys`.

use serde_json::Value;
use vela_core::merge::deep_merge;

#[derive(Debug, Clone, PartialEq)]
pub enum PatchStrategy {
    /// Per-field key: fields present in the patch replace the corresponding
    /// workload field wholesale (no recursive merge into nested objects).
    Replace,
    /// Recursive merge: object keys merge, everything else is overwritten by
    /// the patch value.
    Merge,
    /// List-keyed merge: for array fields present in both workload and
    /// patch, items are matched by `field` and merged; unmatched patch items
    /// are appended.
    PatchKey(String),
    /// Like `merge`, but made explicit that fields absent from the patch are
    /// always retained (this is `merge`'s behavior already; the distinct
    /// variant exists so the declared strategy round-trips through
    /// `Display`/`FromStr` unchanged).
    RetainKeys,
}

impl PatchStrategy {
    pub fn parse(s: &str) -> Self {
        if let Some(field) = s.strip_prefix("patchKey=") {
            return PatchStrategy::PatchKey(field.to_string());
        }
        match s {
            "replace" => PatchStrategy::Replace,
            "retainKeys" => PatchStrategy::RetainKeys,
            _ => PatchStrategy::Merge,
        }
    }
}

impl Default for PatchStrategy {
    fn default() -> Self {
        PatchStrategy::Merge
    }
}

/// Reads the trait's declared patch strategy from its schematic's top-level
/// `patchStrategy` string field, defaulting to `merge`.
pub fn patch_strategy_of(schematic: &Value) -> PatchStrategy {
    schematic
        .get("patchStrategy")
        .and_then(Value::as_str)
        .map(PatchStrategy::parse)
        .unwrap_or_default()
}

pub fn apply_patch(workload: &Value, patch: &Value, strategy: &PatchStrategy) -> Value {
    match strategy {
        PatchStrategy::Replace => shallow_replace(workload, patch),
        PatchStrategy::Merge | PatchStrategy::RetainKeys => deep_merge(workload.clone(), patch.clone()),
        PatchStrategy::PatchKey(field) => patch_key_merge(workload, patch, field),
    }
}

fn shallow_replace(base: &Value, patch: &Value) -> Value {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            let mut merged = base_map.clone();
            for (k, v) in patch_map {
                merged.insert(k.clone(), v.clone());
            }
            Value::Object(merged)
        }
        (_, patch) => patch.clone(),
    }
}

fn patch_key_merge(base: &Value, patch: &Value, field: &str) -> Value {
    match (base, patch) {
        (Value::Object(base_map), Value::Object(patch_map)) => {
            let mut merged = base_map.clone();
            for (k, patch_value) in patch_map {
                let next = match (merged.get(k), patch_value) {
                    (Some(Value::Array(base_items)), Value::Array(patch_items)) => {
                        Value::Array(merge_array_by_key(base_items, patch_items, field))
                    }
                    (Some(existing), _) => patch_key_merge(existing, patch_value, field),
                    (None, v) => v.clone(),
                };
                merged.insert(k.clone(), next);
            }
            Value::Object(merged)
        }
        (_, patch) => patch.clone(),
    }
}

fn merge_array_by_key(base: &[Value], patch: &[Value], field: &str) -> Vec<Value> {
    let mut result = base.to_vec();
    for patch_item in patch {
        let key = patch_item.get(field);
        let existing_index = key.and_then(|k| {
            result
                .iter()
                .position(|item| item.get(field) == Some(k))
        });
        match existing_index {
            Some(idx) => {
                result[idx] = patch_key_merge(&result[idx], patch_item, field);
            }
            None => result.push(patch_item.clone()),
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn replace_overwrites_top_level_field_wholesale() {
        let base = json!({"spec": {"replicas": 1, "image": "nginx:1.0"}});
        let patch = json!({"spec": {"replicas": 3}});
        let merged = apply_patch(&base, &patch, &PatchStrategy::Replace);
        assert_eq!(merged["spec"], json!({"replicas": 3}));
    }

    #[test]
    fn merge_recurses_into_nested_objects() {
        let base = json!({"spec": {"replicas": 1, "image": "nginx:1.0"}});
        let patch = json!({"spec": {"replicas": 3}});
        let merged = apply_patch(&base, &patch, &PatchStrategy::Merge);
        assert_eq!(merged["spec"]["replicas"], 3);
        assert_eq!(merged["spec"]["image"], "nginx:1.0");
    }

    #[test]
    fn patch_key_merges_array_items_by_field() {
        let base = json!({"spec": {"containers": [{"name": "web", "image": "nginx:1.0"}]}});
        let patch = json!({"spec": {"containers": [{"name": "web", "image": "nginx:1.1"}, {"name": "sidecar", "image": "envoy:1.0"}]}});
        let merged = apply_patch(&base, &patch, &PatchStrategy::PatchKey("name".to_string()));
        let containers = merged["spec"]["containers"].as_array().unwrap();
        assert_eq!(containers.len(), 2);
        assert_eq!(containers[0]["image"], "nginx:1.1");
        assert_eq!(containers[1]["name"], "sidecar");
    }

    #[test]
    fn parse_recognizes_patch_key_prefix() {
        assert_eq!(
            PatchStrategy::parse("patchKey=metadata.name"),
            PatchStrategy::PatchKey("metadata.name".to_string())
        );
        assert_eq!(PatchStrategy::parse("replace"), PatchStrategy::Replace);
        assert_eq!(PatchStrategy::parse("retainKeys"), PatchStrategy::RetainKeys);
        assert_eq!(PatchStrategy::parse("merge"), PatchStrategy::Merge);
    }
}
