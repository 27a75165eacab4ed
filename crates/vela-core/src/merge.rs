//! A small structural JSON merge shared by the renderer (trait patching) and
//! the dispatcher (three-way upsert merge), so both crates merge owned
//! fields the same way without depending on each other.

use serde_json::Value;

/// Recursively merges `overlay` onto `base`: matching object keys merge
/// recursively, anything else (scalars, arrays, type mismatches) is replaced
/// wholesale by `overlay`.
pub fn deep_merge(base: Value, overlay: Value) -> Value {
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

    #[test]
    fn merges_nested_objects_and_overwrites_scalars() {
        let base = json!({"a": 1, "nested": {"x": 1, "y": 2}});
        let overlay = json!({"a": 2, "nested": {"y": 3}});
        let merged = deep_merge(base, overlay);
        assert_eq!(merged, json!({"a": 2, "nested": {"x": 1, "y": 3}}));
    }
}
