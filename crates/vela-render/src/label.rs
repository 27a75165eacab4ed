//! Applies the stable label contract (§6) to a rendered object.

use serde_json::{Map, Value};
use vela_core::labels;

use crate::RenderContext;

/// Ensures `obj.metadata.labels` exists and returns a mutable handle to it,
/// coercing non-object intermediate values to empty objects defensively
/// (renderer output is always expected to already be an object at this
/// point; this keeps labeling from panicking on a malformed template).
fn labels_mut(obj: &mut Value) -> &mut Map<String, Value> {
    if !obj.is_object() {
        *obj = Value::Object(Map::new());
    }
    let map = obj.as_object_mut().expect("just coerced to object");
    let metadata = map.entry("metadata").or_insert_with(|| Value::Object(Map::new()));
    if !metadata.is_object() {
        *metadata = Value::Object(Map::new());
    }
    let metadata_map = metadata.as_object_mut().expect("just coerced to object");
    let labels = metadata_map
        .entry("labels")
        .or_insert_with(|| Value::Object(Map::new()));
    if !labels.is_object() {
        *labels = Value::Object(Map::new());
    }
    labels.as_object_mut().expect("just coerced to object")
}

/// Labels a workload object with application, component, revision, and
/// workload-type identity.
pub fn label_workload(obj: &mut Value, component_name: &str, workload_type: &str, ctx: &RenderContext) {
    let labels = labels_mut(obj);
    labels.insert(labels::APP_NAME.to_string(), Value::String(ctx.app_name.clone()));
    labels.insert(
        labels::APP_COMPONENT.to_string(),
        Value::String(component_name.to_string()),
    );
    labels.insert(
        labels::APP_REVISION.to_string(),
        Value::String(ctx.app_revision.clone()),
    );
    labels.insert(
        labels::APP_REVISION_HASH.to_string(),
        Value::String(ctx.revision_hash.clone()),
    );
    labels.insert(
        labels::WORKLOAD_TYPE.to_string(),
        Value::String(workload_type.to_string()),
    );
}

/// Labels a trait-generated object, additionally marking the originating
/// trait type and the logical resource name it was declared under in the
/// trait's `outputs{…}` map.
pub fn label_trait_object(
    obj: &mut Value,
    component_name: &str,
    trait_type: &str,
    resource_name: &str,
    ctx: &RenderContext,
) {
    let labels = labels_mut(obj);
    labels.insert(labels::APP_NAME.to_string(), Value::String(ctx.app_name.clone()));
    labels.insert(
        labels::APP_COMPONENT.to_string(),
        Value::String(component_name.to_string()),
    );
    labels.insert(
        labels::APP_REVISION.to_string(),
        Value::String(ctx.app_revision.clone()),
    );
    labels.insert(
        labels::APP_REVISION_HASH.to_string(),
        Value::String(ctx.revision_hash.clone()),
    );
    labels.insert(
        labels::TRAIT_TYPE.to_string(),
        Value::String(trait_type.to_string()),
    );
    labels.insert(
        labels::TRAIT_RESOURCE.to_string(),
        Value::String(resource_name.to_string()),
    );
}
