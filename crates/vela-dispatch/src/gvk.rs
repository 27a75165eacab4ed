//! GroupVersionKind plus namespace/name, extracted from a rendered object.

use serde_json::Value;
use vela_core::error::DispatchError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Gvk {
    pub api_version: String,
    pub kind: String,
}

/// The identity fields the dispatcher needs to Get/Create/Patch an object:
/// its GVK plus namespace/name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ObjectRef {
    pub gvk: Gvk,
    pub namespace: String,
    pub name: String,
}

impl ObjectRef {
    pub fn from_object(object: &Value) -> Result<Self, DispatchError> {
        let api_version = object
            .get("apiVersion")
            .and_then(Value::as_str)
            .ok_or_else(|| DispatchError::MalformedObject {
                reason: "missing apiVersion".to_string(),
            })?
            .to_string();
        let kind = object
            .get("kind")
            .and_then(Value::as_str)
            .ok_or_else(|| DispatchError::MalformedObject {
                reason: "missing kind".to_string(),
            })?
            .to_string();
        let namespace = object
            .get("metadata")
            .and_then(|m| m.get("namespace"))
            .and_then(Value::as_str)
            .ok_or_else(|| DispatchError::MalformedObject {
                reason: "missing metadata.namespace".to_string(),
            })?
            .to_string();
        let name = object
            .get("metadata")
            .and_then(|m| m.get("name"))
            .and_then(Value::as_str)
            .ok_or_else(|| DispatchError::MalformedObject {
                reason: "missing metadata.name".to_string(),
            })?
            .to_string();

        Ok(ObjectRef {
            gvk: Gvk { api_version, kind },
            namespace,
            name,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_gvk_namespace_and_name() {
        let obj = json!({
            "apiVersion": "apps/v1",
            "kind": "Deployment",
            "metadata": {"namespace": "default", "name": "web"}
        });
        let r = ObjectRef::from_object(&obj).unwrap();
        assert_eq!(r.gvk.kind, "Deployment");
        assert_eq!(r.namespace, "default");
        assert_eq!(r.name, "web");
    }

    #[test]
    fn missing_name_is_malformed() {
        let obj = json!({"apiVersion": "v1", "kind": "Service", "metadata": {"namespace": "default"}});
        let err = ObjectRef::from_object(&obj).unwrap_err();
        assert!(matches!(err, DispatchError::MalformedObject { .. }));
    }
}
