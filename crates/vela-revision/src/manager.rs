//! Computes whether a new ApplicationRevision is needed and builds it.

use chrono::Utc;
use tracing::instrument;

use vela_core::definition::Definition;
use vela_core::error::TrackerError;
use vela_core::hash::content_hash;
use vela_core::model::ApplicationSpec;
use vela_core::revision::{ApplicationRevision, Compression};

/// Everything that goes into an ApplicationRevision's content hash, besides
/// the spec itself.
pub struct PinnedDefinitions {
    pub components: Vec<Definition>,
    pub traits: Vec<Definition>,
    pub policies: Vec<Definition>,
    pub workflow_steps: Vec<Definition>,
}

/// Decides whether `spec` + `definitions` differ from `current` and, if so,
/// builds the next `ApplicationRevision`. Returns `None` when nothing
/// changed (the content hash is identical).
#[instrument(skip(spec, definitions, current))]
pub fn reconcile_revision(
    current: Option<&ApplicationRevision>,
    spec: &ApplicationSpec,
    definitions: PinnedDefinitions,
    compression: Compression,
) -> Result<Option<ApplicationRevision>, TrackerError> {
    let hash = compute_hash(spec, &definitions, compression)?;

    if let Some(current) = current {
        if current.revision_hash == hash {
            return Ok(None);
        }
    }

    let revision_number = current.map(|r| r.revision_number + 1).unwrap_or(1);

    Ok(Some(ApplicationRevision {
        application_name: spec.name.clone(),
        namespace: spec.namespace.clone(),
        revision_hash: hash,
        revision_number,
        spec: spec.clone(),
        component_definitions: definitions.components,
        trait_definitions: definitions.traits,
        policy_definitions: definitions.policies,
        workflow_step_definitions: definitions.workflow_steps,
        compression,
        created_at: Utc::now(),
    }))
}

fn compute_hash(
    spec: &ApplicationSpec,
    definitions: &PinnedDefinitions,
    compression: Compression,
) -> Result<String, TrackerError> {
    let payload = serde_json::json!({
        "spec": spec,
        "components": definitions.components,
        "traits": definitions.traits,
        "policies": definitions.policies,
        "workflowSteps": definitions.workflow_steps,
        "compression": compression,
    });
    content_hash(&payload).map_err(|e| TrackerError::CompressionRoundTrip {
        application: spec.name.clone(),
        reason: format!("failed to hash revision content: {e}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> ApplicationSpec {
        ApplicationSpec {
            name: name.to_string(),
            namespace: "default".into(),
            components: vec![],
            policies: vec![],
            workflow: None,
        }
    }

    fn defs() -> PinnedDefinitions {
        PinnedDefinitions {
            components: vec![],
            traits: vec![],
            policies: vec![],
            workflow_steps: vec![],
        }
    }

    #[test]
    fn first_reconcile_produces_revision_one() {
        let rev = reconcile_revision(None, &spec("web"), defs(), Compression::None)
            .unwrap()
            .unwrap();
        assert_eq!(rev.revision_number, 1);
    }

    #[test]
    fn unchanged_spec_produces_no_revision() {
        let rev1 = reconcile_revision(None, &spec("web"), defs(), Compression::None)
            .unwrap()
            .unwrap();
        let rev2 = reconcile_revision(Some(&rev1), &spec("web"), defs(), Compression::None).unwrap();
        assert!(rev2.is_none());
    }

    #[test]
    fn changed_spec_increments_revision_number() {
        let rev1 = reconcile_revision(None, &spec("web"), defs(), Compression::None)
            .unwrap()
            .unwrap();

        let mut changed = spec("web");
        changed.namespace = "other".into();
        let rev2 = reconcile_revision(Some(&rev1), &changed, defs(), Compression::None)
            .unwrap()
            .unwrap();
        assert_eq!(rev2.revision_number, 2);
        assert_ne!(rev2.revision_hash, rev1.revision_hash);
    }
}
