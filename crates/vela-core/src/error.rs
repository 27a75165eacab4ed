//! Top-level error kinds and the retry/fail-permanently result type.

use thiserror::Error;

/// Definition not found, template evaluation failed, trait not applicable, or
/// conflicting traits. Never retried within the current reconcile pass.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RenderError {
    #[error("component {component:?}: definition {definition_type:?} not found")]
    DefinitionNotFound {
        component: String,
        definition_type: String,
    },

    #[error("component {component:?}: template evaluation failed: {reason}")]
    EvaluationFailed { component: String, reason: String },

    #[error("component {component:?}: trait {trait_type:?} does not apply to workload kind {workload_kind:?}")]
    TraitNotApplicable {
        component: String,
        trait_type: String,
        workload_kind: String,
    },

    #[error("component {component:?}: traits {a:?} and {b:?} conflict")]
    TraitsConflict {
        component: String,
        a: String,
        b: String,
    },
}

/// Cluster unreachable, conflict, forbidden, or dry-run rejected. Retried with
/// backoff; after enough attempts the owning step is marked Failed.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DispatchError {
    #[error("cluster {cluster:?} unreachable: {reason}")]
    ClusterUnreachable { cluster: String, reason: String },

    #[error("cluster {cluster:?}: conflict applying {kind}/{name} in {namespace}")]
    Conflict {
        cluster: String,
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("cluster {cluster:?}: forbidden to apply {kind}/{name} in {namespace}")]
    Forbidden {
        cluster: String,
        kind: String,
        namespace: String,
        name: String,
    },

    #[error("cluster {cluster:?}: dry-run rejected {kind}/{name}: {reason}")]
    DryRunRejected {
        cluster: String,
        kind: String,
        name: String,
        reason: String,
    },

    #[error("cluster {cluster:?} circuit breaker open")]
    CircuitOpen { cluster: String },

    #[error("rendered object is not dispatchable: {reason}")]
    MalformedObject { reason: String },
}

/// Malformed Application: duplicate names, workflow cycles, unknown type
/// references. The Application goes `Unhealthy`; no workflow runs.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ValidationError {
    #[error("duplicate {list} name {name:?}")]
    DuplicateName { list: &'static str, name: String },

    #[error("workflow step {from:?} -> {to:?} would create a cycle")]
    WorkflowCycle { from: String, to: String },

    #[error("{kind} reference {name:?} (used by {used_by:?}) does not resolve to an installed definition")]
    UnknownTypeReference {
        kind: &'static str,
        name: String,
        used_by: String,
    },

    #[error("trait {a:?} and {b:?} on component {component:?} declare mutual conflictsWith")]
    ConflictingTraits {
        component: String,
        a: String,
        b: String,
    },
}

/// ResourceTracker read/write or compression round-trip failure. Fatal to the
/// current reconcile; the Application is requeued.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum TrackerError {
    #[error("failed to read tracker for {application:?}: {reason}")]
    ReadFailed { application: String, reason: String },

    #[error("failed to write tracker for {application:?}: {reason}")]
    WriteFailed { application: String, reason: String },

    #[error("compression round-trip failed for {application:?}: {reason}")]
    CompressionRoundTrip { application: String, reason: String },
}

/// Pre-start canary failed. Fatal to the process.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum SchemaError {
    #[error("canary revision failed to round-trip under compression {compression:?}: {reason}")]
    CanaryRoundTripFailed {
        compression: String,
        reason: String,
    },
}

/// The union of every error kind a reconcile pass can surface.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ReconcileError {
    #[error(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Tracker(#[from] TrackerError),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// A result classified for requeue purposes: transient errors are retried by
/// the reconciler's backoff, permanent ones stop retrying and surface
/// directly in the Application's status.
///
/// Kept distinct from `Result` so "retry this" is a type-level decision
/// rather than a convention callers have to remember.
#[derive(Debug, Clone)]
pub enum Outcome<T, E = ReconcileError> {
    Ok(T),
    Transient(E),
    Permanent(E),
}

impl<T, E> Outcome<T, E> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Outcome::Transient(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            Outcome::Ok(v) => Some(v),
            _ => None,
        }
    }
}
