//! Template evaluator contract.
//!
//! Per the reconciliation engine's design notes, the template language is
//! external and the core must not depend on its internals: any type that
//! satisfies [`TemplateEvaluator`] is admissible. This crate defines the
//! contract and ships [`MergeEvaluator`], a minimal reference implementation
//! (structural overlay of `parameter` onto a static `schematic`) adequate for
//! the renderer's own tests and for deployments that don't need a full
//! template language.

mod merge;

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use merge::MergeEvaluator;

/// Evaluation-time context passed to the template: application name,
/// component name, revision, target cluster, and any values forwarded
/// through a component's declared `inputs`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EvalContext {
    pub name: String,
    pub namespace: String,
    pub app_name: String,
    pub app_revision: String,
    pub cluster: String,
    #[serde(default)]
    pub inputs: BTreeMap<String, serde_json::Value>,
}

/// The result of evaluating one template: the primary workload/patch object,
/// zero-or-more auxiliary objects keyed by name, and an optional health
/// check template the renderer/workflow engine can later evaluate against
/// live cluster state.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct EvaluationResult {
    pub output: serde_json::Value,
    #[serde(default)]
    pub outputs: BTreeMap<String, serde_json::Value>,
    #[serde(default)]
    pub health: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvaluatorError {
    #[error("template body is not a valid object: {reason}")]
    MalformedBody { reason: String },

    #[error("evaluation failed: {reason}")]
    EvaluationFailed { reason: String },

    #[error("schematic failed validation: {reason}")]
    ValidationFailed { reason: String },
}

/// Given a template body, a context, and a parameter map, yields one `output`
/// object and zero-or-more `outputs[name]` auxiliary objects. Implementations
/// must be side-effect-free and deterministic: the same three inputs always
/// produce the same result.
pub trait TemplateEvaluator: Send + Sync {
    fn evaluate(
        &self,
        body: &serde_json::Value,
        context: &EvalContext,
        parameter: &serde_json::Value,
    ) -> Result<EvaluationResult, EvaluatorError>;

    /// Returns the parameter schema declared by the template, for the
    /// registry to validate incoming `properties` against before render time.
    fn validate(&self, body: &serde_json::Value) -> Result<serde_json::Value, EvaluatorError>;
}
