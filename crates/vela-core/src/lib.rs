//! Shared data model for the application reconciliation engine.
//!
//! Every other `vela-*` crate depends on this one for the Application/Component/
//! Trait/Policy/WorkflowStep specs, the four Definition kinds, ApplicationRevision,
//! ResourceTracker entries, canonical-JSON content hashing, the top-level error
//! enum, and process-wide configuration.

pub mod config;
pub mod definition;
pub mod error;
pub mod hash;
pub mod labels;
pub mod merge;
pub mod model;
pub mod revision;
pub mod tracker;

pub mod prelude {
    pub use crate::config::ProcessConfig;
    pub use crate::definition::{Definition, DefinitionHealth, DefinitionKind, TraitStage};
    pub use crate::error::{
        DispatchError, Outcome, ReconcileError, RenderError, SchemaError, TrackerError,
        ValidationError,
    };
    pub use crate::hash::content_hash;
    pub use crate::model::{
        ApplicationSpec, ComponentSpec, PolicySpec, TraitSpec, WorkflowMode, WorkflowSpec,
        WorkflowStepSpec,
    };
    pub use crate::revision::{ApplicationRevision, Compression};
    pub use crate::tracker::{DeletionPolicy, ResourceTracker, ResourceTrackerEntry};
}
