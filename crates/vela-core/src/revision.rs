//! ApplicationRevision: the immutable, content-hashed snapshot of an Application
//! plus the exact definitions used to render it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::definition::Definition;
use crate::model::ApplicationSpec;

/// How a revision's large payload fields are stored on disk.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Compression {
    #[default]
    None,
    Gzip,
    Zstd,
}

impl std::fmt::Display for Compression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Compression::None => "none",
            Compression::Gzip => "gzip",
            Compression::Zstd => "zstd",
        };
        write!(f, "{s}")
    }
}

/// Immutable snapshot bound to a single Application at one point in time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ApplicationRevision {
    pub application_name: String,
    pub namespace: String,
    /// Content hash over `{application spec, definitions referenced, compression type}`.
    pub revision_hash: String,
    /// Monotonically increasing per application.
    pub revision_number: u64,
    pub spec: ApplicationSpec,
    pub component_definitions: Vec<Definition>,
    pub trait_definitions: Vec<Definition>,
    pub policy_definitions: Vec<Definition>,
    pub workflow_step_definitions: Vec<Definition>,
    pub compression: Compression,
    pub created_at: DateTime<Utc>,
}

impl ApplicationRevision {
    /// The name under which this revision is persisted, e.g. `my-app-v3`.
    pub fn revision_name(&self) -> String {
        format!("{}-v{}", self.application_name, self.revision_number)
    }

    pub fn all_definitions(&self) -> impl Iterator<Item = &Definition> {
        self.component_definitions
            .iter()
            .chain(self.trait_definitions.iter())
            .chain(self.policy_definitions.iter())
            .chain(self.workflow_step_definitions.iter())
    }
}
