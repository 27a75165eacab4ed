//! Capability Registry: in-memory cache of installed Component/Trait/Policy/
//! WorkflowStep definitions, keyed by `(kind, name)` with every retained
//! revision kept underneath.

use std::collections::HashSet;

use dashmap::DashMap;
use parking_lot::RwLock;
use thiserror::Error;
use tracing::{instrument, warn};

use vela_core::definition::{Definition, DefinitionHealth, DefinitionKind, DefinitionRevisionRef};

#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    #[error("{kind} definition {name:?} not found")]
    NotFound { kind: DefinitionKind, name: String },

    #[error("{kind} definition {name:?} revision {revision_hash:?} not found")]
    RevisionNotFound {
        kind: DefinitionKind,
        name: String,
        revision_hash: String,
    },
}

type Key = (DefinitionKind, String);

/// Default per-definition retention limit (§4.1).
pub const DEFAULT_RETENTION_LIMIT: usize = 20;

/// Holds every retained revision of every installed definition, ordered
/// oldest-first by `revision_number` within each `(kind, name)` bucket.
#[derive(Default)]
pub struct CapabilityRegistry {
    revisions: DashMap<Key, RwLock<Vec<Definition>>>,
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a definition revision. A no-op if the latest retained
    /// revision already has the same `revision_hash` (pure label/annotation
    /// edits must not produce a new revision). Revisions are immutable once
    /// registered: re-registering an existing `(name, revision_hash)` pair
    /// with different content is rejected by the caller, not by this method
    /// — the registry trusts that the hash was computed over the content.
    #[instrument(skip(self, definition), fields(kind = %definition.kind, name = %definition.name))]
    pub fn register(&self, definition: Definition) {
        let key = (definition.kind, definition.name.clone());
        let entry = self.revisions.entry(key).or_default();
        let mut revisions = entry.write();
        if let Some(latest) = revisions.last() {
            if latest.revision_hash == definition.revision_hash {
                return;
            }
        }
        revisions.push(definition);
    }

    /// Marks the given revision `Unhealthy` without removing it. A failed
    /// definition stays present so `Lookup` can still surface a precise
    /// user-facing reason.
    #[instrument(skip(self))]
    pub fn mark_unhealthy(
        &self,
        kind: DefinitionKind,
        name: &str,
        revision_hash: &str,
        reason: impl Into<String>,
    ) -> Result<(), RegistryError> {
        let reason = reason.into();
        let key = (kind, name.to_string());
        let entry = self
            .revisions
            .get(&key)
            .ok_or_else(|| RegistryError::NotFound {
                kind,
                name: name.to_string(),
            })?;
        let mut revisions = entry.write();
        let target = revisions
            .iter_mut()
            .find(|d| d.revision_hash == revision_hash)
            .ok_or_else(|| RegistryError::RevisionNotFound {
                kind,
                name: name.to_string(),
                revision_hash: revision_hash.to_string(),
            })?;
        warn!(%reason, "marking definition revision unhealthy");
        target.health = DefinitionHealth::Unhealthy { reason };
        Ok(())
    }

    /// Returns the latest registered revision. Never returns "latest
    /// healthy" silently falling back to an older revision — callers must
    /// inspect `Definition::is_healthy` themselves.
    pub fn lookup(&self, kind: DefinitionKind, name: &str) -> Result<Definition, RegistryError> {
        self.revisions
            .get(&(kind, name.to_string()))
            .and_then(|entry| entry.read().last().cloned())
            .ok_or_else(|| RegistryError::NotFound {
                kind,
                name: name.to_string(),
            })
    }

    /// Returns the exact pinned revision, never "latest".
    pub fn lookup_revision(
        &self,
        kind: DefinitionKind,
        name: &str,
        revision_hash: &str,
    ) -> Result<Definition, RegistryError> {
        self.revisions
            .get(&(kind, name.to_string()))
            .and_then(|entry| {
                entry
                    .read()
                    .iter()
                    .find(|d| d.revision_hash == revision_hash)
                    .cloned()
            })
            .ok_or_else(|| RegistryError::RevisionNotFound {
                kind,
                name: name.to_string(),
                revision_hash: revision_hash.to_string(),
            })
    }

    /// The latest revision of every definition of the given kind.
    pub fn list(&self, kind: DefinitionKind) -> Vec<Definition> {
        self.revisions
            .iter()
            .filter(|entry| entry.key().0 == kind)
            .filter_map(|entry| entry.value().read().last().cloned())
            .collect()
    }

    /// Trims each `(kind, name)` bucket down to `limit` revisions,
    /// oldest-by-revision-number first, except: the latest revision is
    /// always kept, and any revision referenced in `in_use` is never
    /// trimmed regardless of age.
    #[instrument(skip(self, in_use))]
    pub fn enforce_retention(&self, limit: usize, in_use: &HashSet<DefinitionRevisionRef>) {
        let limit = limit.max(1);
        for entry in self.revisions.iter() {
            let (kind, name) = entry.key().clone();
            let mut revisions = entry.value().write();
            let len = revisions.len();
            if len <= limit {
                continue;
            }
            let keep_from_index = len - limit;
            let mut idx = 0usize;
            revisions.retain(|d| {
                let keep = idx >= keep_from_index
                    || in_use.contains(&DefinitionRevisionRef {
                        kind,
                        name: name.clone(),
                        revision_hash: d.revision_hash.clone(),
                    });
                idx += 1;
                keep
            });
        }
    }
}
