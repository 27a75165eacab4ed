//! Two-phase mark/sweep garbage collection (§4.5).

use std::collections::HashSet;

use async_trait::async_trait;
use rand::Rng;
use tracing::{info, instrument};

use vela_core::error::DispatchError;
use vela_core::tracker::{DeletionPolicy, ResourceTracker, ResourceTrackerEntry};

/// Default probability a stale non-orphaned entry is swept in one pass.
pub const DEFAULT_SWEEP_PROBABILITY: f64 = 0.1;

#[derive(Debug, Clone, Copy)]
pub struct GcConfig {
    pub sweep_probability: f64,
}

impl Default for GcConfig {
    fn default() -> Self {
        Self {
            sweep_probability: DEFAULT_SWEEP_PROBABILITY,
        }
    }
}

/// Deletes (or orphan-annotates) a previously-dispatched object. Supplied by
/// the reconciler, typically backed by `vela_dispatch::Dispatcher`.
#[async_trait]
pub trait ResourceDeleter: Send + Sync {
    /// Returns `Ok(true)` if the object was deleted, `Ok(false)` if it was
    /// already gone (`NotFound`, also a success for GC's purposes).
    async fn delete(&self, entry: &ResourceTrackerEntry) -> Result<bool, DispatchError>;

    /// Patches `trait.oam.dev/policy=Orphan` onto the live object so it stays
    /// distinguishable from one GC simply hasn't reached yet, without
    /// deleting it.
    async fn mark_orphaned(&self, entry: &ResourceTrackerEntry) -> Result<(), DispatchError>;
}

#[derive(Debug, Default)]
pub struct GcReport {
    pub swept: usize,
    pub skipped_probabilistic: usize,
    pub orphaned_entries_removed: usize,
    pub failed: usize,
}

/// Computes `stale(prior) = entries(prior) \ live` and sweeps it against
/// `deleter`, respecting each entry's deletion policy and the sweep
/// probability. `prior_revision_exists` distinguishes a still-retained prior
/// revision (probabilistic sweep) from an orphaned one whose
/// ApplicationRevision has already been deleted (always swept).
#[instrument(skip(deleter, live, prior, rng))]
pub async fn mark_and_sweep<D: ResourceDeleter, R: Rng>(
    deleter: &D,
    live: &ResourceTracker,
    prior: &mut ResourceTracker,
    prior_revision_exists: bool,
    config: &GcConfig,
    rng: &mut R,
) -> GcReport {
    let live_identities: HashSet<_> = live.entries.iter().map(|e| e.identity()).collect();
    let mut report = GcReport::default();
    let mut kept = Vec::new();

    for entry in prior.entries.drain(..) {
        if live_identities.contains(&entry.identity()) {
            kept.push(entry);
            continue;
        }

        let should_consider = !prior_revision_exists || rng.gen_bool(config.sweep_probability);
        if !should_consider {
            report.skipped_probabilistic += 1;
            kept.push(entry);
            continue;
        }

        match entry.deletion_policy {
            DeletionPolicy::Orphan => match deleter.mark_orphaned(&entry).await {
                Ok(()) => {
                    info!(name = %entry.name, "orphaning tracker entry, annotated and left in place");
                    report.swept += 1;
                    if !prior_revision_exists {
                        report.orphaned_entries_removed += 1;
                    }
                }
                Err(_) => {
                    report.failed += 1;
                    kept.push(entry);
                }
            },
            DeletionPolicy::OnCascadingDelete => {
                // Only removed when the Application itself is deleted; a routine
                // sweep always keeps it.
                kept.push(entry);
            }
            DeletionPolicy::Delete => match deleter.delete(&entry).await {
                Ok(_deleted) => {
                    report.swept += 1;
                    if !prior_revision_exists {
                        report.orphaned_entries_removed += 1;
                    }
                }
                Err(_) => {
                    report.failed += 1;
                    kept.push(entry);
                }
            },
        }
    }

    prior.entries = kept;
    report
}
