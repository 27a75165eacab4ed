//! Retention enforcement: `applicationRevisionLimit` (default 10), oldest
//! first, never the current revision or one a non-terminal workflow still
//! points to.

use std::collections::HashSet;

use tracing::info;

use vela_core::revision::ApplicationRevision;

pub const DEFAULT_REVISION_LIMIT: usize = 10;

/// Returns the revision numbers that should be deleted to bring `retained`
/// (assumed already sorted ascending by `revision_number`) within `limit`.
/// `current` and every number in `pinned` (non-terminal workflow pointers)
/// are never selected for deletion, even if that means the retained count
/// temporarily exceeds `limit` (invariant I3's stated exception).
pub fn revisions_to_delete(
    retained: &[ApplicationRevision],
    limit: usize,
    current: u64,
    pinned: &HashSet<u64>,
) -> Vec<u64> {
    let deletable_count = retained
        .iter()
        .filter(|r| r.revision_number != current && !pinned.contains(&r.revision_number))
        .count();
    let total_non_deletable = retained.len() - deletable_count;
    if retained.len() <= limit {
        return Vec::new();
    }

    let mut to_delete = Vec::new();
    let mut remaining = retained.len() - total_non_deletable;
    let excess = retained.len().saturating_sub(limit).min(remaining);

    for revision in retained {
        if to_delete.len() >= excess {
            break;
        }
        if revision.revision_number == current || pinned.contains(&revision.revision_number) {
            continue;
        }
        to_delete.push(revision.revision_number);
        remaining -= 1;
    }

    if !to_delete.is_empty() {
        info!(count = to_delete.len(), "revisions selected for retention sweep");
    }

    to_delete
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use vela_core::model::ApplicationSpec;
    use vela_core::revision::Compression;

    fn revision(number: u64) -> ApplicationRevision {
        ApplicationRevision {
            application_name: "web".into(),
            namespace: "default".into(),
            revision_hash: format!("h{number}"),
            revision_number: number,
            spec: ApplicationSpec {
                name: "web".into(),
                namespace: "default".into(),
                components: vec![],
                policies: vec![],
                workflow: None,
            },
            component_definitions: vec![],
            trait_definitions: vec![],
            policy_definitions: vec![],
            workflow_step_definitions: vec![],
            compression: Compression::None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn within_limit_deletes_nothing() {
        let revisions: Vec<_> = (1..=5).map(revision).collect();
        let deleted = revisions_to_delete(&revisions, 10, 5, &HashSet::new());
        assert!(deleted.is_empty());
    }

    #[test]
    fn oldest_first_beyond_limit() {
        let revisions: Vec<_> = (1..=12).map(revision).collect();
        let deleted = revisions_to_delete(&revisions, 10, 12, &HashSet::new());
        assert_eq!(deleted, vec![1, 2]);
    }

    #[test]
    fn current_and_pinned_revisions_are_never_deleted() {
        let revisions: Vec<_> = (1..=12).map(revision).collect();
        let mut pinned = HashSet::new();
        pinned.insert(1u64);
        let deleted = revisions_to_delete(&revisions, 10, 12, &pinned);
        assert!(!deleted.contains(&1));
        assert_eq!(deleted.len(), 2);
        assert_eq!(deleted, vec![2, 3]);
    }
}
