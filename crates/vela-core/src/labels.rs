//! Stable label/annotation keys applied to every dispatched object.

pub const APP_NAME: &str = "app.oam.dev/name";
pub const APP_COMPONENT: &str = "app.oam.dev/component";
pub const APP_REVISION: &str = "app.oam.dev/appRevision";
pub const APP_REVISION_HASH: &str = "app.oam.dev/revision-hash";
pub const WORKLOAD_TYPE: &str = "workload.oam.dev/type";
pub const TRAIT_TYPE: &str = "trait.oam.dev/type";
pub const TRAIT_RESOURCE: &str = "trait.oam.dev/resource";

/// Annotation marking an orphaned (deletion-policy `Orphan`) resource once its
/// tracker entry has been removed; used by invariant I6 to distinguish
/// intentionally-kept objects from ones GC simply hasn't reached yet.
pub const TRAIT_POLICY_ORPHAN: &str = "trait.oam.dev/policy";
pub const TRAIT_POLICY_ORPHAN_VALUE: &str = "Orphan";

/// Shard assignment label read by the Sharding Router (§4.9).
pub const SHARD_ID: &str = "core.oam.dev/shard-id";
pub const SHARD_ID_MASTER: &str = "master";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn label_keys_use_oam_dev_domain() {
        for key in [APP_NAME, APP_COMPONENT, APP_REVISION, APP_REVISION_HASH] {
            assert!(key.starts_with("app.oam.dev/"));
        }
        assert!(WORKLOAD_TYPE.starts_with("workload.oam.dev/"));
        assert!(TRAIT_TYPE.starts_with("trait.oam.dev/"));
    }
}
