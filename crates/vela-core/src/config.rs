//! Process-wide configuration: every §6 feature flag and tunable as one typed
//! struct, constructed once at controller startup and handed to the
//! reconciler by reference.

use serde::{Deserialize, Serialize};

use crate::revision::Compression;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ProcessConfig {
    pub application_revision_limit: usize,
    pub definition_revision_limit: usize,
    pub concurrent_reconciles: usize,
    pub application_re_sync_period_seconds: u64,

    pub kube_api_qps: f32,
    pub kube_api_burst: u32,

    pub max_workflow_wait_backoff_seconds: u64,
    pub max_workflow_failed_backoff_seconds: u64,
    pub max_workflow_step_error_retry_times: u32,

    pub enable_cluster_gateway: bool,

    pub shard_id: String,
    pub schedulable_shards: Vec<String>,

    pub zstd_application_revision: bool,
    pub gzip_application_revision: bool,
    pub zstd_resource_tracker: bool,
    pub gzip_resource_tracker: bool,

    pub disable_component_revision: bool,
    pub disable_application_revision: bool,
    pub apply_once: bool,

    pub pre_dispatch_dry_run: bool,
    pub disable_bootstrap_cluster_info: bool,
    pub informer_cache_filter_unnecessary_fields: bool,
    pub shared_definition_storage_for_application_revision: bool,
}

impl Default for ProcessConfig {
    fn default() -> Self {
        Self {
            application_revision_limit: 10,
            definition_revision_limit: 20,
            concurrent_reconciles: 4,
            application_re_sync_period_seconds: 5 * 60,

            kube_api_qps: 400.0,
            kube_api_burst: 600,

            max_workflow_wait_backoff_seconds: 60,
            max_workflow_failed_backoff_seconds: 300,
            max_workflow_step_error_retry_times: 10,

            enable_cluster_gateway: false,

            shard_id: crate::labels::SHARD_ID_MASTER.to_string(),
            schedulable_shards: Vec::new(),

            zstd_application_revision: false,
            gzip_application_revision: false,
            zstd_resource_tracker: false,
            gzip_resource_tracker: false,

            disable_component_revision: false,
            disable_application_revision: false,
            apply_once: false,

            pre_dispatch_dry_run: true,
            disable_bootstrap_cluster_info: false,
            informer_cache_filter_unnecessary_fields: false,
            shared_definition_storage_for_application_revision: false,
        }
    }
}

impl ProcessConfig {
    /// Whether this process is the master shard (runs admission webhooks and
    /// may rewrite missing shard labels).
    pub fn is_master_shard(&self) -> bool {
        self.shard_id == crate::labels::SHARD_ID_MASTER
    }

    pub fn application_revision_compression(&self) -> Compression {
        if self.zstd_application_revision {
            Compression::Zstd
        } else if self.gzip_application_revision {
            Compression::Gzip
        } else {
            Compression::None
        }
    }

    pub fn resource_tracker_compression(&self) -> Compression {
        if self.zstd_resource_tracker {
            Compression::Zstd
        } else if self.gzip_resource_tracker {
            Compression::Gzip
        } else {
            Compression::None
        }
    }

    /// Whether any compression feature is enabled; gates the pre-start canary
    /// check (§4.8).
    pub fn any_compression_enabled(&self) -> bool {
        self.zstd_application_revision
            || self.gzip_application_revision
            || self.zstd_resource_tracker
            || self.gzip_resource_tracker
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_section_6() {
        let cfg = ProcessConfig::default();
        assert_eq!(cfg.application_revision_limit, 10);
        assert_eq!(cfg.definition_revision_limit, 20);
        assert_eq!(cfg.concurrent_reconciles, 4);
        assert_eq!(cfg.max_workflow_wait_backoff_seconds, 60);
        assert_eq!(cfg.max_workflow_failed_backoff_seconds, 300);
        assert_eq!(cfg.max_workflow_step_error_retry_times, 10);
        assert!(cfg.is_master_shard());
        assert!(!cfg.any_compression_enabled());
    }

    #[test]
    fn zstd_takes_precedence_over_gzip() {
        let mut cfg = ProcessConfig::default();
        cfg.zstd_application_revision = true;
        cfg.gzip_application_revision = true;
        assert_eq!(cfg.application_revision_compression(), Compression::Zstd);
        assert!(cfg.any_compression_enabled());
    }
}
