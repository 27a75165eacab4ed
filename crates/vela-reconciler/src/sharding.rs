//! Sharding router (§4.9): guards which controller replica reconciles which
//! Application, and lets the master shard place unassigned Applications.

use vela_core::labels::SHARD_ID_MASTER;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardDecision {
    /// This replica owns the Application; proceed with reconciliation.
    Own,
    /// Some other shard owns it; skip silently.
    NotOwned,
    /// No shard label was present and this replica is the master shard;
    /// assign it `shard_id` and requeue instead of reconciling this pass.
    Assign { shard_id: String },
}

#[derive(Debug, Clone)]
pub struct ShardRouter {
    /// This replica's own shard id (`"master"` unless configured otherwise).
    pub shard_id: String,
    /// Shards the master may place new, unlabeled Applications onto.
    pub schedulable_shards: Vec<String>,
}

impl ShardRouter {
    pub fn new(shard_id: impl Into<String>, schedulable_shards: Vec<String>) -> Self {
        Self {
            shard_id: shard_id.into(),
            schedulable_shards,
        }
    }

    pub fn is_master(&self) -> bool {
        self.shard_id == SHARD_ID_MASTER
    }

    /// `application_shard_label` is the Application's `shard-id` label value,
    /// or `None` if it carries none yet.
    pub fn route(&self, application_shard_label: Option<&str>) -> ShardDecision {
        match application_shard_label {
            Some(label) if label == self.shard_id => ShardDecision::Own,
            Some(_) => ShardDecision::NotOwned,
            None if self.is_master() => {
                let target = self
                    .schedulable_shards
                    .first()
                    .cloned()
                    .unwrap_or_else(|| SHARD_ID_MASTER.to_string());
                ShardDecision::Assign { shard_id: target }
            }
            None => ShardDecision::NotOwned,
        }
    }
}
