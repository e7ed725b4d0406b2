//! TTL-based leader election.
//!
//! One singleton item per pool; its `value` is the current leader's id and
//! its TTL is the lease. A leader item whose TTL elapsed reads as absent,
//! so a new election succeeds without any cleanup. A process that pauses
//! past its lease discovers the loss on its next heartbeat and must stop
//! leader-only work.

use std::sync::Arc;

use awsprim_core::keys;
use awsprim_core::now_unix_secs;
use awsprim_core::ItemMetadata;
use awsprim_core::ItemType;
use awsprim_core::Namespace;
use awsprim_core::PrimitiveError;
use awsprim_store::ItemKey;
use awsprim_store::ItemStore;
use awsprim_store::StoreError;
use awsprim_store::UpdateAction;
use awsprim_store::WriteCondition;
use serde::Serialize;
use tracing::debug;

use crate::fault;

/// Leadership state after an election or heartbeat.
#[derive(Debug, Clone, Serialize)]
pub struct Leadership {
    pub pool: String,
    pub leader: String,
    /// Lease expiry, Unix seconds.
    pub ttl: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elected_at: Option<u64>,
    /// Monotonic term counter for this pool item.
    pub version: u64,
}

/// Leader election primitive.
pub struct LeaderOps<S: ItemStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ItemStore + ?Sized> LeaderOps<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn key(&self, pool: &str) -> Result<ItemKey, PrimitiveError> {
        Ok(ItemKey::singleton(keys::partition_key(Namespace::Leader, pool)?))
    }

    /// Attempt to become leader of `pool`. Succeeds when the pool has no
    /// leader or the previous lease expired.
    pub async fn elect(
        &self,
        pool: &str,
        ttl_secs: u64,
        id: &str,
    ) -> Result<Leadership, PrimitiveError> {
        let key = self.key(pool)?;
        let now = now_unix_secs();
        let update = UpdateAction::Claim {
            value: id.into(),
            item_type: ItemType::Leader,
            ttl: Some(now + ttl_secs),
            metadata: ItemMetadata {
                elected_at: Some(now),
                ..Default::default()
            },
        };

        match self
            .store
            .update(&key, update, WriteCondition::AbsentOrExpired { now })
            .await
        {
            Ok(record) => {
                debug!(pool, id, term = record.version, "elected leader");
                Ok(Leadership {
                    pool: pool.to_string(),
                    leader: id.to_string(),
                    ttl: record.ttl.unwrap_or(now + ttl_secs),
                    elected_at: Some(now),
                    version: record.version,
                })
            }
            Err(StoreError::Conflict { .. }) => Err(PrimitiveError::CoordinationUnavailable {
                message: format!("pool '{pool}' already has a live leader"),
                solution: format!(
                    "Wait for the lease to expire or check it with 'awsprim leader check {pool}'."
                ),
            }),
            Err(e) => Err(fault(e)),
        }
    }

    /// Renew the lease. Fails when leadership has been lost or the lease
    /// already expired.
    pub async fn heartbeat(
        &self,
        pool: &str,
        ttl_secs: u64,
        id: &str,
    ) -> Result<Leadership, PrimitiveError> {
        let key = self.key(pool)?;
        let now = now_unix_secs();
        match self
            .store
            .update(
                &key,
                UpdateAction::ExtendTtl { expires_at: now + ttl_secs },
                WriteCondition::ValueEqualsAndNotExpired { value: id.into(), now },
            )
            .await
        {
            Ok(record) => Ok(Leadership {
                pool: pool.to_string(),
                leader: id.to_string(),
                ttl: record.ttl.unwrap_or(now + ttl_secs),
                elected_at: record.metadata.elected_at,
                version: record.version,
            }),
            Err(StoreError::Conflict { .. }) | Err(StoreError::NotFound) => {
                Err(PrimitiveError::CoordinationUnavailable {
                    message: format!("'{id}' is no longer the leader of pool '{pool}'"),
                    solution: format!(
                        "Stop leader-only work and re-run 'awsprim leader elect {pool}'."
                    ),
                })
            }
            Err(e) => Err(fault(e)),
        }
    }

    /// Observe the pool. `None` means no live leader.
    pub async fn check(&self, pool: &str) -> Result<Option<Leadership>, PrimitiveError> {
        let key = self.key(pool)?;
        Ok(self
            .store
            .get(&key, true)
            .await
            .map_err(fault)?
            .map(|record| Leadership {
                pool: pool.to_string(),
                leader: record.value_str().unwrap_or_default().to_string(),
                ttl: record.ttl.unwrap_or_default(),
                elected_at: record.metadata.elected_at,
                version: record.version,
            }))
    }

    /// Step down. Idempotent when the pool is already vacant; fails when a
    /// different id holds leadership.
    pub async fn resign(&self, pool: &str, id: &str) -> Result<(), PrimitiveError> {
        let key = self.key(pool)?;
        match self
            .store
            .delete(&key, WriteCondition::ValueEquals(id.into()))
            .await
        {
            Ok(()) => {
                debug!(pool, id, "resigned leadership");
                Ok(())
            }
            Err(StoreError::Conflict { .. }) => {
                match self.store.get(&key, true).await.map_err(fault)? {
                    None => Ok(()),
                    Some(record) => Err(PrimitiveError::ConditionFailed {
                        message: format!(
                            "cannot resign pool '{pool}': the leader is '{}', not '{id}'",
                            record.value_str().unwrap_or("unknown")
                        ),
                        solution: "Only the current leader may resign.".to_string(),
                    }),
                }
            }
            Err(e) => Err(fault(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use awsprim_store::MemoryItemStore;

    use super::*;

    fn ops() -> LeaderOps<MemoryItemStore> {
        LeaderOps::new(Arc::new(MemoryItemStore::new()))
    }

    #[tokio::test]
    async fn second_candidate_loses_while_lease_lives() {
        let leaders = ops();
        leaders.elect("workers", 30, "n1").await.unwrap();
        let err = leaders.elect("workers", 30, "n2").await.unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn failover_after_lease_expiry() {
        let leaders = ops();
        // TTL 0 expires immediately, simulating a missed heartbeat window.
        leaders.elect("workers", 0, "n1").await.unwrap();

        let second = leaders.elect("workers", 30, "n2").await.unwrap();
        assert_eq!(second.leader, "n2");
        assert!(second.version >= 2);

        // The deposed leader's heartbeat now fails.
        let err = leaders.heartbeat("workers", 30, "n1").await.unwrap_err();
        assert!(matches!(err, PrimitiveError::CoordinationUnavailable { .. }));
    }

    #[tokio::test]
    async fn heartbeat_extends_a_live_lease() {
        let leaders = ops();
        leaders.elect("pool", 30, "n1").await.unwrap();
        let renewed = leaders.heartbeat("pool", 120, "n1").await.unwrap();
        assert!(renewed.ttl >= now_unix_secs() + 100);
    }

    #[tokio::test]
    async fn heartbeat_cannot_resurrect_an_expired_lease() {
        let leaders = ops();
        leaders.elect("pool", 0, "n1").await.unwrap();
        let err = leaders.heartbeat("pool", 30, "n1").await.unwrap_err();
        assert!(matches!(err, PrimitiveError::CoordinationUnavailable { .. }));
    }

    #[tokio::test]
    async fn check_and_resign() {
        let leaders = ops();
        assert!(leaders.check("pool").await.unwrap().is_none());

        leaders.elect("pool", 30, "n1").await.unwrap();
        let status = leaders.check("pool").await.unwrap().unwrap();
        assert_eq!(status.leader, "n1");

        // Wrong id cannot resign.
        let err = leaders.resign("pool", "n2").await.unwrap_err();
        assert!(matches!(err, PrimitiveError::ConditionFailed { .. }));

        leaders.resign("pool", "n1").await.unwrap();
        assert!(leaders.check("pool").await.unwrap().is_none());
        // Resigning a vacant pool is idempotent.
        leaders.resign("pool", "n1").await.unwrap();
    }
}
