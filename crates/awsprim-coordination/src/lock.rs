//! Distributed locks with fencing.
//!
//! A lock is one singleton item whose `value` is the owner identity.
//! Acquisition is a claim-style upsert conditioned on the lock being free,
//! already ours, or expired; release and extend require the stored owner to
//! match. Acquisition returns a fencing pair: `acquired_at` in Unix
//! microseconds plus the item's monotonic `version`. Downstream services
//! guarded by the lock can reject writers carrying a stale pair; the
//! primitive makes the pair available but does not enforce its use.

use std::sync::Arc;
use std::time::Duration;
use std::time::Instant;

use awsprim_core::constants::LOCK_BACKOFF_BASE_MS;
use awsprim_core::constants::LOCK_BACKOFF_CAP_MS;
use awsprim_core::keys;
use awsprim_core::now_unix_micros;
use awsprim_core::now_unix_secs;
use awsprim_core::retry::backoff_delay_ms;
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

/// Result of a successful acquisition.
#[derive(Debug, Clone, Serialize)]
pub struct LockGrant {
    pub lock: String,
    pub owner: String,
    /// Absolute expiry, Unix seconds.
    pub ttl: u64,
    /// Acquisition time, Unix microseconds. Half of the fencing pair.
    pub acquired_at: u64,
    /// Monotonic item version. The other half of the fencing pair.
    pub version: u64,
}

/// Observed state of a lock.
#[derive(Debug, Clone, Serialize)]
pub struct LockStatus {
    pub lock: String,
    pub owner: String,
    pub ttl: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquired_at: Option<u64>,
    pub version: u64,
}

/// Outcome of a release.
#[derive(Debug, Clone, Serialize)]
pub struct LockRelease {
    pub lock: String,
    pub released: bool,
    /// `released` or `already_released`.
    pub status: String,
}

/// Distributed lock primitive.
pub struct LockOps<S: ItemStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ItemStore + ?Sized> LockOps<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn key(&self, name: &str) -> Result<ItemKey, PrimitiveError> {
        Ok(ItemKey::singleton(keys::partition_key(Namespace::Lock, name)?))
    }

    async fn try_acquire(
        &self,
        key: &ItemKey,
        name: &str,
        owner: &str,
        ttl_secs: u64,
    ) -> Result<Result<LockGrant, ()>, PrimitiveError> {
        let now = now_unix_secs();
        let acquired_at = now_unix_micros();
        let update = UpdateAction::Claim {
            value: owner.into(),
            item_type: ItemType::Lock,
            ttl: Some(now + ttl_secs),
            metadata: ItemMetadata {
                owner: Some(owner.to_string()),
                acquired_at: Some(acquired_at),
                ..Default::default()
            },
        };
        let condition = WriteCondition::AbsentOrValueEqualsOrExpired {
            value: owner.into(),
            now,
        };

        match self.store.update(key, update, condition).await {
            Ok(record) => {
                debug!(lock = name, owner, version = record.version, "lock acquired");
                Ok(Ok(LockGrant {
                    lock: name.to_string(),
                    owner: owner.to_string(),
                    ttl: record.ttl.unwrap_or(now + ttl_secs),
                    acquired_at,
                    version: record.version,
                }))
            }
            Err(StoreError::Conflict { .. }) => Ok(Err(())),
            Err(e) => Err(fault(e)),
        }
    }

    /// Acquire the lock.
    ///
    /// With `wait_secs == 0` a held lock fails immediately. Otherwise the
    /// call retries with jittered exponential backoff until it succeeds or
    /// the wait budget elapses; exhaustion is a timeout.
    pub async fn acquire(
        &self,
        name: &str,
        ttl_secs: u64,
        owner: &str,
        wait_secs: u64,
    ) -> Result<LockGrant, PrimitiveError> {
        let key = self.key(name)?;

        if let Ok(grant) = self.try_acquire(&key, name, owner, ttl_secs).await? {
            return Ok(grant);
        }
        if wait_secs == 0 {
            return Err(PrimitiveError::CoordinationUnavailable {
                message: format!("lock '{name}' is held by another owner"),
                solution: format!(
                    "Retry with --wait, ask the holder to run 'awsprim lock release {name}', or wait for its TTL."
                ),
            });
        }

        let deadline = Instant::now() + Duration::from_secs(wait_secs);
        let mut attempt = 0u32;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(PrimitiveError::Timeout {
                    message: format!(
                        "lock '{name}' was still held by another owner after waiting {wait_secs}s"
                    ),
                });
            }
            let delay = Duration::from_millis(backoff_delay_ms(
                LOCK_BACKOFF_BASE_MS,
                LOCK_BACKOFF_CAP_MS,
                attempt,
            ))
            .min(remaining);
            tokio::time::sleep(delay).await;
            attempt += 1;

            if let Ok(grant) = self.try_acquire(&key, name, owner, ttl_secs).await? {
                return Ok(grant);
            }
        }
    }

    /// Release the lock. Already-absent locks release successfully; a lock
    /// held by someone else fails the owner condition.
    pub async fn release(&self, name: &str, owner: &str) -> Result<LockRelease, PrimitiveError> {
        let key = self.key(name)?;
        match self
            .store
            .delete(&key, WriteCondition::ValueEquals(owner.into()))
            .await
        {
            Ok(()) => Ok(LockRelease {
                lock: name.to_string(),
                released: true,
                status: "released".to_string(),
            }),
            Err(StoreError::Conflict { .. }) => {
                // Distinguish "nothing to release" from "someone else's lock".
                match self.store.get(&key, true).await.map_err(fault)? {
                    None => Ok(LockRelease {
                        lock: name.to_string(),
                        released: true,
                        status: "already_released".to_string(),
                    }),
                    Some(record) => Err(PrimitiveError::ConditionFailed {
                        message: format!(
                            "lock '{name}' is held by '{}', not '{owner}'",
                            record.value_str().unwrap_or("unknown")
                        ),
                        solution: "Only the holder may release a lock; check the owner id.".to_string(),
                    }),
                }
            }
            Err(e) => Err(fault(e)),
        }
    }

    /// Extend a held lock's TTL. Requires ownership and a live lease.
    pub async fn extend(
        &self,
        name: &str,
        ttl_secs: u64,
        owner: &str,
    ) -> Result<LockGrant, PrimitiveError> {
        let key = self.key(name)?;
        let now = now_unix_secs();
        match self
            .store
            .update(
                &key,
                UpdateAction::ExtendTtl { expires_at: now + ttl_secs },
                WriteCondition::ValueEqualsAndNotExpired { value: owner.into(), now },
            )
            .await
        {
            Ok(record) => Ok(LockGrant {
                lock: name.to_string(),
                owner: owner.to_string(),
                ttl: record.ttl.unwrap_or(now + ttl_secs),
                acquired_at: record.metadata.acquired_at.unwrap_or_default(),
                version: record.version,
            }),
            Err(StoreError::Conflict { .. }) | Err(StoreError::NotFound) => {
                Err(PrimitiveError::ConditionFailed {
                    message: format!("cannot extend lock '{name}': not held by '{owner}'"),
                    solution: format!("Re-acquire it with 'awsprim lock acquire {name}'."),
                })
            }
            Err(e) => Err(fault(e)),
        }
    }

    /// Observe the lock. `None` means free (or expired).
    pub async fn check(&self, name: &str) -> Result<Option<LockStatus>, PrimitiveError> {
        let key = self.key(name)?;
        Ok(self
            .store
            .get(&key, true)
            .await
            .map_err(fault)?
            .map(|record| LockStatus {
                lock: name.to_string(),
                owner: record.value_str().unwrap_or_default().to_string(),
                ttl: record.ttl.unwrap_or_default(),
                acquired_at: record.metadata.acquired_at,
                version: record.version,
            }))
    }
}

#[cfg(test)]
mod tests {
    use awsprim_store::MemoryItemStore;

    use super::*;

    fn ops() -> Arc<LockOps<MemoryItemStore>> {
        Arc::new(LockOps::new(Arc::new(MemoryItemStore::new())))
    }

    #[tokio::test]
    async fn exactly_one_of_two_contenders_wins() {
        let locks = ops();
        let a = locks.acquire("build", 30, "owner-a", 0).await;
        let b = locks.acquire("build", 30, "owner-b", 0).await;

        assert!(a.is_ok());
        let err = b.unwrap_err();
        assert!(matches!(err, PrimitiveError::CoordinationUnavailable { .. }));
        assert_eq!(err.exit_code(), 4);
    }

    #[tokio::test]
    async fn release_then_reacquire_by_third_party() {
        let locks = ops();
        locks.acquire("build", 30, "owner-a", 0).await.unwrap();
        let release = locks.release("build", "owner-a").await.unwrap();
        assert_eq!(release.status, "released");

        locks.acquire("build", 30, "owner-c", 0).await.unwrap();
        let status = locks.check("build").await.unwrap().unwrap();
        assert_eq!(status.owner, "owner-c");
    }

    #[tokio::test]
    async fn release_is_idempotent_but_owner_checked() {
        let locks = ops();
        let release = locks.release("free", "anyone").await.unwrap();
        assert_eq!(release.status, "already_released");

        locks.acquire("held", 30, "owner-a", 0).await.unwrap();
        let err = locks.release("held", "owner-b").await.unwrap_err();
        assert!(matches!(err, PrimitiveError::ConditionFailed { .. }));
    }

    #[tokio::test]
    async fn reacquire_by_same_owner_is_idempotent_and_fenced() {
        let locks = ops();
        let first = locks.acquire("idem", 30, "owner-a", 0).await.unwrap();
        let second = locks.acquire("idem", 30, "owner-a", 0).await.unwrap();
        assert!(second.version > first.version);
    }

    #[tokio::test]
    async fn expired_lock_can_be_stolen() {
        let locks = ops();
        // TTL 0 expires immediately.
        locks.acquire("stale", 0, "owner-a", 0).await.unwrap();
        let grant = locks.acquire("stale", 30, "owner-b", 0).await.unwrap();
        assert_eq!(grant.owner, "owner-b");
        // Versions keep increasing across the takeover.
        assert!(grant.version >= 2);
    }

    #[tokio::test]
    async fn extend_requires_ownership() {
        let locks = ops();
        locks.acquire("lease", 30, "owner-a", 0).await.unwrap();

        let extended = locks.extend("lease", 120, "owner-a").await.unwrap();
        assert!(extended.ttl >= now_unix_secs() + 100);

        let err = locks.extend("lease", 120, "owner-b").await.unwrap_err();
        assert!(matches!(err, PrimitiveError::ConditionFailed { .. }));
    }

    #[tokio::test]
    async fn bounded_wait_eventually_times_out() {
        let locks = ops();
        locks.acquire("busy", 600, "owner-a", 0).await.unwrap();
        let started = Instant::now();
        let err = locks.acquire("busy", 30, "owner-b", 1).await.unwrap_err();
        assert!(matches!(err, PrimitiveError::Timeout { .. }));
        assert_eq!(err.exit_code(), 5);
        assert!(started.elapsed() >= Duration::from_secs(1));
    }

    #[tokio::test]
    async fn waiting_acquire_wins_after_release() {
        let locks = ops();
        locks.acquire("handoff", 600, "owner-a", 0).await.unwrap();

        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { locks.acquire("handoff", 30, "owner-b", 5).await })
        };
        tokio::time::sleep(Duration::from_millis(150)).await;
        locks.release("handoff", "owner-a").await.unwrap();

        let grant = waiter.await.unwrap().unwrap();
        assert_eq!(grant.owner, "owner-b");
    }

    #[tokio::test]
    async fn check_reports_free_after_expiry() {
        let locks = ops();
        locks.acquire("short", 0, "owner-a", 0).await.unwrap();
        assert!(locks.check("short").await.unwrap().is_none());
    }
}
