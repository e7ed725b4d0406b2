//! Deterministic in-memory item store.
//!
//! Interprets the same typed conditions and updates as the DynamoDB driver
//! against a BTreeMap ordered the way DynamoDB orders sort keys, so
//! primitive tests exercise real conditional-write semantics without a
//! network. Like the real store, physically present items whose TTL has
//! elapsed are invisible to reads but still participate in condition
//! evaluation until overwritten or deleted.

use std::collections::BTreeMap;

use async_trait::async_trait;
use awsprim_core::now_unix_secs;
use awsprim_core::ItemRecord;
use awsprim_core::ItemType;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::op::ItemKey;
use crate::op::QuerySpec;
use crate::op::TransactAction;
use crate::op::UpdateAction;
use crate::op::WriteCondition;
use crate::validate_transaction;
use crate::ItemStore;

/// In-memory store for tests.
#[derive(Debug, Default)]
pub struct MemoryItemStore {
    items: Mutex<BTreeMap<(String, String), ItemRecord>>,
}

impl MemoryItemStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of physically stored items, expired included.
    pub async fn raw_len(&self) -> usize {
        self.items.lock().await.len()
    }
}

fn check_condition(
    current: Option<&ItemRecord>,
    condition: &WriteCondition,
) -> Result<(), StoreError> {
    let failed = |message: &str| {
        Err(StoreError::Conflict {
            message: message.to_string(),
        })
    };

    match condition {
        WriteCondition::None => Ok(()),
        WriteCondition::Absent => match current {
            None => Ok(()),
            Some(_) => failed("item already exists"),
        },
        WriteCondition::Exists => match current {
            Some(_) => Ok(()),
            None => failed("item does not exist"),
        },
        WriteCondition::ValueEquals(expected) => match current {
            Some(record) if record.value == *expected => Ok(()),
            _ => failed("stored value does not match"),
        },
        WriteCondition::AbsentOrValueEquals(expected) => match current {
            None => Ok(()),
            Some(record) if record.value == *expected => Ok(()),
            Some(_) => failed("item exists with a different value"),
        },
        WriteCondition::AbsentOrExpired { now } => match current {
            None => Ok(()),
            Some(record) if record.is_expired_at(*now) => Ok(()),
            Some(_) => failed("item exists and has not expired"),
        },
        WriteCondition::AbsentOrValueEqualsOrExpired { value, now } => match current {
            None => Ok(()),
            Some(record) if record.value == *value => Ok(()),
            Some(record) if record.is_expired_at(*now) => Ok(()),
            Some(_) => failed("item is held by another value and has not expired"),
        },
        WriteCondition::ValueEqualsAndNotExpired { value, now } => match current {
            Some(record) if record.value == *value && !record.is_expired_at(*now) => Ok(()),
            Some(_) => failed("value mismatch or item expired"),
            None => failed("item does not exist"),
        },
        WriteCondition::VersionEquals(version) => match current {
            Some(record) if record.version == *version => Ok(()),
            Some(_) => failed("stored version does not match"),
            None => failed("item does not exist"),
        },
        WriteCondition::VisibilityUnchanged { observed } => match current {
            None => failed("item does not exist"),
            Some(record) if record.metadata.visibility_deadline == *observed => Ok(()),
            Some(_) => failed("visibility deadline changed"),
        },
    }
}

fn apply_update(
    key: &ItemKey,
    current: Option<ItemRecord>,
    update: &UpdateAction,
) -> Result<ItemRecord, StoreError> {
    let now = now_unix_secs();

    match update {
        UpdateAction::Increment { by, item_type } => {
            let mut record = current.unwrap_or_else(|| {
                let mut fresh = ItemRecord::new(
                    key.partition_key.clone(),
                    key.sort_key.clone(),
                    serde_json::Value::from(0),
                    *item_type,
                );
                fresh.version = 0;
                fresh
            });
            let base = record.value.as_i64().unwrap_or(0);
            record.value = serde_json::Value::from(base + by);
            record.updated_at = now;
            record.version += 1;
            Ok(record)
        }
        UpdateAction::ExtendTtl { expires_at } => {
            let mut record = current.ok_or(StoreError::NotFound)?;
            record.ttl = Some(*expires_at);
            record.updated_at = now;
            Ok(record)
        }
        UpdateAction::SetVisibility { deadline } => {
            let mut record = current.ok_or_else(|| StoreError::InvalidRequest {
                message: "cannot set a visibility deadline on a missing item".to_string(),
            })?;
            record.metadata.visibility_deadline = Some(*deadline);
            record.updated_at = now;
            Ok(record)
        }
        UpdateAction::Claim {
            value,
            item_type,
            ttl,
            metadata,
        } => {
            let (created_at, version) = match &current {
                Some(record) => (record.created_at, record.version + 1),
                None => (now, 1),
            };
            Ok(ItemRecord {
                partition_key: key.partition_key.clone(),
                sort_key: key.sort_key.clone(),
                value: value.clone(),
                item_type: *item_type,
                ttl: *ttl,
                metadata: metadata.clone(),
                created_at,
                updated_at: now,
                version,
            })
        }
        UpdateAction::SetValue { value, item_type } => {
            let (created_at, version, ttl, metadata) = match &current {
                Some(record) => (
                    record.created_at,
                    record.version + 1,
                    record.ttl,
                    record.metadata.clone(),
                ),
                None => (now, 1, None, Default::default()),
            };
            Ok(ItemRecord {
                partition_key: key.partition_key.clone(),
                sort_key: key.sort_key.clone(),
                value: value.clone(),
                item_type: *item_type,
                ttl,
                metadata,
                created_at,
                updated_at: now,
                version,
            })
        }
    }
}

#[async_trait]
impl ItemStore for MemoryItemStore {
    async fn put(&self, record: ItemRecord, condition: WriteCondition) -> Result<(), StoreError> {
        let mut items = self.items.lock().await;
        let key = (record.partition_key.clone(), record.sort_key.clone());
        check_condition(items.get(&key), &condition)?;
        items.insert(key, record);
        Ok(())
    }

    async fn get(&self, key: &ItemKey, _consistent: bool) -> Result<Option<ItemRecord>, StoreError> {
        let items = self.items.lock().await;
        let now = now_unix_secs();
        Ok(items
            .get(&(key.partition_key.clone(), key.sort_key.clone()))
            .filter(|record| !record.is_expired_at(now))
            .cloned())
    }

    async fn update(
        &self,
        key: &ItemKey,
        update: UpdateAction,
        condition: WriteCondition,
    ) -> Result<ItemRecord, StoreError> {
        let mut items = self.items.lock().await;
        let map_key = (key.partition_key.clone(), key.sort_key.clone());
        check_condition(items.get(&map_key), &condition)?;
        let updated = apply_update(key, items.get(&map_key).cloned(), &update)?;
        items.insert(map_key, updated.clone());
        Ok(updated)
    }

    async fn delete(&self, key: &ItemKey, condition: WriteCondition) -> Result<(), StoreError> {
        let mut items = self.items.lock().await;
        let map_key = (key.partition_key.clone(), key.sort_key.clone());
        check_condition(items.get(&map_key), &condition)?;
        items.remove(&map_key);
        Ok(())
    }

    async fn query(&self, spec: QuerySpec) -> Result<Vec<ItemRecord>, StoreError> {
        let items = self.items.lock().await;
        let now = now_unix_secs();

        let mut matched: Vec<ItemRecord> = items
            .range((spec.partition_key.clone(), String::new())..)
            .take_while(|((pk, _), _)| *pk == spec.partition_key)
            .filter(|((_, sk), _)| {
                spec.sort_key_prefix
                    .as_deref()
                    .map(|prefix| sk.starts_with(prefix))
                    .unwrap_or(true)
            })
            .map(|(_, record)| record.clone())
            .filter(|record| !record.is_expired_at(now))
            .collect();

        if !spec.ascending {
            matched.reverse();
        }
        if let Some(limit) = spec.limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn count(
        &self,
        partition_key: &str,
        sort_key_prefix: Option<&str>,
    ) -> Result<u64, StoreError> {
        let items = self.items.lock().await;
        let now = now_unix_secs();
        Ok(items
            .range((partition_key.to_string(), String::new())..)
            .take_while(|((pk, _), _)| pk == partition_key)
            .filter(|((_, sk), _)| sort_key_prefix.map(|p| sk.starts_with(p)).unwrap_or(true))
            .filter(|(_, record)| !record.is_expired_at(now))
            .count() as u64)
    }

    async fn query_type_index(
        &self,
        item_type: ItemType,
        limit: Option<u32>,
    ) -> Result<Vec<ItemRecord>, StoreError> {
        let items = self.items.lock().await;
        let now = now_unix_secs();
        let mut matched: Vec<ItemRecord> = items
            .values()
            .filter(|record| record.item_type == item_type && !record.is_expired_at(now))
            .cloned()
            .collect();
        matched.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        if let Some(limit) = limit {
            matched.truncate(limit as usize);
        }
        Ok(matched)
    }

    async fn count_type(&self, item_type: ItemType) -> Result<u64, StoreError> {
        let items = self.items.lock().await;
        let now = now_unix_secs();
        Ok(items
            .values()
            .filter(|record| record.item_type == item_type && !record.is_expired_at(now))
            .count() as u64)
    }

    async fn transact_write(&self, actions: Vec<TransactAction>) -> Result<(), StoreError> {
        validate_transaction(&actions)?;
        let mut items = self.items.lock().await;

        // Phase 1: evaluate every condition; all-or-nothing.
        let mut failures = Vec::new();
        let mut any_failed = false;
        for action in &actions {
            let key = action.key();
            let map_key = (key.partition_key.clone(), key.sort_key.clone());
            let condition = match action {
                TransactAction::Put { condition, .. }
                | TransactAction::Update { condition, .. }
                | TransactAction::Delete { condition, .. }
                | TransactAction::ConditionCheck { condition, .. } => condition,
            };
            match check_condition(items.get(&map_key), condition) {
                Ok(()) => failures.push("None".to_string()),
                Err(_) => {
                    any_failed = true;
                    failures.push("ConditionalCheckFailed".to_string());
                }
            }
        }
        if any_failed {
            return Err(StoreError::TransactionCanceled {
                reasons: failures
                    .into_iter()
                    .enumerate()
                    .map(|(i, code)| format!("action {i}: {code}"))
                    .collect(),
            });
        }

        // Phase 2: apply.
        for action in actions {
            let key = action.key();
            let map_key = (key.partition_key.clone(), key.sort_key.clone());
            match action {
                TransactAction::Put { record, .. } => {
                    items.insert(map_key, record);
                }
                TransactAction::Update { key, update, .. } => {
                    let updated = apply_update(&key, items.get(&map_key).cloned(), &update)?;
                    items.insert(map_key, updated);
                }
                TransactAction::Delete { .. } => {
                    items.remove(&map_key);
                }
                TransactAction::ConditionCheck { .. } => {}
            }
        }
        Ok(())
    }

    async fn transact_get(&self, keys: Vec<ItemKey>) -> Result<Vec<Option<ItemRecord>>, StoreError> {
        let items = self.items.lock().await;
        let now = now_unix_secs();
        Ok(keys
            .into_iter()
            .map(|key| {
                items
                    .get(&(key.partition_key, key.sort_key))
                    .filter(|record| !record.is_expired_at(now))
                    .cloned()
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use awsprim_core::ItemMetadata;

    use super::*;

    fn kv(key: &str, value: &str) -> ItemRecord {
        ItemRecord::new(format!("kv:{key}"), format!("kv:{key}"), value.into(), ItemType::Kv)
    }

    #[tokio::test]
    async fn absent_condition_rejects_existing_items() {
        let store = MemoryItemStore::new();
        store.put(kv("a", "1"), WriteCondition::Absent).await.unwrap();
        let err = store.put(kv("a", "2"), WriteCondition::Absent).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));
        // Unconditional overwrite still works.
        store.put(kv("a", "2"), WriteCondition::None).await.unwrap();
    }

    #[tokio::test]
    async fn expired_items_are_invisible_but_still_condition() {
        let store = MemoryItemStore::new();
        let mut record = kv("stale", "x");
        record.ttl = Some(1); // long past
        store.put(record, WriteCondition::None).await.unwrap();

        let key = ItemKey::singleton("kv:stale");
        assert!(store.get(&key, false).await.unwrap().is_none());
        assert_eq!(store.raw_len().await, 1);

        // A plain Absent condition still sees the physical item...
        let err = store.put(kv("stale", "y"), WriteCondition::Absent).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict { .. }));

        // ...which is why claim-style writes carry the expired alternative.
        store
            .put(
                kv("stale", "y"),
                WriteCondition::AbsentOrExpired { now: now_unix_secs() },
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn increment_creates_and_accumulates() {
        let store = MemoryItemStore::new();
        let key = ItemKey::singleton("counter:hits");
        let first = store
            .update(&key, UpdateAction::Increment { by: 5, item_type: ItemType::Counter }, WriteCondition::None)
            .await
            .unwrap();
        assert_eq!(first.value_i64(), Some(5));
        let second = store
            .update(&key, UpdateAction::Increment { by: -2, item_type: ItemType::Counter }, WriteCondition::None)
            .await
            .unwrap();
        assert_eq!(second.value_i64(), Some(3));
        assert_eq!(second.version, 2);
    }

    #[tokio::test]
    async fn claim_preserves_created_at_and_bumps_version() {
        let store = MemoryItemStore::new();
        let key = ItemKey::singleton("lock:l");
        let claim = |owner: &str| UpdateAction::Claim {
            value: owner.into(),
            item_type: ItemType::Lock,
            ttl: Some(now_unix_secs() + 300),
            metadata: ItemMetadata { owner: Some(owner.into()), ..Default::default() },
        };
        let first = store.update(&key, claim("a"), WriteCondition::None).await.unwrap();
        let second = store.update(&key, claim("a"), WriteCondition::None).await.unwrap();
        assert_eq!(first.created_at, second.created_at);
        assert!(second.version > first.version);
    }

    #[tokio::test]
    async fn queries_are_sorted_and_prefix_scoped() {
        let store = MemoryItemStore::new();
        for (sk, v) in [("queue:q#b", "2"), ("queue:q#a", "1"), ("queue:q:dedup#x", "d")] {
            let record = ItemRecord::new("queue:q", sk, v.into(), ItemType::Queue);
            store.put(record, WriteCondition::None).await.unwrap();
        }

        let messages = store
            .query(QuerySpec::partition("queue:q").with_prefix("queue:q#"))
            .await
            .unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].sort_key, "queue:q#a");

        assert_eq!(store.count("queue:q", Some("queue:q#")).await.unwrap(), 2);
        assert_eq!(store.count("queue:q", None).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn transactions_are_all_or_nothing() {
        let store = MemoryItemStore::new();
        store.put(kv("present", "x"), WriteCondition::None).await.unwrap();

        let actions = vec![
            TransactAction::Put {
                record: kv("fresh", "new"),
                condition: WriteCondition::Absent,
            },
            TransactAction::Put {
                record: kv("present", "clobber"),
                condition: WriteCondition::Absent, // fails
            },
        ];
        let err = store.transact_write(actions).await.unwrap_err();
        match err {
            StoreError::TransactionCanceled { reasons } => {
                assert_eq!(reasons.len(), 2);
                assert!(reasons[0].contains("None"));
                assert!(reasons[1].contains("ConditionalCheckFailed"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // Nothing was applied.
        let fresh = ItemKey::singleton("kv:fresh");
        assert!(store.get(&fresh, false).await.unwrap().is_none());
        let present = ItemKey::singleton("kv:present");
        assert_eq!(
            store.get(&present, false).await.unwrap().unwrap().value_str(),
            Some("x")
        );
    }
}
