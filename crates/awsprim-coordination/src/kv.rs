//! Key/value operations.

use std::sync::Arc;

use awsprim_core::keys;
use awsprim_core::now_unix_secs;
use awsprim_core::ItemRecord;
use awsprim_core::ItemType;
use awsprim_core::Namespace;
use awsprim_core::PrimitiveError;
use awsprim_store::ItemKey;
use awsprim_store::ItemStore;
use awsprim_store::StoreError;
use awsprim_store::WriteCondition;
use serde::Serialize;
use tracing::debug;

use crate::fault;

/// One key/value entry as reported to the user.
#[derive(Debug, Clone, Serialize)]
pub struct KvEntry {
    pub key: String,
    pub value: serde_json::Value,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    pub created_at: u64,
    pub updated_at: u64,
    /// True when the value came from `--default` instead of the store.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub default: bool,
}

impl KvEntry {
    fn from_record(key: &str, record: ItemRecord) -> Self {
        Self {
            key: key.to_string(),
            value: record.value,
            item_type: record.item_type,
            ttl: record.ttl,
            created_at: record.created_at,
            updated_at: record.updated_at,
            default: false,
        }
    }
}

/// Key/value primitive.
pub struct KvOps<S: ItemStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ItemStore + ?Sized> KvOps<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn key(&self, key: &str) -> Result<ItemKey, PrimitiveError> {
        Ok(ItemKey::singleton(keys::partition_key(Namespace::Kv, key)?))
    }

    /// Store a value. `if_not_exists` makes the write conditional on absence.
    pub async fn set(
        &self,
        key: &str,
        value: serde_json::Value,
        ttl_secs: Option<u64>,
        if_not_exists: bool,
    ) -> Result<KvEntry, PrimitiveError> {
        let item_key = self.key(key)?;
        let mut record = ItemRecord::new(
            item_key.partition_key.clone(),
            item_key.sort_key.clone(),
            value,
            ItemType::Kv,
        );
        if let Some(ttl) = ttl_secs {
            record = record.with_ttl_in(ttl);
        }

        let condition = if if_not_exists {
            WriteCondition::Absent
        } else {
            WriteCondition::None
        };

        match self.store.put(record.clone(), condition).await {
            Ok(()) => {
                debug!(key, "kv set");
                Ok(KvEntry::from_record(key, record))
            }
            Err(StoreError::Conflict { .. }) => Err(PrimitiveError::AlreadyExists {
                message: format!("key '{key}' already exists"),
                solution: format!(
                    "Drop --if-not-exists to overwrite, or delete it first with 'awsprim kv delete {key}'."
                ),
            }),
            Err(e) => Err(fault(e)),
        }
    }

    /// Read a value. A supplied default substitutes for a missing key.
    pub async fn get(
        &self,
        key: &str,
        default: Option<serde_json::Value>,
    ) -> Result<KvEntry, PrimitiveError> {
        let item_key = self.key(key)?;
        match self.store.get(&item_key, false).await.map_err(fault)? {
            Some(record) => Ok(KvEntry::from_record(key, record)),
            None => match default {
                Some(value) => {
                    let now = now_unix_secs();
                    Ok(KvEntry {
                        key: key.to_string(),
                        value,
                        item_type: ItemType::Kv,
                        ttl: None,
                        created_at: now,
                        updated_at: now,
                        default: true,
                    })
                }
                None => Err(PrimitiveError::NotFound {
                    message: format!("key '{key}' not found"),
                    solution: format!("Create it with 'awsprim kv set {key} <value>'."),
                }),
            },
        }
    }

    /// Delete a key. Absent keys delete successfully; a mismatched
    /// `if_value` fails the condition.
    pub async fn delete(
        &self,
        key: &str,
        if_value: Option<serde_json::Value>,
    ) -> Result<(), PrimitiveError> {
        let item_key = self.key(key)?;
        let condition = match if_value {
            Some(expected) => WriteCondition::ValueEquals(expected),
            None => WriteCondition::None,
        };

        match self.store.delete(&item_key, condition).await {
            Ok(()) => {
                debug!(key, "kv deleted");
                Ok(())
            }
            Err(StoreError::Conflict { .. }) => Err(PrimitiveError::ConditionFailed {
                message: format!("key '{key}' does not hold the expected value"),
                solution: format!("Read the current value with 'awsprim kv get {key}' and retry."),
            }),
            Err(e) => Err(fault(e)),
        }
    }

    /// Existence probe.
    pub async fn exists(&self, key: &str) -> Result<bool, PrimitiveError> {
        let item_key = self.key(key)?;
        Ok(self.store.get(&item_key, false).await.map_err(fault)?.is_some())
    }

    /// Enumerate keys under a name prefix, newest first.
    pub async fn list(
        &self,
        prefix: &str,
        limit: Option<u32>,
    ) -> Result<Vec<KvEntry>, PrimitiveError> {
        let records = self
            .store
            .query_type_index(ItemType::Kv, None)
            .await
            .map_err(fault)?;

        let wanted = format!("kv:{prefix}");
        let mut entries: Vec<KvEntry> = records
            .into_iter()
            .filter(|record| record.partition_key.starts_with(&wanted))
            .map(|record| {
                let key = record
                    .partition_key
                    .strip_prefix("kv:")
                    .unwrap_or(&record.partition_key)
                    .to_string();
                KvEntry::from_record(&key, record)
            })
            .collect();
        if let Some(limit) = limit {
            entries.truncate(limit as usize);
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use awsprim_store::MemoryItemStore;

    use super::*;

    fn ops() -> KvOps<MemoryItemStore> {
        KvOps::new(Arc::new(MemoryItemStore::new()))
    }

    #[tokio::test]
    async fn set_then_get_round_trips() {
        let kv = ops();
        kv.set("greeting", "hello".into(), None, false).await.unwrap();
        let entry = kv.get("greeting", None).await.unwrap();
        assert_eq!(entry.value, serde_json::json!("hello"));
        assert!(!entry.default);
    }

    #[tokio::test]
    async fn if_not_exists_reports_already_exists() {
        let kv = ops();
        kv.set("once", "a".into(), None, true).await.unwrap();
        let err = kv.set("once", "b".into(), None, true).await.unwrap_err();
        assert!(matches!(err, PrimitiveError::AlreadyExists { .. }));
        assert_eq!(err.exit_code(), 4);
        // Overwrite without the flag still works.
        kv.set("once", "b".into(), None, false).await.unwrap();
        assert_eq!(kv.get("once", None).await.unwrap().value, serde_json::json!("b"));
    }

    #[tokio::test]
    async fn missing_key_uses_default_or_errors() {
        let kv = ops();
        let entry = kv.get("absent", Some("fallback".into())).await.unwrap();
        assert!(entry.default);
        assert_eq!(entry.value, serde_json::json!("fallback"));

        let err = kv.get("absent", None).await.unwrap_err();
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn conditional_delete_checks_the_value() {
        let kv = ops();
        kv.set("guarded", "expected".into(), None, false).await.unwrap();

        let err = kv.delete("guarded", Some("wrong".into())).await.unwrap_err();
        assert!(matches!(err, PrimitiveError::ConditionFailed { .. }));
        assert!(kv.exists("guarded").await.unwrap());

        kv.delete("guarded", Some("expected".into())).await.unwrap();
        assert!(!kv.exists("guarded").await.unwrap());

        // Deleting an absent key is idempotent.
        kv.delete("guarded", None).await.unwrap();
    }

    #[tokio::test]
    async fn expired_entries_read_as_absent() {
        let kv = ops();
        // TTL of zero expires immediately.
        kv.set("ephemeral", "x".into(), Some(0), false).await.unwrap();
        assert!(!kv.exists("ephemeral").await.unwrap());
        let err = kv.get("ephemeral", None).await.unwrap_err();
        assert!(matches!(err, PrimitiveError::NotFound { .. }));
    }

    #[tokio::test]
    async fn list_filters_by_prefix() {
        let kv = ops();
        kv.set("app/a", "1".into(), None, false).await.unwrap();
        kv.set("app/b", "2".into(), None, false).await.unwrap();
        kv.set("other", "3".into(), None, false).await.unwrap();

        let entries = kv.list("app/", None).await.unwrap();
        assert_eq!(entries.len(), 2);
        assert!(entries.iter().all(|e| e.key.starts_with("app/")));

        let limited = kv.list("", Some(1)).await.unwrap();
        assert_eq!(limited.len(), 1);
    }
}
