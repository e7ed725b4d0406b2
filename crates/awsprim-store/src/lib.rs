//! Item-store driver for the shared coordination table.
//!
//! The [`ItemStore`] trait is the seam between the primitives and the
//! backing store. Two implementations:
//!
//! - [`DynamoItemStore`] - the production driver over DynamoDB
//! - [`MemoryItemStore`] - a deterministic in-memory store for tests
//!
//! Both enforce TTL visibility centrally: an item whose `ttl` has elapsed
//! reads as absent from `get` and `query`, whether or not the backing store
//! has physically removed it yet.

pub mod admin;
pub mod dynamo;
pub mod error;
pub mod memory;
pub mod op;

use async_trait::async_trait;
use awsprim_core::ItemRecord;
use awsprim_core::ItemType;

pub use admin::TableAdmin;
pub use admin::TableSummary;
pub use dynamo::DynamoItemStore;
pub use error::StoreError;
pub use memory::MemoryItemStore;
pub use op::ItemKey;
pub use op::QuerySpec;
pub use op::TransactAction;
pub use op::UpdateAction;
pub use op::WriteCondition;

use awsprim_core::constants::MAX_TRANSACT_ACTIONS;
use awsprim_core::constants::MAX_TRANSACT_BYTES;

/// Typed driver contract over the item store.
#[async_trait]
pub trait ItemStore: Send + Sync {
    /// Put a whole item, optionally conditioned.
    async fn put(&self, record: ItemRecord, condition: WriteCondition) -> Result<(), StoreError>;

    /// Read one item. Expired items read as `None`.
    async fn get(&self, key: &ItemKey, consistent: bool) -> Result<Option<ItemRecord>, StoreError>;

    /// Apply an update, optionally conditioned. Returns the new item state.
    async fn update(
        &self,
        key: &ItemKey,
        update: UpdateAction,
        condition: WriteCondition,
    ) -> Result<ItemRecord, StoreError>;

    /// Delete one item, optionally conditioned.
    async fn delete(&self, key: &ItemKey, condition: WriteCondition) -> Result<(), StoreError>;

    /// Query a partition in sort-key order. Expired items are filtered out.
    async fn query(&self, spec: QuerySpec) -> Result<Vec<ItemRecord>, StoreError>;

    /// Count items under a partition / sort-key prefix (server-side count).
    async fn count(&self, partition_key: &str, sort_key_prefix: Option<&str>)
        -> Result<u64, StoreError>;

    /// Enumerate items of one type via the type index, newest first.
    async fn query_type_index(
        &self,
        item_type: ItemType,
        limit: Option<u32>,
    ) -> Result<Vec<ItemRecord>, StoreError>;

    /// Count items of one type via the type index.
    async fn count_type(&self, item_type: ItemType) -> Result<u64, StoreError>;

    /// Execute actions as a single all-or-nothing write.
    async fn transact_write(&self, actions: Vec<TransactAction>) -> Result<(), StoreError>;

    /// Read several items from a consistent snapshot.
    async fn transact_get(&self, keys: Vec<ItemKey>) -> Result<Vec<Option<ItemRecord>>, StoreError>;
}

/// Validate transactional-write limits before any network call.
///
/// At most 100 actions, at most 4 MB aggregate payload.
pub(crate) fn validate_transaction(actions: &[TransactAction]) -> Result<(), StoreError> {
    if actions.is_empty() {
        return Err(StoreError::InvalidRequest {
            message: "transaction requires at least one action".to_string(),
        });
    }
    if actions.len() > MAX_TRANSACT_ACTIONS {
        return Err(StoreError::InvalidRequest {
            message: format!(
                "transaction has {} actions; the maximum is {MAX_TRANSACT_ACTIONS}",
                actions.len()
            ),
        });
    }
    let total: usize = actions.iter().map(|a| a.payload_bytes()).sum();
    if total > MAX_TRANSACT_BYTES {
        return Err(StoreError::InvalidRequest {
            message: format!(
                "transaction payload is {total} bytes; the maximum is {MAX_TRANSACT_BYTES}"
            ),
        });
    }
    // The service rejects two actions on the same item; fail before the call.
    let mut seen = std::collections::HashSet::new();
    for action in actions {
        let key = action.key();
        if !seen.insert((key.partition_key.clone(), key.sort_key.clone())) {
            return Err(StoreError::InvalidRequest {
                message: format!(
                    "transaction targets item {}/{} more than once",
                    key.partition_key, key.sort_key
                ),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use awsprim_core::ItemRecord;

    use super::*;

    fn put_action(n: usize) -> TransactAction {
        TransactAction::Put {
            record: ItemRecord::new(format!("kv:k{n}"), format!("kv:k{n}"), "v".into(), ItemType::Kv),
            condition: WriteCondition::None,
        }
    }

    #[test]
    fn transaction_limits_are_enforced() {
        assert!(validate_transaction(&[]).is_err());

        let ok: Vec<_> = (0..100).map(put_action).collect();
        assert!(validate_transaction(&ok).is_ok());

        let too_many: Vec<_> = (0..101).map(put_action).collect();
        assert!(validate_transaction(&too_many).is_err());
    }

    #[test]
    fn duplicate_targets_are_rejected() {
        let twice = vec![put_action(1), put_action(1)];
        assert!(matches!(
            validate_transaction(&twice),
            Err(StoreError::InvalidRequest { .. })
        ));
    }

    #[test]
    fn oversized_payloads_are_rejected() {
        let big = TransactAction::Put {
            record: ItemRecord::new(
                "kv:big",
                "kv:big",
                serde_json::Value::String("x".repeat(5 * 1024 * 1024)),
                ItemType::Kv,
            ),
            condition: WriteCondition::None,
        };
        assert!(matches!(
            validate_transaction(&[big]),
            Err(StoreError::InvalidRequest { .. })
        ));
    }
}
