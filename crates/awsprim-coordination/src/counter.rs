//! Atomic counters.
//!
//! Increments translate to a single atomic-add update on the store, so
//! concurrent callers always produce the correct cumulative sum.

use std::sync::Arc;

use awsprim_core::keys;
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

/// Counter state after an operation.
#[derive(Debug, Clone, Serialize)]
pub struct CounterValue {
    pub key: String,
    pub value: i64,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub updated_at: u64,
}

/// Atomic counter primitive.
pub struct CounterOps<S: ItemStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ItemStore + ?Sized> CounterOps<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn key(&self, key: &str) -> Result<ItemKey, PrimitiveError> {
        Ok(ItemKey::singleton(keys::partition_key(Namespace::Counter, key)?))
    }

    /// Add `by` (any non-zero integer) to the counter.
    ///
    /// With `create` the counter springs into existence at `by`; without it
    /// the counter must already exist.
    pub async fn increment(
        &self,
        key: &str,
        by: i64,
        create: bool,
    ) -> Result<CounterValue, PrimitiveError> {
        if by == 0 {
            return Err(PrimitiveError::invalid(
                "increment amount cannot be zero",
                "Pass a non-zero --by value.",
            ));
        }
        let item_key = self.key(key)?;
        let condition = if create {
            WriteCondition::None
        } else {
            WriteCondition::Exists
        };

        match self
            .store
            .update(
                &item_key,
                UpdateAction::Increment { by, item_type: ItemType::Counter },
                condition,
            )
            .await
        {
            Ok(record) => {
                let value = record.value_i64().ok_or_else(|| PrimitiveError::Service {
                    message: format!("counter '{key}' holds a non-numeric value"),
                })?;
                debug!(key, by, value, "counter updated");
                Ok(CounterValue {
                    key: key.to_string(),
                    value,
                    item_type: ItemType::Counter,
                    updated_at: record.updated_at,
                })
            }
            Err(StoreError::Conflict { .. }) => Err(PrimitiveError::NotFound {
                message: format!("counter '{key}' does not exist"),
                solution: format!("Initialize it with 'awsprim counter inc {key} --create'."),
            }),
            Err(e) => Err(fault(e)),
        }
    }

    /// Subtract `by` from the counter (sugar for a negated increment).
    pub async fn decrement(
        &self,
        key: &str,
        by: i64,
        create: bool,
    ) -> Result<CounterValue, PrimitiveError> {
        self.increment(key, -by, create).await
    }

    /// Read the counter strictly-consistently.
    pub async fn get(&self, key: &str) -> Result<CounterValue, PrimitiveError> {
        let item_key = self.key(key)?;
        match self.store.get(&item_key, true).await.map_err(fault)? {
            Some(record) => {
                let value = record.value_i64().ok_or_else(|| PrimitiveError::Service {
                    message: format!("counter '{key}' holds a non-numeric value"),
                })?;
                Ok(CounterValue {
                    key: key.to_string(),
                    value,
                    item_type: ItemType::Counter,
                    updated_at: record.updated_at,
                })
            }
            None => Err(PrimitiveError::NotFound {
                message: format!("counter '{key}' not found"),
                solution: format!("Create it with 'awsprim counter inc {key} --create'."),
            }),
        }
    }

    /// Remove the counter.
    pub async fn delete(&self, key: &str) -> Result<(), PrimitiveError> {
        let item_key = self.key(key)?;
        self.store
            .delete(&item_key, WriteCondition::None)
            .await
            .map_err(fault)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use awsprim_store::MemoryItemStore;

    fn ops() -> CounterOps<MemoryItemStore> {
        CounterOps::new(Arc::new(MemoryItemStore::new()))
    }

    #[tokio::test]
    async fn create_flag_controls_existence() {
        let counters = ops();

        let err = counters.increment("missing", 1, false).await.unwrap_err();
        assert!(matches!(err, PrimitiveError::NotFound { .. }));

        let created = counters.increment("missing", 3, true).await.unwrap();
        assert_eq!(created.value, 3);

        // Now present, so the flag is no longer required.
        let bumped = counters.increment("missing", 2, false).await.unwrap();
        assert_eq!(bumped.value, 5);
    }

    #[tokio::test]
    async fn decrement_is_negated_increment() {
        let counters = ops();
        counters.increment("c", 10, true).await.unwrap();
        let after = counters.decrement("c", 4, false).await.unwrap();
        assert_eq!(after.value, 6);
        // Counters may go negative.
        let negative = counters.decrement("c", 10, false).await.unwrap();
        assert_eq!(negative.value, -4);
    }

    #[tokio::test]
    async fn zero_increment_is_rejected() {
        let counters = ops();
        let err = counters.increment("c", 0, true).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn concurrent_increments_sum_correctly() {
        let counters = Arc::new(ops());
        counters.increment("shared", 1, true).await.unwrap();

        let mut tasks = Vec::new();
        for _ in 0..50 {
            let c = counters.clone();
            tasks.push(tokio::spawn(async move { c.increment("shared", 1, false).await }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(counters.get("shared").await.unwrap().value, 51);
    }

    #[tokio::test]
    async fn delete_then_get_reports_not_found() {
        let counters = ops();
        counters.increment("gone", 1, true).await.unwrap();
        counters.delete("gone").await.unwrap();
        assert!(counters.get("gone").await.is_err());
    }
}
