//! The transaction engine: a JSON-described batch executed as one
//! all-or-nothing write.
//!
//! Batches address singleton primitives (kv, counter, lock, leader) by
//! bare key; member-bearing namespaces have composite keys that a batch
//! entry cannot address and are rejected up front. On a condition failure
//! nothing is mutated and the error names each failed action's index.

use std::collections::HashSet;
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
use awsprim_store::TransactAction;
use awsprim_store::UpdateAction;
use awsprim_store::WriteCondition;
use serde::Deserialize;
use serde::Serialize;

use crate::fault;

/// A parsed transaction batch.
#[derive(Debug, Clone, Deserialize)]
pub struct TransactionBatch {
    pub operations: Vec<OperationSpec>,
}

/// One operation in a batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OperationSpec {
    /// `put`, `update`, `delete`, or `condition-check`.
    pub action: ActionKind,
    /// Target namespace (singletons only).
    #[serde(rename = "type")]
    pub namespace: String,
    /// Bare key within the namespace.
    pub key: String,
    /// Value for put / update.
    #[serde(default)]
    pub value: Option<serde_json::Value>,
    /// Atomic-add amount for counter updates.
    #[serde(default)]
    pub amount: Option<i64>,
    /// Relative TTL in seconds for put.
    #[serde(default)]
    pub ttl: Option<u64>,
    /// Optional condition.
    #[serde(default)]
    pub condition: Option<ConditionSpec>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionKind {
    Put,
    Update,
    Delete,
    ConditionCheck,
}

/// Condition forms accepted in batch JSON: `"absent"`, `"exists"`, or
/// `{"value-equals": <value>}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ConditionSpec {
    Named(String),
    ValueEquals {
        #[serde(rename = "value-equals")]
        value_equals: serde_json::Value,
    },
}

/// Batch outcome.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionResult {
    pub success: bool,
    pub operations_count: usize,
    pub timestamp: u64,
}

/// Transaction engine.
pub struct TransactionOps<S: ItemStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ItemStore + ?Sized> TransactionOps<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Parse a batch from JSON text.
    pub fn parse(text: &str) -> Result<TransactionBatch, PrimitiveError> {
        serde_json::from_str(text).map_err(|e| {
            PrimitiveError::invalid(
                format!("malformed transaction JSON: {e}"),
                "Provide {\"operations\": [{\"action\": ..., \"type\": ..., \"key\": ...}, ...]}.",
            )
        })
    }

    /// Validate and execute a batch atomically.
    pub async fn execute(&self, batch: TransactionBatch) -> Result<TransactionResult, PrimitiveError> {
        let actions = build_actions(&batch)?;
        let count = actions.len();

        match self.store.transact_write(actions).await {
            Ok(()) => Ok(TransactionResult {
                success: true,
                operations_count: count,
                timestamp: now_unix_secs(),
            }),
            Err(StoreError::TransactionCanceled { reasons }) => {
                let failed: Vec<String> = reasons
                    .iter()
                    .filter(|reason| !reason.ends_with("None"))
                    .cloned()
                    .collect();
                Err(PrimitiveError::ConditionFailed {
                    message: format!(
                        "transaction canceled; failed actions: {}",
                        if failed.is_empty() { reasons.join(", ") } else { failed.join(", ") }
                    ),
                    solution: "No item was mutated. Fix the failing conditions and re-run the batch."
                        .to_string(),
                })
            }
            Err(e) => Err(fault(e)),
        }
    }
}

fn build_actions(batch: &TransactionBatch) -> Result<Vec<TransactAction>, PrimitiveError> {
    if batch.operations.is_empty() {
        return Err(PrimitiveError::invalid(
            "transaction requires at least one operation",
            "Add operations to the batch.",
        ));
    }

    let mut seen: HashSet<String> = HashSet::new();
    let mut actions = Vec::with_capacity(batch.operations.len());

    for (index, op) in batch.operations.iter().enumerate() {
        let namespace = Namespace::parse(&op.namespace)
            .map_err(|e| at_index(index, e))?;
        if matches!(namespace, Namespace::Queue | Namespace::Set | Namespace::List) {
            return Err(PrimitiveError::invalid(
                format!(
                    "operation {index}: namespace '{namespace}' has composite keys and cannot be addressed in a batch"
                ),
                "Batches support kv, counter, lock, and leader targets.",
            ));
        }

        let partition_key =
            keys::partition_key(namespace, &op.key).map_err(|e| at_index(index, e))?;
        if !seen.insert(partition_key.clone()) {
            return Err(PrimitiveError::invalid(
                format!("operation {index}: duplicate target '{partition_key}'"),
                "A transaction may touch each item at most once.",
            ));
        }
        let key = ItemKey::singleton(partition_key);
        let condition = convert_condition(index, op.condition.as_ref())?;
        let item_type = namespace_item_type(namespace);

        let action = match op.action {
            ActionKind::Put => {
                let value = op.value.clone().ok_or_else(|| {
                    PrimitiveError::invalid(
                        format!("operation {index}: put requires a value"),
                        "Add a \"value\" field to the operation.",
                    )
                })?;
                let mut record = ItemRecord::new(
                    key.partition_key.clone(),
                    key.sort_key.clone(),
                    value,
                    item_type,
                );
                if let Some(ttl) = op.ttl {
                    record = record.with_ttl_in(ttl);
                }
                TransactAction::Put { record, condition }
            }
            ActionKind::Update => {
                let update = match (op.amount, &op.value) {
                    (Some(amount), None) => {
                        if namespace != Namespace::Counter {
                            return Err(PrimitiveError::invalid(
                                format!("operation {index}: 'amount' only applies to counters"),
                                "Use \"value\" for non-counter updates.",
                            ));
                        }
                        UpdateAction::Increment { by: amount, item_type }
                    }
                    (None, Some(value)) => UpdateAction::SetValue {
                        value: value.clone(),
                        item_type,
                    },
                    _ => {
                        return Err(PrimitiveError::invalid(
                            format!(
                                "operation {index}: update requires exactly one of 'value' or 'amount'"
                            ),
                            "Counters take \"amount\"; everything else takes \"value\".",
                        ))
                    }
                };
                TransactAction::Update { key, update, condition }
            }
            ActionKind::Delete => TransactAction::Delete { key, condition },
            ActionKind::ConditionCheck => {
                if matches!(condition, WriteCondition::None) {
                    return Err(PrimitiveError::invalid(
                        format!("operation {index}: condition-check requires a condition"),
                        "Add \"condition\": \"exists\", \"absent\", or {\"value-equals\": ...}.",
                    ));
                }
                TransactAction::ConditionCheck { key, condition }
            }
        };
        actions.push(action);
    }

    Ok(actions)
}

fn namespace_item_type(namespace: Namespace) -> ItemType {
    match namespace {
        Namespace::Kv => ItemType::Kv,
        Namespace::Counter => ItemType::Counter,
        Namespace::Lock => ItemType::Lock,
        Namespace::Leader => ItemType::Leader,
        Namespace::Queue => ItemType::Queue,
        Namespace::Set => ItemType::Set,
        Namespace::List => ItemType::List,
    }
}

fn convert_condition(
    index: usize,
    spec: Option<&ConditionSpec>,
) -> Result<WriteCondition, PrimitiveError> {
    match spec {
        None => Ok(WriteCondition::None),
        Some(ConditionSpec::Named(name)) => match name.as_str() {
            "absent" => Ok(WriteCondition::Absent),
            "exists" => Ok(WriteCondition::Exists),
            other => Err(PrimitiveError::invalid(
                format!("operation {index}: unknown condition '{other}'"),
                "Conditions are \"absent\", \"exists\", or {\"value-equals\": ...}.",
            )),
        },
        Some(ConditionSpec::ValueEquals { value_equals }) => {
            Ok(WriteCondition::ValueEquals(value_equals.clone()))
        }
    }
}

fn at_index(index: usize, err: PrimitiveError) -> PrimitiveError {
    PrimitiveError::invalid(
        format!("operation {index}: {err}"),
        "Fix the operation and re-run the batch.",
    )
}

#[cfg(test)]
mod tests {
    use awsprim_store::MemoryItemStore;

    use super::*;
    use crate::CounterOps;
    use crate::KvOps;

    fn batch(json: serde_json::Value) -> TransactionBatch {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test]
    async fn mixed_batch_applies_atomically() {
        let store = Arc::new(MemoryItemStore::new());
        let txn = TransactionOps::new(store.clone());
        let kv = KvOps::new(store.clone());
        let counters = CounterOps::new(store.clone());

        let result = txn
            .execute(batch(serde_json::json!({"operations": [
                {"action": "put", "type": "kv", "key": "config", "value": "v1", "condition": "absent"},
                {"action": "update", "type": "counter", "key": "deploys", "amount": 1},
            ]})))
            .await
            .unwrap();
        assert!(result.success);
        assert_eq!(result.operations_count, 2);

        assert_eq!(kv.get("config", None).await.unwrap().value, serde_json::json!("v1"));
        assert_eq!(counters.get("deploys").await.unwrap().value, 1);
    }

    #[tokio::test]
    async fn one_failed_condition_rolls_back_everything() {
        let store = Arc::new(MemoryItemStore::new());
        let txn = TransactionOps::new(store.clone());
        let kv = KvOps::new(store.clone());
        kv.set("taken", "x".into(), None, false).await.unwrap();

        let err = txn
            .execute(batch(serde_json::json!({"operations": [
                {"action": "update", "type": "counter", "key": "n", "amount": 5},
                {"action": "put", "type": "kv", "key": "taken", "value": "y", "condition": "absent"},
            ]})))
            .await
            .unwrap_err();
        match &err {
            PrimitiveError::ConditionFailed { message, .. } => {
                assert!(message.contains("action 1"));
            }
            other => panic!("unexpected error: {other}"),
        }

        // The counter increment did not happen.
        let counters = CounterOps::new(store);
        assert!(counters.get("n").await.is_err());
    }

    #[tokio::test]
    async fn condition_check_gates_without_mutating() {
        let store = Arc::new(MemoryItemStore::new());
        let txn = TransactionOps::new(store.clone());
        let kv = KvOps::new(store.clone());
        kv.set("flag", "ready".into(), None, false).await.unwrap();

        txn.execute(batch(serde_json::json!({"operations": [
            {"action": "condition-check", "type": "kv", "key": "flag", "condition": {"value-equals": "ready"}},
            {"action": "put", "type": "kv", "key": "out", "value": "go"},
        ]})))
        .await
        .unwrap();

        let err = txn
            .execute(batch(serde_json::json!({"operations": [
                {"action": "condition-check", "type": "kv", "key": "flag", "condition": {"value-equals": "stopped"}},
                {"action": "put", "type": "kv", "key": "out2", "value": "go"},
            ]})))
            .await
            .unwrap_err();
        assert!(matches!(err, PrimitiveError::ConditionFailed { .. }));
        assert!(!kv.exists("out2").await.unwrap());
    }

    #[tokio::test]
    async fn validation_rejects_bad_batches() {
        let store = Arc::new(MemoryItemStore::new());
        let txn = TransactionOps::new(store);

        // Member namespaces are unaddressable.
        let err = txn
            .execute(batch(serde_json::json!({"operations": [
                {"action": "put", "type": "set", "key": "s", "value": "x"},
            ]})))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);

        // Duplicate targets.
        let err = txn
            .execute(batch(serde_json::json!({"operations": [
                {"action": "put", "type": "kv", "key": "a", "value": "1"},
                {"action": "delete", "type": "kv", "key": "a"},
            ]})))
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);

        // Empty batch.
        let err = txn
            .execute(TransactionBatch { operations: vec![] })
            .await
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn parse_reports_malformed_json() {
        assert!(TransactionOps::<MemoryItemStore>::parse("{not json").is_err());
        assert!(TransactionOps::<MemoryItemStore>::parse(
            r#"{"operations": [{"action": "put", "type": "kv", "key": "k", "value": "v"}]}"#
        )
        .is_ok());
    }
}
