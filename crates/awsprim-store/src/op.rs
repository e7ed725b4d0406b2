//! Typed operation descriptions for the item-store driver.
//!
//! Primitives describe conditions and updates with these enums; each driver
//! renders them to its own wire form (condition expressions for DynamoDB,
//! direct evaluation for the in-memory store). Expression strings never
//! appear above the driver boundary.

use awsprim_core::ItemMetadata;
use awsprim_core::ItemType;

/// Full key of one item.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ItemKey {
    pub partition_key: String,
    pub sort_key: String,
}

impl ItemKey {
    pub fn new(partition_key: impl Into<String>, sort_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
        }
    }

    /// Key of a singleton item (`SK = PK`).
    pub fn singleton(partition_key: impl Into<String>) -> Self {
        let pk = partition_key.into();
        Self {
            sort_key: pk.clone(),
            partition_key: pk,
        }
    }
}

/// Condition attached to a write.
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCondition {
    /// Unconditional.
    None,
    /// The item must not exist.
    Absent,
    /// The item must exist.
    Exists,
    /// The stored `value` must equal the given value.
    ValueEquals(serde_json::Value),
    /// The item is absent, or its stored `value` equals the given value.
    AbsentOrValueEquals(serde_json::Value),
    /// The item is absent, or its TTL elapsed before `now`.
    AbsentOrExpired { now: u64 },
    /// The item is absent, its `value` matches, or its TTL elapsed.
    AbsentOrValueEqualsOrExpired { value: serde_json::Value, now: u64 },
    /// The stored `value` matches and the TTL has not elapsed. Used where
    /// an expired item must read as gone (leader heartbeat, lock extend).
    ValueEqualsAndNotExpired { value: serde_json::Value, now: u64 },
    /// The stored `version` matches exactly (optimistic CAS).
    VersionEquals(u64),
    /// The item exists and its visibility deadline is exactly the observed
    /// one (`None` = no deadline attribute present).
    VisibilityUnchanged { observed: Option<u64> },
}

/// Mutation applied by an update.
///
/// Every action also stamps `updated_at`; actions that can create the item
/// (`Increment`, `Claim`, `SetValue`) preserve `created_at` on an existing
/// item and bump `version`.
#[derive(Debug, Clone, PartialEq)]
pub enum UpdateAction {
    /// Atomic numeric add on `value`; creates the item when the condition
    /// allows, stamping `type` on first write.
    Increment { by: i64, item_type: ItemType },
    /// Replace the TTL with a new absolute expiry.
    ExtendTtl { expires_at: u64 },
    /// Set the visibility deadline inside `metadata`.
    SetVisibility { deadline: u64 },
    /// Upsert value/ttl/metadata/type, preserving `created_at` and
    /// incrementing `version`. Used where a monotonic version matters
    /// (lock acquisition, leader election).
    Claim {
        value: serde_json::Value,
        item_type: ItemType,
        ttl: Option<u64>,
        metadata: ItemMetadata,
    },
    /// Replace the stored value.
    SetValue {
        value: serde_json::Value,
        item_type: ItemType,
    },
}

/// One action inside a transactional write.
#[derive(Debug, Clone, PartialEq)]
pub enum TransactAction {
    Put {
        record: awsprim_core::ItemRecord,
        condition: WriteCondition,
    },
    Update {
        key: ItemKey,
        update: UpdateAction,
        condition: WriteCondition,
    },
    Delete {
        key: ItemKey,
        condition: WriteCondition,
    },
    ConditionCheck {
        key: ItemKey,
        condition: WriteCondition,
    },
}

impl TransactAction {
    /// The key this action targets.
    pub fn key(&self) -> ItemKey {
        match self {
            TransactAction::Put { record, .. } => {
                ItemKey::new(record.partition_key.clone(), record.sort_key.clone())
            }
            TransactAction::Update { key, .. }
            | TransactAction::Delete { key, .. }
            | TransactAction::ConditionCheck { key, .. } => key.clone(),
        }
    }

    /// Rough payload size used for the aggregate transaction limit.
    pub fn payload_bytes(&self) -> usize {
        match self {
            TransactAction::Put { record, .. } => serde_json::to_vec(record)
                .map(|v| v.len())
                .unwrap_or_default(),
            TransactAction::Update { key, update, .. } => {
                let update_bytes = match update {
                    UpdateAction::Claim { value, metadata, .. } => {
                        serde_json::to_vec(value).map(|v| v.len()).unwrap_or_default()
                            + serde_json::to_vec(metadata).map(|v| v.len()).unwrap_or_default()
                    }
                    UpdateAction::SetValue { value, .. } => {
                        serde_json::to_vec(value).map(|v| v.len()).unwrap_or_default()
                    }
                    _ => 16,
                };
                key.partition_key.len() + key.sort_key.len() + update_bytes
            }
            TransactAction::Delete { key, .. } | TransactAction::ConditionCheck { key, .. } => {
                key.partition_key.len() + key.sort_key.len()
            }
        }
    }
}

/// Parameters of a partition query.
#[derive(Debug, Clone)]
pub struct QuerySpec {
    /// Partition to read.
    pub partition_key: String,
    /// Optional `begins_with` constraint on the sort key.
    pub sort_key_prefix: Option<String>,
    /// Sort-key order.
    pub ascending: bool,
    /// Maximum items to return after TTL filtering.
    pub limit: Option<u32>,
    /// Strongly consistent read.
    pub consistent: bool,
}

impl QuerySpec {
    /// Ascending, eventually consistent query over a whole partition.
    pub fn partition(partition_key: impl Into<String>) -> Self {
        Self {
            partition_key: partition_key.into(),
            sort_key_prefix: None,
            ascending: true,
            limit: None,
            consistent: false,
        }
    }

    pub fn with_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.sort_key_prefix = Some(prefix.into());
        self
    }

    pub fn with_limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn descending(mut self) -> Self {
        self.ascending = false;
        self
    }

    pub fn consistent(mut self) -> Self {
        self.consistent = true;
        self
    }
}
