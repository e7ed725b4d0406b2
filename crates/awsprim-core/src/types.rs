//! Typed item records as stored in the item store.
//!
//! The driver decodes every attribute map at the boundary; nothing above it
//! sees untyped maps.

use std::time::SystemTime;
use std::time::UNIX_EPOCH;

use serde::Deserialize;
use serde::Serialize;

/// Discriminator for the kind of item stored in the shared table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemType {
    Kv,
    Counter,
    Lock,
    Leader,
    Queue,
    Set,
    List,
}

impl ItemType {
    /// Wire value of the `type` attribute.
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Kv => "kv",
            ItemType::Counter => "counter",
            ItemType::Lock => "lock",
            ItemType::Leader => "leader",
            ItemType::Queue => "queue",
            ItemType::Set => "set",
            ItemType::List => "list",
        }
    }

    /// Parse the wire value of the `type` attribute.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "kv" => Some(ItemType::Kv),
            "counter" => Some(ItemType::Counter),
            "lock" => Some(ItemType::Lock),
            "leader" => Some(ItemType::Leader),
            "queue" => Some(ItemType::Queue),
            "set" => Some(ItemType::Set),
            "list" => Some(ItemType::List),
            _ => None,
        }
    }

    /// All item types, for cross-collection enumeration.
    pub fn all() -> [ItemType; 7] {
        [
            ItemType::Kv,
            ItemType::Counter,
            ItemType::Lock,
            ItemType::Leader,
            ItemType::Queue,
            ItemType::Set,
            ItemType::List,
        ]
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Primitive-specific metadata attached to an item.
///
/// One struct with optional fields rather than per-primitive types so the
/// driver can decode the `metadata` attribute without knowing which
/// primitive wrote it. Absent fields are omitted on the wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ItemMetadata {
    /// Lock owner identity.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    /// Lock acquisition time, Unix microseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acquired_at: Option<u64>,
    /// Leader election time, Unix seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub elected_at: Option<u64>,
    /// Queue message priority (lower dequeues first).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub priority: Option<u64>,
    /// Queue message enqueue time, Unix microseconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp_micros: Option<u64>,
    /// Queue message tie-breaker UUID.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_uuid: Option<String>,
    /// Queue message dedup id, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_id: Option<String>,
    /// Queue message visibility deadline, Unix seconds. Present only while
    /// a consumer holds the message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility_deadline: Option<u64>,
    /// List header: index of the current head element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub head_index: Option<i64>,
    /// List header: index one past the current tail element.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tail_index: Option<i64>,
}

impl ItemMetadata {
    /// True when no field is populated; such metadata is omitted on the wire.
    pub fn is_empty(&self) -> bool {
        *self == ItemMetadata::default()
    }
}

/// One decoded item from the shared table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemRecord {
    /// Partition key: `"<namespace>:<name>"`.
    pub partition_key: String,
    /// Sort key; equals the partition key for singletons.
    pub sort_key: String,
    /// Stored value: scalar, number, or structured payload.
    pub value: serde_json::Value,
    /// Item kind discriminator.
    pub item_type: ItemType,
    /// Absolute expiry, Unix seconds. Expired items read as absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ttl: Option<u64>,
    /// Primitive-specific metadata.
    #[serde(default, skip_serializing_if = "ItemMetadata::is_empty")]
    pub metadata: ItemMetadata,
    /// Creation time, Unix seconds.
    pub created_at: u64,
    /// Last mutation time, Unix seconds.
    pub updated_at: u64,
    /// Optimistic-lock counter, incremented by claim-style updates.
    pub version: u64,
}

impl ItemRecord {
    /// Build a fresh record stamped with the current time.
    pub fn new(
        partition_key: impl Into<String>,
        sort_key: impl Into<String>,
        value: serde_json::Value,
        item_type: ItemType,
    ) -> Self {
        let now = now_unix_secs();
        Self {
            partition_key: partition_key.into(),
            sort_key: sort_key.into(),
            value,
            item_type,
            ttl: None,
            metadata: ItemMetadata::default(),
            created_at: now,
            updated_at: now,
            version: 1,
        }
    }

    /// Set an absolute TTL from a relative window.
    pub fn with_ttl_in(mut self, seconds: u64) -> Self {
        self.ttl = Some(now_unix_secs() + seconds);
        self
    }

    /// Attach metadata.
    pub fn with_metadata(mut self, metadata: ItemMetadata) -> Self {
        self.metadata = metadata;
        self
    }

    /// True when the record's TTL has elapsed at `now`.
    pub fn is_expired_at(&self, now: u64) -> bool {
        matches!(self.ttl, Some(ttl) if ttl <= now)
    }

    /// The stored value as a string, when it is one.
    pub fn value_str(&self) -> Option<&str> {
        self.value.as_str()
    }

    /// The stored value as a signed integer, when it is one.
    pub fn value_i64(&self) -> Option<i64> {
        self.value.as_i64()
    }
}

/// Current Unix time in whole seconds.
pub fn now_unix_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Current Unix time in microseconds.
pub fn now_unix_micros() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ttl_expiry_is_inclusive() {
        let mut record = ItemRecord::new("kv:a", "kv:a", "v".into(), ItemType::Kv);
        assert!(!record.is_expired_at(now_unix_secs()));
        record.ttl = Some(100);
        assert!(record.is_expired_at(100));
        assert!(record.is_expired_at(101));
        assert!(!record.is_expired_at(99));
    }

    #[test]
    fn empty_metadata_is_skipped_on_the_wire() {
        let record = ItemRecord::new("kv:a", "kv:a", "v".into(), ItemType::Kv);
        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("metadata").is_none());
        assert!(json.get("ttl").is_none());
    }

    #[test]
    fn item_type_round_trips() {
        for t in ItemType::all() {
            assert_eq!(ItemType::parse(t.as_str()), Some(t));
        }
        assert_eq!(ItemType::parse("blob"), None);
    }
}
