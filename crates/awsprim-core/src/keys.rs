//! Key encoding for the single-table layout.
//!
//! Every primitive shares one DynamoDB table. The encoder maps logical
//! `(namespace, name[, member/index])` tuples onto partition/sort key
//! strings deterministically:
//!
//! - singletons (kv, counter, lock, leader): `PK = SK = "<ns>:<name>"`
//! - set members: `SK = "set:<name>#<member>"`
//! - list elements: `SK = "list:<name>#<20-digit offset index>"`,
//!   header at `SK = "list:<name>:header"`
//! - queue messages: `SK = "queue:<name>#<priority:010>#<micros>#<uuid>"`,
//!   dedup companions at `SK = "queue:<name>:dedup#<id>"`
//!
//! `#` (0x23) sorts before `:` (0x3a), so member/message items always sort
//! ahead of header/dedup companions within the same partition and a prefix
//! query on `"<ns>:<name>#"` never picks up the companions.

use crate::constants::MAX_NAME_LEN;
use crate::constants::MAX_QUEUE_PRIORITY;
use crate::error::PrimitiveError;

/// Offset added to list indices before encoding so negative (prepend)
/// indices sort lexicographically before positive (append) ones.
const LIST_INDEX_OFFSET: i128 = 10_000_000_000_000_000_000; // 10^19

/// The reserved namespace set. Any other prefix is rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    Kv,
    Counter,
    Lock,
    Leader,
    Queue,
    Set,
    List,
}

impl Namespace {
    /// Wire prefix for this namespace.
    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Kv => "kv",
            Namespace::Counter => "counter",
            Namespace::Lock => "lock",
            Namespace::Leader => "leader",
            Namespace::Queue => "queue",
            Namespace::Set => "set",
            Namespace::List => "list",
        }
    }

    /// Parse a namespace prefix; unknown prefixes are rejected.
    pub fn parse(s: &str) -> Result<Self, PrimitiveError> {
        match s {
            "kv" => Ok(Namespace::Kv),
            "counter" => Ok(Namespace::Counter),
            "lock" => Ok(Namespace::Lock),
            "leader" => Ok(Namespace::Leader),
            "queue" => Ok(Namespace::Queue),
            "set" => Ok(Namespace::Set),
            "list" => Ok(Namespace::List),
            other => Err(PrimitiveError::invalid(
                format!("unknown namespace '{other}'"),
                "Use one of: kv, counter, lock, leader, queue, set, list.",
            )),
        }
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Validate a logical name: `[A-Za-z0-9_./-]{1,200}`.
pub fn validate_name(name: &str) -> Result<(), PrimitiveError> {
    if name.is_empty() || name.len() > MAX_NAME_LEN {
        return Err(PrimitiveError::invalid(
            format!("name must be 1-{MAX_NAME_LEN} characters, got {}", name.len()),
            "Shorten the name; only letters, digits, and _ . / - are allowed.",
        ));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '/' | '-')))
    {
        return Err(PrimitiveError::invalid(
            format!("name contains invalid character '{bad}'"),
            "Only letters, digits, and _ . / - are allowed in names.",
        ));
    }
    Ok(())
}

/// Partition key for a named collection or singleton: `"<ns>:<name>"`.
pub fn partition_key(ns: Namespace, name: &str) -> Result<String, PrimitiveError> {
    validate_name(name)?;
    Ok(format!("{}:{name}", ns.as_str()))
}

/// Singleton items use `SK = PK`.
pub fn singleton_sort_key(ns: Namespace, name: &str) -> Result<String, PrimitiveError> {
    partition_key(ns, name)
}

/// Sort key for a set member.
pub fn set_member_sort_key(name: &str, member: &str) -> Result<String, PrimitiveError> {
    validate_name(name)?;
    if member.is_empty() {
        return Err(PrimitiveError::invalid(
            "set member cannot be empty",
            "Provide a non-empty member value.",
        ));
    }
    Ok(format!("set:{name}#{member}"))
}

/// Extract the member back out of a set sort key.
pub fn set_member_from_sort_key<'a>(name: &str, sort_key: &'a str) -> Option<&'a str> {
    sort_key.strip_prefix(&format!("set:{name}#"))
}

/// Sort-key prefix matching every member of a set.
pub fn set_member_prefix(name: &str) -> String {
    format!("set:{name}#")
}

/// Sort key for a list element at a signed index.
pub fn list_element_sort_key(name: &str, index: i64) -> Result<String, PrimitiveError> {
    validate_name(name)?;
    let offset = LIST_INDEX_OFFSET + i128::from(index);
    Ok(format!("list:{name}#{offset:020}"))
}

/// Sort key for a list header item.
pub fn list_header_sort_key(name: &str) -> Result<String, PrimitiveError> {
    validate_name(name)?;
    Ok(format!("list:{name}:header"))
}

/// Sort-key prefix matching every element (but not the header) of a list.
pub fn list_element_prefix(name: &str) -> String {
    format!("list:{name}#")
}

/// Sort key for a queue message.
pub fn queue_message_sort_key(
    name: &str,
    priority: u64,
    timestamp_micros: u64,
    message_uuid: &str,
) -> Result<String, PrimitiveError> {
    validate_name(name)?;
    if priority > MAX_QUEUE_PRIORITY {
        return Err(PrimitiveError::invalid(
            format!("priority {priority} exceeds the maximum {MAX_QUEUE_PRIORITY}"),
            "Pick a priority between 0 and 9999999999; lower values dequeue first.",
        ));
    }
    Ok(format!("queue:{name}#{priority:010}#{timestamp_micros}#{message_uuid}"))
}

/// Sort-key prefix matching every message (but not dedup companions) of a queue.
pub fn queue_message_prefix(name: &str) -> String {
    format!("queue:{name}#")
}

/// Sort key for a queue dedup companion item.
pub fn queue_dedup_sort_key(name: &str, dedup_id: &str) -> Result<String, PrimitiveError> {
    validate_name(name)?;
    if dedup_id.is_empty() {
        return Err(PrimitiveError::invalid(
            "dedup id cannot be empty",
            "Provide a non-empty --dedup-id value.",
        ));
    }
    Ok(format!("queue:{name}:dedup#{dedup_id}"))
}

/// Split a formatted key into `(namespace, name)`.
pub fn parse_key(full_key: &str) -> Result<(Namespace, &str), PrimitiveError> {
    let (prefix, name) = full_key.split_once(':').ok_or_else(|| {
        PrimitiveError::invalid(
            format!("key '{full_key}' has no namespace prefix"),
            "Keys are formatted '<namespace>:<name>'.",
        )
    })?;
    Ok((Namespace::parse(prefix)?, name))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn singleton_keys_are_symmetric() {
        let pk = partition_key(Namespace::Kv, "deploy/flag").unwrap();
        let sk = singleton_sort_key(Namespace::Kv, "deploy/flag").unwrap();
        assert_eq!(pk, "kv:deploy/flag");
        assert_eq!(pk, sk);
    }

    #[test]
    fn names_are_validated() {
        assert!(partition_key(Namespace::Kv, "ok_name-1.2/x").is_ok());
        assert!(partition_key(Namespace::Kv, "").is_err());
        assert!(partition_key(Namespace::Kv, "has space").is_err());
        assert!(partition_key(Namespace::Kv, "has#hash").is_err());
        assert!(partition_key(Namespace::Kv, &"x".repeat(201)).is_err());
    }

    #[test]
    fn unknown_namespace_is_rejected() {
        assert!(Namespace::parse("cache").is_err());
        assert!(parse_key("cache:foo").is_err());
        let (ns, name) = parse_key("lock:build").unwrap();
        assert_eq!(ns, Namespace::Lock);
        assert_eq!(name, "build");
    }

    #[test]
    fn set_member_round_trips_with_hash_in_member() {
        let sk = set_member_sort_key("tags", "a#b").unwrap();
        assert_eq!(set_member_from_sort_key("tags", &sk), Some("a#b"));
    }

    #[test]
    fn list_indices_sort_by_position() {
        let before = list_element_sort_key("jobs", -2).unwrap();
        let head = list_element_sort_key("jobs", 0).unwrap();
        let after = list_element_sort_key("jobs", 3).unwrap();
        assert!(before < head);
        assert!(head < after);
        // Elements sort before the header item.
        assert!(after < list_header_sort_key("jobs").unwrap());
    }

    #[test]
    fn queue_sort_keys_order_by_priority_then_time() {
        let urgent = queue_message_sort_key("q", 1, 2_000, "b").unwrap();
        let early = queue_message_sort_key("q", 5, 1_000, "a").unwrap();
        let late = queue_message_sort_key("q", 5, 2_000, "a").unwrap();
        assert!(urgent < early);
        assert!(early < late);
        // Dedup companions sort after every message and outside the prefix.
        let dedup = queue_dedup_sort_key("q", "x").unwrap();
        assert!(late < dedup);
        assert!(!dedup.starts_with(&queue_message_prefix("q")));
    }

    #[test]
    fn priority_range_is_enforced() {
        assert!(queue_message_sort_key("q", MAX_QUEUE_PRIORITY, 0, "u").is_ok());
        assert!(queue_message_sort_key("q", MAX_QUEUE_PRIORITY + 1, 0, "u").is_err());
    }
}
