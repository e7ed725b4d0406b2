//! Sets: each member is its own item under the set's partition.

use std::sync::Arc;

use awsprim_core::keys;
use awsprim_core::ItemRecord;
use awsprim_core::ItemType;
use awsprim_core::Namespace;
use awsprim_core::PrimitiveError;
use awsprim_store::ItemKey;
use awsprim_store::ItemStore;
use awsprim_store::QuerySpec;
use awsprim_store::WriteCondition;
use serde::Serialize;

use crate::fault;

/// Members of a set.
#[derive(Debug, Clone, Serialize)]
pub struct SetMembers {
    pub set: String,
    pub members: Vec<String>,
    pub count: usize,
}

/// Set primitive. `add` and `rem` are idempotent.
pub struct SetOps<S: ItemStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ItemStore + ?Sized> SetOps<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn member_key(&self, set: &str, member: &str) -> Result<ItemKey, PrimitiveError> {
        Ok(ItemKey::new(
            keys::partition_key(Namespace::Set, set)?,
            keys::set_member_sort_key(set, member)?,
        ))
    }

    /// Add a member. Re-adding an existing member overwrites the same item.
    pub async fn add(&self, set: &str, member: &str) -> Result<(), PrimitiveError> {
        let key = self.member_key(set, member)?;
        let record = ItemRecord::new(
            key.partition_key.clone(),
            key.sort_key.clone(),
            member.into(),
            ItemType::Set,
        );
        self.store.put(record, WriteCondition::None).await.map_err(fault)
    }

    /// Remove a member. Removing an absent member succeeds.
    pub async fn remove(&self, set: &str, member: &str) -> Result<(), PrimitiveError> {
        let key = self.member_key(set, member)?;
        self.store.delete(&key, WriteCondition::None).await.map_err(fault)
    }

    /// Membership probe: one point read.
    pub async fn contains(&self, set: &str, member: &str) -> Result<bool, PrimitiveError> {
        let key = self.member_key(set, member)?;
        Ok(self.store.get(&key, false).await.map_err(fault)?.is_some())
    }

    /// All members, in sort order.
    pub async fn members(&self, set: &str) -> Result<SetMembers, PrimitiveError> {
        let partition_key = keys::partition_key(Namespace::Set, set)?;
        let records = self
            .store
            .query(QuerySpec::partition(partition_key).with_prefix(keys::set_member_prefix(set)))
            .await
            .map_err(fault)?;

        let members: Vec<String> = records
            .iter()
            .filter_map(|record| keys::set_member_from_sort_key(set, &record.sort_key))
            .map(str::to_string)
            .collect();
        Ok(SetMembers {
            set: set.to_string(),
            count: members.len(),
            members,
        })
    }

    /// Cardinality via a server-side count.
    pub async fn card(&self, set: &str) -> Result<u64, PrimitiveError> {
        let partition_key = keys::partition_key(Namespace::Set, set)?;
        self.store
            .count(&partition_key, Some(&keys::set_member_prefix(set)))
            .await
            .map_err(fault)
    }
}

#[cfg(test)]
mod tests {
    use awsprim_store::MemoryItemStore;

    use super::*;

    fn ops() -> SetOps<MemoryItemStore> {
        SetOps::new(Arc::new(MemoryItemStore::new()))
    }

    #[tokio::test]
    async fn add_is_idempotent() {
        let sets = ops();
        for _ in 0..3 {
            sets.add("tags", "release").await.unwrap();
        }
        assert!(sets.contains("tags", "release").await.unwrap());
        assert_eq!(sets.card("tags").await.unwrap(), 1);
    }

    #[tokio::test]
    async fn cardinality_counts_distinct_members() {
        let sets = ops();
        sets.add("tags", "a").await.unwrap();
        sets.add("tags", "b").await.unwrap();
        sets.add("tags", "a").await.unwrap();
        assert_eq!(sets.card("tags").await.unwrap(), 2);

        let members = sets.members("tags").await.unwrap();
        assert_eq!(members.members, vec!["a", "b"]);
        assert_eq!(members.count, 2);
    }

    #[tokio::test]
    async fn remove_is_idempotent() {
        let sets = ops();
        sets.add("tags", "x").await.unwrap();
        sets.remove("tags", "x").await.unwrap();
        sets.remove("tags", "x").await.unwrap();
        assert!(!sets.contains("tags", "x").await.unwrap());
        assert_eq!(sets.card("tags").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn sets_are_isolated_from_each_other() {
        let sets = ops();
        sets.add("a", "member").await.unwrap();
        assert!(!sets.contains("b", "member").await.unwrap());
        assert_eq!(sets.card("b").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn members_with_hash_characters_survive() {
        let sets = ops();
        sets.add("tags", "a#b#c").await.unwrap();
        assert!(sets.contains("tags", "a#b#c").await.unwrap());
        let members = sets.members("tags").await.unwrap();
        assert_eq!(members.members, vec!["a#b#c"]);
    }
}
