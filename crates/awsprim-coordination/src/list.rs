//! Lists with stable indices and transactional head/tail counters.
//!
//! A list is a header item plus one item per element. The header's
//! metadata carries `head_index` (index of the first element) and
//! `tail_index` (one past the last); the list is empty when they are
//! equal. Every push and pop is a two-item transaction: the element write
//! and a header update CASed on the header version observed beforehand, so
//! concurrent pushes serialize instead of corrupting the counters.
//! Elements encode their index into the sort key with a fixed offset so
//! prepend indices (negative) sort before append indices.

use std::sync::Arc;

use awsprim_core::keys;
use awsprim_core::ItemMetadata;
use awsprim_core::ItemRecord;
use awsprim_core::ItemType;
use awsprim_core::Namespace;
use awsprim_core::PrimitiveError;
use awsprim_store::ItemKey;
use awsprim_store::ItemStore;
use awsprim_store::QuerySpec;
use awsprim_store::StoreError;
use awsprim_store::TransactAction;
use awsprim_store::UpdateAction;
use awsprim_store::WriteCondition;
use serde::Serialize;
use tracing::debug;

use crate::fault;

/// Bounded retries for header CAS races. Each lost attempt implies another
/// writer committed, so this bounds tolerated concurrent writers.
const HEADER_CAS_ATTEMPTS: u32 = 10;

/// Which end an element entered or left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ListEnd {
    Head,
    Tail,
}

/// Result of a push or pop.
#[derive(Debug, Clone, Serialize)]
pub struct ListElement {
    pub list: String,
    pub value: serde_json::Value,
    pub position: ListEnd,
    /// Stable element index (negative for prepended elements).
    pub index: i64,
}

/// A slice of a list.
#[derive(Debug, Clone, Serialize)]
pub struct ListRange {
    pub list: String,
    pub start: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<i64>,
    pub count: usize,
    pub items: Vec<serde_json::Value>,
}

#[derive(Debug, Clone, Copy)]
struct Header {
    head: i64,
    tail: i64,
    version: Option<u64>,
}

impl Header {
    fn len(&self) -> i64 {
        self.tail - self.head
    }
}

/// List primitive.
pub struct ListOps<S: ItemStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ItemStore + ?Sized> ListOps<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    fn header_key(&self, list: &str) -> Result<ItemKey, PrimitiveError> {
        Ok(ItemKey::new(
            keys::partition_key(Namespace::List, list)?,
            keys::list_header_sort_key(list)?,
        ))
    }

    async fn read_header(&self, list: &str) -> Result<Header, PrimitiveError> {
        let key = self.header_key(list)?;
        match self.store.get(&key, true).await.map_err(fault)? {
            Some(record) => Ok(Header {
                head: record.metadata.head_index.unwrap_or(0),
                tail: record.metadata.tail_index.unwrap_or(0),
                version: Some(record.version),
            }),
            None => Ok(Header {
                head: 0,
                tail: 0,
                version: None,
            }),
        }
    }

    /// Header mutation as one transact action: a version-CAS update when
    /// the header exists, a conditional create otherwise.
    fn header_action(
        &self,
        list: &str,
        observed: &Header,
        new_head: i64,
        new_tail: i64,
    ) -> Result<TransactAction, PrimitiveError> {
        let key = self.header_key(list)?;
        let metadata = ItemMetadata {
            head_index: Some(new_head),
            tail_index: Some(new_tail),
            ..Default::default()
        };
        match observed.version {
            Some(version) => Ok(TransactAction::Update {
                key,
                update: UpdateAction::Claim {
                    value: serde_json::Value::Null,
                    item_type: ItemType::List,
                    ttl: None,
                    metadata,
                },
                condition: WriteCondition::VersionEquals(version),
            }),
            None => Ok(TransactAction::Put {
                record: ItemRecord::new(
                    key.partition_key,
                    key.sort_key,
                    serde_json::Value::Null,
                    ItemType::List,
                )
                .with_metadata(metadata),
                condition: WriteCondition::Absent,
            }),
        }
    }

    async fn push(
        &self,
        list: &str,
        value: serde_json::Value,
        end: ListEnd,
    ) -> Result<ListElement, PrimitiveError> {
        for _ in 0..HEADER_CAS_ATTEMPTS {
            let header = self.read_header(list).await?;
            let (index, new_head, new_tail) = match end {
                ListEnd::Head => (header.head - 1, header.head - 1, header.tail),
                ListEnd::Tail => (header.tail, header.head, header.tail + 1),
            };

            let element = ItemRecord::new(
                keys::partition_key(Namespace::List, list)?,
                keys::list_element_sort_key(list, index)?,
                value.clone(),
                ItemType::List,
            );

            let actions = vec![
                self.header_action(list, &header, new_head, new_tail)?,
                TransactAction::Put {
                    record: element,
                    condition: WriteCondition::Absent,
                },
            ];

            match self.store.transact_write(actions).await {
                Ok(()) => {
                    debug!(list, index, ?end, "list element pushed");
                    return Ok(ListElement {
                        list: list.to_string(),
                        value,
                        position: end,
                        index,
                    });
                }
                // Another writer moved the header; observe and retry.
                Err(StoreError::TransactionCanceled { .. }) => continue,
                Err(e) => return Err(fault(e)),
            }
        }
        Err(contended(list))
    }

    async fn pop(
        &self,
        list: &str,
        end: ListEnd,
    ) -> Result<Option<ListElement>, PrimitiveError> {
        for _ in 0..HEADER_CAS_ATTEMPTS {
            let header = self.read_header(list).await?;
            if header.len() <= 0 {
                return Ok(None);
            }
            let (index, new_head, new_tail) = match end {
                ListEnd::Head => (header.head, header.head + 1, header.tail),
                ListEnd::Tail => (header.tail - 1, header.head, header.tail - 1),
            };

            let element_key = ItemKey::new(
                keys::partition_key(Namespace::List, list)?,
                keys::list_element_sort_key(list, index)?,
            );
            let Some(element) = self.store.get(&element_key, true).await.map_err(fault)? else {
                return Err(PrimitiveError::Service {
                    message: format!("list '{list}' is missing element {index}"),
                });
            };

            let actions = vec![
                self.header_action(list, &header, new_head, new_tail)?,
                TransactAction::Delete {
                    key: element_key,
                    condition: WriteCondition::Exists,
                },
            ];

            match self.store.transact_write(actions).await {
                Ok(()) => {
                    debug!(list, index, ?end, "list element popped");
                    return Ok(Some(ListElement {
                        list: list.to_string(),
                        value: element.value,
                        position: end,
                        index,
                    }));
                }
                Err(StoreError::TransactionCanceled { .. }) => continue,
                Err(e) => return Err(fault(e)),
            }
        }
        Err(contended(list))
    }

    /// Prepend.
    pub async fn lpush(&self, list: &str, value: serde_json::Value) -> Result<ListElement, PrimitiveError> {
        self.push(list, value, ListEnd::Head).await
    }

    /// Append.
    pub async fn rpush(&self, list: &str, value: serde_json::Value) -> Result<ListElement, PrimitiveError> {
        self.push(list, value, ListEnd::Tail).await
    }

    /// Remove and return the first element. `None` when empty.
    pub async fn lpop(&self, list: &str) -> Result<Option<ListElement>, PrimitiveError> {
        self.pop(list, ListEnd::Head).await
    }

    /// Remove and return the last element. `None` when empty.
    pub async fn rpop(&self, list: &str) -> Result<Option<ListElement>, PrimitiveError> {
        self.pop(list, ListEnd::Tail).await
    }

    /// Slice `[start, stop)` of the list. Negative positions resolve
    /// against the current length; out-of-bounds positions clamp rather
    /// than error. A missing `stop` means "to the end".
    pub async fn range(
        &self,
        list: &str,
        start: i64,
        stop: Option<i64>,
    ) -> Result<ListRange, PrimitiveError> {
        let header = self.read_header(list).await?;
        let len = header.len().max(0);

        let resolve = |position: i64| -> i64 {
            let absolute = if position < 0 { len + position } else { position };
            absolute.clamp(0, len)
        };
        let from = resolve(start);
        let to = stop.map(resolve).unwrap_or(len);

        let mut items = Vec::new();
        if from < to {
            // Elements are index-ordered under the element prefix; skip to
            // the window client-side.
            let records = self
                .store
                .query(
                    QuerySpec::partition(keys::partition_key(Namespace::List, list)?)
                        .with_prefix(keys::list_element_prefix(list)),
                )
                .await
                .map_err(fault)?;
            items = records
                .into_iter()
                .skip(from as usize)
                .take((to - from) as usize)
                .map(|record| record.value)
                .collect();
        }

        Ok(ListRange {
            list: list.to_string(),
            start,
            stop,
            count: items.len(),
            items,
        })
    }

    /// Element count from the header.
    pub async fn len(&self, list: &str) -> Result<u64, PrimitiveError> {
        Ok(self.read_header(list).await?.len().max(0) as u64)
    }
}

fn contended(list: &str) -> PrimitiveError {
    PrimitiveError::CoordinationUnavailable {
        message: format!(
            "list '{list}' is under heavy contention ({HEADER_CAS_ATTEMPTS} header updates lost)"
        ),
        solution: "Retry; if this persists, reduce concurrent writers on this list.".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use awsprim_store::MemoryItemStore;

    use super::*;

    fn ops() -> Arc<ListOps<MemoryItemStore>> {
        Arc::new(ListOps::new(Arc::new(MemoryItemStore::new())))
    }

    #[tokio::test]
    async fn rpush_lpop_is_fifo() {
        let lists = ops();
        for n in 0..5 {
            lists.rpush("jobs", serde_json::json!(n)).await.unwrap();
        }
        for n in 0..5 {
            let element = lists.lpop("jobs").await.unwrap().unwrap();
            assert_eq!(element.value, serde_json::json!(n));
        }
        assert!(lists.lpop("jobs").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn lpush_lpop_is_lifo() {
        let lists = ops();
        for n in 0..5 {
            lists.lpush("stack", serde_json::json!(n)).await.unwrap();
        }
        for n in (0..5).rev() {
            let element = lists.lpop("stack").await.unwrap().unwrap();
            assert_eq!(element.value, serde_json::json!(n));
        }
    }

    #[tokio::test]
    async fn mixed_ends_keep_order() {
        let lists = ops();
        lists.rpush("l", "b".into()).await.unwrap();
        lists.rpush("l", "c".into()).await.unwrap();
        lists.lpush("l", "a".into()).await.unwrap();

        let range = lists.range("l", 0, None).await.unwrap();
        assert_eq!(range.items, vec![
            serde_json::json!("a"),
            serde_json::json!("b"),
            serde_json::json!("c"),
        ]);

        let last = lists.rpop("l").await.unwrap().unwrap();
        assert_eq!(last.value, serde_json::json!("c"));
    }

    #[tokio::test]
    async fn range_resolves_and_clamps_negative_indices() {
        let lists = ops();
        for n in 0..4 {
            lists.rpush("r", serde_json::json!(n)).await.unwrap();
        }

        let tail = lists.range("r", -2, None).await.unwrap();
        assert_eq!(tail.items, vec![serde_json::json!(2), serde_json::json!(3)]);

        let window = lists.range("r", 1, Some(3)).await.unwrap();
        assert_eq!(window.items, vec![serde_json::json!(1), serde_json::json!(2)]);

        // Out-of-bounds negatives clamp to the full list instead of erroring.
        let clamped = lists.range("r", -100, None).await.unwrap();
        assert_eq!(clamped.count, 4);

        let empty = lists.range("r", 3, Some(1)).await.unwrap();
        assert_eq!(empty.count, 0);
    }

    #[tokio::test]
    async fn empty_list_pops_return_none() {
        let lists = ops();
        assert!(lists.lpop("missing").await.unwrap().is_none());
        assert!(lists.rpop("missing").await.unwrap().is_none());
        assert_eq!(lists.len("missing").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn concurrent_pushes_serialize_via_the_header() {
        let lists = ops();
        let mut tasks = Vec::new();
        for n in 0..8 {
            let lists = lists.clone();
            tasks.push(tokio::spawn(async move {
                lists.rpush("contended", serde_json::json!(n)).await
            }));
        }
        for task in tasks {
            task.await.unwrap().unwrap();
        }

        assert_eq!(lists.len("contended").await.unwrap(), 8);
        // Every element is present exactly once.
        let range = lists.range("contended", 0, None).await.unwrap();
        let mut seen: Vec<i64> = range.items.iter().filter_map(|v| v.as_i64()).collect();
        seen.sort_unstable();
        assert_eq!(seen, (0..8).collect::<Vec<_>>());
    }
}
