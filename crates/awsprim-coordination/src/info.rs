//! Cross-collection statistics via the type index.

use std::collections::BTreeMap;
use std::sync::Arc;

use awsprim_core::ItemType;
use awsprim_core::PrimitiveError;
use awsprim_store::ItemStore;
use serde::Serialize;

use crate::fault;

/// Per-type item counts.
#[derive(Debug, Clone, Serialize)]
pub struct StatsReport {
    pub counts: BTreeMap<String, u64>,
    pub total: u64,
}

/// Statistics over the whole table.
pub struct StatsOps<S: ItemStore + ?Sized> {
    store: Arc<S>,
}

impl<S: ItemStore + ?Sized> StatsOps<S> {
    pub fn new(store: Arc<S>) -> Self {
        Self { store }
    }

    /// Count items of every type.
    pub async fn stats(&self) -> Result<StatsReport, PrimitiveError> {
        let mut counts = BTreeMap::new();
        let mut total = 0;
        for item_type in ItemType::all() {
            let count = self.store.count_type(item_type).await.map_err(fault)?;
            total += count;
            counts.insert(item_type.as_str().to_string(), count);
        }
        Ok(StatsReport { counts, total })
    }
}

#[cfg(test)]
mod tests {
    use awsprim_store::MemoryItemStore;

    use super::*;
    use crate::KvOps;
    use crate::SetOps;

    #[tokio::test]
    async fn stats_count_by_type() {
        let store = Arc::new(MemoryItemStore::new());
        let kv = KvOps::new(store.clone());
        let sets = SetOps::new(store.clone());

        kv.set("a", "1".into(), None, false).await.unwrap();
        kv.set("b", "2".into(), None, false).await.unwrap();
        sets.add("s", "m").await.unwrap();

        let report = StatsOps::new(store).stats().await.unwrap();
        assert_eq!(report.counts["kv"], 2);
        assert_eq!(report.counts["set"], 1);
        assert_eq!(report.counts["lock"], 0);
        assert_eq!(report.total, 3);
    }
}
