//! Priority work queues over the item store.
//!
//! Messages live under one partition per queue, sorted by a composite key
//! of (priority, enqueue microseconds, uuid); the head of the sort order is
//! the next message out. A popped message either disappears immediately or
//! is hidden behind a visibility deadline until acked or re-deliverable.
//! Dedup companions live in the same partition but outside the message
//! sort-key prefix, so enumeration never sees them.

mod pop;
mod push;
mod types;

use std::sync::Arc;

use awsprim_core::keys;
use awsprim_core::Namespace;
use awsprim_core::PrimitiveError;
use awsprim_store::ItemKey;
use awsprim_store::ItemStore;
use awsprim_store::QuerySpec;
use awsprim_store::StoreError;
use awsprim_store::WriteCondition;

pub use types::AckResult;
pub use types::PeekedMessage;
pub use types::PoppedMessage;
pub use types::PushReceipt;

use crate::fault;

/// Queue primitive.
pub struct QueueOps<S: ItemStore + ?Sized> {
    pub(crate) store: Arc<S>,
    /// Dedup companion TTL in seconds.
    pub(crate) dedup_window_secs: u64,
}

impl<S: ItemStore + ?Sized> QueueOps<S> {
    pub fn new(store: Arc<S>, dedup_window_secs: u64) -> Self {
        Self {
            store,
            dedup_window_secs,
        }
    }

    /// Look at up to `count` head messages without changing any state.
    pub async fn peek(&self, queue: &str, count: u32) -> Result<Vec<PeekedMessage>, PrimitiveError> {
        let partition_key = keys::partition_key(Namespace::Queue, queue)?;
        let now = awsprim_core::now_unix_secs();
        let records = self
            .store
            .query(
                QuerySpec::partition(partition_key)
                    .with_prefix(keys::queue_message_prefix(queue))
                    .with_limit(count),
            )
            .await
            .map_err(fault)?;

        Ok(records
            .into_iter()
            .map(|record| PeekedMessage {
                body: record.value,
                priority: record.metadata.priority.unwrap_or_default(),
                timestamp_micros: record.metadata.timestamp_micros.unwrap_or_default(),
                in_flight: matches!(record.metadata.visibility_deadline, Some(d) if d >= now),
            })
            .collect())
    }

    /// Message count (in-flight messages included; dedup companions not).
    pub async fn size(&self, queue: &str) -> Result<u64, PrimitiveError> {
        let partition_key = keys::partition_key(Namespace::Queue, queue)?;
        self.store
            .count(&partition_key, Some(&keys::queue_message_prefix(queue)))
            .await
            .map_err(fault)
    }

    /// Acknowledge (remove) a popped message. Idempotent: acking a message
    /// that already disappeared succeeds.
    pub async fn ack(&self, queue: &str, receipt: &str) -> Result<AckResult, PrimitiveError> {
        let partition_key = keys::partition_key(Namespace::Queue, queue)?;
        if !receipt.starts_with(&keys::queue_message_prefix(queue)) {
            return Err(PrimitiveError::invalid(
                format!("receipt does not belong to queue '{queue}'"),
                "Pass the receipt exactly as returned by 'awsprim queue pop'.",
            ));
        }

        let key = ItemKey::new(partition_key, receipt);
        match self.store.delete(&key, WriteCondition::Exists).await {
            Ok(()) | Err(StoreError::Conflict { .. }) => Ok(AckResult {
                queue: queue.to_string(),
                receipt: receipt.to_string(),
                acknowledged: true,
            }),
            Err(e) => Err(fault(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use awsprim_core::constants::DEFAULT_QUEUE_PRIORITY;
    use awsprim_store::MemoryItemStore;

    use super::*;

    fn ops() -> QueueOps<MemoryItemStore> {
        QueueOps::new(Arc::new(MemoryItemStore::new()), 300)
    }

    #[tokio::test]
    async fn priority_then_fifo_ordering() {
        let queues = ops();
        queues.push("q", "a".into(), 5, None, None).await.unwrap();
        queues.push("q", "b".into(), 5, None, None).await.unwrap();
        queues.push("q", "c".into(), 1, None, None).await.unwrap();

        let first = queues.pop("q", None).await.unwrap().unwrap();
        assert_eq!(first.body, serde_json::json!("c"));
        let second = queues.pop("q", None).await.unwrap().unwrap();
        assert_eq!(second.body, serde_json::json!("a"));
        let third = queues.pop("q", None).await.unwrap().unwrap();
        assert_eq!(third.body, serde_json::json!("b"));

        assert!(queues.pop("q", None).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn strict_push_order_within_one_priority() {
        let queues = ops();
        for n in 0..10 {
            queues
                .push("fifo", serde_json::json!(n), DEFAULT_QUEUE_PRIORITY, None, None)
                .await
                .unwrap();
        }
        for n in 0..10 {
            let msg = queues.pop("fifo", None).await.unwrap().unwrap();
            assert_eq!(msg.body, serde_json::json!(n));
        }
    }

    #[tokio::test]
    async fn visibility_timeout_hides_the_message() {
        let queues = ops();
        queues.push("work", "job".into(), 5, None, None).await.unwrap();

        let held = queues.pop("work", Some(30)).await.unwrap().unwrap();
        assert_eq!(held.visibility_timeout, Some(30));

        // Still counted, but not poppable while hidden.
        assert_eq!(queues.size("work").await.unwrap(), 1);
        assert!(queues.pop("work", Some(30)).await.unwrap().is_none());

        // Ack removes it for good.
        queues.ack("work", &held.receipt).await.unwrap();
        assert_eq!(queues.size("work").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn ack_is_idempotent_and_scoped() {
        let queues = ops();
        queues.push("q", "x".into(), 5, None, None).await.unwrap();
        let msg = queues.pop("q", Some(60)).await.unwrap().unwrap();

        let first = queues.ack("q", &msg.receipt).await.unwrap();
        assert!(first.acknowledged);
        let second = queues.ack("q", &msg.receipt).await.unwrap();
        assert!(second.acknowledged);

        let err = queues.ack("other", &msg.receipt).await.unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[tokio::test]
    async fn dedup_rejects_within_window() {
        let queues = ops();
        queues.push("q", "x".into(), 5, Some("job-1"), None).await.unwrap();

        let err = queues
            .push("q", "y".into(), 5, Some("job-1"), None)
            .await
            .unwrap_err();
        assert!(matches!(err, PrimitiveError::CoordinationUnavailable { .. }));
        assert_eq!(err.exit_code(), 4);

        // Only the first message is in the queue; a different id is fine.
        assert_eq!(queues.size("q").await.unwrap(), 1);
        queues.push("q", "z".into(), 5, Some("job-2"), None).await.unwrap();
        assert_eq!(queues.size("q").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn dedup_window_expiry_allows_a_new_push() {
        // Window of 0 seconds: the companion expires immediately.
        let queues = QueueOps::new(Arc::new(MemoryItemStore::new()), 0);
        queues.push("q", "x".into(), 5, Some("k"), None).await.unwrap();
        queues.push("q", "z".into(), 5, Some("k"), None).await.unwrap();
        assert_eq!(queues.size("q").await.unwrap(), 2);
    }

    #[tokio::test]
    async fn peek_reports_without_consuming() {
        let queues = ops();
        queues.push("q", "a".into(), 2, None, None).await.unwrap();
        queues.push("q", "b".into(), 1, None, None).await.unwrap();

        let peeked = queues.peek("q", 10).await.unwrap();
        assert_eq!(peeked.len(), 2);
        assert_eq!(peeked[0].body, serde_json::json!("b"));
        assert!(!peeked[0].in_flight);

        // Peek again: nothing consumed.
        assert_eq!(queues.peek("q", 10).await.unwrap().len(), 2);

        // A held message shows as in flight.
        queues.pop("q", Some(60)).await.unwrap().unwrap();
        let peeked = queues.peek("q", 10).await.unwrap();
        assert!(peeked.iter().any(|m| m.in_flight));
    }

    #[tokio::test]
    async fn expired_messages_vanish() {
        let queues = ops();
        queues.push("q", "old".into(), 5, None, Some(0)).await.unwrap();
        assert_eq!(queues.size("q").await.unwrap(), 0);
        assert!(queues.pop("q", None).await.unwrap().is_none());
    }
}
