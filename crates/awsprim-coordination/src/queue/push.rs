//! Queue push with optional transactional deduplication.

use awsprim_core::keys;
use awsprim_core::now_unix_micros;
use awsprim_core::ItemMetadata;
use awsprim_core::ItemRecord;
use awsprim_core::ItemType;
use awsprim_core::Namespace;
use awsprim_core::PrimitiveError;
use awsprim_store::ItemStore;
use awsprim_store::StoreError;
use awsprim_store::TransactAction;
use awsprim_store::WriteCondition;
use tracing::debug;
use uuid::Uuid;

use super::types::PushReceipt;
use super::QueueOps;
use crate::fault;

impl<S: ItemStore + ?Sized> QueueOps<S> {
    /// Push a message.
    ///
    /// Ordering is (priority asc, enqueue time asc, uuid asc): priority 0
    /// dequeues before priority 5. With a dedup id, a companion item
    /// scoped by the dedup window is written in the same transaction; a
    /// second push with the same id inside the window is rejected.
    pub async fn push(
        &self,
        queue: &str,
        body: serde_json::Value,
        priority: u64,
        dedup_id: Option<&str>,
        ttl_secs: Option<u64>,
    ) -> Result<PushReceipt, PrimitiveError> {
        let partition_key = keys::partition_key(Namespace::Queue, queue)?;
        let timestamp_micros = now_unix_micros();
        let message_uuid = Uuid::new_v4().to_string();
        let sort_key =
            keys::queue_message_sort_key(queue, priority, timestamp_micros, &message_uuid)?;

        let mut record = ItemRecord::new(partition_key.clone(), sort_key.clone(), body, ItemType::Queue)
            .with_metadata(ItemMetadata {
                priority: Some(priority),
                timestamp_micros: Some(timestamp_micros),
                message_uuid: Some(message_uuid.clone()),
                dedup_id: dedup_id.map(str::to_string),
                ..Default::default()
            });
        if let Some(ttl) = ttl_secs {
            record = record.with_ttl_in(ttl);
        }

        match dedup_id {
            None => self.store.put(record, WriteCondition::None).await.map_err(fault)?,
            Some(id) => {
                let companion = ItemRecord::new(
                    partition_key,
                    keys::queue_dedup_sort_key(queue, id)?,
                    serde_json::Value::String(sort_key.clone()),
                    ItemType::Queue,
                )
                .with_ttl_in(self.dedup_window_secs)
                .with_metadata(ItemMetadata {
                    dedup_id: Some(id.to_string()),
                    ..Default::default()
                });

                let actions = vec![
                    TransactAction::Put {
                        record,
                        condition: WriteCondition::None,
                    },
                    TransactAction::Put {
                        record: companion,
                        // Expired companions no longer block: the window
                        // has passed even if the store kept the item.
                        condition: WriteCondition::AbsentOrExpired {
                            now: awsprim_core::now_unix_secs(),
                        },
                    },
                ];

                match self.store.transact_write(actions).await {
                    Ok(()) => {}
                    Err(StoreError::TransactionCanceled { .. }) => {
                        return Err(PrimitiveError::CoordinationUnavailable {
                            message: format!(
                                "a message with dedup id '{id}' was already pushed to '{queue}' within the dedup window"
                            ),
                            solution:
                                "This push is a duplicate; treat the earlier message as authoritative or wait out the window."
                                    .to_string(),
                        });
                    }
                    Err(e) => return Err(fault(e)),
                }
            }
        }

        debug!(queue, priority, uuid = %message_uuid, "message pushed");
        Ok(PushReceipt {
            queue: queue.to_string(),
            receipt: sort_key,
            priority,
            timestamp_micros,
            message_uuid,
            dedup_id: dedup_id.map(str::to_string),
        })
    }
}
