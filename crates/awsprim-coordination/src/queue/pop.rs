//! Queue pop with visibility-timeout claiming.

use awsprim_core::constants::QUEUE_POP_ATTEMPTS;
use awsprim_core::constants::QUEUE_POP_PAGE_SIZE;
use awsprim_core::keys;
use awsprim_core::now_unix_secs;
use awsprim_core::ItemRecord;
use awsprim_core::Namespace;
use awsprim_core::PrimitiveError;
use awsprim_store::ItemKey;
use awsprim_store::ItemStore;
use awsprim_store::QuerySpec;
use awsprim_store::StoreError;
use awsprim_store::UpdateAction;
use awsprim_store::WriteCondition;
use tracing::debug;

use super::types::PoppedMessage;
use super::QueueOps;
use crate::fault;

impl<S: ItemStore + ?Sized> QueueOps<S> {
    /// Pop the head message (lowest priority value, then oldest).
    ///
    /// With a visibility timeout the message is hidden rather than removed:
    /// the claim is a CAS on the deadline this pop observed, so two
    /// concurrent pops can never both hold the same message. Without one,
    /// the message is deleted outright. Returns `None` on an empty queue.
    pub async fn pop(
        &self,
        queue: &str,
        visibility_timeout: Option<u64>,
    ) -> Result<Option<PoppedMessage>, PrimitiveError> {
        let partition_key = keys::partition_key(Namespace::Queue, queue)?;
        let prefix = keys::queue_message_prefix(queue);

        for attempt in 0..QUEUE_POP_ATTEMPTS {
            let now = now_unix_secs();
            // The store applies Limit before any visibility filter, so read
            // a page and filter here instead of filtering server-side.
            let page = self
                .store
                .query(
                    QuerySpec::partition(partition_key.clone())
                        .with_prefix(prefix.clone())
                        .with_limit(QUEUE_POP_PAGE_SIZE)
                        .consistent(),
                )
                .await
                .map_err(fault)?;

            let Some(head) = page
                .into_iter()
                .find(|record| is_visible(record, now))
            else {
                return Ok(None);
            };

            let observed = head.metadata.visibility_deadline;
            let key = ItemKey::new(head.partition_key.clone(), head.sort_key.clone());

            let claimed = match visibility_timeout {
                Some(timeout) => {
                    let deadline = now + timeout;
                    match self
                        .store
                        .update(
                            &key,
                            UpdateAction::SetVisibility { deadline },
                            WriteCondition::VisibilityUnchanged { observed },
                        )
                        .await
                    {
                        Ok(_) => true,
                        Err(StoreError::Conflict { .. }) => false,
                        Err(e) => return Err(fault(e)),
                    }
                }
                None => {
                    // Unconditional when the message was never claimed;
                    // otherwise the delete requires the item to still exist.
                    let condition = if observed.is_none() {
                        WriteCondition::None
                    } else {
                        WriteCondition::Exists
                    };
                    match self.store.delete(&key, condition).await {
                        Ok(()) => true,
                        Err(StoreError::Conflict { .. }) => false,
                        Err(e) => return Err(fault(e)),
                    }
                }
            };

            if claimed {
                debug!(queue, receipt = %head.sort_key, attempt, "message popped");
                return Ok(Some(PoppedMessage {
                    queue: queue.to_string(),
                    body: head.value,
                    receipt: head.sort_key,
                    priority: head.metadata.priority.unwrap_or_default(),
                    timestamp_micros: head.metadata.timestamp_micros.unwrap_or_default(),
                    visibility_timeout,
                }));
            }
            // Lost the race for this message; re-read from the head.
        }

        Err(PrimitiveError::CoordinationUnavailable {
            message: format!(
                "queue '{queue}' is under heavy pop contention ({QUEUE_POP_ATTEMPTS} claim attempts lost)"
            ),
            solution: "Retry; if this persists, spread consumers or shard the queue.".to_string(),
        })
    }
}

fn is_visible(record: &ItemRecord, now: u64) -> bool {
    match record.metadata.visibility_deadline {
        None => true,
        Some(deadline) => deadline < now,
    }
}
