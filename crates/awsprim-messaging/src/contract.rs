//! Service contracts for the pub/sub and queue subsystems.
//!
//! Both subsystems are thin adapters over managed services whose semantics
//! are fixed externally; these traits pin down what any implementation
//! must preserve:
//!
//! - ordered (FIFO) topics deliver in order within a message group with
//!   exactly-once effective delivery inside the dedup window; non-ordered
//!   topics are at-least-once and unordered
//! - ordered topics may fan out only to ordered queues; other endpoint
//!   kinds must be rejected at subscription time
//! - queue receipt is at-least-once; a received message stays hidden for
//!   the visibility timeout until deleted

use std::collections::BTreeMap;

use async_trait::async_trait;
use awsprim_core::PrimitiveError;
use serde::Serialize;

/// A created or described topic.
#[derive(Debug, Clone, Serialize)]
pub struct TopicInfo {
    pub name: String,
    pub arn: String,
    pub ordered: bool,
}

/// Receipt for a published message.
#[derive(Debug, Clone, Serialize)]
pub struct PublishedMessage {
    pub topic: String,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
}

/// One subscription on a topic.
#[derive(Debug, Clone, Serialize)]
pub struct SubscriptionInfo {
    pub arn: String,
    pub protocol: String,
    pub endpoint: String,
}

/// Fan-out (1-to-many) topic contract.
#[async_trait]
pub trait TopicService: Send + Sync {
    async fn create(
        &self,
        name: &str,
        ordered: bool,
        content_dedup: bool,
    ) -> Result<TopicInfo, PrimitiveError>;

    /// `group_id` is required for ordered topics.
    #[allow(clippy::too_many_arguments)]
    async fn publish(
        &self,
        topic: &str,
        body: &str,
        group_id: Option<&str>,
        dedup_id: Option<&str>,
        subject: Option<&str>,
        attributes: &[(String, String)],
    ) -> Result<PublishedMessage, PrimitiveError>;

    async fn list(&self) -> Result<Vec<String>, PrimitiveError>;

    async fn delete(&self, topic: &str) -> Result<(), PrimitiveError>;

    async fn attributes(&self, topic: &str) -> Result<BTreeMap<String, String>, PrimitiveError>;

    async fn subscriptions(&self, topic: &str) -> Result<Vec<SubscriptionInfo>, PrimitiveError>;

    async fn set_access_policy(&self, topic: &str, policy: &str) -> Result<(), PrimitiveError>;
}

/// Parameters for creating a buffered queue.
#[derive(Debug, Clone, Default)]
pub struct QueueSpec {
    pub ordered: bool,
    pub visibility_timeout_secs: Option<u64>,
    pub retention_secs: Option<u64>,
    pub delivery_delay_secs: Option<u64>,
    pub receive_wait_secs: Option<u64>,
    /// Dead-letter queue name plus the receive count that trips it.
    pub dead_letter: Option<(String, u32)>,
    pub content_dedup: bool,
}

/// A created or resolved queue.
#[derive(Debug, Clone, Serialize)]
pub struct QueueInfo {
    pub name: String,
    pub url: String,
    pub ordered: bool,
}

/// Receipt for a sent message.
#[derive(Debug, Clone, Serialize)]
pub struct SentMessage {
    pub queue: String,
    pub message_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sequence_number: Option<String>,
}

/// One received message.
#[derive(Debug, Clone, Serialize)]
pub struct ReceivedMessage {
    pub message_id: String,
    pub body: String,
    pub receipt: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

/// Options for receiving messages.
#[derive(Debug, Clone, Default)]
pub struct ReceiveOptions {
    /// 1..=10 messages per call.
    pub max: u32,
    pub visibility_timeout_secs: Option<u64>,
    /// Long-poll window, 0..=20 seconds.
    pub wait_secs: u64,
    /// Delete each message immediately after receipt.
    pub auto_delete: bool,
}

/// Buffered (1-to-1) message-queue contract.
#[async_trait]
pub trait MessageQueueService: Send + Sync {
    async fn create(&self, name: &str, spec: QueueSpec) -> Result<QueueInfo, PrimitiveError>;

    /// `group_id` is required for ordered queues.
    #[allow(clippy::too_many_arguments)]
    async fn send(
        &self,
        queue: &str,
        body: &str,
        group_id: Option<&str>,
        dedup_id: Option<&str>,
        delay_secs: Option<u64>,
        attributes: &[(String, String)],
    ) -> Result<SentMessage, PrimitiveError>;

    async fn receive(
        &self,
        queue: &str,
        options: ReceiveOptions,
    ) -> Result<Vec<ReceivedMessage>, PrimitiveError>;

    async fn delete_message(&self, queue: &str, receipt: &str) -> Result<(), PrimitiveError>;

    async fn purge(&self, queue: &str) -> Result<(), PrimitiveError>;

    async fn delete_queue(&self, queue: &str) -> Result<(), PrimitiveError>;

    async fn attributes(&self, queue: &str) -> Result<BTreeMap<String, String>, PrimitiveError>;

    async fn set_attributes(
        &self,
        queue: &str,
        attributes: &[(String, String)],
    ) -> Result<(), PrimitiveError>;

    /// Wire this queue to a topic. An ordered topic only accepts ordered
    /// queues; the adapter must reject the mismatch before subscribing.
    async fn subscribe_to_topic(
        &self,
        queue: &str,
        topic_arn: &str,
        raw_delivery: bool,
        filter_policy: Option<&str>,
        filter_scope: Option<&str>,
    ) -> Result<SubscriptionInfo, PrimitiveError>;
}

/// True when a topic/queue name or ARN follows the ordered-resource
/// naming convention.
pub fn is_ordered_name(name_or_arn: &str) -> bool {
    name_or_arn.ends_with(".fifo")
}

/// Validate an ordered resource name.
pub fn require_ordered_suffix(kind: &str, name: &str) -> Result<(), PrimitiveError> {
    if !is_ordered_name(name) {
        return Err(PrimitiveError::invalid(
            format!("ordered {kind} '{name}' must carry the '.fifo' suffix"),
            format!("Rename it to '{name}.fifo' or drop --ordered."),
        ));
    }
    Ok(())
}

/// Validate that ordered resources receive a message group.
pub fn require_group_for_ordered(
    kind: &str,
    name: &str,
    group_id: Option<&str>,
) -> Result<(), PrimitiveError> {
    if is_ordered_name(name) && group_id.is_none() {
        return Err(PrimitiveError::invalid(
            format!("ordered {kind} '{name}' requires a message group"),
            "Pass --group-id; ordering holds within each group.".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_naming_convention() {
        assert!(is_ordered_name("jobs.fifo"));
        assert!(is_ordered_name("arn:aws:sns:us-east-1:123:jobs.fifo"));
        assert!(!is_ordered_name("jobs"));

        assert!(require_ordered_suffix("queue", "jobs.fifo").is_ok());
        assert!(require_ordered_suffix("queue", "jobs").is_err());
    }

    #[test]
    fn ordered_sends_need_a_group() {
        assert!(require_group_for_ordered("topic", "t.fifo", None).is_err());
        assert!(require_group_for_ordered("topic", "t.fifo", Some("g")).is_ok());
        assert!(require_group_for_ordered("topic", "t", None).is_ok());
    }
}
