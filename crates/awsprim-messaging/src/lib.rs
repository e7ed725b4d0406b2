//! Topic and message-queue layer.
//!
//! The contracts ([`TopicService`], [`MessageQueueService`]) pin down the
//! externally fixed semantics; [`SnsTopics`] and [`SqsQueues`] are the
//! managed-service adapters. Where the service guarantees at-least-once,
//! so does this layer.

pub mod contract;
pub mod sns;
pub mod sqs;

pub use contract::is_ordered_name;
pub use contract::MessageQueueService;
pub use contract::PublishedMessage;
pub use contract::QueueInfo;
pub use contract::QueueSpec;
pub use contract::ReceiveOptions;
pub use contract::ReceivedMessage;
pub use contract::SentMessage;
pub use contract::SubscriptionInfo;
pub use contract::TopicInfo;
pub use contract::TopicService;
pub use sns::SnsTopics;
pub use sqs::SqsQueues;
