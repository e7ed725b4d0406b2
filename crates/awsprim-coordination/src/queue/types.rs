//! Queue result types.

use serde::Serialize;

/// Receipt returned by a push.
#[derive(Debug, Clone, Serialize)]
pub struct PushReceipt {
    pub queue: String,
    /// Full sort key of the message; doubles as the ack receipt.
    pub receipt: String,
    pub priority: u64,
    pub timestamp_micros: u64,
    pub message_uuid: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dedup_id: Option<String>,
}

/// A message handed to a consumer by pop.
#[derive(Debug, Clone, Serialize)]
pub struct PoppedMessage {
    pub queue: String,
    pub body: serde_json::Value,
    pub receipt: String,
    pub priority: u64,
    pub timestamp_micros: u64,
    /// Seconds the message stays hidden; absent when the pop deleted it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub visibility_timeout: Option<u64>,
}

/// A message observed by peek (no state change, no receipt).
#[derive(Debug, Clone, Serialize)]
pub struct PeekedMessage {
    pub body: serde_json::Value,
    pub priority: u64,
    pub timestamp_micros: u64,
    /// True while a consumer holds the message under a visibility deadline.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub in_flight: bool,
}

/// Ack outcome; idempotent.
#[derive(Debug, Clone, Serialize)]
pub struct AckResult {
    pub queue: String,
    pub receipt: String,
    pub acknowledged: bool,
}
