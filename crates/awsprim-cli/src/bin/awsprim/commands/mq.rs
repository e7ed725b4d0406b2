//! Buffered message-queue commands.

use awsprim_core::PrimitiveError;
use awsprim_messaging::MessageQueueService;
use awsprim_messaging::QueueSpec;
use awsprim_messaging::ReceiveOptions;
use clap::Args;
use clap::Subcommand;

use super::parse_pair;
use crate::context::ToolContext;
use crate::output::emit;
use crate::output::emit_list;
use crate::output::OutputFormat;

/// Buffered (1-to-1) message-queue operations.
#[derive(Subcommand)]
pub enum MqCommand {
    /// Create a queue. Ordered queues need the '.fifo' suffix.
    Create(CreateArgs),

    /// Send a message.
    Send(SendArgs),

    /// Receive messages (long-polls up to --wait seconds). Exit 1 when
    /// nothing arrived.
    Receive(ReceiveArgs),

    /// Delete a received message by receipt.
    Delete(DeleteArgs),

    /// Remove every message from a queue.
    Purge(NameArgs),

    /// Delete the queue itself.
    DeleteQueue(NameArgs),

    /// Read a queue's attributes.
    Attributes(NameArgs),

    /// Set queue attributes (NAME=VALUE pairs).
    SetAttributes(SetAttributesArgs),

    /// Subscribe this queue to a topic. Ordered topics only accept
    /// ordered queues; the mismatch fails before subscribing.
    Subscribe(SubscribeArgs),
}

#[derive(Args)]
pub struct CreateArgs {
    /// Queue name ('.fifo' suffix required with --ordered).
    pub name: String,

    /// In-order delivery within message groups.
    #[arg(long)]
    pub ordered: bool,

    /// Visibility timeout in seconds.
    #[arg(long)]
    pub visibility_timeout: Option<u64>,

    /// Message retention in seconds.
    #[arg(long)]
    pub retention: Option<u64>,

    /// Delivery delay in seconds.
    #[arg(long)]
    pub delivery_delay: Option<u64>,

    /// Default long-poll window in seconds.
    #[arg(long)]
    pub receive_wait: Option<u64>,

    /// Dead-letter queue name.
    #[arg(long, requires = "max_receive_count")]
    pub dlq: Option<String>,

    /// Receives before a message moves to the dead-letter queue.
    #[arg(long, requires = "dlq")]
    pub max_receive_count: Option<u32>,

    /// Deduplicate by content hash instead of explicit dedup ids.
    #[arg(long)]
    pub content_dedup: bool,
}

#[derive(Args)]
pub struct SendArgs {
    /// Queue name or URL.
    pub queue: String,

    /// Message body.
    pub body: String,

    /// Message group (required for ordered queues).
    #[arg(long)]
    pub group_id: Option<String>,

    /// Dedup id for ordered queues without content dedup.
    #[arg(long)]
    pub dedup_id: Option<String>,

    /// Per-message delivery delay in seconds.
    #[arg(long)]
    pub delay: Option<u64>,

    /// Message attributes (KEY=VALUE, repeatable).
    #[arg(long = "attribute", value_parser = parse_pair)]
    pub attributes: Vec<(String, String)>,
}

#[derive(Args)]
pub struct ReceiveArgs {
    /// Queue name or URL.
    pub queue: String,

    /// Messages per call (1..=10).
    #[arg(long, default_value = "1")]
    pub max: u32,

    /// Per-receive visibility timeout override in seconds.
    #[arg(long)]
    pub visibility_timeout: Option<u64>,

    /// Long-poll window in seconds (0..=20).
    #[arg(long, default_value = "0")]
    pub wait: u64,

    /// Delete each message immediately after receipt.
    #[arg(long)]
    pub auto_delete: bool,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Queue name or URL.
    pub queue: String,

    /// Receipt handle from 'mq receive'.
    pub receipt: String,
}

#[derive(Args)]
pub struct NameArgs {
    /// Queue name or URL.
    pub queue: String,
}

#[derive(Args)]
pub struct SetAttributesArgs {
    /// Queue name or URL.
    pub queue: String,

    /// Attributes (NAME=VALUE, repeatable, at least one).
    #[arg(long = "attribute", value_parser = parse_pair, required = true)]
    pub attributes: Vec<(String, String)>,
}

#[derive(Args)]
pub struct SubscribeArgs {
    /// Queue name or URL.
    pub queue: String,

    /// Topic ARN to subscribe to.
    pub topic_arn: String,

    /// Deliver the raw message body without the envelope.
    #[arg(long)]
    pub raw: bool,

    /// Subscription filter policy (JSON).
    #[arg(long)]
    pub filter_policy: Option<String>,

    /// Filter scope: MessageAttributes or MessageBody.
    #[arg(long)]
    pub filter_scope: Option<String>,
}

impl MqCommand {
    pub async fn run(self, ctx: &ToolContext, format: OutputFormat) -> Result<i32, PrimitiveError> {
        let queues = ctx.queues();
        match self {
            MqCommand::Create(args) => {
                let spec = QueueSpec {
                    ordered: args.ordered,
                    visibility_timeout_secs: args.visibility_timeout,
                    retention_secs: args.retention,
                    delivery_delay_secs: args.delivery_delay,
                    receive_wait_secs: args.receive_wait,
                    dead_letter: args.dlq.zip(args.max_receive_count),
                    content_dedup: args.content_dedup,
                };
                let info = queues.create(&args.name, spec).await?;
                emit(&info, &info.url, format);
                Ok(0)
            }
            MqCommand::Send(args) => {
                let message = queues
                    .send(
                        &args.queue,
                        &args.body,
                        args.group_id.as_deref(),
                        args.dedup_id.as_deref(),
                        args.delay,
                        &args.attributes,
                    )
                    .await?;
                emit(&message, &message.message_id, format);
                Ok(0)
            }
            MqCommand::Receive(args) => {
                let messages = queues
                    .receive(&args.queue, ReceiveOptions {
                        max: args.max,
                        visibility_timeout_secs: args.visibility_timeout,
                        wait_secs: args.wait,
                        auto_delete: args.auto_delete,
                    })
                    .await?;
                let empty = messages.is_empty();
                emit_list(&messages, "messages", |m| m.body.clone(), format);
                Ok(if empty { 1 } else { 0 })
            }
            MqCommand::Delete(args) => {
                queues.delete_message(&args.queue, &args.receipt).await?;
                emit(
                    &serde_json::json!({"queue": args.queue, "deleted": true}),
                    "deleted",
                    format,
                );
                Ok(0)
            }
            MqCommand::Purge(args) => {
                queues.purge(&args.queue).await?;
                emit(
                    &serde_json::json!({"queue": args.queue, "purged": true}),
                    "purged",
                    format,
                );
                Ok(0)
            }
            MqCommand::DeleteQueue(args) => {
                queues.delete_queue(&args.queue).await?;
                emit(
                    &serde_json::json!({"queue": args.queue, "deleted": true}),
                    "deleted",
                    format,
                );
                Ok(0)
            }
            MqCommand::Attributes(args) => {
                let attributes = queues.attributes(&args.queue).await?;
                emit(
                    &serde_json::json!({"queue": args.queue, "attributes": attributes}),
                    &attributes.len().to_string(),
                    format,
                );
                Ok(0)
            }
            MqCommand::SetAttributes(args) => {
                queues.set_attributes(&args.queue, &args.attributes).await?;
                emit(
                    &serde_json::json!({"queue": args.queue, "attributes_set": args.attributes.len()}),
                    "ok",
                    format,
                );
                Ok(0)
            }
            MqCommand::Subscribe(args) => {
                let subscription = queues
                    .subscribe_to_topic(
                        &args.queue,
                        &args.topic_arn,
                        args.raw,
                        args.filter_policy.as_deref(),
                        args.filter_scope.as_deref(),
                    )
                    .await?;
                emit(&subscription, &subscription.arn, format);
                Ok(0)
            }
        }
    }
}
