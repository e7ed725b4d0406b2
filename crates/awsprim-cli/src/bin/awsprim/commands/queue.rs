//! Work-queue commands.

use awsprim_coordination::QueueOps;
use awsprim_core::constants::DEFAULT_QUEUE_PRIORITY;
use awsprim_core::PrimitiveError;
use clap::Args;
use clap::Subcommand;

use super::parse_value;
use crate::context::ToolContext;
use crate::output::emit;
use crate::output::emit_list;
use crate::output::OutputFormat;

/// Priority work-queue operations.
#[derive(Subcommand)]
pub enum QueueCommand {
    /// Push a message. Lower priority values dequeue first.
    Push(PushArgs),

    /// Pop the head message. Exit 1 when the queue is empty.
    Pop(PopArgs),

    /// Look at head messages without consuming them.
    Peek(PeekArgs),

    /// Message count.
    Size(SizeArgs),

    /// Acknowledge (remove) a popped message by receipt.
    Ack(AckArgs),
}

#[derive(Args)]
pub struct PushArgs {
    /// Queue name.
    pub queue: String,

    /// Message body (JSON is stored structurally, anything else as text).
    pub body: String,

    /// Priority 0..=9999999999; lower dequeues first.
    #[arg(long, default_value_t = DEFAULT_QUEUE_PRIORITY)]
    pub priority: u64,

    /// Reject duplicate pushes carrying the same id within the dedup window.
    #[arg(long)]
    pub dedup_id: Option<String>,

    /// Message TTL in seconds.
    #[arg(long)]
    pub ttl: Option<u64>,

    /// Dedup window override in seconds (default 300).
    #[arg(long)]
    pub dedup_window: Option<u64>,
}

#[derive(Args)]
pub struct PopArgs {
    /// Queue name.
    pub queue: String,

    /// Hide the message for this many seconds instead of deleting it;
    /// the message must then be acked by receipt.
    #[arg(long)]
    pub visibility_timeout: Option<u64>,
}

#[derive(Args)]
pub struct PeekArgs {
    /// Queue name.
    pub queue: String,

    /// Maximum messages to report.
    #[arg(long, default_value = "10")]
    pub count: u32,
}

#[derive(Args)]
pub struct SizeArgs {
    /// Queue name.
    pub queue: String,
}

#[derive(Args)]
pub struct AckArgs {
    /// Queue name.
    pub queue: String,

    /// Receipt from 'queue pop'.
    pub receipt: String,
}

impl QueueCommand {
    pub async fn run(self, ctx: &ToolContext, format: OutputFormat) -> Result<i32, PrimitiveError> {
        match self {
            QueueCommand::Push(args) => {
                let window = args.dedup_window.unwrap_or(ctx.config.dedup_window);
                let queues = QueueOps::new(ctx.item_store(), window);
                let receipt = queues
                    .push(
                        &args.queue,
                        parse_value(&args.body),
                        args.priority,
                        args.dedup_id.as_deref(),
                        args.ttl,
                    )
                    .await?;
                emit(&receipt, &receipt.receipt, format);
                Ok(0)
            }
            QueueCommand::Pop(args) => {
                let queues = QueueOps::new(ctx.item_store(), ctx.config.dedup_window);
                match queues.pop(&args.queue, args.visibility_timeout).await? {
                    Some(message) => {
                        let primary = match &message.body {
                            serde_json::Value::String(s) => s.clone(),
                            other => other.to_string(),
                        };
                        emit(&message, &primary, format);
                        Ok(0)
                    }
                    None => {
                        emit(
                            &serde_json::json!({"queue": args.queue, "body": null, "empty": true}),
                            "",
                            format,
                        );
                        Ok(1)
                    }
                }
            }
            QueueCommand::Peek(args) => {
                let queues = QueueOps::new(ctx.item_store(), ctx.config.dedup_window);
                let messages = queues.peek(&args.queue, args.count).await?;
                emit_list(&messages, "messages", |m| m.body.to_string(), format);
                Ok(0)
            }
            QueueCommand::Size(args) => {
                let queues = QueueOps::new(ctx.item_store(), ctx.config.dedup_window);
                let size = queues.size(&args.queue).await?;
                emit(
                    &serde_json::json!({"queue": args.queue, "size": size}),
                    &size.to_string(),
                    format,
                );
                Ok(0)
            }
            QueueCommand::Ack(args) => {
                let queues = QueueOps::new(ctx.item_store(), ctx.config.dedup_window);
                let ack = queues.ack(&args.queue, &args.receipt).await?;
                emit(&ack, "acknowledged", format);
                Ok(0)
            }
        }
    }
}
