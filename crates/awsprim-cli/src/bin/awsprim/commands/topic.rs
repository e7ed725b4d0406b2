//! Fan-out topic commands.

use awsprim_core::PrimitiveError;
use awsprim_messaging::TopicService;
use clap::Args;
use clap::Subcommand;

use super::parse_pair;
use crate::context::ToolContext;
use crate::output::emit;
use crate::output::emit_list;
use crate::output::OutputFormat;

/// Fan-out (1-to-many) topic operations.
#[derive(Subcommand)]
pub enum TopicCommand {
    /// Create a topic. Ordered topics need the '.fifo' suffix and deliver
    /// in order within each message group.
    Create(CreateArgs),

    /// Publish a message to every subscriber.
    Publish(PublishArgs),

    /// Enumerate topics.
    List,

    /// Delete a topic.
    Delete(NameArgs),

    /// Read a topic's attributes.
    Attributes(NameArgs),

    /// Enumerate a topic's subscriptions.
    Subscriptions(NameArgs),

    /// Replace a topic's access policy.
    SetPolicy(SetPolicyArgs),
}

#[derive(Args)]
pub struct CreateArgs {
    /// Topic name ('.fifo' suffix required with --ordered).
    pub name: String,

    /// In-order delivery within message groups, exactly-once within the
    /// dedup window.
    #[arg(long)]
    pub ordered: bool,

    /// Deduplicate by content hash instead of explicit dedup ids.
    #[arg(long)]
    pub content_dedup: bool,
}

#[derive(Args)]
pub struct PublishArgs {
    /// Topic name or ARN.
    pub topic: String,

    /// Message body.
    pub body: String,

    /// Message group (required for ordered topics).
    #[arg(long)]
    pub group_id: Option<String>,

    /// Dedup id for ordered topics without content dedup.
    #[arg(long)]
    pub dedup_id: Option<String>,

    /// Message subject.
    #[arg(long)]
    pub subject: Option<String>,

    /// Message attributes (KEY=VALUE, repeatable).
    #[arg(long = "attribute", value_parser = parse_pair)]
    pub attributes: Vec<(String, String)>,
}

#[derive(Args)]
pub struct NameArgs {
    /// Topic name or ARN.
    pub topic: String,
}

#[derive(Args)]
pub struct SetPolicyArgs {
    /// Topic name or ARN.
    pub topic: String,

    /// IAM policy document (JSON).
    pub policy: String,
}

impl TopicCommand {
    pub async fn run(self, ctx: &ToolContext, format: OutputFormat) -> Result<i32, PrimitiveError> {
        let topics = ctx.topics();
        match self {
            TopicCommand::Create(args) => {
                let info = topics.create(&args.name, args.ordered, args.content_dedup).await?;
                emit(&info, &info.arn, format);
                Ok(0)
            }
            TopicCommand::Publish(args) => {
                let message = topics
                    .publish(
                        &args.topic,
                        &args.body,
                        args.group_id.as_deref(),
                        args.dedup_id.as_deref(),
                        args.subject.as_deref(),
                        &args.attributes,
                    )
                    .await?;
                emit(&message, &message.message_id, format);
                Ok(0)
            }
            TopicCommand::List => {
                let arns = topics.list().await?;
                let entries: Vec<serde_json::Value> = arns
                    .iter()
                    .map(|arn| serde_json::json!({"arn": arn}))
                    .collect();
                emit_list(
                    &entries,
                    "topics",
                    |t| t["arn"].as_str().unwrap_or_default().to_string(),
                    format,
                );
                Ok(0)
            }
            TopicCommand::Delete(args) => {
                topics.delete(&args.topic).await?;
                emit(
                    &serde_json::json!({"topic": args.topic, "deleted": true}),
                    "deleted",
                    format,
                );
                Ok(0)
            }
            TopicCommand::Attributes(args) => {
                let attributes = topics.attributes(&args.topic).await?;
                emit(
                    &serde_json::json!({"topic": args.topic, "attributes": attributes}),
                    &attributes.len().to_string(),
                    format,
                );
                Ok(0)
            }
            TopicCommand::Subscriptions(args) => {
                let subscriptions = topics.subscriptions(&args.topic).await?;
                emit_list(&subscriptions, "subscriptions", |s| s.endpoint.clone(), format);
                Ok(0)
            }
            TopicCommand::SetPolicy(args) => {
                topics.set_access_policy(&args.topic, &args.policy).await?;
                emit(
                    &serde_json::json!({"topic": args.topic, "policy_set": true}),
                    "ok",
                    format,
                );
                Ok(0)
            }
        }
    }
}
