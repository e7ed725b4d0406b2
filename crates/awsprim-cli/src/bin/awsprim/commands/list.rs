//! List commands.

use awsprim_coordination::ListOps;
use awsprim_core::PrimitiveError;
use clap::Args;
use clap::Subcommand;

use super::parse_value;
use crate::context::ToolContext;
use crate::output::emit;
use crate::output::OutputFormat;

/// List operations with stable indices.
#[derive(Subcommand)]
pub enum ListCommand {
    /// Prepend a value.
    Lpush(PushArgs),

    /// Append a value.
    Rpush(PushArgs),

    /// Remove and return the first element. Exit 1 when empty.
    Lpop(NameArgs),

    /// Remove and return the last element. Exit 1 when empty.
    Rpop(NameArgs),

    /// Slice [start, stop) with negative indices resolved from the end.
    Range(RangeArgs),

    /// Element count.
    Len(NameArgs),
}

#[derive(Args)]
pub struct PushArgs {
    /// List name.
    pub list: String,

    /// Value (JSON is stored structurally, anything else as text).
    pub value: String,
}

#[derive(Args)]
pub struct NameArgs {
    /// List name.
    pub list: String,
}

#[derive(Args)]
pub struct RangeArgs {
    /// List name.
    pub list: String,

    /// Start index (inclusive; negative counts from the end).
    #[arg(default_value = "0", allow_hyphen_values = true)]
    pub start: i64,

    /// Stop index (exclusive; omitted means the end of the list).
    #[arg(allow_hyphen_values = true)]
    pub stop: Option<i64>,
}

impl ListCommand {
    pub async fn run(self, ctx: &ToolContext, format: OutputFormat) -> Result<i32, PrimitiveError> {
        let lists = ListOps::new(ctx.item_store());
        match self {
            ListCommand::Lpush(args) => {
                let element = lists.lpush(&args.list, parse_value(&args.value)).await?;
                emit(&element, &element.index.to_string(), format);
                Ok(0)
            }
            ListCommand::Rpush(args) => {
                let element = lists.rpush(&args.list, parse_value(&args.value)).await?;
                emit(&element, &element.index.to_string(), format);
                Ok(0)
            }
            ListCommand::Lpop(args) => pop_result(lists.lpop(&args.list).await?, &args.list, format),
            ListCommand::Rpop(args) => pop_result(lists.rpop(&args.list).await?, &args.list, format),
            ListCommand::Range(args) => {
                let range = lists.range(&args.list, args.start, args.stop).await?;
                emit(&range, &range.count.to_string(), format);
                Ok(0)
            }
            ListCommand::Len(args) => {
                let len = lists.len(&args.list).await?;
                emit(
                    &serde_json::json!({"list": args.list, "length": len}),
                    &len.to_string(),
                    format,
                );
                Ok(0)
            }
        }
    }
}

fn pop_result(
    element: Option<awsprim_coordination::list::ListElement>,
    list: &str,
    format: OutputFormat,
) -> Result<i32, PrimitiveError> {
    match element {
        Some(element) => {
            let primary = match &element.value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            emit(&element, &primary, format);
            Ok(0)
        }
        None => {
            emit(
                &serde_json::json!({"list": list, "value": null, "empty": true}),
                "",
                format,
            );
            Ok(1)
        }
    }
}
