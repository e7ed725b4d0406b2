//! Key/value commands.

use awsprim_coordination::KvOps;
use awsprim_core::PrimitiveError;
use clap::Args;
use clap::Subcommand;

use super::parse_value;
use crate::context::ToolContext;
use crate::output::emit;
use crate::output::emit_list;
use crate::output::OutputFormat;

/// Key/value operations.
#[derive(Subcommand)]
pub enum KvCommand {
    /// Store a value.
    Set(SetArgs),

    /// Read a value.
    Get(GetArgs),

    /// Delete a key (idempotent; optionally guarded by the current value).
    Delete(DeleteArgs),

    /// Probe for existence. Exit 0 when present, 1 when absent.
    Exists(ExistsArgs),

    /// Enumerate keys under a prefix, newest first.
    List(ListArgs),
}

#[derive(Args)]
pub struct SetArgs {
    /// Key to write.
    pub key: String,

    /// Value (JSON is stored structurally, anything else as a string).
    pub value: String,

    /// TTL in seconds; AWSPRIM_DEFAULT_TTL applies when omitted.
    #[arg(long)]
    pub ttl: Option<u64>,

    /// Only write when the key does not exist yet.
    #[arg(long)]
    pub if_not_exists: bool,
}

#[derive(Args)]
pub struct GetArgs {
    /// Key to read.
    pub key: String,

    /// Value to report when the key is absent (exit 0 instead of 1).
    #[arg(long)]
    pub default: Option<String>,
}

#[derive(Args)]
pub struct DeleteArgs {
    /// Key to delete.
    pub key: String,

    /// Only delete when the stored value matches.
    #[arg(long)]
    pub if_value: Option<String>,
}

#[derive(Args)]
pub struct ExistsArgs {
    /// Key to probe.
    pub key: String,
}

#[derive(Args)]
pub struct ListArgs {
    /// Key prefix (empty matches everything).
    #[arg(default_value = "")]
    pub prefix: String,

    /// Maximum number of keys.
    #[arg(long)]
    pub limit: Option<u32>,
}

impl KvCommand {
    pub async fn run(self, ctx: &ToolContext, format: OutputFormat) -> Result<i32, PrimitiveError> {
        let kv = KvOps::new(ctx.item_store());
        match self {
            KvCommand::Set(args) => {
                let ttl = args.ttl.or(ctx.config.default_ttl);
                let entry = kv
                    .set(&args.key, parse_value(&args.value), ttl, args.if_not_exists)
                    .await?;
                emit(&entry, &entry.value.to_string(), format);
                Ok(0)
            }
            KvCommand::Get(args) => {
                let entry = kv.get(&args.key, args.default.as_deref().map(parse_value)).await?;
                let primary = match &entry.value {
                    serde_json::Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                emit(&entry, &primary, format);
                Ok(0)
            }
            KvCommand::Delete(args) => {
                kv.delete(&args.key, args.if_value.as_deref().map(parse_value)).await?;
                emit(
                    &serde_json::json!({"key": args.key, "deleted": true}),
                    "deleted",
                    format,
                );
                Ok(0)
            }
            KvCommand::Exists(args) => {
                let present = kv.exists(&args.key).await?;
                emit(
                    &serde_json::json!({"key": args.key, "exists": present}),
                    if present { "true" } else { "false" },
                    format,
                );
                Ok(if present { 0 } else { 1 })
            }
            KvCommand::List(args) => {
                let entries = kv.list(&args.prefix, args.limit).await?;
                emit_list(&entries, "keys", |entry| entry.key.clone(), format);
                Ok(0)
            }
        }
    }
}
