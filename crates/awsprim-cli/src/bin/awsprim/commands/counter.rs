//! Atomic counter commands.

use awsprim_coordination::CounterOps;
use awsprim_core::PrimitiveError;
use clap::Args;
use clap::Subcommand;

use crate::context::ToolContext;
use crate::output::emit;
use crate::output::OutputFormat;

/// Atomic counter operations.
#[derive(Subcommand)]
pub enum CounterCommand {
    /// Atomically add to a counter.
    Inc(IncArgs),

    /// Atomically subtract from a counter.
    Dec(IncArgs),

    /// Read the current value (strongly consistent).
    Get(GetArgs),

    /// Remove a counter.
    Delete(GetArgs),
}

#[derive(Args)]
pub struct IncArgs {
    /// Counter key.
    pub key: String,

    /// Amount (non-zero; negatives allowed).
    #[arg(long, default_value = "1", allow_hyphen_values = true)]
    pub by: i64,

    /// Create the counter when it does not exist yet.
    #[arg(long)]
    pub create: bool,
}

#[derive(Args)]
pub struct GetArgs {
    /// Counter key.
    pub key: String,
}

impl CounterCommand {
    pub async fn run(self, ctx: &ToolContext, format: OutputFormat) -> Result<i32, PrimitiveError> {
        let counters = CounterOps::new(ctx.item_store());
        match self {
            CounterCommand::Inc(args) => {
                let value = counters.increment(&args.key, args.by, args.create).await?;
                emit(&value, &value.value.to_string(), format);
                Ok(0)
            }
            CounterCommand::Dec(args) => {
                let value = counters.decrement(&args.key, args.by, args.create).await?;
                emit(&value, &value.value.to_string(), format);
                Ok(0)
            }
            CounterCommand::Get(args) => {
                let value = counters.get(&args.key).await?;
                emit(&value, &value.value.to_string(), format);
                Ok(0)
            }
            CounterCommand::Delete(args) => {
                counters.delete(&args.key).await?;
                emit(
                    &serde_json::json!({"key": args.key, "deleted": true}),
                    "deleted",
                    format,
                );
                Ok(0)
            }
        }
    }
}
