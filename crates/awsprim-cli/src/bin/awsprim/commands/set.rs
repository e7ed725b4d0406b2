//! Set commands.

use awsprim_coordination::SetOps;
use awsprim_core::PrimitiveError;
use clap::Args;
use clap::Subcommand;

use crate::context::ToolContext;
use crate::output::emit;
use crate::output::OutputFormat;

/// Set membership operations.
#[derive(Subcommand)]
pub enum SetCommand {
    /// Add a member (idempotent).
    Add(MemberArgs),

    /// Remove a member (idempotent).
    Rem(MemberArgs),

    /// Probe membership. Exit 0 when present, 1 when absent.
    Ismember(MemberArgs),

    /// Enumerate all members.
    Members(NameArgs),

    /// Count distinct members.
    Card(NameArgs),
}

#[derive(Args)]
pub struct MemberArgs {
    /// Set name.
    pub set: String,

    /// Member value.
    pub member: String,
}

#[derive(Args)]
pub struct NameArgs {
    /// Set name.
    pub set: String,
}

impl SetCommand {
    pub async fn run(self, ctx: &ToolContext, format: OutputFormat) -> Result<i32, PrimitiveError> {
        let sets = SetOps::new(ctx.item_store());
        match self {
            SetCommand::Add(args) => {
                sets.add(&args.set, &args.member).await?;
                emit(
                    &serde_json::json!({"set": args.set, "member": args.member, "added": true}),
                    &args.member,
                    format,
                );
                Ok(0)
            }
            SetCommand::Rem(args) => {
                sets.remove(&args.set, &args.member).await?;
                emit(
                    &serde_json::json!({"set": args.set, "member": args.member, "removed": true}),
                    &args.member,
                    format,
                );
                Ok(0)
            }
            SetCommand::Ismember(args) => {
                let present = sets.contains(&args.set, &args.member).await?;
                emit(
                    &serde_json::json!({"set": args.set, "member": args.member, "is_member": present}),
                    if present { "true" } else { "false" },
                    format,
                );
                Ok(if present { 0 } else { 1 })
            }
            SetCommand::Members(args) => {
                let members = sets.members(&args.set).await?;
                emit(&members, &members.count.to_string(), format);
                Ok(0)
            }
            SetCommand::Card(args) => {
                let size = sets.card(&args.set).await?;
                emit(
                    &serde_json::json!({"set": args.set, "size": size}),
                    &size.to_string(),
                    format,
                );
                Ok(0)
            }
        }
    }
}
