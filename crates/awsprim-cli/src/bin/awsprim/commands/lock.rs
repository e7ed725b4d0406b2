//! Distributed lock commands.

use awsprim_coordination::LockOps;
use awsprim_core::config::default_owner;
use awsprim_core::PrimitiveError;
use clap::Args;
use clap::Subcommand;

use crate::context::ToolContext;
use crate::output::emit;
use crate::output::OutputFormat;

/// Distributed lock operations.
#[derive(Subcommand)]
pub enum LockCommand {
    /// Acquire a lock. Fails fast when held unless --wait is given.
    ///
    /// Returns acquired_at (microseconds) and a monotonic version as the
    /// fencing pair for downstream services.
    Acquire(AcquireArgs),

    /// Release a held lock (idempotent when already free).
    Release(ReleaseArgs),

    /// Extend a held lock's TTL.
    Extend(ExtendArgs),

    /// Observe a lock. Exit 0 when held, 1 when free.
    Check(CheckArgs),
}

#[derive(Args)]
pub struct AcquireArgs {
    /// Lock name.
    pub name: String,

    /// TTL in seconds; AWSPRIM_LOCK_TTL or 300 when omitted.
    #[arg(long)]
    pub ttl: Option<u64>,

    /// Owner identity; defaults to <hostname>-<pid>.
    #[arg(long)]
    pub owner: Option<String>,

    /// Seconds to keep retrying with backoff before giving up.
    #[arg(long, default_value = "0")]
    pub wait: u64,
}

#[derive(Args)]
pub struct ReleaseArgs {
    /// Lock name.
    pub name: String,

    /// Owner identity; defaults to <hostname>-<pid>.
    #[arg(long)]
    pub owner: Option<String>,
}

#[derive(Args)]
pub struct ExtendArgs {
    /// Lock name.
    pub name: String,

    /// New TTL in seconds from now.
    #[arg(long)]
    pub ttl: u64,

    /// Owner identity; defaults to <hostname>-<pid>.
    #[arg(long)]
    pub owner: Option<String>,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Lock name.
    pub name: String,
}

impl LockCommand {
    pub async fn run(self, ctx: &ToolContext, format: OutputFormat) -> Result<i32, PrimitiveError> {
        let locks = LockOps::new(ctx.item_store());
        match self {
            LockCommand::Acquire(args) => {
                let ttl = args.ttl.unwrap_or(ctx.config.lock_ttl);
                let owner = args.owner.unwrap_or_else(default_owner);
                let grant = locks.acquire(&args.name, ttl, &owner, args.wait).await?;
                emit(&grant, &grant.version.to_string(), format);
                Ok(0)
            }
            LockCommand::Release(args) => {
                let owner = args.owner.unwrap_or_else(default_owner);
                let release = locks.release(&args.name, &owner).await?;
                emit(&release, &release.status, format);
                Ok(0)
            }
            LockCommand::Extend(args) => {
                let owner = args.owner.unwrap_or_else(default_owner);
                let grant = locks.extend(&args.name, args.ttl, &owner).await?;
                emit(&grant, &grant.ttl.to_string(), format);
                Ok(0)
            }
            LockCommand::Check(args) => match locks.check(&args.name).await? {
                Some(status) => {
                    emit(&status, &status.owner, format);
                    Ok(0)
                }
                None => {
                    emit(
                        &serde_json::json!({"lock": args.name, "held": false}),
                        "free",
                        format,
                    );
                    Ok(1)
                }
            },
        }
    }
}
