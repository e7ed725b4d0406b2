//! Leader election commands.

use awsprim_coordination::LeaderOps;
use awsprim_core::config::default_owner;
use awsprim_core::constants::DEFAULT_LEADER_TTL_SECS;
use awsprim_core::PrimitiveError;
use clap::Args;
use clap::Subcommand;

use crate::context::ToolContext;
use crate::output::emit;
use crate::output::OutputFormat;

/// TTL-based leader election.
#[derive(Subcommand)]
pub enum LeaderCommand {
    /// Attempt to become leader of a pool.
    Elect(ElectArgs),

    /// Renew the leadership lease; fails once leadership is lost.
    Heartbeat(ElectArgs),

    /// Observe a pool. Exit 0 when a live leader exists, 1 otherwise.
    Check(CheckArgs),

    /// Step down from leadership (idempotent when already vacant).
    Resign(ResignArgs),
}

#[derive(Args)]
pub struct ElectArgs {
    /// Pool name.
    pub pool: String,

    /// Lease TTL in seconds.
    #[arg(long, default_value_t = DEFAULT_LEADER_TTL_SECS)]
    pub ttl: u64,

    /// Candidate identity; defaults to <hostname>-<pid>.
    #[arg(long)]
    pub id: Option<String>,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Pool name.
    pub pool: String,
}

#[derive(Args)]
pub struct ResignArgs {
    /// Pool name.
    pub pool: String,

    /// Leader identity; defaults to <hostname>-<pid>.
    #[arg(long)]
    pub id: Option<String>,
}

impl LeaderCommand {
    pub async fn run(self, ctx: &ToolContext, format: OutputFormat) -> Result<i32, PrimitiveError> {
        let leaders = LeaderOps::new(ctx.item_store());
        match self {
            LeaderCommand::Elect(args) => {
                let id = args.id.unwrap_or_else(default_owner);
                let leadership = leaders.elect(&args.pool, args.ttl, &id).await?;
                emit(&leadership, &leadership.leader, format);
                Ok(0)
            }
            LeaderCommand::Heartbeat(args) => {
                let id = args.id.unwrap_or_else(default_owner);
                let leadership = leaders.heartbeat(&args.pool, args.ttl, &id).await?;
                emit(&leadership, &leadership.ttl.to_string(), format);
                Ok(0)
            }
            LeaderCommand::Check(args) => match leaders.check(&args.pool).await? {
                Some(leadership) => {
                    emit(&leadership, &leadership.leader, format);
                    Ok(0)
                }
                None => {
                    emit(
                        &serde_json::json!({"pool": args.pool, "leader": null}),
                        "none",
                        format,
                    );
                    Ok(1)
                }
            },
            LeaderCommand::Resign(args) => {
                let id = args.id.unwrap_or_else(default_owner);
                leaders.resign(&args.pool, &id).await?;
                emit(
                    &serde_json::json!({"pool": args.pool, "resigned": true}),
                    "resigned",
                    format,
                );
                Ok(0)
            }
        }
    }
}
