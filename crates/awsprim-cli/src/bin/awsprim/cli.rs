//! Argument surface and command dispatch.

use awsprim_core::PrimitiveError;
use awsprim_core::ToolConfig;
use clap::Args;
use clap::Parser;
use clap::Subcommand;

use crate::commands::blob::BlobCommand;
use crate::commands::counter::CounterCommand;
use crate::commands::info::InfoCommand;
use crate::commands::kv::KvCommand;
use crate::commands::leader::LeaderCommand;
use crate::commands::list::ListCommand;
use crate::commands::lock::LockCommand;
use crate::commands::mq::MqCommand;
use crate::commands::queue::QueueCommand;
use crate::commands::set::SetCommand;
use crate::commands::table::TableCommand;
use crate::commands::topic::TopicCommand;
use crate::commands::transaction::TransactionCommand;
use crate::context::ToolContext;
use crate::output::OutputFormat;

/// Durable distributed-systems primitives as composable shell commands.
#[derive(Parser)]
#[command(name = "awsprim")]
#[command(version)]
#[command(about = "Durable distributed-systems primitives as composable shell commands")]
#[command(long_about = "Key/value, counters, locks, queues, leader election, sets, lists, \
    transactions, object storage, topics, and message queues, each as one short-lived \
    command against managed cloud services. Output is JSON by default.")]
#[command(propagate_version = true)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalOptions,

    #[command(subcommand)]
    pub command: Commands,
}

/// Global options recognized by every command.
#[derive(Args, Clone)]
pub struct GlobalOptions {
    /// Coordination table name.
    #[arg(long, env = "AWSPRIM_TABLE", global = true)]
    pub table: Option<String>,

    /// AWS region override.
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// AWS profile override.
    #[arg(long, global = true)]
    pub profile: Option<String>,

    /// Output format.
    #[arg(long, value_enum, default_value_t, global = true)]
    pub format: OutputFormat,

    /// Enable debug-level logging.
    #[arg(short = 'v', long = "verbose", global = true)]
    pub verbose: bool,

    /// Suppress all logging (for scripting).
    #[arg(short = 'q', long = "quiet", global = true)]
    pub quiet: bool,

    /// Deadline in seconds for the whole operation, retries included.
    #[arg(long, global = true)]
    pub timeout: Option<u64>,
}

/// Command categories, one per primitive.
#[derive(Subcommand)]
pub enum Commands {
    /// Key/value operations with TTL and conditional writes.
    #[command(subcommand)]
    Kv(KvCommand),

    /// Atomic counter operations.
    #[command(subcommand)]
    Counter(CounterCommand),

    /// Distributed lock operations with fencing.
    #[command(subcommand)]
    Lock(LockCommand),

    /// Priority work-queue operations with visibility timeouts.
    #[command(subcommand)]
    Queue(QueueCommand),

    /// TTL-based leader election.
    #[command(subcommand)]
    Leader(LeaderCommand),

    /// Set membership operations.
    #[command(subcommand)]
    Set(SetCommand),

    /// List operations with stable indices.
    #[command(subcommand)]
    List(ListCommand),

    /// Atomic multi-item transactions.
    #[command(subcommand)]
    Transaction(TransactionCommand),

    /// Coordination-table administration.
    #[command(subcommand)]
    Table(TableCommand),

    /// Object storage: uploads, downloads, sync, metadata.
    #[command(subcommand)]
    Blob(BlobCommand),

    /// Fan-out topic operations.
    #[command(subcommand)]
    Topic(TopicCommand),

    /// Buffered message-queue operations.
    #[command(subcommand)]
    Mq(MqCommand),

    /// Table summary plus per-type item counts.
    Info,

    /// Per-type item counts only.
    Stats,
}

impl Cli {
    /// Execute the selected command; returns the process exit code.
    pub async fn run(self) -> Result<i32, PrimitiveError> {
        let config = ToolConfig::resolve(
            self.global.table.clone(),
            self.global.region.clone(),
            self.global.profile.clone(),
            self.global.timeout,
        )?;
        let format = self.global.format;
        let ctx = ToolContext::connect(config).await;

        // The blob engine enforces the deadline itself (it must abort
        // in-flight multipart uploads); everything else is wrapped here.
        match self.command {
            Commands::Blob(cmd) => cmd.run(&ctx, format).await,
            command => {
                let deadline = ctx.deadline;
                let work = async {
                    match command {
                        Commands::Kv(cmd) => cmd.run(&ctx, format).await,
                        Commands::Counter(cmd) => cmd.run(&ctx, format).await,
                        Commands::Lock(cmd) => cmd.run(&ctx, format).await,
                        Commands::Queue(cmd) => cmd.run(&ctx, format).await,
                        Commands::Leader(cmd) => cmd.run(&ctx, format).await,
                        Commands::Set(cmd) => cmd.run(&ctx, format).await,
                        Commands::List(cmd) => cmd.run(&ctx, format).await,
                        Commands::Transaction(cmd) => cmd.run(&ctx, format).await,
                        Commands::Table(cmd) => cmd.run(&ctx, format).await,
                        Commands::Blob(_) => unreachable!("handled above"),
                        Commands::Topic(cmd) => cmd.run(&ctx, format).await,
                        Commands::Mq(cmd) => cmd.run(&ctx, format).await,
                        Commands::Info => InfoCommand::Info.run(&ctx, format).await,
                        Commands::Stats => InfoCommand::Stats.run(&ctx, format).await,
                    }
                };

                match deadline {
                    Some(deadline) => tokio::time::timeout_at(deadline.into(), work)
                        .await
                        .map_err(|_| PrimitiveError::Timeout {
                            message: "operation exceeded --timeout".to_string(),
                        })?,
                    None => work.await,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn help_parses() {
        let result = Cli::try_parse_from(["awsprim", "--help"]);
        assert!(result.is_err()); // clap renders help via an Err
    }

    #[test]
    fn kv_set_requires_key_and_value() {
        assert!(Cli::try_parse_from(["awsprim", "kv", "set", "k"]).is_err());
        assert!(Cli::try_parse_from(["awsprim", "kv", "set", "k", "v"]).is_ok());
    }

    #[test]
    fn global_options_are_recognized_anywhere() {
        let cli = Cli::try_parse_from([
            "awsprim", "kv", "get", "k", "--table", "t-1", "--format", "value", "--timeout", "30",
        ])
        .unwrap();
        assert_eq!(cli.global.table.as_deref(), Some("t-1"));
        assert_eq!(cli.global.format, OutputFormat::Value);
        assert_eq!(cli.global.timeout, Some(30));
    }

    #[test]
    fn lock_acquire_takes_ttl_owner_wait() {
        let result = Cli::try_parse_from([
            "awsprim", "lock", "acquire", "build", "--ttl", "60", "--owner", "me", "--wait", "10",
        ]);
        assert!(result.is_ok());
    }

    #[test]
    fn queue_pop_parses_visibility() {
        assert!(Cli::try_parse_from(["awsprim", "queue", "pop", "q"]).is_ok());
        assert!(Cli::try_parse_from([
            "awsprim", "queue", "pop", "q", "--visibility-timeout", "300",
        ])
        .is_ok());
    }

    #[test]
    fn blob_put_takes_source_and_uri() {
        assert!(Cli::try_parse_from(["awsprim", "blob", "put", "./f", "s3://b/k"]).is_ok());
        assert!(Cli::try_parse_from(["awsprim", "blob", "put", "./f"]).is_err());
    }

    #[test]
    fn transaction_exec_takes_file() {
        assert!(Cli::try_parse_from(["awsprim", "transaction", "exec", "--file", "batch.json"]).is_ok());
    }

    #[test]
    fn info_and_stats_are_top_level() {
        assert!(Cli::try_parse_from(["awsprim", "info"]).is_ok());
        assert!(Cli::try_parse_from(["awsprim", "stats"]).is_ok());
    }
}
