//! Table summary and per-type statistics.

use awsprim_coordination::StatsOps;
use awsprim_core::PrimitiveError;
use clap::Subcommand;

use super::table::table_fault;
use crate::context::ToolContext;
use crate::output::emit;
use crate::output::OutputFormat;

/// Informational commands.
#[derive(Subcommand)]
pub enum InfoCommand {
    /// Table status plus per-type item counts.
    Info,

    /// Per-type item counts only.
    Stats,
}

impl InfoCommand {
    pub async fn run(self, ctx: &ToolContext, format: OutputFormat) -> Result<i32, PrimitiveError> {
        let stats = StatsOps::new(ctx.item_store());
        match self {
            InfoCommand::Stats => {
                let report = stats.stats().await?;
                emit(&report, &report.total.to_string(), format);
                Ok(0)
            }
            InfoCommand::Info => {
                let summary = ctx.table_admin().describe().await.map_err(table_fault)?;
                let report = stats.stats().await?;
                let combined = serde_json::json!({
                    "table": summary.table,
                    "status": summary.status,
                    "billing_mode": summary.billing_mode,
                    "ttl_enabled": summary.ttl_enabled,
                    "size_bytes": summary.size_bytes,
                    "counts": report.counts,
                    "total": report.total,
                });
                emit(&combined, &summary.status, format);
                Ok(0)
            }
        }
    }
}
