//! Coordination-table administration commands.

use awsprim_core::PrimitiveError;
use awsprim_store::StoreError;
use awsprim_store::TableSummary;
use clap::Args;
use clap::Subcommand;

use crate::context::ToolContext;
use crate::output::emit;
use crate::output::OutputFormat;

/// Coordination-table administration.
#[derive(Subcommand)]
pub enum TableCommand {
    /// Create the table (PK/SK schema, pay-per-request, TTL, type index)
    /// and wait for it to become ACTIVE.
    Create,

    /// Delete the table and everything in it.
    Drop(DropArgs),

    /// Describe the table.
    Status,
}

#[derive(Args)]
pub struct DropArgs {
    /// Required confirmation; dropping removes all stored primitives.
    #[arg(long)]
    pub yes: bool,
}

fn summary_json(summary: &TableSummary) -> serde_json::Value {
    serde_json::json!({
        "table": summary.table,
        "status": summary.status,
        "item_count": summary.item_count,
        "size_bytes": summary.size_bytes,
        "billing_mode": summary.billing_mode,
        "ttl_enabled": summary.ttl_enabled,
        "type_index_status": summary.type_index_status,
    })
}

impl TableCommand {
    pub async fn run(self, ctx: &ToolContext, format: OutputFormat) -> Result<i32, PrimitiveError> {
        let admin = ctx.table_admin();
        match self {
            TableCommand::Create => match admin.create().await {
                Ok(summary) => {
                    emit(&summary_json(&summary), &summary.status, format);
                    Ok(0)
                }
                Err(StoreError::Conflict { .. }) => Err(PrimitiveError::AlreadyExists {
                    message: format!("table '{}' already exists", ctx.config.table),
                    solution: "Use the existing table, or pick another name with --table."
                        .to_string(),
                }),
                Err(e) => Err(table_fault(e)),
            },
            TableCommand::Drop(args) => {
                if !args.yes {
                    return Err(PrimitiveError::invalid(
                        format!(
                            "refusing to drop table '{}' without confirmation",
                            ctx.config.table
                        ),
                        "Re-run with --yes to delete the table and all stored primitives.",
                    ));
                }
                admin.drop().await.map_err(table_fault)?;
                emit(
                    &serde_json::json!({"table": ctx.config.table, "dropped": true}),
                    "dropped",
                    format,
                );
                Ok(0)
            }
            TableCommand::Status => {
                let summary = admin.describe().await.map_err(table_fault)?;
                emit(&summary_json(&summary), &summary.status, format);
                Ok(0)
            }
        }
    }
}

pub(crate) fn table_fault(err: StoreError) -> PrimitiveError {
    match err {
        StoreError::TableMissing { table } => PrimitiveError::NotFound {
            message: format!("table '{table}' does not exist"),
            solution: format!("Create it with 'awsprim table create --table {table}'."),
        },
        StoreError::Forbidden { message } => PrimitiveError::PermissionDenied { message },
        StoreError::Throttled { message } => PrimitiveError::Throttled { message },
        other => PrimitiveError::Service {
            message: other.to_string(),
        },
    }
}
