//! Transaction commands.

use awsprim_coordination::TransactionOps;
use awsprim_core::PrimitiveError;
use clap::Args;
use clap::Subcommand;

use crate::context::ToolContext;
use crate::output::emit;
use crate::output::OutputFormat;

/// Atomic multi-item transactions.
#[derive(Subcommand)]
pub enum TransactionCommand {
    /// Execute a JSON batch from a file or standard input.
    ///
    /// The batch is {"operations": [...]} where each operation carries
    /// "action" (put | update | delete | condition-check), "type"
    /// (kv | counter | lock | leader), "key", and optionally "value",
    /// "amount", "ttl", and "condition" ("absent", "exists", or
    /// {"value-equals": ...}). All-or-nothing: a single failed condition
    /// leaves every item untouched.
    Exec(ExecArgs),
}

#[derive(Args)]
pub struct ExecArgs {
    /// Batch file ('-' or omitted reads standard input).
    #[arg(long)]
    pub file: Option<String>,
}

impl TransactionCommand {
    pub async fn run(self, ctx: &ToolContext, format: OutputFormat) -> Result<i32, PrimitiveError> {
        let TransactionCommand::Exec(args) = self;

        let text = match args.file.as_deref() {
            None | Some("-") => {
                let mut buffer = String::new();
                use tokio::io::AsyncReadExt;
                tokio::io::stdin()
                    .read_to_string(&mut buffer)
                    .await
                    .map_err(|e| PrimitiveError::Service {
                        message: format!("cannot read standard input: {e}"),
                    })?;
                buffer
            }
            Some(path) => tokio::fs::read_to_string(path).await.map_err(|e| {
                PrimitiveError::invalid(
                    format!("cannot read transaction file '{path}': {e}"),
                    "Check the path, or pipe the batch on standard input.",
                )
            })?,
        };

        let store = ctx.item_store();
        let batch = TransactionOps::<awsprim_store::DynamoItemStore>::parse(&text)?;
        let result = TransactionOps::new(store).execute(batch).await?;
        emit(&result, &result.operations_count.to_string(), format);
        Ok(0)
    }
}
