//! awsprim - durable distributed-systems primitives as shell commands.
//!
//! Each invocation performs one primitive operation against managed cloud
//! services and prints a machine-readable result, making the commands
//! composable from scripts and agents:
//!
//! ```bash
//! # Key/value with TTL
//! awsprim kv set deploy/flag on --ttl 3600
//! awsprim kv get deploy/flag | jq -r .value
//!
//! # Exactly one winner
//! awsprim lock acquire release-train --ttl 600 --owner "$HOSTNAME-$$"
//!
//! # Work distribution
//! awsprim queue push builds '{"commit":"abc123"}' --priority 1
//! awsprim queue pop builds --visibility-timeout 300
//!
//! # Large objects
//! awsprim blob put ./artifact.tar.gz s3://releases/v2/artifact.tar.gz
//! ```
//!
//! Exit codes: 0 success, 1 not found / benign miss, 2 invalid arguments,
//! 3 service error, 4 coordination unavailable, 5 timeout.

mod cli;
mod commands;
mod context;
mod output;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use cli::Cli;

/// Initialize tracing with environment-based filtering.
///
/// `--quiet` silences everything (for scripting); `--verbose` enables
/// debug-level logs; the default shows warnings only.
fn init_tracing(quiet: bool, verbose: bool) {
    let filter = if quiet {
        EnvFilter::new("off")
    } else if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.global.quiet, cli.global.verbose);

    match cli.run().await {
        Ok(exit_code) => std::process::exit(exit_code),
        Err(error) => {
            output::print_error(&error);
            std::process::exit(error.exit_code());
        }
    }
}
