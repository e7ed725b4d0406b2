//! Per-process configuration.
//!
//! Resolution order for each knob: command-line argument, then environment
//! variable, then compiled-in default. Resolution happens exactly once at
//! command entry; the resulting record is passed by parameter everywhere
//! (no globals, no thread-locals).

use std::time::Duration;

use crate::constants;
use crate::error::PrimitiveError;

/// Environment variable naming the DynamoDB table.
pub const ENV_TABLE: &str = "AWSPRIM_TABLE";
/// Environment variable for the default KV TTL in seconds.
pub const ENV_DEFAULT_TTL: &str = "AWSPRIM_DEFAULT_TTL";
/// Environment variable for the default lock TTL in seconds.
pub const ENV_LOCK_TTL: &str = "AWSPRIM_LOCK_TTL";
/// Environment variable for the default queue visibility timeout in seconds.
pub const ENV_QUEUE_VISIBILITY: &str = "AWSPRIM_QUEUE_VISIBILITY";
/// Environment variable for the single-PUT/multipart threshold in bytes.
pub const ENV_MULTIPART_THRESHOLD: &str = "AWSPRIM_MULTIPART_THRESHOLD";
/// Environment variable for the multipart chunk size in bytes.
pub const ENV_CHUNK_SIZE: &str = "AWSPRIM_CHUNK_SIZE";
/// Environment variable for the transfer worker pool size.
pub const ENV_MAX_CONCURRENCY: &str = "AWSPRIM_MAX_CONCURRENCY";

/// Resolved per-process configuration.
#[derive(Debug, Clone)]
pub struct ToolConfig {
    /// DynamoDB table holding every coordination primitive.
    pub table: String,
    /// AWS region override; SDK default chain when absent.
    pub region: Option<String>,
    /// AWS profile override; SDK default chain when absent.
    pub profile: Option<String>,
    /// Global deadline for the whole operation, including retries.
    pub timeout: Option<Duration>,
    /// Default TTL applied to `kv set` when `--ttl` is omitted.
    pub default_ttl: Option<u64>,
    /// Default lock TTL in seconds.
    pub lock_ttl: u64,
    /// Default queue visibility timeout in seconds.
    pub queue_visibility: u64,
    /// Queue deduplication window in seconds.
    pub dedup_window: u64,
    /// Single-PUT/multipart threshold in bytes.
    pub multipart_threshold: u64,
    /// Multipart chunk size in bytes.
    pub chunk_size: u64,
    /// Worker pool size for blob transfers.
    pub max_concurrency: usize,
}

impl ToolConfig {
    /// Resolve configuration from explicit arguments and the environment.
    pub fn resolve(
        table_arg: Option<String>,
        region: Option<String>,
        profile: Option<String>,
        timeout_secs: Option<u64>,
    ) -> Result<Self, PrimitiveError> {
        let table = table_arg
            .or_else(|| env_string(ENV_TABLE))
            .unwrap_or_else(|| constants::DEFAULT_TABLE_NAME.to_string());
        validate_table_name(&table)?;

        Ok(Self {
            table,
            region,
            profile,
            timeout: timeout_secs.map(Duration::from_secs),
            default_ttl: env_u64(ENV_DEFAULT_TTL)?,
            lock_ttl: env_u64(ENV_LOCK_TTL)?.unwrap_or(constants::DEFAULT_LOCK_TTL_SECS),
            queue_visibility: env_u64(ENV_QUEUE_VISIBILITY)?
                .unwrap_or(constants::DEFAULT_QUEUE_VISIBILITY_SECS),
            dedup_window: constants::DEFAULT_DEDUP_WINDOW_SECS,
            multipart_threshold: env_u64(ENV_MULTIPART_THRESHOLD)?
                .unwrap_or(constants::DEFAULT_MULTIPART_THRESHOLD),
            chunk_size: env_u64(ENV_CHUNK_SIZE)?.unwrap_or(constants::DEFAULT_CHUNK_SIZE),
            max_concurrency: env_u64(ENV_MAX_CONCURRENCY)?
                .map(|n| n.max(1) as usize)
                .unwrap_or(constants::DEFAULT_MAX_CONCURRENCY),
        })
    }
}

/// Default client identity for lock owners and leader candidates:
/// `<hostname>-<pid>`.
pub fn default_owner() -> String {
    let host = std::env::var("HOSTNAME")
        .ok()
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "local".to_string());
    format!("{host}-{}", std::process::id())
}

/// Validate a DynamoDB table name: 3-255 characters of `[A-Za-z0-9_.-]`.
pub fn validate_table_name(table: &str) -> Result<(), PrimitiveError> {
    if table.len() < 3 || table.len() > 255 {
        return Err(PrimitiveError::invalid(
            format!("table name must be 3-255 characters, got {}", table.len()),
            "Pick a table name between 3 and 255 characters.",
        ));
    }
    if let Some(bad) = table
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(PrimitiveError::invalid(
            format!("table name contains invalid character '{bad}'"),
            "Table names may contain letters, digits, hyphens, underscores, and periods.",
        ));
    }
    Ok(())
}

fn env_string(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

fn env_u64(name: &str) -> Result<Option<u64>, PrimitiveError> {
    match env_string(name) {
        None => Ok(None),
        Some(raw) => raw.parse::<u64>().map(Some).map_err(|_| {
            PrimitiveError::invalid(
                format!("{name} must be a non-negative integer, got '{raw}'"),
                format!("Fix or unset the {name} environment variable."),
            )
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_names_are_validated() {
        assert!(validate_table_name("awsprim-primitives").is_ok());
        assert!(validate_table_name("ab").is_err());
        assert!(validate_table_name("bad table").is_err());
        assert!(validate_table_name(&"x".repeat(256)).is_err());
    }

    #[test]
    fn default_owner_includes_the_pid() {
        let owner = default_owner();
        assert!(owner.ends_with(&std::process::id().to_string()));
        assert!(owner.contains('-'));
    }

    #[test]
    fn explicit_table_argument_wins() {
        let config =
            ToolConfig::resolve(Some("explicit-table".into()), None, None, Some(30)).unwrap();
        assert_eq!(config.table, "explicit-table");
        assert_eq!(config.timeout, Some(Duration::from_secs(30)));
        assert_eq!(config.lock_ttl, crate::constants::DEFAULT_LOCK_TTL_SECS);
    }
}
