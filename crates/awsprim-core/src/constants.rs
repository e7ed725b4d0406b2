//! Compiled-in defaults for the toolkit.

/// Default DynamoDB table name when neither `--table` nor `AWSPRIM_TABLE` is set.
pub const DEFAULT_TABLE_NAME: &str = "awsprim-primitives";

/// Default lock TTL in seconds.
pub const DEFAULT_LOCK_TTL_SECS: u64 = 300;

/// Default leader lease TTL in seconds.
pub const DEFAULT_LEADER_TTL_SECS: u64 = 30;

/// Default queue visibility timeout in seconds.
pub const DEFAULT_QUEUE_VISIBILITY_SECS: u64 = 300;

/// Default queue deduplication window in seconds.
pub const DEFAULT_DEDUP_WINDOW_SECS: u64 = 300;

/// Default queue push priority.
pub const DEFAULT_QUEUE_PRIORITY: u64 = 5;

/// Largest encodable queue priority (10 decimal digits).
pub const MAX_QUEUE_PRIORITY: u64 = 9_999_999_999;

/// Lock wait loop backoff base in milliseconds.
pub const LOCK_BACKOFF_BASE_MS: u64 = 100;

/// Lock wait loop backoff cap in milliseconds.
pub const LOCK_BACKOFF_CAP_MS: u64 = 2_000;

/// Bounded retries for the queue pop visibility race.
pub const QUEUE_POP_ATTEMPTS: u32 = 5;

/// Page size for the pop query; visibility is filtered client-side.
pub const QUEUE_POP_PAGE_SIZE: u32 = 16;

/// Maximum actions in one transactional write.
pub const MAX_TRANSACT_ACTIONS: usize = 100;

/// Maximum aggregate payload of one transactional write in bytes.
pub const MAX_TRANSACT_BYTES: usize = 4 * 1024 * 1024;

/// Maximum key / collection name length accepted by the encoder.
pub const MAX_NAME_LEN: usize = 200;

/// Size at or below which a blob upload is a single PUT (100 MiB).
pub const DEFAULT_MULTIPART_THRESHOLD: u64 = 100 * 1024 * 1024;

/// Default multipart chunk size (100 MiB).
pub const DEFAULT_CHUNK_SIZE: u64 = 100 * 1024 * 1024;

/// Hard floor on the chunk size, except for the final part (5 MiB).
pub const MIN_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Hard cap on the chunk size (5 GiB).
pub const MAX_CHUNK_SIZE: u64 = 5 * 1024 * 1024 * 1024;

/// Hard cap on the number of multipart parts.
pub const MAX_MULTIPART_PARTS: u64 = 10_000;

/// Default worker pool size for blob transfers.
pub const DEFAULT_MAX_CONCURRENCY: usize = 10;

/// Minimum buffer size for streamed downloads (8 KiB).
pub const DOWNLOAD_BUFFER_BYTES: usize = 8 * 1024;
