//! Shared foundation for the awsprim toolkit.
//!
//! This crate holds everything the primitive layers have in common:
//!
//! - `error` - the user-facing error taxonomy with exit-code mapping
//! - `keys` - the namespace/key encoder for the single-table layout
//! - `types` - typed item records as stored in the item store
//! - `retry` - exponential backoff with decorrelated jitter
//! - `config` - per-process configuration resolved once at command entry
//!
//! Nothing here performs I/O except `retry`, which sleeps between attempts.

pub mod config;
pub mod constants;
pub mod error;
pub mod keys;
pub mod retry;
pub mod types;

pub use config::ToolConfig;
pub use error::PrimitiveError;
pub use keys::Namespace;
pub use retry::RetryPolicy;
pub use types::ItemMetadata;
pub use types::ItemRecord;
pub use types::ItemType;
pub use types::now_unix_micros;
pub use types::now_unix_secs;
