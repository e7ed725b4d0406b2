//! Blob storage layer: the S3 transfer engine and metadata surface.
//!
//! - `uri` - `s3://` URI model, byte ranges, stdin/stdout endpoints
//! - `store` - client construction and error classification
//! - `transfer` - single-PUT / multipart uploads, streaming downloads
//! - `walk` - local enumeration with include/exclude globs
//! - `sync` - directory transfers and ETag-based synchronization
//! - `metadata` - head, tags, versions, presigned URLs, selection

pub mod metadata;
pub mod store;
pub mod sync;
pub mod transfer;
pub mod uri;
pub mod walk;

pub use store::BlobStore;
pub use store::BlobStoreConfig;
pub use transfer::GetOptions;
pub use transfer::GetOutcome;
pub use transfer::PutCondition;
pub use transfer::PutOptions;
pub use transfer::PutOutcome;
pub use transfer::TransferConfig;
pub use uri::ByteRange;
pub use uri::LocalEndpoint;
pub use uri::S3Uri;
pub use walk::GlobFilter;
