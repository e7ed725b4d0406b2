//! Coordination primitives over the shared item store.
//!
//! Each primitive is a thin, stateless handle around an [`ItemStore`]:
//!
//! - [`KvOps`] - key/value pairs with TTL and conditional writes
//! - [`CounterOps`] - atomic increment/decrement
//! - [`LockOps`] - distributed locks with fencing
//! - [`LeaderOps`] - TTL-based leader election
//! - [`QueueOps`] - priority/FIFO work queues with visibility timeouts
//! - [`SetOps`] / [`ListOps`] - member collections
//! - [`TransactionOps`] - atomic multi-item batches
//! - [`StatsOps`] - cross-collection counts via the type index
//!
//! All cross-process correctness is delegated to the store's conditional
//! writes and transactions; no local locks are involved. Every handle is
//! generic over the store so the whole layer runs unchanged against the
//! in-memory store in tests.

pub mod counter;
pub mod info;
pub mod kv;
pub mod leader;
pub mod list;
pub mod lock;
pub mod queue;
pub mod set;
pub mod transaction;

use awsprim_core::PrimitiveError;
use awsprim_store::StoreError;

pub use counter::CounterOps;
pub use info::StatsOps;
pub use kv::KvOps;
pub use leader::LeaderOps;
pub use list::ListOps;
pub use lock::LockOps;
pub use queue::QueueOps;
pub use set::SetOps;
pub use transaction::TransactionOps;

/// Map a non-semantic driver failure to the user-facing taxonomy.
///
/// `Conflict` and `TransactionCanceled` normally carry primitive-level
/// meaning and are intercepted by the calling operation before this runs;
/// reaching here they degrade to a generic condition failure.
pub(crate) fn fault(err: StoreError) -> PrimitiveError {
    match err {
        StoreError::NotFound => PrimitiveError::NotFound {
            message: "item not found".to_string(),
            solution: "Check the key and namespace.".to_string(),
        },
        StoreError::Conflict { message } => PrimitiveError::ConditionFailed {
            message,
            solution: "Re-read the current state and retry with matching expectations.".to_string(),
        },
        StoreError::TransactionCanceled { reasons } => PrimitiveError::ConditionFailed {
            message: format!("transaction canceled: {}", reasons.join(", ")),
            solution: "Inspect the failed actions and retry the batch.".to_string(),
        },
        StoreError::Throttled { message } => PrimitiveError::Throttled { message },
        StoreError::Forbidden { message } => PrimitiveError::PermissionDenied { message },
        StoreError::TableMissing { table } => PrimitiveError::NotFound {
            message: format!("table '{table}' does not exist"),
            solution: format!("Create it with 'awsprim table create --table {table}'."),
        },
        StoreError::InvalidRequest { message } => PrimitiveError::InvalidArgument {
            message,
            solution: "Fix the request parameters and retry.".to_string(),
        },
        StoreError::Service { message } => PrimitiveError::Service { message },
    }
}
