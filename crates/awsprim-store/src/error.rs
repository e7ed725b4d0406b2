//! Driver-level error contract.

use snafu::Snafu;

/// Errors from item-store operations.
///
/// `Conflict` is never retried internally: a failed condition carries
/// primitive-level meaning (lock held, wrong owner, already exists) that
/// only the calling primitive can interpret. `Throttled` is the one kind a
/// caller may treat as retryable by default.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum StoreError {
    /// The addressed item does not exist.
    #[snafu(display("item not found"))]
    NotFound,

    /// A condition expression failed.
    #[snafu(display("condition failed: {message}"))]
    Conflict { message: String },

    /// A transactional write was canceled; one reason per action, in order.
    #[snafu(display("transaction canceled: [{}]", reasons.join(", ")))]
    TransactionCanceled { reasons: Vec<String> },

    /// The service is shedding load; retryable.
    #[snafu(display("throttled: {message}"))]
    Throttled { message: String },

    /// Authorization failure.
    #[snafu(display("access denied: {message}"))]
    Forbidden { message: String },

    /// The table itself does not exist.
    #[snafu(display("table '{table}' not found"))]
    TableMissing { table: String },

    /// The request was rejected before any network call.
    #[snafu(display("invalid request: {message}"))]
    InvalidRequest { message: String },

    /// Any other service failure.
    #[snafu(display("service error: {message}"))]
    Service { message: String },
}

impl StoreError {
    /// True for the errors the retry utility may replay.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Throttled { .. })
    }
}
