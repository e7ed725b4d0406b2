//! User-facing error taxonomy.
//!
//! Every primitive returns `Result<_, PrimitiveError>`. The CLI shell
//! translates the variant into a process exit code and a two-section
//! stderr envelope (`Error:` cause, `Solution:` remedy). Variants carry
//! both lines so the remedy can name the exact follow-up command.

use snafu::Snafu;

/// Errors surfaced to the user by any primitive.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum PrimitiveError {
    /// The addressed entity is absent.
    #[snafu(display("{message}"))]
    NotFound { message: String, solution: String },

    /// An if-absent precondition failed.
    #[snafu(display("{message}"))]
    AlreadyExists { message: String, solution: String },

    /// A conditional write other than existence failed (wrong value,
    /// wrong owner, wrong version).
    #[snafu(display("{message}"))]
    ConditionFailed { message: String, solution: String },

    /// Lock held, not leader, dedup hit, or similar contention outcome.
    #[snafu(display("{message}"))]
    CoordinationUnavailable { message: String, solution: String },

    /// Shape / range / format violation detected before any remote call.
    #[snafu(display("{message}"))]
    InvalidArgument { message: String, solution: String },

    /// The backend signaled a retryable throttling condition.
    #[snafu(display("{message}"))]
    Throttled { message: String },

    /// The backend signaled a permanent failure.
    #[snafu(display("{message}"))]
    Service { message: String },

    /// Authorization failure.
    #[snafu(display("{message}"))]
    PermissionDenied { message: String },

    /// The global deadline elapsed.
    #[snafu(display("{message}"))]
    Timeout { message: String },
}

impl PrimitiveError {
    /// Process exit code for this error.
    ///
    /// 1 logical not-found, 2 invalid arguments, 3 remote service failure,
    /// 4 coordination unavailability or failed precondition, 5 timeout.
    pub fn exit_code(&self) -> i32 {
        match self {
            PrimitiveError::NotFound { .. } => 1,
            PrimitiveError::InvalidArgument { .. } => 2,
            PrimitiveError::Throttled { .. }
            | PrimitiveError::Service { .. }
            | PrimitiveError::PermissionDenied { .. } => 3,
            PrimitiveError::AlreadyExists { .. }
            | PrimitiveError::ConditionFailed { .. }
            | PrimitiveError::CoordinationUnavailable { .. } => 4,
            PrimitiveError::Timeout { .. } => 5,
        }
    }

    /// The actionable remedy line for the stderr envelope.
    pub fn solution(&self) -> &str {
        match self {
            PrimitiveError::NotFound { solution, .. }
            | PrimitiveError::AlreadyExists { solution, .. }
            | PrimitiveError::ConditionFailed { solution, .. }
            | PrimitiveError::CoordinationUnavailable { solution, .. }
            | PrimitiveError::InvalidArgument { solution, .. } => solution,
            PrimitiveError::Throttled { .. } => {
                "The service is shedding load; retry with backoff or reduce request rate."
            }
            PrimitiveError::Service { .. } => {
                "Check service health and network connectivity, then retry."
            }
            PrimitiveError::PermissionDenied { .. } => {
                "Check the active AWS credentials and IAM policy for this resource."
            }
            PrimitiveError::Timeout { .. } => {
                "Increase --timeout or retry when the service is less loaded."
            }
        }
    }

    /// True for failures worth replaying through the backoff utility.
    pub fn is_transient(&self) -> bool {
        matches!(self, PrimitiveError::Throttled { .. })
    }

    /// Shorthand for an invalid-argument error with a remedy line.
    pub fn invalid(message: impl Into<String>, solution: impl Into<String>) -> Self {
        PrimitiveError::InvalidArgument {
            message: message.into(),
            solution: solution.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_the_contract() {
        let not_found = PrimitiveError::NotFound {
            message: "missing".into(),
            solution: "create it".into(),
        };
        assert_eq!(not_found.exit_code(), 1);

        let invalid = PrimitiveError::invalid("bad name", "rename it");
        assert_eq!(invalid.exit_code(), 2);

        let throttled = PrimitiveError::Throttled { message: "slow down".into() };
        assert_eq!(throttled.exit_code(), 3);

        let held = PrimitiveError::CoordinationUnavailable {
            message: "lock held".into(),
            solution: "wait".into(),
        };
        assert_eq!(held.exit_code(), 4);

        let timeout = PrimitiveError::Timeout { message: "deadline".into() };
        assert_eq!(timeout.exit_code(), 5);
    }

    #[test]
    fn every_variant_has_a_solution() {
        let errors = [
            PrimitiveError::Throttled { message: "t".into() },
            PrimitiveError::Service { message: "s".into() },
            PrimitiveError::PermissionDenied { message: "p".into() },
            PrimitiveError::Timeout { message: "d".into() },
        ];
        for e in errors {
            assert!(!e.solution().is_empty());
        }
    }
}
