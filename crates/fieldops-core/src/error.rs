use thiserror::Error;

use crate::ids::{BranchId, SupervisorId};

/// Hard errors: conditions that abort a run, or abort one subproblem while
/// its siblings continue (§7). Anything recoverable — warnings, retry-loop
/// attempts, split-window degeneracy — goes through [`crate::diagnostics::Diagnostics`]
/// instead of this enum.
#[derive(Error, Debug)]
pub enum FieldOpsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("malformed input at {context}: {message}")]
    InputShape { context: String, message: String },

    #[error("asset {asset} references unknown partner {partner}")]
    UnknownPartner { asset: String, partner: String },

    #[error("travel matrix missing pair ({from} -> {to}) in branch {branch}")]
    MissingTravelPair {
        branch: BranchId,
        from: String,
        to: String,
    },

    #[error("weekly schedule infeasible for branch {branch}: {message}")]
    ScheduleInfeasible { branch: BranchId, message: String },

    #[error("VRPTW subproblem (branch {branch}, supervisor {supervisor}, day {day}) found no incumbent within the deadline")]
    RoutingTimeout {
        branch: BranchId,
        supervisor: SupervisorId,
        day: u8,
    },

    #[error("capacity retry loop diverged after {attempts} attempts for branch {branch}")]
    RetryDiverged { branch: BranchId, attempts: u32 },

    #[error("invalid split-eligibility flag for asset {asset}: {value:?}")]
    InvalidSplitFlag { asset: String, value: String },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type FieldOpsResult<T> = Result<T, FieldOpsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn input_shape_error_carries_context() {
        let err = FieldOpsError::InputShape {
            context: "assets.csv:14".into(),
            message: "unparseable service_time_min".into(),
        };
        assert!(err.to_string().contains("assets.csv:14"));
    }

    #[test]
    fn question_mark_converts_anyhow() {
        fn inner() -> anyhow::Result<()> {
            anyhow::bail!("boom")
        }
        fn outer() -> FieldOpsResult<()> {
            inner()?;
            Ok(())
        }
        let err = outer().unwrap_err();
        assert!(matches!(err, FieldOpsError::Other(_)));
    }
}
