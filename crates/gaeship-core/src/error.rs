//! Error types for allocation and migration.

use thiserror::Error;

use crate::allocation::Percent;

/// Boxed error from a control-plane implementation.
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Result type alias for migration operations.
pub type MigrateResult<T> = Result<T, MigrateError>;

/// Invalid allocation input or an impossible step.
#[derive(Debug, Error, PartialEq)]
pub enum AllocationError {
    #[error("allocation for version {version} is out of range: {value}")]
    OutOfRange { version: String, value: f64 },

    #[error("allocation for version {version} is not a whole percent: {value}")]
    FractionalPercent { version: String, value: f64 },

    #[error("allocations must sum to 100%, got {total}%")]
    BadTotal { total: Percent },

    #[error("allocation for version {version} overflows the total")]
    Overflow { version: String },

    #[error("no deploying versions given")]
    NoDeployingVersions,

    #[error("target percentage must be between 1 and 100, got {0}")]
    InvalidTarget(Percent),

    #[error("step percentage must be between 1 and 100, got {0}")]
    InvalidStep(Percent),

    #[error("no traffic left on other versions to shift ({current}% of {target}% allocated)")]
    NothingToShift { current: Percent, target: Percent },
}

/// Fatal migration failures.
///
/// A redundant migration is not an error; see
/// [`MigrationOutcome::Redundant`](crate::MigrationOutcome::Redundant).
#[derive(Debug, Error)]
pub enum MigrateError {
    #[error(transparent)]
    Allocation(#[from] AllocationError),

    #[error("newer version {newer} exists while migrating to {deploying}")]
    NewerDeployment { newer: String, deploying: String },

    #[error("operation {operation} failed: {message}")]
    OperationFailed { operation: String, message: String },

    #[error("control plane error: {0}")]
    ControlPlane(#[source] BoxError),
}

impl MigrateError {
    pub(crate) fn control_plane<E>(err: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::ControlPlane(Box::new(err))
    }
}
