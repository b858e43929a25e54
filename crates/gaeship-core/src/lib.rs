//! gaeship traffic migration — incremental traffic shifting onto new versions.
//!
//! This crate holds the allocation model and the migration state machine.
//! It knows nothing about HTTP: the remote traffic-split service is reached
//! through the [`ControlPlane`] trait, implemented by `gaeship-admin` for the
//! App Engine Admin API and by in-memory fakes in tests.
//!
//! # Components
//!
//! - **`allocation`** — `AllocationMap` (integer percentages) and version ordering
//! - **`allocator`** — `TrafficAllocator`, computes one bounded shift step
//! - **`control_plane`** — the `ControlPlane` collaborator trait
//! - **`migrator`** — submit/poll loop driving steps until the target is reached
//!
//! # Step algorithm
//!
//! ```text
//! current = sum(alloc[v] for v in deploying)
//! if current >= target: AlreadyAtTarget
//! shift   = min(max_step, target - current)
//! take from non-deploying versions, oldest first, until shift is sourced
//! give sourced / n to each deploying version, remainder to the last one
//! ```

pub mod allocation;
pub mod allocator;
pub mod control_plane;
pub mod error;
pub mod migrator;

pub use allocation::{AllocationMap, FULL, Percent, compare_versions};
pub use allocator::{Shift, StepPlan, TrafficAllocator, VersionChange};
pub use control_plane::{ControlPlane, OperationStatus, ShardBy, TrafficSplit};
pub use error::{AllocationError, BoxError, MigrateError, MigrateResult};
pub use migrator::{MigrationConfig, MigrationOutcome, MigrationPhase, Migrator};
