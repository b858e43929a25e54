//! Migration loop — drives allocation steps against the control plane.
//!
//! Each step re-reads the split, plans a bounded shift, submits it, and
//! polls the resulting operation until it completes. Steps repeat after a
//! fixed wait until the deploying versions hold the target share.
//!
//! ```text
//! Computing ──► Submitting ──► Polling ──► Done
//!     │  ▲                        │
//!     │  └──── Waiting ◄──────────┘ (still short of target)
//!     └──► AlreadyComplete
//! ```

use std::time::Duration;

use tracing::{debug, info, warn};

use crate::allocation::{Percent, compare_versions};
use crate::allocator::{Shift, StepPlan, TrafficAllocator};
use crate::control_plane::{ControlPlane, OperationStatus, ShardBy, TrafficSplit};
use crate::error::{MigrateError, MigrateResult};

/// Timing and defaults for a migration.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Delay between operation status checks.
    pub poll_interval: Duration,
    /// Delay between a completed step and the next one.
    pub step_wait: Duration,
    /// Sharding used when the service reports none.
    pub fallback_shard_by: ShardBy,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(2),
            step_wait: Duration::from_secs(30),
            fallback_shard_by: ShardBy::Ip,
        }
    }
}

/// Where the migration loop currently is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationPhase {
    /// Not started.
    Idle,
    /// Reading the split and planning step N.
    Computing { step: usize },
    /// Sending step N to the control plane.
    Submitting { step: usize },
    /// Waiting for the operation applying step N.
    Polling { step: usize, operation: String },
    /// Sleeping before the next step.
    Waiting { step: usize },
    /// Target reached.
    Done,
    /// Target was already met before any step ran.
    AlreadyComplete,
}

/// Non-fatal end states of a migration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The target was reached through the listed steps.
    Completed { steps: Vec<Shift> },
    /// Deploying versions already held the target share; nothing was changed.
    Redundant { current: Percent },
}

/// Runs one migration against a control plane.
pub struct Migrator<C> {
    control: C,
    allocator: TrafficAllocator,
    config: MigrationConfig,
    phase: MigrationPhase,
}

impl<C: ControlPlane> Migrator<C> {
    pub fn new(control: C, allocator: TrafficAllocator, config: MigrationConfig) -> Self {
        Self {
            control,
            allocator,
            config,
            phase: MigrationPhase::Idle,
        }
    }

    pub fn phase(&self) -> &MigrationPhase {
        &self.phase
    }

    pub fn control(&self) -> &C {
        &self.control
    }

    /// Run steps until the target share is reached.
    pub async fn run(&mut self) -> MigrateResult<MigrationOutcome> {
        let mut steps: Vec<Shift> = Vec::new();

        info!(
            deploying = ?self.allocator.deploying(),
            target = self.allocator.target(),
            max_step = self.allocator.max_step(),
            "starting traffic migration"
        );

        loop {
            let step = steps.len() + 1;
            self.phase = MigrationPhase::Computing { step };

            let split = self
                .control
                .get_split()
                .await
                .map_err(MigrateError::control_plane)?;
            self.check_newer_deployment().await?;

            let shift = match self.allocator.step(&split.allocations)? {
                StepPlan::Shift(shift) => shift,
                StepPlan::AlreadyAtTarget { current } if steps.is_empty() => {
                    self.phase = MigrationPhase::AlreadyComplete;
                    warn!(
                        current,
                        target = self.allocator.target(),
                        "deploying versions already at target, nothing to migrate"
                    );
                    return Ok(MigrationOutcome::Redundant { current });
                }
                StepPlan::AlreadyAtTarget { current } => {
                    // Reached between steps by someone else.
                    self.phase = MigrationPhase::Done;
                    info!(current, steps = steps.len(), "traffic migration completed");
                    return Ok(MigrationOutcome::Completed { steps });
                }
            };

            for change in shift.changes() {
                info!(step, "{}: {}% → {}%", change.version, change.from, change.to);
            }

            self.phase = MigrationPhase::Submitting { step };
            let shard_by = match split.shard_by {
                ShardBy::Unspecified => self.config.fallback_shard_by,
                other => other,
            };
            let operation = self
                .control
                .set_split(&TrafficSplit {
                    shard_by,
                    allocations: shift.after.clone(),
                })
                .await
                .map_err(MigrateError::control_plane)?;

            self.phase = MigrationPhase::Polling {
                step,
                operation: operation.clone(),
            };
            self.wait_for_operation(&operation).await?;

            let reached = shift.deployed_total >= self.allocator.target();
            info!(
                step,
                moved = shift.amount,
                deployed = shift.deployed_total,
                target = self.allocator.target(),
                "step applied"
            );
            steps.push(shift);

            if reached {
                self.phase = MigrationPhase::Done;
                info!(steps = steps.len(), "traffic migration completed");
                return Ok(MigrationOutcome::Completed { steps });
            }

            self.phase = MigrationPhase::Waiting { step };
            debug!(wait = ?self.config.step_wait, "waiting before next step");
            tokio::time::sleep(self.config.step_wait).await;
        }
    }

    /// Poll an operation at the fixed interval until it finishes.
    async fn wait_for_operation(&self, operation: &str) -> MigrateResult<()> {
        let mut checks: u32 = 0;
        loop {
            tokio::time::sleep(self.config.poll_interval).await;
            checks += 1;

            match self
                .control
                .operation_status(operation)
                .await
                .map_err(MigrateError::control_plane)?
            {
                OperationStatus::Done => {
                    debug!(operation, checks, "operation done");
                    return Ok(());
                }
                OperationStatus::Failed { message } => {
                    return Err(MigrateError::OperationFailed {
                        operation: operation.to_string(),
                        message,
                    });
                }
                OperationStatus::Pending => {
                    debug!(operation, checks, "operation still running");
                }
            }
        }
    }

    /// Fail if a version newer than every deploying version exists.
    async fn check_newer_deployment(&self) -> MigrateResult<()> {
        let newest = self.allocator.newest_deploying();
        let versions = self
            .control
            .list_versions()
            .await
            .map_err(MigrateError::control_plane)?;

        let newer = versions
            .into_iter()
            .filter(|v| !self.allocator.is_deploying(v))
            .filter(|v| compare_versions(v, newest).is_gt())
            .max_by(|a, b| compare_versions(a, b));

        match newer {
            Some(newer) => Err(MigrateError::NewerDeployment {
                newer,
                deploying: newest.to_string(),
            }),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::Mutex;

    use super::*;
    use crate::allocation::AllocationMap;

    #[derive(Debug, thiserror::Error)]
    #[error("fake control plane: {0}")]
    struct FakeError(String);

    /// In-memory control plane. Splits apply when their operation is done.
    struct FakeControlPlane {
        state: Mutex<FakeState>,
    }

    struct FakeState {
        split: TrafficSplit,
        versions: Vec<String>,
        pending: Option<(String, TrafficSplit)>,
        /// Statuses returned for the next polls before reporting done.
        poll_script: VecDeque<OperationStatus>,
        submitted: Vec<TrafficSplit>,
        /// Splits written by someone else right after each applied step.
        outside_changes: VecDeque<AllocationMap>,
        polls: u32,
        next_op: u32,
        fail_get: bool,
    }

    impl FakeControlPlane {
        fn new(shares: &[(&str, Percent)], versions: &[&str]) -> Self {
            Self {
                state: Mutex::new(FakeState {
                    split: TrafficSplit {
                        shard_by: ShardBy::Ip,
                        allocations: AllocationMap::from_percents(shares.iter().copied()).unwrap(),
                    },
                    versions: versions.iter().map(|v| v.to_string()).collect(),
                    pending: None,
                    poll_script: VecDeque::new(),
                    submitted: Vec::new(),
                    outside_changes: VecDeque::new(),
                    polls: 0,
                    next_op: 0,
                    fail_get: false,
                }),
            }
        }

        fn with_shard_by(self, shard_by: ShardBy) -> Self {
            self.state.lock().unwrap().split.shard_by = shard_by;
            self
        }

        fn script_polls(&self, statuses: impl IntoIterator<Item = OperationStatus>) {
            self.state.lock().unwrap().poll_script.extend(statuses);
        }

        fn change_after_step(&self, shares: &[(&str, Percent)]) {
            let allocations = AllocationMap::from_percents(shares.iter().copied()).unwrap();
            self.state.lock().unwrap().outside_changes.push_back(allocations);
        }

        fn submitted(&self) -> Vec<TrafficSplit> {
            self.state.lock().unwrap().submitted.clone()
        }

        fn polls(&self) -> u32 {
            self.state.lock().unwrap().polls
        }

        fn current(&self) -> AllocationMap {
            self.state.lock().unwrap().split.allocations.clone()
        }
    }

    impl ControlPlane for FakeControlPlane {
        type Error = FakeError;

        async fn get_split(&self) -> Result<TrafficSplit, FakeError> {
            let state = self.state.lock().unwrap();
            if state.fail_get {
                return Err(FakeError("unavailable".into()));
            }
            Ok(state.split.clone())
        }

        async fn set_split(&self, split: &TrafficSplit) -> Result<String, FakeError> {
            let mut state = self.state.lock().unwrap();
            state.next_op += 1;
            let id = format!("apps/test/operations/op-{}", state.next_op);
            state.submitted.push(split.clone());
            state.pending = Some((id.clone(), split.clone()));
            Ok(id)
        }

        async fn operation_status(&self, operation: &str) -> Result<OperationStatus, FakeError> {
            let mut state = self.state.lock().unwrap();
            state.polls += 1;
            let status = state.poll_script.pop_front().unwrap_or(OperationStatus::Done);
            if status == OperationStatus::Done {
                match state.pending.take() {
                    Some((id, split)) if id == operation => state.split = split,
                    _ => return Err(FakeError(format!("unknown operation {operation}"))),
                }
                if let Some(allocations) = state.outside_changes.pop_front() {
                    state.split.allocations = allocations;
                }
            }
            Ok(status)
        }

        async fn list_versions(&self) -> Result<Vec<String>, FakeError> {
            Ok(self.state.lock().unwrap().versions.clone())
        }
    }

    fn fast_config() -> MigrationConfig {
        MigrationConfig {
            poll_interval: Duration::from_millis(500),
            step_wait: Duration::from_secs(5),
            fallback_shard_by: ShardBy::Ip,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn migrates_in_steps_until_target() {
        let control = FakeControlPlane::new(&[("1", 80), ("2", 20)], &["1", "2", "3"]);
        let allocator = TrafficAllocator::new(["3"], 100, 30).unwrap();
        let mut migrator = Migrator::new(control, allocator, fast_config());

        let outcome = migrator.run().await.unwrap();

        let steps = match outcome {
            MigrationOutcome::Completed { steps } => steps,
            other => panic!("expected Completed, got {other:?}"),
        };
        let amounts: Vec<Percent> = steps.iter().map(|s| s.amount).collect();
        assert_eq!(amounts, vec![30, 30, 30, 10]);
        assert_eq!(
            migrator.control().current(),
            AllocationMap::from_percents([("3", 100)]).unwrap()
        );
        assert_eq!(migrator.phase(), &MigrationPhase::Done);
        assert_eq!(migrator.control().submitted().len(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn already_complete_is_redundant() {
        let control = FakeControlPlane::new(&[("1", 10), ("3", 90)], &["1", "3"]);
        let allocator = TrafficAllocator::new(["3"], 90, 30).unwrap();
        let mut migrator = Migrator::new(control, allocator, fast_config());

        let outcome = migrator.run().await.unwrap();

        assert_eq!(outcome, MigrationOutcome::Redundant { current: 90 });
        assert_eq!(migrator.phase(), &MigrationPhase::AlreadyComplete);
        assert!(migrator.control().submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn small_remainder_finishes_in_one_step() {
        let control = FakeControlPlane::new(&[("1", 10), ("3", 90)], &["1", "3"]);
        let allocator = TrafficAllocator::new(["3"], 100, 30).unwrap();
        let mut migrator = Migrator::new(control, allocator, fast_config());

        let outcome = migrator.run().await.unwrap();

        assert!(matches!(outcome, MigrationOutcome::Completed { ref steps } if steps.len() == 1));
        let current = migrator.control().current();
        assert_eq!(current, AllocationMap::from_percents([("3", 100)]).unwrap());
        assert!(!current.contains("1"));
    }

    #[tokio::test(start_paused = true)]
    async fn each_step_starts_from_a_fresh_split() {
        let control = FakeControlPlane::new(&[("1", 100)], &["1", "2", "3"]);
        control.change_after_step(&[("1", 50), ("2", 20), ("3", 30)]);
        let allocator = TrafficAllocator::new(["3"], 100, 30).unwrap();
        let mut migrator = Migrator::new(control, allocator, fast_config());

        let outcome = migrator.run().await.unwrap();

        let submitted = migrator.control().submitted();
        assert_eq!(
            submitted[0].allocations,
            AllocationMap::from_percents([("1", 70), ("3", 30)]).unwrap()
        );
        // Planned from the outside split, not from what step 1 wrote.
        assert_eq!(
            submitted[1].allocations,
            AllocationMap::from_percents([("1", 20), ("2", 20), ("3", 60)]).unwrap()
        );
        assert!(matches!(outcome, MigrationOutcome::Completed { ref steps } if steps.len() == 4));
        assert_eq!(
            migrator.control().current(),
            AllocationMap::from_percents([("3", 100)]).unwrap()
        );
    }

    #[tokio::test(start_paused = true)]
    async fn target_reached_elsewhere_completes() {
        let control = FakeControlPlane::new(&[("1", 100)], &["1", "3"]);
        control.change_after_step(&[("3", 100)]);
        let allocator = TrafficAllocator::new(["3"], 100, 30).unwrap();
        let mut migrator = Migrator::new(control, allocator, fast_config());

        let outcome = migrator.run().await.unwrap();

        match outcome {
            MigrationOutcome::Completed { steps } => {
                assert_eq!(steps.len(), 1);
                assert_eq!(steps[0].deployed_total, 30);
            }
            other => panic!("expected Completed, got {other:?}"),
        }
        assert_eq!(migrator.phase(), &MigrationPhase::Done);
        assert_eq!(migrator.control().submitted().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn polls_until_operation_done() {
        let control = FakeControlPlane::new(&[("1", 100)], &["1", "2"]);
        control.script_polls([OperationStatus::Pending, OperationStatus::Pending]);
        let allocator = TrafficAllocator::new(["2"], 100, 100).unwrap();
        let mut migrator = Migrator::new(control, allocator, fast_config());

        let started = tokio::time::Instant::now();
        migrator.run().await.unwrap();

        assert_eq!(migrator.control().polls(), 3);
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
    }

    #[tokio::test(start_paused = true)]
    async fn waits_between_steps() {
        let control = FakeControlPlane::new(&[("1", 100)], &["1", "2"]);
        let allocator = TrafficAllocator::new(["2"], 100, 50).unwrap();
        let mut migrator = Migrator::new(control, allocator, fast_config());

        let started = tokio::time::Instant::now();
        migrator.run().await.unwrap();

        // Two polls plus one inter-step wait.
        assert_eq!(started.elapsed(), Duration::from_millis(500 + 5000 + 500));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_operation_is_fatal() {
        let control = FakeControlPlane::new(&[("1", 100)], &["1", "2"]);
        control.script_polls([OperationStatus::Failed {
            message: "quota exceeded".into(),
        }]);
        let allocator = TrafficAllocator::new(["2"], 100, 10).unwrap();
        let mut migrator = Migrator::new(control, allocator, fast_config());

        let err = migrator.run().await.unwrap_err();

        match err {
            MigrateError::OperationFailed { operation, message } => {
                assert_eq!(operation, "apps/test/operations/op-1");
                assert_eq!(message, "quota exceeded");
            }
            other => panic!("expected OperationFailed, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn newer_version_aborts_migration() {
        let control = FakeControlPlane::new(&[("1", 100)], &["1", "2", "3"]);
        let allocator = TrafficAllocator::new(["2"], 100, 10).unwrap();
        let mut migrator = Migrator::new(control, allocator, fast_config());

        let err = migrator.run().await.unwrap_err();

        assert!(matches!(
            err,
            MigrateError::NewerDeployment { ref newer, ref deploying } if newer == "3" && deploying == "2"
        ));
        assert!(migrator.control().submitted().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn older_undeployed_versions_are_ignored() {
        let control = FakeControlPlane::new(&[("5", 100)], &["1", "2", "5", "6"]);
        let allocator = TrafficAllocator::new(["6"], 100, 100).unwrap();
        let mut migrator = Migrator::new(control, allocator, fast_config());

        assert!(migrator.run().await.is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn unspecified_shard_by_uses_fallback() {
        let control =
            FakeControlPlane::new(&[("1", 100)], &["1", "2"]).with_shard_by(ShardBy::Unspecified);
        let allocator = TrafficAllocator::new(["2"], 100, 100).unwrap();
        let config = MigrationConfig {
            fallback_shard_by: ShardBy::Cookie,
            ..fast_config()
        };
        let mut migrator = Migrator::new(control, allocator, config);

        migrator.run().await.unwrap();

        assert_eq!(migrator.control().submitted()[0].shard_by, ShardBy::Cookie);
    }

    #[tokio::test(start_paused = true)]
    async fn reported_shard_by_is_preserved() {
        let control =
            FakeControlPlane::new(&[("1", 100)], &["1", "2"]).with_shard_by(ShardBy::Random);
        let allocator = TrafficAllocator::new(["2"], 100, 100).unwrap();
        let mut migrator = Migrator::new(control, allocator, fast_config());

        migrator.run().await.unwrap();

        assert_eq!(migrator.control().submitted()[0].shard_by, ShardBy::Random);
    }

    #[tokio::test(start_paused = true)]
    async fn control_plane_errors_propagate() {
        let control = FakeControlPlane::new(&[("1", 100)], &["1", "2"]);
        control.state.lock().unwrap().fail_get = true;
        let allocator = TrafficAllocator::new(["2"], 100, 10).unwrap();
        let mut migrator = Migrator::new(control, allocator, fast_config());

        let err = migrator.run().await.unwrap_err();

        assert!(matches!(err, MigrateError::ControlPlane(_)));
        assert!(err.to_string().contains("unavailable"));
    }
}
