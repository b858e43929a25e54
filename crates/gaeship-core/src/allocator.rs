//! Traffic allocator — computes one bounded shift toward the deploying versions.
//!
//! Traffic is drawn from non-deploying versions oldest first and spread
//! evenly over the deploying versions. Integer-division remainder always
//! lands on the last deploying version in the order given.

use crate::allocation::{AllocationMap, FULL, Percent, compare_versions};
use crate::error::AllocationError;

/// Computes incremental reallocations for a fixed set of deploying versions.
#[derive(Debug, Clone)]
pub struct TrafficAllocator {
    deploying: Vec<String>,
    target: Percent,
    max_step: Percent,
}

/// Result of planning a single step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepPlan {
    /// Traffic to move in this step.
    Shift(Shift),
    /// Deploying versions already hold the target share; nothing to do.
    AlreadyAtTarget { current: Percent },
}

/// One reallocation step.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct Shift {
    pub before: AllocationMap,
    pub after: AllocationMap,
    /// Percentage points moved in this step.
    pub amount: Percent,
    /// Share held by deploying versions after the step.
    pub deployed_total: Percent,
}

/// Per-version change within a step.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct VersionChange {
    pub version: String,
    pub from: Percent,
    pub to: Percent,
}

impl TrafficAllocator {
    /// Create an allocator.
    ///
    /// `target` and `max_step` are whole percentages in 1..=100. Duplicate
    /// deploying ids are dropped, keeping the first occurrence.
    pub fn new<I, S>(deploying: I, target: Percent, max_step: Percent) -> Result<Self, AllocationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut unique: Vec<String> = Vec::new();
        for version in deploying {
            let version = version.into();
            if !unique.contains(&version) {
                unique.push(version);
            }
        }

        if unique.is_empty() {
            return Err(AllocationError::NoDeployingVersions);
        }
        if !(1..=FULL).contains(&target) {
            return Err(AllocationError::InvalidTarget(target));
        }
        if !(1..=FULL).contains(&max_step) {
            return Err(AllocationError::InvalidStep(max_step));
        }

        Ok(Self {
            deploying: unique,
            target,
            max_step,
        })
    }

    pub fn deploying(&self) -> &[String] {
        &self.deploying
    }

    pub fn target(&self) -> Percent {
        self.target
    }

    pub fn max_step(&self) -> Percent {
        self.max_step
    }

    /// Whether `version` is one of the deploying versions.
    pub fn is_deploying(&self, version: &str) -> bool {
        self.deploying.iter().any(|v| v == version)
    }

    /// Newest deploying version by [`compare_versions`].
    pub fn newest_deploying(&self) -> &str {
        self.deploying
            .iter()
            .max_by(|a, b| compare_versions(a, b))
            .map(String::as_str)
            .unwrap_or_default()
    }

    /// Share currently held by the deploying versions.
    pub fn deployed_total(&self, allocations: &AllocationMap) -> Percent {
        allocations.total_for(&self.deploying)
    }

    /// Plan the next step from the current allocations.
    pub fn step(&self, current: &AllocationMap) -> Result<StepPlan, AllocationError> {
        let deployed = self.deployed_total(current);
        if deployed >= self.target {
            return Ok(StepPlan::AlreadyAtTarget { current: deployed });
        }

        let wanted = self.max_step.min(self.target - deployed);
        let mut next = current.clone();
        let mut sourced: Percent = 0;

        for version in current.versions_oldest_first() {
            if sourced == wanted {
                break;
            }
            if self.is_deploying(version) {
                continue;
            }
            let share = current.get(version);
            let take = share.min(wanted - sourced);
            next.set(version, share - take);
            sourced += take;
        }

        // Only reachable for maps that skipped the sum check
        // (`AllocationMap::default()` or a deserialized map).
        if sourced == 0 {
            return Err(AllocationError::NothingToShift {
                current: deployed,
                target: self.target,
            });
        }

        let count = self.deploying.len() as Percent;
        let each = sourced / count;
        let remainder = sourced % count;
        let last = self.deploying.len() - 1;
        for (index, version) in self.deploying.iter().enumerate() {
            let extra = if index == last { remainder } else { 0 };
            let share = next.get(version) + each + extra;
            next.set(version.as_str(), share);
        }

        Ok(StepPlan::Shift(Shift {
            before: current.clone(),
            deployed_total: self.deployed_total(&next),
            after: next,
            amount: sourced,
        }))
    }

    /// Plan every step from `start` until the target is reached.
    ///
    /// Returns an empty list when `start` already meets the target.
    pub fn plan(&self, start: &AllocationMap) -> Result<Vec<Shift>, AllocationError> {
        let mut steps = Vec::new();
        let mut current = start.clone();
        while let StepPlan::Shift(shift) = self.step(&current)? {
            current = shift.after.clone();
            steps.push(shift);
        }
        Ok(steps)
    }
}

impl Shift {
    /// Versions whose share changed, oldest first.
    pub fn changes(&self) -> Vec<VersionChange> {
        let mut versions: Vec<&str> = self.before.versions_oldest_first();
        for version in self.after.versions_oldest_first() {
            if !versions.contains(&version) {
                versions.push(version);
            }
        }
        versions.sort_by(|a, b| compare_versions(a, b));

        versions
            .into_iter()
            .filter_map(|version| {
                let from = self.before.get(version);
                let to = self.after.get(version);
                (from != to).then(|| VersionChange {
                    version: version.to_string(),
                    from,
                    to,
                })
            })
            .collect()
    }
}
