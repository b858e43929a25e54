//! Allocation maps — per-version traffic shares as whole percentages.
//!
//! The control plane stores shares as decimal fractions in `[0, 1]` with at
//! most two decimal digits. Internally every share is an integer percent so
//! that shifting traffic never accumulates floating-point error.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt;

use crate::error::AllocationError;

/// A whole traffic percentage, 0–100.
pub type Percent = u32;

/// All traffic.
pub const FULL: Percent = 100;

/// Largest accepted distance between `fraction * 100` and a whole percent.
const WHOLE_PERCENT_TOLERANCE: f64 = 1e-6;

/// Traffic shares keyed by version id. Zero shares are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(transparent)]
pub struct AllocationMap {
    shares: BTreeMap<String, Percent>,
}

impl AllocationMap {
    /// Build a map from whole percentages, checking they sum to 100.
    pub fn from_percents<I, K>(shares: I) -> Result<Self, AllocationError>
    where
        I: IntoIterator<Item = (K, Percent)>,
        K: Into<String>,
    {
        let mut map = Self::default();
        for (version, share) in shares {
            map.add(version.into(), share)?;
        }
        map.check_total()?;
        Ok(map)
    }

    /// Build a map from control-plane decimal fractions.
    ///
    /// Every fraction must lie in `[0, 1]` and be a whole percent, and the
    /// whole-percent sum must be exactly 100.
    pub fn from_fractions<I, K>(fractions: I) -> Result<Self, AllocationError>
    where
        I: IntoIterator<Item = (K, f64)>,
        K: Into<String>,
    {
        let mut map = Self::default();
        for (version, value) in fractions {
            let version = version.into();
            if !(0.0..=1.0).contains(&value) {
                return Err(AllocationError::OutOfRange { version, value });
            }
            let scaled = value * f64::from(FULL);
            let rounded = scaled.round();
            if (scaled - rounded).abs() > WHOLE_PERCENT_TOLERANCE {
                return Err(AllocationError::FractionalPercent { version, value });
            }
            map.add(version, rounded as Percent)?;
        }
        map.check_total()?;
        Ok(map)
    }

    /// Convert back to decimal fractions for the control plane.
    pub fn to_fractions(&self) -> BTreeMap<String, f64> {
        self.shares
            .iter()
            .map(|(version, share)| (version.clone(), f64::from(*share) / f64::from(FULL)))
            .collect()
    }

    /// Share of a version, 0 if absent.
    pub fn get(&self, version: &str) -> Percent {
        self.shares.get(version).copied().unwrap_or(0)
    }

    /// Set the share of a version. A zero share removes the entry.
    pub(crate) fn set(&mut self, version: impl Into<String>, share: Percent) {
        let version = version.into();
        if share == 0 {
            self.shares.remove(&version);
        } else {
            self.shares.insert(version, share);
        }
    }

    /// Add to a version's share, rejecting a share or total past `u32`.
    fn add(&mut self, version: String, share: Percent) -> Result<(), AllocationError> {
        let merged = self.get(&version).checked_add(share);
        let total = self.total().checked_add(share);
        match (merged, total) {
            (Some(merged), Some(_)) => {
                self.set(version, merged);
                Ok(())
            }
            _ => Err(AllocationError::Overflow { version }),
        }
    }

    /// Sum of all shares.
    pub fn total(&self) -> Percent {
        self.shares.values().fold(0, |sum, share| sum.saturating_add(*share))
    }

    /// Sum of the shares of the given versions.
    pub fn total_for<S: AsRef<str>>(&self, versions: &[S]) -> Percent {
        versions
            .iter()
            .fold(0, |sum, v| sum.saturating_add(self.get(v.as_ref())))
    }

    /// Whether the version currently receives any traffic.
    pub fn contains(&self, version: &str) -> bool {
        self.shares.contains_key(version)
    }

    /// Number of versions receiving traffic.
    pub fn len(&self) -> usize {
        self.shares.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shares.is_empty()
    }

    /// Iterate `(version, share)` pairs in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Percent)> {
        self.shares.iter().map(|(v, s)| (v.as_str(), *s))
    }

    /// Version ids ordered oldest first (see [`compare_versions`]).
    pub fn versions_oldest_first(&self) -> Vec<&str> {
        let mut versions: Vec<&str> = self.shares.keys().map(String::as_str).collect();
        versions.sort_by(|a, b| compare_versions(a, b));
        versions
    }

    fn check_total(&self) -> Result<(), AllocationError> {
        let total = self.total();
        if total != FULL {
            return Err(AllocationError::BadTotal { total });
        }
        Ok(())
    }
}

impl fmt::Display for AllocationMap {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for version in self.versions_oldest_first() {
            if !first {
                f.write_str(", ")?;
            }
            first = false;
            write!(f, "{}={}%", version, self.get(version))?;
        }
        Ok(())
    }
}

/// Order version ids oldest first.
///
/// Ids that parse as unsigned integers compare numerically and sort before
/// non-numeric ids; non-numeric ids compare lexicographically.
pub fn compare_versions(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Ok(_), Err(_)) => Ordering::Less,
        (Err(_), Ok(_)) => Ordering::Greater,
        (Err(_), Err(_)) => a.cmp(b),
    }
}
