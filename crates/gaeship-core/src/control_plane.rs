//! The control-plane seam — where traffic splits are read and written.

use std::fmt;
use std::future::Future;

use crate::allocation::AllocationMap;

/// How the control plane assigns requests to versions in a split.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ShardBy {
    /// By client IP address.
    Ip,
    /// By the `GOOGAPPUID` cookie.
    Cookie,
    /// Uniformly at random.
    Random,
    /// Not reported by the service, or a value this client does not know.
    #[default]
    #[serde(other)]
    Unspecified,
}

impl fmt::Display for ShardBy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Unspecified => "UNSPECIFIED",
            Self::Ip => "IP",
            Self::Cookie => "COOKIE",
            Self::Random => "RANDOM",
        })
    }
}

/// A service's traffic split as read from (or written to) the control plane.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficSplit {
    pub shard_by: ShardBy,
    pub allocations: AllocationMap,
}

/// Status of a long-running control-plane operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationStatus {
    /// Still running.
    Pending,
    /// Finished and applied.
    Done,
    /// Finished with an error.
    Failed { message: String },
}

/// Remote traffic-split service for a single application service.
///
/// The remote side is the source of truth: callers re-read the split
/// before every change instead of caching it.
pub trait ControlPlane {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Read the current split.
    fn get_split(&self) -> impl Future<Output = Result<TrafficSplit, Self::Error>> + Send;

    /// Replace the split. Returns the id of the operation applying it.
    fn set_split(
        &self,
        split: &TrafficSplit,
    ) -> impl Future<Output = Result<String, Self::Error>> + Send;

    /// Look up a long-running operation by id.
    fn operation_status(
        &self,
        operation: &str,
    ) -> impl Future<Output = Result<OperationStatus, Self::Error>> + Send;

    /// Ids of every version deployed to the service, serving or not.
    fn list_versions(&self) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shard_by_uses_wire_names() {
        assert_eq!(serde_json::to_string(&ShardBy::Ip).unwrap(), r#""IP""#);
        assert_eq!(serde_json::to_string(&ShardBy::Cookie).unwrap(), r#""COOKIE""#);
        let parsed: ShardBy = serde_json::from_str(r#""RANDOM""#).unwrap();
        assert_eq!(parsed, ShardBy::Random);
    }

    #[test]
    fn unknown_shard_by_is_unspecified() {
        let parsed: ShardBy = serde_json::from_str(r#""SOMETHING_NEW""#).unwrap();
        assert_eq!(parsed, ShardBy::Unspecified);

        let parsed: ShardBy = serde_json::from_str(r#""UNSPECIFIED""#).unwrap();
        assert_eq!(parsed, ShardBy::Unspecified);
        assert_eq!(ShardBy::default(), ShardBy::Unspecified);
    }
}
