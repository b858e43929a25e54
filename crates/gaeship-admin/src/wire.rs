//! JSON resources of the App Engine Admin API v1.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use gaeship_core::ShardBy;

/// `apps.services` resource (only the fields we use).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Service {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub split: Option<Split>,
}

/// Traffic split of a service. Allocations are decimal fractions.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Split {
    #[serde(default, skip_serializing_if = "is_unspecified")]
    pub shard_by: ShardBy,
    #[serde(default)]
    pub allocations: BTreeMap<String, f64>,
}

fn is_unspecified(shard_by: &ShardBy) -> bool {
    *shard_by == ShardBy::Unspecified
}

/// Body of `PATCH apps.services?updateMask=split`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServicePatch {
    pub split: Split,
}

/// Long-running operation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcStatus>,
}

/// `google.rpc.Status`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcStatus {
    #[serde(default)]
    pub code: i32,
    #[serde(default)]
    pub message: String,
}

/// Error envelope returned with non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorEnvelope {
    pub error: RpcStatus,
}

/// `apps.services.versions` resource (only the fields we use).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Version {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub serving_status: Option<String>,
}

/// Page of `apps.services.versions.list`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListVersionsResponse {
    #[serde(default)]
    pub versions: Vec<Version>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_page_token: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_service_with_split() {
        let json = r#"{
            "name": "apps/demo/services/default",
            "id": "default",
            "split": { "shardBy": "IP", "allocations": { "20240101": 0.8, "20240102": 0.2 } }
        }"#;
        let service: Service = serde_json::from_str(json).unwrap();
        let split = service.split.unwrap();
        assert_eq!(split.shard_by, ShardBy::Ip);
        assert_eq!(split.allocations["20240101"], 0.8);
    }

    #[test]
    fn unspecified_shard_by_is_not_sent() {
        let patch = ServicePatch {
            split: Split {
                shard_by: ShardBy::Unspecified,
                allocations: BTreeMap::from([("v1".to_string(), 1.0)]),
            },
        };
        let json = serde_json::to_string(&patch).unwrap();
        assert_eq!(json, r#"{"split":{"allocations":{"v1":1.0}}}"#);
    }

    #[test]
    fn operation_defaults_to_not_done() {
        let op: Operation = serde_json::from_str(r#"{"name":"apps/demo/operations/abc"}"#).unwrap();
        assert!(!op.done);
        assert!(op.error.is_none());
    }
}
