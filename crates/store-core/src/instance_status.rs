use crate::error::StoreError;
use crate::ids::InstanceID;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One instance's status tree, as reported by `cluster_meta`/`instance_status`.
///
/// Grounded on `vineyard::InstanceStatus`, which eagerly parses these same
/// six fields out of a raw JSON tree rather than exposing the tree directly.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InstanceStatus {
    pub instance_id: InstanceID,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub deferred_requests: u64,
    pub ipc_connections: u64,
    pub rpc_connections: u64,
}

impl InstanceStatus {
    #[must_use]
    pub fn deployment_default() -> &'static str {
        "local"
    }
}

/// Full instance-status tree as stored in cluster metadata, including the
/// `deployment` field (not carried on `InstanceStatus` itself since it is a
/// cluster-wide config value, not a per-poll metric).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstanceStatusTree {
    pub instance_id: InstanceID,
    pub deployment: String,
    pub memory_usage: u64,
    pub memory_limit: u64,
    pub deferred_requests: u64,
    pub ipc_connections: u64,
    pub rpc_connections: u64,
}

impl TryFrom<Value> for InstanceStatusTree {
    type Error = StoreError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        serde_json::from_value(value)
            .map_err(|e| StoreError::BadPayload(format!("instance status tree: {e}")))
    }
}

impl From<InstanceStatusTree> for InstanceStatus {
    fn from(tree: InstanceStatusTree) -> Self {
        InstanceStatus {
            instance_id: tree.instance_id,
            memory_usage: tree.memory_usage,
            memory_limit: tree.memory_limit,
            deferred_requests: tree.deferred_requests,
            ipc_connections: tree.ipc_connections,
            rpc_connections: tree.rpc_connections,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_status_tree_parses_all_six_fields() {
        let value = serde_json::json!({
            "instance_id": 1,
            "deployment": "local",
            "memory_usage": 1024,
            "memory_limit": 4096,
            "deferred_requests": 0,
            "ipc_connections": 1,
            "rpc_connections": 0,
        });
        let tree = InstanceStatusTree::try_from(value).unwrap();
        assert_eq!(tree.instance_id, InstanceID(1));
        assert_eq!(tree.deployment, "local");
        assert_eq!(tree.memory_usage, 1024);
    }

    #[test]
    fn instance_status_tree_rejects_missing_field() {
        let value = serde_json::json!({"instance_id": 1});
        assert!(InstanceStatusTree::try_from(value).is_err());
    }
}
