//! Server spec loading (spec §6).
//!
//! JSON is the sole config source. Recognized top-level keys: `deployment`,
//! `ipc_socket`, `rpc_endpoint`, `size`, `metadata`.

use serde::Deserialize;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("parsing config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing required field `{0}`")]
    MissingField(&'static str),
    #[error("invalid `rpc_endpoint` value '{0}'")]
    InvalidRpcEndpoint(String),
    #[error("invalid `deployment` value '{0}', expected `local` or `distributed`")]
    InvalidDeployment(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Deployment {
    Local,
    Distributed,
}

/// Validated server configuration, ready to drive the lifecycle supervisor.
#[derive(Debug, Clone)]
pub struct ServerSpec {
    pub deployment: Deployment,
    pub ipc_socket: PathBuf,
    pub rpc_endpoint: SocketAddr,
    pub size: u64,
    pub metadata: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Raw JSON deserialization types (every field optional; defaults and
// validation happen when converting to `ServerSpec`)
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct RawServerSpec {
    deployment: Option<String>,
    ipc_socket: Option<String>,
    rpc_endpoint: Option<String>,
    size: Option<u64>,
    metadata: Option<serde_json::Value>,
}

pub fn load_from_path(path: &Path) -> Result<ServerSpec, ConfigError> {
    let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    load_from_str(&json)
}

pub fn load_from_str(json: &str) -> Result<ServerSpec, ConfigError> {
    let raw: RawServerSpec = serde_json::from_str(json)?;
    validate(raw)
}

fn validate(raw: RawServerSpec) -> Result<ServerSpec, ConfigError> {
    let deployment = match raw.deployment.as_deref().unwrap_or("local") {
        "local" => Deployment::Local,
        "distributed" => Deployment::Distributed,
        other => return Err(ConfigError::InvalidDeployment(other.to_string())),
    };
    let ipc_socket = raw
        .ipc_socket
        .map(PathBuf::from)
        .ok_or(ConfigError::MissingField("ipc_socket"))?;
    let rpc_endpoint_raw = raw
        .rpc_endpoint
        .ok_or(ConfigError::MissingField("rpc_endpoint"))?;
    let rpc_endpoint = rpc_endpoint_raw
        .parse()
        .map_err(|_| ConfigError::InvalidRpcEndpoint(rpc_endpoint_raw))?;
    let size = raw.size.unwrap_or(1 << 30);
    let metadata = raw.metadata.unwrap_or(serde_json::Value::Null);
    Ok(ServerSpec {
        deployment,
        ipc_socket,
        rpc_endpoint,
        size,
        metadata,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_minimal_config_with_defaults() {
        let spec = load_from_str(r#"{"ipc_socket":"/tmp/store.sock","rpc_endpoint":"127.0.0.1:9600"}"#)
            .unwrap();
        assert_eq!(spec.deployment, Deployment::Local);
        assert_eq!(spec.size, 1 << 30);
        assert_eq!(spec.ipc_socket, PathBuf::from("/tmp/store.sock"));
    }

    #[test]
    fn rejects_missing_ipc_socket() {
        let err = load_from_str(r#"{"rpc_endpoint":"127.0.0.1:9600"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("ipc_socket")));
    }

    #[test]
    fn rejects_unrecognized_deployment_value() {
        let err = load_from_str(
            r#"{"deployment":"cloudy","ipc_socket":"/tmp/s.sock","rpc_endpoint":"127.0.0.1:1"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidDeployment(_)));
    }

    #[test]
    fn rejects_malformed_rpc_endpoint() {
        let err = load_from_str(
            r#"{"ipc_socket":"/tmp/s.sock","rpc_endpoint":"not-an-addr"}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidRpcEndpoint(_)));
    }

    #[test]
    fn accepts_distributed_deployment_and_nested_metadata_subtree() {
        let spec = load_from_str(
            r#"{"deployment":"distributed","ipc_socket":"/tmp/s.sock","rpc_endpoint":"0.0.0.0:9600","metadata":{"backend":"etcd"}}"#,
        )
        .unwrap();
        assert_eq!(spec.deployment, Deployment::Distributed);
        assert_eq!(spec.metadata["backend"], "etcd");
    }
}
