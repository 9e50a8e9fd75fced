// object-protocol: request/reply types and serialization.
//
// All frames use a top-level `type` field for discriminated
// deserialization. Decoding is strict about the shape of each variant's
// fields but ignores fields it doesn't recognize, so old clients keep
// working against a server that has grown new optional fields.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use store_core::{InstanceID, InstanceStatus, MetaTree, ObjectID, Signature};

// ---------------------------------------------------------------------------
// Client -> Server
// ---------------------------------------------------------------------------

/// All request frame kinds in the v1 wire protocol.
///
/// Serializes/deserializes using the `type` field as a tag.
///
/// ```json
/// { "type": "get_data", "ids": [42], "sync_remote": false, "wait": false }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Request {
    /// First message on a connection; advertises protocol version and the
    /// caller's advisory instance identity.
    Register { version: String },
    GetData {
        ids: Vec<ObjectID>,
        #[serde(default)]
        sync_remote: bool,
        #[serde(default)]
        wait: bool,
    },
    CreateData {
        content: MetaTree,
    },
    DelData {
        ids: Vec<ObjectID>,
        #[serde(default)]
        force: bool,
        #[serde(default)]
        deep: bool,
    },
    ListData {
        #[serde(default)]
        pattern: String,
        #[serde(default)]
        regex: bool,
        #[serde(default = "default_list_limit")]
        limit: usize,
    },
    Persist {
        id: ObjectID,
    },
    IfPersist {
        id: ObjectID,
    },
    Exists {
        id: ObjectID,
    },
    ShallowCopy {
        id: ObjectID,
    },
    PutName {
        id: ObjectID,
        name: String,
    },
    GetName {
        name: String,
        #[serde(default)]
        wait: bool,
    },
    DropName {
        name: String,
    },
    MigrateObject {
        id: ObjectID,
    },
    ClusterMeta,
    InstanceStatus,
    Exit,
}

fn default_list_limit() -> usize {
    usize::MAX
}

/// Implemented by the tagged wire enums so the codec can tell "unrecognized
/// `type`" apart from "recognized `type`, bad fields" before it commits to a
/// full deserialize (spec §4.1/§7's three-way fail-mode split).
pub trait TaggedFrame {
    fn is_recognized_type(type_tag: &str) -> bool;
}

impl TaggedFrame for Request {
    fn is_recognized_type(type_tag: &str) -> bool {
        const TYPES: &[&str] = &[
            "register",
            "get_data",
            "create_data",
            "del_data",
            "list_data",
            "persist",
            "if_persist",
            "exists",
            "shallow_copy",
            "put_name",
            "get_name",
            "drop_name",
            "migrate_object",
            "cluster_meta",
            "instance_status",
            "exit",
        ];
        TYPES.contains(&type_tag)
    }
}

impl TaggedFrame for Reply {
    fn is_recognized_type(type_tag: &str) -> bool {
        const TYPES: &[&str] = &[
            "registered",
            "get_data",
            "create_data",
            "del_data",
            "list_data",
            "persist",
            "if_persist",
            "exists",
            "shallow_copy",
            "put_name",
            "get_name",
            "drop_name",
            "migrate_object",
            "cluster_meta",
            "instance_status",
            "exited",
            "error",
        ];
        TYPES.contains(&type_tag)
    }
}

// ---------------------------------------------------------------------------
// Server -> Client
// ---------------------------------------------------------------------------

/// All reply frame kinds in the v1 wire protocol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
#[serde(rename_all = "snake_case")]
pub enum Reply {
    Registered {
        instance_id: InstanceID,
    },
    GetData {
        content: HashMap<ObjectID, MetaTree>,
    },
    CreateData {
        id: ObjectID,
        signature: Signature,
        instance_id: InstanceID,
    },
    DelData,
    ListData {
        content: HashMap<ObjectID, MetaTree>,
    },
    Persist,
    IfPersist {
        persist: bool,
    },
    Exists {
        exists: bool,
    },
    ShallowCopy {
        target_id: ObjectID,
    },
    PutName,
    GetName {
        id: ObjectID,
    },
    DropName,
    MigrateObject {
        id: ObjectID,
    },
    ClusterMeta {
        content: HashMap<InstanceID, InstanceStatus>,
    },
    InstanceStatus {
        status: InstanceStatus,
    },
    /// Terminal reply to `exit`; the connection closes immediately after.
    Exited,
    /// Sent as the terminal reply to any request the dispatcher rejects
    /// outright (never a partial success).
    Error {
        code: String,
        message: String,
    },
}

/// Frozen v1 error codes, one per `StoreError` variant (spec §7).
pub mod error_codes {
    pub const NOT_CONNECTED: &str = "not_connected";
    pub const IO_ERROR: &str = "io_error";
    pub const MALFORMED: &str = "malformed";
    pub const UNKNOWN_TYPE: &str = "unknown_type";
    pub const BAD_PAYLOAD: &str = "bad_payload";
    pub const NOT_FOUND: &str = "not_found";
    pub const ALREADY_EXISTS: &str = "already_exists";
    pub const NOT_READY: &str = "not_ready";
    pub const CANCELLED: &str = "cancelled";
    pub const REMOTE_FAILURE: &str = "remote_failure";
    pub const INVARIANT_VIOLATION: &str = "invariant_violation";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn get_data_request_round_trips() {
        let req = Request::GetData {
            ids: vec![ObjectID(77)],
            sync_remote: false,
            wait: true,
        };
        let json = serde_json::to_string(&req).unwrap();
        assert_eq!(
            json,
            r#"{"type":"get_data","ids":[77],"sync_remote":false,"wait":true}"#
        );
        let back: Request = serde_json::from_str(&json).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn create_data_reply_matches_scenario_s1() {
        let reply = Reply::CreateData {
            id: ObjectID(42),
            signature: Signature(99),
            instance_id: InstanceID(1),
        };
        let json = serde_json::to_string(&reply).unwrap();
        assert_eq!(
            json,
            r#"{"type":"create_data","id":42,"signature":99,"instance_id":1}"#
        );
    }

    #[test]
    fn unknown_fields_on_read_are_ignored_for_forward_compat() {
        let json = r#"{"type":"exists","id":5,"future_field":true}"#;
        let req: Request = serde_json::from_str(json).unwrap();
        assert_eq!(req, Request::Exists { id: ObjectID(5) });
    }

    #[test]
    fn get_data_content_keys_are_decimal_object_ids() {
        let mut content = HashMap::new();
        let mut tree = MetaTree::new();
        tree.insert("typename", "Blob");
        content.insert(ObjectID(42), tree);
        let reply = Reply::GetData { content };
        let json = serde_json::to_string(&reply).unwrap();
        assert!(json.contains(r#""42":{"#));
    }

    #[test]
    fn malformed_frame_fails_to_parse_as_malformed_not_panic() {
        let err = serde_json::from_str::<Request>("{not-json").unwrap_err();
        assert!(err.is_syntax() || err.is_eof());
    }

    #[test]
    fn unknown_type_is_rejected_at_decode() {
        let err = serde_json::from_str::<Request>(r#"{"type":"frobnicate"}"#).unwrap_err();
        assert!(err.is_data());
    }
}
