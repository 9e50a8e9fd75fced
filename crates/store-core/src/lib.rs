//! Domain types and error taxonomy shared by the object store's wire
//! protocol, server core, and client session.

mod cluster_key;
mod error;
mod ids;
mod instance_status;
mod meta;

pub use cluster_key::{decode_instance_key, encode_instance_key, CLUSTER_KEY_SENTINEL};
pub use error::{StoreError, StoreResult};
pub use ids::{InstanceID, ObjectID, Signature};
pub use instance_status::{InstanceStatus, InstanceStatusTree};
pub use meta::MetaTree;
