//! Root crate: re-exports the wire protocol and core metadata types shared
//! by every other crate in the workspace, so integration tests and
//! downstream consumers can depend on `objectstore` alone for the types
//! (the client and server themselves live in `store-client`/`server`).

pub use object_protocol::{error_codes, Reply, Request};
pub use store_core::{InstanceID, MetaTree, ObjectID, Signature, StoreError, StoreResult};
