//! Synchronous request/reply client session (spec §4.2).
//!
//! Every public method follows the same contract: verify `CONNECTED`,
//! encode a request frame, write it, read exactly one reply frame, then
//! parse it into a domain value or a structured error. Any I/O failure
//! flips the session to `DISCONNECTED` and the call fails with
//! [`StoreError::NotConnected`].

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::os::unix::net::UnixStream;
use std::path::Path;

use object_protocol::{decode_frame, encode_frame, DecodeOutcome, FrameFailureKind, Reply, Request};
use parking_lot::ReentrantMutex;
use std::cell::RefCell;
use store_core::{InstanceID, InstanceStatus, MetaTree, ObjectID, Signature, StoreError, StoreResult};
use tracing::{debug, warn};

use crate::transport::Transport;

const PROTOCOL_VERSION: &str = "1";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ConnectionState {
    Connected,
    Disconnected,
}

/// Read/write half of the connection plus the bookkeeping the liveness
/// peek needs to avoid swallowing a byte that actually belongs to a frame.
struct Conn<S> {
    stream: S,
    state: ConnectionState,
    pending_byte: Option<u8>,
    read_buf: Vec<u8>,
}

impl<S: Transport> Conn<S> {
    fn write_frame(&mut self, req: &Request) -> StoreResult<()> {
        let frame = encode_frame(req).map_err(|e| StoreError::BadPayload(e.to_string()))?;
        self.stream.write_all(&frame).map_err(|e| {
            self.state = ConnectionState::Disconnected;
            StoreError::Io(e)
        })
    }

    fn read_frame<T: serde::de::DeserializeOwned>(&mut self) -> StoreResult<T> {
        if let Some(b) = self.pending_byte.take() {
            self.read_buf.push(b);
        }
        loop {
            match decode_frame::<T>(&self.read_buf) {
                DecodeOutcome::Frame { value, consumed } => {
                    self.read_buf.drain(..consumed);
                    return Ok(value);
                }
                DecodeOutcome::Malformed { reason, consumed, kind } => {
                    self.read_buf.drain(..consumed);
                    return Err(match kind {
                        FrameFailureKind::Malformed => StoreError::Malformed(reason),
                        FrameFailureKind::UnknownType => StoreError::UnknownType(reason),
                        FrameFailureKind::BadPayload => StoreError::BadPayload(reason),
                    });
                }
                DecodeOutcome::Incomplete => {
                    let mut chunk = [0u8; 4096];
                    let n = self.stream.read(&mut chunk).map_err(|e| {
                        self.state = ConnectionState::Disconnected;
                        StoreError::Io(e)
                    })?;
                    if n == 0 {
                        self.state = ConnectionState::Disconnected;
                        return Err(StoreError::NotConnected);
                    }
                    self.read_buf.extend_from_slice(&chunk[..n]);
                }
            }
        }
    }

    /// Non-blocking zero-cost-ish peek for whether the peer has
    /// half-closed. Consumes at most one byte out of the kernel socket
    /// buffer and stashes it in `pending_byte` so the next real frame
    /// read doesn't lose it.
    fn is_peer_open(&mut self) -> bool {
        if self.pending_byte.is_some() || !self.read_buf.is_empty() {
            return true;
        }
        if self.stream.set_nonblocking(true).is_err() {
            return self.state == ConnectionState::Connected;
        }
        let mut byte = [0u8; 1];
        let result = self.stream.read(&mut byte);
        let _ = self.stream.set_nonblocking(false);
        match result {
            Ok(0) => false,
            Ok(_) => {
                self.pending_byte = Some(byte[0]);
                true
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => true,
            Err(_) => false,
        }
    }
}

/// A live request/reply connection to one store instance, over either the
/// Unix-domain IPC endpoint or the TCP RPC endpoint.
///
/// Re-entrant: a recursive lock guards `disconnect` against concurrent use
/// from the same thread (e.g. a `Drop` impl calling it after a caller
/// already holds the session to do so explicitly).
pub struct ClientSession<S> {
    conn: ReentrantMutex<RefCell<Conn<S>>>,
    instance_id: InstanceID,
}

pub type IpcClientSession = ClientSession<UnixStream>;
pub type RpcClientSession = ClientSession<TcpStream>;

impl ClientSession<UnixStream> {
    /// Connect over the Unix-domain IPC endpoint at `path`.
    pub fn connect_ipc<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let stream = UnixStream::connect(path).map_err(StoreError::Io)?;
        Self::handshake(stream)
    }
}

impl ClientSession<TcpStream> {
    /// Connect over the TCP RPC endpoint at `addr` (`host:port`).
    pub fn connect_rpc<A: ToSocketAddrs>(addr: A) -> StoreResult<Self> {
        let stream = TcpStream::connect(addr).map_err(StoreError::Io)?;
        Self::handshake(stream)
    }
}

impl<S: Transport> ClientSession<S> {
    fn handshake(stream: S) -> StoreResult<Self> {
        let mut conn = Conn {
            stream,
            state: ConnectionState::Connected,
            pending_byte: None,
            read_buf: Vec::new(),
        };
        conn.write_frame(&Request::Register {
            version: PROTOCOL_VERSION.to_string(),
        })?;
        let reply: Reply = conn.read_frame()?;
        let instance_id = match reply {
            Reply::Registered { instance_id } => instance_id,
            Reply::Error { code, message } => {
                return Err(StoreError::RemoteFailure(format!("{code}: {message}")))
            }
            other => {
                return Err(StoreError::BadPayload(format!(
                    "expected registered reply, got {other:?}"
                )))
            }
        };
        Ok(ClientSession {
            conn: ReentrantMutex::new(RefCell::new(conn)),
            instance_id,
        })
    }

    /// Advisory instance id the server assigned this connection at
    /// `register` time.
    pub fn instance_id(&self) -> InstanceID {
        self.instance_id
    }

    /// Inspects the connected flag and, if still set, peeks a zero-length
    /// non-blocking receive to catch a peer half-close the flag hasn't
    /// observed yet (spec §4.2 liveness check).
    pub fn connected(&self) -> bool {
        let guard = self.conn.lock();
        let mut conn = guard.borrow_mut();
        if conn.state != ConnectionState::Connected {
            return false;
        }
        if !conn.is_peer_open() {
            conn.state = ConnectionState::Disconnected;
            return false;
        }
        true
    }

    fn ensure_connected(&self) -> StoreResult<()> {
        if self.connected() {
            Ok(())
        } else {
            Err(StoreError::NotConnected)
        }
    }

    fn call(&self, req: Request) -> StoreResult<Reply> {
        self.ensure_connected()?;
        let guard = self.conn.lock();
        let mut conn = guard.borrow_mut();
        conn.write_frame(&req)?;
        let reply: Reply = conn.read_frame()?;
        if let Reply::Error { code, message } = &reply {
            debug!(code, message, "server returned error reply");
        }
        Ok(reply)
    }

    fn call_expect<T>(&self, req: Request, f: impl FnOnce(Reply) -> Option<T>) -> StoreResult<T> {
        let reply = self.call(req)?;
        if let Reply::Error { code, message } = &reply {
            return Err(remote_error(code, message));
        }
        f(reply).ok_or_else(|| StoreError::BadPayload("unexpected reply shape".into()))
    }

    pub fn get_data(
        &self,
        ids: Vec<ObjectID>,
        sync_remote: bool,
        wait: bool,
    ) -> StoreResult<std::collections::HashMap<ObjectID, MetaTree>> {
        self.call_expect(
            Request::GetData {
                ids,
                sync_remote,
                wait,
            },
            |r| match r {
                Reply::GetData { content } => Some(content),
                _ => None,
            },
        )
    }

    pub fn create_data(&self, content: MetaTree) -> StoreResult<(ObjectID, Signature, InstanceID)> {
        self.call_expect(Request::CreateData { content }, |r| match r {
            Reply::CreateData {
                id,
                signature,
                instance_id,
            } => Some((id, signature, instance_id)),
            _ => None,
        })
    }

    /// Composite operation (spec §4.2): stamps ownership fields onto the
    /// metadata tree, forces a cluster sync when the caller has flagged the
    /// tree `incomplete`, creates the object, and — if still incomplete —
    /// re-fetches the now-complete tree from the cluster.
    pub fn create_meta_data(&self, mut content: MetaTree) -> StoreResult<(ObjectID, Signature, InstanceID, MetaTree)> {
        content.set_instance_id(self.instance_id);
        content.set_transient(true);
        if !content.has_key("nbytes") {
            content.set_nbytes(0);
        }
        let incomplete = content.incomplete();
        if incomplete {
            // Best-effort remote sync; no reply content is expected or used.
            let _ = self.get_data(vec![ObjectID::INVALID], true, false);
        }
        let (id, signature, instance_id) = self.create_data(content.clone())?;
        let final_tree = if incomplete {
            self.get_data(vec![id], false, false)?
                .remove(&id)
                .unwrap_or(content)
        } else {
            content
        };
        Ok((id, signature, instance_id, final_tree))
    }

    pub fn del_data(&self, ids: Vec<ObjectID>, force: bool, deep: bool) -> StoreResult<()> {
        self.call_expect(Request::DelData { ids, force, deep }, |r| match r {
            Reply::DelData => Some(()),
            _ => None,
        })
    }

    pub fn list_data(
        &self,
        pattern: impl Into<String>,
        regex: bool,
        limit: usize,
    ) -> StoreResult<std::collections::HashMap<ObjectID, MetaTree>> {
        self.call_expect(
            Request::ListData {
                pattern: pattern.into(),
                regex,
                limit,
            },
            |r| match r {
                Reply::ListData { content } => Some(content),
                _ => None,
            },
        )
    }

    pub fn persist(&self, id: ObjectID) -> StoreResult<()> {
        self.call_expect(Request::Persist { id }, |r| match r {
            Reply::Persist => Some(()),
            _ => None,
        })
    }

    pub fn if_persist(&self, id: ObjectID) -> StoreResult<bool> {
        self.call_expect(Request::IfPersist { id }, |r| match r {
            Reply::IfPersist { persist } => Some(persist),
            _ => None,
        })
    }

    pub fn exists(&self, id: ObjectID) -> StoreResult<bool> {
        self.call_expect(Request::Exists { id }, |r| match r {
            Reply::Exists { exists } => Some(exists),
            _ => None,
        })
    }

    pub fn shallow_copy(&self, id: ObjectID) -> StoreResult<ObjectID> {
        self.call_expect(Request::ShallowCopy { id }, |r| match r {
            Reply::ShallowCopy { target_id } => Some(target_id),
            _ => None,
        })
    }

    pub fn put_name(&self, id: ObjectID, name: impl Into<String>) -> StoreResult<()> {
        self.call_expect(
            Request::PutName {
                id,
                name: name.into(),
            },
            |r| match r {
                Reply::PutName => Some(()),
                _ => None,
            },
        )
    }

    pub fn get_name(&self, name: impl Into<String>, wait: bool) -> StoreResult<ObjectID> {
        self.call_expect(
            Request::GetName {
                name: name.into(),
                wait,
            },
            |r| match r {
                Reply::GetName { id } => Some(id),
                _ => None,
            },
        )
    }

    pub fn drop_name(&self, name: impl Into<String>) -> StoreResult<()> {
        self.call_expect(
            Request::DropName { name: name.into() },
            |r| match r {
                Reply::DropName => Some(()),
                _ => None,
            },
        )
    }

    pub fn migrate_object(&self, id: ObjectID) -> StoreResult<ObjectID> {
        self.call_expect(Request::MigrateObject { id }, |r| match r {
            Reply::MigrateObject { id } => Some(id),
            _ => None,
        })
    }

    pub fn cluster_meta(&self) -> StoreResult<std::collections::HashMap<InstanceID, InstanceStatus>> {
        self.call_expect(Request::ClusterMeta, |r| match r {
            Reply::ClusterMeta { content } => Some(content),
            _ => None,
        })
    }

    /// `Instances()` in the original client: the set of known instance ids,
    /// derived from `cluster_meta` (spec supplement, grounded on
    /// `ClientBase::ClusterInfo`/`Instances`).
    pub fn instances(&self) -> StoreResult<Vec<InstanceID>> {
        Ok(self.cluster_meta()?.into_keys().collect())
    }

    pub fn instance_status(&self) -> StoreResult<InstanceStatus> {
        self.call_expect(Request::InstanceStatus, |r| match r {
            Reply::InstanceStatus { status } => Some(status),
            _ => None,
        })
    }

    /// Deletes a batch of blobs, tolerating ids that are already absent
    /// (spec supplement, grounded on `ClientBase::DeleteBlobBatch`).
    pub fn delete_blob_batch(&self, ids: Vec<ObjectID>) -> StoreResult<()> {
        self.del_data(ids, true, false)
    }

    /// Best-effort `exit` write, socket shutdown, and flag flip. Re-entrant
    /// and idempotent: a second call on an already-disconnected session is
    /// a no-op.
    pub fn disconnect(&self) {
        let guard = self.conn.lock();
        let mut conn = guard.borrow_mut();
        if conn.state != ConnectionState::Connected {
            return;
        }
        if let Err(e) = conn.write_frame(&Request::Exit) {
            warn!(error = %e, "best-effort exit frame failed during disconnect");
        }
        let _ = conn.stream.shutdown();
        conn.state = ConnectionState::Disconnected;
    }
}


fn remote_error(code: &str, message: &str) -> StoreError {
    use object_protocol::error_codes::*;
    match code {
        NOT_CONNECTED => StoreError::NotConnected,
        NOT_FOUND => StoreError::NotFound(message.to_string()),
        ALREADY_EXISTS => StoreError::AlreadyExists(message.to_string()),
        NOT_READY => StoreError::NotReady,
        CANCELLED => StoreError::Cancelled,
        MALFORMED => StoreError::Malformed(message.to_string()),
        UNKNOWN_TYPE => StoreError::UnknownType(message.to_string()),
        BAD_PAYLOAD => StoreError::BadPayload(message.to_string()),
        INVARIANT_VIOLATION => StoreError::InvariantViolation(message.to_string()),
        _ => StoreError::RemoteFailure(format!("{code}: {message}")),
    }
}
