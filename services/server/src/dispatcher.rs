//! Request dispatcher (spec §4.3): routes a decoded request to its handler
//! and either answers immediately or enqueues a deferred request.

use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use object_protocol::{error_codes, Reply, Request};
use store_core::{InstanceID, InstanceStatus, MetaTree, ObjectID, StoreError};
use std::time::Duration;
use regex::Regex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, trace};

use crate::bulk_store::{BulkStore, InMemoryBulkStore};
use crate::deferred::{ConnectionToken, DeferredKind, DeferredQueue, DeferredReq};
use crate::metadata::{ClusterGeneration, InMemoryMetadataBackend, MetadataFacade};
use crate::name_table::NameTable;
use crate::readiness::ReadinessState;
use tokio::sync::watch;

/// How often the dispatcher's idle tick sweeps the deferred queue for dead
/// connections, independent of any metadata update (spec §8 invariant 4's
/// "one dispatcher idle tick" bound).
const DEAD_DEFERRED_SWEEP_INTERVAL: Duration = Duration::from_millis(50);

/// One request handed from a connection task to the dispatcher loop, along
/// with the reply channel and the connection's liveness token.
pub struct DispatchRequest {
    pub connection_token: ConnectionToken,
    pub request: Request,
    pub reply: oneshot::Sender<Reply>,
}

/// Counts surfaced in `instance_status` (spec §6 persisted-state keys).
#[derive(Default, Clone, Copy)]
struct ConnectionCounts {
    ipc: u64,
    rpc: u64,
}

/// Owns every piece of server-side mutable state the spec assigns to the
/// dispatcher's cooperative loop: the metadata façade, bulk store, name
/// table, and deferred queue. Constructed once by the lifecycle supervisor
/// and driven by [`Dispatcher::run`].
pub struct Dispatcher {
    facade: MetadataFacade<InMemoryMetadataBackend>,
    bulk: Box<dyn BulkStore>,
    names: NameTable,
    deferred: DeferredQueue,
    readiness_rx: watch::Receiver<ReadinessState>,
    instance_id: InstanceID,
    generation: ClusterGeneration,
    watch_rx: mpsc::UnboundedReceiver<ClusterGeneration>,
    counts: ConnectionCounts,
}

impl Dispatcher {
    /// `readiness_rx` is only read, never driven, by the dispatcher — the
    /// lifecycle supervisor owns the coordinator and signals subsystem
    /// bits as it brings each one up.
    pub fn new(
        instance_id: InstanceID,
        bulk_capacity: u64,
        readiness_rx: watch::Receiver<ReadinessState>,
    ) -> Self {
        let mut facade = MetadataFacade::new(InMemoryMetadataBackend::default(), instance_id);
        let watch_rx = facade.watch();
        Dispatcher {
            facade,
            bulk: Box::new(InMemoryBulkStore::new(bulk_capacity)),
            names: NameTable::default(),
            deferred: DeferredQueue::default(),
            readiness_rx,
            instance_id,
            generation: 0,
            watch_rx,
            counts: ConnectionCounts::default(),
        }
    }

    fn is_backend_ready(&self) -> bool {
        matches!(
            *self.readiness_rx.borrow(),
            ReadinessState::BackendReady | ReadinessState::Ready
        )
    }

    pub fn on_connection_opened(&mut self, is_ipc: bool) {
        if is_ipc {
            self.counts.ipc += 1;
        } else {
            self.counts.rpc += 1;
        }
    }

    pub fn on_connection_closed(&mut self, is_ipc: bool) {
        if is_ipc {
            self.counts.ipc = self.counts.ipc.saturating_sub(1);
        } else {
            self.counts.rpc = self.counts.rpc.saturating_sub(1);
        }
    }

    /// Drives the cooperative loop: handle dispatched requests, retest the
    /// deferred queue on every metadata update, and sweep it for dead
    /// connections on a periodic idle tick, one at a time. Stops as soon as
    /// either `stop_rx` fires or every dispatch sender has dropped.
    pub async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<DispatchRequest>,
        mut stop_rx: oneshot::Receiver<()>,
    ) {
        let mut sweep = tokio::time::interval(DEAD_DEFERRED_SWEEP_INTERVAL);
        sweep.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = &mut stop_rx => {
                    info!("dispatcher received stop signal");
                    break;
                }
                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(cmd) => self.handle(cmd),
                        None => break,
                    }
                }
                gen = self.watch_rx.recv() => {
                    match gen {
                        Some(gen) => {
                            self.generation = gen;
                            self.deferred.retest(&mut self.facade, &self.names);
                        }
                        None => break,
                    }
                }
                _ = sweep.tick() => {
                    trace!("idle tick: sweeping deferred queue for dead connections");
                    self.deferred.collect_dead();
                }
            }
        }
        self.facade.delete_all_at(self.instance_id);
        self.deferred.cancel_all();
    }

    fn handle(&mut self, cmd: DispatchRequest) {
        if !self.is_backend_ready() {
            let _ = cmd.reply.send(not_ready());
            return;
        }
        // Keep this instance's own entry in cluster metadata current so
        // `cluster_meta` reflects live membership without a separate
        // heartbeat task.
        let status = self.instance_status();
        self.facade.record_instance_status(status);
        match cmd.request {
            Request::Register { .. } => {
                let _ = cmd.reply.send(Reply::Registered {
                    instance_id: self.instance_id,
                });
            }
            Request::GetData {
                ids,
                sync_remote,
                wait,
            } => self.handle_get_data(cmd.connection_token, ids, sync_remote, wait, cmd.reply),
            Request::CreateData { content } => self.handle_create_data(content, cmd.reply),
            Request::DelData { ids, force, deep } => {
                self.handle_del_data(ids, force, deep, cmd.reply);
            }
            Request::ListData {
                pattern,
                regex,
                limit,
            } => self.handle_list_data(&pattern, regex, limit, cmd.reply),
            Request::Persist { id } => self.handle_persist(id, cmd.reply),
            Request::IfPersist { id } => self.handle_if_persist(id, cmd.reply),
            Request::Exists { id } => self.handle_exists(id, cmd.reply),
            Request::ShallowCopy { id } => self.handle_shallow_copy(id, cmd.reply),
            Request::PutName { id, name } => self.handle_put_name(id, name, cmd.reply),
            Request::GetName { name, wait } => {
                self.handle_get_name(cmd.connection_token, name, wait, cmd.reply);
            }
            Request::DropName { name } => self.handle_drop_name(&name, cmd.reply),
            Request::MigrateObject { id } => {
                // Migration transport is out of scope (spec §1); echo the id
                // back so callers see a well-formed reply against a
                // single-instance deployment where "migration" is a no-op.
                let _ = cmd.reply.send(Reply::MigrateObject { id });
            }
            Request::ClusterMeta => {
                let _ = cmd.reply.send(Reply::ClusterMeta {
                    content: self.facade.cluster_meta(),
                });
            }
            Request::InstanceStatus => {
                let _ = cmd.reply.send(Reply::InstanceStatus {
                    status: self.instance_status(),
                });
            }
            Request::Exit => {
                let _ = cmd.reply.send(Reply::Exited);
            }
        }
    }

    fn instance_status(&self) -> InstanceStatus {
        InstanceStatus {
            instance_id: self.instance_id,
            memory_usage: self.bulk.used(),
            memory_limit: self.bulk.capacity(),
            deferred_requests: self.deferred.len() as u64,
            ipc_connections: self.counts.ipc,
            rpc_connections: self.counts.rpc,
        }
    }

    fn handle_get_data(
        &mut self,
        token: ConnectionToken,
        ids: Vec<ObjectID>,
        sync_remote: bool,
        wait: bool,
        reply: oneshot::Sender<Reply>,
    ) {
        // spec §9 open question: invalid-id sync-only request forces a
        // cluster sync with no reply content, replacing the original
        // fetch/sync conflation.
        if ids.len() == 1 && ids[0].is_invalid() && sync_remote {
            self.facade.sync();
            let _ = reply.send(Reply::GetData {
                content: Default::default(),
            });
            return;
        }
        if wait && !self.facade.has_all(&ids) {
            self.deferred.push(DeferredReq {
                connection_token: token,
                arrived_at_generation: self.generation,
                kind: DeferredKind::GetData { ids },
                reply,
            });
            return;
        }
        let content = self.facade.get_many(&ids, sync_remote);
        let _ = reply.send(Reply::GetData { content });
    }

    fn handle_create_data(&mut self, content: MetaTree, reply: oneshot::Sender<Reply>) {
        let nbytes = content.nbytes();
        if let Err(e) = self.bulk.allocate(nbytes) {
            let _ = reply.send(error_reply(&e));
            return;
        }
        let (id, signature, instance_id) = self.facade.put(content);
        let _ = reply.send(Reply::CreateData {
            id,
            signature,
            instance_id,
        });
    }

    fn handle_del_data(
        &mut self,
        ids: Vec<ObjectID>,
        force: bool,
        _deep: bool,
        reply: oneshot::Sender<Reply>,
    ) {
        for id in ids {
            match self.facade.remove(id) {
                Some(tree) => self.bulk.release(tree.nbytes()),
                None if !force => {
                    let _ = reply.send(error_reply(&StoreError::NotFound(id.to_string())));
                    return;
                }
                None => {}
            }
        }
        let _ = reply.send(Reply::DelData);
    }

    fn handle_list_data(
        &self,
        pattern: &str,
        use_regex: bool,
        limit: usize,
        reply: oneshot::Sender<Reply>,
    ) {
        if use_regex {
            let re = match Regex::new(pattern) {
                Ok(re) => re,
                Err(e) => {
                    let _ = reply.send(error_reply(&StoreError::BadPayload(format!(
                        "invalid regex pattern {pattern:?}: {e}"
                    ))));
                    return;
                }
            };
            let content = self
                .facade
                .all()
                .into_iter()
                .filter(|(_, tree)| {
                    pattern.is_empty() || tree.typename().is_some_and(|t| re.is_match(t))
                })
                .take(limit)
                .collect();
            let _ = reply.send(Reply::ListData { content });
            return;
        }
        let content = self
            .facade
            .all()
            .into_iter()
            .filter(|(_, tree)| {
                pattern.is_empty() || tree.typename().is_some_and(|t| t.contains(pattern))
            })
            .take(limit)
            .collect();
        let _ = reply.send(Reply::ListData { content });
    }

    fn handle_persist(&mut self, id: ObjectID, reply: oneshot::Sender<Reply>) {
        match self.facade.persist(id) {
            Ok(()) => {
                let _ = reply.send(Reply::Persist);
            }
            Err(e) => {
                let _ = reply.send(error_reply(&e));
            }
        }
    }

    fn handle_if_persist(&self, id: ObjectID, reply: oneshot::Sender<Reply>) {
        match self.facade.is_persisted(id) {
            Ok(persist) => {
                let _ = reply.send(Reply::IfPersist { persist });
            }
            Err(e) => {
                let _ = reply.send(error_reply(&e));
            }
        }
    }

    fn handle_exists(&self, id: ObjectID, reply: oneshot::Sender<Reply>) {
        let _ = reply.send(Reply::Exists {
            exists: self.facade.get(id).is_ok(),
        });
    }

    fn handle_shallow_copy(&mut self, id: ObjectID, reply: oneshot::Sender<Reply>) {
        match self.facade.get(id) {
            Ok(tree) => {
                let (target_id, _, _) = self.facade.put(tree);
                let _ = reply.send(Reply::ShallowCopy { target_id });
            }
            Err(e) => {
                let _ = reply.send(error_reply(&e));
            }
        }
    }

    fn handle_put_name(&mut self, id: ObjectID, name: String, reply: oneshot::Sender<Reply>) {
        match self.names.put(id, name) {
            Ok(()) => {
                let _ = reply.send(Reply::PutName);
            }
            Err(e) => {
                let _ = reply.send(error_reply(&e));
            }
        }
    }

    fn handle_get_name(
        &mut self,
        token: ConnectionToken,
        name: String,
        wait: bool,
        reply: oneshot::Sender<Reply>,
    ) {
        if let Some(id) = self.names.get(&name) {
            let _ = reply.send(Reply::GetName { id });
            return;
        }
        if wait {
            self.deferred.push(DeferredReq {
                connection_token: token,
                arrived_at_generation: self.generation,
                kind: DeferredKind::GetName { name },
                reply,
            });
            return;
        }
        let _ = reply.send(error_reply(&StoreError::NotFound(name)));
    }

    fn handle_drop_name(&mut self, name: &str, reply: oneshot::Sender<Reply>) {
        match self.names.drop(name) {
            Ok(()) => {
                let _ = reply.send(Reply::DropName);
            }
            Err(e) => {
                let _ = reply.send(error_reply(&e));
            }
        }
    }
}

fn not_ready() -> Reply {
    Reply::Error {
        code: error_codes::NOT_READY.to_string(),
        message: "server has not reached backend-ready".to_string(),
    }
}

fn error_reply(err: &StoreError) -> Reply {
    debug!(code = err.code(), "dispatcher returning error reply");
    Reply::Error {
        code: err.code().to_string(),
        message: err.to_string(),
    }
}

pub fn new_connection_token() -> ConnectionToken {
    Arc::new(AtomicBool::new(true))
}
