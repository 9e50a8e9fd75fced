//! Deferred-request queue (spec §4.3, §9 design note).
//!
//! The source captures alive/trigger/call as three closures per deferred
//! request; here they are methods on a tagged sum of deferrable request
//! shapes, one variant per deferrable command, so the queue stays plain
//! data and the predicates stay testable in isolation.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use object_protocol::Reply;
use store_core::ObjectID;
use tokio::sync::oneshot;

use crate::metadata::{InMemoryMetadataBackend, MetadataFacade};
use crate::name_table::NameTable;

/// Shared with the connection task that owns the socket; flipped to
/// `false` the moment the connection closes (spec §9's `connection_token`).
pub type ConnectionToken = Arc<AtomicBool>;

pub enum DeferredKind {
    GetData { ids: Vec<ObjectID> },
    GetName { name: String },
}

/// One request the dispatcher could not answer immediately.
pub struct DeferredReq {
    pub connection_token: ConnectionToken,
    pub arrived_at_generation: u64,
    pub kind: DeferredKind,
    pub reply: oneshot::Sender<Reply>,
}

impl DeferredReq {
    fn alive(&self) -> bool {
        self.connection_token.load(Ordering::Acquire)
    }

    fn triggers(&self, facade: &MetadataFacade<InMemoryMetadataBackend>, names: &NameTable) -> bool {
        match &self.kind {
            DeferredKind::GetData { ids } => facade.has_all(ids),
            DeferredKind::GetName { name } => names.has(name),
        }
    }

    fn fire(self, facade: &mut MetadataFacade<InMemoryMetadataBackend>, names: &NameTable) {
        let reply = match &self.kind {
            DeferredKind::GetData { ids } => {
                let content = facade.get_many(ids, false);
                Reply::GetData { content }
            }
            DeferredKind::GetName { name } => Reply::GetName {
                id: names.get(name).expect("trigger verified presence"),
            },
        };
        let _ = self.reply.send(reply);
    }
}

/// FIFO queue of requests awaiting a metadata condition. Re-tested in
/// arrival order on every metadata update (spec §4.3 ordering rule).
#[derive(Default)]
pub struct DeferredQueue {
    pending: VecDeque<DeferredReq>,
}

impl DeferredQueue {
    pub fn push(&mut self, req: DeferredReq) {
        self.pending.push_back(req);
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    /// Re-tests every pending request in FIFO order against the current
    /// snapshot. A request whose connection has died is dropped without a
    /// reply; one whose trigger now holds is fired and removed. A request
    /// that is simultaneously dead and triggered is dropped silently (spec
    /// §4.3 tie-break) rather than fired.
    pub fn retest(&mut self, facade: &mut MetadataFacade<InMemoryMetadataBackend>, names: &NameTable) {
        let mut still_pending = VecDeque::with_capacity(self.pending.len());
        while let Some(req) = self.pending.pop_front() {
            if !req.alive() {
                continue;
            }
            if req.triggers(facade, names) {
                req.fire(facade, names);
            } else {
                still_pending.push_back(req);
            }
        }
        self.pending = still_pending;
    }

    /// Drains every pending request with a `cancelled` reply (spec §4.6
    /// `Stop`).
    pub fn cancel_all(&mut self) {
        while let Some(req) = self.pending.pop_front() {
            let _ = req.reply.send(Reply::Error {
                code: object_protocol::error_codes::CANCELLED.to_string(),
                message: "server shutting down".to_string(),
            });
        }
    }

    /// Drops every request whose connection has died, without replying.
    /// Called independent of a metadata update so a dispatcher idle tick
    /// also collects dead requests (spec §8 invariant 4).
    pub fn collect_dead(&mut self) {
        self.pending.retain(|req| req.alive());
    }
}
