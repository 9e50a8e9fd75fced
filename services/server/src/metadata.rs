//! Metadata façade (spec §4.5): a thin adapter over the external metadata
//! backing store. The backing store itself is out of scope (spec §1); it is
//! represented here as a trait so the dispatcher can be exercised against a
//! real façade without a real consensus/KV system behind it.

use std::collections::HashMap;
use store_core::{
    decode_instance_key, encode_instance_key, InstanceID, InstanceStatus, MetaTree, ObjectID,
    Signature, StoreError, StoreResult,
};
use tokio::sync::mpsc;

/// The external collaborator the façade adapts. A real implementation talks
/// to a distributed KV/consensus system; [`InMemoryMetadataBackend`] is the
/// only implementation this crate ships.
pub trait MetadataBackend: Send {
    fn get(&self, id: ObjectID) -> Option<MetaTree>;
    fn put(&mut self, id: ObjectID, tree: MetaTree);
    fn remove(&mut self, id: ObjectID) -> Option<MetaTree>;
    fn all(&self) -> Vec<(ObjectID, MetaTree)>;
    fn put_instance_status(&mut self, id: InstanceID, status: InstanceStatus);
    fn cluster_keys(&self) -> Vec<(String, InstanceStatus)>;
}

/// In-memory stand-in for the external metadata backend. Single-instance
/// only: it stores its own instance's status under the sentinel-prefixed
/// key scheme described in spec §4.5/§8 scenario S5.
#[derive(Default)]
pub struct InMemoryMetadataBackend {
    objects: HashMap<ObjectID, MetaTree>,
    instances: HashMap<InstanceID, InstanceStatus>,
}

impl MetadataBackend for InMemoryMetadataBackend {
    fn get(&self, id: ObjectID) -> Option<MetaTree> {
        self.objects.get(&id).cloned()
    }

    fn put(&mut self, id: ObjectID, tree: MetaTree) {
        self.objects.insert(id, tree);
    }

    fn remove(&mut self, id: ObjectID) -> Option<MetaTree> {
        self.objects.remove(&id)
    }

    fn all(&self) -> Vec<(ObjectID, MetaTree)> {
        self.objects.iter().map(|(k, v)| (*k, v.clone())).collect()
    }

    fn put_instance_status(&mut self, id: InstanceID, status: InstanceStatus) {
        self.instances.insert(id, status);
    }

    fn cluster_keys(&self) -> Vec<(String, InstanceStatus)> {
        self.instances
            .iter()
            .map(|(id, status)| (encode_instance_key(*id), *status))
            .collect()
    }
}

/// Monotonically increasing generation counter handed to `watch`
/// subscribers; the dispatcher uses it only to know a snapshot changed, not
/// to compare generations against each other.
pub type ClusterGeneration = u64;

/// Thin adapter over a [`MetadataBackend`]. Owns the next id/signature
/// counters (in a real cluster these would be assigned by the backend
/// itself) and fans out change notifications to `watch` subscribers.
pub struct MetadataFacade<B> {
    backend: B,
    next_id: u64,
    instance_id: InstanceID,
    generation: ClusterGeneration,
    watchers: Vec<mpsc::UnboundedSender<ClusterGeneration>>,
}

impl<B: MetadataBackend> MetadataFacade<B> {
    pub fn new(backend: B, instance_id: InstanceID) -> Self {
        MetadataFacade {
            backend,
            next_id: 1,
            instance_id,
            generation: 0,
            watchers: Vec::new(),
        }
    }

    /// Registers a new watcher; the returned receiver yields the generation
    /// number after every subsequent mutation.
    pub fn watch(&mut self) -> mpsc::UnboundedReceiver<ClusterGeneration> {
        let (tx, rx) = mpsc::unbounded_channel();
        self.watchers.push(tx);
        rx
    }

    fn notify(&mut self) {
        self.generation += 1;
        let gen = self.generation;
        self.watchers.retain(|tx| tx.send(gen).is_ok());
    }

    pub fn get(&self, id: ObjectID) -> StoreResult<MetaTree> {
        self.backend
            .get(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))
    }

    pub fn get_many(&mut self, ids: &[ObjectID], sync_remote: bool) -> HashMap<ObjectID, MetaTree> {
        if sync_remote {
            self.sync();
        }
        ids.iter()
            .filter_map(|id| self.backend.get(*id).map(|tree| (*id, tree)))
            .collect()
    }

    pub fn has_all(&self, ids: &[ObjectID]) -> bool {
        ids.iter().all(|id| self.backend.get(*id).is_some())
    }

    pub fn put(&mut self, mut tree: MetaTree) -> (ObjectID, Signature, InstanceID) {
        let id = ObjectID(self.next_id);
        self.next_id += 1;
        let signature = Signature(id.0);
        tree.finalize_created(id, signature, self.instance_id);
        self.backend.put(id, tree);
        self.notify();
        (id, signature, self.instance_id)
    }

    pub fn remove(&mut self, id: ObjectID) -> Option<MetaTree> {
        let removed = self.backend.remove(id);
        if removed.is_some() {
            self.notify();
        }
        removed
    }

    pub fn persist(&mut self, id: ObjectID) -> StoreResult<()> {
        let mut tree = self.get(id)?;
        tree.set_transient(false);
        self.backend.put(id, tree);
        self.notify();
        Ok(())
    }

    pub fn is_persisted(&self, id: ObjectID) -> StoreResult<bool> {
        self.get(id).map(|t| !t.transient())
    }

    /// Forces reconciliation with peers. The in-memory backend has no
    /// peers, so this is a no-op beyond bumping the generation counter so
    /// callers relying on `sync_remote` to force a refresh still observe a
    /// new snapshot (spec §9 open question: `sync` replaces the
    /// `GetData(InvalidObjectID, sync_remote=true)` side-effect).
    pub fn sync(&mut self) {
        self.notify();
    }

    pub fn record_instance_status(&mut self, status: InstanceStatus) {
        self.backend.put_instance_status(self.instance_id, status);
    }

    /// Drops every transient object owned by `instance_id` from the backing
    /// store, without touching persisted objects. Used by the lifecycle
    /// supervisor's shutdown path so a stopped instance doesn't leave
    /// unreachable transient metadata behind (`DeleteAllAt`/
    /// `DeleteBlobBatch` lineage).
    pub fn delete_all_at(&mut self, instance_id: InstanceID) {
        let dead: Vec<ObjectID> = self
            .backend
            .all()
            .into_iter()
            .filter(|(_, tree)| tree.instance_id() == Some(instance_id) && tree.transient())
            .map(|(id, _)| id)
            .collect();
        let mut removed_any = false;
        for id in dead {
            if self.backend.remove(id).is_some() {
                removed_any = true;
            }
        }
        if removed_any {
            self.notify();
        }
    }

    /// Sentinel-prefixed keys are decoded per spec §4.5/§8 scenario S5.
    pub fn cluster_meta(&self) -> HashMap<InstanceID, InstanceStatus> {
        self.backend
            .cluster_keys()
            .into_iter()
            .filter_map(|(key, status)| decode_instance_key(&key).map(|id| (id, status)))
            .collect()
    }

    pub fn all(&self) -> Vec<(ObjectID, MetaTree)> {
        self.backend.all()
    }
}
