//! Bulk memory allocator (spec §1, out of scope beyond capacity
//! accounting). The real allocator's page/segment management lives outside
//! this core; [`BulkStore`] gives the dispatcher just enough of a contract
//! to reject creates that would overrun the configured capacity and to
//! report usage in `instance_status`.

use store_core::{StoreError, StoreResult};

pub trait BulkStore: Send {
    fn capacity(&self) -> u64;
    fn used(&self) -> u64;
    fn allocate(&mut self, nbytes: u64) -> StoreResult<()>;
    fn release(&mut self, nbytes: u64);
}

pub struct InMemoryBulkStore {
    capacity: u64,
    used: u64,
}

impl InMemoryBulkStore {
    pub fn new(capacity: u64) -> Self {
        InMemoryBulkStore { capacity, used: 0 }
    }
}

impl BulkStore for InMemoryBulkStore {
    fn capacity(&self) -> u64 {
        self.capacity
    }

    fn used(&self) -> u64 {
        self.used
    }

    fn allocate(&mut self, nbytes: u64) -> StoreResult<()> {
        if self.used + nbytes > self.capacity {
            return Err(StoreError::RemoteFailure(format!(
                "bulk store capacity exceeded: {} + {} > {}",
                self.used, nbytes, self.capacity
            )));
        }
        self.used += nbytes;
        Ok(())
    }

    fn release(&mut self, nbytes: u64) {
        self.used = self.used.saturating_sub(nbytes);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_tracks_usage_and_rejects_overcommit() {
        let mut store = InMemoryBulkStore::new(100);
        store.allocate(60).unwrap();
        assert_eq!(store.used(), 60);
        assert!(store.allocate(50).is_err());
        assert_eq!(store.used(), 60);
    }

    #[test]
    fn release_returns_capacity_and_never_underflows() {
        let mut store = InMemoryBulkStore::new(100);
        store.allocate(40).unwrap();
        store.release(40);
        assert_eq!(store.used(), 0);
        store.release(10);
        assert_eq!(store.used(), 0);
    }
}
