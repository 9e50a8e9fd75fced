//! Name bindings (spec §3): a mapping from human-readable string to
//! `ObjectID`. Names are unique; putting an already-bound name succeeds
//! only when it rebinds to the same id.

use std::collections::HashMap;
use store_core::{ObjectID, StoreError, StoreResult};

#[derive(Default)]
pub struct NameTable {
    names: HashMap<String, ObjectID>,
}

impl NameTable {
    pub fn put(&mut self, id: ObjectID, name: String) -> StoreResult<()> {
        match self.names.get(&name) {
            Some(existing) if *existing != id => Err(StoreError::AlreadyExists(name)),
            _ => {
                self.names.insert(name, id);
                Ok(())
            }
        }
    }

    pub fn get(&self, name: &str) -> Option<ObjectID> {
        self.names.get(name).copied()
    }

    pub fn drop(&mut self, name: &str) -> StoreResult<()> {
        self.names
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| StoreError::NotFound(name.to_string()))
    }

    pub fn has(&self, name: &str) -> bool {
        self.names.contains_key(name)
    }
}
