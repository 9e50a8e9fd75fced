use crate::ids::{InstanceID, ObjectID, Signature};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An unordered schemaless metadata tree: keys are strings, values are
/// trees, strings, integers, floats, booleans, or arrays.
///
/// Reserved keys are `id`, `signature`, `instance_id`, `typename`, `nbytes`,
/// `transient`, `incomplete`, plus nested member references (any value that
/// is itself an object carrying an `id`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetaTree(pub serde_json::Map<String, Value>);

impl MetaTree {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    #[must_use]
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(key.into(), value.into());
    }

    #[must_use]
    pub fn id(&self) -> Option<ObjectID> {
        self.0.get("id").and_then(Value::as_u64).map(ObjectID)
    }

    pub fn set_id(&mut self, id: ObjectID) {
        self.insert("id", id.0);
    }

    #[must_use]
    pub fn signature(&self) -> Option<Signature> {
        self.0
            .get("signature")
            .and_then(Value::as_u64)
            .map(Signature)
    }

    pub fn set_signature(&mut self, signature: Signature) {
        self.insert("signature", signature.0);
    }

    #[must_use]
    pub fn instance_id(&self) -> Option<InstanceID> {
        self.0
            .get("instance_id")
            .and_then(Value::as_u64)
            .map(InstanceID)
    }

    pub fn set_instance_id(&mut self, instance_id: InstanceID) {
        self.insert("instance_id", instance_id.0);
    }

    #[must_use]
    pub fn typename(&self) -> Option<&str> {
        self.0.get("typename").and_then(Value::as_str)
    }

    /// Reads `nbytes`, defaulting to 0 when absent (spec §3 invariant).
    #[must_use]
    pub fn nbytes(&self) -> u64 {
        self.0.get("nbytes").and_then(Value::as_u64).unwrap_or(0)
    }

    pub fn set_nbytes(&mut self, nbytes: u64) {
        self.insert("nbytes", nbytes);
    }

    #[must_use]
    pub fn transient(&self) -> bool {
        self.0
            .get("transient")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    pub fn set_transient(&mut self, transient: bool) {
        self.insert("transient", transient);
    }

    /// True when the tree was flagged `incomplete`: it may reference member
    /// objects resident on other instances.
    #[must_use]
    pub fn incomplete(&self) -> bool {
        self.0
            .get("incomplete")
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    pub fn set_incomplete(&mut self, incomplete: bool) {
        self.insert("incomplete", incomplete);
    }

    /// Apply the mandatory invariants for a freshly created object: carry
    /// `id`/`signature`/`instance_id`, default `nbytes` to 0 if absent.
    pub fn finalize_created(&mut self, id: ObjectID, signature: Signature, instance_id: InstanceID) {
        self.set_id(id);
        self.set_signature(signature);
        self.set_instance_id(instance_id);
        if !self.has_key("nbytes") {
            self.set_nbytes(0);
        }
    }
}

impl From<serde_json::Map<String, Value>> for MetaTree {
    fn from(map: serde_json::Map<String, Value>) -> Self {
        MetaTree(map)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nbytes_defaults_to_zero_when_absent() {
        let tree = MetaTree::new();
        assert_eq!(tree.nbytes(), 0);
    }

    #[test]
    fn transient_defaults_to_true_until_persisted() {
        let tree = MetaTree::new();
        assert!(tree.transient());
    }

    #[test]
    fn finalize_created_sets_reserved_keys_and_default_nbytes() {
        let mut tree = MetaTree::new();
        tree.insert("typename", "Blob");
        tree.finalize_created(ObjectID(42), Signature(99), InstanceID(1));

        assert_eq!(tree.id(), Some(ObjectID(42)));
        assert_eq!(tree.signature(), Some(Signature(99)));
        assert_eq!(tree.instance_id(), Some(InstanceID(1)));
        assert_eq!(tree.nbytes(), 0);
        assert_eq!(tree.typename(), Some("Blob"));
    }

    #[test]
    fn finalize_created_preserves_explicit_nbytes() {
        let mut tree = MetaTree::new();
        tree.set_nbytes(16);
        tree.finalize_created(ObjectID(1), Signature(1), InstanceID(1));
        assert_eq!(tree.nbytes(), 16);
    }
}
