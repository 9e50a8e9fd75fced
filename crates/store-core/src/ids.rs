use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque 64-bit handle naming one object, unique within the cluster.
///
/// [`ObjectID::INVALID`] is reserved and never names a real object; IDs are
/// never reused once handed out by a [`CreateData`](crate) reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectID(pub u64);

impl ObjectID {
    pub const INVALID: ObjectID = ObjectID(u64::MAX);

    #[must_use]
    pub fn is_invalid(self) -> bool {
        self == Self::INVALID
    }
}

impl fmt::Display for ObjectID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for ObjectID {
    fn from(v: u64) -> Self {
        ObjectID(v)
    }
}

/// Attached at creation time; distinguishes logically distinct objects that
/// happen to carry identical content. Immutable after creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Signature(pub u64);

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Names one server process in the cluster. Persisted in cluster metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct InstanceID(pub u64);

impl InstanceID {
    pub const UNSPECIFIED: InstanceID = InstanceID(u64::MAX);
}

impl fmt::Display for InstanceID {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for InstanceID {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(InstanceID(s.parse()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_object_id_is_distinguished() {
        assert!(ObjectID::INVALID.is_invalid());
        assert!(!ObjectID(0).is_invalid());
        assert!(!ObjectID(42).is_invalid());
    }

    #[test]
    fn object_id_round_trips_through_json() {
        let id = ObjectID(42);
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "42");
        let back: ObjectID = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }
}
