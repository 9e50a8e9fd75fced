use crate::ids::InstanceID;

/// Single sentinel character prefixed onto every instance key stored in the
/// external metadata backend, to disambiguate instance keys from any other
/// (numeric-looking) key sharing the same namespace.
pub const CLUSTER_KEY_SENTINEL: char = 's';

/// `<sentinel><instance-id-decimal>`, e.g. instance 1 -> `"s1"`.
#[must_use]
pub fn encode_instance_key(id: InstanceID) -> String {
    format!("{CLUSTER_KEY_SENTINEL}{}", id.0)
}

/// Strips the sentinel and parses the remainder as a decimal instance id.
/// Returns `None` if the key doesn't start with the sentinel or the
/// remainder isn't a valid integer.
#[must_use]
pub fn decode_instance_key(key: &str) -> Option<InstanceID> {
    let rest = key.strip_prefix(CLUSTER_KEY_SENTINEL)?;
    rest.parse().ok().map(InstanceID)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_instance_keys() {
        let id = InstanceID(42);
        let key = encode_instance_key(id);
        assert_eq!(key, "s42");
        assert_eq!(decode_instance_key(&key), Some(id));
    }

    #[test]
    fn cluster_meta_decode_scenario_s5() {
        assert_eq!(decode_instance_key("s1"), Some(InstanceID(1)));
        assert_eq!(decode_instance_key("s2"), Some(InstanceID(2)));
    }

    #[test]
    fn rejects_keys_without_sentinel_or_with_garbage_suffix() {
        assert_eq!(decode_instance_key("1"), None);
        assert_eq!(decode_instance_key("sabc"), None);
        assert_eq!(decode_instance_key(""), None);
    }
}
