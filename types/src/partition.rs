//! Partition keys
//!
//! A partition key is the value a partitioned call is routed by. The key is
//! hashed into one of a fixed number of partitions; whichever member owns
//! that partition executes the call.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;

/// Partition number within `[0, partition_count)`
pub type PartitionId = u32;

/// A non-null routing key
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PartitionKey(Value);

impl PartitionKey {
    /// Wrap a key value. Returns `None` for `Value::Null`.
    pub fn new(value: Value) -> Option<Self> {
        if value.is_null() {
            None
        } else {
            Some(Self(value))
        }
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// SHA-256 over the canonical JSON encoding of the key.
    ///
    /// Object keys are ordered, so equal values always produce equal digests
    /// no matter how they were built.
    pub fn digest(&self) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(b"PARTITION:");
        hasher.update(self.0.to_string().as_bytes());
        let result = hasher.finalize();
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&result);
        bytes
    }

    /// Short hex fingerprint, handy in log lines
    pub fn fingerprint(&self) -> String {
        hex::encode(&self.digest()[..8])
    }

    /// Partition this key falls into
    pub fn partition_id(&self, partition_count: u32) -> PartitionId {
        let digest = self.digest();
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        (u64::from_be_bytes(head) % u64::from(partition_count.max(1))) as PartitionId
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Value::String(s) => f.write_str(s),
            other => write!(f, "{}", other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_null_is_not_a_key() {
        assert!(PartitionKey::new(Value::Null).is_none());
        assert!(PartitionKey::new(json!("alice")).is_some());
    }

    #[test]
    fn test_partition_id_is_stable_and_in_range() {
        let key = PartitionKey::new(json!({"tenant": "acme", "id": 42})).unwrap();
        let same = PartitionKey::new(json!({"id": 42, "tenant": "acme"})).unwrap();

        for count in [1, 7, 271] {
            let p = key.partition_id(count);
            assert!(p < count);
            assert_eq!(p, same.partition_id(count));
        }
    }

    #[test]
    fn test_zero_partitions_does_not_panic() {
        let key = PartitionKey::new(json!(1)).unwrap();
        assert_eq!(key.partition_id(0), 0);
    }

    #[test]
    fn test_display() {
        assert_eq!(PartitionKey::new(json!("alice")).unwrap().to_string(), "alice");
        assert_eq!(PartitionKey::new(json!(7)).unwrap().to_string(), "7");
        assert_eq!(PartitionKey::new(json!(7)).unwrap().fingerprint().len(), 16);
    }
}
