//! Cluster member identity

use serde::{Deserialize, Serialize};
use std::fmt;

/// Unique identifier of a cluster member
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MemberId(String);

impl MemberId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MemberId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// A member of the cluster.
///
/// Lite members take part in the cluster but own no partitions and never host
/// services, so load-balanced calls skip them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Member {
    /// Unique member ID
    pub id: MemberId,

    /// Network address, informational only
    pub address: String,

    /// Whether this is a lite (data-less) member
    pub lite: bool,
}

impl Member {
    /// Create a data member
    pub fn new(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            id: MemberId::new(id),
            address: address.into(),
            lite: false,
        }
    }

    /// Create a lite member
    pub fn lite(id: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            lite: true,
            ..Self::new(id, address)
        }
    }

    pub fn is_lite(&self) -> bool {
        self.lite
    }
}

impl fmt::Display for Member {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Member[{}@{}", self.id, self.address)?;
        if self.lite {
            f.write_str(" lite")?;
        }
        f.write_str("]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_display() {
        assert_eq!(Member::new("m1", "10.0.0.1:5701").to_string(), "Member[m1@10.0.0.1:5701]");
        assert_eq!(Member::lite("m2", "10.0.0.2:5701").to_string(), "Member[m2@10.0.0.2:5701 lite]");
    }

    #[test]
    fn test_lite_flag() {
        assert!(!Member::new("m1", "a").is_lite());
        assert!(Member::lite("m1", "a").is_lite());
    }
}
