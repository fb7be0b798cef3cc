//! Host configuration

use crate::error::{HostError, Result};

/// Partition count used by the cluster unless configured otherwise
pub const DEFAULT_PARTITION_COUNT: u32 = 271;

/// Slice hosted on every member unless configured otherwise
pub const DEFAULT_SLICE_NAME: &str = "default";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostConfig {
    /// Number of partitions keys are hashed into
    pub partition_count: u32,

    /// Name of the slice every member hosts
    pub slice_name: String,
}

impl HostConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let partition_count = std::env::var("MERIDIAN_PARTITION_COUNT")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_PARTITION_COUNT);

        let slice_name = std::env::var("MERIDIAN_SLICE_NAME")
            .unwrap_or_else(|_| DEFAULT_SLICE_NAME.to_string());

        Self {
            partition_count,
            slice_name,
        }
    }

    pub fn with_partition_count(mut self, partition_count: u32) -> Self {
        self.partition_count = partition_count;
        self
    }

    pub fn with_slice_name(mut self, slice_name: impl Into<String>) -> Self {
        self.slice_name = slice_name.into();
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.partition_count == 0 {
            return Err(HostError::InvalidConfig(
                "partition count must be greater than zero".to_string(),
            ));
        }
        if self.slice_name.is_empty() {
            return Err(HostError::InvalidConfig(
                "slice name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            partition_count: DEFAULT_PARTITION_COUNT,
            slice_name: DEFAULT_SLICE_NAME.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = HostConfig::default();
        assert_eq!(config.partition_count, 271);
        assert_eq!(config.slice_name, "default");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_values() {
        assert!(HostConfig::default().with_partition_count(0).validate().is_err());
        assert!(HostConfig::default().with_slice_name("").validate().is_err());
    }
}
