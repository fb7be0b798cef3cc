//! Call descriptor
//!
//! The request shape every remote call is reduced to. A descriptor is built
//! fresh for every attempt and is never persisted.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::partition::PartitionKey;

/// Description of one remote method call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallDescriptor {
    /// Slice (service container) the call is addressed to
    pub slice_name: String,

    /// Simple name of the service interface
    pub service_name: String,

    /// Method to invoke
    pub method_name: String,

    /// Declared parameter types, in order
    pub arg_types: Vec<String>,

    /// Actual argument values, in order
    pub args: Vec<Value>,

    /// Resolved partition key (partitioned calls only)
    pub partition_key: Option<PartitionKey>,
}

impl CallDescriptor {
    pub fn new(
        slice_name: impl Into<String>,
        service_name: impl Into<String>,
        method_name: impl Into<String>,
        arg_types: Vec<String>,
        args: Vec<Value>,
    ) -> Self {
        Self {
            slice_name: slice_name.into(),
            service_name: service_name.into(),
            method_name: method_name.into(),
            arg_types,
            args,
            partition_key: None,
        }
    }

    pub fn with_partition_key(mut self, key: PartitionKey) -> Self {
        self.partition_key = Some(key);
        self
    }

    /// `Service.method`, used in log lines and error messages
    pub fn qualified_method(&self) -> String {
        format!("{}.{}", self.service_name, self.method_name)
    }
}
