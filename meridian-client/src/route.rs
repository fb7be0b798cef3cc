//! Analyzed routes
//!
//! The output of [`InterfaceAnalyzer`](crate::InterfaceAnalyzer): one
//! [`MethodRoute`] per method signature, immutable once built and shared by
//! every call through the proxy.

use meridian_router::RoutingPolicy;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::schema::AccessorFn;

/// Method name plus ordered parameter type names
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodSignature {
    pub name: String,
    pub param_types: Vec<String>,
}

impl MethodSignature {
    pub fn new(name: impl Into<String>, param_types: Vec<String>) -> Self {
        Self {
            name: name.into(),
            param_types,
        }
    }

    pub fn arity(&self) -> usize {
        self.param_types.len()
    }
}

impl fmt::Display for MethodSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.name, self.param_types.join(", "))
    }
}

/// How the partition key is read off the key argument
#[derive(Clone)]
pub enum KeyAccessor {
    /// Zero-argument method resolved by probing
    Method { name: String, call: AccessorFn },
    /// Declared field of the argument object
    Field { name: String },
}

impl KeyAccessor {
    pub fn name(&self) -> &str {
        match self {
            KeyAccessor::Method { name, .. } | KeyAccessor::Field { name } => name,
        }
    }
}

impl fmt::Debug for KeyAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyAccessor::Method { name, .. } => f.debug_tuple("Method").field(name).finish(),
            KeyAccessor::Field { name } => f.debug_tuple("Field").field(name).finish(),
        }
    }
}

/// Where the partition key of a partitioned call comes from
#[derive(Clone)]
pub struct PartitionKeySpec {
    /// Index of the key argument
    pub index: usize,
    pub accessor: Option<KeyAccessor>,

    /// Declared type of the key argument
    pub type_name: String,

    /// Set when the declared type reports its own key
    pub self_key: Option<AccessorFn>,
}

impl fmt::Debug for PartitionKeySpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PartitionKeySpec")
            .field("index", &self.index)
            .field("accessor", &self.accessor)
            .field("type_name", &self.type_name)
            .field("self_describing", &self.self_key.is_some())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub enum DispatchMode {
    Partitioned(PartitionKeySpec),
    /// The policy is built once per method and shared by all callers
    LoadBalanced(Arc<dyn RoutingPolicy>),
}

#[derive(Debug, Clone)]
pub struct MethodRoute {
    pub signature: MethodSignature,
    pub mode: DispatchMode,
    pub timeout: Duration,
    pub interrupt_on_timeout: bool,
}

impl MethodRoute {
    pub fn method_name(&self) -> &str {
        &self.signature.name
    }

    pub fn arg_types(&self) -> &[String] {
        &self.signature.param_types
    }

    pub fn is_partitioned(&self) -> bool {
        matches!(self.mode, DispatchMode::Partitioned(_))
    }
}

/// Routing table of one service interface
#[derive(Debug, Clone)]
pub struct ServiceInterfaceDescriptor {
    /// Fully qualified interface name
    pub name: String,

    /// Simple name, sent as the service name
    pub service_name: String,

    pub routes: HashMap<MethodSignature, Arc<MethodRoute>>,
}

impl ServiceInterfaceDescriptor {
    pub fn route(&self, signature: &MethodSignature) -> Option<&Arc<MethodRoute>> {
        self.routes.get(signature)
    }

    /// Routes with the given name and arity
    pub fn find(&self, name: &str, arity: usize) -> Vec<&Arc<MethodRoute>> {
        let mut found: Vec<_> = self
            .routes
            .values()
            .filter(|r| r.signature.name == name && r.signature.arity() == arity)
            .collect();
        found.sort_by(|a, b| a.signature.param_types.cmp(&b.signature.param_types));
        found
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
