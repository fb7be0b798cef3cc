//! Service interface declarations
//!
//! A remote service is described by an explicit schema instead of runtime
//! introspection: each method lists its parameters, the parameter marked as
//! partition key, and exactly one routing annotation.
//!
//! ```rust,ignore
//! let accounts = ServiceInterface::builder("bank::AccountService")
//!     .remotely_exposable()
//!     .method(
//!         MethodDecl::new("deposit")
//!             .param(ParamDecl::new("account", "Account").partition_key_property("id"))
//!             .param(ParamDecl::new("amount", "i64"))
//!             .partitioned(PartitionedOptions::default()),
//!     )
//!     .method(
//!         MethodDecl::new("audit")
//!             .load_balanced(LoadBalancedOptions::default().timeout(Duration::from_secs(5))),
//!     )
//!     .build();
//! ```
//!
//! Parameter types probed for a partition-key property are described in a
//! [`TypeRegistry`].

use meridian_router::ROUND_ROBIN;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Accessor invoked on an argument value. `Err` carries the failure reason.
pub type AccessorFn = Arc<dyn Fn(&Value) -> Result<Value, String> + Send + Sync>;

// ============================================
// Routing annotations
// ============================================

/// Options of a partitioned method
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionedOptions {
    /// Per-attempt timeout; the client default applies when unset
    pub timeout: Option<Duration>,
    pub interrupt_on_timeout: bool,
}

impl PartitionedOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn interrupt_on_timeout(mut self, interrupt: bool) -> Self {
        self.interrupt_on_timeout = interrupt;
        self
    }
}

/// Options of a load-balanced method
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancedOptions {
    /// Per-attempt timeout; the client default applies when unset
    pub timeout: Option<Duration>,
    pub interrupt_on_timeout: bool,

    /// Name of the routing policy in the client's policy registry
    pub policy: String,
}

impl LoadBalancedOptions {
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn interrupt_on_timeout(mut self, interrupt: bool) -> Self {
        self.interrupt_on_timeout = interrupt;
        self
    }

    pub fn policy(mut self, policy: impl Into<String>) -> Self {
        self.policy = policy.into();
        self
    }
}

impl Default for LoadBalancedOptions {
    fn default() -> Self {
        Self {
            timeout: None,
            interrupt_on_timeout: false,
            policy: ROUND_ROBIN.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoutingAnnotation {
    Partitioned(PartitionedOptions),
    LoadBalanced(LoadBalancedOptions),
}

// ============================================
// Methods and parameters
// ============================================

/// Marks the parameter a partitioned call is routed by
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PartitionKeyMarker {
    /// Property of the argument to use as key instead of the argument itself
    pub property: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamDecl {
    pub name: String,
    pub type_name: String,
    pub partition_key: Option<PartitionKeyMarker>,
}

impl ParamDecl {
    pub fn new(name: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            type_name: type_name.into(),
            partition_key: None,
        }
    }

    /// Use the argument itself as partition key
    pub fn partition_key(mut self) -> Self {
        self.partition_key = Some(PartitionKeyMarker::default());
        self
    }

    /// Use a property of the argument as partition key
    pub fn partition_key_property(mut self, property: impl Into<String>) -> Self {
        let property = property.into();
        self.partition_key = Some(PartitionKeyMarker {
            property: if property.is_empty() { None } else { Some(property) },
        });
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodDecl {
    pub name: String,
    pub params: Vec<ParamDecl>,
    pub annotations: Vec<RoutingAnnotation>,
}

impl MethodDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            params: Vec::new(),
            annotations: Vec::new(),
        }
    }

    pub fn param(mut self, param: ParamDecl) -> Self {
        self.params.push(param);
        self
    }

    pub fn partitioned(self, options: PartitionedOptions) -> Self {
        self.annotate(RoutingAnnotation::Partitioned(options))
    }

    pub fn load_balanced(self, options: LoadBalancedOptions) -> Self {
        self.annotate(RoutingAnnotation::LoadBalanced(options))
    }

    pub fn annotate(mut self, annotation: RoutingAnnotation) -> Self {
        self.annotations.push(annotation);
        self
    }

    pub fn param_types(&self) -> Vec<String> {
        self.params.iter().map(|p| p.type_name.clone()).collect()
    }
}

// ============================================
// Interfaces
// ============================================

/// A declared service interface.
///
/// The fully qualified name is the interface identity; the simple name (the
/// segment after the last `::` or `.`) is the service name on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceInterface {
    name: String,
    remotely_exposable: bool,
    extends: Vec<Arc<ServiceInterface>>,
    methods: Vec<MethodDecl>,
}

impl ServiceInterface {
    pub fn builder(name: impl Into<String>) -> ServiceInterfaceBuilder {
        ServiceInterfaceBuilder {
            interface: ServiceInterface {
                name: name.into(),
                remotely_exposable: false,
                extends: Vec::new(),
                methods: Vec::new(),
            },
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn simple_name(&self) -> &str {
        let tail = self.name.rsplit("::").next().unwrap_or(&self.name);
        tail.rsplit('.').next().unwrap_or(tail)
    }

    pub fn is_remotely_exposable(&self) -> bool {
        self.remotely_exposable
    }

    pub fn extends(&self) -> &[Arc<ServiceInterface>] {
        &self.extends
    }

    /// Methods declared directly on this interface
    pub fn methods(&self) -> &[MethodDecl] {
        &self.methods
    }
}

pub struct ServiceInterfaceBuilder {
    interface: ServiceInterface,
}

impl ServiceInterfaceBuilder {
    /// Mark the interface as allowed to be proxied
    pub fn remotely_exposable(mut self) -> Self {
        self.interface.remotely_exposable = true;
        self
    }

    pub fn extends(mut self, parent: Arc<ServiceInterface>) -> Self {
        self.interface.extends.push(parent);
        self
    }

    pub fn method(mut self, method: MethodDecl) -> Self {
        self.interface.methods.push(method);
        self
    }

    pub fn build(self) -> Arc<ServiceInterface> {
        Arc::new(self.interface)
    }
}

// ============================================
// Argument types
// ============================================

/// What an accessor method returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReturnKind {
    Value,
    Void,
}

#[derive(Clone)]
pub struct MethodAccessorDecl {
    pub name: String,
    pub returns: ReturnKind,
    pub call: AccessorFn,
}

impl fmt::Debug for MethodAccessorDecl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MethodAccessorDecl")
            .field("name", &self.name)
            .field("returns", &self.returns)
            .finish()
    }
}

/// Shape of an argument type: its zero-argument methods, its fields, and
/// optionally a self-describing partition key.
#[derive(Clone)]
pub struct TypeDescriptor {
    name: String,
    methods: Vec<MethodAccessorDecl>,
    fields: Vec<String>,
    self_key: Option<AccessorFn>,
}

impl TypeDescriptor {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            methods: Vec::new(),
            fields: Vec::new(),
            self_key: None,
        }
    }

    /// Zero-argument method returning a value
    pub fn method<F>(mut self, name: impl Into<String>, call: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.methods.push(MethodAccessorDecl {
            name: name.into(),
            returns: ReturnKind::Value,
            call: Arc::new(call),
        });
        self
    }

    /// Zero-argument method returning nothing
    pub fn void_method<F>(mut self, name: impl Into<String>, call: F) -> Self
    where
        F: Fn(&Value) -> Result<Value, String> + Send + Sync + 'static,
    {
        self.methods.push(MethodAccessorDecl {
            name: name.into(),
            returns: ReturnKind::Void,
            call: Arc::new(call),
        });
        self
    }

    /// Field read straight out of the argument object
    pub fn field(mut self, name: impl Into<String>) -> Self {
        self.fields.push(name.into());
        self
    }

    /// Values of this type report their own partition key
    pub fn self_describing_key<F>(mut self, key: F) -> Self
    where
        F: Fn(&Value) -> Value + Send + Sync + 'static,
    {
        self.self_key = Some(Arc::new(move |value: &Value| Ok(key(value))));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn find_method(&self, name: &str) -> Option<&MethodAccessorDecl> {
        self.methods.iter().find(|m| m.name == name)
    }

    pub fn has_field(&self, name: &str) -> bool {
        self.fields.iter().any(|f| f == name)
    }

    pub fn self_key(&self) -> Option<&AccessorFn> {
        self.self_key.as_ref()
    }
}

impl fmt::Debug for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TypeDescriptor")
            .field("name", &self.name)
            .field("methods", &self.methods)
            .field("fields", &self.fields)
            .field("self_describing_key", &self.self_key.is_some())
            .finish()
    }
}

/// Argument types by name
#[derive(Debug, Clone, Default)]
pub struct TypeRegistry {
    types: HashMap<String, Arc<TypeDescriptor>>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, descriptor: TypeDescriptor) -> &mut Self {
        self.types
            .insert(descriptor.name().to_string(), Arc::new(descriptor));
        self
    }

    pub fn with(mut self, descriptor: TypeDescriptor) -> Self {
        self.register(descriptor);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Arc<TypeDescriptor>> {
        self.types.get(name)
    }
}
