//! Client error types
//!
//! - [`ConfigError`]: the interface declaration is invalid. Raised when the
//!   proxy is created, before any network activity, and never retried.
//! - [`CallerError`]: the arguments of one call cannot be routed. Raised
//!   immediately, never retried.
//! - [`DispatchError`]: everything a proxy call can fail with.
//!
//! Stale routes are not an error kind here: the dispatcher recovers from them
//! by re-routing, so callers only notice them as latency.

use meridian_router::RouterError;
use meridian_types::RemoteError;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("Service interface name must not be empty")]
    EmptyInterfaceName,

    #[error("Interface '{interface}' declares a method with an empty name")]
    EmptyMethodName { interface: String },

    #[error("Interface '{interface}' is not marked remotely exposable and can't be proxied")]
    NotRemotelyExposable { interface: String },

    #[error("Method '{method}' is missing a routing annotation (Partitioned or LoadBalanced)")]
    MissingRoutingAnnotation { method: String },

    #[error("Method '{method}' has {count} routing annotations, exactly one is allowed")]
    ConflictingRoutingAnnotations { method: String, count: usize },

    #[error("Partitioned method '{method}' should have at least 1 parameter to use as partition key")]
    NoParameters { method: String },

    #[error("Partitioned method '{method}' has no parameter marked as partition key")]
    MissingPartitionKey { method: String },

    #[error("Partitioned method '{method}' has {count} parameters marked as partition key, exactly one is allowed")]
    MultiplePartitionKeys { method: String, count: usize },

    #[error(
        "Property '{property}' of partition key argument {index} (type '{type_name}') of method '{method}' \
         doesn't point to an existing method or field"
    )]
    UnresolvedProperty {
        method: String,
        index: usize,
        type_name: String,
        property: String,
    },

    #[error(
        "Property method '{accessor}' of partition key argument {index} (type '{type_name}') of method '{method}' \
         can't return void"
    )]
    VoidAccessor {
        method: String,
        index: usize,
        type_name: String,
        accessor: String,
    },

    #[error("Failed to instantiate routing policy '{policy}' for method '{method}': {source}")]
    Policy {
        method: String,
        policy: String,
        #[source]
        source: RouterError,
    },

    #[error("Method '{method}' is declared by both '{first}' and '{second}'")]
    AmbiguousMethod {
        method: String,
        first: String,
        second: String,
    },

    #[error("Interface '{interface}' is already proxied with a different declaration")]
    ConflictingDeclaration { interface: String },

    #[error("Invalid client configuration: {0}")]
    InvalidClientConfig(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CallerError {
    #[error("The partition key argument {index} of partitioned method '{method}' can't be null")]
    NullPartitionKeyArgument { method: String, index: usize },

    #[error("The partition key argument of type '{type_name}' of partitioned method '{method}' reported a null key")]
    NullSelfDescribingKey { method: String, type_name: String },

    #[error("Property '{accessor}' of the partition key argument of method '{method}' returned null")]
    NullAccessorResult { method: String, accessor: String },

    #[error("Property '{accessor}' of the partition key argument of method '{method}' failed to be invoked: {reason}")]
    AccessorFailed {
        method: String,
        accessor: String,
        reason: String,
    },

    #[error("Method '{method}' expects {expected} arguments, got {actual}")]
    ArgumentCount {
        method: String,
        expected: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DispatchError {
    #[error(transparent)]
    Caller(#[from] CallerError),

    /// The callee failed; frames are remote, separator, local
    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("Method '{method}' failed to complete in {} ms", .timeout.as_millis())]
    Timeout { method: String, timeout: Duration },

    #[error("No target member for method '{method}': {source}")]
    NoTarget {
        method: String,
        #[source]
        source: RouterError,
    },

    #[error("Method '{method}' still hit a stale route after {attempts} attempts")]
    RetriesExhausted { method: String, attempts: u32 },

    #[error("Service '{service}' has no method '{method}' taking {arity} arguments")]
    UnknownMethod {
        service: String,
        method: String,
        arity: usize,
    },

    #[error("Service '{service}' has several methods '{method}' taking {arity} arguments; call by signature")]
    AmbiguousMethod {
        service: String,
        method: String,
        arity: usize,
    },
}

impl DispatchError {
    /// The remote error, when the callee failed
    pub fn as_remote(&self) -> Option<&RemoteError> {
        match self {
            DispatchError::Remote(err) => Some(err),
            _ => None,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, DispatchError::Timeout { .. })
    }
}

pub type Result<T> = std::result::Result<T, DispatchError>;
