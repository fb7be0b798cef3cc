//! Meridian Client - proxies for services hosted in a Meridian cluster
//!
//! A service interface is declared once with [`ServiceInterface::builder`].
//! [`ProxyProvider::get_proxy`] analyzes the declaration into a routing table
//! and returns a [`ServiceProxy`]; calls through the proxy are dispatched to
//! the owner of the call's partition key, or to a member picked by the
//! method's routing policy.
//!
//! ```text
//! ServiceProxy::call
//!     │
//!     ▼
//! MethodRoute ──► Partitioned: resolve key ─┐
//!            └──► LoadBalanced: policy ─────┤
//!                                           ▼
//!                                 ExecutionSubstrate::submit
//!                                           │
//!             success / remote error / stale route / timeout
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! let provider = ProxyProvider::new(ClientConfig::from_env(), substrate, cluster)?
//!     .with_types(types);
//! let accounts = provider.get_proxy(&account_interface())?;
//! let balance = accounts.call("balance", vec![Value::from("acc-1")]).await?;
//! ```

mod analyzer;
mod config;
mod dispatcher;
mod error;
mod proxy;
mod resolver;
mod route;
mod schema;

pub use analyzer::InterfaceAnalyzer;
pub use config::{ClientConfig, RetryPolicy, DEFAULT_RETRY_BACKOFF, DEFAULT_SLICE_NAME, DEFAULT_TIMEOUT};
pub use dispatcher::{CallSite, Dispatcher};
pub use error::{CallerError, ConfigError, DispatchError, Result};
pub use proxy::{ProxyProvider, ServiceContract, ServiceProxy, EQUALS, HASH_CODE, TO_STRING};
pub use resolver::resolve_partition_key;
pub use route::{
    DispatchMode, KeyAccessor, MethodRoute, MethodSignature, PartitionKeySpec,
    ServiceInterfaceDescriptor,
};
pub use schema::{
    AccessorFn, LoadBalancedOptions, MethodAccessorDecl, MethodDecl, ParamDecl, PartitionKeyMarker,
    PartitionedOptions, ReturnKind, RoutingAnnotation, ServiceInterface, ServiceInterfaceBuilder,
    TypeDescriptor, TypeRegistry,
};

pub use meridian_types::Value;
