//! Service proxies and the proxy cache
//!
//! A [`ServiceProxy`] stands in for a remote service. Every call is looked up
//! in the analyzed routing table and handed to the [`Dispatcher`]. Unless the
//! interface declares them, `to_string`, `hash_code` and `equals` are answered
//! by the proxy itself from its instance identity.
//!
//! [`ProxyProvider`] analyzes each interface once and hands out the same
//! proxy instance afterwards.

use meridian_router::PolicyRegistry;
use meridian_types::{ClusterView, ExecutionSubstrate, Value};
use parking_lot::RwLock;
use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use crate::analyzer::InterfaceAnalyzer;
use crate::config::ClientConfig;
use crate::dispatcher::{CallSite, Dispatcher};
use crate::error::{ConfigError, DispatchError, Result};
use crate::route::{MethodRoute, MethodSignature, ServiceInterfaceDescriptor};
use crate::schema::{ServiceInterface, TypeRegistry};

pub const TO_STRING: &str = "to_string";
pub const HASH_CODE: &str = "hash_code";
pub const EQUALS: &str = "equals";

static NEXT_PROXY_ID: AtomicU64 = AtomicU64::new(1);

/// Client-side stand-in for a remote service
pub struct ServiceProxy {
    id: u64,
    interface: Arc<ServiceInterface>,
    descriptor: ServiceInterfaceDescriptor,
    dispatcher: Arc<Dispatcher>,
}

impl ServiceProxy {
    pub fn new(
        interface: Arc<ServiceInterface>,
        descriptor: ServiceInterfaceDescriptor,
        dispatcher: Arc<Dispatcher>,
    ) -> Self {
        Self {
            id: NEXT_PROXY_ID.fetch_add(1, Ordering::Relaxed),
            interface,
            descriptor,
            dispatcher,
        }
    }

    /// Process-unique identity of this proxy instance
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn interface(&self) -> &Arc<ServiceInterface> {
        &self.interface
    }

    pub fn descriptor(&self) -> &ServiceInterfaceDescriptor {
        &self.descriptor
    }

    pub fn service_name(&self) -> &str {
        &self.descriptor.service_name
    }

    /// Call `method` with `args`, picking the overload by name and arity.
    ///
    /// Declared methods win over the local object methods of the same name.
    #[track_caller]
    pub fn call(
        &self,
        method: &str,
        args: Vec<Value>,
    ) -> impl Future<Output = Result<Value>> + Send + '_ {
        let site = CallSite::capture();
        let method = method.to_string();
        async move {
            let route = match self.lookup(&method, args.len()) {
                Ok(route) => route,
                Err(err @ DispatchError::UnknownMethod { .. }) => {
                    return self.object_method(&method, &args).ok_or(err);
                }
                Err(err) => return Err(err),
            };
            self.dispatcher
                .invoke(&self.descriptor.service_name, &route, args, site)
                .await
        }
    }

    /// Call the method with exactly `signature`.
    #[track_caller]
    pub fn call_signature(
        &self,
        signature: &MethodSignature,
        args: Vec<Value>,
    ) -> impl Future<Output = Result<Value>> + Send + '_ {
        let site = CallSite::capture();
        let route = self.descriptor.route(signature).cloned();
        let signature = signature.clone();
        async move {
            let route = route.ok_or_else(|| DispatchError::UnknownMethod {
                service: self.descriptor.service_name.clone(),
                method: signature.to_string(),
                arity: signature.arity(),
            })?;
            self.dispatcher
                .invoke(&self.descriptor.service_name, &route, args, site)
                .await
        }
    }

    fn lookup(&self, method: &str, arity: usize) -> Result<Arc<MethodRoute>> {
        match self.descriptor.find(method, arity).as_slice() {
            [route] => Ok(Arc::clone(route)),
            [] => Err(DispatchError::UnknownMethod {
                service: self.descriptor.service_name.clone(),
                method: method.to_string(),
                arity,
            }),
            _ => Err(DispatchError::AmbiguousMethod {
                service: self.descriptor.service_name.clone(),
                method: method.to_string(),
                arity,
            }),
        }
    }

    /// Methods every object answers, never sent to the cluster
    fn object_method(&self, method: &str, args: &[Value]) -> Option<Value> {
        match (method, args) {
            (TO_STRING, []) => Some(Value::String(self.to_string())),
            (HASH_CODE, []) => Some(Value::from(self.hash_code())),
            (EQUALS, [other]) => Some(Value::Bool(
                other.as_str() == Some(self.to_string().as_str()),
            )),
            _ => None,
        }
    }

    /// Identity hash, distinct for distinct proxy instances
    pub fn hash_code(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.id.hash(&mut hasher);
        hasher.finish()
    }
}

impl fmt::Display for ServiceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "ServiceProxy[{}@{}#{}]",
            self.interface.name(),
            self.dispatcher.slice_name(),
            self.id
        )
    }
}

impl fmt::Debug for ServiceProxy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServiceProxy")
            .field("id", &self.id)
            .field("interface", &self.interface.name())
            .field("slice", &self.dispatcher.slice_name())
            .field("routes", &self.descriptor.len())
            .finish()
    }
}

/// Two handles are equal when they point at the same proxy
impl PartialEq for ServiceProxy {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(self, other)
    }
}

impl Eq for ServiceProxy {}

impl Hash for ServiceProxy {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::ptr::hash(self, state);
    }
}

fn same_declaration(proxy: &ServiceProxy, interface: &Arc<ServiceInterface>) -> bool {
    Arc::ptr_eq(proxy.interface(), interface) || proxy.interface() == interface
}

/// Typed facade over a cached proxy.
///
/// ```rust,ignore
/// struct AccountClient(Arc<ServiceProxy>);
///
/// impl ServiceContract for AccountClient {
///     fn interface() -> Arc<ServiceInterface> { account_interface() }
///     fn from_proxy(proxy: Arc<ServiceProxy>) -> Self { Self(proxy) }
/// }
///
/// impl AccountClient {
///     #[track_caller]
///     pub fn balance(&self, id: &str) -> impl Future<Output = Result<Value>> + '_ {
///         self.0.call("balance", vec![Value::from(id)])
///     }
/// }
/// ```
pub trait ServiceContract: Sized {
    fn interface() -> Arc<ServiceInterface>;

    fn from_proxy(proxy: Arc<ServiceProxy>) -> Self;
}

/// Creates and caches one proxy per service interface
pub struct ProxyProvider {
    config: ClientConfig,
    dispatcher: Arc<Dispatcher>,
    cluster: Arc<dyn ClusterView>,
    types: Arc<TypeRegistry>,
    policies: PolicyRegistry,
    proxies: RwLock<HashMap<String, Arc<ServiceProxy>>>,
}

impl ProxyProvider {
    pub fn new(
        config: ClientConfig,
        substrate: Arc<dyn ExecutionSubstrate>,
        cluster: Arc<dyn ClusterView>,
    ) -> std::result::Result<Self, ConfigError> {
        config
            .validate()
            .map_err(|err| ConfigError::InvalidClientConfig(err.to_string()))?;

        let dispatcher = Arc::new(Dispatcher::new(
            substrate,
            config.slice_name.clone(),
            config.retry,
        ));
        Ok(Self {
            config,
            dispatcher,
            cluster,
            types: Arc::new(TypeRegistry::new()),
            policies: PolicyRegistry::with_builtins(),
            proxies: RwLock::new(HashMap::new()),
        })
    }

    /// Argument types probed for partition-key properties
    pub fn with_types(mut self, types: TypeRegistry) -> Self {
        self.types = Arc::new(types);
        self
    }

    /// Routing policies available to load-balanced methods
    pub fn with_policies(mut self, policies: PolicyRegistry) -> Self {
        self.policies = policies;
        self
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Proxy for `interface`, analyzing it on first use.
    ///
    /// Concurrent first requests may each analyze the interface; only the
    /// first proxy stored is ever handed out. A different declaration under
    /// an already proxied name is analyzed and then rejected.
    pub fn get_proxy(
        &self,
        interface: &Arc<ServiceInterface>,
    ) -> std::result::Result<Arc<ServiceProxy>, ConfigError> {
        if let Some(proxy) = self.proxies.read().get(interface.name()) {
            if same_declaration(proxy, interface) {
                return Ok(proxy.clone());
            }
        }

        let analyzer = InterfaceAnalyzer::new(
            self.types.clone(),
            self.policies.clone(),
            self.cluster.clone(),
            self.config.default_timeout,
        );
        let descriptor = analyzer.analyze(interface)?;
        let proxy = Arc::new(ServiceProxy::new(
            interface.clone(),
            descriptor,
            self.dispatcher.clone(),
        ));

        let mut proxies = self.proxies.write();
        let cached = proxies
            .entry(interface.name().to_string())
            .or_insert_with(|| {
                debug!(interface = %interface.name(), "Proxy created");
                proxy
            });
        if !same_declaration(cached, interface) {
            return Err(ConfigError::ConflictingDeclaration {
                interface: interface.name().to_string(),
            });
        }
        Ok(cached.clone())
    }

    /// Typed facade for `C`
    pub fn get<C: ServiceContract>(&self) -> std::result::Result<C, ConfigError> {
        self.get_proxy(&C::interface()).map(C::from_proxy)
    }

    /// Number of cached proxies
    pub fn cached(&self) -> usize {
        self.proxies.read().len()
    }
}
