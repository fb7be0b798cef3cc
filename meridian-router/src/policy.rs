//! Routing policy trait and registry

use meridian_types::{CallDescriptor, ClusterView, Member};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::{Result, RouterError};
use crate::load_balancer::{RandomPolicy, RoundRobinPolicy};

/// Name of the built-in round-robin policy
pub const ROUND_ROBIN: &str = "round-robin";

/// Name of the built-in random policy
pub const RANDOM: &str = "random";

/// Picks the member a load-balanced call goes to.
///
/// One instance is built per method and shared by every call through every
/// proxy of that interface, possibly from many tasks at once. Implementations
/// must be safe for concurrent use; keep mutable state in atomics.
pub trait RoutingPolicy: Send + Sync {
    /// Name the policy was registered under
    fn name(&self) -> &str;

    /// Choose the target member for `call`.
    ///
    /// Must be re-evaluated on every attempt: a member chosen for a previous
    /// attempt may have left the cluster.
    fn next_member(&self, call: &CallDescriptor) -> Result<Member>;
}

impl fmt::Debug for dyn RoutingPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RoutingPolicy({})", self.name())
    }
}

/// Builds a policy from the cluster-access handle
pub type PolicyFactory =
    Arc<dyn Fn(Arc<dyn ClusterView>) -> Result<Arc<dyn RoutingPolicy>> + Send + Sync>;

/// Named policy factories
#[derive(Clone)]
pub struct PolicyRegistry {
    factories: HashMap<String, PolicyFactory>,
}

impl PolicyRegistry {
    /// Registry without any policy
    pub fn empty() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Registry with the built-in `round-robin` and `random` policies
    pub fn with_builtins() -> Self {
        let mut registry = Self::empty();
        registry.register(ROUND_ROBIN, |cluster| {
            Ok(Arc::new(RoundRobinPolicy::new(cluster)) as Arc<dyn RoutingPolicy>)
        });
        registry.register(RANDOM, |cluster| {
            Ok(Arc::new(RandomPolicy::new(cluster)) as Arc<dyn RoutingPolicy>)
        });
        registry
    }

    /// Register (or replace) a factory under `name`
    pub fn register<F>(&mut self, name: impl Into<String>, factory: F)
    where
        F: Fn(Arc<dyn ClusterView>) -> Result<Arc<dyn RoutingPolicy>> + Send + Sync + 'static,
    {
        self.factories.insert(name.into(), Arc::new(factory));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.keys().cloned().collect();
        names.sort();
        names
    }

    /// Construct a fresh policy instance
    pub fn build(&self, name: &str, cluster: Arc<dyn ClusterView>) -> Result<Arc<dyn RoutingPolicy>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| RouterError::UnknownPolicy(name.to_string()))?;
        factory(cluster)
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl fmt::Debug for PolicyRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyRegistry")
            .field("policies", &self.names())
            .finish()
    }
}
