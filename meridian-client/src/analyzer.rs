//! Interface analyzer
//!
//! Turns a [`ServiceInterface`] declaration into a
//! [`ServiceInterfaceDescriptor`]. Every mistake in the declaration is
//! reported here, when the proxy is created, rather than on the first call.

use meridian_router::PolicyRegistry;
use meridian_types::ClusterView;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use crate::error::ConfigError;
use crate::route::{
    DispatchMode, KeyAccessor, MethodRoute, MethodSignature, PartitionKeySpec,
    ServiceInterfaceDescriptor,
};
use crate::schema::{
    MethodDecl, ParamDecl, ReturnKind, RoutingAnnotation, ServiceInterface, TypeDescriptor,
    TypeRegistry,
};

pub struct InterfaceAnalyzer {
    types: Arc<TypeRegistry>,
    policies: PolicyRegistry,
    cluster: Arc<dyn ClusterView>,
    default_timeout: Duration,
}

impl InterfaceAnalyzer {
    pub fn new(
        types: Arc<TypeRegistry>,
        policies: PolicyRegistry,
        cluster: Arc<dyn ClusterView>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            types,
            policies,
            cluster,
            default_timeout,
        }
    }

    /// Build the routing table of `interface` and everything it extends.
    ///
    /// Has no side effects besides constructing one routing policy per
    /// load-balanced method; analyzing the same interface twice yields
    /// equivalent descriptors.
    pub fn analyze(
        &self,
        interface: &ServiceInterface,
    ) -> Result<ServiceInterfaceDescriptor, ConfigError> {
        if interface.name().is_empty() {
            return Err(ConfigError::EmptyInterfaceName);
        }

        let hierarchy = collect_hierarchy(interface)?;

        let mut routes = HashMap::new();
        let mut declared_by: HashMap<MethodSignature, String> = HashMap::new();

        for iface in &hierarchy {
            for method in iface.methods() {
                if method.name.is_empty() {
                    return Err(ConfigError::EmptyMethodName {
                        interface: iface.name().to_string(),
                    });
                }

                let signature = MethodSignature::new(method.name.clone(), method.param_types());
                if let Some(first) = declared_by.get(&signature) {
                    return Err(ConfigError::AmbiguousMethod {
                        method: signature.to_string(),
                        first: first.clone(),
                        second: iface.name().to_string(),
                    });
                }

                let route = self.analyze_method(iface, method, signature.clone())?;
                debug!(
                    interface = %interface.name(),
                    method = %signature,
                    partitioned = route.is_partitioned(),
                    timeout_ms = route.timeout.as_millis() as u64,
                    "Method route analyzed"
                );

                declared_by.insert(signature.clone(), iface.name().to_string());
                routes.insert(signature, Arc::new(route));
            }
        }

        info!(
            interface = %interface.name(),
            ancestors = hierarchy.len() - 1,
            routes = routes.len(),
            "Service interface analyzed"
        );

        Ok(ServiceInterfaceDescriptor {
            name: interface.name().to_string(),
            service_name: interface.simple_name().to_string(),
            routes,
        })
    }

    fn analyze_method(
        &self,
        iface: &ServiceInterface,
        method: &MethodDecl,
        signature: MethodSignature,
    ) -> Result<MethodRoute, ConfigError> {
        let qualified = format!("{}.{}", iface.simple_name(), signature);

        let annotation = match method.annotations.as_slice() {
            [single] => single,
            [] => {
                return Err(ConfigError::MissingRoutingAnnotation { method: qualified });
            }
            many => {
                return Err(ConfigError::ConflictingRoutingAnnotations {
                    method: qualified,
                    count: many.len(),
                });
            }
        };

        match annotation {
            RoutingAnnotation::LoadBalanced(options) => {
                let policy = self
                    .policies
                    .build(&options.policy, self.cluster.clone())
                    .map_err(|source| ConfigError::Policy {
                        method: qualified.clone(),
                        policy: options.policy.clone(),
                        source,
                    })?;

                Ok(MethodRoute {
                    signature,
                    mode: DispatchMode::LoadBalanced(policy),
                    timeout: options.timeout.unwrap_or(self.default_timeout),
                    interrupt_on_timeout: options.interrupt_on_timeout,
                })
            }
            RoutingAnnotation::Partitioned(options) => {
                let key = self.partition_key_spec(method, &qualified)?;

                Ok(MethodRoute {
                    signature,
                    mode: DispatchMode::Partitioned(key),
                    timeout: options.timeout.unwrap_or(self.default_timeout),
                    interrupt_on_timeout: options.interrupt_on_timeout,
                })
            }
        }
    }

    fn partition_key_spec(
        &self,
        method: &MethodDecl,
        qualified: &str,
    ) -> Result<PartitionKeySpec, ConfigError> {
        if method.params.is_empty() {
            return Err(ConfigError::NoParameters {
                method: qualified.to_string(),
            });
        }

        let marked: Vec<(usize, &ParamDecl)> = method
            .params
            .iter()
            .enumerate()
            .filter(|(_, p)| p.partition_key.is_some())
            .collect();

        let (index, param) = match marked.as_slice() {
            [single] => *single,
            [] => {
                return Err(ConfigError::MissingPartitionKey {
                    method: qualified.to_string(),
                });
            }
            many => {
                return Err(ConfigError::MultiplePartitionKeys {
                    method: qualified.to_string(),
                    count: many.len(),
                });
            }
        };

        let descriptor = self.types.get(&param.type_name);
        let property = param
            .partition_key
            .as_ref()
            .and_then(|marker| marker.property.as_deref());

        let accessor = match property {
            Some(property) => Some(resolve_accessor(
                descriptor.map(|d| &**d),
                property,
                qualified,
                index,
                &param.type_name,
            )?),
            None => None,
        };

        Ok(PartitionKeySpec {
            index,
            accessor,
            type_name: param.type_name.clone(),
            self_key: descriptor.and_then(|d| d.self_key().cloned()),
        })
    }
}

/// The interface followed by every interface it transitively extends,
/// breadth first, each once.
fn collect_hierarchy(root: &ServiceInterface) -> Result<Vec<&ServiceInterface>, ConfigError> {
    let mut seen = HashSet::new();
    let mut ordered = Vec::new();
    let mut queue = VecDeque::from([root]);

    while let Some(iface) = queue.pop_front() {
        if !seen.insert(iface.name()) {
            continue;
        }
        if !iface.is_remotely_exposable() {
            return Err(ConfigError::NotRemotelyExposable {
                interface: iface.name().to_string(),
            });
        }
        ordered.push(iface);
        queue.extend(iface.extends().iter().map(|parent| parent.as_ref()));
    }

    Ok(ordered)
}

/// Probe `property`, `get<Property>`, `is<Property>`, then the field `property`.
fn resolve_accessor(
    descriptor: Option<&TypeDescriptor>,
    property: &str,
    method: &str,
    index: usize,
    type_name: &str,
) -> Result<KeyAccessor, ConfigError> {
    let unresolved = || ConfigError::UnresolvedProperty {
        method: method.to_string(),
        index,
        type_name: type_name.to_string(),
        property: property.to_string(),
    };

    let descriptor = descriptor.ok_or_else(unresolved)?;

    let capitalized = capitalize(property);
    let candidates = [
        property.to_string(),
        format!("get{}", capitalized),
        format!("is{}", capitalized),
    ];

    for candidate in &candidates {
        if let Some(found) = descriptor.find_method(candidate) {
            if found.returns == ReturnKind::Void {
                return Err(ConfigError::VoidAccessor {
                    method: method.to_string(),
                    index,
                    type_name: type_name.to_string(),
                    accessor: found.name.clone(),
                });
            }
            return Ok(KeyAccessor::Method {
                name: found.name.clone(),
                call: found.call.clone(),
            });
        }
    }

    if descriptor.has_field(property) {
        return Ok(KeyAccessor::Field {
            name: property.to_string(),
        });
    }

    Err(unresolved())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{LoadBalancedOptions, ParamDecl, PartitionedOptions};
    use meridian_router::{MemberRegistry, RouterError, RANDOM};
    use serde_json::Value;

    fn analyzer_with(types: TypeRegistry) -> InterfaceAnalyzer {
        InterfaceAnalyzer::new(
            Arc::new(types),
            PolicyRegistry::with_builtins(),
            Arc::new(MemberRegistry::new()),
            Duration::from_secs(60),
        )
    }

    fn analyzer() -> InterfaceAnalyzer {
        analyzer_with(account_types())
    }

    fn account_types() -> TypeRegistry {
        TypeRegistry::new()
            .with(
                TypeDescriptor::new("Account")
                    .method("getId", |v: &Value| Ok(v["id"].clone()))
                    .method("isFrozen", |v: &Value| Ok(v["frozen"].clone()))
                    .void_method("touch", |_: &Value| Ok(Value::Null))
                    .field("owner"),
            )
            .with(TypeDescriptor::new("Order").field("region"))
    }

    fn keyed(method: &str, param: ParamDecl) -> MethodDecl {
        MethodDecl::new(method)
            .param(param)
            .partitioned(PartitionedOptions::default())
    }

    #[test]
    fn test_partitioned_and_load_balanced_routes() {
        let iface = ServiceInterface::builder("bank::AccountService")
            .remotely_exposable()
            .method(
                keyed("deposit", ParamDecl::new("account", "Account").partition_key_property("id"))
                    .param(ParamDecl::new("amount", "i64")),
            )
            .method(
                MethodDecl::new("audit")
                    .load_balanced(LoadBalancedOptions::default().timeout(Duration::from_secs(5))),
            )
            .build();

        let descriptor = analyzer().analyze(&iface).unwrap();
        assert_eq!(descriptor.name, "bank::AccountService");
        assert_eq!(descriptor.service_name, "AccountService");
        assert_eq!(descriptor.len(), 2);

        let deposit = descriptor.find("deposit", 2)[0];
        assert_eq!(deposit.timeout, Duration::from_secs(60));
        match &deposit.mode {
            DispatchMode::Partitioned(spec) => {
                assert_eq!(spec.index, 0);
                assert_eq!(spec.accessor.as_ref().unwrap().name(), "getId");
                assert!(spec.self_key.is_none());
            }
            other => panic!("unexpected mode {:?}", other),
        }

        let audit = descriptor.find("audit", 0)[0];
        assert_eq!(audit.timeout, Duration::from_secs(5));
        assert!(!audit.is_partitioned());
    }

    #[test]
    fn test_missing_marker_on_ancestor() {
        let base = ServiceInterface::builder("bank::Base").build();
        let iface = ServiceInterface::builder("bank::AccountService")
            .remotely_exposable()
            .extends(base)
            .build();

        let err = analyzer().analyze(&iface).unwrap_err();
        assert_eq!(
            err,
            ConfigError::NotRemotelyExposable {
                interface: "bank::Base".to_string()
            }
        );
    }

    #[test]
    fn test_inherited_methods_are_routed() {
        let base = ServiceInterface::builder("bank::Auditable")
            .remotely_exposable()
            .method(MethodDecl::new("audit").load_balanced(LoadBalancedOptions::default()))
            .build();
        let iface = ServiceInterface::builder("bank::AccountService")
            .remotely_exposable()
            .extends(base.clone())
            .extends(base)
            .method(keyed("balance", ParamDecl::new("id", "String").partition_key()))
            .build();

        let descriptor = analyzer().analyze(&iface).unwrap();
        assert_eq!(descriptor.len(), 2);
        assert_eq!(descriptor.find("audit", 0).len(), 1);
    }

    #[test]
    fn test_same_signature_in_two_interfaces_is_ambiguous() {
        let left = ServiceInterface::builder("bank::Left")
            .remotely_exposable()
            .method(MethodDecl::new("ping").load_balanced(LoadBalancedOptions::default()))
            .build();
        let right = ServiceInterface::builder("bank::Right")
            .remotely_exposable()
            .method(MethodDecl::new("ping").load_balanced(LoadBalancedOptions::default()))
            .build();
        let iface = ServiceInterface::builder("bank::Both")
            .remotely_exposable()
            .extends(left)
            .extends(right)
            .build();

        let err = analyzer().analyze(&iface).unwrap_err();
        assert!(matches!(err, ConfigError::AmbiguousMethod { .. }));
    }

    #[test]
    fn test_routing_annotation_count() {
        let none = ServiceInterface::builder("S")
            .remotely_exposable()
            .method(MethodDecl::new("m"))
            .build();
        assert!(matches!(
            analyzer().analyze(&none).unwrap_err(),
            ConfigError::MissingRoutingAnnotation { .. }
        ));

        let both = ServiceInterface::builder("S")
            .remotely_exposable()
            .method(
                MethodDecl::new("m")
                    .param(ParamDecl::new("id", "String").partition_key())
                    .partitioned(PartitionedOptions::default())
                    .load_balanced(LoadBalancedOptions::default()),
            )
            .build();
        assert_eq!(
            analyzer().analyze(&both).unwrap_err(),
            ConfigError::ConflictingRoutingAnnotations {
                method: "S.m(String)".to_string(),
                count: 2
            }
        );
    }

    #[test]
    fn test_partition_key_marker_count() {
        let no_params = ServiceInterface::builder("S")
            .remotely_exposable()
            .method(MethodDecl::new("m").partitioned(PartitionedOptions::default()))
            .build();
        assert!(matches!(
            analyzer().analyze(&no_params).unwrap_err(),
            ConfigError::NoParameters { .. }
        ));

        let unmarked = ServiceInterface::builder("S")
            .remotely_exposable()
            .method(keyed("m", ParamDecl::new("id", "String")))
            .build();
        assert!(matches!(
            analyzer().analyze(&unmarked).unwrap_err(),
            ConfigError::MissingPartitionKey { .. }
        ));

        let twice = ServiceInterface::builder("S")
            .remotely_exposable()
            .method(
                keyed("m", ParamDecl::new("a", "String").partition_key())
                    .param(ParamDecl::new("b", "String").partition_key()),
            )
            .build();
        assert!(matches!(
            analyzer().analyze(&twice).unwrap_err(),
            ConfigError::MultiplePartitionKeys { count: 2, .. }
        ));
    }

    /// Accessor resolved for `property` of a `type_name` key argument
    fn key_accessor(
        analyzer: &InterfaceAnalyzer,
        property: &str,
        type_name: &str,
    ) -> Result<KeyAccessor, ConfigError> {
        let iface = ServiceInterface::builder("S")
            .remotely_exposable()
            .method(keyed(
                "m",
                ParamDecl::new("arg", type_name).partition_key_property(property),
            ))
            .build();
        analyzer.analyze(&iface).map(|d| match &d.find("m", 1)[0].mode {
            DispatchMode::Partitioned(spec) => spec.accessor.clone().unwrap(),
            DispatchMode::LoadBalanced(_) => unreachable!(),
        })
    }

    #[test]
    fn test_property_probing_order() {
        let analyzer = analyzer();
        let resolve = |property: &str, type_name: &str| key_accessor(&analyzer, property, type_name);

        assert_eq!(resolve("id", "Account").unwrap().name(), "getId");
        assert_eq!(resolve("frozen", "Account").unwrap().name(), "isFrozen");
        assert!(matches!(
            resolve("owner", "Account").unwrap(),
            KeyAccessor::Field { .. }
        ));
        assert!(matches!(
            resolve("region", "Order").unwrap(),
            KeyAccessor::Field { .. }
        ));

        assert_eq!(
            resolve("missing", "Account").unwrap_err(),
            ConfigError::UnresolvedProperty {
                method: "S.m(Account)".to_string(),
                index: 0,
                type_name: "Account".to_string(),
                property: "missing".to_string(),
            }
        );
        assert!(matches!(
            resolve("touch", "Account").unwrap_err(),
            ConfigError::VoidAccessor { .. }
        ));
        assert!(matches!(
            resolve("id", "Unregistered").unwrap_err(),
            ConfigError::UnresolvedProperty { .. }
        ));
    }

    #[test]
    fn test_first_matching_accessor_wins() {
        // Declared in reverse probing order
        let analyzer = analyzer_with(TypeRegistry::new().with(
            TypeDescriptor::new("Ledger")
                .field("id")
                .method("isId", |v: &Value| Ok(v["flag"].clone()))
                .method("getId", |v: &Value| Ok(v["code"].clone()))
                .method("id", |v: &Value| Ok(v["id"].clone()))
                .method("isFrozen", |v: &Value| Ok(v["frozen"].clone()))
                .method("getFrozen", |v: &Value| Ok(v["state"].clone()))
                .field("region")
                .method("getRegion", |v: &Value| Ok(v["region"].clone()))
                .method("isOpen", |v: &Value| Ok(v["open"].clone()))
                .field("open"),
        ));

        assert_eq!(key_accessor(&analyzer, "id", "Ledger").unwrap().name(), "id");
        assert_eq!(
            key_accessor(&analyzer, "frozen", "Ledger").unwrap().name(),
            "getFrozen"
        );

        let region = key_accessor(&analyzer, "region", "Ledger").unwrap();
        assert!(matches!(region, KeyAccessor::Method { .. }));
        assert_eq!(region.name(), "getRegion");

        let open = key_accessor(&analyzer, "open", "Ledger").unwrap();
        assert!(matches!(open, KeyAccessor::Method { .. }));
        assert_eq!(open.name(), "isOpen");
    }

    #[test]
    fn test_unknown_policy_is_a_configuration_error() {
        let iface = ServiceInterface::builder("S")
            .remotely_exposable()
            .method(MethodDecl::new("m").load_balanced(LoadBalancedOptions::default().policy("sticky")))
            .build();

        let err = analyzer().analyze(&iface).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Policy {
                method: "S.m()".to_string(),
                policy: "sticky".to_string(),
                source: RouterError::UnknownPolicy("sticky".to_string()),
            }
        );
    }

    #[test]
    fn test_failing_policy_factory() {
        let mut policies = PolicyRegistry::with_builtins();
        policies.register("broken", |_| {
            Err(RouterError::Construction {
                policy: "broken".to_string(),
                reason: "no seed".to_string(),
            })
        });
        let analyzer = InterfaceAnalyzer::new(
            Arc::new(TypeRegistry::new()),
            policies,
            Arc::new(MemberRegistry::new()),
            Duration::from_secs(60),
        );

        let iface = ServiceInterface::builder("S")
            .remotely_exposable()
            .method(MethodDecl::new("m").load_balanced(LoadBalancedOptions::default().policy("broken")))
            .method(MethodDecl::new("r").load_balanced(LoadBalancedOptions::default().policy(RANDOM)))
            .build();

        assert!(matches!(
            analyzer.analyze(&iface).unwrap_err(),
            ConfigError::Policy { .. }
        ));
    }

    #[test]
    fn test_empty_names() {
        let iface = ServiceInterface::builder("").remotely_exposable().build();
        assert_eq!(
            analyzer().analyze(&iface).unwrap_err(),
            ConfigError::EmptyInterfaceName
        );

        let iface = ServiceInterface::builder("S")
            .remotely_exposable()
            .method(MethodDecl::new("").load_balanced(LoadBalancedOptions::default()))
            .build();
        assert!(matches!(
            analyzer().analyze(&iface).unwrap_err(),
            ConfigError::EmptyMethodName { .. }
        ));
    }
}
