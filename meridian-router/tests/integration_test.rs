//! Integration tests for routing policies

use meridian_router::{MemberRegistry, MemberStatus, PolicyRegistry, RoutingPolicy, ROUND_ROBIN};
use meridian_types::{CallDescriptor, ClusterView, Member, MemberId};
use std::collections::HashMap;
use std::sync::Arc;

fn create_test_call(method: &str) -> CallDescriptor {
    CallDescriptor::new(
        "default",
        "InventoryService",
        method,
        vec!["String".to_string()],
        vec![serde_json::json!("sku-1")],
    )
}

fn create_cluster(size: usize) -> Arc<MemberRegistry> {
    let registry = Arc::new(MemberRegistry::new());
    for i in 1..=size {
        registry.register(Member::new(format!("member-{}", i), format!("10.0.0.{}:5701", i)));
    }
    registry
}

#[tokio::test]
async fn test_shared_round_robin_is_fair_under_concurrency() {
    let cluster = create_cluster(3);
    let policy = PolicyRegistry::with_builtins()
        .build(ROUND_ROBIN, cluster.clone() as Arc<dyn ClusterView>)
        .unwrap();

    // 8 tasks x 30 calls through one shared policy instance
    let mut handles = Vec::new();
    for _ in 0..8 {
        let policy = policy.clone();
        handles.push(tokio::spawn(async move {
            let mut picks = Vec::new();
            for _ in 0..30 {
                picks.push(policy.next_member(&create_test_call("reserve")).unwrap().id);
            }
            picks
        }));
    }

    let mut counts: HashMap<MemberId, usize> = HashMap::new();
    for handle in handles {
        for id in handle.await.unwrap() {
            *counts.entry(id).or_default() += 1;
        }
    }

    // 240 picks over 3 members with an atomic cursor: exactly 80 each
    assert_eq!(counts.len(), 3);
    for count in counts.values() {
        assert_eq!(*count, 80);
    }
}

#[tokio::test]
async fn test_round_robin_follows_membership_changes() {
    let cluster = create_cluster(3);
    let policy = PolicyRegistry::with_builtins()
        .build(ROUND_ROBIN, cluster.clone() as Arc<dyn ClusterView>)
        .unwrap();

    cluster.update_status(&MemberId::new("member-2"), MemberStatus::Degraded);
    cluster.unregister(&MemberId::new("member-3"));

    for _ in 0..5 {
        let picked = policy.next_member(&create_test_call("reserve")).unwrap();
        assert_eq!(picked.id.as_str(), "member-1");
    }
}

struct StickyPolicy {
    cluster: Arc<dyn ClusterView>,
}

impl RoutingPolicy for StickyPolicy {
    fn name(&self) -> &str {
        "sticky"
    }

    // Content-based: route by the first argument
    fn next_member(&self, call: &CallDescriptor) -> meridian_router::Result<Member> {
        let members = self.cluster.alive_non_lite_members();
        if members.is_empty() {
            return Err(meridian_router::RouterError::NoMembersAvailable("sticky".to_string()));
        }
        let seed = call.args.first().map(|a| a.to_string().len()).unwrap_or(0);
        Ok(members[seed % members.len()].clone())
    }
}

#[tokio::test]
async fn test_custom_policy_registration() {
    let cluster = create_cluster(2);
    let mut registry = PolicyRegistry::with_builtins();
    registry.register("sticky", |cluster| {
        Ok(Arc::new(StickyPolicy { cluster }) as Arc<dyn RoutingPolicy>)
    });

    let policy = registry
        .build("sticky", cluster as Arc<dyn ClusterView>)
        .unwrap();

    let first = policy.next_member(&create_test_call("reserve")).unwrap();
    let second = policy.next_member(&create_test_call("reserve")).unwrap();
    assert_eq!(first, second);
    assert_eq!(policy.name(), "sticky");
}
