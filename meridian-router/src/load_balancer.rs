//! Built-in load-balancing policies

use meridian_types::{CallDescriptor, ClusterView, Member};
use rand::Rng;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

use crate::error::{Result, RouterError};
use crate::policy::{RoutingPolicy, RANDOM, ROUND_ROBIN};

/// Round-robin over the alive, non-lite members.
///
/// The cursor is a single atomic counter, so concurrent callers never observe
/// the same slot twice within one rotation of an unchanged membership.
pub struct RoundRobinPolicy {
    cluster: Arc<dyn ClusterView>,
    round_robin_counter: AtomicUsize,
}

impl RoundRobinPolicy {
    pub fn new(cluster: Arc<dyn ClusterView>) -> Self {
        Self {
            cluster,
            round_robin_counter: AtomicUsize::new(0),
        }
    }
}

impl RoutingPolicy for RoundRobinPolicy {
    fn name(&self) -> &str {
        ROUND_ROBIN
    }

    fn next_member(&self, call: &CallDescriptor) -> Result<Member> {
        let members = self.cluster.alive_non_lite_members();

        if members.is_empty() {
            return Err(RouterError::NoMembersAvailable(ROUND_ROBIN.to_string()));
        }

        let index = self.round_robin_counter.fetch_add(1, Ordering::Relaxed) % members.len();
        trace!(
            method = %call.qualified_method(),
            member_id = %members[index].id,
            "Round-robin selected member"
        );
        Ok(members[index].clone())
    }
}

/// Uniform random choice among the alive, non-lite members
pub struct RandomPolicy {
    cluster: Arc<dyn ClusterView>,
}

impl RandomPolicy {
    pub fn new(cluster: Arc<dyn ClusterView>) -> Self {
        Self { cluster }
    }
}

impl RoutingPolicy for RandomPolicy {
    fn name(&self) -> &str {
        RANDOM
    }

    fn next_member(&self, _call: &CallDescriptor) -> Result<Member> {
        let members = self.cluster.alive_non_lite_members();

        if members.is_empty() {
            return Err(RouterError::NoMembersAvailable(RANDOM.to_string()));
        }

        let mut rng = rand::thread_rng();
        let index = rng.gen_range(0..members.len());
        Ok(members[index].clone())
    }
}
