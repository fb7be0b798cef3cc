//! Collaborator contracts
//!
//! The dispatcher never executes remote logic itself. It hands a
//! [`CallDescriptor`] to an [`ExecutionSubstrate`] and observes completion
//! through the returned [`PendingCall`]. Load-balancing policies read the
//! cluster through a [`ClusterView`].

use futures::future::BoxFuture;
use serde_json::Value;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use thiserror::Error;

use crate::call::CallDescriptor;
use crate::member::{Member, MemberId};
use crate::partition::PartitionId;
use crate::remote::RemoteError;

/// Errors reported by the execution substrate.
///
/// `PartitionMoved` and `MemberLeft` mean the routing decision went stale
/// between resolution and execution; the call can be re-routed and retried.
/// Everything else came out of the callee.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubstrateError {
    #[error("partition {partition} is no longer owned by member {member}")]
    PartitionMoved {
        partition: PartitionId,
        member: MemberId,
    },

    #[error("member {0} left the cluster")]
    MemberLeft(MemberId),

    #[error(transparent)]
    Remote(#[from] RemoteError),
}

impl SubstrateError {
    /// Whether the call should be re-routed and resubmitted
    pub fn is_routing_stale(&self) -> bool {
        matches!(
            self,
            SubstrateError::PartitionMoved { .. } | SubstrateError::MemberLeft(_)
        )
    }
}

/// Outcome of one submitted call
pub type CallResult = Result<Value, SubstrateError>;

/// A submitted call: a future for its result plus an optional cancel hook.
pub struct PendingCall {
    result: BoxFuture<'static, CallResult>,
    canceller: Option<Box<dyn FnOnce() + Send>>,
}

impl PendingCall {
    pub fn new<F>(result: F) -> Self
    where
        F: Future<Output = CallResult> + Send + 'static,
    {
        Self {
            result: Box::pin(result),
            canceller: None,
        }
    }

    /// An already completed call
    pub fn ready(result: CallResult) -> Self {
        Self::new(futures::future::ready(result))
    }

    /// Attach the hook that interrupts the remote execution
    pub fn with_canceller<C>(mut self, canceller: C) -> Self
    where
        C: FnOnce() + Send + 'static,
    {
        self.canceller = Some(Box::new(canceller));
        self
    }

    pub fn is_cancellable(&self) -> bool {
        self.canceller.is_some()
    }

    /// Interrupt the remote execution. Best effort; the hook runs at most once.
    ///
    /// Returns `false` when there was nothing (left) to cancel.
    pub fn cancel(&mut self) -> bool {
        match self.canceller.take() {
            Some(canceller) => {
                canceller();
                true
            }
            None => false,
        }
    }
}

impl Future for PendingCall {
    type Output = CallResult;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.get_mut().result.as_mut().poll(cx)
    }
}

impl fmt::Debug for PendingCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingCall")
            .field("cancellable", &self.is_cancellable())
            .finish()
    }
}

/// Runs call descriptors somewhere in the cluster.
///
/// With a target member the call runs on that member. Without one the
/// substrate asks the partition-ownership service for the owner of the
/// descriptor's partition key.
pub trait ExecutionSubstrate: Send + Sync {
    fn submit(&self, call: CallDescriptor, target: Option<Member>) -> PendingCall;
}

/// Read-only view of the current cluster membership
pub trait ClusterView: Send + Sync {
    /// Members currently alive and not degraded
    fn alive_members(&self) -> Vec<Member>;

    /// Alive members that can host services
    fn alive_non_lite_members(&self) -> Vec<Member> {
        self.alive_members()
            .into_iter()
            .filter(|m| !m.is_lite())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_routing_stale_classification() {
        let moved = SubstrateError::PartitionMoved {
            partition: 3,
            member: MemberId::new("m1"),
        };
        let left = SubstrateError::MemberLeft(MemberId::new("m1"));
        let remote = SubstrateError::Remote(RemoteError::new("Boom", "x"));

        assert!(moved.is_routing_stale());
        assert!(left.is_routing_stale());
        assert!(!remote.is_routing_stale());
    }

    #[tokio::test]
    async fn test_ready_call_resolves() {
        let call = PendingCall::ready(Ok(json!(5)));
        assert_eq!(call.await.unwrap(), json!(5));
    }

    #[test]
    fn test_cancel_runs_hook_once() {
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let mut call = PendingCall::new(futures::future::pending()).with_canceller(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        assert!(call.is_cancellable());
        assert!(call.cancel());
        assert!(!call.cancel());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    struct FixedView(Vec<Member>);

    impl ClusterView for FixedView {
        fn alive_members(&self) -> Vec<Member> {
            self.0.clone()
        }
    }

    #[test]
    fn test_non_lite_filter() {
        let view = FixedView(vec![Member::new("m1", "a"), Member::lite("m2", "b")]);
        let members = view.alive_non_lite_members();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id.as_str(), "m1");
    }
}
