//! Meridian Router - target selection for load-balanced calls
//!
//! Partitioned calls need no policy: the execution substrate sends them to
//! the owner of the key's partition. Load-balanced calls pick a member through
//! a [`RoutingPolicy`] built once per method and shared by every caller of
//! that method.
//!
//! # Architecture
//!
//! ```text
//! MethodRoute (LoadBalanced)
//!     │
//!     ▼
//! ┌─────────────────────────┐
//! │     RoutingPolicy       │  round-robin / random / custom
//! │   (Which member?)       │
//! └───────────┬─────────────┘
//!             │
//!             ▼
//! ┌─────────────────────────┐
//! │      ClusterView        │  MemberRegistry or the host cluster
//! │  (Who is alive?)        │
//! └─────────────────────────┘
//! ```
//!
//! Policies are referenced by name and constructed through the
//! [`PolicyRegistry`], which hands every factory the cluster-access handle.

mod error;
mod load_balancer;
mod member_registry;
mod policy;

pub use error::{Result, RouterError};
pub use load_balancer::{RandomPolicy, RoundRobinPolicy};
pub use member_registry::{MemberInfo, MemberRegistry, MemberStatus};
pub use policy::{PolicyFactory, PolicyRegistry, RoutingPolicy, RANDOM, ROUND_ROBIN};
