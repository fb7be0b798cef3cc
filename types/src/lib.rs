//! Meridian Types - shared vocabulary of the dispatch engine
//!
//! Everything that crosses the boundary between the calling side (proxies and
//! the dispatcher) and the cluster side (membership, partition ownership and
//! the execution substrate) lives here.
//!
//! ```text
//!  caller ──► ServiceProxy ──► Dispatcher ──► ExecutionSubstrate ──► SliceServer
//!                                  │                 ▲
//!                                  ▼                 │
//!                            RoutingPolicy ──► ClusterView
//! ```

// ========== Core Modules ==========
pub mod call; // Call descriptor sent to a remote worker
pub mod member; // Cluster member identity
pub mod partition; // Partition keys and partition ids
pub mod remote; // Remote error + frame stitching
pub mod substrate; // Execution substrate and membership view contracts

/// Argument, key and return payload type.
///
/// Concrete serialization is an external concern; values are kept in their
/// self-describing JSON form so that call descriptors stay wire-format agnostic.
pub use serde_json::Value;

pub use call::CallDescriptor;
pub use member::{Member, MemberId};
pub use partition::{PartitionId, PartitionKey};
pub use remote::{Frame, RemoteError, STACK_SEPARATOR};
pub use substrate::{CallResult, ClusterView, ExecutionSubstrate, PendingCall, SubstrateError};
