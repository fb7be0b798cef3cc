//! Meridian Host - the service side of a Meridian cluster
//!
//! Members host a [`Slice`] through a [`SliceServer`]; a [`LocalCluster`]
//! ties members together with a partition table and executes call
//! descriptors on them, acting as the execution substrate and membership
//! view the client side needs.
//!
//! ```text
//!                       LocalCluster
//!   submit(call) ──► partition table ──► SliceServer (m1) ──► Slice ──► ServiceHandler
//!                                   └──► SliceServer (m2) ──► ...
//! ```

mod cluster;
mod config;
mod error;
mod server;
mod slice;

pub use cluster::{
    LocalCluster, CLUSTER_SHUT_DOWN, EXECUTION_ABORTED, MISSING_ROUTE, PARTITION_UNASSIGNED,
    SLICE_NOT_FOUND,
};
pub use config::{HostConfig, DEFAULT_PARTITION_COUNT, DEFAULT_SLICE_NAME};
pub use error::{HostError, Result};
pub use server::{ServerStatus, SliceServer, SERVICE_NOT_FOUND};
pub use slice::{FnService, ServiceHandler, ServiceSlice, Slice};

use tracing_subscriber::EnvFilter;

/// Install a `fmt` subscriber filtered by `RUST_LOG` (default `info`).
///
/// Returns `false` when a global subscriber was already installed.
pub fn init_tracing() -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init()
        .is_ok()
}
