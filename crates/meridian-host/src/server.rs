//! Slice server
//!
//! Hosts one [`Slice`] on one member and executes the calls routed to it.
//!
//! ```text
//! Unstarted ──start──► Running ──shutdown──► Terminating ──► Terminated
//!     │                                                          ▲
//!     └──────────────────────────shutdown────────────────────────┘
//! ```
//!
//! Lifecycle transitions and partition notifications are serialized by one
//! lock, so the slice never sees two hooks at once.

use meridian_types::{CallDescriptor, CallResult, Frame, Member, PartitionId, RemoteError, SubstrateError};
use parking_lot::{Mutex, RwLock};
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, info};

use crate::error::{HostError, Result};
use crate::slice::Slice;

/// Error kind reported when the call names a service the slice doesn't have
pub const SERVICE_NOT_FOUND: &str = "ServiceNotFound";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerStatus {
    Unstarted,
    Running,
    Terminating,
    Terminated,
}

pub struct SliceServer {
    slice_name: String,
    member: Member,
    slice: Arc<dyn Slice>,
    status: RwLock<ServerStatus>,
    lifecycle: Mutex<()>,
    partitions: RwLock<BTreeSet<PartitionId>>,
}

impl SliceServer {
    pub fn new(slice_name: impl Into<String>, member: Member, slice: Arc<dyn Slice>) -> Self {
        Self {
            slice_name: slice_name.into(),
            member,
            slice,
            status: RwLock::new(ServerStatus::Unstarted),
            lifecycle: Mutex::new(()),
            partitions: RwLock::new(BTreeSet::new()),
        }
    }

    pub fn slice_name(&self) -> &str {
        &self.slice_name
    }

    pub fn member(&self) -> &Member {
        &self.member
    }

    pub fn status(&self) -> ServerStatus {
        *self.status.read()
    }

    pub fn is_running(&self) -> bool {
        self.status() == ServerStatus::Running
    }

    pub fn is_shutdown(&self) -> bool {
        matches!(
            self.status(),
            ServerStatus::Terminating | ServerStatus::Terminated
        )
    }

    pub fn is_terminated(&self) -> bool {
        self.status() == ServerStatus::Terminated
    }

    /// Start the server. Starting a running server is a no-op.
    ///
    /// Partitions assigned before the start are reported to the slice right
    /// after `on_start`.
    pub fn start(&self) -> Result<()> {
        let _guard = self.lifecycle.lock();

        match self.status() {
            ServerStatus::Unstarted => {
                info!(slice = %self.slice_name, member = %self.member.id, "Starting slice server");
                self.slice.on_start();
                *self.status.write() = ServerStatus::Running;

                let owned: Vec<PartitionId> = self.partitions.read().iter().copied().collect();
                for partition in owned {
                    self.slice.on_partition_added(partition);
                }
                Ok(())
            }
            ServerStatus::Running => {
                debug!(slice = %self.slice_name, "Start ignored, slice server already running");
                Ok(())
            }
            ServerStatus::Terminating => Err(HostError::AlreadyShutdown {
                slice: self.slice_name.clone(),
            }),
            ServerStatus::Terminated => Err(HostError::AlreadyTerminated {
                slice: self.slice_name.clone(),
            }),
        }
    }

    /// Shut the server down. Shutting down twice is a no-op.
    pub fn shutdown(&self) {
        let _guard = self.lifecycle.lock();

        match self.status() {
            ServerStatus::Unstarted => {
                debug!(slice = %self.slice_name, "Slice server not started, terminating immediately");
                *self.status.write() = ServerStatus::Terminated;
            }
            ServerStatus::Running => {
                info!(slice = %self.slice_name, member = %self.member.id, "Shutting down slice server");
                *self.status.write() = ServerStatus::Terminating;
                self.slice.on_stop();
                *self.status.write() = ServerStatus::Terminated;
            }
            ServerStatus::Terminating | ServerStatus::Terminated => {
                debug!(slice = %self.slice_name, "Shutdown ignored, slice server already shut down");
            }
        }
    }

    /// Record that this member now owns `partition`
    pub fn partition_added(&self, partition: PartitionId) {
        let _guard = self.lifecycle.lock();
        let added = self.partitions.write().insert(partition);
        if added && self.is_running() {
            self.slice.on_partition_added(partition);
        }
    }

    /// Record that this member no longer owns `partition`
    pub fn partition_removed(&self, partition: PartitionId) {
        let _guard = self.lifecycle.lock();
        let removed = self.partitions.write().remove(&partition);
        if removed && self.is_running() {
            self.slice.on_partition_removed(partition);
        }
    }

    pub fn owns(&self, partition: PartitionId) -> bool {
        self.partitions.read().contains(&partition)
    }

    pub fn partitions(&self) -> Vec<PartitionId> {
        self.partitions.read().iter().copied().collect()
    }

    /// Execute `call` on this member.
    ///
    /// `partition` is the partition the caller routed by; it has to still be
    /// owned here, otherwise the caller gets a stale-route error and retries.
    pub async fn execute(&self, call: CallDescriptor, partition: Option<PartitionId>) -> CallResult {
        if !self.is_running() {
            return Err(SubstrateError::MemberLeft(self.member.id.clone()));
        }

        if let Some(partition) = partition {
            if !self.owns(partition) {
                debug!(
                    slice = %self.slice_name,
                    member = %self.member.id,
                    partition,
                    "Partition no longer owned here"
                );
                return Err(SubstrateError::PartitionMoved {
                    partition,
                    member: self.member.id.clone(),
                });
            }
        }

        let service = self.slice.service(&call.service_name).ok_or_else(|| {
            RemoteError::new(
                SERVICE_NOT_FOUND,
                format!(
                    "No service '{}' in slice '{}' on {}",
                    call.service_name, self.slice_name, self.member
                ),
            )
            .with_frame(self.frame())
        })?;

        service
            .invoke(&call.method_name, &call.arg_types, call.args)
            .await
            .map_err(|err| SubstrateError::Remote(err.with_frame(self.frame())))
    }

    fn frame(&self) -> Frame {
        Frame::new(format!("SliceServer[{}@{}]::execute", self.slice_name, self.member.id))
    }
}

impl std::fmt::Debug for SliceServer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SliceServer")
            .field("slice", &self.slice_name)
            .field("member", &self.member.id)
            .field("status", &self.status())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::slice::{FnService, ServiceHandler};
    use meridian_types::Value;
    use serde_json::json;

    /// Records every hook call
    #[derive(Default)]
    struct RecordingSlice {
        events: Mutex<Vec<String>>,
    }

    impl Slice for RecordingSlice {
        fn service(&self, name: &str) -> Option<Arc<dyn ServiceHandler>> {
            (name == "Echo").then(|| {
                FnService::new(|_: &str, args: &[Value]| Ok(Value::Array(args.to_vec())))
                    as Arc<dyn ServiceHandler>
            })
        }

        fn on_start(&self) {
            self.events.lock().push("start".to_string());
        }

        fn on_stop(&self) {
            self.events.lock().push("stop".to_string());
        }

        fn on_partition_added(&self, partition: PartitionId) {
            self.events.lock().push(format!("+{}", partition));
        }

        fn on_partition_removed(&self, partition: PartitionId) {
            self.events.lock().push(format!("-{}", partition));
        }
    }

    fn server() -> (Arc<RecordingSlice>, SliceServer) {
        let slice = Arc::new(RecordingSlice::default());
        let server = SliceServer::new("default", Member::new("m1", "127.0.0.1:5701"), slice.clone());
        (slice, server)
    }

    fn call(service: &str) -> CallDescriptor {
        CallDescriptor::new("default", service, "echo", vec![], vec![json!(1)])
    }

    #[test]
    fn test_lifecycle_hooks_in_order() {
        let (slice, server) = server();
        server.partition_added(3);
        assert_eq!(server.status(), ServerStatus::Unstarted);
        assert!(slice.events.lock().is_empty());

        server.start().unwrap();
        server.start().unwrap();
        server.partition_added(5);
        server.partition_removed(3);
        server.shutdown();
        server.shutdown();

        assert!(server.is_terminated());
        assert_eq!(*slice.events.lock(), vec!["start", "+3", "+5", "-3", "stop"]);
    }

    #[test]
    fn test_restart_after_shutdown_fails() {
        let (_, server) = server();
        server.start().unwrap();
        server.shutdown();

        assert_eq!(
            server.start().unwrap_err(),
            HostError::AlreadyTerminated {
                slice: "default".to_string()
            }
        );
    }

    #[test]
    fn test_shutdown_before_start() {
        let (slice, server) = server();
        server.shutdown();
        assert!(server.is_terminated());
        assert!(slice.events.lock().is_empty());
    }

    #[tokio::test]
    async fn test_execute_checks_ownership() {
        let (_, server) = server();
        server.start().unwrap();
        server.partition_added(7);

        let value = server.execute(call("Echo"), Some(7)).await.unwrap();
        assert_eq!(value, json!([1]));

        let err = server.execute(call("Echo"), Some(8)).await.unwrap_err();
        assert!(err.is_routing_stale());
    }

    #[tokio::test]
    async fn test_execute_unknown_service() {
        let (_, server) = server();
        server.start().unwrap();

        match server.execute(call("Missing"), None).await.unwrap_err() {
            SubstrateError::Remote(err) => {
                assert!(err.is_kind(SERVICE_NOT_FOUND));
                assert_eq!(err.frames.len(), 1);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_stopped_server_reports_member_left() {
        let (_, server) = server();
        let err = server.execute(call("Echo"), None).await.unwrap_err();
        assert_eq!(err, SubstrateError::MemberLeft(meridian_types::MemberId::new("m1")));
    }
}
