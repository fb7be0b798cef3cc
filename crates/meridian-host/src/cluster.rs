//! In-process cluster
//!
//! Keeps the membership and the partition table of a set of members living
//! in one process, and executes call descriptors on them. Each member runs a
//! [`SliceServer`] for the configured slice.
//!
//! Partitions are assigned round-robin over the non-lite members, ordered by
//! member id. Moving a partition or removing a member updates the table
//! immediately; calls already routed to the old owner fail with a stale-route
//! error and get re-routed by the caller.
//!
//! Shutting the cluster down empties the membership and the partition table.
//! Calls submitted afterwards fail with a [`CLUSTER_SHUT_DOWN`] remote error.

use meridian_types::{
    CallDescriptor, ClusterView, ExecutionSubstrate, Member, MemberId, PartitionId, PartitionKey,
    PendingCall, RemoteError, SubstrateError,
};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::HostConfig;
use crate::error::{HostError, Result};
use crate::server::SliceServer;
use crate::slice::Slice;

/// Error kind reported for calls that carry neither a target nor a key
pub const MISSING_ROUTE: &str = "MissingRoute";

/// Error kind reported when a partition has no owner
pub const PARTITION_UNASSIGNED: &str = "PartitionUnassigned";

/// Error kind reported when the call's slice isn't hosted on the target
pub const SLICE_NOT_FOUND: &str = "SliceNotFound";

/// Error kind reported when the remote task was aborted or panicked
pub const EXECUTION_ABORTED: &str = "ExecutionAborted";

/// Error kind reported for calls submitted after shutdown
pub const CLUSTER_SHUT_DOWN: &str = "ClusterShutDown";

struct ClusterState {
    running: bool,
    servers: BTreeMap<MemberId, Arc<SliceServer>>,
    owners: Vec<Option<MemberId>>,
}

pub struct LocalCluster {
    config: HostConfig,
    state: RwLock<ClusterState>,
    executed: AtomicU64,
}

impl LocalCluster {
    pub fn new(config: HostConfig) -> Result<Self> {
        config.validate()?;
        let owners = vec![None; config.partition_count as usize];
        Ok(Self {
            config,
            state: RwLock::new(ClusterState {
                running: true,
                servers: BTreeMap::new(),
                owners,
            }),
            executed: AtomicU64::new(0),
        })
    }

    pub fn config(&self) -> &HostConfig {
        &self.config
    }

    pub fn partition_count(&self) -> u32 {
        self.config.partition_count
    }

    /// Partition `key` falls into
    pub fn partition_for(&self, key: &PartitionKey) -> PartitionId {
        key.partition_id(self.config.partition_count)
    }

    /// Add a member hosting `slice` and start its slice server.
    ///
    /// Partitions are not moved; call [`rebalance`](Self::rebalance) once the
    /// members are in.
    pub fn add_member(&self, member: Member, slice: Arc<dyn Slice>) -> Result<Arc<SliceServer>> {
        let server = Arc::new(SliceServer::new(
            self.config.slice_name.clone(),
            member.clone(),
            slice,
        ));

        {
            let mut state = self.state.write();
            if !state.running {
                return Err(HostError::ClusterShutDown);
            }
            if state.servers.contains_key(&member.id) {
                return Err(HostError::DuplicateMember(member.id));
            }
            state.servers.insert(member.id.clone(), server.clone());
        }

        server.start()?;
        info!(member = %member, slice = %self.config.slice_name, "Member joined");
        Ok(server)
    }

    /// Remove a member. Its partitions go to the remaining non-lite members.
    pub fn remove_member(&self, id: &MemberId) -> Result<Member> {
        let (server, orphaned) = {
            let mut state = self.state.write();
            let server = state
                .servers
                .remove(id)
                .ok_or_else(|| HostError::UnknownMember(id.clone()))?;

            let mut orphaned = Vec::new();
            for (partition, owner) in state.owners.iter_mut().enumerate() {
                if owner.as_ref() == Some(id) {
                    *owner = None;
                    orphaned.push(partition as PartitionId);
                }
            }
            (server, orphaned)
        };

        server.shutdown();
        info!(member = %server.member(), orphaned = orphaned.len(), "Member left");

        self.assign_unowned();
        Ok(server.member().clone())
    }

    /// Reassign every partition round-robin over the non-lite members
    pub fn rebalance(&self) {
        let changes = {
            let mut state = self.state.write();
            let owners: Vec<MemberId> = state
                .servers
                .values()
                .filter(|s| !s.member().is_lite())
                .map(|s| s.member().id.clone())
                .collect();
            if owners.is_empty() {
                warn!("No non-lite member to own partitions");
                return;
            }

            let mut changes = Vec::new();
            for (partition, owner) in state.owners.iter_mut().enumerate() {
                let next = owners[partition % owners.len()].clone();
                if owner.as_ref() != Some(&next) {
                    changes.push((partition as PartitionId, owner.replace(next.clone()), next));
                }
            }
            changes
        };

        debug!(moved = changes.len(), "Partition table rebalanced");
        for (partition, from, to) in changes {
            self.notify_move(partition, from.as_ref(), &to);
        }
    }

    /// Hand `partition` to member `to`
    pub fn move_partition(&self, partition: PartitionId, to: &MemberId) -> Result<()> {
        let from = {
            let mut state = self.state.write();
            let server = state
                .servers
                .get(to)
                .ok_or_else(|| HostError::UnknownMember(to.clone()))?;
            if server.member().is_lite() {
                return Err(HostError::LiteMember(to.clone()));
            }
            let slot = state
                .owners
                .get_mut(partition as usize)
                .ok_or(HostError::PartitionOutOfRange {
                    partition,
                    count: self.config.partition_count,
                })?;
            slot.replace(to.clone())
        };

        if from.as_ref() != Some(to) {
            info!(partition, from = ?from.as_ref().map(|m| m.to_string()), to = %to, "Partition moved");
            self.notify_move(partition, from.as_ref(), to);
        }
        Ok(())
    }

    /// Current owner of `partition`
    pub fn owner_of(&self, partition: PartitionId) -> Option<Member> {
        let state = self.state.read();
        let owner = state.owners.get(partition as usize)?.as_ref()?;
        state.servers.get(owner).map(|s| s.member().clone())
    }

    /// Current owner of the partition `key` falls into
    pub fn owner_of_key(&self, key: &PartitionKey) -> Option<Member> {
        self.owner_of(self.partition_for(key))
    }

    pub fn server(&self, id: &MemberId) -> Option<Arc<SliceServer>> {
        self.state.read().servers.get(id).cloned()
    }

    pub fn members(&self) -> Vec<Member> {
        self.state
            .read()
            .servers
            .values()
            .map(|s| s.member().clone())
            .collect()
    }

    /// Number of calls handed to a slice server so far
    pub fn executed(&self) -> u64 {
        self.executed.load(Ordering::Relaxed)
    }

    /// Remove every member and shut its slice server down.
    ///
    /// Members can't join afterwards.
    pub fn shutdown(&self) {
        let servers = {
            let mut state = self.state.write();
            if !state.running {
                return;
            }
            state.running = false;
            state.owners.iter_mut().for_each(|owner| *owner = None);
            std::mem::take(&mut state.servers)
        };

        info!(members = servers.len(), "Cluster shutting down");
        for server in servers.into_values() {
            server.shutdown();
        }
    }

    pub fn is_shutdown(&self) -> bool {
        !self.state.read().running
    }

    fn assign_unowned(&self) {
        let changes = {
            let mut state = self.state.write();
            let owners: Vec<MemberId> = state
                .servers
                .values()
                .filter(|s| !s.member().is_lite())
                .map(|s| s.member().id.clone())
                .collect();
            if owners.is_empty() {
                return;
            }

            let mut cursor = 0;
            let mut changes = Vec::new();
            for (partition, owner) in state.owners.iter_mut().enumerate() {
                if owner.is_none() {
                    let next = owners[cursor % owners.len()].clone();
                    cursor += 1;
                    *owner = Some(next.clone());
                    changes.push((partition as PartitionId, next));
                }
            }
            changes
        };

        for (partition, to) in changes {
            self.notify_move(partition, None, &to);
        }
    }

    fn notify_move(&self, partition: PartitionId, from: Option<&MemberId>, to: &MemberId) {
        if let Some(server) = from.and_then(|id| self.server(id)) {
            server.partition_removed(partition);
        }
        if let Some(server) = self.server(to) {
            server.partition_added(partition);
        }
    }

    /// Pick the member and partition a call runs on
    fn route(
        &self,
        call: &CallDescriptor,
        target: Option<Member>,
    ) -> std::result::Result<(MemberId, Option<PartitionId>), SubstrateError> {
        if self.is_shutdown() {
            return Err(RemoteError::new(
                CLUSTER_SHUT_DOWN,
                format!("{} submitted after cluster shutdown", call.qualified_method()),
            )
            .into());
        }

        if let Some(member) = target {
            return Ok((member.id, None));
        }

        let key = call.partition_key.as_ref().ok_or_else(|| {
            RemoteError::new(
                MISSING_ROUTE,
                format!(
                    "{} has neither a target member nor a partition key",
                    call.qualified_method()
                ),
            )
        })?;

        let partition = self.partition_for(key);
        let state = self.state.read();
        let owner = state.owners[partition as usize].clone().ok_or_else(|| {
            RemoteError::new(
                PARTITION_UNASSIGNED,
                format!("partition {} has no owner", partition),
            )
        })?;
        Ok((owner, Some(partition)))
    }
}

impl ExecutionSubstrate for LocalCluster {
    fn submit(&self, call: CallDescriptor, target: Option<Member>) -> PendingCall {
        let (member, partition) = match self.route(&call, target) {
            Ok(route) => route,
            Err(err) => return PendingCall::ready(Err(err)),
        };

        let server = match self.server(&member) {
            Some(server) => server,
            None => return PendingCall::ready(Err(SubstrateError::MemberLeft(member))),
        };

        if server.slice_name() != call.slice_name {
            return PendingCall::ready(Err(SubstrateError::Remote(RemoteError::new(
                SLICE_NOT_FOUND,
                format!("No slice '{}' on member {}", call.slice_name, member),
            ))));
        }

        self.executed.fetch_add(1, Ordering::Relaxed);
        debug!(
            member = %member,
            partition = ?partition,
            method = %call.qualified_method(),
            "Executing call"
        );

        let handle = tokio::spawn(async move { server.execute(call, partition).await });
        let abort = handle.abort_handle();

        PendingCall::new(async move {
            match handle.await {
                Ok(result) => result,
                Err(err) => Err(SubstrateError::Remote(RemoteError::new(
                    EXECUTION_ABORTED,
                    err.to_string(),
                ))),
            }
        })
        .with_canceller(move || abort.abort())
    }
}

impl ClusterView for LocalCluster {
    fn alive_members(&self) -> Vec<Member> {
        self.state
            .read()
            .servers
            .values()
            .filter(|s| s.is_running())
            .map(|s| s.member().clone())
            .collect()
    }
}
