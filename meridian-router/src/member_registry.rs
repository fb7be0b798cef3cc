//! Member registry for tracking cluster membership

use meridian_types::{ClusterView, Member, MemberId};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Member status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MemberStatus {
    /// Member is alive and accepting calls
    Active,

    /// Member is alive but should not receive new calls
    Degraded,
}

/// Member information
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberInfo {
    pub member: Member,

    /// Current status
    pub status: MemberStatus,
}

impl MemberInfo {
    pub fn new(member: Member) -> Self {
        Self {
            member,
            status: MemberStatus::Active,
        }
    }

    /// Alive and not degraded
    pub fn is_available(&self) -> bool {
        self.status == MemberStatus::Active
    }
}

/// Member registry.
///
/// Members are kept ordered by ID so every view of the membership lists them
/// in the same order, which keeps round-robin rotation predictable.
pub struct MemberRegistry {
    members: Arc<RwLock<BTreeMap<MemberId, MemberInfo>>>,
}

impl MemberRegistry {
    pub fn new() -> Self {
        Self {
            members: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// Register a member, replacing any previous entry with the same ID
    pub fn register(&self, member: Member) {
        info!(
            member_id = %member.id,
            address = %member.address,
            lite = member.lite,
            "Registering member"
        );

        let mut members = self.members.write();
        members.insert(member.id.clone(), MemberInfo::new(member));
    }

    /// Unregister a member. Returns the removed entry.
    pub fn unregister(&self, member_id: &MemberId) -> Option<MemberInfo> {
        info!(member_id = %member_id, "Unregistering member");

        let mut members = self.members.write();
        members.remove(member_id)
    }

    pub fn get(&self, member_id: &MemberId) -> Option<MemberInfo> {
        let members = self.members.read();
        members.get(member_id).cloned()
    }

    pub fn contains(&self, member_id: &MemberId) -> bool {
        self.members.read().contains_key(member_id)
    }

    /// Members that are alive and not degraded
    pub fn get_available(&self) -> Vec<Member> {
        let members = self.members.read();
        members
            .values()
            .filter(|m| m.is_available())
            .map(|m| m.member.clone())
            .collect()
    }

    pub fn update_status(&self, member_id: &MemberId, status: MemberStatus) {
        let mut members = self.members.write();
        if let Some(info) = members.get_mut(member_id) {
            debug!(
                member_id = %member_id,
                old_status = ?info.status,
                new_status = ?status,
                "Updating member status"
            );
            info.status = status;
        }
    }

    pub fn count(&self) -> usize {
        self.members.read().len()
    }

    pub fn active_count(&self) -> usize {
        let members = self.members.read();
        members.values().filter(|m| m.is_available()).count()
    }
}

impl Default for MemberRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ClusterView for MemberRegistry {
    fn alive_members(&self) -> Vec<Member> {
        self.get_available()
    }
}
