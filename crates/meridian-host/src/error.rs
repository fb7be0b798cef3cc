//! Host error types

use meridian_types::{MemberId, PartitionId};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    #[error("Can't start slice server '{slice}', it is already shut down")]
    AlreadyShutdown { slice: String },

    #[error("Can't start slice server '{slice}', it is already terminated")]
    AlreadyTerminated { slice: String },

    #[error("Cluster is shut down")]
    ClusterShutDown,

    #[error("Member {0} is already part of the cluster")]
    DuplicateMember(MemberId),

    #[error("Member {0} is not part of the cluster")]
    UnknownMember(MemberId),

    #[error("Member {0} is a lite member and can't own partitions")]
    LiteMember(MemberId),

    #[error("Partition {partition} is out of range (partition count {count})")]
    PartitionOutOfRange { partition: PartitionId, count: u32 },

    #[error("Invalid host configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, HostError>;
