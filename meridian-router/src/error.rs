//! Router error types

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouterError {
    #[error("No members available for policy {0}")]
    NoMembersAvailable(String),

    #[error("Unknown routing policy: {0}")]
    UnknownPolicy(String),

    #[error("Failed to construct routing policy {policy}: {reason}")]
    Construction { policy: String, reason: String },
}

pub type Result<T> = std::result::Result<T, RouterError>;
