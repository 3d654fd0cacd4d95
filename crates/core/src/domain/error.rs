// Domain Error Types

use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DomainError {
    #[error("Invalid group name: {0:?}")]
    InvalidGroupName(String),

    #[error("Invalid host name: {0:?}")]
    InvalidHostName(String),

    #[error("Host not found: {0}")]
    HostNotFound(String),

    #[error("Group not found: {0}")]
    GroupNotFound(String),

    #[error("Group {0} cannot be its own child")]
    SelfReferencingGroup(String),
}

pub type Result<T> = std::result::Result<T, DomainError>;
