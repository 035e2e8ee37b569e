use std::path::PathBuf;

use thiserror::Error;

use crate::profile::ProfileId;

#[derive(Error, Debug)]
pub enum ProfileError {
    #[error("Invalid profile name: {requested:?} contains no usable characters")]
    InvalidName { requested: String },

    #[error("Profile already exists: {0}")]
    AlreadyExists(ProfileId),

    #[error("Profile not found: {0}")]
    NotFound(String),

    #[error("Cannot delete {0}: it is the last remaining profile")]
    LastProfileProtected(ProfileId),

    #[error("Partition destination {path:?} is occupied and no backup name is free")]
    PartitionConflict { path: PathBuf },

    #[error("IO error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Backup error: {0}")]
    Backup(String),
}

impl ProfileError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ProfileError::Io {
            path: path.into(),
            source,
        }
    }

    /// Validation failures leave all state untouched and are reported back
    /// to the caller as a plain "no-op, here's why".
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ProfileError::InvalidName { .. }
                | ProfileError::AlreadyExists(_)
                | ProfileError::NotFound(_)
                | ProfileError::LastProfileProtected(_)
        )
    }

    /// Stable kebab-case tag used on the IPC wire
    pub fn kind(&self) -> &'static str {
        match self {
            ProfileError::InvalidName { .. } => "invalid-name",
            ProfileError::AlreadyExists(_) => "already-exists",
            ProfileError::NotFound(_) => "not-found",
            ProfileError::LastProfileProtected(_) => "last-profile-protected",
            ProfileError::PartitionConflict { .. } => "partition-conflict",
            ProfileError::Io { .. } => "io-failure",
            ProfileError::Serialize(_) => "serialize",
            ProfileError::Backup(_) => "backup",
        }
    }
}

pub type Result<T> = std::result::Result<T, ProfileError>;
