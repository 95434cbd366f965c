use thiserror::Error;

/// Failure classes callers can enumerate without matching every variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Rejected input: bad pattern, license expression or id. State unchanged.
    Configuration,
    /// File unreadable, backing store unwritable.
    ResourceAccess,
    /// Duplicate add, update of an unknown path, duplicate license id.
    InvariantViolation,
    /// Operation not valid in the manifest's current lifecycle state.
    Lifecycle,
}

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Invalid exclude pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("Invalid license expression '{expression}': {message}")]
    InvalidLicenseExpression { expression: String, message: String },

    #[error("Invalid license id: {0}")]
    InvalidLicenseId(String),

    #[error("Invalid manifest file name: '{0}'")]
    InvalidFileName(String),

    #[error("Unsupported property change: {0}")]
    UnsupportedProperty(String),

    #[error("I/O error on {path}: {message}")]
    Io { path: String, message: String },

    #[error("Persistence error: {0}")]
    Persistence(String),

    #[error("Cannot rename manifest, {0} already exists")]
    RenameTargetExists(String),

    #[error("File {0} already has a manifest record")]
    DuplicateFile(String),

    #[error("File {0} has no manifest record")]
    MissingFile(String),

    #[error("License id {0} is already in use")]
    DuplicateLicenseId(String),

    #[error("Manifest for project {0} has not been created")]
    NotCreated(String),

    #[error("Manifest for project {0} already exists")]
    AlreadyCreated(String),

    #[error("Manifest for project {0} is disabled")]
    Disabled(String),

    #[error("Project {0} is not open")]
    ProjectNotOpen(String),

    #[error("Invalid state transition from {from} to {to}: {reason}")]
    InvalidStateTransition {
        from: String,
        to: String,
        reason: String,
    },

    #[error("Job {0} ended without reporting an outcome")]
    JobAborted(String),
}

impl SyncError {
    pub fn io(path: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        SyncError::Io {
            path: path.to_string(),
            message: err.to_string(),
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            SyncError::InvalidPattern { .. }
            | SyncError::InvalidLicenseExpression { .. }
            | SyncError::InvalidLicenseId(_)
            | SyncError::InvalidFileName(_)
            | SyncError::UnsupportedProperty(_) => ErrorCategory::Configuration,
            SyncError::Io { .. } | SyncError::Persistence(_) | SyncError::RenameTargetExists(_) => {
                ErrorCategory::ResourceAccess
            }
            SyncError::DuplicateFile(_)
            | SyncError::MissingFile(_)
            | SyncError::DuplicateLicenseId(_) => ErrorCategory::InvariantViolation,
            SyncError::NotCreated(_)
            | SyncError::AlreadyCreated(_)
            | SyncError::Disabled(_)
            | SyncError::ProjectNotOpen(_)
            | SyncError::InvalidStateTransition { .. }
            | SyncError::JobAborted(_) => ErrorCategory::Lifecycle,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
