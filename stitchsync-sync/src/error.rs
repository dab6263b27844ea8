//! Error types for the sync layer.

use serde::{Deserialize, Serialize};
use stitchsync_types::ProjectId;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Network error. Transient.
    #[error("network error: {0}")]
    Network(String),

    /// Authorization or permission failure. Permanent for the session.
    #[error("authorization error: {0}")]
    Auth(String),

    /// A remote document could not be decoded.
    #[error("invalid project {project_id}: {reason}")]
    Validation { project_id: String, reason: String },

    /// Local store failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Timeout.
    #[error("operation timed out")]
    Timeout,
}

impl SyncError {
    /// Whether retrying the same operation might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::Timeout)
    }

    /// Coarse classification used in [`SyncIssue`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Network(_) | SyncError::Timeout => ErrorKind::Network,
            SyncError::Auth(_) => ErrorKind::Authorization,
            SyncError::Validation { .. } | SyncError::Serialization(_) => ErrorKind::Validation,
            SyncError::Storage(_) => ErrorKind::Storage,
        }
    }
}

impl From<stitchsync_types::Error> for SyncError {
    fn from(err: stitchsync_types::Error) -> Self {
        match err {
            stitchsync_types::Error::Serialization(e) => SyncError::Serialization(e),
            other => SyncError::Storage(other.to_string()),
        }
    }
}

/// Error taxonomy surfaced to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Authorization,
    Validation,
    Storage,
}

/// An error collected during a batch operation without aborting it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncIssue {
    /// The project the error belongs to, if any.
    pub project_id: Option<ProjectId>,
    pub kind: ErrorKind,
    pub message: String,
}

impl SyncIssue {
    /// Builds an issue from an error, optionally tied to a project.
    pub fn new(project_id: Option<ProjectId>, error: &SyncError) -> Self {
        Self {
            project_id,
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}
