//! Core type definitions for StitchSync.
//!
//! This crate defines the plain data types shared by the sync engine:
//! - Project and user identifiers
//! - Millisecond timestamps used to order project mutations
//! - The `Project` document (content is opaque to the sync core)
//! - Identity states reported by the identity provider
//!
//! Pattern-editing semantics (rounds, stitches, charts) live in the
//! application; the sync core only ever sees `Project::content` as JSON.

mod identity;
mod ids;
mod project;
mod timestamp;

pub use identity::{AuthIdentity, User};
pub use ids::{ProjectId, UserId};
pub use project::Project;
pub use timestamp::Timestamp;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid UUID: {0}")]
    InvalidUuid(#[from] uuid::Error),

    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    #[error("invalid document: {0}")]
    InvalidDocument(String),
}
