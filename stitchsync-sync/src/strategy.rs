//! Conflict records and resolution strategies.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use stitchsync_types::{Project, ProjectId};

/// Which side of a conflict is newer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimestampComparison {
    LocalNewer,
    RemoteNewer,
}

/// A divergence between the local and remote version of one project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConflict {
    pub project_id: ProjectId,
    pub local_version: Project,
    pub remote_version: Project,
    pub comparison: TimestampComparison,
}

impl ProjectConflict {
    /// Builds a conflict, deriving the comparison from the timestamps.
    pub fn new(local_version: Project, remote_version: Project) -> Self {
        let comparison = match local_version.last_modified.cmp(&remote_version.last_modified) {
            Ordering::Less => TimestampComparison::RemoteNewer,
            Ordering::Equal | Ordering::Greater => TimestampComparison::LocalNewer,
        };
        Self {
            project_id: local_version.id,
            local_version,
            remote_version,
            comparison,
        }
    }
}

/// A decision for one conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    UseLocal,
    UseRemote,
}

impl Resolution {
    /// Picks the version this resolution selects.
    pub fn select(self, conflict: &ProjectConflict) -> &Project {
        match self {
            Resolution::UseLocal => &conflict.local_version,
            Resolution::UseRemote => &conflict.remote_version,
        }
    }
}

/// Decides conflicts during an auto-resolving merge.
///
/// Returning `None` leaves the conflict for the user.
pub trait ConflictStrategy: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn resolve(&self, conflict: &ProjectConflict) -> Option<Resolution>;
}

/// The version with the later `last_modified` wins; ties keep local.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewestWins;

impl ConflictStrategy for NewestWins {
    fn name(&self) -> &'static str {
        "newest_wins"
    }

    fn resolve(&self, conflict: &ProjectConflict) -> Option<Resolution> {
        Some(match conflict.comparison {
            TimestampComparison::LocalNewer => Resolution::UseLocal,
            TimestampComparison::RemoteNewer => Resolution::UseRemote,
        })
    }
}

/// Never resolves; every conflict goes to the user.
#[derive(Debug, Clone, Copy, Default)]
pub struct ManualOnly;

impl ConflictStrategy for ManualOnly {
    fn name(&self) -> &'static str {
        "manual_only"
    }

    fn resolve(&self, _conflict: &ProjectConflict) -> Option<Resolution> {
        None
    }
}

/// Options for a merge.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub strategy: Arc<dyn ConflictStrategy>,
    /// Resolve conflicts with `strategy` instead of reporting them.
    pub auto_resolve: bool,
}

impl MergeOptions {
    /// Newest-wins with automatic resolution.
    pub fn newest_wins() -> Self {
        Self {
            strategy: Arc::new(NewestWins),
            auto_resolve: true,
        }
    }

    /// Reports every conflict for manual resolution.
    pub fn manual() -> Self {
        Self {
            strategy: Arc::new(NewestWins),
            auto_resolve: false,
        }
    }
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self::newest_wins()
    }
}
