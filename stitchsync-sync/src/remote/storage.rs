//! Remote store abstraction trait.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use stitchsync_types::{Project, UserId};
use tokio::sync::mpsc;

/// A raw document as stored remotely.
///
/// Kept undecoded so one malformed document fails on its own instead of
/// failing the whole batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemoteDocument {
    /// The key the document is stored under.
    pub id: String,
    pub data: Value,
}

impl RemoteDocument {
    /// Encodes a project.
    pub fn from_project(project: &Project) -> SyncResult<Self> {
        Ok(Self {
            id: project.id.to_string(),
            data: project.to_document()?,
        })
    }

    /// Decodes the document, reporting failures against its key.
    pub fn decode(&self) -> SyncResult<Project> {
        Project::from_document(&self.id, self.data.clone()).map_err(|e| SyncError::Validation {
            project_id: self.id.clone(),
            reason: e.to_string(),
        })
    }
}

/// Abstract remote project store, scoped per owning user.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Returns the name of the backing provider.
    fn provider_name(&self) -> &'static str;

    /// Fetches every project document owned by `owner`.
    async fn fetch_projects(&self, owner: &UserId) -> SyncResult<Vec<RemoteDocument>>;

    /// Creates or replaces one project document.
    async fn put_project(&self, owner: &UserId, project: &Project) -> SyncResult<()>;

    /// Streams documents changed remotely. `None` if the store cannot push.
    async fn watch_projects(
        &self,
        _owner: &UserId,
    ) -> SyncResult<Option<mpsc::Receiver<RemoteDocument>>> {
        Ok(None)
    }
}
