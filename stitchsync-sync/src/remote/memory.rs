//! In-process remote store.
//!
//! Behaves like a document database shared by several devices: every write
//! is pushed to all open watches for the owner, including the writer's own,
//! so echoes happen here exactly as they do against a real backend. Failures
//! can be injected to exercise retry and fallback paths.

use super::storage::{RemoteDocument, RemoteStore};
use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use stitchsync_types::{Project, ProjectId, UserId};
use tokio::sync::mpsc;
use tracing::debug;

const WATCH_BUFFER: usize = 64;

/// Kind of failure to inject.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    Network,
    Auth,
}

impl FailureMode {
    fn to_error(self, operation: &str) -> SyncError {
        match self {
            FailureMode::Network => SyncError::Network(format!("{operation}: connection reset")),
            FailureMode::Auth => SyncError::Auth(format!("{operation}: permission denied")),
        }
    }
}

#[derive(Default)]
struct Inner {
    collections: HashMap<UserId, BTreeMap<String, Value>>,
    watchers: HashMap<UserId, Vec<mpsc::Sender<RemoteDocument>>>,
    put_failures: VecDeque<FailureMode>,
    fetch_failure: Option<FailureMode>,
    put_attempts: usize,
    fetch_count: usize,
}

/// A remote store held entirely in memory.
#[derive(Default)]
pub struct MemoryRemoteStore {
    inner: Mutex<Inner>,
}

impl MemoryRemoteStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stores a project without going through `put_project` (no failures,
    /// no counting, no watch notifications).
    pub fn seed(&self, owner: &UserId, project: &Project) -> SyncResult<()> {
        let doc = project.to_document()?;
        self.insert_raw(owner, &project.id.to_string(), doc);
        Ok(())
    }

    /// Stores an arbitrary document, valid or not.
    pub fn insert_raw(&self, owner: &UserId, key: &str, data: Value) {
        self.lock()
            .collections
            .entry(owner.clone())
            .or_default()
            .insert(key.to_string(), data);
    }

    /// Decodes one stored project.
    pub fn get(&self, owner: &UserId, id: &ProjectId) -> Option<Project> {
        let key = id.to_string();
        let data = self.lock().collections.get(owner)?.get(&key)?.clone();
        Project::from_document(&key, data).ok()
    }

    /// Number of documents stored for `owner`.
    pub fn len(&self, owner: &UserId) -> usize {
        self.lock().collections.get(owner).map_or(0, BTreeMap::len)
    }

    /// Whether `owner` has no documents.
    pub fn is_empty(&self, owner: &UserId) -> bool {
        self.len(owner) == 0
    }

    /// Fails the next `count` uploads with `mode`.
    pub fn fail_next_puts(&self, count: usize, mode: FailureMode) {
        let mut inner = self.lock();
        inner.put_failures.extend(std::iter::repeat_n(mode, count));
    }

    /// Fails every fetch with `mode` until cleared with `None`.
    pub fn set_fetch_failure(&self, mode: Option<FailureMode>) {
        self.lock().fetch_failure = mode;
    }

    /// Upload attempts so far, failed ones included.
    pub fn put_attempts(&self) -> usize {
        self.lock().put_attempts
    }

    /// Fetches so far, failed ones included.
    pub fn fetch_count(&self) -> usize {
        self.lock().fetch_count
    }

    /// Simulates a write from another device: stores and notifies watchers.
    pub fn push_external(&self, owner: &UserId, project: &Project) -> SyncResult<()> {
        let doc = RemoteDocument::from_project(project)?;
        let mut inner = self.lock();
        inner
            .collections
            .entry(owner.clone())
            .or_default()
            .insert(doc.id.clone(), doc.data.clone());
        notify(&mut inner, owner, doc);
        Ok(())
    }
}

fn notify(inner: &mut Inner, owner: &UserId, doc: RemoteDocument) {
    if let Some(watchers) = inner.watchers.get_mut(owner) {
        watchers.retain(|tx| !tx.is_closed());
        for tx in watchers.iter() {
            if tx.try_send(doc.clone()).is_err() {
                debug!("Dropping remote change for a lagging watcher");
            }
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemoteStore {
    fn provider_name(&self) -> &'static str {
        "Memory"
    }

    async fn fetch_projects(&self, owner: &UserId) -> SyncResult<Vec<RemoteDocument>> {
        let mut inner = self.lock();
        inner.fetch_count += 1;
        if let Some(mode) = inner.fetch_failure {
            return Err(mode.to_error("project fetch failed"));
        }
        Ok(inner
            .collections
            .get(owner)
            .map(|docs| {
                docs.iter()
                    .map(|(id, data)| RemoteDocument {
                        id: id.clone(),
                        data: data.clone(),
                    })
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn put_project(&self, owner: &UserId, project: &Project) -> SyncResult<()> {
        let doc = RemoteDocument::from_project(project)?;
        let mut inner = self.lock();
        inner.put_attempts += 1;
        if let Some(mode) = inner.put_failures.pop_front() {
            return Err(mode.to_error("project upload failed"));
        }
        inner
            .collections
            .entry(owner.clone())
            .or_default()
            .insert(doc.id.clone(), doc.data.clone());
        notify(&mut inner, owner, doc);
        Ok(())
    }

    async fn watch_projects(
        &self,
        owner: &UserId,
    ) -> SyncResult<Option<mpsc::Receiver<RemoteDocument>>> {
        let (tx, rx) = mpsc::channel(WATCH_BUFFER);
        self.lock()
            .watchers
            .entry(owner.clone())
            .or_default()
            .push(tx);
        Ok(Some(rx))
    }
}
