//! Sync coordinator: merges local and remote project collections.
//!
//! The coordinator never touches the project store. It takes the local
//! collection as input and returns the merged collection; the lifecycle
//! controller decides what to write back.

use crate::config::SyncConfig;
use crate::error::{SyncIssue, SyncResult};
use crate::remote::{RemoteDocument, RemoteStore};
use crate::strategy::{MergeOptions, ProjectConflict, Resolution};
use crate::tracker::LocalChangeTracker;
use serde::Serialize;
use std::collections::hash_map::Entry;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, PoisonError};
use stitchsync_types::{Project, ProjectId, UserId};
use tracing::{debug, info, warn};

/// Outcome of a merge.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SyncReport {
    /// True when no errors were collected. Conflicts are not errors.
    pub success: bool,
    /// One project per id, local order first, then remote-only projects.
    pub merged: Vec<Project>,
    /// Conflicts left for the user.
    pub conflicts: Vec<ProjectConflict>,
    /// Per-project failures that did not abort the merge.
    pub errors: Vec<SyncIssue>,
}

/// Which version a per-id merge step settled on.
enum Pick {
    /// Keep local; the remote copy is already equivalent or awaits the user.
    Local,
    /// Keep local and push it to the remote.
    Push,
    Remote,
}

/// Merges, resolves and pushes projects for one owner at a time.
pub struct SyncCoordinator {
    remote: Arc<dyn RemoteStore>,
    tracker: Arc<LocalChangeTracker>,
    config: SyncConfig,
    /// Per-project locks so resolutions of distinct conflicts run independently.
    resolving: Mutex<HashMap<ProjectId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SyncCoordinator {
    pub fn new(
        remote: Arc<dyn RemoteStore>,
        tracker: Arc<LocalChangeTracker>,
        config: SyncConfig,
    ) -> Self {
        Self {
            remote,
            tracker,
            config,
            resolving: Mutex::new(HashMap::new()),
        }
    }

    pub fn tracker(&self) -> &Arc<LocalChangeTracker> {
        &self.tracker
    }

    pub fn remote(&self) -> &Arc<dyn RemoteStore> {
        &self.remote
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    // ── Merge ────────────────────────────────────────────────────

    /// Merges `local` with the remote collection of `owner`.
    ///
    /// Fails only if the remote collection cannot be fetched at all.
    /// Malformed remote documents and failed uploads are collected in
    /// `errors`. Versions the merge keeps from the local side are pushed.
    pub async fn merge_local_and_remote_data(
        &self,
        owner: &UserId,
        local: &[Project],
        options: &MergeOptions,
    ) -> SyncResult<SyncReport> {
        let documents = self.remote.fetch_projects(owner).await?;

        let mut errors = Vec::new();
        let (mut remote, remote_order) = decode_documents(documents, &mut errors);
        let (local, local_order) = index_newest(local.iter().cloned());

        let mut merged = Vec::with_capacity(local_order.len() + remote.len());
        let mut conflicts = Vec::new();
        let mut to_upload = Vec::new();

        for id in &local_order {
            let Some(local_version) = local.get(id) else {
                continue;
            };

            let winner = match remote.remove(id) {
                None => {
                    to_upload.push(local_version.clone());
                    local_version.clone()
                }
                Some(remote_version) => {
                    match self.compare(local_version, &remote_version, options, &mut conflicts) {
                        Pick::Local => local_version.clone(),
                        Pick::Push => {
                            to_upload.push(local_version.clone());
                            local_version.clone()
                        }
                        Pick::Remote => remote_version,
                    }
                }
            };

            if winner.deleted {
                debug!("Dropping deleted project {}", id);
            } else {
                merged.push(winner);
            }
        }

        for id in remote_order {
            if let Some(remote_version) = remote.remove(&id) {
                if !remote_version.deleted {
                    merged.push(remote_version);
                }
            }
        }

        self.upload_all(owner, to_upload, &mut errors).await;

        info!(
            "Merged {} local with remote for {}: {} projects, {} conflicts, {} errors",
            local_order.len(),
            owner,
            merged.len(),
            conflicts.len(),
            errors.len()
        );

        Ok(SyncReport {
            success: errors.is_empty(),
            merged,
            conflicts,
            errors,
        })
    }

    /// Decides between two versions of the same project.
    fn compare(
        &self,
        local: &Project,
        remote: &Project,
        options: &MergeOptions,
        conflicts: &mut Vec<ProjectConflict>,
    ) -> Pick {
        if local.last_modified == remote.last_modified {
            return Pick::Local;
        }

        if self.tracker.has_recent_change(&local.id) {
            // A marked edit that the remote has not seen yet still has to go up.
            if local.last_modified > remote.last_modified {
                return Pick::Push;
            }
            debug!("Suppressing remote echo for project {}", local.id);
            return Pick::Local;
        }

        if local.last_modified.abs_diff(&remote.last_modified) <= self.config.conflict_tolerance_ms {
            return if remote.last_modified > local.last_modified {
                Pick::Remote
            } else {
                Pick::Local
            };
        }

        let conflict = ProjectConflict::new(local.clone(), remote.clone());
        let resolution = if options.auto_resolve {
            options.strategy.resolve(&conflict)
        } else {
            None
        };

        match resolution {
            Some(Resolution::UseLocal) => Pick::Push,
            Some(Resolution::UseRemote) => Pick::Remote,
            None => {
                debug!(
                    "Conflict on project {} left for manual resolution ({})",
                    local.id,
                    options.strategy.name()
                );
                conflicts.push(conflict);
                // Keep the local version until the user decides.
                Pick::Local
            }
        }
    }

    async fn upload_all(&self, owner: &UserId, projects: Vec<Project>, errors: &mut Vec<SyncIssue>) {
        if projects.is_empty() {
            return;
        }
        let uploads = projects.iter().map(|p| self.remote.put_project(owner, p));
        let results = futures::future::join_all(uploads).await;
        for (project, result) in projects.iter().zip(results) {
            if let Err(e) = result {
                warn!("Failed to upload project {}: {}", project.id, e);
                errors.push(SyncIssue::new(Some(project.id), &e));
            }
        }
    }

    // ── Conflict resolution ──────────────────────────────────────

    /// Applies a user decision and persists the chosen version.
    ///
    /// The chosen version is re-stamped past both sides so later
    /// newest-wins merges keep it. Resolutions of different projects run
    /// concurrently; resolutions of the same project are serialized.
    pub async fn resolve_conflict(
        &self,
        owner: &UserId,
        conflict: &ProjectConflict,
        resolution: Resolution,
    ) -> SyncResult<Project> {
        let lock = self.project_lock(conflict.project_id);
        let result = {
            let _guard = lock.lock().await;

            let mut chosen = resolution.select(conflict).clone();
            let newest = conflict
                .local_version
                .last_modified
                .max(conflict.remote_version.last_modified);
            chosen.last_modified = newest.tick();

            self.tracker.add_recent_change(chosen.id);
            self.remote.put_project(owner, &chosen).await.map(|()| chosen)
        };
        self.release_project_lock(conflict.project_id, lock);

        match &result {
            Ok(_) => info!("Resolved conflict on project {} with {:?}", conflict.project_id, resolution),
            Err(e) => warn!("Failed to resolve conflict on project {}: {}", conflict.project_id, e),
        }
        result
    }

    fn project_lock(&self, id: ProjectId) -> Arc<tokio::sync::Mutex<()>> {
        self.resolving
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id)
            .or_default()
            .clone()
    }

    fn release_project_lock(&self, id: ProjectId, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self.resolving.lock().unwrap_or_else(PoisonError::into_inner);
        // Map entry plus ours: nobody else is waiting.
        if Arc::strong_count(&lock) <= 2 {
            locks.remove(&id);
        }
    }

    // ── Single-project push ──────────────────────────────────────

    /// Pushes one project, retrying transient failures.
    ///
    /// Makes at most `max_retries` attempts (at least one), calling
    /// `on_retry(retry, max_retries)` before each retry and backing off
    /// exponentially between attempts. Authorization and validation failures
    /// stop immediately. Returns whether the push succeeded.
    pub async fn sync_project_with_retry<F>(
        &self,
        owner: &UserId,
        project: &Project,
        max_retries: u32,
        mut on_retry: F,
    ) -> bool
    where
        F: FnMut(u32, u32) + Send,
    {
        let attempts = max_retries.max(1);

        for attempt in 1..=attempts {
            match self.remote.put_project(owner, project).await {
                Ok(()) => {
                    if attempt > 1 {
                        info!("Project {} synced after {} attempts", project.id, attempt);
                    }
                    return true;
                }
                Err(e) if !e.is_retryable() => {
                    warn!("Project {} sync failed permanently: {}", project.id, e);
                    self.tracker
                        .set_error(Some(format!("Sync failed for project {}: {e}", project.id)));
                    return false;
                }
                Err(e) if attempt == attempts => {
                    warn!(
                        "Project {} sync failed after {} attempts: {}",
                        project.id, attempts, e
                    );
                    self.tracker
                        .set_error(Some(format!("Sync failed for project {}: {e}", project.id)));
                    return false;
                }
                Err(e) => {
                    let delay = self.config.retry_delay(attempt);
                    warn!(
                        "Project {} sync attempt {}/{} failed, retrying in {:?}: {}",
                        project.id, attempt, attempts, delay, e
                    );
                    on_retry(attempt, attempts);
                    tokio::time::sleep(delay).await;
                }
            }
        }

        false
    }

    // ── Remote push notifications ────────────────────────────────

    /// Decides whether a pushed remote document should replace `local`.
    ///
    /// Returns `None` for echoes of our own writes and for versions that are
    /// not newer than what we have.
    pub fn reconcile_remote_change(
        &self,
        local: Option<&Project>,
        document: &RemoteDocument,
    ) -> SyncResult<Option<Project>> {
        let incoming = document.decode()?;

        if self.tracker.has_recent_change(&incoming.id) {
            debug!("Ignoring echo of local write to project {}", incoming.id);
            return Ok(None);
        }

        match local {
            Some(current) if current.last_modified >= incoming.last_modified => Ok(None),
            _ => Ok(Some(incoming)),
        }
    }
}

/// Decodes remote documents, keeping the newest per id.
fn decode_documents(
    documents: Vec<RemoteDocument>,
    errors: &mut Vec<SyncIssue>,
) -> (HashMap<ProjectId, Project>, Vec<ProjectId>) {
    let mut valid = Vec::with_capacity(documents.len());
    for doc in documents {
        match doc.decode() {
            Ok(project) => valid.push(project),
            Err(e) => {
                warn!("Skipping malformed remote document {}: {}", doc.id, e);
                errors.push(SyncIssue::new(ProjectId::parse(&doc.id).ok(), &e));
            }
        }
    }
    index_newest(valid)
}

/// Indexes projects by id, keeping the newest duplicate and first-seen order.
fn index_newest(
    projects: impl IntoIterator<Item = Project>,
) -> (HashMap<ProjectId, Project>, Vec<ProjectId>) {
    let mut by_id = HashMap::new();
    let mut order = Vec::new();
    let mut seen = HashSet::new();

    for project in projects {
        if seen.insert(project.id) {
            order.push(project.id);
        }
        match by_id.entry(project.id) {
            Entry::Vacant(slot) => {
                slot.insert(project);
            }
            Entry::Occupied(mut slot) => {
                if project.last_modified > slot.get().last_modified {
                    slot.insert(project);
                }
            }
        }
    }

    (by_id, order)
}
