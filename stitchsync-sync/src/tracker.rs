//! Busy/error flags and recent-local-change markers.
//!
//! One `LocalChangeTracker` is shared (behind an `Arc`) by every component
//! that touches the project store. The UI reads it through
//! [`LocalChangeTracker::snapshot`]; writes go through the scoped wrappers
//! [`run_with_loading`](LocalChangeTracker::run_with_loading) and
//! [`run_with_local_update`](LocalChangeTracker::run_with_local_update), which
//! reset their flag on every exit path, including cancellation.
//!
//! Recent-change markers are a race mitigation, not a lock: a marker for id X
//! means a remote version of X seen within the TTL is probably the echo of our
//! own write. A round-trip slower than the TTL, or clock skew between devices,
//! can still surface an echo as a conflict.

use crate::error::SyncResult;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use stitchsync_types::{ProjectId, Timestamp};
use tokio::time::Instant;
use tracing::{debug, error};

/// Read-only view of the tracker for status display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusSnapshot {
    pub loading: bool,
    pub locally_updating: bool,
    pub syncing: bool,
    pub error: Option<String>,
    pub last_local_update: Option<Timestamp>,
    pub last_sync_time: Option<Timestamp>,
}

#[derive(Debug, Default)]
struct TrackerState {
    status: StatusSnapshot,
    recent: HashMap<ProjectId, Instant>,
}

#[derive(Debug, Clone, Copy)]
enum Flag {
    Loading,
    LocallyUpdating,
    Syncing,
}

/// Resets a flag when dropped.
pub(crate) struct FlagGuard<'a> {
    tracker: &'a LocalChangeTracker,
    flag: Flag,
}

impl Drop for FlagGuard<'_> {
    fn drop(&mut self) {
        self.tracker.set_flag(self.flag, false);
    }
}

/// Shared busy/error state plus the echo-suppression window.
#[derive(Debug)]
pub struct LocalChangeTracker {
    ttl: Duration,
    state: Mutex<TrackerState>,
}

impl LocalChangeTracker {
    /// Creates a tracker whose markers live for `ttl`.
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            state: Mutex::new(TrackerState::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_flag(&self, flag: Flag, value: bool) {
        let mut state = self.lock();
        match flag {
            Flag::Loading => state.status.loading = value,
            Flag::LocallyUpdating => state.status.locally_updating = value,
            Flag::Syncing => state.status.syncing = value,
        }
    }

    fn raise(&self, flag: Flag) -> FlagGuard<'_> {
        self.set_flag(flag, true);
        FlagGuard {
            tracker: self,
            flag,
        }
    }

    // ── Flags ────────────────────────────────────────────────────

    pub fn set_loading(&self, loading: bool) {
        self.set_flag(Flag::Loading, loading);
    }

    pub fn set_locally_updating(&self, updating: bool) {
        self.set_flag(Flag::LocallyUpdating, updating);
    }

    /// Sets or clears the user-visible error.
    pub fn set_error(&self, message: Option<String>) {
        self.lock().status.error = message;
    }

    /// Dismisses the current error.
    pub fn clear_error(&self) {
        self.set_error(None);
    }

    pub fn is_loading(&self) -> bool {
        self.lock().status.loading
    }

    pub fn is_locally_updating(&self) -> bool {
        self.lock().status.locally_updating
    }

    pub fn is_syncing(&self) -> bool {
        self.lock().status.syncing
    }

    /// True while any network-bound or local-then-sync operation runs.
    pub fn is_system_busy(&self) -> bool {
        let state = self.lock();
        state.status.loading || state.status.locally_updating
    }

    pub fn error(&self) -> Option<String> {
        self.lock().status.error.clone()
    }

    pub fn last_sync_time(&self) -> Option<Timestamp> {
        self.lock().status.last_sync_time
    }

    pub fn last_local_update(&self) -> Option<Timestamp> {
        self.lock().status.last_local_update
    }

    /// Copies the current status.
    pub fn snapshot(&self) -> StatusSnapshot {
        self.lock().status.clone()
    }

    pub(crate) fn begin_sync(&self) -> FlagGuard<'_> {
        self.raise(Flag::Syncing)
    }

    pub(crate) fn mark_synced(&self, at: Timestamp) {
        self.lock().status.last_sync_time = Some(at);
    }

    // ── Recent local changes ─────────────────────────────────────

    /// Marks `id` as locally changed for the next TTL window.
    pub fn add_recent_change(&self, id: ProjectId) {
        self.lock().recent.insert(id, Instant::now() + self.ttl);
    }

    /// Whether `id` has an unexpired marker. Expired markers are dropped.
    pub fn has_recent_change(&self, id: &ProjectId) -> bool {
        let mut state = self.lock();
        match state.recent.get(id) {
            Some(expires_at) if Instant::now() < *expires_at => true,
            Some(_) => {
                state.recent.remove(id);
                false
            }
            None => false,
        }
    }

    pub fn remove_recent_change(&self, id: &ProjectId) {
        self.lock().recent.remove(id);
    }

    pub fn clear_all_recent_changes(&self) {
        self.lock().recent.clear();
    }

    /// Number of unexpired markers.
    pub fn recent_change_count(&self) -> usize {
        let now = Instant::now();
        let mut state = self.lock();
        state.recent.retain(|_, expires_at| now < *expires_at);
        state.recent.len()
    }

    // ── Scoped wrappers ──────────────────────────────────────────

    /// Runs `operation` with `loading` raised.
    ///
    /// Failures are stored as `"{context}: {message}"` and yield `None`.
    pub async fn run_with_loading<T, F>(&self, context: &str, operation: F) -> Option<T>
    where
        F: Future<Output = SyncResult<T>>,
    {
        let _guard = self.raise(Flag::Loading);
        self.clear_error();
        match operation.await {
            Ok(value) => Some(value),
            Err(e) => {
                error!("{}: {}", context, e);
                self.set_error(Some(format!("{context}: {e}")));
                None
            }
        }
    }

    /// Runs a local write for `project_id` with `locally_updating` raised.
    ///
    /// The echo marker is registered before the write starts so that a remote
    /// echo racing the write is already suppressed, and refreshed on success.
    pub async fn run_with_local_update<T, F>(
        &self,
        context: &str,
        project_id: ProjectId,
        operation: F,
    ) -> Option<T>
    where
        F: Future<Output = SyncResult<T>>,
    {
        let _guard = self.raise(Flag::LocallyUpdating);
        self.clear_error();
        self.add_recent_change(project_id);
        match operation.await {
            Ok(value) => {
                let mut state = self.lock();
                state.status.last_local_update = Some(Timestamp::now());
                state.recent.insert(project_id, Instant::now() + self.ttl);
                drop(state);
                debug!("Local update applied for project {}", project_id);
                Some(value)
            }
            Err(e) => {
                error!("{}: {}", context, e);
                self.set_error(Some(format!("{context}: {e}")));
                None
            }
        }
    }

    /// Runs a synchronous store write that came from sync rather than from
    /// an edit, with `locally_updating` raised.
    ///
    /// Markers and the error slot are left alone; failures of the sync that
    /// produced the data are reported by the sync itself.
    pub fn with_store_write<T>(&self, write: impl FnOnce() -> T) -> T {
        let _guard = self.raise(Flag::LocallyUpdating);
        write()
    }
}

impl Default for LocalChangeTracker {
    fn default() -> Self {
        Self::new(Duration::from_secs(5))
    }
}
