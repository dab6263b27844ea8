//! Auth lifecycle controller driving load, clear and sync from identity changes.
//!
//! The controller is an explicit state machine over [`SessionState`].
//! Identity transitions are serialized by the session lock, so a user switch
//! always finishes the previous user's logout before the next user's load
//! starts. Full syncs run outside the session lock and at most one is in
//! flight. A caller arriving meanwhile waits for it and shares its outcome
//! when it ran for the same user; otherwise it runs its own sync afterwards.
//!
//! The local snapshot a sync merges, and every write of its results into the
//! project store, happen while the active-user slot is locked and still names
//! the user the sync ran for, so a sync that outlived its session neither
//! reads nor writes the next user's data.
//!
//! Edits go through [`LocalChangeTracker::run_with_local_update`]. Writes of
//! merge results, resolved conflicts and pushed remote changes are
//! synchronous and go through [`LocalChangeTracker::with_store_write`]
//! instead; their errors surface through the sync that produced them.

use crate::config::SyncConfig;
use crate::coordinator::SyncCoordinator;
use crate::error::SyncError;
use crate::identity::IdentitySource;
use crate::network::NetworkMonitor;
use crate::remote::RemoteDocument;
use crate::store::ProjectStore;
use crate::strategy::{MergeOptions, ProjectConflict, Resolution};
use crate::subscription::Subscription;
use crate::tracker::{LocalChangeTracker, StatusSnapshot};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use stitchsync_types::{AuthIdentity, Project, ProjectId, Timestamp, User, UserId};
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

const OFFLINE_MESSAGE: &str =
    "Sync failed: no network connection. Changes are kept on this device.";
const LOCAL_ONLY_MESSAGE: &str =
    "Sync disabled: permission denied by the server. Working in local-only mode.";

/// Session states the controller moves between.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Unauthenticated,
    Guest,
    Authenticated(User),
}

impl SessionState {
    pub fn user(&self) -> Option<&User> {
        match self {
            SessionState::Authenticated(user) => Some(user),
            _ => None,
        }
    }
}

type ActiveUser = Arc<Mutex<Option<UserId>>>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Replaces or inserts `project` by id; tombstones remove it.
fn upsert(projects: &mut Vec<Project>, project: Project) {
    let existing = projects.iter().position(|p| p.id == project.id);
    match (existing, project.deleted) {
        (Some(i), true) => {
            projects.remove(i);
        }
        (Some(i), false) => projects[i] = project,
        (None, true) => {}
        (None, false) => projects.push(project),
    }
}

/// Points the current selection at the refreshed copy of the same project,
/// falling back to the first project.
fn reselect(store: &dyn ProjectStore, projects: &[Project]) {
    let current_id = store.current_project().map(|p| p.id);
    let next = current_id
        .and_then(|id| projects.iter().find(|p| p.id == id))
        .or_else(|| projects.first())
        .cloned();
    store.set_current_project(next);
}

/// Drives the project store from identity transitions.
pub struct AuthLifecycleController {
    store: Arc<dyn ProjectStore>,
    coordinator: Arc<SyncCoordinator>,
    network: Arc<NetworkMonitor>,
    identity: Arc<dyn IdentitySource>,
    tracker: Arc<LocalChangeTracker>,
    config: SyncConfig,
    session: tokio::sync::Mutex<SessionState>,
    active_user: ActiveUser,
    local_only: AtomicBool,
    sync_gate: tokio::sync::Mutex<()>,
    last_sync: Mutex<Option<(UserId, bool)>>,
    last_heartbeat: Mutex<Option<Instant>>,
    remote_watch: Mutex<Option<Subscription>>,
    listeners: Mutex<Vec<Subscription>>,
}

impl AuthLifecycleController {
    pub fn new(
        store: Arc<dyn ProjectStore>,
        coordinator: Arc<SyncCoordinator>,
        network: Arc<NetworkMonitor>,
        identity: Arc<dyn IdentitySource>,
    ) -> Self {
        let tracker = coordinator.tracker().clone();
        let config = coordinator.config().clone();
        Self {
            store,
            coordinator,
            network,
            identity,
            tracker,
            config,
            session: tokio::sync::Mutex::new(SessionState::Unauthenticated),
            active_user: Arc::new(Mutex::new(None)),
            local_only: AtomicBool::new(false),
            sync_gate: tokio::sync::Mutex::new(()),
            last_sync: Mutex::new(None),
            last_heartbeat: Mutex::new(None),
            remote_watch: Mutex::new(None),
            listeners: Mutex::new(Vec::new()),
        }
    }

    // ── Status ───────────────────────────────────────────────────

    pub async fn session(&self) -> SessionState {
        self.session.lock().await.clone()
    }

    pub fn status(&self) -> StatusSnapshot {
        self.tracker.snapshot()
    }

    pub fn is_syncing(&self) -> bool {
        self.tracker.is_syncing()
    }

    pub fn is_locally_updating(&self) -> bool {
        self.tracker.is_locally_updating()
    }

    pub fn last_sync_time(&self) -> Option<Timestamp> {
        self.tracker.last_sync_time()
    }

    pub fn error(&self) -> Option<String> {
        self.tracker.error()
    }

    /// Whether remote sync was disabled after an authorization failure.
    pub fn is_local_only(&self) -> bool {
        self.local_only.load(Ordering::SeqCst)
    }

    fn current_user(&self) -> Option<UserId> {
        lock(&self.active_user).clone()
    }

    // ── Transitions ──────────────────────────────────────────────

    /// Reacts to the identity provider reporting `identity`.
    ///
    /// Repeated reports of the same state are ignored, except for an
    /// unchanged authenticated user, which is a heartbeat and triggers a full
    /// sync once `heartbeat_interval` has passed since the last one.
    pub async fn handle_identity(&self, identity: AuthIdentity) {
        let mut session = self.session.lock().await;

        let sync_for = match (session.clone(), identity) {
            (_, AuthIdentity::Switching) => {
                debug!("Identity switching, waiting for it to settle");
                None
            }
            (SessionState::Authenticated(current), AuthIdentity::Authenticated(next))
                if current.id == next.id =>
            {
                self.heartbeat_due().then_some(next)
            }
            (SessionState::Authenticated(current), AuthIdentity::Authenticated(next)) => {
                info!("User switched from {} to {}", current.id, next.id);
                self.logout(&current).await;
                let loaded = self.login(&next).await;
                *session = SessionState::Authenticated(next.clone());
                loaded.then_some(next)
            }
            (_, AuthIdentity::Authenticated(next)) => {
                self.cancel_remote_watch();
                let loaded = self.login(&next).await;
                *session = SessionState::Authenticated(next.clone());
                loaded.then_some(next)
            }
            (SessionState::Authenticated(current), AuthIdentity::None) => {
                self.logout(&current).await;
                *session = SessionState::Unauthenticated;
                None
            }
            (SessionState::Guest, AuthIdentity::None) => {
                info!("Leaving guest mode");
                self.cancel_remote_watch();
                self.tracker
                    .run_with_loading("Failed to clear projects", self.store.clear_user_data())
                    .await;
                *session = SessionState::Unauthenticated;
                None
            }
            (SessionState::Unauthenticated, AuthIdentity::None) => None,
            (SessionState::Guest, AuthIdentity::Guest) => None,
            (previous, AuthIdentity::Guest) => {
                if let SessionState::Authenticated(current) = &previous {
                    self.logout(current).await;
                }
                self.enter_guest_mode().await;
                *session = SessionState::Guest;
                None
            }
        };
        drop(session);

        if let Some(user) = sync_for {
            self.perform_cross_device_sync(&user).await;
        }
    }

    /// Loads `user`'s cached projects and starts the remote watch.
    ///
    /// Returns false when the load failed. The store is then reset to empty
    /// and the load error stays visible; no sync runs until the next
    /// heartbeat, so nothing left over from the previous state is merged
    /// into the user's remote.
    async fn login(&self, user: &User) -> bool {
        info!("Signing in {}", user.id);
        self.local_only.store(false, Ordering::SeqCst);
        *lock(&self.last_heartbeat) = None;

        let loaded = self
            .tracker
            .run_with_loading("Failed to load projects", self.store.load_user_projects(user))
            .await
            .is_some();
        if !loaded {
            warn!("Loading cached projects for {} failed, starting empty", user.id);
            if let Err(e) = self.store.clear_user_data().await {
                error!("Failed to reset project store after load failure: {}", e);
            }
        }

        *lock(&self.active_user) = Some(user.id.clone());
        self.start_remote_watch(&user.id).await;
        loaded
    }

    async fn logout(&self, user: &User) {
        info!("Signing out {}", user.id);
        self.cancel_remote_watch();
        *lock(&self.active_user) = None;
        self.tracker.clear_all_recent_changes();
        self.local_only.store(false, Ordering::SeqCst);
        self.tracker
            .run_with_loading("Failed to clear user data", self.store.clear_user_data())
            .await;
    }

    async fn enter_guest_mode(&self) {
        info!("Entering guest mode");
        self.cancel_remote_watch();
        self.tracker
            .run_with_loading("Failed to load local projects", self.store.load_local_projects())
            .await;
    }

    fn heartbeat_due(&self) -> bool {
        lock(&self.last_heartbeat)
            .is_none_or(|at| at.elapsed() >= self.config.heartbeat_interval)
    }

    // ── Remote change watch ──────────────────────────────────────

    async fn start_remote_watch(&self, owner: &UserId) {
        let receiver = match self.coordinator.remote().watch_projects(owner).await {
            Ok(Some(rx)) => rx,
            Ok(None) => {
                debug!("Remote store cannot push changes, relying on heartbeat sync");
                return;
            }
            Err(e) => {
                warn!("Failed to watch remote projects for {}: {}", owner, e);
                return;
            }
        };

        let handle = tokio::spawn(apply_remote_changes(
            receiver,
            owner.clone(),
            self.store.clone(),
            self.coordinator.clone(),
            self.active_user.clone(),
        ));

        if let Some(previous) = lock(&self.remote_watch).replace(Subscription::for_task(handle)) {
            previous.cancel();
        }
    }

    fn cancel_remote_watch(&self) {
        if let Some(watch) = lock(&self.remote_watch).take() {
            debug!("Cancelling remote change watch");
            watch.cancel();
        }
    }

    // ── Sync ─────────────────────────────────────────────────────

    /// Runs one full merge cycle for `user` and writes the result back.
    ///
    /// Returns whether the cycle completed without errors.
    pub async fn perform_cross_device_sync(&self, user: &User) -> bool {
        if self.is_local_only() {
            debug!("Local-only mode, skipping sync for {}", user.id);
            return false;
        }

        let _gate = match self.sync_gate.try_lock() {
            Ok(gate) => gate,
            Err(_) => {
                debug!("Sync already in flight, waiting for it first");
                let gate = self.sync_gate.lock().await;
                if let Some(ok) = self.last_outcome_for(&user.id) {
                    return ok;
                }
                debug!("Previous sync ran for another user, syncing {}", user.id);
                gate
            }
        };

        let _syncing = self.tracker.begin_sync();
        *lock(&self.last_heartbeat) = Some(Instant::now());

        let ok = self.sync_once(user).await;
        *lock(&self.last_sync) = Some((user.id.clone(), ok));
        ok
    }

    fn last_outcome_for(&self, user: &UserId) -> Option<bool> {
        lock(&self.last_sync)
            .as_ref()
            .filter(|(id, _)| id == user)
            .map(|(_, ok)| *ok)
    }

    async fn sync_once(&self, user: &User) -> bool {
        if !self.network.is_online() {
            info!("Offline, waiting up to {:?} before syncing", self.config.connection_wait_timeout);
            if !self
                .network
                .wait_for_connection(self.config.connection_wait_timeout)
                .await
            {
                warn!("Still offline, sync for {} deferred", user.id);
                self.tracker.set_error(Some(OFFLINE_MESSAGE.to_string()));
                return false;
            }
        }

        let local = {
            let active = lock(&self.active_user);
            if active.as_ref() != Some(&user.id) {
                info!("Session changed before sync started, skipping sync for {}", user.id);
                return false;
            }
            self.store.projects()
        };
        let report = match self
            .coordinator
            .merge_local_and_remote_data(&user.id, &local, &MergeOptions::newest_wins())
            .await
        {
            Ok(report) => report,
            Err(SyncError::Auth(msg)) => {
                error!("Remote store refused access for {}: {}", user.id, msg);
                self.local_only.store(true, Ordering::SeqCst);
                self.tracker.set_error(Some(LOCAL_ONLY_MESSAGE.to_string()));
                return false;
            }
            Err(e) => {
                error!("Cross-device sync failed for {}: {}", user.id, e);
                self.tracker
                    .set_error(Some(format!("Failed to sync projects across devices: {e}")));
                return false;
            }
        };

        {
            let active = lock(&self.active_user);
            if active.as_ref() != Some(&user.id) {
                info!("Session changed during sync, discarding results for {}", user.id);
                return false;
            }

            // Local edits made while the merge was running are newer than
            // the snapshot the merge saw.
            let mut merged = report.merged;
            for project in self.store.projects() {
                if !self.tracker.has_recent_change(&project.id) {
                    continue;
                }
                let stale = merged
                    .iter()
                    .find(|p| p.id == project.id)
                    .is_none_or(|p| p.last_modified < project.last_modified);
                if stale {
                    upsert(&mut merged, project);
                }
            }

            self.tracker.with_store_write(|| {
                self.store.set_projects(merged.clone());
                reselect(self.store.as_ref(), &merged);
            });
        }

        self.tracker.mark_synced(Timestamp::now());

        if report.success {
            self.tracker.clear_error();
        } else {
            warn!("Sync for {} finished with {} errors", user.id, report.errors.len());
            self.tracker.set_error(Some(format!(
                "Sync completed with {} project(s) that could not be synced",
                report.errors.len()
            )));
        }
        report.success
    }

    /// Manual sync trigger. Does nothing unless a user is signed in.
    pub async fn force_sync(&self) -> bool {
        let user = self.session.lock().await.user().cloned();
        match user {
            Some(user) => self.perform_cross_device_sync(&user).await,
            None => {
                debug!("Force sync ignored, nobody is signed in");
                false
            }
        }
    }

    /// Applies user decisions to `conflicts`, then runs a full sync.
    ///
    /// Conflicts without an entry in `resolutions` are skipped. Returns
    /// whether every supplied resolution was applied.
    pub async fn resolve_conflicts(
        &self,
        conflicts: &[ProjectConflict],
        resolutions: &HashMap<ProjectId, Resolution>,
    ) -> bool {
        let Some(user) = self.session.lock().await.user().cloned() else {
            self.tracker
                .set_error(Some("Sign in to resolve sync conflicts".to_string()));
            return false;
        };

        let pending = conflicts.iter().filter_map(|conflict| {
            resolutions
                .get(&conflict.project_id)
                .map(|resolution| self.coordinator.resolve_conflict(&user.id, conflict, *resolution))
        });
        let results = futures::future::join_all(pending).await;

        let mut all_applied = true;
        let mut chosen = Vec::new();
        for result in results {
            match result {
                Ok(project) => chosen.push(project),
                Err(e) => {
                    warn!("Conflict resolution failed: {}", e);
                    all_applied = false;
                }
            }
        }

        {
            let active = lock(&self.active_user);
            if active.as_ref() == Some(&user.id) && !chosen.is_empty() {
                self.tracker.with_store_write(|| {
                    let mut projects = self.store.projects();
                    for project in chosen {
                        upsert(&mut projects, project);
                    }
                    self.store.set_projects(projects.clone());
                    reselect(self.store.as_ref(), &projects);
                });
            }
        }

        self.perform_cross_device_sync(&user).await;

        if !all_applied {
            self.tracker
                .set_error(Some("Failed to resolve some sync conflicts".to_string()));
        }
        all_applied
    }

    /// Saves a local edit and pushes it when possible.
    ///
    /// The edit lands in the project store immediately; the push retries
    /// with backoff and, if it gives up, the next full sync uploads it.
    pub async fn save_project(&self, mut project: Project) -> Option<Project> {
        project.touch();
        let id = project.id;
        let store = self.store.clone();

        let saved = self
            .tracker
            .run_with_local_update("Failed to save project", id, async move {
                let mut projects = store.projects();
                upsert(&mut projects, project.clone());
                store.set_projects(projects);
                if store.current_project().is_some_and(|p| p.id == project.id) {
                    store.set_current_project((!project.deleted).then(|| project.clone()));
                }
                Ok(project)
            })
            .await?;

        let owner = self.current_user();
        if let Some(owner) = owner {
            if self.network.is_online() && !self.is_local_only() {
                self.coordinator
                    .sync_project_with_retry(&owner, &saved, self.config.max_sync_retries, |retry, max| {
                        debug!("Retrying push of project {} ({}/{})", id, retry, max);
                    })
                    .await;
            } else {
                debug!("Project {} saved locally, push deferred", id);
            }
        }

        Some(saved)
    }

    // ── Listener lifecycle ───────────────────────────────────────

    /// Starts reacting to identity and connectivity changes.
    ///
    /// Uses the identity source's push feed when it has one and polls it
    /// every `identity_poll_interval` otherwise. Cancelling the returned
    /// handle (or calling [`shutdown`](Self::shutdown)) stops both.
    pub fn setup_auth_state_listener(self: &Arc<Self>) -> Subscription {
        let weak = Arc::downgrade(self);
        let network_sub = self.network.subscribe(move |online| {
            if !online {
                return;
            }
            let Some(this) = weak.upgrade() else {
                return;
            };
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(async move {
                    debug!("Back online, flushing local changes");
                    this.force_sync().await;
                });
            }
        });

        let weak = Arc::downgrade(self);
        let task = match self.identity.watch() {
            Some(rx) => tokio::spawn(watch_identity(weak, rx, self.config.heartbeat_interval)),
            None => tokio::spawn(poll_identity(weak, self.config.identity_poll_interval)),
        };

        let subscription = network_sub.join(Subscription::for_task(task));
        lock(&self.listeners).push(subscription.clone());
        subscription
    }

    /// Cancels every listener, task and remote watch owned by the controller.
    pub fn shutdown(&self) {
        info!("Shutting down sync lifecycle");
        for listener in lock(&self.listeners).drain(..) {
            listener.cancel();
        }
        self.cancel_remote_watch();
    }
}

fn ticker(period: Duration) -> tokio::time::Interval {
    let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    ticker
}

async fn watch_identity(
    controller: Weak<AuthLifecycleController>,
    mut rx: tokio::sync::watch::Receiver<AuthIdentity>,
    heartbeat_interval: Duration,
) {
    let initial = rx.borrow_and_update().clone();
    match controller.upgrade() {
        Some(this) => this.handle_identity(initial).await,
        None => return,
    }

    let mut heartbeat = ticker(heartbeat_interval);
    heartbeat.tick().await;

    loop {
        let identity = tokio::select! {
            changed = rx.changed() => {
                if changed.is_err() {
                    debug!("Identity source closed");
                    break;
                }
                rx.borrow_and_update().clone()
            }
            _ = heartbeat.tick() => {
                rx.borrow().clone()
            }
        };
        let Some(this) = controller.upgrade() else {
            break;
        };
        this.handle_identity(identity).await;
    }
}

async fn poll_identity(controller: Weak<AuthLifecycleController>, interval: Duration) {
    let mut ticker = ticker(interval);
    loop {
        ticker.tick().await;
        let Some(this) = controller.upgrade() else {
            break;
        };
        let identity = this.identity.current();
        this.handle_identity(identity).await;
    }
}

async fn apply_remote_changes(
    mut receiver: mpsc::Receiver<RemoteDocument>,
    owner: UserId,
    store: Arc<dyn ProjectStore>,
    coordinator: Arc<SyncCoordinator>,
    active_user: ActiveUser,
) {
    while let Some(document) = receiver.recv().await {
        let local = store
            .projects()
            .into_iter()
            .find(|p| p.id.to_string() == document.id);

        let incoming = match coordinator.reconcile_remote_change(local.as_ref(), &document) {
            Ok(Some(project)) => project,
            Ok(None) => continue,
            Err(e) => {
                warn!("Ignoring malformed remote change {}: {}", document.id, e);
                continue;
            }
        };

        let active = lock(&active_user);
        if active.as_ref() != Some(&owner) {
            break;
        }
        debug!("Applying remote change to project {}", incoming.id);
        coordinator.tracker().with_store_write(|| {
            let mut projects = store.projects();
            upsert(&mut projects, incoming);
            store.set_projects(projects.clone());
            reselect(store.as_ref(), &projects);
        });
    }
}
