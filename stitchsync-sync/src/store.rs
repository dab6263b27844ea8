//! The project store boundary.
//!
//! The store owns the canonical in-memory project collection the UI renders.
//! The engine reads and writes it through [`ProjectStore`] but never owns
//! its persistence.

use crate::error::SyncResult;
use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use stitchsync_types::{Project, User, UserId};
use tracing::debug;

/// Collaborator owning the in-memory project collection.
#[async_trait]
pub trait ProjectStore: Send + Sync {
    /// Loads the cached projects of a signed-in user.
    async fn load_user_projects(&self, user: &User) -> SyncResult<()>;

    /// Loads guest-mode projects from the local cache.
    async fn load_local_projects(&self) -> SyncResult<()>;

    /// Drops the active user's data from memory.
    async fn clear_user_data(&self) -> SyncResult<()>;

    fn projects(&self) -> Vec<Project>;

    fn set_projects(&self, projects: Vec<Project>);

    fn current_project(&self) -> Option<Project>;

    fn set_current_project(&self, project: Option<Project>);
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Scope {
    Empty,
    Guest,
    User(UserId),
}

#[derive(Debug)]
struct Inner {
    scope: Scope,
    projects: Vec<Project>,
    current: Option<Project>,
    user_caches: HashMap<UserId, Vec<Project>>,
    guest_cache: Vec<Project>,
}

/// Reference store keeping per-user and guest caches in memory.
#[derive(Debug)]
pub struct InMemoryProjectStore {
    inner: Mutex<Inner>,
}

impl InMemoryProjectStore {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                scope: Scope::Empty,
                projects: Vec::new(),
                current: None,
                user_caches: HashMap::new(),
                guest_cache: Vec::new(),
            }),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Pre-populates a user's device cache.
    pub fn with_user_cache(self, user: impl Into<UserId>, projects: Vec<Project>) -> Self {
        self.lock().user_caches.insert(user.into(), projects);
        self
    }

    /// Pre-populates the guest cache.
    pub fn with_guest_cache(self, projects: Vec<Project>) -> Self {
        self.lock().guest_cache = projects;
        self
    }

    /// Cached projects for `user`, whether or not they are active.
    pub fn cached_for(&self, user: &UserId) -> Vec<Project> {
        self.lock().user_caches.get(user).cloned().unwrap_or_default()
    }

    /// The active user, if a user's projects are loaded.
    pub fn active_user(&self) -> Option<UserId> {
        match &self.lock().scope {
            Scope::User(id) => Some(id.clone()),
            _ => None,
        }
    }

    /// Whether guest projects are loaded.
    pub fn is_guest(&self) -> bool {
        self.lock().scope == Scope::Guest
    }
}

impl Default for InMemoryProjectStore {
    fn default() -> Self {
        Self::new()
    }
}

fn demo_project() -> Project {
    Project::new("Example: Granny Square").with_content(json!({
        "yarns": [{ "name": "Cream", "weight": "worsted" }],
        "rounds": [
            { "number": 1, "instructions": "ch 4, join; 3 dc, ch 2 x4" },
            { "number": 2, "instructions": "sl st to corner; (3 dc, ch 2, 3 dc) in each corner" }
        ]
    }))
}

#[async_trait]
impl ProjectStore for InMemoryProjectStore {
    async fn load_user_projects(&self, user: &User) -> SyncResult<()> {
        let mut inner = self.lock();
        let cached = inner.user_caches.get(&user.id).cloned().unwrap_or_default();
        debug!("Loaded {} cached projects for {}", cached.len(), user.id);
        inner.scope = Scope::User(user.id.clone());
        inner.projects = cached;
        inner.current = None;
        Ok(())
    }

    async fn load_local_projects(&self) -> SyncResult<()> {
        let mut inner = self.lock();
        if inner.guest_cache.is_empty() {
            debug!("Seeding demo project for guest mode");
            inner.guest_cache.push(demo_project());
        }
        inner.scope = Scope::Guest;
        inner.projects = inner.guest_cache.clone();
        inner.current = None;
        Ok(())
    }

    async fn clear_user_data(&self) -> SyncResult<()> {
        let mut inner = self.lock();
        inner.scope = Scope::Empty;
        inner.projects.clear();
        inner.current = None;
        Ok(())
    }

    fn projects(&self) -> Vec<Project> {
        self.lock().projects.clone()
    }

    fn set_projects(&self, projects: Vec<Project>) {
        let mut inner = self.lock();
        match inner.scope.clone() {
            Scope::User(id) => {
                inner.user_caches.insert(id, projects.clone());
            }
            Scope::Guest => inner.guest_cache = projects.clone(),
            Scope::Empty => {}
        }
        inner.projects = projects;
    }

    fn current_project(&self) -> Option<Project> {
        self.lock().current.clone()
    }

    fn set_current_project(&self, project: Option<Project>) {
        self.lock().current = project;
    }
}
