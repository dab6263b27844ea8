//! Offline-first sync engine for StitchSync.
//!
//! Keeps a device-local project collection consistent with a remote,
//! per-user document store while the device moves between online and
//! offline and between signed-out, guest and signed-in sessions.
//!
//! # Architecture
//!
//! Local edits are applied to the project store first and pushed later.
//! When both sides changed, versions are compared by `last_modified`;
//! the newest wins automatically unless the caller asks for manual review.
//!
//! ## Components
//!
//! - **Network**: [`NetworkMonitor`] tracks connectivity and notifies on transitions
//! - **Tracker**: [`LocalChangeTracker`] holds busy/error flags and echo markers
//! - **Coordinator**: [`SyncCoordinator`] merges collections and pushes winners
//! - **Lifecycle**: [`AuthLifecycleController`] drives load/clear/sync from identity changes
//! - **Remote**: [`RemoteStore`] abstracts the document store (HTTP or in-memory)
//! - **Store**: [`ProjectStore`] is the boundary to the UI's project collection
//!
//! ## Sync Process
//!
//! 1. **Identity**: a sign-in loads the user's cached projects
//! 2. **Connectivity**: offline syncs wait briefly, then defer
//! 3. **Merge**: local and remote collections are merged per project id
//! 4. **Push**: versions kept from the local side are uploaded
//! 5. **Apply**: the merged collection replaces the store's contents
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use stitchsync_sync::{
//!     AuthLifecycleController, IdentityChannel, InMemoryProjectStore, LocalChangeTracker,
//!     MemoryRemoteStore, NetworkMonitor, SyncConfig, SyncCoordinator,
//! };
//! use stitchsync_types::AuthIdentity;
//!
//! let config = SyncConfig::default();
//! let tracker = Arc::new(LocalChangeTracker::new(config.recent_change_ttl));
//! let coordinator = Arc::new(SyncCoordinator::new(
//!     Arc::new(MemoryRemoteStore::new()),
//!     tracker,
//!     config,
//! ));
//!
//! let controller = AuthLifecycleController::new(
//!     Arc::new(InMemoryProjectStore::new()),
//!     coordinator,
//!     Arc::new(NetworkMonitor::new(true)),
//!     Arc::new(IdentityChannel::new(AuthIdentity::None)),
//! );
//! assert!(!controller.is_syncing());
//! ```

pub mod config;
pub mod coordinator;
mod error;
pub mod identity;
pub mod lifecycle;
pub mod network;
pub mod remote;
pub mod store;
pub mod strategy;
mod subscription;
pub mod tracker;

pub use config::{NetworkConfig, SyncConfig};
pub use coordinator::{SyncCoordinator, SyncReport};
pub use error::{ErrorKind, SyncError, SyncIssue, SyncResult};
pub use identity::{IdentityChannel, IdentitySource};
pub use lifecycle::{AuthLifecycleController, SessionState};
pub use network::{ConnectivityProbe, NetworkMonitor};
pub use remote::{
    FailureMode, HttpConnectivityProbe, HttpRemoteConfig, HttpRemoteStore, MemoryRemoteStore,
    RemoteDocument, RemoteStore,
};
pub use store::{InMemoryProjectStore, ProjectStore};
pub use strategy::{
    ConflictStrategy, ManualOnly, MergeOptions, NewestWins, ProjectConflict, Resolution,
    TimestampComparison,
};
pub use subscription::Subscription;
pub use tracker::{LocalChangeTracker, StatusSnapshot};
