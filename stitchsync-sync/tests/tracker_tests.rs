use pretty_assertions::assert_eq;
use std::time::Duration;
use stitchsync_sync::{LocalChangeTracker, StatusSnapshot, SyncError};
use stitchsync_types::ProjectId;

fn tracker() -> LocalChangeTracker {
    LocalChangeTracker::new(Duration::from_secs(5))
}

// ── Flags ────────────────────────────────────────────────────────

#[test]
fn fresh_tracker_is_idle() {
    let t = tracker();
    assert_eq!(t.snapshot(), StatusSnapshot::default());
    assert!(!t.is_system_busy());
}

#[test]
fn busy_reflects_loading_or_local_update() {
    let t = tracker();
    t.set_loading(true);
    assert!(t.is_system_busy());
    t.set_loading(false);
    t.set_locally_updating(true);
    assert!(t.is_system_busy());
    t.set_locally_updating(false);
    assert!(!t.is_system_busy());
}

#[test]
fn error_can_be_set_and_cleared() {
    let t = tracker();
    t.set_error(Some("boom".into()));
    assert_eq!(t.error().as_deref(), Some("boom"));
    t.clear_error();
    assert_eq!(t.error(), None);
}

// ── Scoped wrappers ──────────────────────────────────────────────

#[tokio::test]
async fn run_with_loading_returns_value_and_resets_flag() {
    let t = tracker();
    t.set_error(Some("stale".into()));

    let value = t
        .run_with_loading("Failed to load", async { Ok::<_, SyncError>(7) })
        .await;

    assert_eq!(value, Some(7));
    assert!(!t.is_loading());
    assert_eq!(t.error(), None);
}

#[tokio::test]
async fn run_with_loading_records_prefixed_error() {
    let t = tracker();

    let value: Option<()> = t
        .run_with_loading("Failed to load projects", async {
            Err(SyncError::Storage("disk full".into()))
        })
        .await;

    assert_eq!(value, None);
    assert!(!t.is_loading());
    assert_eq!(
        t.error().as_deref(),
        Some("Failed to load projects: storage error: disk full")
    );
}

#[tokio::test]
async fn loading_flag_is_raised_while_running() {
    let t = tracker();
    let observed = t
        .run_with_loading("ctx", async { Ok::<_, SyncError>(t.is_loading()) })
        .await;
    assert_eq!(observed, Some(true));
}

#[tokio::test]
async fn run_with_local_update_marks_project_and_stamps_time() {
    let t = tracker();
    let id = ProjectId::new();

    let saw_marker = t
        .run_with_local_update("Failed to save", id, async {
            Ok::<_, SyncError>(t.has_recent_change(&id))
        })
        .await;

    assert_eq!(saw_marker, Some(true));
    assert!(t.has_recent_change(&id));
    assert!(t.last_local_update().is_some());
    assert!(!t.is_locally_updating());
}

#[tokio::test]
async fn run_with_local_update_failure_keeps_flag_clear() {
    let t = tracker();
    let id = ProjectId::new();

    let result: Option<()> = t
        .run_with_local_update("Failed to save project", id, async {
            Err(SyncError::Storage("locked".into()))
        })
        .await;

    assert_eq!(result, None);
    assert!(!t.is_locally_updating());
    assert_eq!(t.last_local_update(), None);
    assert!(t.error().unwrap().starts_with("Failed to save project:"));
}

#[tokio::test]
async fn cancelled_wrapper_resets_flag() {
    let t = tracker();
    {
        let pending = t.run_with_loading("ctx", std::future::pending::<Result<(), SyncError>>());
        tokio::pin!(pending);
        let _ = tokio::time::timeout(Duration::from_millis(5), &mut pending).await;
        assert!(t.is_loading());
    }
    assert!(!t.is_loading());
}

#[test]
fn store_write_raises_local_update_flag_without_markers() {
    let t = tracker();
    t.set_error(Some("Sync completed with 1 project(s) that could not be synced".into()));

    let seen = t.with_store_write(|| t.is_locally_updating());

    assert!(seen);
    assert!(!t.is_locally_updating());
    assert_eq!(t.recent_change_count(), 0);
    assert!(t.error().is_some());
}

// ── Recent-change markers ────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn marker_expires_after_ttl() {
    let t = tracker();
    let id = ProjectId::new();

    t.add_recent_change(id);
    tokio::time::advance(Duration::from_secs(4)).await;
    assert!(t.has_recent_change(&id));

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(!t.has_recent_change(&id));
    assert_eq!(t.recent_change_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn re_adding_marker_extends_window() {
    let t = tracker();
    let id = ProjectId::new();

    t.add_recent_change(id);
    tokio::time::advance(Duration::from_secs(4)).await;
    t.add_recent_change(id);
    tokio::time::advance(Duration::from_secs(4)).await;

    assert!(t.has_recent_change(&id));
}

#[test]
fn markers_can_be_removed_individually_or_all() {
    let t = tracker();
    let a = ProjectId::new();
    let b = ProjectId::new();

    t.add_recent_change(a);
    t.add_recent_change(b);
    assert_eq!(t.recent_change_count(), 2);

    t.remove_recent_change(&a);
    assert!(!t.has_recent_change(&a));
    assert!(t.has_recent_change(&b));

    t.clear_all_recent_changes();
    assert_eq!(t.recent_change_count(), 0);
}

#[test]
fn snapshot_serializes_for_status_display() {
    let t = tracker();
    t.set_error(Some("offline".into()));
    let json = serde_json::to_value(t.snapshot()).unwrap();
    assert_eq!(json["error"], "offline");
    assert_eq!(json["loading"], false);
}
