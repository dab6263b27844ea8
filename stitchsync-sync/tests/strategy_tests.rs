use pretty_assertions::assert_eq;
use std::time::Duration;
use stitchsync_sync::{
    ConflictStrategy, ManualOnly, MergeOptions, NewestWins, ProjectConflict, Resolution,
    SyncConfig, TimestampComparison,
};
use stitchsync_types::{Project, ProjectId, Timestamp};

fn pair(local_ms: u64, remote_ms: u64) -> ProjectConflict {
    let id = ProjectId::new();
    ProjectConflict::new(
        Project::with_timestamp(id, "Local", Timestamp::from_millis(local_ms)),
        Project::with_timestamp(id, "Remote", Timestamp::from_millis(remote_ms)),
    )
}

// ── Conflicts ────────────────────────────────────────────────────

#[test]
fn comparison_follows_timestamps() {
    assert_eq!(pair(200, 100).comparison, TimestampComparison::LocalNewer);
    assert_eq!(pair(100, 200).comparison, TimestampComparison::RemoteNewer);
    assert_eq!(pair(100, 100).comparison, TimestampComparison::LocalNewer);
}

#[test]
fn resolution_selects_version() {
    let conflict = pair(100, 200);
    assert_eq!(Resolution::UseLocal.select(&conflict).name, "Local");
    assert_eq!(Resolution::UseRemote.select(&conflict).name, "Remote");
}

#[test]
fn conflict_serializes_with_snake_case_comparison() {
    let json = serde_json::to_value(pair(100, 200)).unwrap();
    assert_eq!(json["comparison"], "remote_newer");
    assert_eq!(json["local_version"]["lastModified"], 100);
}

// ── Strategies ───────────────────────────────────────────────────

#[test]
fn newest_wins_picks_newer_side() {
    assert_eq!(NewestWins.resolve(&pair(200, 100)), Some(Resolution::UseLocal));
    assert_eq!(NewestWins.resolve(&pair(100, 200)), Some(Resolution::UseRemote));
    assert_eq!(NewestWins.name(), "newest_wins");
}

#[test]
fn manual_only_never_resolves() {
    assert_eq!(ManualOnly.resolve(&pair(200, 100)), None);
    assert_eq!(ManualOnly.name(), "manual_only");
}

#[test]
fn merge_option_presets() {
    assert!(MergeOptions::default().auto_resolve);
    assert!(MergeOptions::newest_wins().auto_resolve);
    assert!(!MergeOptions::manual().auto_resolve);
}

// ── Config ───────────────────────────────────────────────────────

#[test]
fn config_defaults() {
    let config = SyncConfig::default();
    assert_eq!(config.recent_change_ttl, Duration::from_secs(5));
    assert_eq!(config.heartbeat_interval, Duration::from_secs(30));
    assert_eq!(config.conflict_tolerance_ms, 0);
    assert_eq!(config.max_sync_retries, 3);
}

#[test]
fn retry_delay_doubles_and_caps() {
    let config = SyncConfig::default();
    assert_eq!(config.retry_delay(1), Duration::from_millis(500));
    assert_eq!(config.retry_delay(2), Duration::from_secs(1));
    assert_eq!(config.retry_delay(3), Duration::from_secs(2));
    assert_eq!(config.retry_delay(10), Duration::from_secs(8));
    assert_eq!(config.retry_delay(64), Duration::from_secs(8));
}

#[test]
fn config_deserializes_partial_json() {
    let config: SyncConfig =
        serde_json::from_str(r#"{ "max_sync_retries": 5, "conflict_tolerance_ms": 250 }"#).unwrap();
    assert_eq!(config.max_sync_retries, 5);
    assert_eq!(config.conflict_tolerance_ms, 250);
    assert_eq!(config.recent_change_ttl, Duration::from_secs(5));
}
