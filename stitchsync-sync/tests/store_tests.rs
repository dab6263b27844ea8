use pretty_assertions::assert_eq;
use stitchsync_sync::{InMemoryProjectStore, ProjectStore};
use stitchsync_types::{Project, User, UserId};

#[tokio::test]
async fn user_load_replaces_collection_with_cache() {
    let cached = Project::new("Cardigan");
    let store = InMemoryProjectStore::new().with_user_cache("alice", vec![cached.clone()]);

    store.load_user_projects(&User::new("alice")).await.unwrap();

    assert_eq!(store.projects(), vec![cached]);
    assert_eq!(store.active_user(), Some(UserId::new("alice")));
    assert_eq!(store.current_project(), None);
}

#[tokio::test]
async fn guest_mode_seeds_demo_project_once() {
    let store = InMemoryProjectStore::new();

    store.load_local_projects().await.unwrap();
    let first = store.projects();
    assert_eq!(first.len(), 1);
    assert!(first[0].name.starts_with("Example"));
    assert!(store.is_guest());

    store.clear_user_data().await.unwrap();
    store.load_local_projects().await.unwrap();
    assert_eq!(store.projects(), first);
}

#[tokio::test]
async fn guest_cache_is_used_when_present() {
    let mine = Project::new("Mittens");
    let store = InMemoryProjectStore::new().with_guest_cache(vec![mine.clone()]);

    store.load_local_projects().await.unwrap();

    assert_eq!(store.projects(), vec![mine]);
}

#[tokio::test]
async fn set_projects_writes_through_to_active_cache() {
    let store = InMemoryProjectStore::new();
    store.load_user_projects(&User::new("bob")).await.unwrap();
    let p = Project::new("Scarf");

    store.set_projects(vec![p.clone()]);

    assert_eq!(store.cached_for(&UserId::new("bob")), vec![p]);
}

#[tokio::test]
async fn clear_empties_memory_but_keeps_device_cache() {
    let p = Project::new("Hat");
    let store = InMemoryProjectStore::new().with_user_cache("carol", vec![p.clone()]);
    store.load_user_projects(&User::new("carol")).await.unwrap();
    store.set_current_project(Some(p.clone()));

    store.clear_user_data().await.unwrap();

    assert!(store.projects().is_empty());
    assert_eq!(store.current_project(), None);
    assert_eq!(store.active_user(), None);
    assert_eq!(store.cached_for(&UserId::new("carol")), vec![p]);
}

#[tokio::test]
async fn writes_while_signed_out_do_not_leak_into_caches() {
    let store = InMemoryProjectStore::new();
    store.set_projects(vec![Project::new("Orphan")]);

    store.load_user_projects(&User::new("dave")).await.unwrap();
    assert!(store.projects().is_empty());
}
