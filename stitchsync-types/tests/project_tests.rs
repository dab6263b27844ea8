use pretty_assertions::assert_eq;
use serde_json::json;
use stitchsync_types::{AuthIdentity, Error, Project, ProjectId, Timestamp, User};

fn sample() -> Project {
    Project::with_timestamp(ProjectId::new(), "Granny Square", Timestamp::from_millis(1_000))
        .with_content(json!({ "rounds": [{ "stitches": 12 }] }))
}

// ── Construction ─────────────────────────────────────────────────

#[test]
fn new_project_is_live_and_empty() {
    let p = Project::new("Socks");
    assert_eq!(p.name, "Socks");
    assert!(!p.deleted);
    assert_eq!(p.content, json!({}));
}

#[test]
fn touch_advances_last_modified() {
    let mut p = sample();
    let before = p.last_modified;
    p.touch();
    assert!(p.last_modified > before);
}

#[test]
fn mark_deleted_sets_tombstone_and_stamps() {
    let mut p = sample();
    let before = p.last_modified;
    p.mark_deleted();
    assert!(p.deleted);
    assert!(p.last_modified > before);
}

// ── Documents ────────────────────────────────────────────────────

#[test]
fn document_uses_camel_case() {
    let p = sample();
    let doc = p.to_document().unwrap();
    assert_eq!(doc["lastModified"], json!(1_000));
    assert_eq!(doc["id"], json!(p.id.to_string()));
    assert!(doc.get("deleted").is_none());
}

#[test]
fn document_roundtrip() {
    let p = sample();
    let doc = p.to_document().unwrap();
    let decoded = Project::from_document(&p.id.to_string(), doc).unwrap();
    assert_eq!(decoded, p);
}

#[test]
fn document_with_iso_timestamp_decodes() {
    let id = ProjectId::new();
    let doc = json!({
        "id": id.to_string(),
        "name": "Shawl",
        "lastModified": "2024-03-01T10:00:00Z",
    });
    let p = Project::from_document(&id.to_string(), doc).unwrap();
    assert_eq!(p.last_modified, Timestamp::from_millis(1_709_287_200_000));
    assert_eq!(p.content, serde_json::Value::Null);
}

#[test]
fn document_missing_fields_is_rejected() {
    let id = ProjectId::new();
    let err = Project::from_document(&id.to_string(), json!({ "id": id.to_string() }))
        .unwrap_err();
    assert!(matches!(err, Error::Serialization(_)));
}

#[test]
fn document_key_mismatch_is_rejected() {
    let p = sample();
    let doc = p.to_document().unwrap();
    let err = Project::from_document(&ProjectId::new().to_string(), doc).unwrap_err();
    assert!(matches!(err, Error::InvalidDocument(_)));
}

#[test]
fn tombstone_document_decodes() {
    let mut p = sample();
    p.mark_deleted();
    let doc = p.to_document().unwrap();
    assert_eq!(doc["deleted"], json!(true));
    assert!(Project::from_document(&p.id.to_string(), doc).unwrap().deleted);
}

// ── Identity ─────────────────────────────────────────────────────

#[test]
fn identity_default_is_none() {
    assert_eq!(AuthIdentity::default(), AuthIdentity::None);
}

#[test]
fn identity_user_accessor() {
    let id = AuthIdentity::Authenticated(User::new("alice"));
    assert!(id.is_authenticated());
    assert_eq!(id.user().unwrap().id.as_str(), "alice");
    assert!(AuthIdentity::Guest.user().is_none());
    assert!(!AuthIdentity::Switching.is_authenticated());
}

#[test]
fn identity_serializes_tagged() {
    let id = AuthIdentity::Authenticated(User::new("alice"));
    let json = serde_json::to_value(&id).unwrap();
    assert_eq!(json["state"], json!("authenticated"));
    assert_eq!(json["user"]["id"], json!("alice"));
}
