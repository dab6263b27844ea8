//! The project document, the unit of synchronization.

use crate::{Error, ProjectId, Result, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A pattern-tracking project.
///
/// Only `id` and `last_modified` mean anything to the sync core. Everything
/// the user edits lives in `content` and is carried through untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Stable identifier, unique per owning user.
    pub id: ProjectId,
    /// Display name.
    pub name: String,
    /// Time of the last accepted mutation.
    pub last_modified: Timestamp,
    /// Patterns, charts, yarns, counters. Opaque to sync.
    #[serde(default)]
    pub content: Value,
    /// Tombstone flag. A deleted project that wins a merge is dropped.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub deleted: bool,
}

impl Project {
    /// Creates a new, empty project stamped with the current time.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ProjectId::new(),
            name: name.into(),
            last_modified: Timestamp::now(),
            content: Value::Object(Default::default()),
            deleted: false,
        }
    }

    /// Creates a project with an explicit id and timestamp.
    pub fn with_timestamp(id: ProjectId, name: impl Into<String>, last_modified: Timestamp) -> Self {
        Self {
            id,
            name: name.into(),
            last_modified,
            content: Value::Object(Default::default()),
            deleted: false,
        }
    }

    /// Replaces the content, builder style.
    #[must_use]
    pub fn with_content(mut self, content: Value) -> Self {
        self.content = content;
        self
    }

    /// Advances `last_modified` past its current value.
    pub fn touch(&mut self) {
        self.last_modified = self.last_modified.tick();
    }

    /// Turns this project into a tombstone and stamps the deletion.
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.touch();
    }

    /// Decodes a remote document stored under `key`.
    ///
    /// Fails if the document is malformed or its `id` disagrees with the key
    /// it was stored under.
    pub fn from_document(key: &str, document: Value) -> Result<Self> {
        let project: Project = serde_json::from_value(document)?;
        if project.id.to_string() != key {
            return Err(Error::InvalidDocument(format!(
                "document key {key} does not match project id {}",
                project.id
            )));
        }
        Ok(project)
    }

    /// Encodes this project as a remote document.
    pub fn to_document(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
