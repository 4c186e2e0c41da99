use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A resolved connecting user. Built once at the WebSocket handshake and
/// immutable for the lifetime of the connection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Principal {
    pub user_id: String,
    pub username: String,
}

/// Role attached to a document permission entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PermissionRole {
    Owner,
    Editor,
    Viewer,
}

impl PermissionRole {
    /// Parse a role as stored in the permission table. Unknown values read
    /// as viewer so a bad row can never widen access.
    pub fn parse(value: &str) -> Self {
        match value {
            "owner" => PermissionRole::Owner,
            "editor" => PermissionRole::Editor,
            _ => PermissionRole::Viewer,
        }
    }
}

/// A single entry in a document's permission list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Permission {
    pub user_id: String,
    pub role: PermissionRole,
}

/// The authoritative in-memory view of a document while it has at least
/// one active session. Loaded from the store on first join, mutated by
/// incoming edits, flushed back by the coalesced save.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredDocument {
    pub title: String,
    pub content: String,
    pub owner: String,
    pub permissions: Vec<Permission>,
    pub last_modified: DateTime<Utc>,
    pub last_modified_by: Option<String>,
}

/// What a coalesced save writes back. The session path never touches the
/// title or the permission list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentUpdate {
    pub content: String,
    pub last_modified: DateTime<Utc>,
    pub last_modified_by: Option<String>,
}

/// One row of the active-user list, one per distinct user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUser {
    pub user_id: String,
    pub username: String,
}
