use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::ActiveUser;

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct JoinDocumentMessage {
    pub document_id: Uuid,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct LeaveDocumentMessage {
    pub document_id: Uuid,
}

/// Inbound edit. `delta` is the client's fine-grained change and is
/// relayed opaquely; `content` is the authoritative full document body
/// that peers converge on and the store persists.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TextChangeMessage {
    pub document_id: Uuid,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<serde_json::Value>,
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CursorMoveMessage {
    pub document_id: Uuid,
    pub position: serde_json::Value,
}

/// Everything a client may send after the handshake.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ClientMessage {
    #[serde(rename = "join-document")]
    JoinDocument(JoinDocumentMessage),
    #[serde(rename = "leave-document")]
    LeaveDocument(LeaveDocumentMessage),
    #[serde(rename = "text-change")]
    TextChange(TextChangeMessage),
    #[serde(rename = "cursor-move")]
    CursorMove(CursorMoveMessage),
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DocumentStateMessage {
    pub title: String,
    pub content: String,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct ActiveUsersMessage {
    pub users: Vec<ActiveUser>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct UserEventMessage {
    pub user_id: String,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct TextChangeBroadcast {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delta: Option<serde_json::Value>,
    pub content: String,
    pub user_id: String,
    pub username: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct CursorMoveBroadcast {
    pub user_id: String,
    pub username: String,
    pub position: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSavedMessage {
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSaveFailedMessage {
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ErrorMessage {
    pub message: String,
}

/// Everything the server may emit to a client.
#[derive(Serialize, Deserialize, Debug, Clone)]
#[serde(tag = "type")]
pub enum ServerMessage {
    #[serde(rename = "document-state")]
    DocumentState(DocumentStateMessage),
    #[serde(rename = "active-users")]
    ActiveUsers(ActiveUsersMessage),
    #[serde(rename = "user-joined")]
    UserJoined(UserEventMessage),
    #[serde(rename = "user-left")]
    UserLeft(UserEventMessage),
    #[serde(rename = "text-change")]
    TextChange(TextChangeBroadcast),
    #[serde(rename = "cursor-move")]
    CursorMove(CursorMoveBroadcast),
    #[serde(rename = "document-saved")]
    DocumentSaved(DocumentSavedMessage),
    #[serde(rename = "document-save-failed")]
    DocumentSaveFailed(DocumentSaveFailedMessage),
    #[serde(rename = "error")]
    Error(ErrorMessage),
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        ServerMessage::Error(ErrorMessage {
            message: message.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_text_change_parses_wire_format() {
        let raw = r#"{
            "type": "text-change",
            "documentId": "7b9f4c3e-2d4f-4a64-9d2c-5f1e8a7b6c5d",
            "delta": {"ops": [{"insert": "hi"}]},
            "content": "<p>hi</p>"
        }"#;
        let msg: ClientMessage = serde_json::from_str(raw).expect("should parse");
        match msg {
            ClientMessage::TextChange(change) => {
                assert_eq!(change.content, "<p>hi</p>");
                assert!(change.delta.is_some());
            }
            other => panic!("unexpected variant: {:?}", other),
        }
    }

    #[test]
    fn client_join_without_delta_parses() {
        let raw = r#"{"type": "join-document", "documentId": "7b9f4c3e-2d4f-4a64-9d2c-5f1e8a7b6c5d"}"#;
        let msg: ClientMessage = serde_json::from_str(raw).expect("should parse");
        assert!(matches!(msg, ClientMessage::JoinDocument(_)));
    }

    #[test]
    fn active_users_serializes_camel_case() {
        let msg = ServerMessage::ActiveUsers(ActiveUsersMessage {
            users: vec![ActiveUser {
                user_id: "u1".to_string(),
                username: "ada".to_string(),
            }],
        });
        let json = serde_json::to_value(&msg).expect("should serialize");
        assert_eq!(json["type"], "active-users");
        assert_eq!(json["users"][0]["userId"], "u1");
        assert_eq!(json["users"][0]["username"], "ada");
    }

    #[test]
    fn text_change_broadcast_omits_missing_delta() {
        let msg = ServerMessage::TextChange(TextChangeBroadcast {
            delta: None,
            content: "x".to_string(),
            user_id: "u1".to_string(),
            username: "ada".to_string(),
            timestamp: Utc::now(),
        });
        let json = serde_json::to_value(&msg).expect("should serialize");
        assert!(json.get("delta").is_none());
        assert_eq!(json["type"], "text-change");
    }

    #[test]
    fn malformed_message_is_rejected() {
        let raw = r#"{"type": "text-change", "content": 42}"#;
        assert!(serde_json::from_str::<ClientMessage>(raw).is_err());
    }
}
