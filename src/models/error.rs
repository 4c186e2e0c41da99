use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// Failures surfaced by the collaboration core. All of these are
/// per-request: none is fatal to the coordinator or the process.
#[derive(Debug, Error)]
pub enum CollabError {
    #[error("Document not found")]
    NotFound,

    #[error("{0}")]
    AccessDenied(String),

    #[error("Store failure: {0}")]
    StoreFailure(String),

    #[error("{0}")]
    Protocol(String),
}

impl CollabError {
    pub fn access_denied() -> Self {
        CollabError::AccessDenied("Access denied".to_string())
    }

    pub fn edit_denied() -> Self {
        CollabError::AccessDenied("You do not have permission to edit this document".to_string())
    }

    pub fn not_joined() -> Self {
        CollabError::Protocol("You have not joined this document".to_string())
    }

    /// What the offending connection is told. Store detail stays in the
    /// logs and never crosses the wire.
    pub fn client_message(&self) -> String {
        match self {
            CollabError::StoreFailure(_) => "Failed to join document".to_string(),
            other => other.to_string(),
        }
    }
}

/// Response for an error
#[derive(Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub code: u16,
    pub status: String,
    pub error: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_detail_never_reaches_the_client() {
        let err = CollabError::StoreFailure("pg: connection refused".to_string());
        assert_eq!(err.client_message(), "Failed to join document");
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn denial_messages_pass_through() {
        assert_eq!(CollabError::access_denied().client_message(), "Access denied");
        assert_eq!(CollabError::NotFound.client_message(), "Document not found");
    }
}
