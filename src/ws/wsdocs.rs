use std::future::Future;
use std::pin::Pin;

use tracing::{error, info};
use uuid::Uuid;

use crate::db::dbdocs;
use crate::models::{DocumentUpdate, StoredDocument};

/// Load a document from storage
///
/// Called by a room when its first connection joins and no snapshot is in
/// memory yet. Returns `Ok(None)` for an unknown or deleted document.
pub fn on_load_document(
    doc_id: Uuid,
) -> Pin<Box<dyn Future<Output = Result<Option<StoredDocument>, String>> + Send>> {
    Box::pin(async move {
        info!("Loading document: {}", doc_id);

        let db = match dbdocs::get_db() {
            Some(db) => db,
            None => {
                error!("Database not initialized");
                return Err("Database not initialized".to_string());
            }
        };

        match db.load_document(doc_id).await {
            Ok(Some(doc)) => {
                info!(
                    "Successfully loaded document: {} ({} bytes, {} permission entries)",
                    doc_id,
                    doc.content.len(),
                    doc.permissions.len()
                );
                Ok(Some(doc))
            }
            Ok(None) => {
                info!("Document not found: {}", doc_id);
                Ok(None)
            }
            Err(e) => {
                error!("Database error loading document '{}': {}", doc_id, e);
                Err(format!("Database error: {}", e))
            }
        }
    })
}

/// Save a document to storage
///
/// Called when a room's coalesced save timer fires. Only the content and
/// modification metadata are written; title and permissions are managed
/// elsewhere.
pub fn on_save_document(
    doc_id: Uuid,
    update: DocumentUpdate,
) -> Pin<Box<dyn Future<Output = Result<(), String>> + Send>> {
    Box::pin(async move {
        info!("Saving document: {}", doc_id);

        let db = match dbdocs::get_db() {
            Some(db) => db,
            None => {
                error!("Database not initialized, cannot save document: {}", doc_id);
                return Err("Database not initialized".to_string());
            }
        };

        match db.save_document(doc_id, &update).await {
            Ok(true) => {
                info!("Document saved: {}", doc_id);
                Ok(())
            }
            Ok(false) => {
                error!("Document '{}' no longer exists, skipping save", doc_id);
                Err(format!("Document '{}' not found", doc_id))
            }
            Err(e) => {
                error!("Failed to save document '{}': {}", doc_id, e);
                Err(format!("Database error: {}", e))
            }
        }
    })
}
