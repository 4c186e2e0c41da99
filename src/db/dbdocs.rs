use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Error as SqlxError;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OnceCell;
use tracing::info;

use crate::models::{DocumentUpdate, Permission, PermissionRole, StoredDocument};

// Global database instance
static DB: OnceCell<Arc<DbDocs>> = OnceCell::const_new();

/// Initialize the global database connection
pub async fn init_db(database_url: &str) -> Result<(), Box<dyn std::error::Error>> {
    let db = DbDocs::new(database_url).await?;
    DB.set(Arc::new(db))
        .map_err(|_| "Database already initialized")?;
    Ok(())
}

/// Get the global database instance
pub fn get_db() -> Option<Arc<DbDocs>> {
    DB.get().cloned()
}

/// Document row from the database
#[derive(Debug, Clone, sqlx::FromRow)]
struct DocumentRow {
    pub title: String,
    pub content: String,
    pub owner: String,
    pub last_modified: DateTime<Utc>,
    pub last_modified_by: Option<String>,
}

/// Permission row from the database
#[derive(Debug, Clone, sqlx::FromRow)]
struct PermissionRow {
    pub user_id: String,
    pub role: String,
}

/// Database connection pool
pub struct DbDocs {
    pool: PgPool,
}

impl DbDocs {
    /// Create a new database connection pool
    pub async fn new(database_url: &str) -> Result<Self, SqlxError> {
        info!("Connecting to database...");

        let pool = PgPoolOptions::new()
            .max_connections(20)
            .min_connections(2)
            .acquire_timeout(Duration::from_secs(30))
            .idle_timeout(Duration::from_secs(600)) // Close idle connections after 10 minutes
            .max_lifetime(Duration::from_secs(1800)) // Recycle connections after 30 minutes
            .connect(database_url)
            .await?;

        info!("Database connection pool created successfully");

        Ok(Self { pool })
    }

    /// Load a document and its permission list
    ///
    /// # Arguments
    /// * `document_id` - Document UUID
    ///
    /// # Returns
    /// * `Result<Option<StoredDocument>, SqlxError>` - The document, or None if unknown/deleted
    pub async fn load_document(
        &self,
        document_id: uuid::Uuid,
    ) -> Result<Option<StoredDocument>, SqlxError> {
        let row = sqlx::query_as::<_, DocumentRow>(
            r#"
            SELECT title, content, owner, last_modified, last_modified_by
            FROM documents
            WHERE id = $1 AND deleted = FALSE
            "#,
        )
        .bind(document_id)
        .fetch_optional(&self.pool)
        .await?;

        let Some(row) = row else {
            return Ok(None);
        };

        let permission_rows = sqlx::query_as::<_, PermissionRow>(
            r#"
            SELECT user_id, role
            FROM document_permissions
            WHERE document = $1
            "#,
        )
        .bind(document_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(Some(StoredDocument {
            title: row.title,
            content: row.content,
            owner: row.owner,
            permissions: permission_rows
                .into_iter()
                .map(|p| Permission {
                    user_id: p.user_id,
                    role: PermissionRole::parse(&p.role),
                })
                .collect(),
            last_modified: row.last_modified,
            last_modified_by: row.last_modified_by,
        }))
    }

    /// Write the outcome of a coalesced save
    ///
    /// # Returns
    /// * `Result<bool, SqlxError>` - False when the document no longer exists
    pub async fn save_document(
        &self,
        document_id: uuid::Uuid,
        update: &DocumentUpdate,
    ) -> Result<bool, SqlxError> {
        let result = sqlx::query(
            r#"
            UPDATE documents
            SET content = $2, last_modified = $3, last_modified_by = $4
            WHERE id = $1 AND deleted = FALSE
            "#,
        )
        .bind(document_id)
        .bind(&update.content)
        .bind(update.last_modified)
        .bind(&update.last_modified_by)
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Look up a user's display name
    pub async fn get_username(&self, user_id: &str) -> Result<Option<String>, SqlxError> {
        sqlx::query_scalar::<_, String>(
            r#"
            SELECT username FROM users WHERE id = $1
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
    }
}
