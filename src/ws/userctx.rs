use moka::sync::Cache;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::info;

use crate::db::dbdocs;

#[derive(Clone, Debug)]
pub struct UserCtx {
    pub username: String,
}

static USER_CTX_CACHE: OnceLock<Cache<String, UserCtx>> = OnceLock::new();

pub fn init_user_ctx_cache() {
    USER_CTX_CACHE.get_or_init(|| {
        Cache::builder()
            .max_capacity(100_000)
            .time_to_idle(Duration::from_secs(5 * 60))
            .build()
    });
    info!("User cache initialized");
}

pub(crate) fn get_user_ctx_cache() -> &'static Cache<String, UserCtx> {
    USER_CTX_CACHE
        .get()
        .expect("User cache not initialized. Call init_user_ctx_cache() first.")
}

/// Resolve the display data for a user id, hitting the store only on a
/// cache miss. Every WebSocket handshake goes through here when the token
/// carries no username claim.
pub async fn get_or_fetch_user_ctx(uid: &str) -> Result<UserCtx, String> {
    let cache = get_user_ctx_cache();

    if let Some(ctx) = cache.get(uid) {
        return Ok(ctx);
    }

    info!("User context cache miss for uid {}. Fetching from store.", uid);
    let db = dbdocs::get_db().ok_or_else(|| "Database not initialized".to_string())?;
    let username = db
        .get_username(uid)
        .await
        .map_err(|e| format!("Failed to fetch user {}: {}", uid, e))?
        .ok_or_else(|| format!("Unknown user: {}", uid))?;

    let ctx = UserCtx { username };
    cache.insert(uid.to_string(), ctx.clone());
    Ok(ctx)
}
