use axum::http::{header, HeaderMap};
use jsonwebtoken::{decode, Algorithm, DecodingKey, TokenData, Validation};
use tracing::info;

use crate::models::Principal;
use crate::ws::userctx;

// Get the auth token from request headers or, for WebSocket handshakes,
// from the `token` query parameter.
pub fn get_auth_token(headers: &HeaderMap, query_token: Option<&str>) -> Result<String, String> {
    // 1. Try to get token from Authorization header
    if let Some(auth_header) = headers.get(header::AUTHORIZATION) {
        let auth_str = auth_header
            .to_str()
            .map_err(|_| "Invalid Authorization header".to_string())?;
        return Ok(auth_str
            .strip_prefix("Bearer ")
            .unwrap_or(auth_str)
            .to_string());
    }

    // 2. Try to get token from cookies
    if let Some(cookie_header) = headers.get(header::COOKIE) {
        let cookie_str = cookie_header
            .to_str()
            .map_err(|_| "Invalid Cookie header".to_string())?;
        for cookie in cookie::Cookie::split_parse(cookie_str).flatten() {
            if cookie.name() == "auth_token" {
                return Ok(cookie.value().to_string());
            }
        }
    }

    // 3. Fall back to the handshake query parameter
    if let Some(token) = query_token {
        if !token.is_empty() {
            return Ok(token.to_string());
        }
    }

    Err("Missing authentication token".to_string())
}

// Validate a JWT token and return the token data
pub fn validate_jwt(
    token: &str,
    secret: &str,
) -> Result<TokenData<serde_json::Value>, jsonwebtoken::errors::Error> {
    let validation = Validation::new(Algorithm::HS256);
    let decoding_key = DecodingKey::from_secret(secret.as_bytes());
    decode::<serde_json::Value>(token, &decoding_key, &validation)
}

/// Resolve the principal behind a request or WebSocket handshake. The
/// username comes from the token's `username` claim when present and from
/// the user directory otherwise.
pub async fn resolve_principal(
    headers: &HeaderMap,
    query_token: Option<&str>,
) -> Result<Principal, String> {
    let token = get_auth_token(headers, query_token)?;

    let config = crate::config::get_config();
    let secret = config
        .auth_jwt_secret
        .as_ref()
        .ok_or_else(|| "No JWT secret configured".to_string())?;

    let token_data =
        validate_jwt(&token, secret).map_err(|e| format!("JWT validation failed: {}", e))?;

    let uid = token_data
        .claims
        .get("sub")
        .and_then(|v| v.as_str())
        .ok_or_else(|| "JWT token does not contain 'sub' claim".to_string())?;
    info!("JWT token validated successfully for user: {}", uid);

    if let Some(username) = token_data.claims.get("username").and_then(|v| v.as_str()) {
        return Ok(Principal {
            user_id: uid.to_string(),
            username: username.to_string(),
        });
    }

    let user_ctx = userctx::get_or_fetch_user_ctx(uid).await?;
    Ok(Principal {
        user_id: uid.to_string(),
        username: user_ctx.username,
    })
}
