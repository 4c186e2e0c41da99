use axum::{
    extract::Request, http::StatusCode, middleware::Next, response::Response, Json,
};
use tracing::error;

use crate::models::ErrorResponse;
use crate::services::auth_service;

/// Require a valid JWT and attach the resolved principal to the request.
pub async fn auth_middleware(
    mut req: Request,
    next: Next,
) -> Result<Response, (StatusCode, Json<ErrorResponse>)> {
    let principal = match auth_service::resolve_principal(req.headers(), None).await {
        Ok(principal) => principal,
        Err(e) => {
            error!("Rejecting API request: {}", e);
            let status = StatusCode::UNAUTHORIZED;
            return Err((
                status,
                Json(ErrorResponse {
                    code: status.as_u16(),
                    status: status.to_string(),
                    error: "Authentication required".to_string(),
                }),
            ));
        }
    };

    req.extensions_mut().insert(principal);
    Ok(next.run(req).await)
}
