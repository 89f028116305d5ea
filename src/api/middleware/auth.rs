use crate::AppState;
use crate::api::error::AppError;
use crate::services::authorization::Authorization;
use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::Response,
};

/// Resolves the bearer token into an `Authorization` capability and stores
/// it in the request extensions. Rejected callers get a 401 here.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .map(|s| s.to_string());

    let authorization =
        Authorization::resolve(&state.db, &state.config.jwt_secret, auth_header.as_deref())
            .await?;

    if let Authorization::Rejected(reason) = authorization {
        return Err(AppError::Unauthorized(reason.to_string()));
    }

    req.extensions_mut().insert(authorization);
    Ok(next.run(req).await)
}

/// Must be layered inside `auth_middleware`
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    match req.extensions().get::<Authorization>() {
        Some(authorization) if authorization.is_admin() => Ok(next.run(req).await),
        Some(Authorization::Authenticated(user)) => {
            tracing::warn!("User '{}' denied access to {}", user.username, req.uri());
            Err(AppError::Forbidden("Admin access required".to_string()))
        }
        _ => Err(AppError::Unauthorized("No token provided".to_string())),
    }
}
