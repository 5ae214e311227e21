//! Request gates for protected routes.
//!
//! `require_auth` must wrap `require_admin`:
//!
//! ```ignore
//! Router::new()
//!     .route("/admin", get(handler))
//!     .route_layer(middleware::from_fn(require_admin))
//!     .route_layer(middleware::from_fn_with_state(state, require_auth));
//! ```

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use tracing::warn;

use super::{claims::Claims, jwt::JwtKeys};
use crate::error::AppError;

/// A missing header or another scheme is `Unauthenticated`; a header that is
/// not visible ASCII cannot carry a valid token and is `InvalidToken`.
fn bearer_token(request: &Request) -> Result<&str, AppError> {
    let Some(value) = request.headers().get(AUTHORIZATION) else {
        return Err(AppError::Unauthenticated);
    };
    let header = value.to_str().map_err(|e| {
        warn!(error = %e, path = %request.uri().path(), "authorization header is not ascii");
        AppError::InvalidToken
    })?;
    header
        .strip_prefix("Bearer ")
        .or_else(|| header.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AppError::Unauthenticated)
}

/// Verifies the bearer token and attaches its [`Claims`] to the request.
pub async fn require_auth(
    State(keys): State<JwtKeys>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(&request)?;

    let claims = keys.verify(token).map_err(|e| {
        warn!(error = %e, path = %request.uri().path(), "invalid or expired token");
        AppError::InvalidToken
    })?;

    request.extensions_mut().insert(claims);
    Ok(next.run(request).await)
}

/// Lets the request through only when the attached claims carry the admin flag.
pub async fn require_admin(request: Request, next: Next) -> Result<Response, AppError> {
    let Some(claims) = request.extensions().get::<Claims>() else {
        warn!(path = %request.uri().path(), "admin gate reached without authentication");
        return Err(AppError::Unauthenticated);
    };
    if !claims.is_admin {
        warn!(user_id = claims.sub, "non-admin denied");
        return Err(AppError::Forbidden);
    }
    Ok(next.run(request).await)
}
