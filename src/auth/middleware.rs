use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, instrument, warn};

use super::types::ActorClaims;
use crate::shared::{AppError, AppState};

/// JWT authentication middleware - validates Authorization Bearer header and adds ActorClaims to request.
/// Usage: .layer(middleware::from_fn_with_state(app_state.clone(), auth::jwt_auth))
/// Handlers can then extract Extension(claims): Extension<ActorClaims>.
#[instrument(skip(state, req, next))]
pub async fn jwt_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let auth_header = req
        .headers()
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .ok_or_else(|| {
            warn!("Missing Authorization header in request");
            AppError::Unauthorized("Missing authorization header".to_string())
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        warn!("Invalid Authorization header format (expected Bearer token)");
        AppError::Unauthorized("Invalid authorization header format".to_string())
    })?;

    let claims = match state.token_config.validate_token(token) {
        Ok(claims) => claims,
        Err(e) => {
            warn!("JWT authentication failed: {}", e);
            return Err(AppError::Unauthorized("Invalid or expired token".to_string()));
        }
    };

    debug!(
        actor = %claims.sub,
        role = %claims.role,
        uri = %req.uri(),
        "Authentication successful, adding claims to request"
    );

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}

/// Must run after `jwt_auth`; rejects actors without the admin role
pub async fn require_admin(req: Request, next: Next) -> Result<Response, AppError> {
    let claims = req
        .extensions()
        .get::<ActorClaims>()
        .ok_or_else(|| AppError::Unauthorized("Missing authentication".to_string()))?;

    if !claims.is_admin() {
        warn!(actor = %claims.sub, uri = %req.uri(), "Non-admin attempted admin operation");
        return Err(AppError::Forbidden(
            "Administrator role required".to_string(),
        ));
    }

    Ok(next.run(req).await)
}
