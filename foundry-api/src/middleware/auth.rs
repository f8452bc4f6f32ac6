/// Authentication middleware
///
/// `jwt_auth_layer` resolves the bearer token into an [`AuthContext`] request
/// extension. `admin_layer` must run after it and rejects non-admins.
///
/// ```text
/// Router::new()
///     .route(...)
///     .route_layer(from_fn_with_state(state.clone(), admin_layer))
///     .route_layer(from_fn_with_state(state, jwt_auth_layer))
/// ```

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use foundry_shared::auth::{
    authorization::require_admin,
    middleware::{authenticate, extract_bearer_token, AuthContext},
};

use crate::{app::AppState, error::ApiError};

/// Validates the access token and its session, then injects [`AuthContext`]
pub async fn jwt_auth_layer(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(req.headers())?;
    let auth = authenticate(&state.db, state.jwt_secret(), token).await?;

    tracing::Span::current().record("user_id", tracing::field::display(auth.user_id));
    req.extensions_mut().insert(auth);

    Ok(next.run(req).await)
}

/// Lets only admins through
pub async fn admin_layer(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let auth = req
        .extensions()
        .get::<AuthContext>()
        .copied()
        .ok_or_else(|| ApiError::Unauthorized("Missing credentials".to_string()))?;

    require_admin(&state.db, &auth).await?;

    Ok(next.run(req).await)
}
