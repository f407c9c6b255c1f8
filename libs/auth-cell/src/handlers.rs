use std::sync::Arc;

use axum::extract::{Extension, State};
use axum::Json;
use serde_json::json;
use tracing::debug;

use shared_config::AppConfig;
use shared_database::supabase::SupabaseClient;
use shared_models::auth::{LoginRequest, LoginResponse, User};
use shared_models::error::AppError;
use shared_utils::jwt::validate_token as jwt_validate_token;

/// `POST /auth/login` (public): exchanges a username/password for a Supabase Auth access token
/// via the password grant, then decodes that token the same way `auth_middleware` does so the
/// response carries the identity the caller will present on subsequent requests.
#[axum::debug_handler]
pub async fn login(
    State(config): State<Arc<AppConfig>>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    debug!(username = %req.username, "login attempt");

    let client = SupabaseClient::new(&config);
    let token_response = client
        .sign_in_with_password(&req.username, &req.password)
        .await
        .map_err(|_| AppError::Auth("invalid username or password".to_string()))?;

    let access_token = token_response
        .get("access_token")
        .and_then(|v| v.as_str())
        .ok_or_else(|| AppError::Auth("invalid username or password".to_string()))?;

    let user = jwt_validate_token(access_token, &config.supabase_jwt_secret)
        .map_err(AppError::Auth)?;

    Ok(Json(LoginResponse {
        token: access_token.to_string(),
        user_id: user.id,
        username: req.username,
        role: user.role,
        message: "login successful".to_string(),
    }))
}

/// `GET /auth/validate`: requires a valid bearer token (checked by `auth_middleware` ahead of
/// this handler), echoes the identity it carries back to the caller.
#[axum::debug_handler]
pub async fn validate(Extension(user): Extension<User>) -> Result<Json<serde_json::Value>, AppError> {
    Ok(Json(json!({
        "valid": true,
        "user_id": user.id,
        "username": user.email,
        "role": user.role,
    })))
}

/// `POST /auth/logout`: Supabase Auth sessions are stateless JWTs with no server-side session to
/// tear down here, so this just acknowledges a token that `auth_middleware` has already proven
/// valid - the client is expected to discard it.
#[axum::debug_handler]
pub async fn logout(Extension(_user): Extension<User>) -> Json<serde_json::Value> {
    Json(json!({ "message": "logged out" }))
}
