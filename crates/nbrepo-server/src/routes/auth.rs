//! Token exchange: the hub authenticator trades a username for a bearer token.

use axum::{
    Json, Router,
    extract::State,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use nbrepo_core::Username;
use serde::{Deserialize, Serialize};

use crate::auth;
use crate::error::{ApiError, ApiResult};
use crate::extract::Caller;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct TokenRequest {
    pub username: String,
    /// Must equal `TOKEN_EXCHANGE_SECRET` when the server sets one.
    #[serde(default)]
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub token: String,
    pub username: Username,
    pub admin: bool,
    pub expires_in_hours: u64,
}

#[derive(Debug, Serialize)]
pub struct MeResponse {
    pub username: Username,
    pub admin: bool,
    /// When the user first exchanged a token; `None` for dev identities never registered.
    pub registered: Option<DateTime<Utc>>,
}

// ============================================================================
// Route Handlers
// ============================================================================

/// POST /api-token-auth/ - Exchange a username for a bearer token.
///
/// The user is recorded in the registry so others can invite them.
///
/// # Response
///
/// - 200 OK: `{ token, username, admin, expires_in_hours }`
/// - 400 Bad Request: Invalid username
/// - 401 Unauthorized: Exchange secret missing or wrong
async fn exchange_token(
    State(state): State<AppState>,
    Json(request): Json<TokenRequest>,
) -> ApiResult<Json<TokenResponse>> {
    let config = state.config();

    if let Some(secret) = &config.token_exchange_secret
        && request.password.as_deref() != Some(secret.as_str())
    {
        tracing::warn!(username = %request.username.trim(), "Token exchange rejected");
        return Err(ApiError::Unauthorized("Invalid token exchange credentials".into()));
    }

    let username = Username::parse(&request.username)?;
    let admin = config.is_admin(&username);
    state.store().upsert_user(&username, admin).await?;

    let token = auth::create_token(&username, admin, &config.jwt_secret, config.jwt_expiry_hours)?;
    tracing::info!(username = %username, admin, "Issued token");

    Ok(Json(TokenResponse {
        token,
        username,
        admin,
        expires_in_hours: config.jwt_expiry_hours,
    }))
}

/// GET /api-token-auth/me - The identity the server resolved for this request.
async fn me(
    State(state): State<AppState>,
    Caller(identity): Caller,
) -> ApiResult<Json<MeResponse>> {
    let registered = state
        .store()
        .get_user(&identity.username)
        .await?
        .map(|user| user.created);
    Ok(Json(MeResponse {
        username: identity.username,
        admin: identity.admin,
        registered,
    }))
}

/// Build auth routes.
pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api-token-auth/", post(exchange_token))
        .route("/api-token-auth/me", get(me))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_request_password_optional() {
        let request: TokenRequest = serde_json::from_str(r#"{"username": "Alice"}"#).unwrap();
        assert_eq!(request.username, "Alice");
        assert!(request.password.is_none());
    }

    #[test]
    fn test_token_response_serialize() {
        let response = TokenResponse {
            token: "jwt.token.here".to_string(),
            username: Username::parse("alice").unwrap(),
            admin: false,
            expires_in_hours: 168,
        };
        let json = serde_json::to_string(&response).unwrap();
        assert!(json.contains("\"username\":\"alice\""));
        assert!(json.contains("\"expires_in_hours\":168"));
    }
}
