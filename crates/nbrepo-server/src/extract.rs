//! Caller identity extraction from `Authorization` or `X-Username` (dev mode).

use axum::{extract::FromRequestParts, http::request::Parts};
use nbrepo_core::{Identity, Username};

use crate::auth::username_from_token;
use crate::error::ApiError;
use crate::state::AppState;

/// Header trusted in dev mode in place of a token.
pub const DEV_USERNAME_HEADER: &str = "x-username";

/// The authenticated caller. Rejects the request when no identity is present.
///
/// Priority:
/// 1. `Authorization: Token <jwt>` or `Authorization: Bearer <jwt>`
/// 2. `X-Username` header, only if `allow_dev_identity` is true in config
///
/// The admin flag comes from the server's admin list, not from the token.
#[derive(Debug, Clone)]
pub struct Caller(pub Identity);

/// The caller if one is identified; public reads accept anonymous requests.
#[derive(Debug, Clone)]
pub struct MaybeCaller(pub Option<Identity>);

impl FromRequestParts<AppState> for Caller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        match resolve(parts, state)? {
            Some(identity) => Ok(Caller(identity)),
            None => Err(ApiError::Unauthorized(
                "Missing Authorization: Token <token> header".into(),
            )),
        }
    }
}

impl FromRequestParts<AppState> for MaybeCaller {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeCaller(resolve(parts, state)?))
    }
}

fn resolve(parts: &Parts, state: &AppState) -> Result<Option<Identity>, ApiError> {
    let config = state.config();

    if let Some(auth_header) = parts.headers.get(http::header::AUTHORIZATION) {
        let auth_str = auth_header.to_str().map_err(|_| {
            ApiError::Unauthorized("Authorization header contains invalid characters".into())
        })?;

        let token = auth_str
            .strip_prefix("Token ")
            .or_else(|| auth_str.strip_prefix("Bearer "))
            .ok_or_else(|| {
                ApiError::Unauthorized("Authorization header must be Token <token>".into())
            })?;

        let username = username_from_token(token.trim(), &config.jwt_secret)?;
        let admin = config.is_admin(&username);
        return Ok(Some(Identity::new(username, admin)));
    }

    if config.allow_dev_identity
        && let Some(value) = parts.headers.get(DEV_USERNAME_HEADER)
    {
        let raw = value.to_str().map_err(|_| {
            ApiError::validation("X-Username header contains invalid characters")
        })?;
        let username = Username::parse(raw)?;
        tracing::debug!(username = %username, "Using dev identity from X-Username header");
        let admin = config.is_admin(&username);
        return Ok(Some(Identity::new(username, admin)));
    }

    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::create_token;
    use crate::config::ServerConfig;
    use axum::http::Request;
    use nbrepo_store::Store;

    fn state(allow_dev: bool) -> AppState {
        let mut config = ServerConfig::default();
        config.jwt_secret = "extract-test-secret".into();
        config.allow_dev_identity = allow_dev;
        config.admin_users.insert(Username::parse("root").unwrap());
        AppState::new(Store::in_memory(), config)
    }

    fn parts(headers: &[(&str, &str)]) -> Parts {
        let mut builder = Request::builder().uri("/");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap().into_parts().0
    }

    #[tokio::test]
    async fn test_token_scheme_accepted() {
        let state = state(false);
        let token = create_token(&Username::parse("root").unwrap(), false, "extract-test-secret", 1)
            .unwrap();
        let mut parts = parts(&[("authorization", format!("Token {token}").as_str())]);

        let Caller(identity) = Caller::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(identity.username.as_str(), "root");
        // Admin comes from config even though the token says otherwise.
        assert!(identity.admin);
    }

    #[tokio::test]
    async fn test_bearer_scheme_accepted() {
        let state = state(false);
        let token =
            create_token(&Username::parse("alice").unwrap(), true, "extract-test-secret", 1).unwrap();
        let mut parts = parts(&[("authorization", format!("Bearer {token}").as_str())]);

        let Caller(identity) = Caller::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(identity.username.as_str(), "alice");
        assert!(!identity.admin);
    }

    #[tokio::test]
    async fn test_missing_identity_rejected() {
        let state = state(false);
        let mut parts = parts(&[("x-username", "alice")]);
        let result = Caller::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));

        let MaybeCaller(identity) = MaybeCaller::from_request_parts(&mut parts, &state)
            .await
            .unwrap();
        assert!(identity.is_none());
    }

    #[tokio::test]
    async fn test_dev_header_when_allowed() {
        let state = state(true);
        let mut parts = parts(&[("x-username", "Alice")]);
        let Caller(identity) = Caller::from_request_parts(&mut parts, &state).await.unwrap();
        assert_eq!(identity.username.as_str(), "alice");
    }

    #[tokio::test]
    async fn test_unknown_scheme_rejected() {
        let state = state(true);
        let mut parts = parts(&[("authorization", "Basic YWxpY2U6cHc=")]);
        let result = Caller::from_request_parts(&mut parts, &state).await;
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }
}
