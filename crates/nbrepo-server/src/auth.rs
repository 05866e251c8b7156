//! Bearer token issuance and validation.
//!
//! Tokens are HS256 JWTs whose subject is the username. The service trusts
//! the username inside a valid token; it does not authenticate passwords.

use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use nbrepo_core::Username;
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// JWT claims.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    /// Username (subject).
    pub sub: String,
    /// Admin flag at issuance; informational only.
    #[serde(default)]
    pub admin: bool,
    /// Expiration time (unix timestamp).
    pub exp: usize,
    /// Issued at (unix timestamp).
    pub iat: usize,
}

/// Create a token for a user.
pub fn create_token(
    username: &Username,
    admin: bool,
    secret: &str,
    expiry_hours: u64,
) -> Result<String, ApiError> {
    let now = chrono::Utc::now();
    let exp = (now + chrono::Duration::hours(expiry_hours as i64)).timestamp() as usize;

    let claims = Claims {
        sub: username.to_string(),
        admin,
        exp,
        iat: now.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("Failed to create token: {}", e)))
}

/// Validate a token and return its claims.
pub fn validate_token(token: &str, secret: &str) -> Result<Claims, ApiError> {
    let token_data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map_err(|e| {
        tracing::debug!(error = %e, "Token validation failed");
        ApiError::Unauthorized(format!("Invalid token: {}", e))
    })?;

    Ok(token_data.claims)
}

/// Validate a token and parse its subject.
pub fn username_from_token(token: &str, secret: &str) -> Result<Username, ApiError> {
    let claims = validate_token(token, secret)?;
    Username::parse(&claims.sub)
        .map_err(|e| ApiError::Unauthorized(format!("Token subject is not a username: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Username {
        Username::parse("alice").unwrap()
    }

    #[test]
    fn test_create_and_validate_token() {
        let secret = "test_secret_key_12345";
        let token = create_token(&alice(), true, secret, 24).unwrap();
        let claims = validate_token(&token, secret).unwrap();

        assert_eq!(claims.sub, "alice");
        assert!(claims.admin);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn test_validate_token_wrong_secret() {
        let token = create_token(&alice(), false, "secret1", 24).unwrap();
        let result = validate_token(&token, "secret2");
        assert!(matches!(result, Err(ApiError::Unauthorized(_))));
    }

    #[test]
    fn test_expired_token_rejected() {
        let now = chrono::Utc::now().timestamp() as usize;
        let claims = Claims {
            sub: "alice".into(),
            admin: false,
            exp: now - 3600,
            iat: now - 7200,
        };
        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(b"secret"),
        )
        .unwrap();
        assert!(validate_token(&token, "secret").is_err());
    }

    #[test]
    fn test_username_from_token() {
        let token = create_token(&alice(), false, "s", 1).unwrap();
        assert_eq!(username_from_token(&token, "s").unwrap(), alice());
    }
}
