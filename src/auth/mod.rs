//! Request authentication.
//!
//! Users sign in through the account service that fronts this one. It issues
//! an HS256 JWT whose `id` claim is the user id; every user-scoped request
//! carries that JWT as a bearer credential and is verified against the shared
//! secret before the id is trusted.

use axum::http::HeaderMap;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};


/// Claims carried by the account service's session token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// User id
    pub id: String,
    /// Expiration time (seconds since the epoch)
    pub exp: i64,
}

/// Verifies session tokens signed with the account service's secret.
#[derive(Clone)]
pub struct JwtVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl JwtVerifier {
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        validation.validate_nbf = false;
        validation.leeway = 0;

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Checks signature and expiry, then returns the claims.
    pub fn verify(&self, token: &str) -> Result<Claims, BearerError> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| BearerError::Invalid(e.to_string()))?
            .claims;

        if claims.id.trim().is_empty() {
            return Err(BearerError::Invalid("token carries no user id".to_string()));
        }

        Ok(claims)
    }

    /// Extracts the bearer credential from `headers`, verifies it and returns
    /// the user id it was issued for.
    pub fn authenticate(&self, headers: &HeaderMap) -> Result<String, BearerError> {
        let token = extract_bearer_token(headers)?;
        Ok(self.verify(&token)?.id)
    }
}

/// Extract bearer token from HTTP Authorization header
///
/// Expected format: "Authorization: Bearer <token>"
/// Returns the token string if present and valid.
pub fn extract_bearer_token(headers: &HeaderMap) -> Result<String, BearerError> {
    // Get Authorization header
    let auth_header = headers
        .get("authorization")
        .ok_or(BearerError::Missing)?
        .to_str()
        .map_err(|_| BearerError::InvalidFormat)?;

    // Parse "Bearer <token>" format
    parse_bearer_token(auth_header)
}

/// Parse bearer token from Authorization header value
fn parse_bearer_token(header_value: &str) -> Result<String, BearerError> {
    let (scheme, token) = header_value
        .split_once(' ')
        .ok_or(BearerError::InvalidFormat)?;

    if !scheme.eq_ignore_ascii_case("bearer") {
        return Err(BearerError::InvalidFormat);
    }

    let token = token.trim();
    if token.is_empty() {
        return Err(BearerError::Empty);
    }

    Ok(token.to_string())
}

/// Bearer authentication errors
#[derive(Debug, PartialEq, Clone, thiserror::Error)]
pub enum BearerError {
    /// Authorization header not present
    #[error("Authorization token not provided")]
    Missing,
    /// Not "Bearer <token>"
    #[error("Invalid authorization token format")]
    InvalidFormat,
    #[error("Authorization token is empty")]
    Empty,
    /// Bad signature, expired, or malformed claims
    #[error("Invalid token: {0}")]
    Invalid(String),
}
