//! Admin authentication

use axum::async_trait;
use axum::extract::{FromRef, FromRequestParts};
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use sha2::{Digest, Sha256};

use crate::error::Error;

/// Shared admin key; None locks every admin route
#[derive(Debug, Clone, Default)]
pub struct AuthConfig {
    pub api_key: Option<String>,
}

/// Extractor that only succeeds for requests carrying the admin key
#[derive(Debug, Clone)]
pub struct AdminUser;

#[async_trait]
impl<S> FromRequestParts<S> for AdminUser
where
    AuthConfig: FromRef<S>,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let config = AuthConfig::from_ref(state);
        authorize(parts, &config)
    }
}

fn authorize(parts: &Parts, config: &AuthConfig) -> Result<AdminUser, Error> {
    let expected = config
        .api_key
        .as_deref()
        .filter(|key| !key.is_empty())
        .ok_or_else(|| Error::Auth("admin API key is not configured".into()))?;

    let provided = parts
        .headers
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .or_else(|| {
            parts
                .headers
                .get(AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.strip_prefix("Bearer "))
        })
        .ok_or_else(|| Error::Auth("missing X-API-Key or Bearer token".into()))?;

    if !keys_match(provided.trim(), expected) {
        return Err(Error::Auth("invalid API key".into()));
    }

    Ok(AdminUser)
}

/// Compares fixed-length digests without short-circuiting on the first difference
fn keys_match(provided: &str, expected: &str) -> bool {
    let provided = Sha256::digest(provided.as_bytes());
    let expected = Sha256::digest(expected.as_bytes());
    provided
        .iter()
        .zip(expected.iter())
        .fold(0u8, |diff, (a, b)| diff | (a ^ b))
        == 0
}
