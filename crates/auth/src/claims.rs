use std::collections::HashSet;

use chrono::{DateTime, Duration, TimeZone, Utc};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Access-token claims the client reads locally.
///
/// Only the time window matters here; the token's signature is the backend's
/// business and is never verified client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessClaims {
    /// Expiration (seconds since the Unix epoch).
    pub exp: i64,

    /// Issued-at (seconds since the Unix epoch), when present.
    #[serde(default)]
    pub iat: Option<i64>,

    /// Subject, when present.
    #[serde(default)]
    pub sub: Option<String>,
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenError {
    #[error("token could not be decoded: {0}")]
    Malformed(String),

    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (exp <= iat)")]
    InvalidTimeWindow,
}

impl AccessClaims {
    pub fn expires_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_opt(self.exp, 0).single()
    }

    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        self.iat.and_then(|iat| Utc.timestamp_opt(iat, 0).single())
    }
}

/// Decode the payload of a JWT without verifying its signature.
pub fn decode_unverified(token: &str) -> Result<AccessClaims, TokenError> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_nbf = false;
    validation.validate_aud = false;
    validation.required_spec_claims = HashSet::from(["exp".to_string()]);

    jsonwebtoken::decode::<AccessClaims>(token, &DecodingKey::from_secret(&[]), &validation)
        .map(|data| data.claims)
        .map_err(|e| TokenError::Malformed(e.to_string()))
}

/// Deterministically validate the claims' time window.
///
/// `leeway` makes a token count as expired that much before its `exp`, so a
/// request issued right before expiry does not race the deadline.
pub fn validate_claims(claims: &AccessClaims, now: DateTime<Utc>, leeway: Duration) -> Result<(), TokenError> {
    let expires_at = claims
        .expires_at()
        .ok_or_else(|| TokenError::Malformed("exp out of range".to_string()))?;

    if let Some(issued_at) = claims.issued_at() {
        if expires_at <= issued_at {
            return Err(TokenError::InvalidTimeWindow);
        }
        if now + leeway < issued_at {
            return Err(TokenError::NotYetValid);
        }
    }
    if now + leeway >= expires_at {
        return Err(TokenError::Expired);
    }
    Ok(())
}

/// `true` when the token should be refreshed before use.
///
/// A token that cannot be decoded counts as expired.
pub fn access_token_expired(token: &str, now: DateTime<Utc>, leeway: Duration) -> bool {
    match decode_unverified(token).and_then(|claims| validate_claims(&claims, now, leeway)) {
        Ok(()) => false,
        Err(TokenError::NotYetValid) => false,
        Err(err) => {
            tracing::debug!(error = %err, "access token needs refresh");
            true
        }
    }
}
