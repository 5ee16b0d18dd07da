//! Validated credentials
//!
//! A [`Permit`] is a signed token whose claims have been decoded and checked.
//! The only way to obtain one is [`Permit::create`], which trusts the claims
//! inside the token over anything the caller supplies alongside it.
//!
//! Signature verification is the issuer's concern: this side only reads the
//! `sub`, `iat` and `exp` claims to reason about expiry.

use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;
use uuid::Uuid;

use crate::clock::Clock;
use crate::error::{AuthError, Result};

/// Claims a permit is built from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPayload {
    /// `sub` claim
    pub subject: String,
    /// `iat` claim, epoch seconds
    pub issued_at: i64,
    /// `exp` claim, epoch seconds
    pub expiry: i64,
}

/// Input to [`Permit::create`]
#[derive(Clone, Default)]
pub struct PermitData {
    pub token: String,
    /// Claims the caller believes the token carries. Informational only.
    pub token_payload: Option<TokenPayload>,
}

impl PermitData {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            token_payload: None,
        }
    }

    pub fn with_payload(mut self, payload: TokenPayload) -> Self {
        self.token_payload = Some(payload);
        self
    }
}

/// An immutable, structurally valid credential
#[derive(Clone, PartialEq, Eq)]
pub struct Permit {
    id: String,
    token: String,
    token_expires: i64,
    token_payload: TokenPayload,
}

impl std::fmt::Debug for Permit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Permit")
            .field("id", &self.id)
            .field("token", &"[REDACTED]")
            .field("token_expires", &self.token_expires)
            .field("token_payload", &self.token_payload)
            .finish()
    }
}

impl Permit {
    /// Decode and validate a token into a permit
    ///
    /// Fails with `InvalidToken` for an empty or undecodable token or missing
    /// claims, and with `TokenExpired` when `exp <= now`.
    pub fn create(data: PermitData, now: i64) -> Result<Self> {
        if data.token.trim().is_empty() {
            return Err(AuthError::InvalidToken("token is empty".to_string()));
        }

        let (payload, jti) = decode_claims(&data.token)?;

        if let Some(supplied) = &data.token_payload {
            if supplied != &payload {
                warn!(
                    subject = %payload.subject,
                    supplied_subject = %supplied.subject,
                    "Supplied token payload differs from the token claims, using the token claims"
                );
            }
        }

        if payload.expiry <= now {
            return Err(AuthError::TokenExpired);
        }

        Ok(Self {
            id: jti.unwrap_or_else(|| Uuid::new_v4().to_string()),
            token: data.token,
            token_expires: payload.expiry,
            token_payload: payload,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Expiry in epoch seconds
    pub fn token_expires(&self) -> i64 {
        self.token_expires
    }

    pub fn token_payload(&self) -> &TokenPayload {
        &self.token_payload
    }

    pub fn subject(&self) -> &str {
        &self.token_payload.subject
    }

    /// Recomputed against the clock on every call
    pub fn is_valid(&self, clock: &dyn Clock, margin_secs: i64) -> bool {
        is_token_valid(self, clock.now(), margin_secs)
    }
}

/// A permit is usable while it outlives `now` by more than the safety margin
pub fn is_token_valid(permit: &Permit, now: i64, margin_secs: i64) -> bool {
    permit.token_expires() > now.saturating_add(margin_secs)
}

/// Read `sub`/`iat`/`exp` (and `jti` when present) without verifying the signature
pub fn decode_claims(token: &str) -> Result<(TokenPayload, Option<String>)> {
    let mut validation = Validation::new(Algorithm::HS256);
    validation.algorithms = vec![Algorithm::HS256, Algorithm::HS384, Algorithm::HS512];
    validation.insecure_disable_signature_validation();
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let data = decode::<Value>(token, &DecodingKey::from_secret(&[]), &validation)
        .map_err(|e| AuthError::InvalidToken(format!("cannot decode token: {}", e)))?;
    let claims = data.claims;

    let subject = claims
        .get("sub")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| AuthError::InvalidToken("missing or malformed `sub` claim".to_string()))?;
    let issued_at = claims
        .get("iat")
        .and_then(Value::as_i64)
        .ok_or_else(|| AuthError::InvalidToken("missing or malformed `iat` claim".to_string()))?;
    let expiry = claims
        .get("exp")
        .and_then(Value::as_i64)
        .ok_or_else(|| AuthError::InvalidToken("missing or malformed `exp` claim".to_string()))?;
    let jti = claims.get("jti").and_then(Value::as_str).map(str::to_string);

    Ok((
        TokenPayload {
            subject: subject.to_string(),
            issued_at,
            expiry,
        },
        jti,
    ))
}
