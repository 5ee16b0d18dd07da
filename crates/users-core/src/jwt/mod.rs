//! JWT token issuance and verification

use std::sync::Arc;

use async_trait::async_trait;
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use tracing::debug;
use uuid::Uuid;
use warden_auth_core::{AuthError, Clock, CredentialSigner, SignRequest};

use crate::directory::User;
use crate::{Error, Result};

/// JWT issuer and verifier
///
/// Expiry is checked against the injected [`Clock`] rather than the wall
/// clock, so the signer and the session layer always agree on "now".
pub struct JwtSigner {
    config: JwtConfig,
    clock: Arc<dyn Clock>,
    encoding_key: Arc<EncodingKey>,
    decoding_key: Arc<DecodingKey>,
    header: Header,
}

impl std::fmt::Debug for JwtSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JwtSigner")
            .field("issuer", &self.config.issuer)
            .field("algorithm", &self.header.alg)
            .finish_non_exhaustive()
    }
}

/// JWT claims for user tokens
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserClaims {
    pub iss: String,
    /// Username
    pub sub: String,
    pub aud: Vec<String>,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
}

/// JWT configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct JwtConfig {
    pub issuer: String,
    pub audience: Vec<String>,
    pub access_ttl_seconds: i64,
    /// One of HS256, HS384, HS512
    pub algorithm: String,
    /// Shared signing secret; required
    pub secret: Option<String>,
}

impl Default for JwtConfig {
    fn default() -> Self {
        Self {
            issuer: "https://users.warden.local".to_string(),
            audience: vec!["warden-api".to_string()],
            access_ttl_seconds: 3600,
            algorithm: "HS256".to_string(),
            secret: None,
        }
    }
}

impl JwtConfig {
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }
}

impl JwtSigner {
    pub fn new(config: JwtConfig, clock: Arc<dyn Clock>) -> Result<Self> {
        let secret = match config.secret.as_deref() {
            Some(secret) if !secret.is_empty() => secret.to_string(),
            _ => return Err(Error::Config("JWT signing secret is required".to_string())),
        };

        if config.access_ttl_seconds <= 0 {
            return Err(Error::Config(
                "access_ttl_seconds must be positive".to_string(),
            ));
        }

        let algorithm = match config.algorithm.as_str() {
            "HS256" => Algorithm::HS256,
            "HS384" => Algorithm::HS384,
            "HS512" => Algorithm::HS512,
            other => return Err(Error::Config(format!("Unsupported algorithm: {}", other))),
        };

        let mut header = Header::new(algorithm);
        header.kid = Some("warden-users".to_string());

        Ok(Self {
            encoding_key: Arc::new(EncodingKey::from_secret(secret.as_bytes())),
            decoding_key: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            config,
            clock,
            header,
        })
    }

    pub fn config(&self) -> &JwtConfig {
        &self.config
    }

    /// Sign a token for `subject` with explicit timestamps
    pub fn issue(&self, subject: &str, issued_at: i64, expires_at: i64) -> Result<String> {
        let claims = UserClaims {
            iss: self.config.issuer.clone(),
            sub: subject.to_string(),
            aud: self.config.audience.clone(),
            exp: expires_at,
            iat: issued_at,
            jti: Uuid::new_v4().to_string(),
        };

        debug!(subject, expires_at, "Issuing token");
        encode(&self.header, &claims, &self.encoding_key).map_err(Error::Jwt)
    }

    /// Sign an access token for `user`, valid for the configured TTL
    pub fn issue_access_token(&self, user: &User) -> Result<String> {
        let now = self.clock.now();
        self.issue(&user.username, now, now + self.config.access_ttl_seconds)
    }

    /// Verify signature, issuer and audience, then expiry against the clock
    pub fn verify(&self, token: &str) -> Result<UserClaims> {
        let mut validation = Validation::new(self.header.alg);
        validation.set_issuer(&[self.config.issuer.clone()]);
        validation.set_audience(&self.config.audience);
        validation.validate_exp = false;
        validation.set_required_spec_claims(&["exp", "sub", "iss", "aud"]);

        let token_data = decode::<UserClaims>(token, &self.decoding_key, &validation)?;
        let claims = token_data.claims;

        if claims.exp <= self.clock.now() {
            return Err(Error::TokenExpired);
        }
        Ok(claims)
    }
}

#[async_trait]
impl CredentialSigner for JwtSigner {
    async fn sign(&self, request: SignRequest) -> warden_auth_core::Result<String> {
        if request.expires_at <= request.issued_at {
            return Err(AuthError::InvalidToken(
                "expiry must be after issuance".to_string(),
            ));
        }
        self.issue(&request.subject, request.issued_at, request.expires_at)
            .map_err(AuthError::from)
    }
}
