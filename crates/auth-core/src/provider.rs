//! Credential exchange and signing contracts

use async_trait::async_trait;

use crate::error::Result;

/// Username and password as typed by the user
#[derive(Clone, PartialEq, Eq)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

impl LoginInput {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl std::fmt::Debug for LoginInput {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginInput")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .finish()
    }
}

/// Claims to sign into a token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignRequest {
    pub subject: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// Turns claims into a signed token
#[async_trait]
pub trait CredentialSigner: Send + Sync {
    async fn sign(&self, request: SignRequest) -> Result<String>;
}

/// Exchanges credentials for a signed token
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Fails with `InvalidCredentials` when the credentials are rejected
    async fn login(&self, input: &LoginInput) -> Result<String>;

    async fn username_exists(&self, username: &str) -> Result<bool>;
}
