//! Error types for the reference collaborators

use thiserror::Error;
use warden_auth_core::AuthError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Password hashing error: {0}")]
    PasswordHash(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("User already exists: {0}")]
    UserAlreadyExists(String),

    #[error("User not found: {0}")]
    UserNotFound(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("Token expired")]
    TokenExpired,

    #[error("Token revoked")]
    TokenRevoked,
}

pub type Result<T> = std::result::Result<T, Error>;

impl From<password_hash::Error> for Error {
    fn from(e: password_hash::Error) -> Self {
        Error::PasswordHash(e.to_string())
    }
}

impl From<argon2::Error> for Error {
    fn from(e: argon2::Error) -> Self {
        Error::Config(format!("Invalid Argon2 parameters: {}", e))
    }
}

impl From<Error> for AuthError {
    fn from(e: Error) -> Self {
        match e {
            // Unknown users look exactly like wrong passwords to the caller
            Error::InvalidCredentials | Error::UserNotFound(_) => AuthError::InvalidCredentials,
            Error::TokenExpired => AuthError::TokenExpired,
            Error::TokenRevoked => AuthError::ProviderNotAuthorized,
            Error::Jwt(e) => AuthError::InvalidToken(e.to_string()),
            Error::Config(message) => AuthError::ConfigError(message),
            other => AuthError::internal(other.to_string()),
        }
    }
}
