//! Error types for authentication operations
//!
//! Every variant carries a stable string code (see [`AuthError::code`]) that
//! consumers match on instead of the human readable message.

use thiserror::Error;

use crate::flows::FlowKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    #[error("Token expired")]
    TokenExpired,

    #[error("Permit is no longer valid")]
    InvalidPermit,

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("No persisted session found")]
    ExistingSessionNotFound,

    #[error("Persisted session has expired")]
    ExistingSessionExpired,

    #[error("Failed to fetch identity: {0}")]
    FetchIdentityError(String),

    #[error("Flow {requested} cannot start while {running} is executing")]
    FlowAlreadyExecuting { running: FlowKind, requested: FlowKind },

    #[error("Session could not be repaired, redirecting to {redirect}")]
    ReauthorizationFailed { redirect: String },

    #[error("Operation aborted")]
    Aborted,

    #[error("Not authorized to issue this request")]
    NotAuthorized,

    #[error("Request rejected by provider as unauthorized")]
    ProviderNotAuthorized,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Internal error: {0}")]
    InternalError(String),
}

impl AuthError {
    /// Stable error code, part of the public contract
    pub fn code(&self) -> &'static str {
        match self {
            AuthError::InvalidToken(_) => "Auth.InvalidToken",
            AuthError::TokenExpired => "Auth.TokenExpired",
            AuthError::InvalidPermit => "Auth.InvalidPermit",
            AuthError::InvalidCredentials => "Auth.InvalidCredentials",
            AuthError::ExistingSessionNotFound => "Auth.ExistingSessionNotFound",
            AuthError::ExistingSessionExpired => "Auth.ExistingSessionExpired",
            AuthError::FetchIdentityError(_) => "Auth.FetchIdentityError",
            AuthError::FlowAlreadyExecuting { .. } => "Auth.FlowAlreadyExecuting",
            AuthError::ReauthorizationFailed { .. } => "Auth.ReauthorizationFailed",
            AuthError::Aborted => "Aborted",
            AuthError::NotAuthorized => "Api.NotAuthorized",
            AuthError::ProviderNotAuthorized => "Api.ProviderNotAuthorized",
            AuthError::Transport(_) => "Api.TransportError",
            AuthError::ConfigError(_) => "ConfigError",
            AuthError::InternalError(_) => "InternalError",
        }
    }

    /// Expected outcomes of probing for a persisted session
    ///
    /// These drive the anonymous / login-page fallbacks and are not failures
    /// worth logging above debug.
    pub fn is_session_recovery(&self) -> bool {
        matches!(
            self,
            AuthError::ExistingSessionNotFound | AuthError::ExistingSessionExpired
        )
    }

    /// Lifecycle or contract problems, more severe than ordinary auth failures
    pub fn is_severe(&self) -> bool {
        matches!(
            self,
            AuthError::FlowAlreadyExecuting { .. }
                | AuthError::InternalError(_)
                | AuthError::ConfigError(_)
        )
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, AuthError::Aborted)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        AuthError::InternalError(message.into())
    }

    pub fn transport(message: impl Into<String>) -> Self {
        AuthError::Transport(message.into())
    }
}

pub type Result<T> = std::result::Result<T, AuthError>;
