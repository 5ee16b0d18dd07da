//! API transport contract
//!
//! The transport is an opaque request executor. The orchestration layer only
//! needs it for the identity query; everything else goes through the
//! [`RequestMediator`](crate::mediator::RequestMediator).

use std::fmt;

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// How a request relates to the session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AuthMode {
    /// Allowed for anyone holding a committed context, anonymous included
    Public,
    /// Requires an authenticated context
    Private,
    /// Part of establishing the session itself; bypasses the gate
    Authenticator,
}

impl fmt::Display for AuthMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthMode::Public => write!(f, "Public"),
            AuthMode::Private => write!(f, "Private"),
            AuthMode::Authenticator => write!(f, "Authenticator"),
        }
    }
}

/// A query to execute
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub query: String,
    pub variables: Value,
    /// Bearer token, if the request carries one
    pub token: Option<String>,
    pub auth_mode: AuthMode,
    pub abort: CancellationToken,
}

impl QueryRequest {
    pub fn new(query: impl Into<String>, auth_mode: AuthMode) -> Self {
        Self {
            query: query.into(),
            variables: Value::Null,
            token: None,
            auth_mode,
            abort: CancellationToken::new(),
        }
    }

    pub fn with_variables(mut self, variables: Value) -> Self {
        self.variables = variables;
        self
    }

    pub fn with_token(mut self, token: Option<String>) -> Self {
        self.token = token;
        self
    }

    pub fn with_abort(mut self, abort: CancellationToken) -> Self {
        self.abort = abort;
        self
    }
}

/// Executes queries against the backend
///
/// Implementations report a credential rejection (HTTP 401 or equivalent)
/// as `AuthError::ProviderNotAuthorized` so the mediator can reauthorize.
#[async_trait]
pub trait ApiTransport: Send + Sync {
    async fn run_query(&self, request: QueryRequest) -> Result<Value>;
}
