//! [`ApiTransport`] that answers identity queries from the directory
//!
//! Stands in for a remote API in tests and local tooling: every query is
//! treated as "who am I" and answered with the caller's identity under
//! `identity_field`.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::debug;
use warden_auth_core::{ApiTransport, AuthError, AuthMode, Identity, QueryRequest};

use crate::directory::UserDirectory;
use crate::jwt::JwtSigner;

#[derive(Debug, Clone)]
pub struct DirectoryTransport {
    directory: Arc<UserDirectory>,
    signer: Arc<JwtSigner>,
    identity_field: String,
}

impl DirectoryTransport {
    pub fn new(directory: Arc<UserDirectory>, signer: Arc<JwtSigner>) -> Self {
        Self {
            directory,
            signer,
            identity_field: "me".to_string(),
        }
    }

    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity_field = field.into();
        self
    }

    fn wrap(&self, value: Value) -> Value {
        let mut result = Map::new();
        result.insert(self.identity_field.clone(), value);
        Value::Object(result)
    }
}

#[async_trait]
impl ApiTransport for DirectoryTransport {
    async fn run_query(&self, request: QueryRequest) -> warden_auth_core::Result<Value> {
        if request.abort.is_cancelled() {
            return Err(AuthError::Aborted);
        }

        let token = match request.token.as_deref() {
            Some(token) => token,
            None if request.auth_mode == AuthMode::Public => return Ok(self.wrap(Value::Null)),
            None => return Err(AuthError::ProviderNotAuthorized),
        };

        let claims = self.signer.verify(token).map_err(|e| {
            debug!(error = %e, "Rejecting request with an unverifiable token");
            AuthError::ProviderNotAuthorized
        })?;

        let user = self
            .directory
            .get(&claims.sub)
            .filter(|user| user.active && claims.iat >= user.sessions_valid_after)
            .ok_or(AuthError::ProviderNotAuthorized)?;

        let identity = serde_json::to_value(Identity::from(&user))
            .map_err(|e| AuthError::internal(format!("cannot encode identity: {}", e)))?;
        Ok(self.wrap(identity))
    }
}
