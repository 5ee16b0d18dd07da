//! [`AuthProvider`] backed by the local directory

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{info, warn};
use warden_auth_core::{AuthError, AuthProvider, LoginInput};

use crate::directory::UserDirectory;
use crate::jwt::JwtSigner;

/// Verifies passwords against a [`UserDirectory`] and issues access tokens
#[derive(Debug, Clone)]
pub struct LocalAuthProvider {
    directory: Arc<UserDirectory>,
    signer: Arc<JwtSigner>,
}

impl LocalAuthProvider {
    pub fn new(directory: Arc<UserDirectory>, signer: Arc<JwtSigner>) -> Self {
        Self { directory, signer }
    }
}

#[async_trait]
impl AuthProvider for LocalAuthProvider {
    async fn login(&self, input: &LoginInput) -> warden_auth_core::Result<String> {
        let directory = self.directory.clone();
        let username = input.username.clone();
        let password = input.password.clone();

        // Argon2 is CPU bound
        let verified =
            tokio::task::spawn_blocking(move || directory.verify_credentials(&username, &password))
                .await
                .map_err(|e| AuthError::internal(format!("credential check panicked: {}", e)))?;

        let user = match verified {
            Ok(user) => user,
            Err(e) => {
                warn!(username = %input.username, "Login rejected");
                return Err(e.into());
            }
        };

        let token = self.signer.issue_access_token(&user)?;
        info!(username = %user.username, "Login accepted");
        Ok(token)
    }

    async fn username_exists(&self, username: &str) -> warden_auth_core::Result<bool> {
        Ok(self.directory.contains(username))
    }
}
