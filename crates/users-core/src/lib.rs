//! # Users-Core
//!
//! Reference collaborators for `warden-auth-core`.
//!
//! This crate provides:
//! - An in-memory user directory with Argon2id password hashes
//! - JWT issuance and verification, also usable as the session layer's
//!   [`CredentialSigner`](warden_auth_core::CredentialSigner)
//! - A [`LocalAuthProvider`] that exchanges passwords for tokens
//! - A [`DirectoryTransport`] that answers identity queries
//!
//! ## Architecture
//!
//! Users-Core issues and verifies tokens; auth-core only decodes their claims
//! to reason about expiry and drives the session lifecycle around them.

pub mod config;
pub mod directory;
pub mod error;
pub mod jwt;
pub mod provider;
pub mod transport;
pub mod validation;

pub use config::{PasswordConfig, UsersConfig};
pub use directory::{NewUser, User, UserDirectory};
pub use error::{Error, Result};
pub use jwt::{JwtConfig, JwtSigner, UserClaims};
pub use provider::LocalAuthProvider;
pub use transport::DirectoryTransport;

use std::sync::Arc;

use warden_auth_core::Clock;

/// Collaborators sharing one directory and one signer
#[derive(Debug, Clone)]
pub struct Users {
    pub directory: Arc<UserDirectory>,
    pub signer: Arc<JwtSigner>,
    pub provider: Arc<LocalAuthProvider>,
    pub transport: Arc<DirectoryTransport>,
}

/// Initialize the users-core collaborators
pub fn init(config: UsersConfig, clock: Arc<dyn Clock>) -> Result<Users> {
    config.validate()?;

    let directory = Arc::new(UserDirectory::new(config.password)?);
    let signer = Arc::new(JwtSigner::new(config.jwt, clock)?);

    Ok(Users {
        provider: Arc::new(LocalAuthProvider::new(directory.clone(), signer.clone())),
        transport: Arc::new(DirectoryTransport::new(directory.clone(), signer.clone())),
        directory,
        signer,
    })
}
