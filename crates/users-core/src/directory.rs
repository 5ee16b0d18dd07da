//! In-memory user directory with Argon2id password hashes

use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::{Algorithm, Argon2, Params, Version};
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;
use validator::Validate;
use warden_auth_core::Identity;

use crate::config::PasswordConfig;
use crate::validation::{validate_new_user, validate_username_format};
use crate::{Error, Result};

/// User account
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    /// Tokens issued before this epoch second are no longer honoured
    pub sessions_valid_after: i64,
}

/// Request to create a new user
#[derive(Clone, Default, Deserialize, Validate)]
pub struct NewUser {
    #[validate(length(min = 3, max = 32), custom(function = "validate_username_format"))]
    pub username: String,

    #[validate(length(min = 1, max = 128))]
    pub password: String,

    #[validate(email)]
    pub email: Option<String>,

    #[validate(length(max = 100))]
    pub first_name: Option<String>,

    #[validate(length(max = 100))]
    pub last_name: Option<String>,
}

impl std::fmt::Debug for NewUser {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NewUser")
            .field("username", &self.username)
            .field("password", &"[REDACTED]")
            .field("email", &self.email)
            .finish_non_exhaustive()
    }
}

impl NewUser {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
            ..Self::default()
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn with_name(mut self, first_name: impl Into<String>, last_name: impl Into<String>) -> Self {
        self.first_name = Some(first_name.into());
        self.last_name = Some(last_name.into());
        self
    }
}

impl From<&User> for Identity {
    fn from(user: &User) -> Self {
        Identity {
            id: user.id.clone(),
            email: user.email.clone(),
            first_name: user.first_name.clone(),
            last_name: user.last_name.clone(),
        }
    }
}

/// Users keyed by username
pub struct UserDirectory {
    users: DashMap<String, User>,
    policy: PasswordConfig,
    hasher: Argon2<'static>,
}

impl std::fmt::Debug for UserDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserDirectory")
            .field("users", &self.users.len())
            .finish_non_exhaustive()
    }
}

impl UserDirectory {
    pub fn new(policy: PasswordConfig) -> Result<Self> {
        let params = Params::new(
            policy.argon2_memory_cost,
            policy.argon2_time_cost,
            policy.argon2_parallelism,
            None,
        )?;

        Ok(Self {
            users: DashMap::new(),
            hasher: Argon2::new(Algorithm::Argon2id, Version::V0x13, params),
            policy,
        })
    }

    /// Validate, hash and store a new account
    pub fn register(&self, request: NewUser) -> Result<User> {
        validate_new_user(&self.policy, &request)?;
        if self.users.contains_key(&request.username) {
            return Err(Error::UserAlreadyExists(request.username));
        }

        // Hash outside the shard lock; the entry is re-checked below.
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .hasher
            .hash_password(request.password.as_bytes(), &salt)?
            .to_string();

        let entry = match self.users.entry(request.username.clone()) {
            Entry::Occupied(_) => return Err(Error::UserAlreadyExists(request.username)),
            Entry::Vacant(entry) => entry,
        };

        let user = User {
            id: Uuid::new_v4().to_string(),
            username: request.username,
            email: request.email,
            first_name: request.first_name,
            last_name: request.last_name,
            password_hash,
            active: true,
            created_at: Utc::now(),
            sessions_valid_after: 0,
        };

        info!(username = %user.username, id = %user.id, "Registered user");
        entry.insert(user.clone());
        Ok(user)
    }

    /// Check a username/password pair
    ///
    /// Unknown, inactive and mismatching accounts all fail the same way.
    pub fn verify_credentials(&self, username: &str, password: &str) -> Result<User> {
        let user = self.get(username).ok_or(Error::InvalidCredentials)?;
        if !user.active {
            debug!(username, "Login attempt for inactive user");
            return Err(Error::InvalidCredentials);
        }

        let parsed = PasswordHash::new(&user.password_hash)?;
        self.hasher
            .verify_password(password.as_bytes(), &parsed)
            .map_err(|_| Error::InvalidCredentials)?;
        Ok(user)
    }

    pub fn contains(&self, username: &str) -> bool {
        self.users.contains_key(username)
    }

    pub fn get(&self, username: &str) -> Option<User> {
        self.users.get(username).map(|user| user.clone())
    }

    pub fn deactivate(&self, username: &str) -> Result<()> {
        let mut user = self
            .users
            .get_mut(username)
            .ok_or_else(|| Error::UserNotFound(username.to_string()))?;
        user.active = false;
        info!(username, "Deactivated user");
        Ok(())
    }

    /// Reject every token for `username` issued before `at`
    pub fn revoke_sessions(&self, username: &str, at: i64) -> Result<()> {
        let mut user = self
            .users
            .get_mut(username)
            .ok_or_else(|| Error::UserNotFound(username.to_string()))?;
        user.sessions_valid_after = at;
        info!(username, at, "Revoked sessions");
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
