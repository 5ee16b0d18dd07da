//! Configuration for users-core

use std::path::Path;

use serde::{Deserialize, Serialize};
use warden_infra_common::config::load_config;

use crate::jwt::JwtConfig;
use crate::{Error, Result};

/// Environment prefix for overrides, e.g. `WARDEN_USERS_JWT__SECRET=...`
pub const ENV_PREFIX: &str = "WARDEN_USERS";

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UsersConfig {
    pub jwt: JwtConfig,
    pub password: PasswordConfig,
}

/// Password configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PasswordConfig {
    pub min_length: usize,
    pub require_uppercase: bool,
    pub require_lowercase: bool,
    pub require_numbers: bool,
    pub require_special: bool,
    pub argon2_memory_cost: u32,
    pub argon2_time_cost: u32,
    pub argon2_parallelism: u32,
}

impl UsersConfig {
    /// Load from an optional file plus `WARDEN_USERS_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self =
            load_config(path, ENV_PREFIX).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.jwt.access_ttl_seconds <= 0 {
            return Err(Error::Config(
                "jwt.access_ttl_seconds must be positive".to_string(),
            ));
        }
        if self.password.min_length == 0 {
            return Err(Error::Config(
                "password.min_length must be at least 1".to_string(),
            ));
        }
        if self.password.argon2_parallelism == 0 {
            return Err(Error::Config(
                "password.argon2_parallelism must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for PasswordConfig {
    fn default() -> Self {
        Self {
            min_length: 8,
            require_uppercase: true,
            require_lowercase: true,
            require_numbers: true,
            require_special: false,
            argon2_memory_cost: 65536,
            argon2_time_cost: 3,
            argon2_parallelism: 4,
        }
    }
}

impl PasswordConfig {
    /// Cheap hashing parameters for tests and local tooling
    pub fn low_cost() -> Self {
        Self {
            argon2_memory_cost: 1024,
            argon2_time_cost: 1,
            argon2_parallelism: 1,
            ..Self::default()
        }
    }
}
