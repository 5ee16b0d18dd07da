//! Configuration for the session orchestration layer

use std::path::Path;

use serde::{Deserialize, Serialize};
use warden_infra_common::config::load_config;

use crate::error::{AuthError, Result};

/// Environment prefix for overrides, e.g. `WARDEN_EXPIRY_MARGIN_SECS=60`
pub const ENV_PREFIX: &str = "WARDEN";

/// Main configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Permits expiring within this many seconds are treated as invalid
    pub expiry_margin_secs: i64,
    /// Keys of the persisted session fields
    pub storage_keys: StorageKeys,
    /// Navigation targets for redirect responses
    pub routes: RouteConfig,
    /// Query sent to fetch the identity of a freshly issued permit
    pub identity_query: String,
    /// Field of the query result holding the identity; the whole result is
    /// used when the field is absent
    pub identity_field: String,
    /// How far a state subscriber may fall behind before skipping states
    pub state_channel_capacity: usize,
    /// Number of state transitions kept for auditing
    pub history_capacity: usize,
}

/// Storage keys for the persisted session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageKeys {
    pub token: String,
    pub username: String,
    pub expires: String,
}

/// Route paths used when interpreting redirect responses
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    pub login_page: String,
    pub default_page: String,
    pub last_content_route: String,
    pub after_logout: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            expiry_margin_secs: 30,
            storage_keys: StorageKeys::default(),
            routes: RouteConfig::default(),
            identity_query: "query Me { me { id email firstName lastName } }".to_string(),
            identity_field: "me".to_string(),
            state_channel_capacity: 64,
            history_capacity: 16,
        }
    }
}

impl Default for StorageKeys {
    fn default() -> Self {
        Self {
            token: "auth.token".to_string(),
            username: "auth.username".to_string(),
            expires: "auth.expires".to_string(),
        }
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            login_page: "/login".to_string(),
            default_page: "/".to_string(),
            last_content_route: "/".to_string(),
            after_logout: "/login".to_string(),
        }
    }
}

impl AuthConfig {
    /// Load from an optional file plus `WARDEN_*` environment variables
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config: Self =
            load_config(path, ENV_PREFIX).map_err(|e| AuthError::ConfigError(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_expiry_margin(mut self, secs: i64) -> Self {
        self.expiry_margin_secs = secs;
        self
    }

    pub fn with_routes(mut self, routes: RouteConfig) -> Self {
        self.routes = routes;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.expiry_margin_secs < 0 {
            return Err(AuthError::ConfigError(
                "expiry_margin_secs must not be negative".to_string(),
            ));
        }
        if self.state_channel_capacity == 0 {
            return Err(AuthError::ConfigError(
                "state_channel_capacity must be at least 1".to_string(),
            ));
        }
        if self.history_capacity == 0 {
            return Err(AuthError::ConfigError(
                "history_capacity must be at least 1".to_string(),
            ));
        }
        let keys = [
            &self.storage_keys.token,
            &self.storage_keys.username,
            &self.storage_keys.expires,
        ];
        if keys.iter().any(|key| key.is_empty()) {
            return Err(AuthError::ConfigError("storage keys must not be empty".to_string()));
        }
        if self.identity_query.trim().is_empty() {
            return Err(AuthError::ConfigError("identity_query must not be empty".to_string()));
        }
        Ok(())
    }
}
