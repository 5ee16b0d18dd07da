//! Layered configuration loading
//!
//! Sources are applied in order, later ones overriding earlier ones:
//! serde defaults of the target type, an optional file (format picked from
//! the extension), then environment variables such as
//! `WARDEN_ROUTES__LOGIN_PAGE=/signin` for prefix `WARDEN`.

use std::path::Path;

use config::{Config, Environment, File};
use serde::de::DeserializeOwned;

use crate::errors::types::{Error, Result};

/// Separator between nested keys in environment variable names
pub const ENV_SEPARATOR: &str = "__";

/// Load a configuration value from an optional file and the environment
pub fn load_config<T: DeserializeOwned>(path: Option<&Path>, env_prefix: &str) -> Result<T> {
    let mut builder = Config::builder();

    if let Some(path) = path {
        if !path.exists() {
            return Err(Error::Config(format!(
                "Configuration file not found: {}",
                path.display()
            )));
        }
        builder = builder.add_source(File::from(path));
    }

    builder = builder.add_source(
        Environment::with_prefix(env_prefix)
            .prefix_separator("_")
            .separator(ENV_SEPARATOR),
    );

    builder
        .build()
        .and_then(|cfg| cfg.try_deserialize::<T>())
        .map_err(|e| Error::Config(e.to_string()))
}
