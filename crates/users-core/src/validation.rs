//! Input validation for registration

use once_cell::sync::Lazy;
use regex::Regex;
use validator::{Validate, ValidationError};

use crate::config::PasswordConfig;
use crate::directory::NewUser;
use crate::{Error, Result};

// Regex patterns for validation
static USERNAME_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_.-]{3,32}$").unwrap());
static EMAIL_REGEX: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());

const PASSWORD_MAX: usize = 128;

/// Field-level check used by the `NewUser` derive
pub fn validate_username_format(username: &str) -> std::result::Result<(), ValidationError> {
    if USERNAME_REGEX.is_match(username) {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_username_format"))
    }
}

/// Usernames are 3 to 32 characters of `[a-zA-Z0-9_.-]`
pub fn validate_username(username: &str) -> Result<()> {
    validate_username_format(username).map_err(|_| {
        Error::Validation(
            "username must be 3 to 32 characters of letters, digits, '_', '.' and '-'".to_string(),
        )
    })
}

/// Minimal shape check, deliverability is not our concern
pub fn validate_email(email: &str) -> Result<()> {
    if EMAIL_REGEX.is_match(email) {
        Ok(())
    } else {
        Err(Error::Validation(format!("invalid email address: {}", email)))
    }
}

/// Check a registration request: field rules, then the password policy
pub fn validate_new_user(policy: &PasswordConfig, request: &NewUser) -> Result<()> {
    request
        .validate()
        .map_err(|e| Error::Validation(e.to_string()))?;
    if let Some(email) = &request.email {
        validate_email(email)?;
    }
    validate_password(policy, &request.password, &request.username)
}

/// Check a password against the configured policy
pub fn validate_password(policy: &PasswordConfig, password: &str, username: &str) -> Result<()> {
    let length = password.chars().count();
    if length < policy.min_length {
        return Err(Error::Validation(format!(
            "password must be at least {} characters",
            policy.min_length
        )));
    }
    if length > PASSWORD_MAX {
        return Err(Error::Validation(format!(
            "password must be at most {} characters",
            PASSWORD_MAX
        )));
    }

    let has_upper = password.chars().any(char::is_uppercase);
    let has_lower = password.chars().any(char::is_lowercase);
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_special = password.chars().any(|c| !c.is_alphanumeric());

    if policy.require_uppercase && !has_upper {
        return Err(Error::Validation("password needs an uppercase letter".to_string()));
    }
    if policy.require_lowercase && !has_lower {
        return Err(Error::Validation("password needs a lowercase letter".to_string()));
    }
    if policy.require_numbers && !has_digit {
        return Err(Error::Validation("password needs a digit".to_string()));
    }
    if policy.require_special && !has_special {
        return Err(Error::Validation("password needs a special character".to_string()));
    }

    if !username.is_empty() && password.to_lowercase().contains(&username.to_lowercase()) {
        return Err(Error::Validation("password must not contain the username".to_string()));
    }
    Ok(())
}
