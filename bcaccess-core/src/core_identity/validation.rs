//! Validation module
//!
//! Stateless checks on human input. Everything here runs before the key
//! store or the network is touched.

use std::fmt;
use thiserror::Error;
use zeroize::Zeroize;

/// Minimum number of bytes in a password
pub const MIN_PASSWORD_LENGTH: usize = 8;

/// Minimum alias length in characters
pub const MIN_ALIAS_LENGTH: usize = 1;

/// Maximum alias length in characters
pub const MAX_ALIAS_LENGTH: usize = 100;

/// Validation errors
///
/// The password messages are the canonical user-facing texts.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("Password Too Short: {length} Minimum: {minimum}")]
    PasswordTooShort { length: usize, minimum: usize },

    #[error("Passwords Do Not Match")]
    PasswordsDoNotMatch,

    #[error("Alias Too Short: {length} Minimum: {minimum}")]
    AliasTooShort { length: usize, minimum: usize },

    #[error("Alias Too Long: {length} Maximum: {maximum}")]
    AliasTooLong { length: usize, maximum: usize },

    #[error("Invalid Alias: {0}")]
    InvalidAlias(String),

    #[error("Invalid Access Code")]
    InvalidAccessCode,

    #[error("Invalid Host: {0}")]
    InvalidHost(String),
}

/// Password bytes, zeroized on drop and never printed
#[derive(Clone, PartialEq, Eq)]
pub struct Password(Vec<u8>);

impl Password {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Password(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for Password {
    fn from(s: &str) -> Self {
        Password(s.as_bytes().to_vec())
    }
}

impl From<String> for Password {
    fn from(s: String) -> Self {
        Password(s.into_bytes())
    }
}

impl fmt::Debug for Password {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Password(<redacted>)")
    }
}

impl Drop for Password {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

/// Check alias length and charset
pub fn validate_alias(alias: &str) -> Result<(), ValidationError> {
    let length = alias.chars().count();
    if length < MIN_ALIAS_LENGTH {
        return Err(ValidationError::AliasTooShort {
            length,
            minimum: MIN_ALIAS_LENGTH,
        });
    }
    if length > MAX_ALIAS_LENGTH {
        return Err(ValidationError::AliasTooLong {
            length,
            maximum: MAX_ALIAS_LENGTH,
        });
    }
    let valid = alias
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_'));
    if !valid {
        return Err(ValidationError::InvalidAlias(alias.to_string()));
    }
    Ok(())
}

/// Check the minimum-length policy
pub fn validate_password(password: &Password, minimum: usize) -> Result<(), ValidationError> {
    if password.len() < minimum {
        return Err(ValidationError::PasswordTooShort {
            length: password.len(),
            minimum,
        });
    }
    Ok(())
}

/// Password and confirmation must be byte-equal
pub fn validate_confirmation(
    password: &Password,
    confirm: &Password,
) -> Result<(), ValidationError> {
    if password.as_bytes() != confirm.as_bytes() {
        return Err(ValidationError::PasswordsDoNotMatch);
    }
    Ok(())
}

/// Access codes are opaque but never empty or padded with whitespace
pub fn validate_access_code(code: &str) -> Result<(), ValidationError> {
    if code.is_empty() || code.trim() != code {
        return Err(ValidationError::InvalidAccessCode);
    }
    Ok(())
}

/// Host names are used as directory and map keys by exchanges
pub fn validate_host(host: &str) -> Result<(), ValidationError> {
    let valid = !host.is_empty()
        && host
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':'));
    if !valid {
        return Err(ValidationError::InvalidHost(host.to_string()));
    }
    Ok(())
}
