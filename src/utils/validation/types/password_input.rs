//! A plaintext password that passed the length policy.
//!
//! Never serialized, never logged: `Debug` is redacted.

use anyhow::{bail, Result};
use std::fmt;

use crate::consts::{MAX_PASSWORD_LENGTH, MIN_PASSWORD_LENGTH};

#[derive(Clone, PartialEq, Eq)]
pub struct PasswordInput(String);

impl PasswordInput {
    pub fn new(password: &str) -> Result<Self> {
        let length = password.chars().count();
        if length < MIN_PASSWORD_LENGTH || length > MAX_PASSWORD_LENGTH {
            bail!(
                "Password must be between {MIN_PASSWORD_LENGTH} and {MAX_PASSWORD_LENGTH} characters long"
            );
        }
        if password.trim().is_empty() {
            bail!("Password cannot be blank");
        }
        Ok(Self(password.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for PasswordInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("PasswordInput(***)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_length_bounds() {
        assert!(PasswordInput::new("short").is_err());
        assert!(PasswordInput::new("        ").is_err());
        assert!(PasswordInput::new(&"x".repeat(MAX_PASSWORD_LENGTH + 1)).is_err());
        assert!(PasswordInput::new("correct horse").is_ok());
    }

    #[test]
    fn test_debug_is_redacted() {
        let password = PasswordInput::new("correct horse").unwrap();
        assert!(!format!("{password:?}").contains("horse"));
    }
}
