//! Represents a validated, normalized email address.
//!
//! Emails are compared case-insensitively everywhere in the system, so the
//! normalized form (trimmed, lowercased) is the only one ever stored.

use anyhow::{bail, Result};
use std::fmt;
use validator::ValidateEmail;

use crate::utils::validation::MAX_EMAIL_LENGTH;

/// A validated email address. Only constructible through [`EmailInput::new`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EmailInput {
    email: String,
}

impl EmailInput {
    /// Trims, checks the HTML5 email format and lowercases the address.
    pub fn new(email: &str) -> Result<Self> {
        let email_trimmed = email.trim();

        if email_trimmed.is_empty() {
            bail!("Email address cannot be empty");
        }

        if email_trimmed.len() > MAX_EMAIL_LENGTH {
            bail!("Email address exceeds maximum length of {MAX_EMAIL_LENGTH} characters");
        }

        if !email_trimmed.validate_email() {
            bail!("Invalid email format");
        }

        Ok(Self {
            email: email_trimmed.to_lowercase(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.email
    }

    pub fn into_inner(self) -> String {
        self.email
    }
}

impl fmt::Display for EmailInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.email)
    }
}

impl AsRef<str> for EmailInput {
    fn as_ref(&self) -> &str {
        &self.email
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_emails() {
        let valid_emails = vec![
            "user@example.com",
            "user.name@clinic.example.org",
            "user+tag@example.com",
            "USER@EXAMPLE.COM",
            "   user@example.com   ",
        ];

        for email in valid_emails {
            assert!(EmailInput::new(email).is_ok(), "Should accept valid email: {}", email);
        }
    }

    #[test]
    fn test_invalid_emails() {
        let binding = format!("{}@example.com", "a".repeat(250));
        let invalid_emails = vec!["", " ", "not-an-email", "@example.com", "user@", "user name@example.com", &binding];

        for email in invalid_emails {
            assert!(EmailInput::new(email).is_err(), "Should reject invalid email: {}", email);
        }
    }

    #[test]
    fn test_email_normalization() {
        let email = EmailInput::new("   Dr.House@Clinic.COM ").unwrap();
        assert_eq!(email.as_str(), "dr.house@clinic.com");
    }
}
