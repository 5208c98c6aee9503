//! Phone numbers, kept as digits only.
//!
//! The normalized form is also the default password of auto-provisioned
//! accounts, so formatting characters must never survive.

use anyhow::{bail, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::fmt;

use crate::utils::validation::{MAX_PHONE_DIGITS, MIN_PHONE_DIGITS};

static NON_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\D").expect("Failed to compile phone regex"));

static PHONE_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9 ().\-]+$").expect("Failed to compile phone regex"));

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PhoneInput {
    digits: String,
}

impl PhoneInput {
    pub fn new(phone: &str) -> Result<Self> {
        let trimmed = phone.trim();

        if trimmed.is_empty() {
            bail!("Phone number cannot be empty");
        }

        if !PHONE_CHARS.is_match(trimmed) {
            bail!("Phone number contains invalid characters");
        }

        let digits = Self::normalize(trimmed);
        if !(MIN_PHONE_DIGITS..=MAX_PHONE_DIGITS).contains(&digits.len()) {
            bail!("Phone number must have between {MIN_PHONE_DIGITS} and {MAX_PHONE_DIGITS} digits");
        }

        Ok(Self { digits })
    }

    /// Strips everything but digits.
    pub fn normalize(phone: &str) -> String {
        NON_DIGITS.replace_all(phone, "").into_owned()
    }

    pub fn as_str(&self) -> &str {
        &self.digits
    }

    pub fn into_inner(self) -> String {
        self.digits
    }
}

impl fmt::Display for PhoneInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.digits)
    }
}
