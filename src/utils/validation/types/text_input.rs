//! Validated free-text fields.
//!
//! Text is trimmed, checked for length, control characters and HTML, then
//! NFKC-normalized so that equal-looking strings compare equal.

use ammonia::is_html;
use anyhow::{bail, Context, Result};
use std::fmt;
use unicode_normalization::UnicodeNormalization;
use validator::ValidateNonControlCharacter;

use crate::utils::validation::{MAX_CONTENT_LENGTH, MAX_SHORT_CONTENT_LENGTH};

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TextInput {
    value: String,
}

impl TextInput {
    /// Clinical notes: diagnosis, treatment.
    pub fn new_long_form(content: &str) -> Result<Self> {
        Self::new(content, MAX_CONTENT_LENGTH).context("Invalid long text")
    }

    /// Names, reasons, medication entries, service labels.
    pub fn new_short_form(content: &str) -> Result<Self> {
        Self::new(content, MAX_SHORT_CONTENT_LENGTH).context("Invalid short text")
    }

    fn new(content: &str, max_length: usize) -> Result<Self> {
        let trimmed = content.trim();

        if trimmed.is_empty() {
            bail!("must not be blank");
        }

        if trimmed.chars().count() > max_length {
            bail!("must be at most {max_length} characters long");
        }

        if !trimmed.validate_non_control_character() {
            bail!("must not contain control characters");
        }

        if is_html(trimmed) {
            bail!("must not contain markup");
        }

        Ok(Self {
            value: trimmed.nfkc().collect::<String>(),
        })
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }

    pub fn into_inner(self) -> String {
        self.value
    }
}

impl fmt::Display for TextInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.value)
    }
}

impl AsRef<str> for TextInput {
    fn as_ref(&self) -> &str {
        &self.value
    }
}
