//! Constants used throughout the validation system

/// Maximum length for free-text clinical content (diagnosis, treatment)
pub const MAX_CONTENT_LENGTH: usize = 2_000;
/// Maximum length for names, reasons and other short fields
pub const MAX_SHORT_CONTENT_LENGTH: usize = 250;
/// Maximum length of an email address
pub const MAX_EMAIL_LENGTH: usize = 254;
/// Bounds on the number of digits in a phone number. The digits are the
/// default password of provisioned accounts, hence the lower bound.
pub const MIN_PHONE_DIGITS: usize = crate::consts::MIN_PASSWORD_LENGTH;
pub const MAX_PHONE_DIGITS: usize = 15;
