//! Root module for the validation system.
//! Exposes the typed inputs that handlers build from raw request fields.

mod constants;
mod types;

pub use constants::*;
pub use types::{EmailInput, PasswordInput, PhoneInput, TextInput};
