//! Type definitions for the validation system

mod email_input;
mod password_input;
mod phone_input;
mod text_input;

pub use email_input::EmailInput;
pub use password_input::PasswordInput;
pub use phone_input::PhoneInput;
pub use text_input::TextInput;
