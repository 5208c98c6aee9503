pub mod password_utils;
pub mod tokens;
pub mod validation;
