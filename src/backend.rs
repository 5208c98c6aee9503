//! HTTP layer: routes, bearer authentication and response bodies.
pub mod handlers_auth;
pub mod handlers_unauth;
pub mod middlewares;
pub mod rate_limit;
mod models;
pub mod router;
