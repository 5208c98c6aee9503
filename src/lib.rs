//! Patient record management backend: role-based access to patients,
//! appointments, medical histories and invoices, with an audit trail.

pub mod audit;
pub mod authorization;
pub mod backend;
pub mod config;
pub mod consts;
pub mod db;
pub mod email;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

use axum::Router;

use crate::services::Service;

/// The complete HTTP application over `service`.
pub fn app(service: Service) -> Router {
    backend::router::get_router(service)
}
