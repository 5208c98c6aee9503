//! Route table. Protected routes go through the bearer extractor first.

use std::time::Duration;

use anyhow::anyhow;
use axum::{
    http::Uri,
    middleware,
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::catch_panic::CatchPanicLayer;
use tower_http::cors::{AllowMethods, Any, CorsLayer};

use crate::backend::handlers_auth::*;
use crate::backend::handlers_unauth::{forgot_password, index, reset_password, signin, signup};
use crate::backend::middlewares::AuthUser;
use crate::backend::rate_limit::{limit, RateLimiter};
use crate::error::AppError;
use crate::services::Service;

pub fn get_router(service: Service) -> Router {
    let layers = ServiceBuilder::new().layer(CatchPanicLayer::custom(panic_response));

    let limits = service.rate_limits();
    let window = Duration::from_secs(limits.window_secs);
    let auth_limiter = RateLimiter::new(
        limits.auth,
        window,
        "Too many login attempts. Try again in an hour.",
    );
    let api_limiter = RateLimiter::new(limits.api, window, "Too many requests. Please try again later.");

    // Requests under /api/auth count against both limits
    let api = Router::new()
        .merge(account_routes().route_layer(middleware::from_fn_with_state(auth_limiter, limit)))
        .merge(auth_routes(service.clone()))
        .route_layer(middleware::from_fn_with_state(api_limiter, limit));

    let router = Router::new()
        .route("/", get(index))
        .merge(api)
        .fallback(route_not_found)
        .layer(layers)
        .with_state(service);

    // Any origin, in debug builds only
    if cfg!(debug_assertions) {
        let cors = CorsLayer::new()
            .allow_methods(AllowMethods::any())
            .allow_headers(Any)
            .allow_origin(Any);
        router.layer(cors)
    } else {
        router
    }
}

fn account_routes() -> Router<Service> {
    Router::new()
        .route("/api/auth/signup", post(signup))
        .route("/api/auth/signin", post(signin))
        .route("/api/auth/forgot-password", post(forgot_password))
        .route("/api/auth/reset-password/:token", patch(reset_password))
}

fn auth_routes(service: Service) -> Router<Service> {
    Router::new()
        .route("/api/patient", get(list_patients).post(create_patient))
        .route("/api/patient/patients/search", get(search_patients))
        .route(
            "/api/patient/:id",
            get(get_patient).patch(update_patient).delete(delete_patient),
        )
        .route("/api/appointments", get(list_appointments).post(create_appointment))
        .route("/api/appointments/my-appointments", get(my_appointments))
        .route("/api/appointments/patient/:id", get(patient_appointments))
        .route("/api/appointments/:id/status", patch(update_appointment_status))
        .route(
            "/api/appointments/:id",
            patch(update_appointment).delete(delete_appointment),
        )
        .route("/api/patients/:id/history", get(patient_history).post(create_history))
        .route("/api/history/:id", patch(update_history).delete(delete_history))
        .route("/api/invoices", get(list_invoices).post(create_invoice))
        .route("/api/invoices/:id", get(get_invoice))
        .route("/api/invoices/:id/pay", patch(pay_invoice))
        .route("/api/users", get(list_users))
        .route("/api/users/:id", delete(delete_user))
        .route("/api/users/:id/role", patch(update_user_role))
        .route("/api/users/:id/status", patch(update_user_status))
        .route("/api/audit-logs", get(audit_logs))
        .route("/api/reports/summary", get(summary))
        .route("/api/reports/appointments-by-date", get(appointments_by_date))
        .route("/api/reports/frequent-diagnoses", get(frequent_diagnoses))
        .route("/api/profile/me", get(get_profile).put(update_profile))
        .route_layer(middleware::from_extractor_with_state::<AuthUser, Service>(service))
}

async fn route_not_found(uri: Uri) -> AppError {
    AppError::not_found(format!("Can't find {uri} on this server"))
}

fn panic_response(_: Box<dyn std::any::Any + Send + 'static>) -> Response {
    AppError::Internal(anyhow!("Handler panicked")).into_response()
}
