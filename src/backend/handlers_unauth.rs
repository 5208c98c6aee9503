//! Routes reachable without a bearer token.

use axum::{extract::State, response::IntoResponse, Json};
use http::StatusCode;

use crate::backend::middlewares::{ApiJson, ApiPath};
use crate::backend::models::{AuthResponse, Success};
use crate::error::AppResult;
use crate::services::auth::{ForgotPasswordRequest, ResetPasswordRequest, SigninRequest, SignupRequest};
use crate::services::Service;

pub async fn index() -> &'static str {
    "Welcome to the PRMS API!"
}

pub async fn signup(
    State(service): State<Service>,
    ApiJson(request): ApiJson<SignupRequest>,
) -> AppResult<impl IntoResponse> {
    let session = service.signup(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(AuthResponse::new("User registered successfully", &session.user, session.token)),
    ))
}

pub async fn signin(
    State(service): State<Service>,
    ApiJson(request): ApiJson<SigninRequest>,
) -> AppResult<impl IntoResponse> {
    let session = service.signin(request).await?;
    Ok(Json(AuthResponse::new("Login successful", &session.user, session.token)))
}

pub async fn forgot_password(
    State(service): State<Service>,
    ApiJson(request): ApiJson<ForgotPasswordRequest>,
) -> AppResult<impl IntoResponse> {
    service.forgot_password(request).await?;
    Ok(Success::new().message("Token sent to email!"))
}

pub async fn reset_password(
    State(service): State<Service>,
    ApiPath(token): ApiPath<String>,
    ApiJson(request): ApiJson<ResetPasswordRequest>,
) -> AppResult<impl IntoResponse> {
    let session = service.reset_password(&token, request).await?;
    Ok(Json(AuthResponse::new("Password reset successful", &session.user, session.token)))
}
