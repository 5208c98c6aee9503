//! Request extraction: the bearer-authenticated caller, and JSON, path and
//! query extractors whose rejections use the error envelope.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};

use crate::error::AppError;
use crate::models::Actor;
use crate::services::Service;

/// The caller of a protected route.
///
/// Installed as a route layer on every protected route, which caches the
/// resolved [`Actor`] in the request extensions for the handler.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Actor);

#[async_trait]
impl FromRequestParts<Service> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, service: &Service) -> Result<Self, Self::Rejection> {
        if let Some(actor) = parts.extensions.get::<Actor>() {
            return Ok(AuthUser(actor.clone()));
        }

        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(|| {
                AppError::authentication("You are not logged in! Please log in to get access.")
            })?;

        let actor = service.authenticate(token).await?;
        parts.extensions.insert(actor.clone());
        Ok(AuthUser(actor))
    }
}

#[derive(FromRequest)]
#[from_request(via(axum::Json), rejection(AppError))]
pub struct ApiJson<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Path), rejection(AppError))]
pub struct ApiPath<T>(pub T);

#[derive(FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(AppError))]
pub struct ApiQuery<T>(pub T);
