//! Request extractors: bearer authentication and validated JSON bodies.

use crate::{dto::Validate, errors::AppError, models::User, AppState};
use axum::{
    extract::{FromRequest, FromRequestParts, Request},
    http::{header, request::Parts},
    Json,
};
use serde::de::DeserializeOwned;
use std::sync::Arc;

/// The user behind a valid `Authorization: Bearer <access token>` header.
///
/// List it before any body extractor so a missing token is reported as 401
/// even when the body is also malformed.
#[derive(Debug, Clone)]
pub struct AuthUser(pub User);

fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let value = parts
        .headers
        .get(header::AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Unauthorized("authorization header is not valid text".to_string()))?;

    match value.split_once(' ') {
        Some((scheme, token)) if scheme.eq_ignore_ascii_case("bearer") && !token.trim().is_empty() => Ok(token.trim()),
        _ => Err(AppError::Unauthorized("expected a bearer token".to_string())),
    }
}

impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &Arc<AppState>) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;
        let user = state.accounts.user_for_access_token(token).await?;
        tracing::debug!(user_id = user.id, "Authenticated request");
        Ok(AuthUser(user))
    }
}

/// JSON body that has been deserialized and passed [`Validate`]. Every
/// rejection, including a wrong content type, is a 400.
#[derive(Debug)]
pub struct ValidatedJson<T>(pub T);

impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|rejection| AppError::BadRequest(rejection.body_text()))?;
        value.validate()?;
        Ok(ValidatedJson(value))
    }
}
