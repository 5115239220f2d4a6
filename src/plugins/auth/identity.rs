use async_trait::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;
use axum::http::StatusCode;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use crate::http_error::AppError;

#[derive(Serialize, Deserialize)]
struct Claims {
    sub: String,
    exp: usize,
}

/// Resolves bearer tokens issued by the identity provider to user ids.
#[derive(Clone)]
pub struct IdentityVerifier {
    decoding: Arc<DecodingKey>,
    validation: Arc<Validation>,
}

impl IdentityVerifier {
    pub fn new(secret: &str) -> Self {
        Self {
            decoding: Arc::new(DecodingKey::from_secret(secret.as_bytes())),
            validation: Arc::new(Validation::default()),
        }
    }

    pub fn verify(&self, token: &str) -> Result<Uuid, AppError> {
        let token_data = decode::<Claims>(token, &self.decoding, &self.validation)
            .map_err(|_| AppError::unauthorized("invalid token").with_code("invalid_token"))?;
        Uuid::parse_str(&token_data.claims.sub)
            .map_err(|_| AppError::unauthorized("invalid token subject").with_code("invalid_token"))
    }
}

/// Mints an HS256 token for `user_id`. Used by tests and local tooling; the
/// production issuer lives outside this service.
pub fn issue_token(secret: &str, user_id: Uuid, ttl: chrono::Duration) -> anyhow::Result<String> {
    let exp = (chrono::Utc::now() + ttl).timestamp() as usize;
    let claims = Claims { sub: user_id.to_string(), exp };
    Ok(encode(&Header::default(), &claims, &EncodingKey::from_secret(secret.as_bytes()))?)
}

fn bearer_token(parts: &Parts) -> Result<Option<&str>, AppError> {
    let Some(value) = parts.headers.get("authorization") else {
        return Ok(None);
    };
    let auth_hdr = value
        .to_str()
        .map_err(|_| AppError::unauthorized("invalid authorization header").with_code("invalid_token"))?;
    match auth_hdr.strip_prefix("Bearer ") {
        Some(token) => Ok(Some(token)),
        None => Err(AppError::unauthorized("invalid authorization header").with_code("invalid_token")),
    }
}

fn verifier(parts: &Parts) -> Result<IdentityVerifier, AppError> {
    parts.extensions.get::<IdentityVerifier>().cloned().ok_or_else(|| {
        tracing::error!("IdentityVerifier extension missing from router");
        AppError::new(StatusCode::INTERNAL_SERVER_ERROR, "authNotConfigured").with_code("config_error")
    })
}

/// Authenticated caller; rejects the request with 401 when absent.
#[derive(Clone, Debug)]
pub struct AuthUser {
    pub user_id: Uuid,
}

#[async_trait]
impl<S> FromRequestParts<S> for AuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?
            .ok_or_else(|| AppError::unauthorized("missing authorization").with_code("missing_token"))?;
        let user_id = verifier(parts)?.verify(token)?;
        Ok(AuthUser { user_id })
    }
}

/// Caller identity on routes where authentication is optional. A missing
/// header yields `None`; a malformed or invalid token is still a 401.
#[derive(Clone, Debug)]
pub struct MaybeAuthUser(pub Option<Uuid>);

#[async_trait]
impl<S> FromRequestParts<S> for MaybeAuthUser
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        match bearer_token(parts)? {
            None => Ok(MaybeAuthUser(None)),
            Some(token) => Ok(MaybeAuthUser(Some(verifier(parts)?.verify(token)?))),
        }
    }
}
