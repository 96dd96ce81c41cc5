use async_trait::async_trait;
use axum::{extract::FromRequestParts, http::request::Parts, http::HeaderMap};
use std::convert::Infallible;
use std::sync::Arc;

use crate::app::AppState;
use crate::auth::{IdentityProvider, JwtVerifier};
use crate::database::UserId;

/// Caller identity carried by the request's bearer token.
///
/// Extraction never rejects: a missing or invalid token simply resolves to
/// no user, and each ledger operation decides what that means (empty list
/// or `Unauthenticated`).
#[derive(Clone)]
pub struct BearerIdentity {
    token: Option<String>,
    verifier: Arc<JwtVerifier>,
}

impl BearerIdentity {
    pub fn new(token: Option<String>, verifier: Arc<JwtVerifier>) -> Self {
        Self { token, verifier }
    }

    pub fn from_headers(headers: &HeaderMap, verifier: Arc<JwtVerifier>) -> Self {
        let token = match extract_jwt_from_headers(headers) {
            Ok(token) => Some(token),
            Err(reason) => {
                tracing::debug!("No caller identity: {}", reason);
                None
            }
        };
        Self::new(token, verifier)
    }
}

#[async_trait]
impl FromRequestParts<AppState> for BearerIdentity {
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        Ok(Self::from_headers(&parts.headers, state.verifier.clone()))
    }
}

#[async_trait]
impl IdentityProvider for BearerIdentity {
    async fn resolve_current_user(&self) -> Option<UserId> {
        let token = self.token.as_deref()?;
        match self.verifier.verify(token) {
            Ok(claims) => Some(claims.sub),
            Err(e) => {
                tracing::warn!("Rejected access token: {}", e);
                None
            }
        }
    }
}

/// Extract JWT token from Authorization header
pub fn extract_jwt_from_headers(headers: &HeaderMap) -> Result<String, String> {
    let auth_header = headers
        .get(axum::http::header::AUTHORIZATION)
        .ok_or_else(|| "Missing Authorization header".to_string())?;

    let auth_str = auth_header
        .to_str()
        .map_err(|_| "Invalid Authorization header format".to_string())?;

    if let Some(token) = auth_str.strip_prefix("Bearer ") {
        if token.trim().is_empty() {
            return Err("Empty JWT token".to_string());
        }
        Ok(token.trim().to_string())
    } else {
        Err("Authorization header must use Bearer token format".to_string())
    }
}
