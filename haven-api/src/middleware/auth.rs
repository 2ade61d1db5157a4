use axum::{
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use axum_extra::headers::{authorization::Bearer, Authorization};
use axum_extra::TypedHeader;
use haven_booking::Session;
use haven_core::models::{AuditEvent, SecurityEventType, Severity};
use haven_core::Actor;
use haven_security::{validation, RateLimitAction};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use super::rate_limit::client_ip;
use crate::error::AppError;
use crate::state::AppState;

/// Claims in tokens issued by the identity provider.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct UserClaims {
    pub sub: String,
    #[serde(default)]
    pub email: Option<String>,
    pub exp: usize,
}

/// Whoever is calling. A request without `Authorization` is a guest; one
/// with a bad token is rejected rather than downgraded.
#[derive(Debug, Clone)]
pub struct Caller(pub Option<UserClaims>);

impl Caller {
    pub fn session(&self) -> Session {
        match &self.0 {
            Some(claims) => Session::Authenticated {
                user_id: claims.sub.clone(),
                email: claims.email.clone(),
            },
            None => Session::Anonymous,
        }
    }

    pub fn user_actor(&self) -> Option<Actor> {
        self.0
            .as_ref()
            .map(|claims| Actor::user(claims.sub.clone(), claims.email.clone()))
    }

    /// Signed-in users act as themselves; guests are identified by the
    /// booking email they supply.
    pub fn actor(&self, guest_email: Option<&str>) -> Result<Actor, AppError> {
        if let Some(actor) = self.user_actor() {
            return Ok(actor);
        }
        let email = guest_email.ok_or_else(|| {
            AppError::Unauthorized("Sign in or provide the email used for the booking".into())
        })?;
        let email = validation::validate_email(email)?;
        Ok(Actor::guest(&email))
    }
}

impl FromRequestParts<AppState> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        if !parts.headers.contains_key(AUTHORIZATION) {
            return Ok(Caller(None));
        }

        let TypedHeader(Authorization(bearer)) =
            TypedHeader::<Authorization<Bearer>>::from_request_parts(parts, state)
                .await
                .map_err(|_| AppError::Unauthorized("Malformed authorization header".into()))?;

        match decode::<UserClaims>(
            bearer.token(),
            &DecodingKey::from_secret(state.auth.secret.as_bytes()),
            &Validation::default(),
        ) {
            Ok(token_data) => {
                state
                    .audit
                    .record(
                        AuditEvent::new(SecurityEventType::AuthSuccess, Severity::Info)
                            .actor(format!("user:{}", token_data.claims.sub)),
                    )
                    .await;
                Ok(Caller(Some(token_data.claims)))
            }
            Err(e) => {
                let ip = client_ip(&parts.extensions, &parts.headers);
                warn!("Rejected bearer token from {}: {}", ip, e);
                state
                    .audit
                    .record(
                        AuditEvent::new(SecurityEventType::AuthFailure, Severity::Warning)
                            .actor(format!("ip:{}", ip))
                            .details(json!({ "reason": e.to_string() })),
                    )
                    .await;
                // Repeated bad tokens from one address turn into 429s.
                state
                    .limiter
                    .enforce(&ip, RateLimitAction::Login, state.now())
                    .await?;
                Err(AppError::Unauthorized("Invalid or expired token".into()))
            }
        }
    }
}
