use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use haven_core::models::Booking;
use haven_core::Actor;
use haven_security::rate_limit::RateLimitAction;
use haven_security::validation;
use serde::Deserialize;
use uuid::Uuid;

use crate::error::ApiResult;
use crate::middleware::Caller;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/bookings/lookup", post(lookup_booking))
        .route("/v1/bookings/{booking_id}", get(get_booking))
        .route("/v1/bookings/{booking_id}/cancel", post(cancel_booking))
}

#[derive(Debug, Deserialize)]
pub struct GuestEmail {
    #[serde(default)]
    pub email: Option<String>,
}

/// Guest access counts against the booking-lookup limit for that email.
async fn resolve_actor(state: &AppState, caller: &Caller, email: Option<&str>) -> ApiResult<Actor> {
    let actor = caller.actor(email)?;
    if let Actor::Guest { email } = &actor {
        state
            .limiter
            .enforce(email, RateLimitAction::BookingLookup, state.now())
            .await?;
    }
    Ok(actor)
}

async fn get_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(booking_id): Path<Uuid>,
    Query(query): Query<GuestEmail>,
) -> ApiResult<Json<Booking>> {
    let actor = resolve_actor(&state, &caller, query.email.as_deref()).await?;
    let booking = state.guard.fetch_for(&actor, booking_id).await?;
    Ok(Json(booking))
}

#[derive(Debug, Deserialize)]
pub struct LookupBody {
    pub reference: String,
    pub email: String,
}

/// Reference plus contact email, for guests without an account.
async fn lookup_booking(
    State(state): State<AppState>,
    Json(body): Json<LookupBody>,
) -> ApiResult<Json<Booking>> {
    let email = validation::validate_email(&body.email)?;
    state
        .limiter
        .enforce(&email, RateLimitAction::BookingLookup, state.now())
        .await?;
    let booking = state.guard.fetch_by_reference(&body.reference, &email).await?;
    Ok(Json(booking))
}

async fn cancel_booking(
    State(state): State<AppState>,
    caller: Caller,
    Path(booking_id): Path<Uuid>,
    Query(query): Query<GuestEmail>,
) -> ApiResult<Json<Booking>> {
    let actor = resolve_actor(&state, &caller, query.email.as_deref()).await?;
    let booking = state
        .services
        .persister
        .cancel_booking(&actor, booking_id, state.now())
        .await?;
    Ok(Json(booking))
}
