use axum::{
    extract::{Path, Query, State},
    routing::{get, post},
    Json, Router,
};
use chrono::NaiveDate;
use haven_catalog::{DayAvailability, PriceBreakdown, StayQuoteRequest};
use haven_core::models::{DiscountApplication, StayDates};
use haven_core::CoreError;
use haven_discount::DiscountContext;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ApiResult;
use crate::middleware::Caller;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/quotes/stay", post(quote_stay))
        .route("/v1/quotes/experience", post(quote_experience))
        .route("/v1/properties/{property_id}/availability", get(property_calendar))
        .route("/v1/experiences/{instance_id}/availability", get(experience_capacity))
        .route("/v1/discounts/validate", post(validate_discount))
}

#[derive(Debug, Deserialize)]
pub struct StayQuoteBody {
    pub property_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
    #[serde(default)]
    pub discount_code: Option<String>,
    #[serde(default)]
    pub billing_state: Option<String>,
    #[serde(default)]
    pub display_currency: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct StayQuoteResponse {
    pub quote: PriceBreakdown,
    pub discount: Option<DiscountApplication>,
}

/// Prices a stay, optionally with a code. A rejected code still yields the
/// undiscounted quote alongside the reason.
async fn quote_stay(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<StayQuoteBody>,
) -> ApiResult<Json<StayQuoteResponse>> {
    let stay = StayDates::new(body.check_in, body.check_out)?;
    if body.guests == 0 {
        return Err(CoreError::validation("guests", "At least one guest is required").into());
    }

    let mut request = StayQuoteRequest {
        property_id: body.property_id,
        stay,
        guests: body.guests,
        discount: None,
        display_currency: body.display_currency,
        billing_state: body.billing_state,
    };
    let quote = state.services.pricing.calculate_property_price(&request).await?;

    let Some(code) = body.discount_code.filter(|c| !c.trim().is_empty()) else {
        return Ok(Json(StayQuoteResponse {
            quote,
            discount: None,
        }));
    };

    let context = DiscountContext {
        property_id: body.property_id,
        stay,
        guests: body.guests,
        subtotal_minor: quote.discountable_subtotal(),
    };
    let actor = caller.user_actor();
    let application = state
        .services
        .discounts
        .validate(&code, &context, actor.as_ref(), state.now())
        .await;

    if !application.is_valid {
        return Ok(Json(StayQuoteResponse {
            quote,
            discount: Some(application),
        }));
    }

    request.discount = Some(application.clone());
    let quote = state.services.pricing.calculate_property_price(&request).await?;
    Ok(Json(StayQuoteResponse {
        quote,
        discount: Some(application),
    }))
}

#[derive(Debug, Deserialize)]
pub struct ExperienceQuoteBody {
    pub instance_id: Uuid,
    pub attendees: u32,
    #[serde(default)]
    pub display_currency: Option<String>,
}

async fn quote_experience(
    State(state): State<AppState>,
    Json(body): Json<ExperienceQuoteBody>,
) -> ApiResult<Json<PriceBreakdown>> {
    if body.attendees == 0 {
        return Err(CoreError::validation("attendees", "At least one attendee is required").into());
    }
    let quote = state
        .services
        .pricing
        .calculate_experience_price(
            body.instance_id,
            body.attendees,
            body.display_currency.as_deref(),
        )
        .await?;
    Ok(Json(quote))
}

#[derive(Debug, Deserialize)]
pub struct CalendarQuery {
    pub from: NaiveDate,
    pub to: NaiveDate,
}

async fn property_calendar(
    State(state): State<AppState>,
    Path(property_id): Path<Uuid>,
    Query(range): Query<CalendarQuery>,
) -> ApiResult<Json<Vec<DayAvailability>>> {
    if range.to <= range.from {
        return Err(CoreError::validation("to", "End date must be after start date").into());
    }
    let days = state
        .services
        .availability
        .check_property_detailed(property_id, range.from, range.to)
        .await;
    Ok(Json(days))
}

#[derive(Debug, Deserialize)]
pub struct CapacityQuery {
    pub attendees: u32,
}

#[derive(Debug, Serialize)]
pub struct CapacityResponse {
    pub instance_id: Uuid,
    pub attendees: u32,
    pub is_available: bool,
}

async fn experience_capacity(
    State(state): State<AppState>,
    Path(instance_id): Path<Uuid>,
    Query(query): Query<CapacityQuery>,
) -> Json<CapacityResponse> {
    let is_available = state
        .services
        .availability
        .check_experience(instance_id, query.attendees)
        .await;
    Json(CapacityResponse {
        instance_id,
        attendees: query.attendees,
        is_available,
    })
}

#[derive(Debug, Deserialize)]
pub struct DiscountCheckBody {
    pub code: String,
    pub property_id: Uuid,
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
    pub guests: u32,
}

async fn validate_discount(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<DiscountCheckBody>,
) -> ApiResult<Json<DiscountApplication>> {
    let stay = StayDates::new(body.check_in, body.check_out)?;
    if body.guests == 0 {
        return Err(CoreError::validation("guests", "At least one guest is required").into());
    }
    let quote = state
        .services
        .pricing
        .calculate_property_price(&StayQuoteRequest {
            property_id: body.property_id,
            stay,
            guests: body.guests,
            discount: None,
            display_currency: None,
            billing_state: None,
        })
        .await?;

    let context = DiscountContext {
        property_id: body.property_id,
        stay,
        guests: body.guests,
        subtotal_minor: quote.discountable_subtotal(),
    };
    let actor = caller.user_actor();
    let application = state
        .services
        .discounts
        .validate(&body.code, &context, actor.as_ref(), state.now())
        .await;
    Ok(Json(application))
}
