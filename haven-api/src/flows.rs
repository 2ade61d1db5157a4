//! HTTP face of the booking flow: one server-side flow per booking session,
//! addressed by its id.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use haven_booking::{
    BookingFlow, FlowConfig, FlowKind, FlowSnapshot, FlowStep, GuestInfo, PaymentHandoff,
    Session, SettlementOutcome,
};
use haven_core::models::DiscountApplication;
use haven_core::CoreError;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use crate::error::{ApiResult, AppError};
use crate::middleware::Caller;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/v1/flows", post(open_flow))
        .route("/v1/flows/{flow_id}", get(get_flow))
        .route("/v1/flows/{flow_id}/selection", put(select))
        .route(
            "/v1/flows/{flow_id}/discount",
            post(apply_discount).delete(remove_discount),
        )
        .route("/v1/flows/{flow_id}/guest-info", put(set_guest_info))
        .route("/v1/flows/{flow_id}/continue", post(advance))
        .route("/v1/flows/{flow_id}/back", post(back))
        .route("/v1/flows/{flow_id}/payment", post(start_payment))
        .route("/v1/flows/{flow_id}/payment/complete", post(complete_payment))
}

#[derive(Debug, Deserialize)]
pub struct OpenFlowBody {
    pub kind: FlowKind,
    #[serde(default)]
    pub display_currency: Option<String>,
}

async fn open_flow(
    State(state): State<AppState>,
    caller: Caller,
    Json(body): Json<OpenFlowBody>,
) -> ApiResult<(StatusCode, Json<FlowSnapshot>)> {
    let mut flow = BookingFlow::new(
        state.services.clone(),
        FlowConfig {
            kind: body.kind,
            display_currency: body.display_currency,
        },
        caller.session(),
    );
    flow.start()?;
    let snapshot = flow.snapshot();

    state.flows.insert(flow, state.now()).await;
    info!(flow_id = %snapshot.flow_id, kind = ?snapshot.kind, "Booking flow opened");
    Ok((StatusCode::CREATED, Json(snapshot)))
}

/// A flow opened by a signed-in user is only reachable with that user's
/// token. Anonymous flows are reachable by id alone.
async fn load_flow(state: &AppState, caller: &Caller, flow_id: Uuid) -> ApiResult<Arc<Mutex<BookingFlow>>> {
    let flow = state
        .flows
        .get(flow_id, state.now())
        .await
        .ok_or_else(|| CoreError::NotFound("flow".into()))?;

    let owner = flow.lock().await.session().clone();
    let allowed = match (&owner, caller.session()) {
        (Session::Anonymous, _) => true,
        (Session::Authenticated { user_id, .. }, Session::Authenticated { user_id: caller_id, .. }) => {
            *user_id == caller_id
        }
        (Session::Authenticated { .. }, Session::Anonymous) => false,
    };
    if !allowed {
        return Err(CoreError::NotFound("flow".into()).into());
    }
    Ok(flow)
}

async fn get_flow(
    State(state): State<AppState>,
    caller: Caller,
    Path(flow_id): Path<Uuid>,
) -> ApiResult<Json<FlowSnapshot>> {
    let flow = load_flow(&state, &caller, flow_id).await?;
    let snapshot = flow.lock().await.snapshot();
    Ok(Json(snapshot))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SelectionBody {
    Stay {
        property_id: Uuid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        guests: u32,
    },
    Experience {
        instance_id: Uuid,
        attendees: u32,
    },
}

async fn select(
    State(state): State<AppState>,
    caller: Caller,
    Path(flow_id): Path<Uuid>,
    Json(body): Json<SelectionBody>,
) -> ApiResult<Json<FlowSnapshot>> {
    let flow = load_flow(&state, &caller, flow_id).await?;
    let mut flow = flow.lock().await;
    match body {
        SelectionBody::Stay {
            property_id,
            check_in,
            check_out,
            guests,
        } => {
            flow.select_stay(property_id, check_in, check_out, guests)
                .await?;
        }
        SelectionBody::Experience {
            instance_id,
            attendees,
        } => {
            flow.select_experience(instance_id, attendees).await?;
        }
    }
    Ok(Json(flow.snapshot()))
}

#[derive(Debug, Deserialize)]
pub struct DiscountBody {
    pub code: String,
}

#[derive(Debug, Serialize)]
pub struct DiscountResponse {
    pub application: DiscountApplication,
    pub flow: FlowSnapshot,
}

async fn apply_discount(
    State(state): State<AppState>,
    caller: Caller,
    Path(flow_id): Path<Uuid>,
    Json(body): Json<DiscountBody>,
) -> ApiResult<Json<DiscountResponse>> {
    let flow = load_flow(&state, &caller, flow_id).await?;
    let mut flow = flow.lock().await;
    let application = flow.apply_discount(&body.code).await?;
    Ok(Json(DiscountResponse {
        application,
        flow: flow.snapshot(),
    }))
}

async fn remove_discount(
    State(state): State<AppState>,
    caller: Caller,
    Path(flow_id): Path<Uuid>,
) -> ApiResult<Json<FlowSnapshot>> {
    let flow = load_flow(&state, &caller, flow_id).await?;
    let mut flow = flow.lock().await;
    flow.remove_discount().await?;
    Ok(Json(flow.snapshot()))
}

async fn set_guest_info(
    State(state): State<AppState>,
    caller: Caller,
    Path(flow_id): Path<Uuid>,
    Json(body): Json<GuestInfo>,
) -> ApiResult<Json<FlowSnapshot>> {
    let flow = load_flow(&state, &caller, flow_id).await?;
    let mut flow = flow.lock().await;
    flow.set_guest_info(body).await?;
    Ok(Json(flow.snapshot()))
}

/// Moves to whatever step follows the current one.
async fn advance(
    State(state): State<AppState>,
    caller: Caller,
    Path(flow_id): Path<Uuid>,
) -> ApiResult<Json<FlowSnapshot>> {
    let flow = load_flow(&state, &caller, flow_id).await?;
    let mut flow = flow.lock().await;
    match flow.step() {
        FlowStep::Idle => {
            flow.start()?;
        }
        FlowStep::SelectingDates => {
            flow.continue_to_guest_info()?;
        }
        FlowStep::GuestInfo => {
            flow.continue_to_summary()?;
        }
        FlowStep::Summary => {
            flow.continue_to_payment().await?;
        }
        step @ (FlowStep::Payment | FlowStep::Confirmation) => {
            return Err(AppError::from(CoreError::InvalidTransition {
                from: step.to_string(),
                to: "next step".into(),
            }));
        }
    }
    Ok(Json(flow.snapshot()))
}

async fn back(
    State(state): State<AppState>,
    caller: Caller,
    Path(flow_id): Path<Uuid>,
) -> ApiResult<Json<FlowSnapshot>> {
    let flow = load_flow(&state, &caller, flow_id).await?;
    let mut flow = flow.lock().await;
    flow.back()?;
    Ok(Json(flow.snapshot()))
}

async fn start_payment(
    State(state): State<AppState>,
    caller: Caller,
    Path(flow_id): Path<Uuid>,
) -> ApiResult<Json<PaymentHandoff>> {
    let flow = load_flow(&state, &caller, flow_id).await?;
    let mut flow = flow.lock().await;
    let handoff = flow.start_payment().await?;
    Ok(Json(handoff))
}

#[derive(Debug, Deserialize)]
pub struct CompletePaymentBody {
    pub intent_id: String,
}

#[derive(Debug, Serialize)]
pub struct CompletePaymentResponse {
    pub outcome: SettlementOutcome,
    pub flow: FlowSnapshot,
}

async fn complete_payment(
    State(state): State<AppState>,
    caller: Caller,
    Path(flow_id): Path<Uuid>,
    Json(body): Json<CompletePaymentBody>,
) -> ApiResult<Json<CompletePaymentResponse>> {
    let flow = load_flow(&state, &caller, flow_id).await?;
    let mut flow = flow.lock().await;
    let outcome = flow.complete_payment(&body.intent_id).await?;
    Ok(Json(CompletePaymentResponse {
        outcome,
        flow: flow.snapshot(),
    }))
}
