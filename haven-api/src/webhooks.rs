use axum::{
    extract::State,
    http::StatusCode,
    routing::post,
    Json, Router,
};
use haven_booking::SettlementOutcome;
use haven_core::CoreError;
use serde::Deserialize;

use crate::error::ApiResult;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

#[derive(Debug, Deserialize)]
pub struct EntityRef<T> {
    pub entity: T,
}

#[derive(Debug, Deserialize)]
pub struct PaymentEntity {
    pub order_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct OrderEntity {
    pub id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct RazorpayPayload {
    pub payment: Option<EntityRef<PaymentEntity>>,
    pub order: Option<EntityRef<OrderEntity>>,
}

/// Razorpay event envelope, or a bare `{"intent_id": ...}` from the mock
/// gateway and internal retries.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PaymentWebhook {
    Razorpay {
        event: String,
        #[serde(default)]
        payload: RazorpayPayload,
    },
    Direct {
        intent_id: String,
    },
}

impl PaymentWebhook {
    fn intent_id(&self) -> Option<&str> {
        match self {
            PaymentWebhook::Razorpay { payload, .. } => payload
                .order
                .as_ref()
                .map(|o| o.entity.id.as_str())
                .or_else(|| {
                    payload
                        .payment
                        .as_ref()
                        .and_then(|p| p.entity.order_id.as_deref())
                }),
            PaymentWebhook::Direct { intent_id } => Some(intent_id.as_str()),
        }
    }
}

/// POST /v1/webhooks/payments
///
/// The body only says which session changed. Settlement re-reads the
/// session from the gateway, so the payload's own status is never trusted.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    Json(payload): Json<PaymentWebhook>,
) -> ApiResult<(StatusCode, Json<SettlementOutcome>)> {
    if let PaymentWebhook::Razorpay { event, .. } = &payload {
        tracing::info!("Received payment webhook: {}", event);
    }

    let intent_id = payload
        .intent_id()
        .ok_or_else(|| CoreError::validation("payload", "No order id in webhook"))?;

    let outcome = state.services.payments.settle(intent_id, state.now()).await?;
    tracing::info!(
        "Webhook settled intent {}: payment {}, booking {}",
        intent_id,
        outcome.payment_status.as_str(),
        outcome.booking_status.as_str()
    );
    Ok((StatusCode::OK, Json(outcome)))
}
