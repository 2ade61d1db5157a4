use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::GuestContact;
use crate::StoreResult;

/// Gateway-side state of a checkout session.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntentStatus {
    RequiresPaymentMethod,
    Processing,
    Succeeded,
    Canceled,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Gateway's id (e.g. `order_Nx1...`)
    pub id: String,
    pub booking_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub status: IntentStatus,
    pub reference: Option<String>,
    /// Token the checkout widget is opened with.
    pub client_secret: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Everything the gateway needs to open a hosted checkout.
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub booking_id: Uuid,
    pub amount_minor: i64,
    pub currency: String,
    pub reference: String,
    pub contact: GuestContact,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn name(&self) -> &'static str;

    /// Open a checkout session with the provider
    async fn create_intent(&self, request: &CheckoutRequest) -> StoreResult<PaymentIntent>;

    /// Retrieve the provider's current view of a session
    async fn get_intent(&self, intent_id: &str) -> StoreResult<PaymentIntent>;
}
