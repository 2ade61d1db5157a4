use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use haven_core::payment::{CheckoutRequest, IntentStatus, PaymentGateway, PaymentIntent};
use haven_core::StoreResult;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;
use tracing::{error, info};
use uuid::Uuid;

/// Razorpay Orders API. An order is the checkout session; its id is the
/// intent id handed to the client and echoed back by the webhook.
pub struct RazorpayGateway {
    client: reqwest::Client,
    base_url: String,
    key_id: String,
    key_secret: String,
}

#[derive(Debug, Deserialize)]
struct RazorpayOrder {
    id: String,
    amount: i64,
    currency: String,
    receipt: Option<String>,
    status: String,
    #[serde(default)]
    notes: serde_json::Value,
    created_at: i64,
}

#[derive(Debug, Deserialize)]
struct RazorpayPayment {
    status: String,
}

#[derive(Debug, Deserialize)]
struct PaymentList {
    items: Vec<RazorpayPayment>,
}

impl RazorpayGateway {
    pub fn new(base_url: &str, key_id: &str, key_secret: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            key_id: key_id.to_string(),
            key_secret: key_secret.to_string(),
        })
    }

    async fn fetch_order(&self, order_id: &str) -> StoreResult<RazorpayOrder> {
        let res = self
            .client
            .get(format!("{}/v1/orders/{}", self.base_url, order_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!("Razorpay order lookup {} failed: {} {}", order_id, status, body);
            return Err(format!("razorpay returned {}", status).into());
        }
        Ok(res.json().await?)
    }

    /// An `attempted` order has at least one payment; the captured one wins.
    async fn attempted_status(&self, order_id: &str) -> StoreResult<IntentStatus> {
        let res = self
            .client
            .get(format!("{}/v1/orders/{}/payments", self.base_url, order_id))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .send()
            .await?
            .error_for_status()?;
        let payments: PaymentList = res.json().await?;

        if payments.items.iter().any(|p| p.status == "captured") {
            return Ok(IntentStatus::Succeeded);
        }
        if !payments.items.is_empty() && payments.items.iter().all(|p| p.status == "failed") {
            return Ok(IntentStatus::Failed);
        }
        Ok(IntentStatus::Processing)
    }

    fn to_intent(&self, order: RazorpayOrder, status: IntentStatus) -> StoreResult<PaymentIntent> {
        let booking_id = order
            .notes
            .get("booking_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| format!("order {} carries no booking id", order.id))?;

        Ok(PaymentIntent {
            booking_id: Uuid::parse_str(booking_id)?,
            amount_minor: order.amount,
            currency: order.currency,
            status,
            reference: order.receipt,
            // The checkout widget is opened with the public key id plus the order id
            client_secret: Some(self.key_id.clone()),
            created_at: Utc
                .timestamp_opt(order.created_at, 0)
                .single()
                .unwrap_or_else(Utc::now),
            id: order.id,
        })
    }
}

fn order_status(raw: &str) -> Option<IntentStatus> {
    match raw {
        "created" => Some(IntentStatus::RequiresPaymentMethod),
        "paid" => Some(IntentStatus::Succeeded),
        _ => None,
    }
}

#[async_trait]
impl PaymentGateway for RazorpayGateway {
    fn name(&self) -> &'static str {
        "razorpay"
    }

    async fn create_intent(&self, request: &CheckoutRequest) -> StoreResult<PaymentIntent> {
        let body = json!({
            "amount": request.amount_minor,
            "currency": request.currency,
            "receipt": request.reference,
            "notes": {
                "booking_id": request.booking_id.to_string(),
                "booking_reference": request.reference,
            },
        });

        let res = self
            .client
            .post(format!("{}/v1/orders", self.base_url))
            .basic_auth(&self.key_id, Some(&self.key_secret))
            .json(&body)
            .send()
            .await?;

        let status = res.status();
        if !status.is_success() {
            let body = res.text().await.unwrap_or_default();
            error!(
                "Razorpay order for {} failed: {} {}",
                request.reference, status, body
            );
            return Err(format!("razorpay returned {}", status).into());
        }

        let order: RazorpayOrder = res.json().await?;
        info!("Razorpay order {} opened for {}", order.id, request.reference);
        self.to_intent(order, IntentStatus::RequiresPaymentMethod)
    }

    async fn get_intent(&self, intent_id: &str) -> StoreResult<PaymentIntent> {
        let order = self.fetch_order(intent_id).await?;
        let status = match order_status(&order.status) {
            Some(status) => status,
            None => self.attempted_status(intent_id).await?,
        };
        self.to_intent(order, status)
    }
}
