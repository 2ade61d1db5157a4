use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Published once a booking row exists; the mail worker turns it into the
/// confirmation email.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct BookingConfirmationRequested {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub recipient_email: String,
    pub recipient_name: String,
    pub total_minor: i64,
    pub currency: String,
    pub summary: String,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct PaymentSettledEvent {
    pub booking_id: Uuid,
    pub intent_id: String,
    pub amount_minor: i64,
    pub currency: String,
    pub succeeded: bool,
    pub occurred_at: DateTime<Utc>,
}
