use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DiscountKind {
    Percentage(f64),
    /// Fixed amount in minor units of the booking currency.
    Flat(i64),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RuleCondition {
    MinNights { nights: u32 },
    MinSubtotal { amount_minor: i64 },
    MinGuests { guests: u32 },
    /// Check-in must fall inside `[from, to]`.
    StayWithin { from: NaiveDate, to: NaiveDate },
    Properties { ids: Vec<Uuid> },
    NewCustomerOnly,
}

/// A discount code definition as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountRule {
    pub id: Uuid,
    /// Always upper case.
    pub code: String,
    pub description: Option<String>,
    pub kind: DiscountKind,
    pub conditions: Vec<RuleCondition>,
    pub is_active: bool,
    pub starts_at: Option<DateTime<Utc>>,
    pub expires_at: Option<DateTime<Utc>>,
    pub max_redemptions: Option<u32>,
    pub redemptions: u32,
}

/// Outcome of one validation attempt. Invalid codes are a value, not an error.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscountApplication {
    pub code: String,
    pub is_valid: bool,
    pub discount_amount_minor: i64,
    pub percentage: Option<f64>,
    pub flat_amount_minor: Option<i64>,
    pub reason: Option<String>,
}

impl DiscountApplication {
    pub fn rejected(code: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            is_valid: false,
            discount_amount_minor: 0,
            percentage: None,
            flat_amount_minor: None,
            reason: Some(reason.into()),
        }
    }
}
