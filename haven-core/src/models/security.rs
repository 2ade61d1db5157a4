use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Attempts for one (identifier, action) pair inside a fixed window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitRecord {
    pub identifier: String,
    pub action: String,
    pub attempt_count: u32,
    pub window_start: DateTime<Utc>,
    pub window_expires: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Critical => "critical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SecurityEventType {
    AuthSuccess,
    AuthFailure,
    BookingCreated,
    BookingCancelled,
    BookingAccessGranted,
    BookingAccessDenied,
    PaymentInitiated,
    PaymentSucceeded,
    PaymentFailed,
    RateLimitExceeded,
    RateLimiterUnavailable,
    SuspiciousInput,
}

impl SecurityEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SecurityEventType::AuthSuccess => "auth_success",
            SecurityEventType::AuthFailure => "auth_failure",
            SecurityEventType::BookingCreated => "booking_created",
            SecurityEventType::BookingCancelled => "booking_cancelled",
            SecurityEventType::BookingAccessGranted => "booking_access_granted",
            SecurityEventType::BookingAccessDenied => "booking_access_denied",
            SecurityEventType::PaymentInitiated => "payment_initiated",
            SecurityEventType::PaymentSucceeded => "payment_succeeded",
            SecurityEventType::PaymentFailed => "payment_failed",
            SecurityEventType::RateLimitExceeded => "rate_limit_exceeded",
            SecurityEventType::RateLimiterUnavailable => "rate_limiter_unavailable",
            SecurityEventType::SuspiciousInput => "suspicious_input",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEvent {
    pub id: Uuid,
    pub event_type: SecurityEventType,
    pub actor: Option<String>,
    pub resource_type: Option<String>,
    pub resource_id: Option<String>,
    pub severity: Severity,
    pub details: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(event_type: SecurityEventType, severity: Severity) -> Self {
        Self {
            id: Uuid::new_v4(),
            event_type,
            actor: None,
            resource_type: None,
            resource_id: None,
            severity,
            details: serde_json::json!({}),
            occurred_at: Utc::now(),
        }
    }

    pub fn actor(mut self, actor: impl Into<String>) -> Self {
        self.actor = Some(actor.into());
        self
    }

    pub fn resource(mut self, resource_type: &str, resource_id: impl ToString) -> Self {
        self.resource_type = Some(resource_type.to_string());
        self.resource_id = Some(resource_id.to_string());
        self
    }

    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = details;
        self
    }
}
