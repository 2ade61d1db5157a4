use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use haven_core::models::{AuditEvent, SecurityEventType, Severity};
use haven_core::repository::RateLimitStore;
use haven_core::{CoreError, CoreResult};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::warn;

use crate::audit::AuditLogger;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateLimitAction {
    GuestBooking,
    Login,
    PaymentInitiation,
    DiscountAttempt,
    BookingLookup,
}

impl RateLimitAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RateLimitAction::GuestBooking => "guest_booking",
            RateLimitAction::Login => "login",
            RateLimitAction::PaymentInitiation => "payment_initiation",
            RateLimitAction::DiscountAttempt => "discount_attempt",
            RateLimitAction::BookingLookup => "booking_lookup",
        }
    }

    /// Shipped defaults: (max attempts, window hours).
    fn default_policy(&self) -> RateLimitPolicy {
        let max_attempts = match self {
            RateLimitAction::GuestBooking => 5,
            RateLimitAction::Login => 5,
            RateLimitAction::PaymentInitiation => 10,
            RateLimitAction::DiscountAttempt => 20,
            RateLimitAction::BookingLookup => 10,
        };
        RateLimitPolicy {
            max_attempts,
            window_hours: 1,
        }
    }

    pub fn all() -> [RateLimitAction; 5] {
        [
            RateLimitAction::GuestBooking,
            RateLimitAction::Login,
            RateLimitAction::PaymentInitiation,
            RateLimitAction::DiscountAttempt,
            RateLimitAction::BookingLookup,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitPolicy {
    pub max_attempts: u32,
    pub window_hours: u32,
}

impl RateLimitPolicy {
    pub fn window(&self) -> Duration {
        Duration::hours(i64::from(self.window_hours))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after_secs: Option<u64>,
}

impl RateLimitDecision {
    fn open() -> Self {
        Self {
            allowed: true,
            remaining: 0,
            retry_after_secs: None,
        }
    }

    pub fn into_result(self) -> CoreResult<Self> {
        match self.retry_after_secs {
            Some(retry_after_secs) if !self.allowed => {
                Err(CoreError::RateLimited { retry_after_secs })
            }
            _ => Ok(self),
        }
    }
}

/// Fixed-window attempt counter per (identifier, action).
///
/// When the backing store is unreachable the limiter lets the attempt through,
/// logs a warning and writes a critical audit event.
#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn RateLimitStore>,
    policies: HashMap<RateLimitAction, RateLimitPolicy>,
    audit: AuditLogger,
}

impl RateLimiter {
    pub fn new(store: Arc<dyn RateLimitStore>, audit: AuditLogger) -> Self {
        let policies = RateLimitAction::all()
            .into_iter()
            .map(|action| (action, action.default_policy()))
            .collect();
        Self {
            store,
            policies,
            audit,
        }
    }

    pub fn with_policy(mut self, action: RateLimitAction, policy: RateLimitPolicy) -> Self {
        self.policies.insert(action, policy);
        self
    }

    pub fn policy(&self, action: RateLimitAction) -> RateLimitPolicy {
        self.policies
            .get(&action)
            .copied()
            .unwrap_or_else(|| action.default_policy())
    }

    pub async fn check(
        &self,
        identifier: &str,
        action: RateLimitAction,
        now: DateTime<Utc>,
    ) -> RateLimitDecision {
        let identifier = identifier.trim().to_lowercase();
        let policy = self.policy(action);

        let record = match self
            .store
            .record_attempt(&identifier, action.as_str(), policy.window(), now)
            .await
        {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    "Rate limiter unavailable for {}, allowing attempt: {}",
                    action.as_str(),
                    e
                );
                self.audit
                    .record(
                        AuditEvent::new(SecurityEventType::RateLimiterUnavailable, Severity::Critical)
                            .details(json!({ "action": action.as_str(), "error": e.to_string() })),
                    )
                    .await;
                return RateLimitDecision::open();
            }
        };

        if record.attempt_count > policy.max_attempts {
            let retry_after_secs = (record.window_expires - now).num_seconds().max(1) as u64;
            warn!(
                action = action.as_str(),
                attempts = record.attempt_count,
                "Rate limit exceeded"
            );
            self.audit
                .record(
                    AuditEvent::new(SecurityEventType::RateLimitExceeded, Severity::Warning)
                        .actor(identifier.clone())
                        .details(json!({
                            "action": action.as_str(),
                            "attempts": record.attempt_count,
                            "window_expires": record.window_expires,
                        })),
                )
                .await;
            return RateLimitDecision {
                allowed: false,
                remaining: 0,
                retry_after_secs: Some(retry_after_secs),
            };
        }

        RateLimitDecision {
            allowed: true,
            remaining: policy.max_attempts - record.attempt_count,
            retry_after_secs: None,
        }
    }

    /// `check`, turning a denial into `CoreError::RateLimited`.
    pub async fn enforce(
        &self,
        identifier: &str,
        action: RateLimitAction,
        now: DateTime<Utc>,
    ) -> CoreResult<RateLimitDecision> {
        self.check(identifier, action, now).await.into_result()
    }
}
