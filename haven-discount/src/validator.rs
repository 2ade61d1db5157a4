use std::sync::Arc;

use chrono::{DateTime, Utc};
use haven_core::models::{DiscountApplication, DiscountKind};
use haven_core::repository::{BookingRepository, DiscountRepository};
use haven_core::Actor;
use haven_security::rate_limit::{RateLimitAction, RateLimiter};
use haven_security::validation::{limits, normalize_discount_code, sanitize};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::rules::{self, DiscountContext};

/// A code handled outside the rule table, e.g. a signup incentive.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReservedCode {
    pub code: String,
    pub percentage: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountConfig {
    pub reserved: Vec<ReservedCode>,
}

impl Default for DiscountConfig {
    fn default() -> Self {
        Self {
            reserved: vec![ReservedCode {
                code: "SIGNUP5".to_string(),
                percentage: 5.0,
            }],
        }
    }
}

pub struct DiscountValidator {
    rules: Arc<dyn DiscountRepository>,
    bookings: Arc<dyn BookingRepository>,
    limiter: Option<RateLimiter>,
    config: DiscountConfig,
}

impl DiscountValidator {
    pub fn new(
        rules: Arc<dyn DiscountRepository>,
        bookings: Arc<dyn BookingRepository>,
        config: DiscountConfig,
    ) -> Self {
        Self {
            rules,
            bookings,
            limiter: None,
            config,
        }
    }

    /// Throttles attempts per actor under `discount_attempt`.
    pub fn with_rate_limiter(mut self, limiter: RateLimiter) -> Self {
        self.limiter = Some(limiter);
        self
    }

    /// Never fails: unknown, expired or ineligible codes come back with
    /// `is_valid == false` and a reason. `actor` is `None` before the guest
    /// has identified themselves; first-booking checks are then deferred
    /// to the next call that carries an actor.
    pub async fn validate(
        &self,
        raw_code: &str,
        context: &DiscountContext,
        actor: Option<&Actor>,
        now: DateTime<Utc>,
    ) -> DiscountApplication {
        let Some(code) = normalize_discount_code(raw_code) else {
            return DiscountApplication::rejected(
                sanitize(raw_code, limits::DISCOUNT_CODE).to_uppercase(),
                "Invalid discount code",
            );
        };

        if let (Some(limiter), Some(actor)) = (&self.limiter, actor) {
            let decision = limiter
                .check(actor.identifier(), RateLimitAction::DiscountAttempt, now)
                .await;
            if !decision.allowed {
                return DiscountApplication::rejected(
                    code,
                    "Too many discount attempts, please try again later",
                );
            }
        }

        if let Some(reserved) = self.config.reserved.iter().find(|r| r.code.eq_ignore_ascii_case(&code)) {
            return self.apply_reserved(code, reserved.percentage, context, actor).await;
        }

        let rule = match self.rules.find_rule(&code).await {
            Ok(Some(rule)) => rule,
            Ok(None) => return DiscountApplication::rejected(code, "Invalid discount code"),
            Err(e) => {
                warn!("Discount lookup failed for {}: {}", code, e);
                return DiscountApplication::rejected(
                    code,
                    "Discount codes are unavailable right now, please try again",
                );
            }
        };

        if let Err(reason) = rules::check_lifecycle(&rule, now) {
            return DiscountApplication::rejected(code, reason);
        }

        let is_new_customer = if rules::requires_new_customer(&rule) {
            match self.is_new_customer(actor).await {
                Ok(new) => new,
                Err(reason) => return DiscountApplication::rejected(code, reason),
            }
        } else {
            true
        };

        if let Err(reason) = rules::check_conditions(&rule.conditions, context, is_new_customer) {
            return DiscountApplication::rejected(code, reason);
        }

        let amount = rules::discount_amount(&rule.kind, context.subtotal_minor);
        debug!(code = %code, amount, "Discount code accepted");
        let (percentage, flat) = match rule.kind {
            DiscountKind::Percentage(p) => (Some(p), None),
            DiscountKind::Flat(f) => (None, Some(f)),
        };
        DiscountApplication {
            code,
            is_valid: true,
            discount_amount_minor: amount,
            percentage,
            flat_amount_minor: flat,
            reason: None,
        }
    }

    async fn apply_reserved(
        &self,
        code: String,
        percentage: f64,
        context: &DiscountContext,
        actor: Option<&Actor>,
    ) -> DiscountApplication {
        if actor.is_some() {
            match self.is_new_customer(actor).await {
                Ok(true) => {}
                Ok(false) => {
                    return DiscountApplication::rejected(code, "Only valid on your first booking")
                }
                Err(reason) => return DiscountApplication::rejected(code, reason),
            }
        }

        let kind = DiscountKind::Percentage(percentage);
        DiscountApplication {
            discount_amount_minor: rules::discount_amount(&kind, context.subtotal_minor),
            code,
            is_valid: true,
            percentage: Some(percentage),
            flat_amount_minor: None,
            reason: None,
        }
    }

    /// `Ok(true)` with no actor: the check runs again once one is known.
    async fn is_new_customer(&self, actor: Option<&Actor>) -> Result<bool, String> {
        let Some(actor) = actor else {
            return Ok(true);
        };
        match self.bookings.count_paid_bookings(actor).await {
            Ok(count) => Ok(count == 0),
            Err(e) => {
                warn!("Could not count prior bookings for discount check: {}", e);
                Err("Discount codes are unavailable right now, please try again".to_string())
            }
        }
    }
}
