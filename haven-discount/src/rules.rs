use chrono::{DateTime, Utc};
use haven_core::models::{DiscountKind, DiscountRule, RuleCondition, StayDates};
use haven_shared::money::apply_percentage;
use haven_shared::Minor;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What a code is being applied to.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscountContext {
    pub property_id: Uuid,
    pub stay: StayDates,
    pub guests: u32,
    /// Base price plus additional-guest charges, before any discount.
    pub subtotal_minor: Minor,
}

/// Lifecycle checks shared by every stored rule: active flag, validity window
/// and redemption cap.
pub fn check_lifecycle(rule: &DiscountRule, now: DateTime<Utc>) -> Result<(), String> {
    if !rule.is_active {
        return Err("This code is no longer active".to_string());
    }
    if let Some(starts_at) = rule.starts_at {
        if now < starts_at {
            return Err("This code is not valid yet".to_string());
        }
    }
    if let Some(expires_at) = rule.expires_at {
        if now >= expires_at {
            return Err("This code has expired".to_string());
        }
    }
    if let Some(max) = rule.max_redemptions {
        if rule.redemptions >= max {
            return Err("This code has reached its usage limit".to_string());
        }
    }
    Ok(())
}

pub fn requires_new_customer(rule: &DiscountRule) -> bool {
    rule.conditions
        .iter()
        .any(|c| matches!(c, RuleCondition::NewCustomerOnly))
}

/// Every condition must hold. Returns the first unmet one as a guest-facing reason.
pub fn check_conditions(
    conditions: &[RuleCondition],
    context: &DiscountContext,
    is_new_customer: bool,
) -> Result<(), String> {
    for condition in conditions {
        match condition {
            RuleCondition::MinNights { nights } => {
                if context.stay.nights() < *nights {
                    return Err(format!("Requires a stay of at least {} nights", nights));
                }
            }
            RuleCondition::MinSubtotal { amount_minor } => {
                if context.subtotal_minor < *amount_minor {
                    return Err(format!(
                        "Requires a subtotal of at least {}",
                        haven_shared::money::to_major_string(*amount_minor)
                    ));
                }
            }
            RuleCondition::MinGuests { guests } => {
                if context.guests < *guests {
                    return Err(format!("Requires at least {} guests", guests));
                }
            }
            RuleCondition::StayWithin { from, to } => {
                let check_in = context.stay.check_in();
                if check_in < *from || check_in > *to {
                    return Err(format!(
                        "Only valid for check-in between {} and {}",
                        from, to
                    ));
                }
            }
            RuleCondition::Properties { ids } => {
                if !ids.contains(&context.property_id) {
                    return Err("Not valid for this property".to_string());
                }
            }
            RuleCondition::NewCustomerOnly => {
                if !is_new_customer {
                    return Err("Only valid on your first booking".to_string());
                }
            }
        }
    }
    Ok(())
}

/// Amount taken off `subtotal`, never more than the subtotal itself.
pub fn discount_amount(kind: &DiscountKind, subtotal: Minor) -> Minor {
    let subtotal = subtotal.max(0);
    match kind {
        DiscountKind::Percentage(pct) => apply_percentage(subtotal, pct.clamp(0.0, 100.0)),
        DiscountKind::Flat(amount) => (*amount).clamp(0, subtotal),
    }
}
