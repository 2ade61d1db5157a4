use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use haven_core::models::{
    AuditEvent, Booking, BookingStatus, BookingTarget, PaymentRecord, PaymentStatus, SecurityEventType,
    Severity,
};
use haven_core::payment::{CheckoutRequest, IntentStatus, PaymentGateway, PaymentIntent};
use haven_core::repository::{
    BookingRepository, DiscountRepository, EventPublisher, ExperienceRepository,
    PaymentRepository,
};
use haven_core::{Actor, CoreError, CoreResult, StoreResult};
use haven_security::rate_limit::{RateLimitAction, RateLimiter};
use haven_security::{AuditLogger, BookingAccessGuard};
use haven_shared::models::events::PaymentSettledEvent;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

/// What the client needs to open the hosted checkout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentHandoff {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub gateway: String,
    pub intent_id: String,
    pub client_secret: Option<String>,
    pub amount_minor: i64,
    pub currency: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettlementOutcome {
    pub booking_id: Uuid,
    pub intent_id: String,
    pub payment_status: PaymentStatus,
    pub booking_status: BookingStatus,
}

impl SettlementOutcome {
    pub fn succeeded(&self) -> bool {
        self.payment_status == PaymentStatus::Paid && self.booking_status != BookingStatus::Cancelled
    }
}

/// Opens gateway sessions for persisted bookings and applies the gateway's
/// verdict. A booking is only confirmed after the gateway itself reports
/// the session as succeeded.
pub struct PaymentCoordinator {
    gateway: Arc<dyn PaymentGateway>,
    bookings: Arc<dyn BookingRepository>,
    payments: Arc<dyn PaymentRepository>,
    experiences: Arc<dyn ExperienceRepository>,
    discounts: Arc<dyn DiscountRepository>,
    events: Arc<dyn EventPublisher>,
    limiter: RateLimiter,
    audit: AuditLogger,
    guard: BookingAccessGuard,
}

impl PaymentCoordinator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        bookings: Arc<dyn BookingRepository>,
        payments: Arc<dyn PaymentRepository>,
        experiences: Arc<dyn ExperienceRepository>,
        discounts: Arc<dyn DiscountRepository>,
        events: Arc<dyn EventPublisher>,
        limiter: RateLimiter,
        audit: AuditLogger,
    ) -> Self {
        let guard = BookingAccessGuard::new(bookings.clone(), audit.clone());
        Self {
            gateway,
            bookings,
            payments,
            experiences,
            discounts,
            events,
            limiter,
            audit,
            guard,
        }
    }

    /// Opens a checkout session for the booking's stored amount, always in
    /// the booking's settlement currency.
    pub async fn initiate_payment(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<PaymentHandoff> {
        let booking = self.guard.fetch_for(actor, booking_id).await?;

        if booking.is_settled() {
            return Err(CoreError::Conflict("This booking is already paid".into()));
        }
        if booking.booking_status != BookingStatus::Pending {
            return Err(CoreError::InvalidTransition {
                from: booking.booking_status.to_string(),
                to: "payment".into(),
            });
        }

        self.limiter
            .enforce(actor.identifier(), RateLimitAction::PaymentInitiation, now)
            .await?;

        let request = CheckoutRequest {
            booking_id: booking.id,
            amount_minor: booking.amounts.total_minor,
            currency: booking.amounts.currency.clone(),
            reference: booking.reference.clone(),
            contact: booking.contact.clone(),
        };

        let intent = match self.gateway.create_intent(&request).await {
            Ok(intent) => intent,
            Err(e) => {
                self.audit
                    .booking_event(
                        SecurityEventType::PaymentFailed,
                        Severity::Warning,
                        actor,
                        booking.id,
                        json!({ "stage": "initiate", "gateway": self.gateway.name() }),
                    )
                    .await;
                return Err(CoreError::external("Payment gateway unavailable", e));
            }
        };

        self.payments
            .record_payment(&PaymentRecord {
                id: Uuid::new_v4(),
                booking_id: booking.id,
                intent_id: intent.id.clone(),
                gateway: self.gateway.name().to_string(),
                amount_minor: request.amount_minor,
                currency: request.currency.clone(),
                status: PaymentStatus::Pending,
                created_at: now,
                updated_at: now,
            })
            .await
            .map_err(|e| CoreError::external("Failed to record payment", e))?;

        self.audit
            .booking_event(
                SecurityEventType::PaymentInitiated,
                Severity::Info,
                actor,
                booking.id,
                json!({
                    "intent_id": intent.id,
                    "amount_minor": request.amount_minor,
                    "currency": request.currency,
                }),
            )
            .await;
        info!(reference = %booking.reference, intent = %intent.id, "Payment initiated");

        Ok(PaymentHandoff {
            booking_id: booking.id,
            booking_reference: booking.reference,
            gateway: self.gateway.name().to_string(),
            intent_id: intent.id,
            client_secret: intent.client_secret,
            amount_minor: request.amount_minor,
            currency: request.currency,
        })
    }

    /// Applies the gateway's current view of `intent_id` (webhook or
    /// client callback). Safe to call repeatedly.
    pub async fn settle(&self, intent_id: &str, now: DateTime<Utc>) -> CoreResult<SettlementOutcome> {
        let record = self
            .payments
            .find_by_intent(intent_id)
            .await
            .map_err(|e| CoreError::external("Failed to load payment", e))?
            .ok_or_else(|| CoreError::NotFound(format!("payment {}", intent_id)))?;

        let intent = self
            .gateway
            .get_intent(intent_id)
            .await
            .map_err(|e| CoreError::external("Payment gateway unavailable", e))?;

        let booking = self
            .bookings
            .get_booking(record.booking_id)
            .await
            .map_err(|e| CoreError::external("Failed to load booking", e))?
            .ok_or_else(|| CoreError::NotFound("booking".into()))?;

        if booking.is_settled() {
            // One successful charge per booking. A second captured session
            // is recorded and flagged, the booking itself is not touched.
            if intent.status == IntentStatus::Succeeded && record.status != PaymentStatus::Paid {
                self.flag_duplicate_capture(&booking, &record).await?;
            }
            return Ok(self.outcome(&booking, intent_id));
        }

        let mut status = intent.status;
        if status == IntentStatus::Succeeded
            && (intent.amount_minor != record.amount_minor
                || !intent.currency.eq_ignore_ascii_case(&record.currency))
        {
            error!(
                "Gateway reported {} {} for intent {} but {} {} was requested",
                intent.amount_minor, intent.currency, intent_id, record.amount_minor, record.currency
            );
            self.audit
                .record(
                    AuditEvent::new(
                        SecurityEventType::PaymentFailed,
                        Severity::Critical,
                    )
                    .resource("booking", booking.id)
                    .details(json!({ "intent_id": intent_id, "reason": "amount_mismatch" })),
                )
                .await;
            status = IntentStatus::Failed;
        }

        match status {
            IntentStatus::Succeeded => self.mark_paid(booking, &intent, now).await,
            IntentStatus::Failed | IntentStatus::Canceled => {
                self.mark_failed(booking, &record, now).await
            }
            IntentStatus::RequiresPaymentMethod | IntentStatus::Processing => {
                Ok(self.outcome(&booking, intent_id))
            }
        }
    }

    async fn flag_duplicate_capture(&self, booking: &Booking, record: &PaymentRecord) -> CoreResult<()> {
        self.payments
            .update_payment_status(&record.intent_id, PaymentStatus::Paid)
            .await
            .map_err(|e| CoreError::external("Failed to update payment", e))?;
        error!(
            "Second payment {} captured for already paid booking {}, refund required",
            record.intent_id, booking.reference
        );
        self.audit
            .record(
                AuditEvent::new(SecurityEventType::PaymentSucceeded, Severity::Critical)
                    .resource("booking", booking.id)
                    .details(json!({
                        "intent_id": record.intent_id,
                        "amount_minor": record.amount_minor,
                        "reason": "duplicate_capture",
                    })),
            )
            .await;
        Ok(())
    }

    async fn mark_paid(
        &self,
        mut booking: Booking,
        intent: &PaymentIntent,
        now: DateTime<Utc>,
    ) -> CoreResult<SettlementOutcome> {
        self.payments
            .update_payment_status(&intent.id, PaymentStatus::Paid)
            .await
            .map_err(|e| CoreError::external("Failed to update payment", e))?;

        if booking.booking_status != BookingStatus::Pending {
            // Money arrived for a booking that was cancelled meanwhile: record
            // it, keep the booking as it is and flag it for a refund.
            self.bookings
                .update_status(booking.id, booking.booking_status, PaymentStatus::Paid)
                .await
                .map_err(|e| CoreError::external("Failed to update booking", e))?;
            booking.payment_status = PaymentStatus::Paid;
            error!(
                "Payment {} captured for {} booking {}, refund required",
                intent.id, booking.booking_status, booking.reference
            );
            self.audit
                .record(
                    AuditEvent::new(SecurityEventType::PaymentSucceeded, Severity::Critical)
                        .resource("booking", booking.id)
                        .details(json!({ "intent_id": intent.id, "reason": "booking_not_pending" })),
                )
                .await;
            self.publish(&booking, &intent.id, intent.amount_minor, true, now).await;
            return Ok(self.outcome(&booking, &intent.id));
        }

        self.bookings
            .update_status(booking.id, BookingStatus::Confirmed, PaymentStatus::Paid)
            .await
            .map_err(|e| CoreError::external("Failed to confirm booking", e))?;

        booking.payment_status = PaymentStatus::Paid;
        booking.booking_status = BookingStatus::Confirmed;

        if let BookingTarget::Experience { instance_id } = booking.target {
            if let Err(e) = self
                .experiences
                .adjust_attendees(instance_id, booking.guest_count as i32)
                .await
            {
                error!(
                    "Booking {} confirmed but attendee count for {} not updated: {}",
                    booking.reference, instance_id, e
                );
            }
        }

        if let Some(code) = &booking.discount_code {
            match self.discounts.record_redemption(code).await {
                Ok(true) => {}
                Ok(false) => warn!("Code {} not counted for booking {}", code, booking.reference),
                Err(e) => error!(
                    "Redemption of {} for booking {} not recorded: {}",
                    code, booking.reference, e
                ),
            }
        }

        self.audit
            .booking_event(
                SecurityEventType::PaymentSucceeded,
                Severity::Info,
                &owner_of(&booking),
                booking.id,
                json!({ "intent_id": intent.id, "amount_minor": intent.amount_minor }),
            )
            .await;
        info!(reference = %booking.reference, "Booking paid and confirmed");

        self.publish(&booking, &intent.id, intent.amount_minor, true, now).await;
        Ok(self.outcome(&booking, &intent.id))
    }

    async fn mark_failed(
        &self,
        mut booking: Booking,
        record: &PaymentRecord,
        now: DateTime<Utc>,
    ) -> CoreResult<SettlementOutcome> {
        self.payments
            .update_payment_status(&record.intent_id, PaymentStatus::Failed)
            .await
            .map_err(|e| CoreError::external("Failed to update payment", e))?;
        self.bookings
            .update_status(booking.id, booking.booking_status, PaymentStatus::Failed)
            .await
            .map_err(|e| CoreError::external("Failed to update booking", e))?;
        booking.payment_status = PaymentStatus::Failed;

        self.audit
            .booking_event(
                SecurityEventType::PaymentFailed,
                Severity::Warning,
                &owner_of(&booking),
                booking.id,
                json!({ "intent_id": record.intent_id }),
            )
            .await;
        warn!(reference = %booking.reference, "Payment failed, booking left pending");

        self.publish(&booking, &record.intent_id, record.amount_minor, false, now)
            .await;
        Ok(self.outcome(&booking, &record.intent_id))
    }

    async fn publish(
        &self,
        booking: &Booking,
        intent_id: &str,
        amount_minor: i64,
        succeeded: bool,
        now: DateTime<Utc>,
    ) {
        let event = PaymentSettledEvent {
            booking_id: booking.id,
            intent_id: intent_id.to_string(),
            amount_minor,
            currency: booking.amounts.currency.clone(),
            succeeded,
            occurred_at: now,
        };
        if let Err(e) = self.events.payment_settled(&event).await {
            warn!("Settlement event for {} not published: {}", booking.reference, e);
        }
    }

    fn outcome(&self, booking: &Booking, intent_id: &str) -> SettlementOutcome {
        SettlementOutcome {
            booking_id: booking.id,
            intent_id: intent_id.to_string(),
            payment_status: booking.payment_status,
            booking_status: booking.booking_status,
        }
    }
}

fn owner_of(booking: &Booking) -> Actor {
    match &booking.user_id {
        Some(user_id) => Actor::user(user_id.clone(), None),
        None => Actor::guest(booking.contact.email.expose()),
    }
}

/// In-process gateway for tests and local runs. Sessions start as
/// `REQUIRES_PAYMENT_METHOD` until an outcome is set.
#[derive(Default)]
pub struct MockPaymentGateway {
    intents: Mutex<HashMap<String, PaymentIntent>>,
    counter: AtomicU64,
    unavailable: AtomicBool,
}

impl MockPaymentGateway {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// What the gateway will report for `intent_id` from now on.
    pub fn set_outcome(&self, intent_id: &str, status: IntentStatus) {
        if let Ok(mut intents) = self.intents.lock() {
            if let Some(intent) = intents.get_mut(intent_id) {
                intent.status = status;
            }
        }
    }

    /// Makes the gateway report a different captured amount.
    pub fn set_reported_amount(&self, intent_id: &str, amount_minor: i64) {
        if let Ok(mut intents) = self.intents.lock() {
            if let Some(intent) = intents.get_mut(intent_id) {
                intent.amount_minor = amount_minor;
            }
        }
    }

    pub fn intents(&self) -> Vec<PaymentIntent> {
        self.intents
            .lock()
            .map(|i| i.values().cloned().collect())
            .unwrap_or_default()
    }
}

#[async_trait::async_trait]
impl PaymentGateway for MockPaymentGateway {
    fn name(&self) -> &'static str {
        "mock"
    }

    async fn create_intent(&self, request: &CheckoutRequest) -> StoreResult<PaymentIntent> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err("mock gateway unavailable".into());
        }
        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let intent = PaymentIntent {
            id: format!("mock_pi_{}_{}", request.booking_id.simple(), n),
            booking_id: request.booking_id,
            amount_minor: request.amount_minor,
            currency: request.currency.clone(),
            status: IntentStatus::RequiresPaymentMethod,
            reference: Some(request.reference.clone()),
            client_secret: Some(format!("mock_secret_{}", n)),
            created_at: Utc::now(),
        };
        self.intents
            .lock()
            .map_err(|_| "mock gateway state poisoned")?
            .insert(intent.id.clone(), intent.clone());
        Ok(intent)
    }

    async fn get_intent(&self, intent_id: &str) -> StoreResult<PaymentIntent> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err("mock gateway unavailable".into());
        }
        self.intents
            .lock()
            .map_err(|_| "mock gateway state poisoned")?
            .get(intent_id)
            .cloned()
            .ok_or_else(|| format!("no such intent {}", intent_id).into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{guest_info, pay, stay_at_summary, stay_draft, Harness};
    use crate::flow::Session;

    async fn guest_booking(h: &Harness) -> (Actor, Uuid) {
        let draft = stay_draft(h, "asha@example.com", "+919876543210").await;
        let created = h
            .services
            .persister
            .create_guest_booking(&draft, h.now())
            .await
            .unwrap();
        (Actor::guest("asha@example.com"), created.booking_id)
    }

    #[tokio::test]
    async fn test_paid_booking_cannot_be_charged_again() {
        let h = Harness::new().await;
        let mut flow = stay_at_summary(&h, Session::Anonymous, "asha@example.com").await;
        pay(&h, &mut flow).await;
        let booking_id = flow.booking().unwrap().booking_id;

        let err = h
            .services
            .payments
            .initiate_payment(&Actor::guest("asha@example.com"), booking_id, h.now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
    }

    #[tokio::test]
    async fn test_unknown_intent_is_not_found() {
        let h = Harness::new().await;
        let err = h.services.payments.settle("pi_unknown", h.now()).await.unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_amount_mismatch_fails_the_payment() {
        let h = Harness::new().await;
        let (actor, booking_id) = guest_booking(&h).await;
        let coordinator = &h.services.payments;

        let handoff = coordinator
            .initiate_payment(&actor, booking_id, h.now())
            .await
            .unwrap();
        assert_eq!(handoff.amount_minor, 1_121_000);
        assert_eq!(handoff.currency, "INR");

        h.gateway.set_reported_amount(&handoff.intent_id, 100);
        h.gateway
            .set_outcome(&handoff.intent_id, IntentStatus::Succeeded);
        let outcome = coordinator.settle(&handoff.intent_id, h.now()).await.unwrap();

        assert_eq!(outcome.payment_status, PaymentStatus::Failed);
        assert_eq!(outcome.booking_status, BookingStatus::Pending);
        assert!(h
            .store
            .audit_events()
            .await
            .iter()
            .any(|e| e.severity == Severity::Critical));
    }

    #[tokio::test]
    async fn test_repeated_success_is_applied_once() {
        let h = Harness::new().await;
        let mut flow = h.experience_flow(Session::Anonymous);
        flow.select_experience(h.trek.id, 2).await.unwrap();
        flow.continue_to_guest_info().unwrap();
        flow.set_guest_info(guest_info("nina@example.com", "+14155550134", &["Nina", "Omar"]))
            .await
            .unwrap();
        flow.continue_to_summary().unwrap();
        flow.continue_to_payment().await.unwrap();
        let handoff = flow.start_payment().await.unwrap();

        h.gateway
            .set_outcome(&handoff.intent_id, IntentStatus::Succeeded);
        let first = h.services.payments.settle(&handoff.intent_id, h.now()).await.unwrap();
        let second = h.services.payments.settle(&handoff.intent_id, h.now()).await.unwrap();

        assert!(first.succeeded());
        assert_eq!(first, second);
        assert_eq!(h.store.instance(h.trek.id).await.unwrap().current_attendees, 9);
        let settlements = h.store.settlements().await;
        assert_eq!(settlements.len(), 1);
        assert_eq!(settlements[0].occurred_at, h.now());
    }

    #[tokio::test]
    async fn test_second_capture_is_recorded_and_flagged() {
        let h = Harness::new().await;
        let (actor, booking_id) = guest_booking(&h).await;
        let coordinator = &h.services.payments;

        let first = coordinator.initiate_payment(&actor, booking_id, h.now()).await.unwrap();
        let second = coordinator.initiate_payment(&actor, booking_id, h.now()).await.unwrap();
        assert_ne!(first.intent_id, second.intent_id);
        h.gateway.set_outcome(&first.intent_id, IntentStatus::Succeeded);
        h.gateway.set_outcome(&second.intent_id, IntentStatus::Succeeded);

        assert!(coordinator.settle(&first.intent_id, h.now()).await.unwrap().succeeded());
        let outcome = coordinator.settle(&second.intent_id, h.now()).await.unwrap();
        assert_eq!(outcome.booking_status, BookingStatus::Confirmed);
        // Redelivery of the second callback flags nothing new
        coordinator.settle(&second.intent_id, h.now()).await.unwrap();

        let payments = h.store.payments().await;
        assert_eq!(payments.len(), 2);
        assert!(payments.iter().all(|p| p.status == PaymentStatus::Paid));

        let flagged: Vec<_> = h
            .store
            .audit_events()
            .await
            .into_iter()
            .filter(|e| e.severity == Severity::Critical)
            .collect();
        assert_eq!(flagged.len(), 1);
        assert_eq!(flagged[0].event_type, SecurityEventType::PaymentSucceeded);
        assert_eq!(flagged[0].details["reason"], "duplicate_capture");
        assert_eq!(flagged[0].details["intent_id"], second.intent_id.as_str());
        assert_eq!(h.store.settlements().await.len(), 1);
    }

    #[tokio::test]
    async fn test_paid_booking_uses_up_capped_code() {
        use haven_core::models::{DiscountKind, DiscountRule};
        use crate::testkit::date;

        let h = Harness::new().await;
        h.store
            .add_discount_rule(DiscountRule {
                id: Uuid::new_v4(),
                code: "WINTER10".into(),
                description: None,
                kind: DiscountKind::Percentage(10.0),
                conditions: vec![],
                is_active: true,
                starts_at: None,
                expires_at: None,
                max_redemptions: Some(1),
                redemptions: 0,
            })
            .await;

        let mut flow = h.stay_flow(Session::Anonymous);
        flow.select_stay(h.villa.id, date("2026-12-01"), date("2026-12-04"), 3)
            .await
            .unwrap();
        assert!(flow.apply_discount("winter10").await.unwrap().is_valid);
        flow.continue_to_guest_info().unwrap();
        flow.set_guest_info(guest_info("asha@example.com", "+919876543210", &["Asha", "Kabir", "Meera"]))
            .await
            .unwrap();
        flow.continue_to_summary().unwrap();
        pay(&h, &mut flow).await;

        let rule = h.store.find_rule("WINTER10").await.unwrap().unwrap();
        assert_eq!(rule.redemptions, 1);
        assert!(!h.store.record_redemption("WINTER10").await.unwrap());

        let mut next = h.stay_flow(Session::Anonymous);
        next.select_stay(h.villa.id, date("2027-01-10"), date("2027-01-13"), 2)
            .await
            .unwrap();
        let rejected = next.apply_discount("WINTER10").await.unwrap();
        assert!(!rejected.is_valid);
        assert_eq!(
            rejected.reason.as_deref(),
            Some("This code has reached its usage limit")
        );
    }

    #[tokio::test]
    async fn test_gateway_outage_is_reported() {
        let h = Harness::new().await;
        let (actor, booking_id) = guest_booking(&h).await;
        h.gateway.set_unavailable(true);

        let err = h
            .services
            .payments
            .initiate_payment(&actor, booking_id, h.now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::External(_)));
        assert!(h.store.payments().await.is_empty());
        assert!(h
            .store
            .audit_events()
            .await
            .iter()
            .any(|e| e.event_type == SecurityEventType::PaymentFailed));
    }

    #[tokio::test]
    async fn test_payment_after_cancellation_keeps_booking_cancelled() {
        let h = Harness::new().await;
        let (actor, booking_id) = guest_booking(&h).await;
        let handoff = h
            .services
            .payments
            .initiate_payment(&actor, booking_id, h.now())
            .await
            .unwrap();
        h.services
            .persister
            .cancel_booking(&actor, booking_id, h.now())
            .await
            .unwrap();

        h.gateway
            .set_outcome(&handoff.intent_id, IntentStatus::Succeeded);
        let outcome = h.services.payments.settle(&handoff.intent_id, h.now()).await.unwrap();
        assert_eq!(outcome.booking_status, BookingStatus::Cancelled);
        assert_eq!(outcome.payment_status, PaymentStatus::Paid);
        assert!(!outcome.succeeded());
    }

    #[tokio::test]
    async fn test_strangers_cannot_open_checkout() {
        let h = Harness::new().await;
        let (_, booking_id) = guest_booking(&h).await;
        let err = h
            .services
            .payments
            .initiate_payment(&Actor::guest("mallory@example.com"), booking_id, h.now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::NotFound(_)));
        assert!(h.gateway.intents().is_empty());
    }
}
