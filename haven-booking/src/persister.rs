use std::sync::Arc;

use chrono::{DateTime, Utc};
use haven_core::models::{
    Booking, BookingAmounts, BookingStatus, BookingTarget, PaymentStatus, SecurityEventType,
    Severity,
};
use haven_core::repository::{
    BookingRepository, EventPublisher, ExperienceRepository, InsertBookingError,
};
use haven_core::{Actor, CoreError, CoreResult};
use haven_security::rate_limit::{RateLimitAction, RateLimiter};
use haven_security::{validation, AuditLogger, BookingAccessGuard};
use haven_shared::models::events::BookingConfirmationRequested;
use haven_shared::money::to_major_string;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::draft::BookingDraft;
use crate::reference::ReferenceSource;

/// Attempts at a fresh reference before giving up on a collision streak.
const MAX_REFERENCE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreatedBooking {
    pub booking_id: Uuid,
    pub booking_reference: String,
}

/// Writes finished drafts to the booking table and handles cancellation.
pub struct BookingPersister {
    bookings: Arc<dyn BookingRepository>,
    experiences: Arc<dyn ExperienceRepository>,
    events: Arc<dyn EventPublisher>,
    references: Arc<dyn ReferenceSource>,
    limiter: RateLimiter,
    audit: AuditLogger,
    guard: BookingAccessGuard,
}

impl BookingPersister {
    pub fn new(
        bookings: Arc<dyn BookingRepository>,
        experiences: Arc<dyn ExperienceRepository>,
        events: Arc<dyn EventPublisher>,
        references: Arc<dyn ReferenceSource>,
        limiter: RateLimiter,
        audit: AuditLogger,
    ) -> Self {
        let guard = BookingAccessGuard::new(bookings.clone(), audit.clone());
        Self {
            bookings,
            experiences,
            events,
            references,
            limiter,
            audit,
            guard,
        }
    }

    /// Booking owned by a signed-in user.
    pub async fn create_booking(
        &self,
        user_id: &str,
        draft: &BookingDraft,
        now: DateTime<Utc>,
    ) -> CoreResult<CreatedBooking> {
        if user_id.trim().is_empty() {
            return Err(CoreError::AccessDenied("a signed-in user is required".into()));
        }
        let booking = self.build(Some(user_id.to_string()), draft, now)?;
        let actor = Actor::user(user_id, Some(booking.contact.email.expose().clone()));
        self.insert(&actor, booking, markup_fields(draft)).await
    }

    /// Booking without an account; the contact email identifies the guest.
    pub async fn create_guest_booking(
        &self,
        draft: &BookingDraft,
        now: DateTime<Utc>,
    ) -> CoreResult<CreatedBooking> {
        let booking = self.build(None, draft, now)?;
        let actor = Actor::guest(booking.contact.email.expose());

        self.limiter
            .enforce(actor.identifier(), RateLimitAction::GuestBooking, now)
            .await?;

        self.insert(&actor, booking, markup_fields(draft)).await
    }

    fn build(
        &self,
        user_id: Option<String>,
        draft: &BookingDraft,
        now: DateTime<Utc>,
    ) -> CoreResult<Booking> {
        let selection = draft
            .selection()
            .ok_or_else(|| CoreError::validation("selection", "Choose dates or a session first"))?;
        let quote = draft
            .quote()
            .ok_or_else(|| CoreError::validation("quote", "No price has been calculated yet"))?;
        let contact = draft
            .contact()
            .ok_or_else(|| CoreError::validation("contact", "Contact details are required"))?;

        let contact = validation::validate_contact(
            &contact.full_name,
            contact.email.expose(),
            contact.phone.expose(),
        )?;
        let guests = validation::validate_party_roster(draft.guests(), selection.party_size())?;

        Ok(Booking {
            id: Uuid::new_v4(),
            reference: String::new(),
            target: selection.target(),
            guest_count: selection.party_size(),
            guests,
            amounts: BookingAmounts {
                base_minor: quote.base_price_minor,
                additional_guest_minor: quote.additional_guest_charge_minor,
                discount_minor: quote.discount_amount_minor,
                tax_minor: quote.tax_amount_minor,
                cleaning_fee_minor: quote.cleaning_fee_minor,
                total_minor: quote.total_amount_due_minor,
                currency: quote.currency.clone(),
            },
            discount_code: quote.discount_code.clone(),
            user_id,
            contact,
            special_requests: validation::clean_special_requests(draft.special_requests()),
            payment_status: PaymentStatus::Pending,
            booking_status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    async fn insert(
        &self,
        actor: &Actor,
        mut booking: Booking,
        stripped: Vec<&'static str>,
    ) -> CoreResult<CreatedBooking> {
        let today = booking.created_at.date_naive();
        let mut stored = false;

        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            booking.reference = self.references.next_reference(&booking.target, today);
            match self.bookings.insert_booking(&booking).await {
                Ok(()) => {
                    stored = true;
                    break;
                }
                Err(InsertBookingError::DuplicateReference(reference)) => {
                    warn!(
                        "Booking reference {} already taken (attempt {}/{})",
                        reference, attempt, MAX_REFERENCE_ATTEMPTS
                    );
                }
                Err(InsertBookingError::Store(e)) => {
                    return Err(CoreError::external("Failed to save booking", e));
                }
            }
        }

        if !stored {
            error!(
                "Gave up allocating a booking reference after {} attempts",
                MAX_REFERENCE_ATTEMPTS
            );
            return Err(CoreError::Conflict(
                "Could not allocate a booking reference, please try again".into(),
            ));
        }

        info!(
            booking_id = %booking.id,
            reference = %booking.reference,
            total = booking.amounts.total_minor,
            "Booking created"
        );

        self.audit
            .booking_event(
                SecurityEventType::BookingCreated,
                Severity::Info,
                actor,
                booking.id,
                json!({
                    "reference": booking.reference,
                    "guest_booking": booking.user_id.is_none(),
                }),
            )
            .await;

        if !stripped.is_empty() {
            warn!(
                "Markup stripped from {:?} on booking {}",
                stripped, booking.reference
            );
            self.audit
                .booking_event(
                    SecurityEventType::SuspiciousInput,
                    Severity::Warning,
                    actor,
                    booking.id,
                    json!({ "fields": stripped }),
                )
                .await;
        }

        self.notify(&booking).await;

        Ok(CreatedBooking {
            booking_id: booking.id,
            booking_reference: booking.reference,
        })
    }

    /// Fire-and-forget confirmation notice to the stored contact email.
    async fn notify(&self, booking: &Booking) {
        let summary = match &booking.target {
            BookingTarget::Stay {
                check_in,
                check_out,
                ..
            } => format!(
                "Stay from {} to {} for {} guest(s)",
                check_in, check_out, booking.guest_count
            ),
            BookingTarget::Experience { .. } => {
                format!("Experience for {} attendee(s)", booking.guest_count)
            }
        };

        let event = BookingConfirmationRequested {
            booking_id: booking.id,
            booking_reference: booking.reference.clone(),
            recipient_email: booking.contact.email.expose().clone(),
            recipient_name: booking.contact.full_name.clone(),
            total_minor: booking.amounts.total_minor,
            currency: booking.amounts.currency.clone(),
            summary: format!(
                "{}, total {} {}",
                summary,
                to_major_string(booking.amounts.total_minor),
                booking.amounts.currency
            ),
            occurred_at: booking.created_at,
        };

        if let Err(e) = self.events.booking_confirmation_requested(&event).await {
            warn!(
                "Confirmation notice for booking {} not sent: {}",
                booking.reference, e
            );
        }
    }

    /// Cancels an unpaid booking that its own flow has replaced, so it
    /// stops holding the dates. Paid or already-final bookings are left alone.
    pub async fn discard_pending(&self, booking_id: Uuid) -> CoreResult<()> {
        let Some(booking) = self
            .bookings
            .get_booking(booking_id)
            .await
            .map_err(|e| CoreError::external("Failed to load booking", e))?
        else {
            return Ok(());
        };
        if booking.booking_status != BookingStatus::Pending || booking.is_settled() {
            return Ok(());
        }

        self.bookings
            .update_status(booking.id, BookingStatus::Cancelled, booking.payment_status)
            .await
            .map_err(|e| CoreError::external("Failed to release superseded booking", e))?;
        info!(reference = %booking.reference, "Superseded pending booking released");
        Ok(())
    }

    /// Cancels a pending or confirmed booking on behalf of its owner.
    /// Seats held by a confirmed experience booking are released first.
    pub async fn cancel_booking(
        &self,
        actor: &Actor,
        booking_id: Uuid,
        now: DateTime<Utc>,
    ) -> CoreResult<Booking> {
        let mut booking = self.guard.fetch_for(actor, booking_id).await?;

        if !matches!(
            booking.booking_status,
            BookingStatus::Pending | BookingStatus::Confirmed
        ) {
            return Err(CoreError::InvalidTransition {
                from: booking.booking_status.to_string(),
                to: BookingStatus::Cancelled.to_string(),
            });
        }

        let released = match (&booking.target, booking.booking_status) {
            (BookingTarget::Experience { instance_id }, BookingStatus::Confirmed) => {
                let seats = booking.guest_count as i32;
                self.experiences
                    .adjust_attendees(*instance_id, -seats)
                    .await
                    .map_err(|e| CoreError::external("Failed to release experience seats", e))?;
                Some((*instance_id, seats))
            }
            _ => None,
        };

        if let Err(e) = self
            .bookings
            .update_status(booking.id, BookingStatus::Cancelled, booking.payment_status)
            .await
        {
            if let Some((instance_id, seats)) = released {
                if let Err(restore) = self.experiences.adjust_attendees(instance_id, seats).await {
                    error!(
                        "Could not restore {} seats on {} after failed cancellation: {}",
                        seats, instance_id, restore
                    );
                }
            }
            return Err(CoreError::external("Failed to cancel booking", e));
        }

        self.audit
            .booking_event(
                SecurityEventType::BookingCancelled,
                Severity::Info,
                actor,
                booking.id,
                json!({ "reference": booking.reference, "previous": booking.booking_status }),
            )
            .await;
        info!(reference = %booking.reference, "Booking cancelled");

        booking.booking_status = BookingStatus::Cancelled;
        booking.updated_at = now;
        Ok(booking)
    }
}

/// Free-text draft fields whose raw value carried markup that sanitizing removes.
fn markup_fields(draft: &BookingDraft) -> Vec<&'static str> {
    let mut fields = Vec::new();
    if draft
        .contact()
        .is_some_and(|c| validation::contains_markup(&c.full_name))
    {
        fields.push("full_name");
    }
    if draft
        .guests()
        .iter()
        .any(|g| validation::contains_markup(&g.name))
    {
        fields.push("guests");
    }
    if draft
        .special_requests()
        .is_some_and(validation::contains_markup)
    {
        fields.push("special_requests");
    }
    fields
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::{stay_draft, Harness};
    use haven_core::models::SecurityEventType;
    use haven_security::validation::is_well_formed_reference;

    #[tokio::test]
    async fn test_guest_booking_with_invalid_phone_creates_nothing() {
        let h = Harness::new().await;
        let draft = stay_draft(&h, "asha@example.com", "abc").await;

        let err = h
            .services
            .persister
            .create_guest_booking(&draft, h.now())
            .await
            .unwrap_err();
        assert_eq!(err.field(), Some("phone"));
        assert!(h.store.bookings().await.is_empty());
        assert!(h.store.confirmations().await.is_empty());
    }

    #[tokio::test]
    async fn test_guest_booking_succeeds_with_well_formed_reference() {
        let h = Harness::new().await;
        let draft = stay_draft(&h, "asha@example.com", "+91 98765 43210").await;

        let created = h
            .services
            .persister
            .create_guest_booking(&draft, h.now())
            .await
            .unwrap();
        assert!(is_well_formed_reference(&created.booking_reference));

        let stored = h.store.bookings().await.remove(0);
        assert_eq!(stored.reference, created.booking_reference);
        assert_eq!(stored.contact.phone.expose(), "+919876543210");
        assert_eq!(stored.guest_count, 3);
        assert_eq!(stored.guests.len(), 3);

        let notices = h.store.confirmations().await;
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].recipient_email, "asha@example.com");
        assert_eq!(notices[0].booking_reference, created.booking_reference);
        assert!(notices[0].summary.ends_with("total 11210.00 INR"));
        assert_eq!(notices[0].occurred_at, h.now());

        assert!(h
            .store
            .audit_events()
            .await
            .iter()
            .any(|e| e.event_type == SecurityEventType::BookingCreated));
    }

    #[tokio::test]
    async fn test_stripped_markup_is_audited() {
        let h = Harness::new().await;
        let draft = stay_draft(&h, "asha@example.com", "+919876543210").await;
        assert_eq!(markup_fields(&draft), vec!["special_requests"]);

        let created = h
            .services
            .persister
            .create_guest_booking(&draft, h.now())
            .await
            .unwrap();

        let stored = h.store.bookings().await.remove(0);
        assert_eq!(stored.special_requests.as_deref(), Some("Late check-in please"));

        let events = h.store.audit_events().await;
        let flagged = events
            .iter()
            .find(|e| e.event_type == SecurityEventType::SuspiciousInput)
            .unwrap();
        assert_eq!(flagged.severity, Severity::Warning);
        assert_eq!(flagged.actor.as_deref(), Some("guest:asha@example.com"));
        assert_eq!(flagged.resource_id.as_deref(), Some(created.booking_id.to_string().as_str()));
        assert_eq!(flagged.details["fields"], json!(["special_requests"]));
    }

    #[tokio::test]
    async fn test_reference_collisions_are_retried() {
        let h = Harness::new().await;
        let draft = stay_draft(&h, "asha@example.com", "+919876543210").await;
        let first = h
            .services
            .persister
            .create_guest_booking(&draft, h.now())
            .await
            .unwrap();

        *h.references.queue.lock().unwrap() = vec![
            first.booking_reference.clone(),
            first.booking_reference.clone(),
            "STAY-261101-FRESH1".to_string(),
        ];
        let second = h
            .services
            .persister
            .create_guest_booking(&draft, h.now())
            .await
            .unwrap();
        assert_eq!(second.booking_reference, "STAY-261101-FRESH1");

        *h.references.queue.lock().unwrap() = vec![first.booking_reference.clone(); 5];
        let err = h
            .services
            .persister
            .create_guest_booking(&draft, h.now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Conflict(_)));
        assert_eq!(h.store.bookings().await.len(), 2);
    }

    #[tokio::test]
    async fn test_notification_failure_does_not_fail_booking() {
        let h = Harness::new().await;
        let draft = stay_draft(&h, "asha@example.com", "+919876543210").await;
        h.store.set_events_failing(true);

        h.services
            .persister
            .create_guest_booking(&draft, h.now())
            .await
            .unwrap();
        assert_eq!(h.store.bookings().await.len(), 1);
    }

    #[tokio::test]
    async fn test_guest_bookings_are_rate_limited_per_email() {
        let h = Harness::new().await;
        let draft = stay_draft(&h, "asha@example.com", "+919876543210").await;

        for _ in 0..5 {
            h.services
                .persister
                .create_guest_booking(&draft, h.now())
                .await
                .unwrap();
        }
        let err = h
            .services
            .persister
            .create_guest_booking(&draft, h.now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::RateLimited { .. }));
        assert_eq!(h.store.bookings().await.len(), 5);
    }

    #[tokio::test]
    async fn test_store_outage_is_external() {
        let h = Harness::new().await;
        let draft = stay_draft(&h, "asha@example.com", "+919876543210").await;
        h.store.set_failing(true);

        let err = h
            .services
            .persister
            .create_booking("u-1", &draft, h.now())
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::External(_)));
    }

    #[tokio::test]
    async fn test_cancellation_rules() {
        let h = Harness::new().await;
        let draft = stay_draft(&h, "asha@example.com", "+919876543210").await;
        let created = h
            .services
            .persister
            .create_booking("u-1", &draft, h.now())
            .await
            .unwrap();
        let persister = &h.services.persister;

        let stranger = persister
            .cancel_booking(&Actor::user("u-2", None), created.booking_id, h.now())
            .await
            .unwrap_err();
        assert!(matches!(stranger, CoreError::NotFound(_)));

        let owner = Actor::user("u-1", None);
        let later = h.now() + chrono::Duration::hours(2);
        let cancelled = persister
            .cancel_booking(&owner, created.booking_id, later)
            .await
            .unwrap();
        assert_eq!(cancelled.booking_status, BookingStatus::Cancelled);
        assert_eq!(cancelled.updated_at, later);

        let again = persister
            .cancel_booking(&owner, created.booking_id, h.now())
            .await
            .unwrap_err();
        assert!(matches!(again, CoreError::InvalidTransition { .. }));
    }
}
