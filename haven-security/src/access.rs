use std::sync::Arc;

use haven_core::models::{Booking, SecurityEventType, Severity};
use haven_core::repository::BookingRepository;
use haven_core::{Actor, CoreError, CoreResult};
use serde_json::json;
use uuid::Uuid;

use crate::audit::AuditLogger;
use crate::validation;

/// Loads bookings on behalf of an actor.
///
/// A booking the actor may not see is reported exactly like a missing one,
/// so callers cannot fish for other guests' references.
#[derive(Clone)]
pub struct BookingAccessGuard {
    bookings: Arc<dyn BookingRepository>,
    audit: AuditLogger,
}

impl BookingAccessGuard {
    pub fn new(bookings: Arc<dyn BookingRepository>, audit: AuditLogger) -> Self {
        Self { bookings, audit }
    }

    pub async fn fetch_for(&self, actor: &Actor, booking_id: Uuid) -> CoreResult<Booking> {
        let booking = self
            .bookings
            .get_booking(booking_id)
            .await
            .map_err(|e| CoreError::external("Failed to load booking", e))?;

        match booking {
            None => Err(self.deny(actor, &booking_id.to_string(), "not_found").await),
            Some(b) if !b.is_accessible_by(actor) => {
                Err(self.deny(actor, &b.id.to_string(), "not_owner").await)
            }
            Some(b) => Ok(self.grant(actor, b).await),
        }
    }

    /// Guest lookup: the reference plus the email the booking was made under.
    /// Bookings that belong to an account are only reachable by signing in.
    pub async fn fetch_by_reference(&self, reference: &str, email: &str) -> CoreResult<Booking> {
        let reference = validation::validate_booking_reference(reference)?;
        let email = validation::validate_email(email)?;
        let actor = Actor::guest(&email);

        let booking = self
            .bookings
            .find_by_reference(&reference)
            .await
            .map_err(|e| CoreError::external("Failed to look up booking", e))?;

        match booking {
            None => Err(self.deny(&actor, &reference, "not_found").await),
            Some(b) if b.user_id.is_some() => {
                Err(self.deny(&actor, &b.id.to_string(), "owned_by_user").await)
            }
            Some(b) if !b.contact.email.expose().trim().eq_ignore_ascii_case(&email) => {
                Err(self.deny(&actor, &b.id.to_string(), "email_mismatch").await)
            }
            Some(b) => Ok(self.grant(&actor, b).await),
        }
    }

    async fn deny(&self, actor: &Actor, requested: &str, reason: &str) -> CoreError {
        self.audit
            .booking_event(
                SecurityEventType::BookingAccessDenied,
                Severity::Warning,
                actor,
                requested,
                json!({ "reason": reason }),
            )
            .await;
        CoreError::NotFound("booking".into())
    }

    async fn grant(&self, actor: &Actor, booking: Booking) -> Booking {
        self.audit
            .booking_event(
                SecurityEventType::BookingAccessGranted,
                Severity::Info,
                actor,
                booking.id,
                json!({ "reference": booking.reference }),
            )
            .await;
        booking
    }
}
