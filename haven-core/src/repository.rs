use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use haven_shared::models::events::{BookingConfirmationRequested, PaymentSettledEvent};
use uuid::Uuid;

use crate::identity::Actor;
use crate::models::{
    AuditEvent, Booking, BookingStatus, DiscountRule, ExperienceInstance, OccupiedRange,
    PaymentRecord, PaymentStatus, Property, RateLimitRecord,
};
use crate::{StoreError, StoreResult};

/// Read access to property reference data
#[async_trait]
pub trait PropertyRepository: Send + Sync {
    async fn get_property(&self, id: Uuid) -> StoreResult<Option<Property>>;
}

/// Experience schedule access
#[async_trait]
pub trait ExperienceRepository: Send + Sync {
    async fn get_instance(&self, id: Uuid) -> StoreResult<Option<ExperienceInstance>>;

    /// Requests the store to shift `current_attendees` by `delta`.
    async fn adjust_attendees(&self, id: Uuid, delta: i32) -> StoreResult<()>;
}

/// Reservations and host blocks for a property
#[async_trait]
pub trait AvailabilityRepository: Send + Sync {
    /// Every occupied range that intersects `[from, to)`.
    async fn occupied_ranges(
        &self,
        property_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<OccupiedRange>>;
}

#[derive(Debug, thiserror::Error)]
pub enum InsertBookingError {
    #[error("Booking reference already exists: {0}")]
    DuplicateReference(String),
    #[error("Store failure: {0}")]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait BookingRepository: Send + Sync {
    async fn insert_booking(&self, booking: &Booking) -> Result<(), InsertBookingError>;

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>>;

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<Booking>>;

    async fn update_status(
        &self,
        id: Uuid,
        booking_status: BookingStatus,
        payment_status: PaymentStatus,
    ) -> StoreResult<()>;

    /// Paid bookings previously made by this actor (user id or guest email).
    async fn count_paid_bookings(&self, actor: &Actor) -> StoreResult<u64>;
}

#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn record_payment(&self, record: &PaymentRecord) -> StoreResult<()>;

    async fn find_by_intent(&self, intent_id: &str) -> StoreResult<Option<PaymentRecord>>;

    async fn update_payment_status(&self, intent_id: &str, status: PaymentStatus) -> StoreResult<()>;
}

#[async_trait]
pub trait DiscountRepository: Send + Sync {
    /// `code` is already upper case.
    async fn find_rule(&self, code: &str) -> StoreResult<Option<DiscountRule>>;

    /// Counts one use of a stored code. `false` when the code is unknown or
    /// already at its cap.
    async fn record_redemption(&self, code: &str) -> StoreResult<bool>;
}

/// Fixed-window attempt counter
#[async_trait]
pub trait RateLimitStore: Send + Sync {
    /// Counts one attempt. Starts a fresh window when none is open at `now`.
    async fn record_attempt(
        &self,
        identifier: &str,
        action: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<RateLimitRecord>;
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, event: &AuditEvent) -> StoreResult<()>;
}

/// Display-only exchange rates
#[async_trait]
pub trait ExchangeRateSource: Send + Sync {
    /// Units of `to` per one unit of `from`; `None` when the pair is unknown.
    async fn rate(&self, from: &str, to: &str) -> StoreResult<Option<f64>>;
}

/// Outbound domain events (notifications, settlement feed)
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn booking_confirmation_requested(
        &self,
        event: &BookingConfirmationRequested,
    ) -> StoreResult<()>;

    async fn payment_settled(&self, event: &PaymentSettledEvent) -> StoreResult<()>;
}
