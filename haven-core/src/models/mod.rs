pub mod booking;
pub mod discount;
pub mod property;
pub mod security;
pub mod stay;

pub use booking::{
    Booking, BookingAmounts, BookingStatus, BookingTarget, GuestContact, GuestEntry, PaymentRecord,
    PaymentStatus,
};
pub use discount::{DiscountApplication, DiscountKind, DiscountRule, RuleCondition};
pub use property::{ExperienceInstance, OccupancySource, OccupiedRange, Property};
pub use security::{AuditEvent, RateLimitRecord, SecurityEventType, Severity};
pub use stay::StayDates;
