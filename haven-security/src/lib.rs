//! Guards shared by the booking and payment paths: input hygiene, attempt
//! throttling, the security audit trail and booking ownership checks.

pub mod access;
pub mod audit;
pub mod rate_limit;
pub mod validation;

pub use access::BookingAccessGuard;
pub use audit::AuditLogger;
pub use rate_limit::{RateLimitAction, RateLimitDecision, RateLimitPolicy, RateLimiter};
