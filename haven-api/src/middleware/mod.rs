pub mod auth;
pub mod rate_limit;

pub use auth::{Caller, UserClaims};
pub use rate_limit::ip_rate_limit;
