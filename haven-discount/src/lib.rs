pub mod rules;
pub mod validator;

pub use rules::DiscountContext;
pub use validator::{DiscountConfig, DiscountValidator, ReservedCode};
