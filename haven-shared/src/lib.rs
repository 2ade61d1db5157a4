pub mod models;
pub mod money;
pub mod pii;

pub use money::Minor;
pub use pii::Masked;
