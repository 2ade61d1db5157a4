pub mod app_config;
pub mod audit_repo;
pub mod booking_repo;
pub mod catalog_repo;
pub mod database;
pub mod discount_repo;
pub mod events;
pub mod payment_gateway;
pub mod redis_repo;

pub use audit_repo::PostgresAuditSink;
pub use booking_repo::{PostgresBookingRepository, PostgresPaymentRepository};
pub use catalog_repo::PostgresCatalogRepository;
pub use database::DbClient;
pub use discount_repo::PostgresDiscountRepository;
pub use events::EventProducer;
pub use payment_gateway::RazorpayGateway;
pub use redis_repo::RedisClient;
