use haven_catalog::PricingConfig;
use haven_discount::DiscountConfig;
use haven_security::rate_limit::{RateLimitAction, RateLimitPolicy};
use serde::Deserialize;
use std::collections::HashMap;
use std::env;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub auth: AuthConfig,
    #[serde(default)]
    pub pricing: PricingConfig,
    /// Overrides per action; actions left out keep their shipped policy.
    #[serde(default)]
    pub rate_limits: HashMap<RateLimitAction, RateLimitPolicy>,
    #[serde(default)]
    pub discounts: DiscountConfig,
    pub payment: PaymentConfig,
    /// Units of each currency per one INR, display only.
    #[serde(default)]
    pub exchange_rates: HashMap<String, f64>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
    /// Per-IP requests per minute across the whole API.
    #[serde(default = "default_ip_limit")]
    pub ip_requests_per_minute: u32,
}

fn default_ip_limit() -> u32 {
    120
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 {
    5
}

#[derive(Debug, Deserialize, Clone)]
pub struct RedisConfig {
    pub url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KafkaConfig {
    pub brokers: String,
    #[serde(default = "default_confirmation_topic")]
    pub confirmation_topic: String,
    #[serde(default = "default_settlement_topic")]
    pub settlement_topic: String,
}

fn default_confirmation_topic() -> String {
    "notifications.booking_confirmation".into()
}

fn default_settlement_topic() -> String {
    "payments.settled".into()
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct PaymentConfig {
    /// `razorpay` or `mock`.
    #[serde(default = "default_gateway")]
    pub gateway: String,
    pub base_url: String,
    pub key_id: String,
    pub key_secret: String,
}

fn default_gateway() -> String {
    "razorpay".into()
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Never checked in
            .add_source(config::File::with_name("config/local").required(false))
            // e.g. `HAVEN__DATABASE__URL=postgres://...`
            .add_source(
                config::Environment::with_prefix("HAVEN")
                    .prefix_separator("__")
                    .separator("__"),
            )
            .build()?;

        s.try_deserialize()
    }
}
