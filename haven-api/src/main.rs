use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use haven_api::state::{AuthConfig, Backends, Settings};
use haven_api::{app, AppState};
use haven_booking::MockPaymentGateway;
use haven_catalog::StaticRates;
use haven_core::payment::PaymentGateway;
use haven_core::system_clock;
use haven_store::app_config::Config;
use haven_store::{
    DbClient, EventProducer, PostgresAuditSink, PostgresBookingRepository,
    PostgresCatalogRepository, PostgresDiscountRepository, PostgresPaymentRepository,
    RazorpayGateway, RedisClient,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "haven_api=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load().context("Failed to load config")?;
    tracing::info!("Starting Haven API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url, config.database.max_connections)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Redis
    let redis = RedisClient::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;

    // Kafka
    let events = EventProducer::new(
        &config.kafka.brokers,
        &config.kafka.confirmation_topic,
        &config.kafka.settlement_topic,
    )
    .context("Failed to create Kafka producer")?;

    let gateway: Arc<dyn PaymentGateway> = match config.payment.gateway.as_str() {
        "mock" => {
            tracing::warn!("Using the in-process mock payment gateway");
            Arc::new(MockPaymentGateway::new())
        }
        _ => Arc::new(
            RazorpayGateway::new(
                &config.payment.base_url,
                &config.payment.key_id,
                &config.payment.key_secret,
            )
            .context("Failed to build payment gateway client")?,
        ),
    };

    let catalog = Arc::new(PostgresCatalogRepository::new(db.pool.clone()));
    let backends = Backends {
        properties: catalog.clone(),
        experiences: catalog.clone(),
        availability: catalog,
        bookings: Arc::new(PostgresBookingRepository::new(db.pool.clone())),
        payments: Arc::new(PostgresPaymentRepository::new(db.pool.clone())),
        discounts: Arc::new(PostgresDiscountRepository::new(db.pool.clone())),
        rate_limits: Arc::new(redis),
        audit: Arc::new(PostgresAuditSink::new(db.pool.clone())),
        rates: Arc::new(StaticRates::new("INR", config.exchange_rates.clone())),
        events: Arc::new(events),
        gateway,
    };

    let settings = Settings {
        pricing: config.pricing.clone(),
        discounts: config.discounts.clone(),
        rate_limits: config.rate_limits.clone(),
        ip_requests_per_minute: config.server.ip_requests_per_minute,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    };

    let app = app(AppState::new(backends, settings, system_clock()));

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;
    Ok(())
}
