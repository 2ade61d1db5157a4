use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use haven_booking::{
    BookingFlow, BookingPersister, FlowServices, PaymentCoordinator, RandomReferences,
};
use haven_catalog::{AvailabilityChecker, PriceCalculator, PricingConfig};
use haven_core::memory::InMemoryStore;
use haven_core::payment::PaymentGateway;
use haven_core::repository::{
    AuditSink, AvailabilityRepository, BookingRepository, DiscountRepository, EventPublisher,
    ExchangeRateSource, ExperienceRepository, PaymentRepository, PropertyRepository,
    RateLimitStore,
};
use haven_core::Clock;
use haven_discount::{DiscountConfig, DiscountValidator};
use haven_security::rate_limit::{RateLimitAction, RateLimitPolicy};
use haven_security::{AuditLogger, BookingAccessGuard, RateLimiter};
use tokio::sync::{Mutex, RwLock};
use tracing::debug;
use uuid::Uuid;

/// Flows nobody has touched for this long are dropped from the registry.
const FLOW_IDLE_HOURS: i64 = 24;

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: String,
}

/// Storage and gateway adapters the services are assembled from.
pub struct Backends {
    pub properties: Arc<dyn PropertyRepository>,
    pub experiences: Arc<dyn ExperienceRepository>,
    pub availability: Arc<dyn AvailabilityRepository>,
    pub bookings: Arc<dyn BookingRepository>,
    pub payments: Arc<dyn PaymentRepository>,
    pub discounts: Arc<dyn DiscountRepository>,
    pub rate_limits: Arc<dyn RateLimitStore>,
    pub audit: Arc<dyn AuditSink>,
    pub rates: Arc<dyn ExchangeRateSource>,
    pub events: Arc<dyn EventPublisher>,
    pub gateway: Arc<dyn PaymentGateway>,
}

impl Backends {
    /// Every adapter served from one in-memory store.
    pub fn in_memory(store: Arc<InMemoryStore>, gateway: Arc<dyn PaymentGateway>) -> Self {
        Self {
            properties: store.clone(),
            experiences: store.clone(),
            availability: store.clone(),
            bookings: store.clone(),
            payments: store.clone(),
            discounts: store.clone(),
            rate_limits: store.clone(),
            audit: store.clone(),
            rates: store.clone(),
            events: store,
            gateway,
        }
    }
}

#[derive(Clone)]
pub struct Settings {
    pub pricing: PricingConfig,
    pub discounts: DiscountConfig,
    pub rate_limits: HashMap<RateLimitAction, RateLimitPolicy>,
    pub ip_requests_per_minute: u32,
    pub auth: AuthConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            pricing: PricingConfig::default(),
            discounts: DiscountConfig::default(),
            rate_limits: HashMap::new(),
            ip_requests_per_minute: 120,
            auth: AuthConfig {
                secret: "local-development-secret".into(),
            },
        }
    }
}

struct FlowEntry {
    flow: Arc<Mutex<BookingFlow>>,
    last_used: DateTime<Utc>,
}

/// Open booking flows keyed by flow id. Each flow has its own lock so one
/// slow gateway call does not stall every other session.
#[derive(Clone, Default)]
pub struct FlowRegistry {
    entries: Arc<RwLock<HashMap<Uuid, FlowEntry>>>,
}

impl FlowRegistry {
    pub async fn insert(&self, flow: BookingFlow, now: DateTime<Utc>) -> Arc<Mutex<BookingFlow>> {
        let id = flow.id();
        let flow = Arc::new(Mutex::new(flow));
        let mut entries = self.entries.write().await;

        let cutoff = now - Duration::hours(FLOW_IDLE_HOURS);
        let before = entries.len();
        entries.retain(|_, entry| entry.last_used > cutoff);
        if entries.len() < before {
            debug!("Dropped {} idle booking flows", before - entries.len());
        }

        entries.insert(
            id,
            FlowEntry {
                flow: flow.clone(),
                last_used: now,
            },
        );
        flow
    }

    pub async fn get(&self, id: Uuid, now: DateTime<Utc>) -> Option<Arc<Mutex<BookingFlow>>> {
        let mut entries = self.entries.write().await;
        let entry = entries.get_mut(&id)?;
        entry.last_used = now;
        Some(entry.flow.clone())
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub services: FlowServices,
    pub guard: Arc<BookingAccessGuard>,
    pub limiter: RateLimiter,
    pub audit: AuditLogger,
    pub ip_limits: Arc<dyn RateLimitStore>,
    pub ip_requests_per_minute: u32,
    pub flows: FlowRegistry,
    pub auth: AuthConfig,
}

impl AppState {
    pub fn new(backends: Backends, settings: Settings, clock: Clock) -> Self {
        let audit = AuditLogger::new(backends.audit.clone());
        let limiter = settings.rate_limits.iter().fold(
            RateLimiter::new(backends.rate_limits.clone(), audit.clone()),
            |limiter, (action, policy)| limiter.with_policy(*action, *policy),
        );

        let services = FlowServices {
            availability: Arc::new(AvailabilityChecker::new(
                backends.availability.clone(),
                backends.experiences.clone(),
            )),
            pricing: Arc::new(
                PriceCalculator::new(
                    backends.properties.clone(),
                    backends.experiences.clone(),
                    backends.rates.clone(),
                    settings.pricing.clone(),
                )
                .with_clock(clock.clone()),
            ),
            discounts: Arc::new(
                DiscountValidator::new(
                    backends.discounts.clone(),
                    backends.bookings.clone(),
                    settings.discounts.clone(),
                )
                .with_rate_limiter(limiter.clone()),
            ),
            persister: Arc::new(BookingPersister::new(
                backends.bookings.clone(),
                backends.experiences.clone(),
                backends.events.clone(),
                Arc::new(RandomReferences),
                limiter.clone(),
                audit.clone(),
            )),
            payments: Arc::new(PaymentCoordinator::new(
                backends.gateway.clone(),
                backends.bookings.clone(),
                backends.payments.clone(),
                backends.experiences.clone(),
                backends.discounts.clone(),
                backends.events.clone(),
                limiter.clone(),
                audit.clone(),
            )),
            clock,
        };

        Self {
            guard: Arc::new(BookingAccessGuard::new(backends.bookings, audit.clone())),
            services,
            limiter,
            audit,
            ip_limits: backends.rate_limits,
            ip_requests_per_minute: settings.ip_requests_per_minute,
            flows: FlowRegistry::default(),
            auth: settings.auth,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.services.clock)()
    }
}
