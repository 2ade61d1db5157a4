use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use haven_catalog::{AvailabilityChecker, PriceCalculator, PricingConfig};
use haven_core::memory::InMemoryStore;
use haven_core::models::{BookingTarget, ExperienceInstance, GuestEntry, Property};
use haven_core::Clock;
use haven_discount::{DiscountConfig, DiscountValidator};
use haven_security::{AuditLogger, RateLimiter};
use haven_shared::Masked;
use uuid::Uuid;

use crate::draft::{ContactInput, GuestInfo};
use crate::flow::{BookingFlow, FlowConfig, FlowKind, FlowServices, Session};
use crate::orchestrator::{MockPaymentGateway, PaymentCoordinator};
use crate::persister::BookingPersister;
use crate::reference::{RandomReferences, ReferenceSource};

pub fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// Hands out queued references first, random ones after.
#[derive(Default)]
pub struct ScriptedReferences {
    pub queue: Mutex<Vec<String>>,
}

impl ReferenceSource for ScriptedReferences {
    fn next_reference(&self, target: &BookingTarget, today: NaiveDate) -> String {
        let mut queue = self.queue.lock().unwrap();
        if queue.is_empty() {
            RandomReferences.next_reference(target, today)
        } else {
            queue.remove(0)
        }
    }
}

pub struct Harness {
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<MockPaymentGateway>,
    pub references: Arc<ScriptedReferences>,
    pub services: FlowServices,
    pub villa: Property,
    pub trek: ExperienceInstance,
    offset_secs: Arc<AtomicI64>,
}

impl Harness {
    pub async fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let villa = Property {
            id: Uuid::new_v4(),
            name: "Hillside Villa".into(),
            base_price_minor: 300_000,
            currency: "INR".into(),
            cleaning_fee_minor: 0,
            max_guests: 6,
            amenities: vec!["pool".into()],
            state: Some("Karnataka".into()),
            is_active: true,
        };
        let trek = ExperienceInstance {
            id: Uuid::new_v4(),
            experience_id: Uuid::new_v4(),
            title: "Sunrise coffee trail".into(),
            date: date("2026-12-02"),
            start_time: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            max_capacity: 10,
            current_attendees: 7,
            price_per_person_minor: Some(120_000),
            flat_fee_minor: None,
            currency: "INR".into(),
        };
        store.add_property(villa.clone()).await;
        store.add_instance(trek.clone()).await;

        let offset_secs = Arc::new(AtomicI64::new(0));
        let base = Utc.with_ymd_and_hms(2026, 11, 1, 10, 0, 0).unwrap();
        let clock_offset = offset_secs.clone();
        let clock: Clock =
            Arc::new(move || base + Duration::seconds(clock_offset.load(Ordering::SeqCst)));

        let audit = AuditLogger::new(store.clone());
        let limiter = RateLimiter::new(store.clone(), audit.clone());
        let references = Arc::new(ScriptedReferences::default());
        let gateway = Arc::new(MockPaymentGateway::new());

        let services = FlowServices {
            availability: Arc::new(AvailabilityChecker::new(store.clone(), store.clone())),
            pricing: Arc::new(
                PriceCalculator::new(
                    store.clone(),
                    store.clone(),
                    store.clone(),
                    PricingConfig::default(),
                )
                .with_clock(clock.clone()),
            ),
            discounts: Arc::new(
                DiscountValidator::new(store.clone(), store.clone(), DiscountConfig::default())
                    .with_rate_limiter(limiter.clone()),
            ),
            persister: Arc::new(BookingPersister::new(
                store.clone(),
                store.clone(),
                store.clone(),
                references.clone(),
                limiter.clone(),
                audit.clone(),
            )),
            payments: Arc::new(PaymentCoordinator::new(
                gateway.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                store.clone(),
                limiter,
                audit,
            )),
            clock,
        };

        Self {
            store,
            gateway,
            references,
            services,
            villa,
            trek,
            offset_secs,
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        (self.services.clock)()
    }

    pub fn advance(&self, secs: i64) {
        self.offset_secs.fetch_add(secs, Ordering::SeqCst);
    }

    pub fn stay_flow(&self, session: Session) -> BookingFlow {
        BookingFlow::new(
            self.services.clone(),
            FlowConfig {
                kind: FlowKind::Stay,
                display_currency: None,
            },
            session,
        )
    }

    pub fn experience_flow(&self, session: Session) -> BookingFlow {
        BookingFlow::new(
            self.services.clone(),
            FlowConfig {
                kind: FlowKind::Experience,
                display_currency: None,
            },
            session,
        )
    }
}

pub fn guest_info(email: &str, phone: &str, names: &[&str]) -> GuestInfo {
    GuestInfo {
        guests: names
            .iter()
            .map(|n| GuestEntry {
                name: n.to_string(),
                age: None,
            })
            .collect(),
        contact: ContactInput {
            full_name: "Asha Rao".into(),
            email: Masked::new(email.into()),
            phone: Masked::new(phone.into()),
        },
        special_requests: Some("<script>x</script>Late check-in please".into()),
        billing_state: None,
    }
}

/// Drives a stay flow for 3 nights / 3 guests up to the summary step.
pub async fn stay_at_summary(h: &Harness, session: Session, email: &str) -> BookingFlow {
    let mut flow = h.stay_flow(session);
    flow.select_stay(h.villa.id, date("2026-12-01"), date("2026-12-04"), 3)
        .await
        .unwrap();
    flow.continue_to_guest_info().unwrap();
    flow.set_guest_info(guest_info(email, "+91 98765 43210", &["Asha", "Kabir", "Meera"]))
        .await
        .unwrap();
    flow.continue_to_summary().unwrap();
    flow
}

/// A stay draft with guest info filled in but not yet checked.
pub async fn stay_draft(h: &Harness, email: &str, phone: &str) -> crate::draft::BookingDraft {
    let mut flow = h.stay_flow(Session::Anonymous);
    flow.select_stay(h.villa.id, date("2026-12-01"), date("2026-12-04"), 3)
        .await
        .unwrap();
    flow.continue_to_guest_info().unwrap();
    flow.set_guest_info(guest_info(email, phone, &["Asha", "Kabir", "Meera"]))
        .await
        .unwrap();
    flow.draft().clone()
}

/// Runs `flow` from `Summary` through a successful payment.
pub async fn pay(h: &Harness, flow: &mut BookingFlow) {
    flow.continue_to_payment().await.unwrap();
    let handoff = flow.start_payment().await.unwrap();
    h.gateway
        .set_outcome(&handoff.intent_id, haven_core::payment::IntentStatus::Succeeded);
    let outcome = flow.complete_payment(&handoff.intent_id).await.unwrap();
    assert!(outcome.succeeded());
}
