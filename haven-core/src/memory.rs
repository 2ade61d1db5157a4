//! In-process implementation of every store trait.
//!
//! Backs the unit tests across the workspace and the API's `memory` run mode.
//! Each concern can be switched into a failing state to exercise fail-open
//! and fail-closed paths.

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Utc};
use haven_shared::models::events::{BookingConfirmationRequested, PaymentSettledEvent};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::identity::Actor;
use crate::models::{
    AuditEvent, Booking, BookingStatus, BookingTarget, DiscountRule, ExperienceInstance,
    OccupancySource, OccupiedRange, PaymentRecord, PaymentStatus, Property, RateLimitRecord,
};
use crate::repository::{
    AuditSink, AvailabilityRepository, BookingRepository, DiscountRepository, EventPublisher,
    ExchangeRateSource, ExperienceRepository, InsertBookingError, PaymentRepository,
    PropertyRepository, RateLimitStore,
};
use crate::StoreResult;

#[derive(Default)]
struct State {
    properties: HashMap<Uuid, Property>,
    instances: HashMap<Uuid, ExperienceInstance>,
    host_blocks: Vec<(Uuid, OccupiedRange)>,
    bookings: HashMap<Uuid, Booking>,
    payments: HashMap<String, PaymentRecord>,
    discounts: HashMap<String, DiscountRule>,
    rate_limits: HashMap<(String, String), RateLimitRecord>,
    audit: Vec<AuditEvent>,
    confirmations: Vec<BookingConfirmationRequested>,
    settlements: Vec<PaymentSettledEvent>,
    rates: HashMap<(String, String), f64>,
}

#[derive(Default)]
pub struct InMemoryStore {
    state: RwLock<State>,
    fail_all: AtomicBool,
    fail_audit: AtomicBool,
    fail_rate_limits: AtomicBool,
    fail_events: AtomicBool,
    availability_queries: AtomicUsize,
}

fn unavailable(what: &str) -> crate::StoreError {
    format!("in-memory {} is unavailable", what).into()
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, failing: bool) {
        self.fail_all.store(failing, Ordering::SeqCst);
    }

    pub fn set_audit_failing(&self, failing: bool) {
        self.fail_audit.store(failing, Ordering::SeqCst);
    }

    pub fn set_rate_limits_failing(&self, failing: bool) {
        self.fail_rate_limits.store(failing, Ordering::SeqCst);
    }

    pub fn set_events_failing(&self, failing: bool) {
        self.fail_events.store(failing, Ordering::SeqCst);
    }

    fn check(&self, flag: &AtomicBool, what: &str) -> StoreResult<()> {
        if self.fail_all.load(Ordering::SeqCst) || flag.load(Ordering::SeqCst) {
            return Err(unavailable(what));
        }
        Ok(())
    }

    fn check_all(&self, what: &str) -> StoreResult<()> {
        if self.fail_all.load(Ordering::SeqCst) {
            return Err(unavailable(what));
        }
        Ok(())
    }

    // Seeding

    pub async fn add_property(&self, property: Property) {
        self.state.write().await.properties.insert(property.id, property);
    }

    pub async fn add_instance(&self, instance: ExperienceInstance) {
        self.state.write().await.instances.insert(instance.id, instance);
    }

    pub async fn block_dates(&self, property_id: Uuid, start: NaiveDate, end: NaiveDate) {
        self.state.write().await.host_blocks.push((
            property_id,
            OccupiedRange {
                start,
                end,
                source: OccupancySource::HostBlock,
            },
        ));
    }

    pub async fn add_discount_rule(&self, rule: DiscountRule) {
        self.state
            .write()
            .await
            .discounts
            .insert(rule.code.to_uppercase(), rule);
    }

    pub async fn set_rate(&self, from: &str, to: &str, rate: f64) {
        self.state
            .write()
            .await
            .rates
            .insert((from.to_uppercase(), to.to_uppercase()), rate);
    }

    // Inspection

    pub async fn bookings(&self) -> Vec<Booking> {
        self.state.read().await.bookings.values().cloned().collect()
    }

    pub async fn instance(&self, id: Uuid) -> Option<ExperienceInstance> {
        self.state.read().await.instances.get(&id).cloned()
    }

    pub async fn payments(&self) -> Vec<PaymentRecord> {
        self.state.read().await.payments.values().cloned().collect()
    }

    pub async fn audit_events(&self) -> Vec<AuditEvent> {
        self.state.read().await.audit.clone()
    }

    pub async fn confirmations(&self) -> Vec<BookingConfirmationRequested> {
        self.state.read().await.confirmations.clone()
    }

    pub async fn settlements(&self) -> Vec<PaymentSettledEvent> {
        self.state.read().await.settlements.clone()
    }

    pub fn availability_queries(&self) -> usize {
        self.availability_queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PropertyRepository for InMemoryStore {
    async fn get_property(&self, id: Uuid) -> StoreResult<Option<Property>> {
        self.check_all("property table")?;
        Ok(self.state.read().await.properties.get(&id).cloned())
    }
}

#[async_trait]
impl ExperienceRepository for InMemoryStore {
    async fn get_instance(&self, id: Uuid) -> StoreResult<Option<ExperienceInstance>> {
        self.check_all("experience table")?;
        self.availability_queries.fetch_add(1, Ordering::SeqCst);
        Ok(self.state.read().await.instances.get(&id).cloned())
    }

    async fn adjust_attendees(&self, id: Uuid, delta: i32) -> StoreResult<()> {
        self.check_all("experience table")?;
        let mut state = self.state.write().await;
        let instance = state
            .instances
            .get_mut(&id)
            .ok_or_else(|| format!("experience instance {} not found", id))?;
        let next = instance.current_attendees as i64 + delta as i64;
        instance.current_attendees = next.max(0) as u32;
        Ok(())
    }
}

#[async_trait]
impl AvailabilityRepository for InMemoryStore {
    async fn occupied_ranges(
        &self,
        property_id: Uuid,
        from: NaiveDate,
        to: NaiveDate,
    ) -> StoreResult<Vec<OccupiedRange>> {
        self.check_all("booking table")?;
        self.availability_queries.fetch_add(1, Ordering::SeqCst);
        let state = self.state.read().await;

        let mut ranges: Vec<OccupiedRange> = state
            .host_blocks
            .iter()
            .filter(|(id, range)| *id == property_id && range.start < to && from < range.end)
            .map(|(_, range)| range.clone())
            .collect();

        for booking in state.bookings.values() {
            if !booking.booking_status.holds_inventory() {
                continue;
            }
            if let BookingTarget::Stay {
                property_id: booked,
                check_in,
                check_out,
            } = &booking.target
            {
                if *booked == property_id && *check_in < to && from < *check_out {
                    ranges.push(OccupiedRange {
                        start: *check_in,
                        end: *check_out,
                        source: OccupancySource::Booking,
                    });
                }
            }
        }

        Ok(ranges)
    }
}

#[async_trait]
impl BookingRepository for InMemoryStore {
    async fn insert_booking(&self, booking: &Booking) -> Result<(), InsertBookingError> {
        self.check_all("booking table")?;
        let mut state = self.state.write().await;
        if state
            .bookings
            .values()
            .any(|existing| existing.reference == booking.reference)
        {
            return Err(InsertBookingError::DuplicateReference(booking.reference.clone()));
        }
        state.bookings.insert(booking.id, booking.clone());
        Ok(())
    }

    async fn get_booking(&self, id: Uuid) -> StoreResult<Option<Booking>> {
        self.check_all("booking table")?;
        Ok(self.state.read().await.bookings.get(&id).cloned())
    }

    async fn find_by_reference(&self, reference: &str) -> StoreResult<Option<Booking>> {
        self.check_all("booking table")?;
        Ok(self
            .state
            .read()
            .await
            .bookings
            .values()
            .find(|b| b.reference == reference)
            .cloned())
    }

    async fn update_status(
        &self,
        id: Uuid,
        booking_status: BookingStatus,
        payment_status: PaymentStatus,
    ) -> StoreResult<()> {
        self.check_all("booking table")?;
        let mut state = self.state.write().await;
        let booking = state
            .bookings
            .get_mut(&id)
            .ok_or_else(|| format!("booking {} not found", id))?;
        booking.booking_status = booking_status;
        booking.payment_status = payment_status;
        booking.updated_at = Utc::now();
        Ok(())
    }

    async fn count_paid_bookings(&self, actor: &Actor) -> StoreResult<u64> {
        self.check_all("booking table")?;
        let state = self.state.read().await;
        let count = state
            .bookings
            .values()
            .filter(|b| b.payment_status == PaymentStatus::Paid)
            .filter(|b| match actor {
                Actor::User { user_id, .. } => b.user_id.as_deref() == Some(user_id.as_str()),
                Actor::Guest { email } => b.contact.email.expose().eq_ignore_ascii_case(email),
            })
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl PaymentRepository for InMemoryStore {
    async fn record_payment(&self, record: &PaymentRecord) -> StoreResult<()> {
        self.check_all("payment table")?;
        self.state
            .write()
            .await
            .payments
            .insert(record.intent_id.clone(), record.clone());
        Ok(())
    }

    async fn find_by_intent(&self, intent_id: &str) -> StoreResult<Option<PaymentRecord>> {
        self.check_all("payment table")?;
        Ok(self.state.read().await.payments.get(intent_id).cloned())
    }

    async fn update_payment_status(&self, intent_id: &str, status: PaymentStatus) -> StoreResult<()> {
        self.check_all("payment table")?;
        let mut state = self.state.write().await;
        let record = state
            .payments
            .get_mut(intent_id)
            .ok_or_else(|| format!("payment {} not found", intent_id))?;
        record.status = status;
        record.updated_at = Utc::now();
        Ok(())
    }
}

#[async_trait]
impl DiscountRepository for InMemoryStore {
    async fn find_rule(&self, code: &str) -> StoreResult<Option<DiscountRule>> {
        self.check_all("discount table")?;
        Ok(self.state.read().await.discounts.get(code).cloned())
    }

    async fn record_redemption(&self, code: &str) -> StoreResult<bool> {
        self.check_all("discount table")?;
        let mut state = self.state.write().await;
        let Some(rule) = state.discounts.get_mut(&code.to_uppercase()) else {
            return Ok(false);
        };
        if rule.max_redemptions.is_some_and(|max| rule.redemptions >= max) {
            return Ok(false);
        }
        rule.redemptions += 1;
        Ok(true)
    }
}

#[async_trait]
impl RateLimitStore for InMemoryStore {
    async fn record_attempt(
        &self,
        identifier: &str,
        action: &str,
        window: Duration,
        now: DateTime<Utc>,
    ) -> StoreResult<RateLimitRecord> {
        self.check(&self.fail_rate_limits, "rate limit table")?;
        let mut state = self.state.write().await;
        let key = (identifier.to_string(), action.to_string());

        let record = state
            .rate_limits
            .entry(key)
            .and_modify(|record| {
                if now >= record.window_expires {
                    record.attempt_count = 1;
                    record.window_start = now;
                    record.window_expires = now + window;
                } else {
                    record.attempt_count += 1;
                }
            })
            .or_insert_with(|| RateLimitRecord {
                identifier: identifier.to_string(),
                action: action.to_string(),
                attempt_count: 1,
                window_start: now,
                window_expires: now + window,
            });

        Ok(record.clone())
    }
}

#[async_trait]
impl AuditSink for InMemoryStore {
    async fn record(&self, event: &AuditEvent) -> StoreResult<()> {
        self.check(&self.fail_audit, "audit table")?;
        self.state.write().await.audit.push(event.clone());
        Ok(())
    }
}

#[async_trait]
impl ExchangeRateSource for InMemoryStore {
    async fn rate(&self, from: &str, to: &str) -> StoreResult<Option<f64>> {
        self.check_all("exchange rates")?;
        if from.eq_ignore_ascii_case(to) {
            return Ok(Some(1.0));
        }
        Ok(self
            .state
            .read()
            .await
            .rates
            .get(&(from.to_uppercase(), to.to_uppercase()))
            .copied())
    }
}

#[async_trait]
impl EventPublisher for InMemoryStore {
    async fn booking_confirmation_requested(
        &self,
        event: &BookingConfirmationRequested,
    ) -> StoreResult<()> {
        self.check(&self.fail_events, "event bus")?;
        self.state.write().await.confirmations.push(event.clone());
        Ok(())
    }

    async fn payment_settled(&self, event: &PaymentSettledEvent) -> StoreResult<()> {
        self.check(&self.fail_events, "event bus")?;
        self.state.write().await.settlements.push(event.clone());
        Ok(())
    }
}
