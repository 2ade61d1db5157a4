//! Multi-step booking flow.
//!
//! ```text
//! Idle -> SelectingDates -> GuestInfo -> Summary -> Payment -> Confirmation
//! ```
//!
//! One flow per session, driven by one caller at a time. A failed step keeps
//! both the current step and the draft exactly as they were. `back` is
//! allowed everywhere except `Confirmation` and never discards input.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use haven_catalog::{AvailabilityChecker, PriceBreakdown, PriceCalculator, StayQuoteRequest};
use haven_core::models::{DiscountApplication, StayDates};
use haven_core::{Actor, Clock, CoreError, CoreResult};
use haven_discount::{DiscountContext, DiscountValidator};
use haven_security::validation;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::draft::{BookingDraft, GuestInfo, Selection};
use crate::orchestrator::{PaymentCoordinator, PaymentHandoff, SettlementOutcome};
use crate::persister::BookingPersister;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowStep {
    Idle,
    SelectingDates,
    GuestInfo,
    Summary,
    Payment,
    Confirmation,
}

impl FlowStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowStep::Idle => "idle",
            FlowStep::SelectingDates => "selecting_dates",
            FlowStep::GuestInfo => "guest_info",
            FlowStep::Summary => "summary",
            FlowStep::Payment => "payment",
            FlowStep::Confirmation => "confirmation",
        }
    }

    fn previous(&self) -> Option<FlowStep> {
        match self {
            FlowStep::Idle | FlowStep::Confirmation => None,
            FlowStep::SelectingDates => Some(FlowStep::Idle),
            FlowStep::GuestInfo => Some(FlowStep::SelectingDates),
            FlowStep::Summary => Some(FlowStep::GuestInfo),
            FlowStep::Payment => Some(FlowStep::Summary),
        }
    }
}

impl fmt::Display for FlowStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlowKind {
    Stay,
    Experience,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FlowConfig {
    pub kind: FlowKind,
    /// Currency quotes are additionally shown in. Settlement is unaffected.
    #[serde(default)]
    pub display_currency: Option<String>,
}

/// Who is driving the flow, fixed when the flow is opened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Session {
    Authenticated {
        user_id: String,
        email: Option<String>,
    },
    Anonymous,
}

#[derive(Clone)]
pub struct FlowServices {
    pub availability: Arc<AvailabilityChecker>,
    pub pricing: Arc<PriceCalculator>,
    pub discounts: Arc<DiscountValidator>,
    pub persister: Arc<BookingPersister>,
    pub payments: Arc<PaymentCoordinator>,
    pub clock: Clock,
}

/// The pending booking row created on entering `Payment`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedBooking {
    pub booking_id: Uuid,
    pub booking_reference: String,
    pub draft_revision: u64,
    pub total_minor: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FlowSnapshot {
    pub flow_id: Uuid,
    pub kind: FlowKind,
    pub step: FlowStep,
    pub draft: BookingDraft,
    pub booking: Option<PersistedBooking>,
    pub payment: Option<PaymentHandoff>,
    pub settlement: Option<SettlementOutcome>,
}

pub struct BookingFlow {
    services: FlowServices,
    config: FlowConfig,
    session: Session,
    step: FlowStep,
    draft: BookingDraft,
    booking: Option<PersistedBooking>,
    payment: Option<PaymentHandoff>,
    settlement: Option<SettlementOutcome>,
}

impl BookingFlow {
    pub fn new(services: FlowServices, config: FlowConfig, session: Session) -> Self {
        Self {
            services,
            config,
            session,
            step: FlowStep::Idle,
            draft: BookingDraft::new(),
            booking: None,
            payment: None,
            settlement: None,
        }
    }

    pub fn id(&self) -> Uuid {
        self.draft.id()
    }

    pub fn step(&self) -> FlowStep {
        self.step
    }

    pub fn draft(&self) -> &BookingDraft {
        &self.draft
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn booking(&self) -> Option<&PersistedBooking> {
        self.booking.as_ref()
    }

    pub fn snapshot(&self) -> FlowSnapshot {
        FlowSnapshot {
            flow_id: self.draft.id(),
            kind: self.config.kind,
            step: self.step,
            draft: self.draft.clone(),
            booking: self.booking.clone(),
            payment: self.payment.clone(),
            settlement: self.settlement.clone(),
        }
    }

    pub fn start(&mut self) -> CoreResult<FlowStep> {
        self.expect_step(&[FlowStep::Idle], FlowStep::SelectingDates)?;
        self.transition(FlowStep::SelectingDates);
        Ok(self.step)
    }

    /// Validates the dates before anything is queried, then checks
    /// availability and prices the stay. A discount already applied is
    /// re-checked against the new selection and dropped if it no longer fits.
    pub async fn select_stay(
        &mut self,
        property_id: Uuid,
        check_in: NaiveDate,
        check_out: NaiveDate,
        guests: u32,
    ) -> CoreResult<&PriceBreakdown> {
        self.expect_step(&[FlowStep::Idle, FlowStep::SelectingDates], FlowStep::SelectingDates)?;
        if self.config.kind != FlowKind::Stay {
            return Err(CoreError::validation("selection", "This flow books experiences"));
        }

        let stay = StayDates::new(check_in, check_out)?;
        if guests == 0 {
            return Err(CoreError::validation("guests", "At least one guest is required"));
        }

        self.release_previous_booking().await?;
        if !self.services.availability.check_property(property_id, &stay).await {
            return Err(CoreError::Unavailable(
                "The selected dates are not available".into(),
            ));
        }

        let selection = Selection::Stay {
            property_id,
            stay,
            guests,
        };
        let undiscounted = self.quote_for(&selection, None, self.draft.billing_state()).await?;

        let mut discount = None;
        if let Some(previous) = self.draft.discount() {
            let context = DiscountContext {
                property_id,
                stay,
                guests,
                subtotal_minor: undiscounted.discountable_subtotal(),
            };
            let revalidated = self
                .services
                .discounts
                .validate(&previous.code, &context, self.actor().as_ref(), self.now())
                .await;
            if revalidated.is_valid {
                discount = Some(revalidated);
            } else {
                info!(code = %previous.code, "Discount dropped after selection change");
            }
        }

        let quote = match &discount {
            Some(d) => {
                self.quote_for(&selection, Some(d), self.draft.billing_state())
                    .await?
            }
            None => undiscounted,
        };

        self.draft.set_selection(selection, discount, quote);
        if self.step == FlowStep::Idle {
            self.transition(FlowStep::SelectingDates);
        }
        self.current_quote()
    }

    pub async fn select_experience(
        &mut self,
        instance_id: Uuid,
        attendees: u32,
    ) -> CoreResult<&PriceBreakdown> {
        self.expect_step(&[FlowStep::Idle, FlowStep::SelectingDates], FlowStep::SelectingDates)?;
        if self.config.kind != FlowKind::Experience {
            return Err(CoreError::validation("selection", "This flow books stays"));
        }
        if attendees == 0 {
            return Err(CoreError::validation("attendees", "At least one attendee is required"));
        }

        self.release_previous_booking().await?;
        if !self
            .services
            .availability
            .check_experience(instance_id, attendees)
            .await
        {
            return Err(CoreError::Unavailable(
                "Not enough places left for this session".into(),
            ));
        }

        let selection = Selection::Experience {
            instance_id,
            attendees,
        };
        let quote = self.quote_for(&selection, None, None).await?;

        self.draft.set_selection(selection, None, quote);
        if self.step == FlowStep::Idle {
            self.transition(FlowStep::SelectingDates);
        }
        self.current_quote()
    }

    /// An invalid code is returned as such and leaves the draft untouched.
    pub async fn apply_discount(&mut self, code: &str) -> CoreResult<DiscountApplication> {
        self.expect_step(
            &[FlowStep::SelectingDates, FlowStep::GuestInfo, FlowStep::Summary],
            self.step,
        )?;
        let (property_id, stay, guests) = match self.draft.selection() {
            Some(Selection::Stay {
                property_id,
                stay,
                guests,
            }) => (*property_id, *stay, *guests),
            Some(Selection::Experience { .. }) => {
                return Err(CoreError::validation(
                    "discount_code",
                    "Discount codes apply to stays only",
                ))
            }
            None => {
                return Err(CoreError::validation("selection", "Choose your dates first"))
            }
        };
        let subtotal = self.current_quote()?.discountable_subtotal();

        let context = DiscountContext {
            property_id,
            stay,
            guests,
            subtotal_minor: subtotal,
        };
        let application = self
            .services
            .discounts
            .validate(code, &context, self.actor().as_ref(), self.now())
            .await;

        if application.is_valid {
            let selection = self.require_selection()?.clone();
            let quote = self
                .quote_for(&selection, Some(&application), self.draft.billing_state())
                .await?;
            self.draft.set_discount(Some(application.clone()), quote);
            debug!(code = %application.code, "Discount applied");
        }
        Ok(application)
    }

    pub async fn remove_discount(&mut self) -> CoreResult<&PriceBreakdown> {
        self.expect_step(
            &[FlowStep::SelectingDates, FlowStep::GuestInfo, FlowStep::Summary],
            self.step,
        )?;
        if self.draft.discount().is_some() {
            let selection = self.require_selection()?.clone();
            let quote = self
                .quote_for(&selection, None, self.draft.billing_state())
                .await?;
            self.draft.set_discount(None, quote);
        }
        self.current_quote()
    }

    pub fn continue_to_guest_info(&mut self) -> CoreResult<FlowStep> {
        self.expect_step(&[FlowStep::SelectingDates], FlowStep::GuestInfo)?;
        self.require_selection()?;
        self.current_quote()?;
        self.transition(FlowStep::GuestInfo);
        Ok(self.step)
    }

    /// Stores the guest-details form as typed. Checked on `continue_to_summary`.
    pub async fn set_guest_info(&mut self, info: GuestInfo) -> CoreResult<()> {
        self.expect_step(&[FlowStep::GuestInfo], FlowStep::GuestInfo)?;
        let selection = self.require_selection()?.clone();
        let quote = if info.billing_state.as_deref() != self.draft.billing_state() {
            self.quote_for(&selection, self.draft.discount(), info.billing_state.as_deref())
                .await?
        } else {
            self.current_quote()?.clone()
        };
        self.draft.set_guest_info(info, quote);
        Ok(())
    }

    pub fn continue_to_summary(&mut self) -> CoreResult<FlowStep> {
        self.expect_step(&[FlowStep::GuestInfo], FlowStep::Summary)?;
        let party = self.require_selection()?.party_size();
        validation::validate_party_roster(self.draft.guests(), party)?;
        let contact = self
            .draft
            .contact()
            .ok_or_else(|| CoreError::validation("contact", "Contact details are required"))?;
        validation::validate_contact(
            &contact.full_name,
            contact.email.expose(),
            contact.phone.expose(),
        )?;

        self.transition(FlowStep::Summary);
        Ok(self.step)
    }

    /// Re-checks the quote, availability and discount, then persists the
    /// draft as a pending booking. Re-entering with an unchanged draft
    /// reuses the booking created last time.
    pub async fn continue_to_payment(&mut self) -> CoreResult<PersistedBooking> {
        self.expect_step(&[FlowStep::Summary], FlowStep::Payment)?;
        let now = self.now();
        let selection = self.require_selection()?.clone();
        let ttl = self.services.pricing.config().quote_ttl_secs;

        if self.current_quote()?.is_stale(now, ttl) {
            let fresh = self
                .quote_for(&selection, self.draft.discount(), self.draft.billing_state())
                .await?;
            self.draft.refresh_quote(fresh);
            return Err(CoreError::validation(
                "quote",
                "Your price quote expired and has been refreshed, please review it and continue",
            ));
        }

        self.recheck_discount(&selection, now).await?;

        let quote_total = self.current_quote()?.total_amount_due_minor;
        if let Some(existing) = &self.booking {
            if existing.draft_revision == self.draft.revision() && existing.total_minor == quote_total
            {
                let existing = existing.clone();
                self.transition(FlowStep::Payment);
                return Ok(existing);
            }
        }
        self.release_previous_booking().await?;

        let still_available = match &selection {
            Selection::Stay {
                property_id, stay, ..
            } => self.services.availability.check_property(*property_id, stay).await,
            Selection::Experience {
                instance_id,
                attendees,
            } => {
                self.services
                    .availability
                    .check_experience(*instance_id, *attendees)
                    .await
            }
        };
        if !still_available {
            return Err(CoreError::Unavailable(
                "This selection was booked by someone else in the meantime".into(),
            ));
        }

        let created = match &self.session {
            Session::Authenticated { user_id, .. } => {
                self.services
                    .persister
                    .create_booking(user_id, &self.draft, now)
                    .await?
            }
            Session::Anonymous => {
                self.services
                    .persister
                    .create_guest_booking(&self.draft, now)
                    .await?
            }
        };

        let persisted = PersistedBooking {
            booking_id: created.booking_id,
            booking_reference: created.booking_reference,
            draft_revision: self.draft.revision(),
            total_minor: quote_total,
        };
        self.booking = Some(persisted.clone());
        self.payment = None;
        self.transition(FlowStep::Payment);
        Ok(persisted)
    }

    /// Opens (or re-opens, after a failure) a gateway session.
    pub async fn start_payment(&mut self) -> CoreResult<PaymentHandoff> {
        self.expect_step(&[FlowStep::Payment], FlowStep::Payment)?;
        let booking_id = self.require_booking()?.booking_id;
        let actor = self
            .actor()
            .ok_or_else(|| CoreError::validation("email", "Contact email is required"))?;

        let handoff = self
            .services
            .payments
            .initiate_payment(&actor, booking_id, self.now())
            .await?;
        self.payment = Some(handoff.clone());
        Ok(handoff)
    }

    /// Moves to `Confirmation` only when the gateway reports success;
    /// anything else leaves the flow on `Payment` for another attempt.
    pub async fn complete_payment(&mut self, intent_id: &str) -> CoreResult<SettlementOutcome> {
        self.expect_step(&[FlowStep::Payment], FlowStep::Confirmation)?;
        let booking_id = self.require_booking()?.booking_id;

        let outcome = self.services.payments.settle(intent_id, self.now()).await?;
        if outcome.booking_id != booking_id {
            return Err(CoreError::validation(
                "intent_id",
                "This payment does not belong to the current booking",
            ));
        }

        self.settlement = Some(outcome.clone());
        if outcome.succeeded() {
            self.transition(FlowStep::Confirmation);
        } else {
            info!(
                intent = intent_id,
                status = %outcome.payment_status,
                "Payment not completed, staying on payment step"
            );
        }
        Ok(outcome)
    }

    pub fn back(&mut self) -> CoreResult<FlowStep> {
        let previous = self.step.previous().ok_or_else(|| CoreError::InvalidTransition {
            from: self.step.to_string(),
            to: "previous step".into(),
        })?;
        self.transition(previous);
        Ok(self.step)
    }

    /// Drops the pending booking an earlier pass through `Payment` created.
    async fn release_previous_booking(&mut self) -> CoreResult<()> {
        if let Some(previous) = &self.booking {
            info!(
                reference = %previous.booking_reference,
                "Draft changed since last submission, releasing earlier booking"
            );
            self.services
                .persister
                .discard_pending(previous.booking_id)
                .await?;
            self.booking = None;
            self.payment = None;
        }
        Ok(())
    }

    async fn recheck_discount(&mut self, selection: &Selection, now: DateTime<Utc>) -> CoreResult<()> {
        let (Some(applied), Selection::Stay { property_id, stay, guests }) =
            (self.draft.discount(), selection)
        else {
            return Ok(());
        };

        let context = DiscountContext {
            property_id: *property_id,
            stay: *stay,
            guests: *guests,
            subtotal_minor: self.current_quote()?.discountable_subtotal(),
        };
        let code = applied.code.clone();
        let revalidated = self
            .services
            .discounts
            .validate(&code, &context, self.actor().as_ref(), now)
            .await;
        if revalidated.is_valid {
            return Ok(());
        }

        let quote = self
            .quote_for(selection, None, self.draft.billing_state())
            .await?;
        self.draft.set_discount(None, quote);
        Err(CoreError::validation(
            "discount_code",
            revalidated
                .reason
                .unwrap_or_else(|| format!("{} can no longer be applied", code)),
        ))
    }

    async fn quote_for(
        &self,
        selection: &Selection,
        discount: Option<&DiscountApplication>,
        billing_state: Option<&str>,
    ) -> CoreResult<PriceBreakdown> {
        match selection {
            Selection::Stay {
                property_id,
                stay,
                guests,
            } => {
                self.services
                    .pricing
                    .calculate_property_price(&StayQuoteRequest {
                        property_id: *property_id,
                        stay: *stay,
                        guests: *guests,
                        discount: discount.cloned(),
                        display_currency: self.config.display_currency.clone(),
                        billing_state: billing_state.map(str::to_string),
                    })
                    .await
            }
            Selection::Experience {
                instance_id,
                attendees,
            } => {
                self.services
                    .pricing
                    .calculate_experience_price(
                        *instance_id,
                        *attendees,
                        self.config.display_currency.as_deref(),
                    )
                    .await
            }
        }
    }

    /// Signed-in user, or the guest once a usable email has been entered.
    fn actor(&self) -> Option<Actor> {
        match &self.session {
            Session::Authenticated { user_id, email } => {
                Some(Actor::user(user_id.clone(), email.clone()))
            }
            Session::Anonymous => self
                .draft
                .contact()
                .and_then(|c| validation::validate_email(c.email.expose()).ok())
                .map(|email| Actor::guest(&email)),
        }
    }

    fn now(&self) -> DateTime<Utc> {
        (self.services.clock)()
    }

    fn current_quote(&self) -> CoreResult<&PriceBreakdown> {
        self.draft
            .quote()
            .ok_or_else(|| CoreError::validation("quote", "No price has been calculated yet"))
    }

    fn require_selection(&self) -> CoreResult<&Selection> {
        self.draft
            .selection()
            .ok_or_else(|| CoreError::validation("selection", "Choose your dates first"))
    }

    fn require_booking(&self) -> CoreResult<&PersistedBooking> {
        self.booking
            .as_ref()
            .ok_or_else(|| CoreError::validation("booking", "The booking has not been created yet"))
    }

    fn expect_step(&self, allowed: &[FlowStep], target: FlowStep) -> CoreResult<()> {
        if allowed.contains(&self.step) {
            Ok(())
        } else {
            Err(CoreError::InvalidTransition {
                from: self.step.to_string(),
                to: target.to_string(),
            })
        }
    }

    fn transition(&mut self, to: FlowStep) {
        info!(flow = %self.draft.id(), from = %self.step, to = %to, "Booking flow step");
        self.step = to;
    }
}
