use chrono::{DateTime, Duration, Utc};
use haven_core::models::{DiscountApplication, ExperienceInstance, Property, StayDates};
use haven_core::repository::{ExchangeRateSource, ExperienceRepository, PropertyRepository};
use haven_core::{system_clock, Clock, CoreError, CoreResult};
use haven_shared::money::{apply_basis_points, convert, Minor, BASIS_POINTS_PER_UNIT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompetitorMarkup {
    pub name: String,
    /// How much more the competitor charges, in basis points of our undiscounted total.
    pub markup_bp: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingConfig {
    /// Flat GST rate (1800 = 18%).
    pub tax_rate_bp: i64,
    /// Guests covered by the nightly rate.
    pub included_guests: u32,
    /// Per extra guest, per booking, in the property's currency.
    pub extra_guest_fee_minor: Minor,
    /// How long a quote may back a submission.
    pub quote_ttl_secs: i64,
    #[serde(default)]
    pub competitor_markups: Vec<CompetitorMarkup>,
}

impl Default for PricingConfig {
    fn default() -> Self {
        Self {
            tax_rate_bp: 1800,
            included_guests: 2,
            extra_guest_fee_minor: 50_000,
            quote_ttl_secs: 900,
            competitor_markups: Vec::new(),
        }
    }
}

/// Presentational split of the tax line. Always sums to `tax_amount_minor`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum GstBreakdown {
    IntraState { cgst_minor: Minor, sgst_minor: Minor },
    InterState { igst_minor: Minor },
}

impl GstBreakdown {
    fn split(tax: Minor, intra_state: bool) -> Self {
        if intra_state {
            let cgst = tax / 2;
            GstBreakdown::IntraState {
                cgst_minor: cgst,
                sgst_minor: tax - cgst,
            }
        } else {
            GstBreakdown::InterState { igst_minor: tax }
        }
    }

    pub fn total(&self) -> Minor {
        match self {
            GstBreakdown::IntraState {
                cgst_minor,
                sgst_minor,
            } => cgst_minor + sgst_minor,
            GstBreakdown::InterState { igst_minor } => *igst_minor,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorRate {
    pub name: String,
    pub total_minor: Minor,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompetitorComparison {
    pub rates: Vec<CompetitorRate>,
    pub savings_minor: Minor,
}

/// The breakdown converted for on-screen display only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DisplayAmounts {
    pub currency: String,
    pub rate: f64,
    pub base_price_minor: Minor,
    pub additional_guest_charge_minor: Minor,
    pub discount_amount_minor: Minor,
    pub subtotal_after_discount_minor: Minor,
    pub tax_amount_minor: Minor,
    pub cleaning_fee_minor: Minor,
    pub total_amount_due_minor: Minor,
}

/// A full quote. Settlement fields are always in `currency`, the property's
/// native currency; `display` carries the converted copy when requested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceBreakdown {
    pub nights: Option<u32>,
    pub party_size: u32,
    pub unit_price_minor: Minor,
    pub base_price_minor: Minor,
    pub additional_guest_charge_minor: Minor,
    pub discount_code: Option<String>,
    pub discount_amount_minor: Minor,
    pub subtotal_after_discount_minor: Minor,
    pub tax_amount_minor: Minor,
    pub gst: Option<GstBreakdown>,
    pub cleaning_fee_minor: Minor,
    pub total_amount_due_minor: Minor,
    pub currency: String,
    pub display: Option<DisplayAmounts>,
    pub competitor: Option<CompetitorComparison>,
    pub quoted_at: DateTime<Utc>,
}

impl PriceBreakdown {
    pub fn discountable_subtotal(&self) -> Minor {
        self.base_price_minor + self.additional_guest_charge_minor
    }

    pub fn is_stale(&self, now: DateTime<Utc>, ttl_secs: i64) -> bool {
        now - self.quoted_at > Duration::seconds(ttl_secs)
    }

    fn with_display(mut self, currency: &str, rate: f64) -> Self {
        self.display = Some(DisplayAmounts {
            currency: currency.to_string(),
            rate,
            base_price_minor: convert(self.base_price_minor, rate),
            additional_guest_charge_minor: convert(self.additional_guest_charge_minor, rate),
            discount_amount_minor: convert(self.discount_amount_minor, rate),
            subtotal_after_discount_minor: convert(self.subtotal_after_discount_minor, rate),
            tax_amount_minor: convert(self.tax_amount_minor, rate),
            cleaning_fee_minor: convert(self.cleaning_fee_minor, rate),
            total_amount_due_minor: convert(self.total_amount_due_minor, rate),
        });
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StayQuoteRequest {
    pub property_id: Uuid,
    pub stay: StayDates,
    pub guests: u32,
    pub discount: Option<DiscountApplication>,
    pub display_currency: Option<String>,
    /// Guest's billing state; a different state from the property's means IGST.
    pub billing_state: Option<String>,
}

/// Prices a stay. Pure; the caller has already fetched the property.
pub fn price_stay(
    property: &Property,
    stay: &StayDates,
    guests: u32,
    discount: Option<&DiscountApplication>,
    billing_state: Option<&str>,
    config: &PricingConfig,
    now: DateTime<Utc>,
) -> CoreResult<PriceBreakdown> {
    if !property.is_active {
        return Err(CoreError::Unavailable(format!(
            "{} is not accepting bookings",
            property.name
        )));
    }
    if guests == 0 {
        return Err(CoreError::validation("guests", "At least one guest is required"));
    }
    if guests > property.max_guests {
        return Err(CoreError::validation(
            "guests",
            format!("{} accommodates at most {} guests", property.name, property.max_guests),
        ));
    }

    let nights = stay.nights();
    let base = property.base_price_minor * nights as Minor;
    let extra_guests = guests.saturating_sub(config.included_guests) as Minor;
    let additional = extra_guests * config.extra_guest_fee_minor;

    let intra_state = match (property.state.as_deref(), billing_state) {
        (Some(home), Some(billing)) => home.trim().eq_ignore_ascii_case(billing.trim()),
        _ => true,
    };

    let mut breakdown = assemble(
        base,
        additional,
        discount,
        property.cleaning_fee_minor,
        &property.currency,
        intra_state,
        config,
        now,
    );
    breakdown.nights = Some(nights);
    breakdown.party_size = guests;
    breakdown.unit_price_minor = property.base_price_minor;
    Ok(breakdown)
}

/// Prices an experience run. A flat fee wins over per-person pricing.
pub fn price_experience(
    instance: &ExperienceInstance,
    attendees: u32,
    config: &PricingConfig,
    now: DateTime<Utc>,
) -> CoreResult<PriceBreakdown> {
    if attendees == 0 {
        return Err(CoreError::validation("attendees", "At least one attendee is required"));
    }

    let (unit, base) = match (instance.flat_fee_minor, instance.price_per_person_minor) {
        (Some(flat), _) => (flat, flat),
        (None, Some(per_person)) => (per_person, per_person * attendees as Minor),
        (None, None) => {
            return Err(CoreError::Unavailable(format!(
                "{} has no price configured",
                instance.title
            )))
        }
    };

    let mut breakdown = assemble(base, 0, None, 0, &instance.currency, true, config, now);
    breakdown.party_size = attendees;
    breakdown.unit_price_minor = unit;
    Ok(breakdown)
}

#[allow(clippy::too_many_arguments)]
fn assemble(
    base: Minor,
    additional: Minor,
    discount: Option<&DiscountApplication>,
    cleaning_fee: Minor,
    currency: &str,
    intra_state: bool,
    config: &PricingConfig,
    now: DateTime<Utc>,
) -> PriceBreakdown {
    let discountable = base + additional;
    let applied = discount.filter(|d| d.is_valid);
    let discount_amount = applied
        .map(|d| d.discount_amount_minor)
        .unwrap_or(0)
        .clamp(0, discountable);

    let subtotal = discountable - discount_amount;
    let tax = apply_basis_points(subtotal, config.tax_rate_bp);
    let total = subtotal + tax + cleaning_fee;

    let competitor = if config.competitor_markups.is_empty() {
        None
    } else {
        let undiscounted = discountable
            + apply_basis_points(discountable, config.tax_rate_bp)
            + cleaning_fee;
        let rates: Vec<CompetitorRate> = config
            .competitor_markups
            .iter()
            .map(|m| CompetitorRate {
                name: m.name.clone(),
                total_minor: apply_basis_points(undiscounted, BASIS_POINTS_PER_UNIT + m.markup_bp),
            })
            .collect();
        let highest = rates.iter().map(|r| r.total_minor).max().unwrap_or(total);
        Some(CompetitorComparison {
            rates,
            savings_minor: (highest - total).max(0),
        })
    };

    PriceBreakdown {
        nights: None,
        party_size: 0,
        unit_price_minor: 0,
        base_price_minor: base,
        additional_guest_charge_minor: additional,
        discount_code: applied.map(|d| d.code.clone()),
        discount_amount_minor: discount_amount,
        subtotal_after_discount_minor: subtotal,
        tax_amount_minor: tax,
        gst: Some(GstBreakdown::split(tax, intra_state)),
        cleaning_fee_minor: cleaning_fee,
        total_amount_due_minor: total,
        currency: currency.to_string(),
        display: None,
        competitor,
        quoted_at: now,
    }
}

/// Loads reference data and prices stays and experiences.
pub struct PriceCalculator {
    properties: Arc<dyn PropertyRepository>,
    experiences: Arc<dyn ExperienceRepository>,
    rates: Arc<dyn ExchangeRateSource>,
    config: PricingConfig,
    clock: Clock,
}

impl PriceCalculator {
    pub fn new(
        properties: Arc<dyn PropertyRepository>,
        experiences: Arc<dyn ExperienceRepository>,
        rates: Arc<dyn ExchangeRateSource>,
        config: PricingConfig,
    ) -> Self {
        Self {
            properties,
            experiences,
            rates,
            config,
            clock: system_clock(),
        }
    }

    /// Quotes are stamped with this clock's time.
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &PricingConfig {
        &self.config
    }

    pub async fn load_property(&self, property_id: Uuid) -> CoreResult<Property> {
        self.properties
            .get_property(property_id)
            .await
            .map_err(|e| CoreError::external("Property lookup failed", e))?
            .ok_or_else(|| CoreError::NotFound(format!("property {}", property_id)))
    }

    pub async fn load_instance(&self, instance_id: Uuid) -> CoreResult<ExperienceInstance> {
        self.experiences
            .get_instance(instance_id)
            .await
            .map_err(|e| CoreError::external("Experience lookup failed", e))?
            .ok_or_else(|| CoreError::NotFound(format!("experience instance {}", instance_id)))
    }

    pub async fn calculate_property_price(
        &self,
        request: &StayQuoteRequest,
    ) -> CoreResult<PriceBreakdown> {
        let property = self.load_property(request.property_id).await?;
        let breakdown = price_stay(
            &property,
            &request.stay,
            request.guests,
            request.discount.as_ref(),
            request.billing_state.as_deref(),
            &self.config,
            (self.clock)(),
        )?;
        self.for_display(breakdown, request.display_currency.as_deref())
            .await
    }

    pub async fn calculate_experience_price(
        &self,
        instance_id: Uuid,
        attendees: u32,
        display_currency: Option<&str>,
    ) -> CoreResult<PriceBreakdown> {
        let instance = self.load_instance(instance_id).await?;
        let breakdown = price_experience(&instance, attendees, &self.config, (self.clock)())?;
        self.for_display(breakdown, display_currency).await
    }

    async fn for_display(
        &self,
        breakdown: PriceBreakdown,
        display_currency: Option<&str>,
    ) -> CoreResult<PriceBreakdown> {
        let target = match display_currency {
            Some(c) if !c.eq_ignore_ascii_case(&breakdown.currency) => c.to_uppercase(),
            _ => return Ok(breakdown),
        };

        let rate = self
            .rates
            .rate(&breakdown.currency, &target)
            .await
            .map_err(|e| CoreError::external("Exchange rate lookup failed", e))?
            .ok_or_else(|| {
                CoreError::validation(
                    "display_currency",
                    format!("{} is not a supported display currency", target),
                )
            })?;

        Ok(breakdown.with_display(&target, rate))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::{date, trek, villa};
    use haven_core::memory::InMemoryStore;

    fn stay(nights: i64) -> StayDates {
        let check_in = date("2026-12-01");
        StayDates::new(check_in, check_in + Duration::days(nights)).unwrap()
    }

    fn signup5(amount: Minor) -> DiscountApplication {
        DiscountApplication {
            code: "SIGNUP5".to_string(),
            is_valid: true,
            discount_amount_minor: amount,
            percentage: Some(5.0),
            flat_amount_minor: None,
            reason: None,
        }
    }

    fn assert_invariants(b: &PriceBreakdown) {
        assert_eq!(
            b.total_amount_due_minor,
            b.subtotal_after_discount_minor + b.tax_amount_minor + b.cleaning_fee_minor
        );
        assert_eq!(
            b.subtotal_after_discount_minor,
            b.base_price_minor + b.additional_guest_charge_minor - b.discount_amount_minor
        );
        assert_eq!(
            b.tax_amount_minor,
            apply_basis_points(b.subtotal_after_discount_minor, 1800)
        );
        assert_eq!(b.gst.as_ref().unwrap().total(), b.tax_amount_minor);
    }

    #[test]
    fn test_three_nights_three_guests() {
        let b = price_stay(&villa(), &stay(3), 3, None, None, &PricingConfig::default(), Utc::now())
            .unwrap();

        assert_eq!(b.base_price_minor, 900_000);
        assert_eq!(b.additional_guest_charge_minor, 50_000);
        assert_eq!(b.subtotal_after_discount_minor, 950_000);
        assert_eq!(b.tax_amount_minor, 171_000);
        assert_eq!(
            b.gst,
            Some(GstBreakdown::IntraState {
                cgst_minor: 85_500,
                sgst_minor: 85_500
            })
        );
        assert_eq!(b.total_amount_due_minor, 1_121_000);
        assert_invariants(&b);
    }

    #[test]
    fn test_signup_discount_scenario() {
        let b = price_stay(
            &villa(),
            &stay(3),
            3,
            Some(&signup5(47_500)),
            None,
            &PricingConfig::default(),
            Utc::now(),
        )
        .unwrap();

        assert_eq!(b.discount_amount_minor, 47_500);
        assert_eq!(b.subtotal_after_discount_minor, 902_500);
        assert_eq!(b.tax_amount_minor, 162_450);
        assert_eq!(b.total_amount_due_minor, 1_064_950);
        assert_eq!(b.discount_code.as_deref(), Some("SIGNUP5"));
        assert_invariants(&b);
    }

    #[test]
    fn test_cleaning_fee_is_added_after_tax() {
        let mut property = villa();
        property.cleaning_fee_minor = 75_000;
        let b = price_stay(&property, &stay(2), 2, None, None, &PricingConfig::default(), Utc::now())
            .unwrap();
        assert_eq!(b.tax_amount_minor, apply_basis_points(600_000, 1800));
        assert_eq!(b.total_amount_due_minor, 600_000 + 108_000 + 75_000);
        assert_invariants(&b);
    }

    #[test]
    fn test_extra_guest_threshold() {
        let config = PricingConfig::default();
        for guests in 1..=2 {
            let b = price_stay(&villa(), &stay(1), guests, None, None, &config, Utc::now()).unwrap();
            assert_eq!(b.additional_guest_charge_minor, 0);
        }
        let b = price_stay(&villa(), &stay(1), 5, None, None, &config, Utc::now()).unwrap();
        assert_eq!(b.additional_guest_charge_minor, 3 * 50_000);
    }

    #[test]
    fn test_invariants_hold_across_inputs() {
        let config = PricingConfig::default();
        let mut property = villa();
        property.cleaning_fee_minor = 33_333;
        for nights in 1..=14 {
            for guests in 1..=6 {
                for discount in [0, 1, 12_345, 10_000_000] {
                    let d = signup5(discount);
                    let b = price_stay(&property, &stay(nights), guests, Some(&d), None, &config, Utc::now())
                        .unwrap();
                    assert!(b.discount_amount_minor <= b.discountable_subtotal());
                    assert_invariants(&b);
                }
            }
        }
    }

    #[test]
    fn test_apply_then_remove_discount_restores_quote() {
        let now = Utc::now();
        let config = PricingConfig::default();
        let plain = price_stay(&villa(), &stay(3), 3, None, None, &config, now).unwrap();
        let discounted =
            price_stay(&villa(), &stay(3), 3, Some(&signup5(47_500)), None, &config, now).unwrap();
        let removed = price_stay(&villa(), &stay(3), 3, None, None, &config, now).unwrap();

        assert_ne!(plain, discounted);
        assert_eq!(plain, removed);
    }

    #[test]
    fn test_invalid_discount_is_ignored() {
        let mut rejected = signup5(47_500);
        rejected.is_valid = false;
        let b = price_stay(&villa(), &stay(3), 3, Some(&rejected), None, &PricingConfig::default(), Utc::now())
            .unwrap();
        assert_eq!(b.discount_amount_minor, 0);
        assert_eq!(b.discount_code, None);
    }

    #[test]
    fn test_interstate_uses_igst() {
        let b = price_stay(
            &villa(),
            &stay(3),
            3,
            None,
            Some("Maharashtra"),
            &PricingConfig::default(),
            Utc::now(),
        )
        .unwrap();
        assert_eq!(b.gst, Some(GstBreakdown::InterState { igst_minor: 171_000 }));
    }

    #[test]
    fn test_guest_limits() {
        let config = PricingConfig::default();
        let zero = price_stay(&villa(), &stay(1), 0, None, None, &config, Utc::now()).unwrap_err();
        assert_eq!(zero.field(), Some("guests"));
        let too_many = price_stay(&villa(), &stay(1), 7, None, None, &config, Utc::now()).unwrap_err();
        assert_eq!(too_many.field(), Some("guests"));
    }

    #[test]
    fn test_competitor_savings() {
        let config = PricingConfig {
            competitor_markups: vec![
                CompetitorMarkup { name: "ListingSiteA".to_string(), markup_bp: 1500 },
                CompetitorMarkup { name: "ListingSiteB".to_string(), markup_bp: 1000 },
            ],
            ..PricingConfig::default()
        };
        let b = price_stay(&villa(), &stay(3), 3, None, None, &config, Utc::now()).unwrap();
        let comparison = b.competitor.unwrap();
        assert_eq!(comparison.rates[0].total_minor, 1_289_150);
        assert_eq!(comparison.savings_minor, 1_289_150 - 1_121_000);
    }

    #[test]
    fn test_experience_flat_fee_precedence() {
        let config = PricingConfig::default();
        let mut instance = trek(10, 0);
        let per_person = price_experience(&instance, 3, &config, Utc::now()).unwrap();
        assert_eq!(per_person.base_price_minor, 360_000);

        instance.flat_fee_minor = Some(250_000);
        let flat = price_experience(&instance, 3, &config, Utc::now()).unwrap();
        assert_eq!(flat.base_price_minor, 250_000);
        assert_invariants(&flat);

        assert!(price_experience(&instance, 0, &config, Utc::now()).is_err());
    }

    #[test]
    fn test_staleness() {
        let quoted = Utc::now();
        let b = price_stay(&villa(), &stay(1), 1, None, None, &PricingConfig::default(), quoted).unwrap();
        assert!(!b.is_stale(quoted + Duration::seconds(899), 900));
        assert!(b.is_stale(quoted + Duration::seconds(901), 900));
    }

    fn calculator(store: &Arc<InMemoryStore>) -> PriceCalculator {
        PriceCalculator::new(store.clone(), store.clone(), store.clone(), PricingConfig::default())
    }

    #[tokio::test]
    async fn test_display_conversion_keeps_settlement_amounts() {
        let store = Arc::new(InMemoryStore::new());
        let property = villa();
        store.add_property(property.clone()).await;
        store.set_rate("INR", "USD", 0.012).await;

        let b = calculator(&store)
            .calculate_property_price(&StayQuoteRequest {
                property_id: property.id,
                stay: stay(3),
                guests: 3,
                discount: None,
                display_currency: Some("usd".to_string()),
                billing_state: None,
            })
            .await
            .unwrap();

        assert_eq!(b.currency, "INR");
        assert_eq!(b.total_amount_due_minor, 1_121_000);
        let display = b.display.unwrap();
        assert_eq!(display.currency, "USD");
        assert_eq!(display.total_amount_due_minor, 13_452);
        assert_eq!(display.base_price_minor, 10_800);
    }

    #[tokio::test]
    async fn test_unknown_property_and_currency() {
        let store = Arc::new(InMemoryStore::new());
        let property = villa();
        store.add_property(property.clone()).await;
        let calc = calculator(&store);

        let missing = calc
            .calculate_property_price(&StayQuoteRequest {
                property_id: Uuid::new_v4(),
                stay: stay(1),
                guests: 1,
                discount: None,
                display_currency: None,
                billing_state: None,
            })
            .await;
        assert!(matches!(missing, Err(CoreError::NotFound(_))));

        let unsupported = calc
            .calculate_property_price(&StayQuoteRequest {
                property_id: property.id,
                stay: stay(1),
                guests: 1,
                discount: None,
                display_currency: Some("XYZ".to_string()),
                billing_state: None,
            })
            .await
            .unwrap_err();
        assert_eq!(unsupported.field(), Some("display_currency"));
    }
}
