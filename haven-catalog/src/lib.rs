pub mod availability;
pub mod currency;
pub mod pricing;

pub use availability::{AvailabilityChecker, DayAvailability};
pub use currency::StaticRates;
pub use pricing::{
    CompetitorComparison, CompetitorMarkup, DisplayAmounts, GstBreakdown, PriceBreakdown,
    PriceCalculator, PricingConfig, StayQuoteRequest,
};

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{NaiveDate, NaiveTime};
    use haven_core::models::{ExperienceInstance, Property};
    use uuid::Uuid;

    pub fn date(s: &str) -> NaiveDate {
        NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
    }

    pub fn villa() -> Property {
        Property {
            id: Uuid::new_v4(),
            name: "Hillside Villa".to_string(),
            base_price_minor: 300_000,
            currency: "INR".to_string(),
            cleaning_fee_minor: 0,
            max_guests: 6,
            amenities: vec!["wifi".to_string(), "pool".to_string()],
            state: Some("Karnataka".to_string()),
            is_active: true,
        }
    }

    pub fn trek(max_capacity: u32, current_attendees: u32) -> ExperienceInstance {
        ExperienceInstance {
            id: Uuid::new_v4(),
            experience_id: Uuid::new_v4(),
            title: "Sunrise coffee trail".to_string(),
            date: date("2026-12-10"),
            start_time: NaiveTime::from_hms_opt(6, 30, 0).unwrap(),
            max_capacity,
            current_attendees,
            price_per_person_minor: Some(120_000),
            flat_fee_minor: None,
            currency: "INR".to_string(),
        }
    }
}
