use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Rental unit reference data. Read-only to the booking pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Property {
    pub id: Uuid,
    pub name: String,
    pub base_price_minor: i64,
    pub currency: String,
    pub cleaning_fee_minor: i64,
    pub max_guests: u32,
    pub amenities: Vec<String>,
    /// State the property is registered in; drives the CGST/SGST vs IGST split.
    pub state: Option<String>,
    pub is_active: bool,
}

/// One scheduled run of an experience.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperienceInstance {
    pub id: Uuid,
    pub experience_id: Uuid,
    pub title: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub max_capacity: u32,
    pub current_attendees: u32,
    pub price_per_person_minor: Option<i64>,
    /// Takes precedence over per-person pricing when both are set.
    pub flat_fee_minor: Option<i64>,
    pub currency: String,
}

impl ExperienceInstance {
    pub fn remaining_capacity(&self) -> u32 {
        self.max_capacity.saturating_sub(self.current_attendees)
    }

    pub fn has_room_for(&self, attendees: u32) -> bool {
        self.current_attendees as u64 + attendees as u64 <= self.max_capacity as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccupancySource {
    Booking,
    HostBlock,
}

/// Nights `[start, end)` that are not bookable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OccupiedRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
    pub source: OccupancySource,
}

impl OccupiedRange {
    pub fn covers(&self, night: NaiveDate) -> bool {
        self.start <= night && night < self.end
    }
}
