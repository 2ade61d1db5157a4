use chrono::NaiveDate;
use haven_core::models::StayDates;
use haven_core::repository::{AvailabilityRepository, ExperienceRepository};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, warn};
use uuid::Uuid;

/// Longest calendar window returned by a single detailed lookup.
const MAX_CALENDAR_DAYS: usize = 366;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DayAvailability {
    pub date: NaiveDate,
    pub is_available: bool,
}

/// Answers "can this be booked?" from reservations and host blocks.
///
/// Booking-path checks fail closed. The calendar view fails open so an
/// outage does not grey out every day in the picker.
pub struct AvailabilityChecker {
    availability: Arc<dyn AvailabilityRepository>,
    experiences: Arc<dyn ExperienceRepository>,
}

impl AvailabilityChecker {
    pub fn new(
        availability: Arc<dyn AvailabilityRepository>,
        experiences: Arc<dyn ExperienceRepository>,
    ) -> Self {
        Self {
            availability,
            experiences,
        }
    }

    pub async fn check_property(&self, property_id: Uuid, stay: &StayDates) -> bool {
        match self
            .availability
            .occupied_ranges(property_id, stay.check_in(), stay.check_out())
            .await
        {
            Ok(ranges) => {
                let conflict = ranges.iter().any(|r| stay.overlaps(r.start, r.end));
                if conflict {
                    debug!(
                        "Property {} unavailable {} -> {}",
                        property_id,
                        stay.check_in(),
                        stay.check_out()
                    );
                }
                !conflict
            }
            Err(e) => {
                warn!(
                    "Availability lookup failed for property {}, reporting unavailable: {}",
                    property_id, e
                );
                false
            }
        }
    }

    /// Per-night availability for `[start, end)`.
    pub async fn check_property_detailed(
        &self,
        property_id: Uuid,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Vec<DayAvailability> {
        if end <= start {
            return Vec::new();
        }

        let days = start
            .iter_days()
            .take_while(|d| *d < end)
            .take(MAX_CALENDAR_DAYS);

        match self.availability.occupied_ranges(property_id, start, end).await {
            Ok(ranges) => days
                .map(|date| DayAvailability {
                    date,
                    is_available: !ranges.iter().any(|r| r.covers(date)),
                })
                .collect(),
            Err(e) => {
                warn!(
                    "Calendar lookup failed for property {}, leaving days selectable: {}",
                    property_id, e
                );
                days.map(|date| DayAvailability {
                    date,
                    is_available: true,
                })
                .collect()
            }
        }
    }

    pub async fn check_experience(&self, instance_id: Uuid, attendees: u32) -> bool {
        if attendees == 0 {
            return false;
        }

        match self.experiences.get_instance(instance_id).await {
            Ok(Some(instance)) => instance.has_room_for(attendees),
            Ok(None) => {
                debug!("Experience instance {} not found", instance_id);
                false
            }
            Err(e) => {
                warn!(
                    "Capacity lookup failed for experience instance {}, reporting unavailable: {}",
                    instance_id, e
                );
                false
            }
        }
    }
}
