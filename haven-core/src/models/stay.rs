use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// A validated check-in/check-out pair. Check-out is exclusive, so a value
/// of this type always covers at least one night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawStayDates")]
pub struct StayDates {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

#[derive(Deserialize)]
struct RawStayDates {
    check_in: NaiveDate,
    check_out: NaiveDate,
}

impl TryFrom<RawStayDates> for StayDates {
    type Error = CoreError;

    fn try_from(raw: RawStayDates) -> Result<Self, Self::Error> {
        StayDates::new(raw.check_in, raw.check_out)
    }
}

impl StayDates {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> CoreResult<Self> {
        if check_out == check_in {
            return Err(CoreError::validation(
                "check_out",
                "Check-out date must be at least one night after check-in",
            ));
        }
        if check_out < check_in {
            return Err(CoreError::validation(
                "check_out",
                "Check-out date must be after check-in date",
            ));
        }
        Ok(Self { check_in, check_out })
    }

    pub fn check_in(&self) -> NaiveDate {
        self.check_in
    }

    pub fn check_out(&self) -> NaiveDate {
        self.check_out
    }

    pub fn nights(&self) -> u32 {
        (self.check_out - self.check_in).num_days() as u32
    }

    /// Half-open overlap: a stay ending on a day does not collide with one starting on it.
    pub fn overlaps(&self, start: NaiveDate, end: NaiveDate) -> bool {
        start < self.check_out && self.check_in < end
    }

    /// Every night of the stay.
    pub fn nights_iter(&self) -> impl Iterator<Item = NaiveDate> {
        let check_out = self.check_out;
        self.check_in.iter_days().take_while(move |d| *d < check_out)
    }
}
