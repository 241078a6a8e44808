use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::availability::AvailabilityError;

/// A check-in/check-out pair. Only constructible with `check_out > check_in`,
/// so every range in the system is chargeable for at least one night.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub check_in: NaiveDate,
    pub check_out: NaiveDate,
}

impl DateRange {
    pub fn new(check_in: NaiveDate, check_out: NaiveDate) -> Result<Self, AvailabilityError> {
        if check_out <= check_in {
            return Err(AvailabilityError::InvalidRange {
                check_in,
                check_out,
            });
        }

        Ok(Self {
            check_in,
            check_out,
        })
    }

    /// Whole nights covered by the range, never less than one.
    pub fn nights(&self) -> i64 {
        (self.check_out - self.check_in).num_days().max(1)
    }
}
