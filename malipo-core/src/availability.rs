use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::booking::DateRange;

/// Outcome of an availability check. Only meaningful for the exact range it
/// was computed against; a range change invalidates it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AvailabilityResult {
    pub available: bool,
    pub for_range: DateRange,
}

#[derive(Debug, thiserror::Error)]
pub enum AvailabilityError {
    #[error("check-out {check_out} must be after check-in {check_in}")]
    InvalidRange {
        check_in: NaiveDate,
        check_out: NaiveDate,
    },

    #[error("availability service unavailable: {0}")]
    ServiceUnavailable(String),
}

/// Read-only availability check against the remote booking API.
#[async_trait]
pub trait AvailabilityApi: Send + Sync {
    /// Check whether a room is free for the given range. No side effects.
    async fn check_availability(
        &self,
        product_id: i64,
        range: &DateRange,
    ) -> Result<AvailabilityResult, AvailabilityError>;
}
