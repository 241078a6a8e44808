use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use malipo_core::{AvailabilityError, DateRange, PaymentHandle};

/// Booking lifecycle state. Exactly one is active per session; payment-side
/// variants carry the range (and handle) they were entered with so a retry
/// can return to `Available` without re-entering dates.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "state", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BookingState {
    Idle,
    CheckingAvailability {
        range: DateRange,
    },
    Available {
        range: DateRange,
    },
    Unavailable {
        range: DateRange,
    },
    InitiatingPayment {
        range: DateRange,
        amount: Decimal,
    },
    Polling {
        range: DateRange,
        handle: PaymentHandle,
    },
    Succeeded {
        range: DateRange,
        handle: PaymentHandle,
    },
    Failed {
        range: DateRange,
        handle: PaymentHandle,
    },
    TimedOut {
        range: DateRange,
        handle: PaymentHandle,
    },
}

impl BookingState {
    pub fn label(&self) -> &'static str {
        match self {
            BookingState::Idle => "IDLE",
            BookingState::CheckingAvailability { .. } => "CHECKING_AVAILABILITY",
            BookingState::Available { .. } => "AVAILABLE",
            BookingState::Unavailable { .. } => "UNAVAILABLE",
            BookingState::InitiatingPayment { .. } => "INITIATING_PAYMENT",
            BookingState::Polling { .. } => "POLLING",
            BookingState::Succeeded { .. } => "SUCCEEDED",
            BookingState::Failed { .. } => "FAILED",
            BookingState::TimedOut { .. } => "TIMED_OUT",
        }
    }

    /// Terminal for the current payment attempt. `TimedOut` is terminal too,
    /// but is never conflated with `Failed`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BookingState::Succeeded { .. }
                | BookingState::Failed { .. }
                | BookingState::TimedOut { .. }
        )
    }
}

/// What the presentation layer sees: state, the quote recomputed from the
/// current dates, human-readable messages, and the tracking id for display.
#[derive(Debug, Clone, Serialize)]
pub struct BookingSnapshot {
    pub session_id: Uuid,
    pub state: BookingState,
    pub quote: Decimal,
    pub currency: String,
    pub message: Option<String>,
    pub error: Option<String>,
    pub checkout_request_id: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("select both check-in and check-out dates")]
    MissingDates,

    #[error(transparent)]
    Availability(#[from] AvailabilityError),

    #[error("phone number is required")]
    MissingPhone,

    #[error("no chargeable amount for the selected dates")]
    EmptyQuote,

    #[error("invalid state transition from {from} to {to}")]
    InvalidTransition {
        from: &'static str,
        to: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    #[test]
    fn test_state_tags() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
        )
        .unwrap();

        let state = BookingState::CheckingAvailability { range };
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["state"], "CHECKING_AVAILABILITY");
        assert_eq!(state.label(), "CHECKING_AVAILABILITY");
        assert!(!state.is_terminal());
    }

    #[test]
    fn test_terminal_states() {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
        )
        .unwrap();
        let handle = PaymentHandle {
            checkout_request_id: "ws_CO_1".to_string(),
            payment_id: "1".to_string(),
        };

        assert!(BookingState::Succeeded {
            range,
            handle: handle.clone()
        }
        .is_terminal());
        assert!(BookingState::TimedOut { range, handle }.is_terminal());
        assert!(!BookingState::Idle.is_terminal());
    }
}
