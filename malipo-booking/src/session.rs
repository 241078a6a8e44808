use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use tracing::{debug, info};
use uuid::Uuid;

use malipo_catalog::{compute_quote, Product};
use malipo_core::{
    AvailabilityError, AvailabilityResult, DateRange, PaymentError, PaymentHandle, PaymentRequest,
    StkStatus,
};

use crate::models::{BookingSnapshot, BookingState, SessionError};

/// The booking state machine. Pure and synchronous: remote calls happen
/// outside, and their results come back through the `apply_*` methods.
///
/// Every superseding user action (date edit, new check, new payment attempt,
/// reset) bumps the generation counter. An `apply_*` call whose snapshot
/// generation no longer matches is dropped without touching state, which is
/// what cancels in-flight work: last action wins, stale results never land.
pub struct BookingSession {
    id: Uuid,
    product: Product,
    check_in: Option<NaiveDate>,
    check_out: Option<NaiveDate>,
    phone_number: String,
    state: BookingState,
    generation: u64,
    polls_applied: u32,
    last_message: Option<String>,
    last_error: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl BookingSession {
    pub fn new(product: Product) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            product,
            check_in: None,
            check_out: None,
            phone_number: String::new(),
            state: BookingState::Idle,
            generation: 0,
            polls_applied: 0,
            last_message: None,
            last_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn product(&self) -> &Product {
        &self.product
    }

    pub fn state(&self) -> &BookingState {
        &self.state
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn phone_number(&self) -> &str {
        &self.phone_number
    }

    pub fn last_message(&self) -> Option<&str> {
        self.last_message.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Status observations applied to this session so far.
    pub fn polls_applied(&self) -> u32 {
        self.polls_applied
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Quote for the currently selected dates, recomputed on every call.
    pub fn quote(&self) -> Decimal {
        compute_quote(self.product.price_per_night, self.check_in, self.check_out)
    }

    pub fn checkout_request_id(&self) -> Option<String> {
        match &self.state {
            BookingState::Polling { handle, .. }
            | BookingState::Succeeded { handle, .. }
            | BookingState::Failed { handle, .. }
            | BookingState::TimedOut { handle, .. } => Some(handle.checkout_request_id.clone()),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> BookingSnapshot {
        BookingSnapshot {
            session_id: self.id,
            state: self.state.clone(),
            quote: self.quote(),
            currency: self.product.currency.clone(),
            message: self.last_message.clone(),
            error: self.last_error.clone(),
            checkout_request_id: self.checkout_request_id(),
        }
    }

    /// Change the selected dates. Any change supersedes in-flight work and
    /// invalidates previous availability: the session drops back to `Idle`
    /// and payment stays blocked until a fresh check has run.
    pub fn set_dates(&mut self, check_in: Option<NaiveDate>, check_out: Option<NaiveDate>) {
        if (check_in, check_out) == (self.check_in, self.check_out) {
            return;
        }

        self.check_in = check_in;
        self.check_out = check_out;
        self.generation += 1;
        self.state = BookingState::Idle;
        self.last_message = None;
        self.last_error = None;
        self.touch();
    }

    /// Phone edits never supersede network work; only submission reads them.
    pub fn set_phone_number(&mut self, phone: &str) {
        self.phone_number = phone.trim().to_string();
        self.touch();
    }

    /// Start an availability check for the selected dates. Allowed from any
    /// state: a new user-triggered check supersedes whatever was in flight.
    /// Fails locally (no network) on a missing or non-increasing range.
    pub fn begin_availability_check(&mut self) -> Result<(u64, i64, DateRange), SessionError> {
        let (check_in, check_out) = match (self.check_in, self.check_out) {
            (Some(check_in), Some(check_out)) => (check_in, check_out),
            _ => return Err(self.fail(SessionError::MissingDates)),
        };

        let range = match DateRange::new(check_in, check_out) {
            Ok(range) => range,
            Err(err) => return Err(self.fail(SessionError::from(err))),
        };

        self.generation += 1;
        self.last_message = None;
        self.last_error = None;
        self.state = BookingState::CheckingAvailability { range };
        self.touch();

        Ok((self.generation, self.product.id, range))
    }

    /// Apply an availability outcome. Returns false when the result is stale
    /// (superseded generation) or arrives in an unexpected state.
    pub fn apply_availability(
        &mut self,
        generation: u64,
        result: Result<AvailabilityResult, AvailabilityError>,
    ) -> bool {
        if generation != self.generation {
            debug!(
                session = %self.id,
                stale = generation,
                current = self.generation,
                "dropping stale availability result"
            );
            return false;
        }

        let range = match self.state {
            BookingState::CheckingAvailability { range } => range,
            _ => return false,
        };

        match result {
            Ok(outcome) => {
                if outcome.for_range != range {
                    return false;
                }

                if outcome.available {
                    self.state = BookingState::Available { range };
                    self.last_message = Some("Room is available.".to_string());
                } else {
                    self.state = BookingState::Unavailable { range };
                    self.last_message =
                        Some("Room is not available for the selected dates.".to_string());
                }
            }
            Err(err) => {
                self.state = BookingState::Idle;
                self.last_error = Some(err.to_string());
            }
        }

        self.touch();
        true
    }

    /// Start a payment attempt. Only valid from `Available`; the amount is
    /// recomputed from the current dates here, never taken from a cache.
    pub fn begin_payment(&mut self) -> Result<(u64, PaymentRequest), SessionError> {
        let range = match &self.state {
            BookingState::Available { range } => *range,
            other => {
                let from = other.label();
                return Err(self.fail(SessionError::InvalidTransition {
                    from,
                    to: "INITIATING_PAYMENT",
                }));
            }
        };

        if self.phone_number.is_empty() {
            return Err(self.fail(SessionError::MissingPhone));
        }

        let amount = self.quote();
        if amount <= Decimal::ZERO {
            return Err(self.fail(SessionError::EmptyQuote));
        }

        let request = PaymentRequest {
            phone_number: self.phone_number.clone(),
            product_id: self.product.id,
            hotel_slug: self.product.hotel_slug.clone(),
            range,
            amount,
            currency: self.product.currency.clone(),
        };

        self.generation += 1;
        self.last_message = None;
        self.last_error = None;
        self.state = BookingState::InitiatingPayment { range, amount };
        self.touch();

        Ok((self.generation, request))
    }

    /// Apply the initiation outcome. On success returns the handle so the
    /// caller can start polling; on rejection the session returns to
    /// `Available` with the gateway's message surfaced, retry permitted.
    pub fn apply_initiation(
        &mut self,
        generation: u64,
        result: Result<PaymentHandle, PaymentError>,
    ) -> Option<PaymentHandle> {
        if generation != self.generation {
            debug!(session = %self.id, "dropping stale initiation result");
            return None;
        }

        let range = match self.state {
            BookingState::InitiatingPayment { range, .. } => range,
            _ => return None,
        };

        let outcome = match result {
            Ok(handle) => {
                self.state = BookingState::Polling {
                    range,
                    handle: handle.clone(),
                };
                self.last_message =
                    Some("STK push sent. Complete the payment on your phone.".to_string());
                Some(handle)
            }
            Err(err) => {
                self.state = BookingState::Available { range };
                self.last_error = Some(err.to_string());
                None
            }
        };

        self.touch();
        outcome
    }

    /// Apply one status observation from the poll sequence.
    pub fn apply_poll_status(&mut self, generation: u64, status: StkStatus) -> bool {
        if generation != self.generation {
            debug!(session = %self.id, "dropping stale status observation");
            return false;
        }

        let (range, handle) = match &self.state {
            BookingState::Polling { range, handle } => (*range, handle.clone()),
            _ => return false,
        };

        self.polls_applied += 1;

        match status {
            StkStatus::Pending => {}
            StkStatus::Success => {
                self.state = BookingState::Succeeded { range, handle };
                self.last_message = Some("Payment successful. Booking confirmed.".to_string());
                info!(session = %self.id, "booking confirmed");
            }
            StkStatus::Failed => {
                self.state = BookingState::Failed { range, handle };
                self.last_error = Some("Payment failed. Try again.".to_string());
            }
        }

        self.touch();
        true
    }

    /// A poll attempt failed at the transport level. The sequence is over;
    /// the session returns to `Available` so the user can retry.
    pub fn apply_poll_error(&mut self, generation: u64, err: PaymentError) -> bool {
        if generation != self.generation {
            return false;
        }

        let range = match &self.state {
            BookingState::Polling { range, .. } => *range,
            _ => return false,
        };

        self.state = BookingState::Available { range };
        self.last_error = Some(err.to_string());
        self.touch();
        true
    }

    /// The poll budget ran out while still pending. Terminal for this
    /// attempt, and deliberately not the same outcome as `Failed`.
    pub fn apply_poll_timeout(&mut self, generation: u64) -> bool {
        if generation != self.generation {
            return false;
        }

        let (range, handle) = match &self.state {
            BookingState::Polling { range, handle } => (*range, handle.clone()),
            _ => return false,
        };

        self.state = BookingState::TimedOut { range, handle };
        self.last_message = Some("Payment is taking longer than expected.".to_string());
        self.touch();
        true
    }

    /// After a failed or timed-out attempt, return to `Available` for the
    /// same range. A retry submits a brand-new request and poll cycle.
    pub fn retry(&mut self) -> Result<(), SessionError> {
        let range = match &self.state {
            BookingState::Failed { range, .. } | BookingState::TimedOut { range, .. } => *range,
            other => {
                let from = other.label();
                return Err(self.fail(SessionError::InvalidTransition {
                    from,
                    to: "AVAILABLE",
                }));
            }
        };

        self.generation += 1;
        self.last_message = None;
        self.last_error = None;
        self.state = BookingState::Available { range };
        self.touch();
        Ok(())
    }

    /// Explicit user reset from any state: clears the phone number and the
    /// in-flight handle, and supersedes any live poll sequence so no further
    /// observations are applied.
    pub fn reset(&mut self) {
        self.generation += 1;
        self.phone_number.clear();
        self.state = BookingState::Idle;
        self.last_message = None;
        self.last_error = None;
        self.touch();
    }

    /// Swap in a freshly fetched product, e.g. after a confirmed payment.
    pub fn refresh_product(&mut self, product: Product) {
        if product.id != self.product.id {
            return;
        }

        self.product = product;
        self.touch();
    }

    fn fail(&mut self, err: SessionError) -> SessionError {
        self.last_error = Some(err.to_string());
        self.touch();
        err
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}
