use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::booking::DateRange;

/// Gateway-side status of an STK push, as reported by the status endpoint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StkStatus {
    Pending,
    Success,
    Failed,
}

impl StkStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StkStatus::Pending)
    }
}

/// One payment attempt. Created per submission; the amount must equal the
/// quote recomputed at submission time, never a cached value.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub phone_number: String,
    pub product_id: i64,
    pub hotel_slug: String,
    pub range: DateRange,
    pub amount: Decimal,
    pub currency: String,
}

impl PaymentRequest {
    /// Local preconditions checked before any network call is made.
    pub fn validate(&self) -> Result<(), PaymentError> {
        if self.phone_number.trim().is_empty() {
            return Err(PaymentError::Validation(
                "phone number is required".to_string(),
            ));
        }

        if self.amount <= Decimal::ZERO {
            return Err(PaymentError::Validation(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }

        Ok(())
    }
}

/// Tracking identifiers returned by the gateway on successful initiation.
/// Opaque to the client: `payment_id` keys status polls, the checkout id is
/// shown to the user for reference only.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PaymentHandle {
    pub checkout_request_id: String,
    pub payment_id: String,
}

#[derive(Debug, thiserror::Error)]
pub enum PaymentError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("payment gateway rejected the request: {0}")]
    GatewayRejected(String),

    #[error("network error: {0}")]
    Network(String),
}

/// STK-push payment gateway seam. Initiation is not idempotent: each
/// successful call creates a new payment attempt upstream, so retries happen
/// only on explicit user action.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Submit an STK push and obtain a tracking handle.
    async fn initiate_stk_push(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentHandle, PaymentError>;

    /// Query the current status for a previously initiated payment.
    async fn payment_status(&self, handle: &PaymentHandle) -> Result<StkStatus, PaymentError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use rust_decimal_macros::dec;

    fn request(phone: &str, amount: Decimal) -> PaymentRequest {
        let range = DateRange::new(
            NaiveDate::from_ymd_opt(2025, 6, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 6, 3).unwrap(),
        )
        .unwrap();

        PaymentRequest {
            phone_number: phone.to_string(),
            product_id: 7,
            hotel_slug: "acacia-lodge".to_string(),
            range,
            amount,
            currency: "KES".to_string(),
        }
    }

    #[test]
    fn test_missing_phone_fails_validation() {
        let result = request("", dec!(2000)).validate();
        assert!(matches!(result, Err(PaymentError::Validation(_))));

        let result = request("   ", dec!(2000)).validate();
        assert!(matches!(result, Err(PaymentError::Validation(_))));
    }

    #[test]
    fn test_non_positive_amount_fails_validation() {
        assert!(request("254712345678", Decimal::ZERO).validate().is_err());
        assert!(request("254712345678", dec!(-1)).validate().is_err());
    }

    #[test]
    fn test_valid_request_passes() {
        assert!(request("254712345678", dec!(2000)).validate().is_ok());
    }

    #[test]
    fn test_status_wire_format() {
        let status: StkStatus = serde_json::from_str("\"pending\"").unwrap();
        assert_eq!(status, StkStatus::Pending);
        assert!(!status.is_terminal());

        let status: StkStatus = serde_json::from_str("\"success\"").unwrap();
        assert!(status.is_terminal());
    }
}
