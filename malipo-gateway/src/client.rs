use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::{Client, ClientBuilder};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error};

use malipo_catalog::{CatalogError, Product, ProductCatalog};
use malipo_core::{
    AvailabilityApi, AvailabilityError, AvailabilityResult, DateRange, PaymentError,
    PaymentGateway, PaymentHandle, PaymentRequest, StkStatus,
};

use crate::config::GatewayConfig;

/// HTTP adapter for the remote booking API: availability checks, STK-push
/// initiation, payment status, and the paginated room listing. All endpoints
/// are called unauthenticated, matching the deployed API.
pub struct GatewayClient {
    http: Client,
    base_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("failed to build HTTP client: {0}")]
    Client(String),
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, GatewayError> {
        let http = ClientBuilder::new()
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()
            .map_err(|e| GatewayError::Client(e.to_string()))?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }
}

// Wire types, owned by the remote API.

#[derive(Debug, Deserialize)]
struct AvailabilityResponse {
    available: bool,
}

#[derive(Debug, Serialize)]
struct StkPushPayload<'a> {
    phone: &'a str,
    product_id: i64,
    hotel_slug: &'a str,
    check_in: NaiveDate,
    check_out: NaiveDate,
    amount: Decimal,
}

#[derive(Debug, Deserialize)]
struct StkPushResponse {
    checkout_request_id: String,
    payment_id: String,
}

#[derive(Debug, Deserialize)]
struct PaymentStatusResponse {
    status: StkStatus,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    detail: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProductPage {
    next: Option<String>,
    results: Vec<ProductRecord>,
}

#[derive(Debug, Deserialize)]
struct ProductRecord {
    id: i64,
    name: String,
    price: Decimal,
    currency: String,
    #[serde(default)]
    image: Option<String>,
    #[serde(default)]
    hotel: Option<HotelRef>,
}

#[derive(Debug, Deserialize)]
struct HotelRef {
    #[serde(default)]
    slug: Option<String>,
}

impl ProductRecord {
    fn into_product(self, hotel_slug: &str) -> Product {
        let slug = self
            .hotel
            .and_then(|h| h.slug)
            .unwrap_or_else(|| hotel_slug.to_string());

        Product {
            id: self.id,
            name: self.name,
            price_per_night: self.price,
            currency: self.currency,
            hotel_slug: slug,
            image: self.image,
        }
    }
}

#[async_trait]
impl AvailabilityApi for GatewayClient {
    async fn check_availability(
        &self,
        product_id: i64,
        range: &DateRange,
    ) -> Result<AvailabilityResult, AvailabilityError> {
        debug!(product_id, check_in = %range.check_in, check_out = %range.check_out, "checking availability");

        let response = self
            .http
            .get(self.url("availability/"))
            .query(&[
                ("product", product_id.to_string()),
                ("check_in", range.check_in.to_string()),
                ("check_out", range.check_out.to_string()),
            ])
            .send()
            .await
            .map_err(|e| AvailabilityError::ServiceUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            error!(%status, "availability check failed");
            return Err(AvailabilityError::ServiceUnavailable(format!(
                "availability endpoint returned HTTP {}",
                status
            )));
        }

        let body: AvailabilityResponse = response
            .json()
            .await
            .map_err(|e| AvailabilityError::ServiceUnavailable(e.to_string()))?;

        Ok(AvailabilityResult {
            available: body.available,
            for_range: *range,
        })
    }
}

#[async_trait]
impl PaymentGateway for GatewayClient {
    async fn initiate_stk_push(
        &self,
        request: &PaymentRequest,
    ) -> Result<PaymentHandle, PaymentError> {
        request.validate()?;

        let payload = StkPushPayload {
            phone: &request.phone_number,
            product_id: request.product_id,
            hotel_slug: &request.hotel_slug,
            check_in: request.range.check_in,
            check_out: request.range.check_out,
            amount: request.amount,
        };

        debug!(product_id = request.product_id, amount = %request.amount, "initiating STK push");

        let response = self
            .http
            .post(self.url("payments/mpesa/stk_push/"))
            .json(&payload)
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            // Surface the gateway's own message verbatim when it sends one.
            let detail = response
                .json::<ErrorBody>()
                .await
                .ok()
                .and_then(|body| body.detail)
                .unwrap_or_else(|| format!("payment gateway returned HTTP {}", status));

            error!(%status, %detail, "STK push rejected");
            return Err(PaymentError::GatewayRejected(detail));
        }

        let body: StkPushResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        debug!(checkout_request_id = %body.checkout_request_id, "STK push accepted");

        Ok(PaymentHandle {
            checkout_request_id: body.checkout_request_id,
            payment_id: body.payment_id,
        })
    }

    async fn payment_status(&self, handle: &PaymentHandle) -> Result<StkStatus, PaymentError> {
        let response = self
            .http
            .get(self.url("payments/status/"))
            .query(&[("payment_id", handle.payment_id.as_str())])
            .send()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PaymentError::Network(format!(
                "status endpoint returned HTTP {}",
                status
            )));
        }

        let body: PaymentStatusResponse = response
            .json()
            .await
            .map_err(|e| PaymentError::Network(e.to_string()))?;

        debug!(payment_id = %handle.payment_id, status = ?body.status, "payment status");

        Ok(body.status)
    }
}

#[async_trait]
impl ProductCatalog for GatewayClient {
    async fn list_rooms(&self, hotel_slug: &str) -> Result<Vec<Product>, CatalogError> {
        let mut page_url = Some(format!(
            "{}?hotel={}&product_type=room",
            self.url("products/"),
            hotel_slug
        ));
        let mut rooms = Vec::new();

        // The listing is paginated; follow `next` links until exhausted.
        while let Some(url) = page_url.take() {
            let response = self
                .http
                .get(&url)
                .send()
                .await
                .map_err(|e| CatalogError::Network(e.to_string()))?;

            let status = response.status();
            if !status.is_success() {
                return Err(CatalogError::Network(format!(
                    "product listing returned HTTP {}",
                    status
                )));
            }

            let page: ProductPage = response
                .json()
                .await
                .map_err(|e| CatalogError::Malformed(e.to_string()))?;

            rooms.extend(
                page.results
                    .into_iter()
                    .map(|record| record.into_product(hotel_slug)),
            );
            page_url = page.next;
        }

        debug!(hotel_slug, count = rooms.len(), "room listing fetched");

        Ok(rooms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_client_creation_and_url_join() {
        let config = GatewayConfig {
            base_url: "http://localhost:8000/api/".to_string(),
            request_timeout_ms: 500,
        };
        let client = GatewayClient::new(&config).unwrap();

        assert_eq!(
            client.url("payments/status/"),
            "http://localhost:8000/api/payments/status/"
        );
    }

    #[test]
    fn test_product_page_parsing() {
        // Listing shape as served: decimal prices as strings, nested hotel.
        let raw = r#"{
            "count": 2,
            "next": "http://localhost:8000/api/products/?hotel=acacia-lodge&product_type=room&page=2",
            "previous": null,
            "results": [
                {"id": 7, "name": "Deluxe Twin", "price": "1000.00", "currency": "KES",
                 "image": null, "hotel": {"slug": "acacia-lodge", "name": "Acacia Lodge"}},
                {"id": 9, "name": "Garden Suite", "price": "4500.50", "currency": "KES"}
            ]
        }"#;

        let page: ProductPage = serde_json::from_str(raw).unwrap();
        assert!(page.next.is_some());
        assert_eq!(page.results.len(), 2);

        let room = page.results.into_iter().next().unwrap().into_product("acacia-lodge");
        assert_eq!(room.id, 7);
        assert_eq!(room.price_per_night, dec!(1000.00));
        assert_eq!(room.hotel_slug, "acacia-lodge");
    }

    #[test]
    fn test_stk_push_response_parsing() {
        let raw = r#"{"checkout_request_id": "ws_CO_191220191020363925", "payment_id": "42"}"#;
        let body: StkPushResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(body.checkout_request_id, "ws_CO_191220191020363925");
        assert_eq!(body.payment_id, "42");
    }

    #[test]
    fn test_status_response_parsing() {
        let body: PaymentStatusResponse =
            serde_json::from_str(r#"{"status": "failed"}"#).unwrap();
        assert_eq!(body.status, StkStatus::Failed);
    }

    #[test]
    fn test_error_body_detail_optional() {
        let body: ErrorBody = serde_json::from_str(r#"{"detail": "invalid phone"}"#).unwrap();
        assert_eq!(body.detail.as_deref(), Some("invalid phone"));

        let body: ErrorBody = serde_json::from_str(r#"{}"#).unwrap();
        assert!(body.detail.is_none());
    }
}
