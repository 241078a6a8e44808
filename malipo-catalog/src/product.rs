use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// A bookable room as served by the product listing. Immutable for the
/// duration of a booking session; refreshed only by re-fetching.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub price_per_night: Decimal,
    pub currency: String,
    pub hotel_slug: String,
    pub image: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("room {0} not found in the listing")]
    NotFound(i64),

    #[error("product listing unavailable: {0}")]
    Network(String),

    #[error("malformed product listing: {0}")]
    Malformed(String),
}

/// Paginated room listing for a hotel. The listing endpoint pages its
/// results; implementations follow the pagination to exhaustion.
#[async_trait]
pub trait ProductCatalog: Send + Sync {
    async fn list_rooms(&self, hotel_slug: &str) -> Result<Vec<Product>, CatalogError>;

    /// Resolve a single room by id within a hotel's listing. Also used to
    /// refresh the product after a confirmed payment.
    async fn find_room(&self, hotel_slug: &str, product_id: i64) -> Result<Product, CatalogError> {
        let rooms = self.list_rooms(hotel_slug).await?;

        rooms
            .into_iter()
            .find(|room| room.id == product_id)
            .ok_or(CatalogError::NotFound(product_id))
    }
}
