//! End-to-end booking run against a locally running booking API.
//!
//! Usage: `cargo run --example book_room -- <hotel-slug> <room-id> <phone>`

use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use malipo_booking::{BookingOrchestrator, BookingState, PollPolicy};
use malipo_catalog::ProductCatalog;
use malipo_gateway::{Config, GatewayClient};

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "malipo_booking=debug,malipo_gateway=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let mut args = std::env::args().skip(1);
    let hotel_slug = args.next().unwrap_or_else(|| "acacia-lodge".to_string());
    let room_id: i64 = args
        .next()
        .and_then(|arg| arg.parse().ok())
        .unwrap_or(1);
    let phone = args.next().unwrap_or_else(|| "254712345678".to_string());

    let config = Config::load().expect("failed to load configuration");
    let client =
        Arc::new(GatewayClient::new(&config.gateway).expect("failed to build gateway client"));

    let product = client
        .find_room(&hotel_slug, room_id)
        .await
        .expect("room not found in the hotel's listing");
    tracing::info!(room = %product.name, price = %product.price_per_night, "room resolved");

    let policy = PollPolicy::new(
        Duration::from_millis(config.polling.interval_ms),
        config.polling.max_attempts,
    );
    let orchestrator = BookingOrchestrator::with_backend(product, client, policy);

    let today = chrono::Utc::now().date_naive();
    orchestrator
        .set_dates(
            Some(today + chrono::Duration::days(7)),
            Some(today + chrono::Duration::days(9)),
        )
        .await;

    let snapshot = orchestrator.check_availability().await;
    tracing::info!(state = snapshot.state.label(), quote = %snapshot.quote, "availability checked");
    if !matches!(snapshot.state, BookingState::Available { .. }) {
        tracing::warn!(error = ?snapshot.error, "room cannot be booked");
        return;
    }

    orchestrator.set_phone_number(&phone).await;
    let snapshot = orchestrator.submit_payment().await;
    tracing::info!(
        state = snapshot.state.label(),
        tracking = ?snapshot.checkout_request_id,
        "payment submitted"
    );

    orchestrator.wait_for_payment_outcome().await;

    let snapshot = orchestrator.snapshot().await;
    tracing::info!(
        state = snapshot.state.label(),
        message = ?snapshot.message,
        error = ?snapshot.error,
        "booking finished"
    );
}
