use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use malipo_booking::{BookingOrchestrator, BookingState, MockBookingBackend, PollPolicy};
use malipo_catalog::Product;
use malipo_core::StkStatus;

fn room() -> Product {
    Product {
        id: 7,
        name: "Deluxe Twin".to_string(),
        price_per_night: dec!(1000),
        currency: "KES".to_string(),
        hotel_slug: "acacia-lodge".to_string(),
        image: None,
    }
}

fn fast_policy() -> PollPolicy {
    PollPolicy::new(Duration::from_millis(10), 6)
}

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn orchestrator(backend: &Arc<MockBookingBackend>) -> BookingOrchestrator {
    BookingOrchestrator::with_backend(room(), backend.clone(), fast_policy())
}

#[tokio::test]
async fn test_booking_confirmed_end_to_end() {
    let backend = Arc::new(MockBookingBackend::new());
    backend.push_status(StkStatus::Pending);
    backend.push_status(StkStatus::Success);
    backend.set_rooms(vec![room()]);

    let orchestrator = orchestrator(&backend);
    orchestrator
        .set_dates(Some(date(2025, 6, 1)), Some(date(2025, 6, 3)))
        .await;

    let snapshot = orchestrator.check_availability().await;
    assert!(matches!(snapshot.state, BookingState::Available { .. }));
    assert_eq!(snapshot.quote, dec!(2000)); // 1000 KES x 2 nights
    assert_eq!(snapshot.currency, "KES");

    orchestrator.set_phone_number("254712345678").await;
    let snapshot = orchestrator.submit_payment().await;
    assert!(matches!(snapshot.state, BookingState::Polling { .. }));
    assert!(snapshot.checkout_request_id.is_some());

    orchestrator.wait_for_payment_outcome().await;

    let snapshot = orchestrator.snapshot().await;
    assert!(matches!(snapshot.state, BookingState::Succeeded { .. }));
    assert!(snapshot.message.unwrap().contains("Booking confirmed"));
    assert_eq!(backend.status_calls(), 2);

    // Confirmation triggers a product re-fetch.
    assert_eq!(backend.list_calls(), 1);
}

#[tokio::test]
async fn test_gateway_rejection_returns_to_available() {
    let backend = Arc::new(MockBookingBackend::new());
    backend.reject_initiation("invalid phone");

    let orchestrator = orchestrator(&backend);
    orchestrator
        .set_dates(Some(date(2025, 6, 1)), Some(date(2025, 6, 3)))
        .await;
    orchestrator.check_availability().await;
    orchestrator.set_phone_number("254712345678").await;

    let snapshot = orchestrator.submit_payment().await;
    assert!(matches!(snapshot.state, BookingState::Available { .. }));
    assert!(snapshot.error.unwrap().contains("invalid phone"));
    assert!(snapshot.checkout_request_id.is_none());

    // No handle, so no polling ever starts.
    orchestrator.wait_for_payment_outcome().await;
    assert_eq!(backend.status_calls(), 0);
}

#[tokio::test]
async fn test_polling_budget_exhaustion_times_out() {
    // The backend reports pending forever.
    let backend = Arc::new(MockBookingBackend::new());

    let orchestrator = orchestrator(&backend);
    orchestrator
        .set_dates(Some(date(2025, 6, 1)), Some(date(2025, 6, 3)))
        .await;
    orchestrator.check_availability().await;
    orchestrator.set_phone_number("254712345678").await;
    orchestrator.submit_payment().await;
    orchestrator.wait_for_payment_outcome().await;

    let snapshot = orchestrator.snapshot().await;
    assert!(matches!(snapshot.state, BookingState::TimedOut { .. }));
    assert!(!matches!(snapshot.state, BookingState::Failed { .. }));
    assert_eq!(backend.status_calls(), 6);
}

#[tokio::test]
async fn test_failed_observation_stops_polling_early() {
    let backend = Arc::new(MockBookingBackend::new());
    backend.push_status(StkStatus::Pending);
    backend.push_status(StkStatus::Failed);

    let orchestrator = orchestrator(&backend);
    orchestrator
        .set_dates(Some(date(2025, 6, 1)), Some(date(2025, 6, 3)))
        .await;
    orchestrator.check_availability().await;
    orchestrator.set_phone_number("254712345678").await;
    orchestrator.submit_payment().await;
    orchestrator.wait_for_payment_outcome().await;

    let snapshot = orchestrator.snapshot().await;
    assert!(matches!(snapshot.state, BookingState::Failed { .. }));
    assert!(snapshot.error.unwrap().contains("Payment failed"));

    // Attempts 3..6 were never issued.
    assert_eq!(backend.status_calls(), 2);
}

#[tokio::test]
async fn test_reset_while_polling_stops_observations() {
    let backend = Arc::new(MockBookingBackend::new());

    let orchestrator = BookingOrchestrator::with_backend(
        room(),
        backend.clone(),
        PollPolicy::new(Duration::from_millis(50), 100),
    );
    orchestrator
        .set_dates(Some(date(2025, 6, 1)), Some(date(2025, 6, 3)))
        .await;
    orchestrator.check_availability().await;
    orchestrator.set_phone_number("254712345678").await;
    orchestrator.submit_payment().await;

    // Let a couple of pending observations land, then reset mid-sequence.
    tokio::time::sleep(Duration::from_millis(75)).await;
    orchestrator.reset().await;
    let applied_at_reset = orchestrator.session().lock().await.polls_applied();
    assert!(applied_at_reset >= 1);

    orchestrator.wait_for_payment_outcome().await;

    let applied_after = orchestrator.session().lock().await.polls_applied();
    assert_eq!(applied_at_reset, applied_after);

    let snapshot = orchestrator.snapshot().await;
    assert!(matches!(snapshot.state, BookingState::Idle));
    assert!(snapshot.checkout_request_id.is_none());
    assert!(orchestrator.session().lock().await.phone_number().is_empty());
}

#[tokio::test]
async fn test_date_change_forces_fresh_check_before_payment() {
    let backend = Arc::new(MockBookingBackend::new());

    let orchestrator = orchestrator(&backend);
    orchestrator
        .set_dates(Some(date(2025, 6, 1)), Some(date(2025, 6, 3)))
        .await;
    orchestrator.check_availability().await;
    orchestrator.set_phone_number("254712345678").await;

    // Edit dates while Available: the stale availability must not be usable.
    orchestrator
        .set_dates(Some(date(2025, 6, 2)), Some(date(2025, 6, 4)))
        .await;

    let snapshot = orchestrator.submit_payment().await;
    assert!(matches!(snapshot.state, BookingState::Idle));
    assert!(snapshot.error.is_some());
    assert_eq!(backend.initiate_calls(), 0);

    // A fresh check unblocks payment again.
    let snapshot = orchestrator.check_availability().await;
    assert!(matches!(snapshot.state, BookingState::Available { .. }));
    let snapshot = orchestrator.submit_payment().await;
    assert!(matches!(snapshot.state, BookingState::Polling { .. }));
}

#[tokio::test]
async fn test_invalid_range_never_reaches_the_network() {
    let backend = Arc::new(MockBookingBackend::new());

    let orchestrator = orchestrator(&backend);
    orchestrator
        .set_dates(Some(date(2025, 6, 3)), Some(date(2025, 6, 1)))
        .await;

    let snapshot = orchestrator.check_availability().await;
    assert!(matches!(snapshot.state, BookingState::Idle));
    assert!(snapshot.error.is_some());
    assert_eq!(snapshot.quote, dec!(0));
    assert_eq!(backend.availability_calls(), 0);
}

#[tokio::test]
async fn test_unavailable_room_blocks_payment() {
    let backend = Arc::new(MockBookingBackend::new());
    backend.set_available(false);

    let orchestrator = orchestrator(&backend);
    orchestrator
        .set_dates(Some(date(2025, 6, 1)), Some(date(2025, 6, 3)))
        .await;

    let snapshot = orchestrator.check_availability().await;
    assert!(matches!(snapshot.state, BookingState::Unavailable { .. }));

    orchestrator.set_phone_number("254712345678").await;
    let snapshot = orchestrator.submit_payment().await;
    assert!(matches!(snapshot.state, BookingState::Unavailable { .. }));
    assert_eq!(backend.initiate_calls(), 0);
}

#[tokio::test]
async fn test_availability_outage_surfaces_and_recovers() {
    let backend = Arc::new(MockBookingBackend::new());
    backend.fail_availability("gateway timeout");

    let orchestrator = orchestrator(&backend);
    orchestrator
        .set_dates(Some(date(2025, 6, 1)), Some(date(2025, 6, 3)))
        .await;

    let snapshot = orchestrator.check_availability().await;
    assert!(matches!(snapshot.state, BookingState::Idle));
    assert!(snapshot.error.unwrap().contains("gateway timeout"));

    backend.set_available(true);
    let snapshot = orchestrator.check_availability().await;
    assert!(matches!(snapshot.state, BookingState::Available { .. }));
}

#[tokio::test]
async fn test_timed_out_attempt_can_retry_with_new_handle() {
    let backend = Arc::new(MockBookingBackend::new());

    let orchestrator = BookingOrchestrator::with_backend(
        room(),
        backend.clone(),
        PollPolicy::new(Duration::from_millis(10), 2),
    );
    orchestrator
        .set_dates(Some(date(2025, 6, 1)), Some(date(2025, 6, 3)))
        .await;
    orchestrator.check_availability().await;
    orchestrator.set_phone_number("254712345678").await;

    orchestrator.submit_payment().await;
    orchestrator.wait_for_payment_outcome().await;
    let first_tracking = orchestrator.snapshot().await.checkout_request_id.unwrap();
    assert!(matches!(
        orchestrator.snapshot().await.state,
        BookingState::TimedOut { .. }
    ));

    // Retry starts a brand-new payment attempt and poll cycle.
    orchestrator.retry().await;
    backend.push_status(StkStatus::Success);
    orchestrator.submit_payment().await;
    orchestrator.wait_for_payment_outcome().await;

    let snapshot = orchestrator.snapshot().await;
    assert!(matches!(snapshot.state, BookingState::Succeeded { .. }));
    assert_ne!(snapshot.checkout_request_id.unwrap(), first_tracking);
    assert_eq!(backend.initiate_calls(), 2);
}
