use std::sync::Arc;
use uuid::Uuid;

use samfard_booking::{
    BookingEngine, BookingStatus, BookingType, CreateBookingRequest, RideSnapshot,
};
use samfard_core::clock::SystemClock;
use samfard_core::notify::RecordingSender;
use samfard_core::EngineError;
use samfard_store::MemoryStore;

fn engine() -> Arc<BookingEngine> {
    let store = Arc::new(MemoryStore::with_system_clock());
    Arc::new(BookingEngine::with_defaults(
        store,
        Arc::new(SystemClock),
        Arc::new(RecordingSender::new()),
    ))
}

fn seat_request() -> CreateBookingRequest {
    CreateBookingRequest {
        booking_type: BookingType::SeatBooking,
        ride_id: Uuid::new_v4(),
        ad_id: None,
        requester_id: "pax-1".to_string(),
        ride_owner_id: "drv-1".to_string(),
        ride: RideSnapshot {
            origin: "Göteborg".to_string(),
            destination: "Stockholm".to_string(),
            ride_date: "2025-06-14".to_string(),
            ride_time: "14:00".to_string(),
        },
        seats: 2,
    }
}

#[tokio::test]
async fn request_approve_then_second_approval_is_refused() {
    let engine = engine();

    let booking = engine.create(seat_request()).await.unwrap();
    assert_eq!(booking.status, BookingStatus::Requested);

    let approved = engine
        .approve(booking.id, "drv-1", Some("0701234567".to_string()), None)
        .await
        .unwrap();
    assert_eq!(approved.status, BookingStatus::Approved);
    assert_eq!(approved.driver_phone_shared.as_deref(), Some("0701234567"));
    assert!(approved.approved_at.is_some());

    let again = engine
        .approve(booking.id, "drv-1", Some("0739999999".to_string()), None)
        .await;
    assert!(matches!(again, Err(EngineError::InvalidTransition { .. })));

    // The losing call changed nothing.
    let current = engine.get(booking.id).await.unwrap();
    assert_eq!(current.driver_phone_shared.as_deref(), Some("0701234567"));
}

#[tokio::test]
async fn concurrent_approval_single_winner() {
    let engine = engine();
    let booking = engine.create(seat_request()).await.unwrap();

    let a = {
        let engine = engine.clone();
        let id = booking.id;
        tokio::spawn(async move {
            engine
                .approve(id, "drv-1", Some("0701111111".to_string()), None)
                .await
        })
    };
    let b = {
        let engine = engine.clone();
        let id = booking.id;
        tokio::spawn(async move {
            engine
                .approve(id, "drv-1", Some("0702222222".to_string()), None)
                .await
        })
    };

    let results = [a.await.unwrap(), b.await.unwrap()];
    let winners = results.iter().filter(|r| r.is_ok()).count();
    assert_eq!(winners, 1, "exactly one concurrent approval may land");

    let current = engine.get(booking.id).await.unwrap();
    assert_eq!(current.status, BookingStatus::Approved);
    let persisted = current.driver_phone_shared.as_deref().unwrap();
    assert!(["0701111111", "0702222222"].contains(&persisted));

    // The loser saw the settled state, not a spurious conflict.
    let loser = results.iter().find(|r| r.is_err()).unwrap();
    assert!(matches!(
        loser,
        Err(EngineError::InvalidTransition { .. }) | Err(EngineError::Conflict { .. })
    ));
}

#[tokio::test]
async fn rejected_booking_never_becomes_approved() {
    let engine = engine();
    let booking = engine.create(seat_request()).await.unwrap();

    engine.reject(booking.id, "drv-1").await.unwrap();
    let result = engine
        .approve(booking.id, "drv-1", Some("0701234567".to_string()), None)
        .await;
    assert!(matches!(result, Err(EngineError::InvalidTransition { .. })));

    let current = engine.get(booking.id).await.unwrap();
    assert_eq!(current.status, BookingStatus::Rejected);
    assert!(current.driver_phone_shared.is_none());
}
