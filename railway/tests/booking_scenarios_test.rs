//! End-to-end booking scenarios over the in-memory stores.
//!
//! The clock starts at 2026-10-16 08:00 UTC; dates are given as days from
//! then.
//!
//! Run with: `cargo test --test booking_scenarios_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use chrono::{Duration, NaiveDate, NaiveTime};
use railway::{
    BookingError, Config, ConflictReason, ErrorKind, Money, NewSchedule, NewTrain, NewTraveler,
    RailwayApp, Schedule, ServiceResponse, Train, TrainStatus, TrainType,
};
use railway_core::environment::Clock;
use railway_testing::{ManualClock, test_clock};
use std::sync::Arc;

const NIC: &str = "991234567V";

fn day(offset: i64) -> NaiveDate {
    test_clock().today() + Duration::days(offset)
}

fn manual_clock() -> ManualClock {
    ManualClock::new(test_clock().now())
}

fn app_with(clock: &ManualClock) -> RailwayApp {
    RailwayApp::in_memory(&Config::default(), Arc::new(clock.clone()))
}

async fn colombo_kandy(app: &RailwayApp, capacity: u32) -> Train {
    app.catalog()
        .create_train(NewTrain {
            name: "Udarata Menike".to_string(),
            train_type: TrainType::InterCity,
            capacity,
            departure_station: "Colombo".to_string(),
            arrival_station: "Kandy".to_string(),
        })
        .await
        .expect("train should be created")
}

async fn schedule_on(app: &RailwayApp, train: &Train, date: NaiveDate) -> Schedule {
    app.catalog()
        .add_schedule(NewSchedule {
            train_id: train.id,
            date,
            departure_time: NaiveTime::from_hms_opt(6, 0, 0).unwrap(),
            arrival_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            price: Money::from_cents(120_000),
        })
        .await
        .expect("schedule should be added")
}

async fn register(app: &RailwayApp, nic: &str) {
    app.travelers()
        .register(NewTraveler {
            nic: nic.to_string(),
            name: "Nimali Perera".to_string(),
            email: "nimali@example.com".to_string(),
            contact_no: "+94771234567".to_string(),
        })
        .await
        .expect("traveler should register");
}

/// Scenario A: the first schedule publishes the train with full capacity.
#[tokio::test]
async fn test_first_schedule_publishes_train() {
    println!("🧪 Scenario A: create train and add schedule for tomorrow");

    let clock = manual_clock();
    let app = app_with(&clock);
    let train = colombo_kandy(&app, 50).await;
    assert_eq!(train.status, TrainStatus::Unpublished);
    assert_eq!(train.departure_station.as_str(), "colombo");
    assert_eq!(train.arrival_station.as_str(), "kandy");

    let schedule = schedule_on(&app, &train, day(1)).await;
    assert_eq!(schedule.available_seats, 50);

    let details = app.catalog().get_train(train.id).await.unwrap();
    assert_eq!(details.train.status, TrainStatus::Published);
    assert!(details.train.schedule_ids.contains(&schedule.id));
    assert!(details.train.available_dates.contains(&day(1)));
    assert_eq!(details.schedules, vec![schedule]);

    println!("  ✅ Train published with 50 seats on sale");
}

/// Scenarios B and C: booking takes seats; bad requests are refused with the
/// right category and leave the counter alone.
#[tokio::test]
async fn test_booking_and_refused_requests() {
    println!("🧪 Scenarios B/C: book 3 seats, then 5 and 48");

    let clock = manual_clock();
    let app = app_with(&clock);
    let train = colombo_kandy(&app, 50).await;
    let schedule = schedule_on(&app, &train, day(1)).await;
    register(&app, NIC).await;

    let reservation = app
        .booking()
        .create_reservation(NIC, schedule.id, 3)
        .await
        .unwrap();
    assert_eq!(reservation.seats, 3);
    assert_eq!(reservation.reservation_date, day(1));
    assert_eq!(reservation.booking_date, day(0));
    assert!(!reservation.is_cancelled);

    let schedule_now = app.catalog().get_schedule(schedule.id).await.unwrap();
    assert_eq!(schedule_now.available_seats, 47);
    assert!(schedule_now.reservation_ids.contains_key(&reservation.id));

    let profile = app.travelers().get_traveler(NIC).await.unwrap();
    assert!(profile.traveler.reservation_ids.contains(&reservation.id));
    assert_eq!(profile.upcoming, vec![reservation.clone()]);
    println!("  ✓ 3 seats booked, 47 left");

    let five = app
        .booking()
        .create_reservation(NIC, schedule.id, 5)
        .await
        .unwrap_err();
    assert_eq!(five.kind(), ErrorKind::InvalidInput);

    let forty_eight = app
        .booking()
        .create_reservation(NIC, schedule.id, 48)
        .await
        .unwrap_err();
    assert_eq!(
        forty_eight,
        BookingError::Conflict(ConflictReason::InsufficientSeats {
            requested: 48,
            available: 47,
        })
    );

    let response = ServiceResponse::from_result(
        app.booking().create_reservation(NIC, schedule.id, 0).await,
        "Reservation created",
    );
    assert!(!response.success);
    assert_eq!(response.error, Some(ErrorKind::InvalidInput));

    let schedule_now = app.catalog().get_schedule(schedule.id).await.unwrap();
    assert_eq!(schedule_now.available_seats, 47);
    assert_eq!(schedule_now.reservation_ids.len(), 1);

    println!("  ✅ Out-of-range and over-capacity requests refused");
}

/// Scenario D: cancellation six days ahead returns the seats and keeps the
/// record.
#[tokio::test]
async fn test_cancel_six_days_ahead_restores_seats() {
    println!("🧪 Scenario D: cancel 6 days before travel");

    let clock = manual_clock();
    let app = app_with(&clock);
    let train = colombo_kandy(&app, 50).await;
    let schedule = schedule_on(&app, &train, day(6)).await;
    register(&app, NIC).await;

    let reservation = app
        .booking()
        .create_reservation(NIC, schedule.id, 3)
        .await
        .unwrap();
    let cancelled = app
        .booking()
        .cancel_reservation(reservation.id)
        .await
        .unwrap();
    assert!(cancelled.is_cancelled);

    let schedule_now = app.catalog().get_schedule(schedule.id).await.unwrap();
    assert_eq!(schedule_now.available_seats, 50);
    assert!(schedule_now.reservation_ids.is_empty());

    let stored = app.booking().get_reservation(reservation.id).await.unwrap();
    assert!(stored.is_cancelled);
    assert_eq!(stored.seats, 3);

    let profile = app.travelers().get_traveler(NIC).await.unwrap();
    assert!(profile.traveler.reservation_ids.is_empty());

    println!("  ✅ Seats restored, reservation kept as cancelled");
}

/// Scenario E: a booked schedule cannot be deleted; once free, deleting the
/// only schedule unpublishes the train.
#[tokio::test]
async fn test_delete_schedule_gated_then_unpublishes() {
    println!("🧪 Scenario E: delete a booked schedule");

    let clock = manual_clock();
    let app = app_with(&clock);
    let train = colombo_kandy(&app, 50).await;
    let schedule = schedule_on(&app, &train, day(6)).await;
    register(&app, NIC).await;
    let reservation = app
        .booking()
        .create_reservation(NIC, schedule.id, 2)
        .await
        .unwrap();

    let refused = app.catalog().delete_schedule(schedule.id).await.unwrap_err();
    assert_eq!(
        refused,
        BookingError::Conflict(ConflictReason::ActiveReservations)
    );
    assert!(app.catalog().get_schedule(schedule.id).await.is_ok());
    println!("  ✓ Delete refused while booked");

    app.booking()
        .cancel_reservation(reservation.id)
        .await
        .unwrap();
    let train_after = app.catalog().delete_schedule(schedule.id).await.unwrap();

    assert_eq!(train_after.status, TrainStatus::Unpublished);
    assert!(train_after.schedule_ids.is_empty());
    assert!(!train_after.available_dates.contains(&day(6)));
    assert!(matches!(
        app.catalog().get_schedule(schedule.id).await,
        Err(BookingError::NotFound { resource: "schedule", .. })
    ));

    println!("  ✅ Schedule deleted, train unpublished");
}

/// Deleting one of several schedules keeps the train published and the
/// shared date.
#[tokio::test]
async fn test_delete_one_of_many_keeps_train_published() {
    println!("🧪 Delete one of several schedules");

    let clock = manual_clock();
    let app = app_with(&clock);
    let train = colombo_kandy(&app, 50).await;
    let morning = schedule_on(&app, &train, day(3)).await;
    let evening = app
        .catalog()
        .add_schedule(NewSchedule {
            train_id: train.id,
            date: day(3),
            departure_time: NaiveTime::from_hms_opt(17, 0, 0).unwrap(),
            arrival_time: NaiveTime::from_hms_opt(20, 0, 0).unwrap(),
            price: Money::from_cents(120_000),
        })
        .await
        .unwrap();
    let later = schedule_on(&app, &train, day(9)).await;

    let train_after = app.catalog().delete_schedule(morning.id).await.unwrap();
    assert_eq!(train_after.status, TrainStatus::Published);
    assert!(train_after.available_dates.contains(&day(3)));
    assert_eq!(train_after.schedule_ids.len(), 2);

    let train_after = app.catalog().delete_schedule(evening.id).await.unwrap();
    assert!(!train_after.available_dates.contains(&day(3)));
    assert!(train_after.available_dates.contains(&later.date));
    assert_eq!(train_after.status, TrainStatus::Published);

    println!("  ✅ Dates follow the remaining schedules");
}

/// Exactly five days ahead is the last day a reservation may change.
#[tokio::test]
async fn test_modification_window_boundary() {
    println!("🧪 Modification window boundary");

    let clock = manual_clock();
    let app = app_with(&clock);
    let train = colombo_kandy(&app, 50).await;
    let five_out = schedule_on(&app, &train, day(5)).await;
    let four_out = schedule_on(&app, &train, day(4)).await;
    register(&app, NIC).await;

    let open = app
        .booking()
        .create_reservation(NIC, five_out.id, 2)
        .await
        .unwrap();
    let closed = app
        .booking()
        .create_reservation(NIC, four_out.id, 2)
        .await
        .unwrap();

    let window_closed = BookingError::Conflict(ConflictReason::ModificationWindowClosed {
        window_days: 5,
    });
    assert_eq!(
        app.booking()
            .update_reservation_seats(closed.id, 3)
            .await
            .unwrap_err(),
        window_closed
    );
    assert_eq!(
        app.booking().cancel_reservation(closed.id).await.unwrap_err(),
        window_closed
    );
    println!("  ✓ 4 days out: update and cancel refused");

    let updated = app
        .booking()
        .update_reservation_seats(open.id, 4)
        .await
        .unwrap();
    assert_eq!(updated.seats, 4);
    assert_eq!(
        app.catalog()
            .get_schedule(five_out.id)
            .await
            .unwrap()
            .available_seats,
        46
    );
    app.booking().cancel_reservation(open.id).await.unwrap();
    assert_eq!(
        app.catalog()
            .get_schedule(five_out.id)
            .await
            .unwrap()
            .available_seats,
        50
    );

    println!("  ✅ 5 days out: update and cancel allowed");
}

/// The window is measured from the current day, so it closes as time passes.
#[tokio::test]
async fn test_window_closes_as_clock_moves() {
    println!("🧪 Window closes as the clock advances");

    let clock = manual_clock();
    let app = app_with(&clock);
    let train = colombo_kandy(&app, 50).await;
    let schedule = schedule_on(&app, &train, day(8)).await;
    register(&app, NIC).await;
    let reservation = app
        .booking()
        .create_reservation(NIC, schedule.id, 1)
        .await
        .unwrap();

    clock.advance(Duration::days(4));
    let refused = app
        .booking()
        .cancel_reservation(reservation.id)
        .await
        .unwrap_err();
    assert!(matches!(
        refused,
        BookingError::Conflict(ConflictReason::ModificationWindowClosed { .. })
    ));

    clock.advance(Duration::days(5));
    let departed = app
        .booking()
        .cancel_reservation(reservation.id)
        .await
        .unwrap_err();
    assert_eq!(
        departed,
        BookingError::Conflict(ConflictReason::ScheduleDeparted)
    );

    let history = app.booking().list_traveler_reservations(NIC).await.unwrap();
    assert!(history.upcoming.is_empty());
    assert_eq!(history.past.len(), 1);

    println!("  ✅ Refused inside the window and after departure");
}

/// A second cancellation is refused and does not return seats twice.
#[tokio::test]
async fn test_cancel_twice_is_refused() {
    println!("🧪 Idempotent cancellation");

    let clock = manual_clock();
    let app = app_with(&clock);
    let train = colombo_kandy(&app, 10).await;
    let schedule = schedule_on(&app, &train, day(10)).await;
    register(&app, NIC).await;
    register(&app, "200012345678").await;

    let first = app
        .booking()
        .create_reservation(NIC, schedule.id, 3)
        .await
        .unwrap();
    app.booking()
        .create_reservation("200012345678", schedule.id, 4)
        .await
        .unwrap();

    app.booking().cancel_reservation(first.id).await.unwrap();
    let again = app.booking().cancel_reservation(first.id).await.unwrap_err();
    assert_eq!(
        again,
        BookingError::Conflict(ConflictReason::AlreadyCancelled)
    );

    let updated = app
        .booking()
        .update_reservation_seats(first.id, 2)
        .await
        .unwrap_err();
    assert_eq!(
        updated,
        BookingError::Conflict(ConflictReason::AlreadyCancelled)
    );

    let schedule_now = app.catalog().get_schedule(schedule.id).await.unwrap();
    assert_eq!(schedule_now.available_seats, 6);

    println!("  ✅ Seats restored exactly once");
}

/// Reservations open thirty days ahead and not before.
#[tokio::test]
async fn test_booking_horizon() {
    println!("🧪 Booking horizon");

    let clock = manual_clock();
    let app = app_with(&clock);
    let train = colombo_kandy(&app, 50).await;
    let last_day = schedule_on(&app, &train, day(30)).await;
    let too_far = schedule_on(&app, &train, day(31)).await;
    register(&app, NIC).await;

    assert!(
        app.booking()
            .create_reservation(NIC, last_day.id, 1)
            .await
            .is_ok()
    );
    let refused = app
        .booking()
        .create_reservation(NIC, too_far.id, 1)
        .await
        .unwrap_err();
    assert_eq!(refused.kind(), ErrorKind::InvalidInput);

    clock.advance(Duration::days(1));
    assert!(
        app.booking()
            .create_reservation(NIC, too_far.id, 1)
            .await
            .is_ok()
    );

    println!("  ✅ Day 30 bookable, day 31 only from tomorrow");
}

/// Seat changes move exactly the difference.
#[tokio::test]
async fn test_update_seats_moves_delta() {
    println!("🧪 Update seats");

    let clock = manual_clock();
    let app = app_with(&clock);
    let train = colombo_kandy(&app, 5).await;
    let schedule = schedule_on(&app, &train, day(12)).await;
    register(&app, NIC).await;
    register(&app, "200012345678").await;

    let mine = app
        .booking()
        .create_reservation(NIC, schedule.id, 2)
        .await
        .unwrap();
    app.booking()
        .create_reservation("200012345678", schedule.id, 2)
        .await
        .unwrap();

    let refused = app
        .booking()
        .update_reservation_seats(mine.id, 4)
        .await
        .unwrap_err();
    assert_eq!(
        refused,
        BookingError::Conflict(ConflictReason::InsufficientSeats {
            requested: 2,
            available: 1,
        })
    );

    let grown = app
        .booking()
        .update_reservation_seats(mine.id, 3)
        .await
        .unwrap();
    assert_eq!(grown.seats, 3);
    assert_eq!(
        app.catalog().get_schedule(schedule.id).await.unwrap().available_seats,
        0
    );

    let shrunk = app
        .booking()
        .update_reservation_seats(mine.id, 1)
        .await
        .unwrap();
    assert_eq!(shrunk.seats, 1);
    assert_eq!(
        app.catalog().get_schedule(schedule.id).await.unwrap().available_seats,
        2
    );

    let out_of_range = app
        .booking()
        .update_reservation_seats(mine.id, 5)
        .await
        .unwrap_err();
    assert_eq!(out_of_range.kind(), ErrorKind::InvalidInput);

    println!("  ✅ Counter follows every change");
}

/// Inactive travelers and unknown references are refused.
#[tokio::test]
async fn test_booking_preconditions() {
    println!("🧪 Booking preconditions");

    let clock = manual_clock();
    let app = app_with(&clock);
    let train = colombo_kandy(&app, 50).await;
    let schedule = schedule_on(&app, &train, day(7)).await;

    let unknown = app
        .booking()
        .create_reservation(NIC, schedule.id, 1)
        .await
        .unwrap_err();
    assert!(matches!(
        unknown,
        BookingError::NotFound { resource: "traveler", .. }
    ));

    register(&app, NIC).await;
    app.travelers().set_active(NIC, false).await.unwrap();
    let inactive = app
        .booking()
        .create_reservation(NIC, schedule.id, 1)
        .await
        .unwrap_err();
    assert_eq!(
        inactive,
        BookingError::Conflict(ConflictReason::TravelerInactive)
    );

    app.travelers().set_active(NIC, true).await.unwrap();
    let missing_schedule = app
        .booking()
        .create_reservation(NIC, railway::ScheduleId::new(), 1)
        .await
        .unwrap_err();
    assert!(matches!(
        missing_schedule,
        BookingError::NotFound { resource: "schedule", .. }
    ));

    clock.advance(Duration::days(8));
    let departed = app
        .booking()
        .create_reservation(NIC, schedule.id, 1)
        .await
        .unwrap_err();
    assert_eq!(
        departed,
        BookingError::Conflict(ConflictReason::ScheduleDeparted)
    );

    println!("  ✅ Preconditions enforced");
}
