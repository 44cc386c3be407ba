//! Traveler registry and reservation history.
//!
//! Run with: `cargo test --test traveler_registry_test`

#![allow(clippy::expect_used)]
#![allow(clippy::unwrap_used)]

use chrono::{Duration, NaiveDate, NaiveTime};
use railway::{
    BookingError, Config, ConflictReason, ErrorKind, Money, NewSchedule, NewTrain, NewTraveler,
    RailwayApp, Schedule, ScheduleId, TrainType, Traveler,
};
use railway_core::environment::Clock;
use railway_testing::{ManualClock, test_clock};
use std::sync::Arc;

fn day(offset: i64) -> NaiveDate {
    test_clock().today() + Duration::days(offset)
}

fn traveler(nic: &str, name: &str) -> NewTraveler {
    NewTraveler {
        nic: nic.to_string(),
        name: name.to_string(),
        email: format!("{}@example.com", name.to_lowercase().replace(' ', ".")),
        contact_no: "+94770000000".to_string(),
    }
}

fn app_with(clock: &ManualClock) -> RailwayApp {
    RailwayApp::in_memory(&Config::default(), Arc::new(clock.clone()))
}

async fn schedules_on(app: &RailwayApp, dates: &[NaiveDate]) -> Vec<Schedule> {
    let train = app
        .catalog()
        .create_train(NewTrain {
            name: "Uttara Devi".to_string(),
            train_type: TrainType::InterCity,
            capacity: 20,
            departure_station: "Colombo".to_string(),
            arrival_station: "Kankesanthurai".to_string(),
        })
        .await
        .unwrap();

    let mut schedules = Vec::new();
    for date in dates {
        let schedule = app
            .catalog()
            .add_schedule(NewSchedule {
                train_id: train.id,
                date: *date,
                departure_time: NaiveTime::from_hms_opt(11, 50, 0).unwrap(),
                arrival_time: NaiveTime::from_hms_opt(19, 30, 0).unwrap(),
                price: Money::from_cents(210_000),
            })
            .await
            .unwrap();
        schedules.push(schedule);
    }
    schedules
}

#[tokio::test]
async fn test_register_and_lookup_any_case() {
    println!("🧪 Register a traveler");

    let app = RailwayApp::in_memory(&Config::default(), Arc::new(test_clock()));
    let registered = app
        .travelers()
        .register(traveler(" 853456789x ", "  Tharushi Fernando "))
        .await
        .unwrap();
    assert_eq!(registered.nic.as_str(), "853456789X");
    assert_eq!(registered.name, "Tharushi Fernando");
    assert!(registered.is_active);
    assert!(registered.reservation_ids.is_empty());

    let profile = app.travelers().get_traveler("853456789x").await.unwrap();
    assert_eq!(profile.traveler, registered);
    assert!(profile.upcoming.is_empty());

    println!("  ✅ NIC normalized to upper case");
}

#[tokio::test]
async fn test_register_rejections() {
    println!("🧪 Refused registrations");

    let app = RailwayApp::in_memory(&Config::default(), Arc::new(test_clock()));
    app.travelers()
        .register(traveler("991234567V", "Nimali Perera"))
        .await
        .unwrap();

    let duplicate = app
        .travelers()
        .register(traveler("991234567v", "Someone Else"))
        .await
        .unwrap_err();
    assert!(matches!(
        duplicate,
        BookingError::Conflict(ConflictReason::AlreadyExists { resource: "traveler", .. })
    ));

    let invalid = [
        ("", "Nimali Perera"),
        ("99 1234567V", "Nimali"),
        ("200012345678", "  "),
    ];
    for (nic, name) in invalid {
        let refused = app.travelers().register(traveler(nic, name)).await.unwrap_err();
        assert_eq!(refused.kind(), ErrorKind::InvalidInput, "{nic:?}/{name:?}");
    }

    let unknown = app.travelers().get_traveler("000000000V").await.unwrap_err();
    assert_eq!(unknown.kind(), ErrorKind::NotFound);

    println!("  ✅ Duplicates and blanks refused");
}

#[tokio::test]
async fn test_list_travelers_by_activity() {
    println!("🧪 List travelers");

    let app = RailwayApp::in_memory(&Config::default(), Arc::new(test_clock()));
    for (nic, name) in [
        ("200012345678", "Amal Jayasinghe"),
        ("853456789X", "Tharushi Fernando"),
        ("991234567V", "Nimali Perera"),
    ] {
        app.travelers().register(traveler(nic, name)).await.unwrap();
    }

    let deactivated = app.travelers().set_active("853456789X", false).await.unwrap();
    assert!(!deactivated.is_active);

    let nics = |travelers: Vec<Traveler>| -> Vec<String> {
        travelers
            .into_iter()
            .map(|traveler| traveler.nic.as_str().to_string())
            .collect()
    };
    assert_eq!(
        nics(app.travelers().list_travelers(None).await.unwrap()),
        vec!["200012345678", "853456789X", "991234567V"]
    );
    assert_eq!(
        nics(app.travelers().list_travelers(Some(true)).await.unwrap()),
        vec!["200012345678", "991234567V"]
    );
    assert_eq!(
        nics(app.travelers().list_travelers(Some(false)).await.unwrap()),
        vec!["853456789X"]
    );

    println!("  ✅ Filtered and ordered by NIC");
}

#[tokio::test]
async fn test_inactive_traveler_cannot_book() {
    println!("🧪 Inactive traveler");

    let clock = ManualClock::new(test_clock().now());
    let app = app_with(&clock);
    let schedules = schedules_on(&app, &[day(9)]).await;
    app.travelers()
        .register(traveler("991234567V", "Nimali Perera"))
        .await
        .unwrap();
    app.travelers().set_active("991234567V", false).await.unwrap();

    let refused = app
        .booking()
        .create_reservation("991234567V", schedules[0].id, 1)
        .await
        .unwrap_err();
    assert_eq!(refused, BookingError::Conflict(ConflictReason::TravelerInactive));
    assert_eq!(
        app.catalog().get_schedule(schedules[0].id).await.unwrap().available_seats,
        20
    );

    app.travelers().set_active("991234567V", true).await.unwrap();
    app.booking()
        .create_reservation("991234567V", schedules[0].id, 1)
        .await
        .unwrap();

    println!("  ✅ Reactivated traveler books again");
}

#[tokio::test]
async fn test_inactive_traveler_unknown_schedule_is_not_found() {
    println!("🧪 Inactive traveler, unknown schedule");

    let app = RailwayApp::in_memory(&Config::default(), Arc::new(test_clock()));
    app.travelers()
        .register(traveler("991234567V", "Nimali Perera"))
        .await
        .unwrap();
    app.travelers().set_active("991234567V", false).await.unwrap();

    let refused = app
        .booking()
        .create_reservation("991234567V", ScheduleId::new(), 1)
        .await
        .unwrap_err();
    assert!(matches!(
        refused,
        BookingError::NotFound { resource: "schedule", .. }
    ));

    println!("  ✅ Missing schedule reported before inactivity");
}

#[tokio::test]
async fn test_reservation_history_ordering() {
    println!("🧪 Upcoming and past reservations");

    let clock = ManualClock::new(test_clock().now());
    let app = app_with(&clock);
    let schedules = schedules_on(&app, &[day(7), day(9), day(25), day(15)]).await;
    app.travelers()
        .register(traveler("991234567V", "Nimali Perera"))
        .await
        .unwrap();

    let mut booked = Vec::new();
    for schedule in &schedules {
        let reservation = app
            .booking()
            .create_reservation("991234567v", schedule.id, 1)
            .await
            .unwrap();
        booked.push(reservation);
    }
    app.booking().cancel_reservation(booked[3].id).await.unwrap();

    // Cancelled reservations are not upcoming
    let profile = app.travelers().get_traveler("991234567V").await.unwrap();
    let dates: Vec<NaiveDate> = profile
        .upcoming
        .iter()
        .map(|reservation| reservation.reservation_date)
        .collect();
    assert_eq!(dates, vec![day(7), day(9), day(25)]);
    assert_eq!(profile.traveler.reservation_ids.len(), 3);

    clock.advance(Duration::days(10));

    let history = app
        .booking()
        .list_traveler_reservations("991234567V")
        .await
        .unwrap();
    let upcoming: Vec<NaiveDate> = history
        .upcoming
        .iter()
        .map(|reservation| reservation.reservation_date)
        .collect();
    let past: Vec<NaiveDate> = history
        .past
        .iter()
        .map(|reservation| reservation.reservation_date)
        .collect();
    assert_eq!(upcoming, vec![day(15), day(25)]);
    assert_eq!(past, vec![day(9), day(7)]);
    assert!(history.upcoming[0].is_cancelled);

    let profile = app.travelers().get_traveler("991234567V").await.unwrap();
    assert_eq!(profile.upcoming.len(), 1);

    println!("  ✅ Upcoming ascending, past most recent first");
}
