mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use chrono::{Duration, NaiveDate, NaiveTime};
use proptest::prelude::*;
use uuid::Uuid;

use appointment_cell::models::{
    Appointment, AppointmentError, AppointmentStatus, BookingCandidate, OperatingWindow, SlotState,
};
use appointment_cell::services::conflict::{classify_slots, intervals_overlap, validate_booking};
use appointment_cell::services::slots::generate_slots;

use common::{appointment, at, service, window, InMemoryStore};

#[test]
fn test_full_day_grid() {
    let slots = generate_slots(&window("08:00", "18:00", 30), 30).unwrap();

    assert_eq!(slots.len(), 20);
    assert_eq!(slots.first().unwrap().start_time, at("08:00"));
    assert_eq!(slots.last().unwrap().start_time, at("17:30"));
    assert_eq!(slots.last().unwrap().end_time, at("18:00"));
    assert!(slots.iter().all(|slot| slot.is_available()));
}

#[test]
fn test_partial_trailing_slot_is_excluded() {
    let slots = generate_slots(&window("08:00", "08:50", 30), 30).unwrap();

    assert_eq!(slots.len(), 1);
    assert_eq!(slots[0].start_time, at("08:00"));
    assert_eq!(slots[0].end_time, at("08:30"));
}

#[test]
fn test_generation_is_deterministic() {
    let window = window("09:00", "12:15", 15);
    assert_eq!(generate_slots(&window, 40).unwrap(), generate_slots(&window, 40).unwrap());
}

#[test]
fn test_closed_window_is_rejected() {
    assert_matches!(
        generate_slots(&window("12:00", "12:00", 30), 30),
        Err(AppointmentError::InvalidWindowConfig(_))
    );
}

#[tokio::test]
async fn test_existing_booking_occupies_overlapping_slots() {
    let provider = Uuid::new_v4();
    let store = Arc::new(InMemoryStore::new());
    let booked = store.seed(appointment(Some(provider), at("09:00"), 60, AppointmentStatus::Confirmed));

    let availability = service(store.clone())
        .day_availability(&window("08:00", "18:00", 30), Some(provider), 30)
        .await
        .unwrap();

    let state_at = |hhmm: &str| {
        availability.slots.iter().find(|slot| slot.start_time == at(hhmm)).unwrap().state.clone()
    };

    assert_eq!(state_at("08:30"), SlotState::Available);
    assert_eq!(state_at("09:00"), SlotState::Occupied { appointment_id: booked.id });
    assert_eq!(state_at("09:30"), SlotState::Occupied { appointment_id: booked.id });
    assert_eq!(state_at("10:00"), SlotState::Available);
    assert_eq!(availability.available_slots().count(), 18);
}

#[tokio::test]
async fn test_other_providers_and_any_provider_see_free_grid() {
    let provider = Uuid::new_v4();
    let store = Arc::new(InMemoryStore::new());
    store.seed(appointment(Some(provider), at("09:00"), 60, AppointmentStatus::Scheduled));
    let service = service(store);
    let window = window("08:00", "12:00", 30);

    let other = service.day_availability(&window, Some(Uuid::new_v4()), 30).await.unwrap();
    assert_eq!(other.available_slots().count(), 8);

    let any = service.day_availability(&window, None, 30).await.unwrap();
    assert_eq!(any.available_slots().count(), 8);
}

#[test]
fn test_cancelled_and_blocked_time() {
    let provider = Uuid::new_v4();
    let appointments = vec![
        appointment(Some(provider), at("08:00"), 30, AppointmentStatus::Cancelled),
        appointment(Some(provider), at("12:00"), 60, AppointmentStatus::Blocked),
    ];
    let slots = generate_slots(&window("08:00", "14:00", 30), 30).unwrap();

    let tagged = classify_slots(slots, &appointments, Some(provider));

    assert!(tagged[0].is_available());
    let lunch: Vec<_> = tagged.iter().filter(|slot| !slot.is_available()).collect();
    assert_eq!(lunch.len(), 2);
    assert_eq!(lunch[0].start_time, at("12:00"));
    assert_eq!(lunch[1].start_time, at("12:30"));
}

fn any_window() -> impl Strategy<Value = OperatingWindow> {
    (0u32..20, 0u32..4, 1u32..600, prop::sample::select(vec![5, 10, 15, 20, 30, 45, 60]))
        .prop_map(|(open_hour, open_quarter, length, granularity)| {
            let open = NaiveTime::from_hms_opt(open_hour, open_quarter * 15, 0).unwrap();
            let close_minutes = (open_hour * 60 + open_quarter * 15 + length).min(24 * 60 - 1);
            let close = NaiveTime::from_hms_opt(close_minutes / 60, close_minutes % 60, 0).unwrap();
            OperatingWindow {
                clinic_id: Uuid::nil(),
                date: NaiveDate::from_ymd_opt(2025, 3, 3).unwrap(),
                open_time: open,
                close_time: close,
                slot_granularity_minutes: granularity,
            }
        })
        .prop_filter("window must be open", |w| w.open_time < w.close_time)
}

proptest! {
    #[test]
    fn prop_slots_never_overlap_and_stay_in_window(window in any_window(), duration in 5i32..240) {
        let slots = generate_slots(&window, duration).unwrap();
        let granularity = Duration::minutes(window.slot_granularity_minutes as i64);

        for slot in &slots {
            prop_assert_eq!(slot.end_time - slot.start_time, Duration::minutes(duration as i64));
            prop_assert!(slot.start_time >= window.opens_at());
            prop_assert!(slot.end_time <= window.closes_at());

            let offset = slot.start_time - window.opens_at();
            prop_assert_eq!(offset.num_minutes() % granularity.num_minutes(), 0);
        }

        for pair in slots.windows(2) {
            prop_assert!(pair[0].start_time < pair[1].start_time);
            prop_assert!(pair[0].end_time <= pair[1].start_time);
        }
    }

    #[test]
    fn prop_booked_slots_are_never_offered(
        booked_start in 0i64..20,
        booked_length in 1i32..5,
    ) {
        let provider = Uuid::new_v4();
        let window = window("08:00", "18:00", 30);
        let booked = appointment(
            Some(provider),
            window.opens_at() + Duration::minutes(booked_start * 30),
            booked_length * 30,
            AppointmentStatus::Scheduled,
        );

        let slots = classify_slots(generate_slots(&window, 30).unwrap(), &[booked.clone()], Some(provider));

        for slot in slots.iter().filter(|slot| slot.is_available()) {
            prop_assert!(slot.end_time <= booked.scheduled_start || slot.start_time >= booked.scheduled_end());
        }
    }

    #[test]
    fn prop_accepted_bookings_never_overlap(
        requests in prop::collection::vec((0i64..600, 5i32..120), 1..40),
    ) {
        let provider = Uuid::new_v4();
        let mut accepted: Vec<Appointment> = Vec::new();

        for (offset, minutes) in requests {
            let candidate = BookingCandidate {
                appointment_id: None,
                provider_id: Some(provider),
                scheduled_start: at("08:00") + Duration::minutes(offset),
                duration_minutes: minutes,
            };
            if validate_booking(&candidate, &accepted).is_ok() {
                accepted.push(appointment(Some(provider), candidate.scheduled_start, minutes, AppointmentStatus::Scheduled));
            }
        }

        for (i, a) in accepted.iter().enumerate() {
            for b in accepted.iter().skip(i + 1) {
                prop_assert!(!intervals_overlap(a.scheduled_start, a.scheduled_end(), b.scheduled_start, b.scheduled_end()));
            }
        }
    }
}
