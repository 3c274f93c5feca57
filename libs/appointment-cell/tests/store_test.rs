use std::sync::Arc;
use std::time::Duration as StdDuration;

use assert_matches::assert_matches;
use chrono::{DateTime, Utc};
use serde_json::json;
use uuid::Uuid;
use wiremock::{MockServer, Mock, ResponseTemplate};
use wiremock::matchers::{body_partial_json, header, method, path, query_param};

use appointment_cell::models::{
    AppointmentError, AppointmentPatch, AppointmentSearchQuery, AppointmentStatus,
    BookAppointmentRequest,
};
use appointment_cell::services::{
    AppointmentBookingService, AppointmentStore, ProviderLocks, SupabaseAppointmentStore,
};
use shared_database::supabase::SupabaseClient;
use shared_utils::test_utils::{MockSupabaseResponses, TestConfig};

fn at(hhmm: &str) -> DateTime<Utc> {
    format!("2025-03-03T{}:00Z", hhmm).parse().unwrap()
}

fn store_for(server: &MockServer) -> SupabaseAppointmentStore {
    let config = TestConfig::with_supabase_url(&server.uri()).to_app_config();
    SupabaseAppointmentStore::new(Arc::new(SupabaseClient::new(&config)), "user-token")
}

#[tokio::test]
async fn test_list_filters_by_provider() {
    let server = MockServer::start().await;
    let provider = Uuid::new_v4();
    let patient = Uuid::new_v4().to_string();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("provider_id", format!("eq.{}", provider)))
        .and(header("authorization", "Bearer user-token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(Uuid::new_v4(), &patient, Some(&provider.to_string()), at("09:00"), 30, "booked"),
            MockSupabaseResponses::appointment_row(Uuid::new_v4(), &patient, Some(&provider.to_string()), at("10:00"), 45, "in_procedure"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let rows = store_for(&server)
        .list(&AppointmentSearchQuery::provider_range(provider, at("08:00"), at("18:00")))
        .await
        .unwrap();

    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].status, AppointmentStatus::Scheduled);
    assert_eq!(rows[1].status, AppointmentStatus::InProgress);
    assert_eq!(rows[1].scheduled_end(), at("10:45"));
}

#[tokio::test]
async fn test_get_missing_row_is_not_found() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;

    assert_matches!(store_for(&server).get(Uuid::new_v4()).await, Err(AppointmentError::NotFound));
}

#[tokio::test]
async fn test_update_patches_status_with_representation() {
    let server = MockServer::start().await;
    let id = Uuid::new_v4();

    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("id", format!("eq.{}", id)))
        .and(query_param("status", "in.(confirmed)"))
        .and(header("prefer", "return=representation"))
        .and(body_partial_json(json!({ "status": "checked_in" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(id, &Uuid::new_v4().to_string(), None, at("09:00"), 30, "checked_in"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let patch = AppointmentPatch {
        status: Some(AppointmentStatus::CheckedIn),
        ..AppointmentPatch::default()
    };
    let updated = store_for(&server)
        .update(id, &[AppointmentStatus::Confirmed], patch)
        .await
        .unwrap()
        .unwrap();

    assert_eq!(updated.id, id);
    assert_eq!(updated.status, AppointmentStatus::CheckedIn);
}

#[tokio::test]
async fn test_update_guarded_by_stale_status_matches_nothing() {
    let server = MockServer::start().await;
    Mock::given(method("PATCH"))
        .and(path("/rest/v1/appointments"))
        .and(query_param("status", "in.(checked_in,checked-in,arrived)"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .expect(1)
        .mount(&server)
        .await;

    let patch = AppointmentPatch {
        status: Some(AppointmentStatus::InProgress),
        ..AppointmentPatch::default()
    };
    let result = store_for(&server)
        .update(Uuid::new_v4(), &[AppointmentStatus::CheckedIn], patch)
        .await;

    assert_matches!(result, Ok(None));
}

#[tokio::test]
async fn test_constraint_refusal_names_the_winning_booking() {
    let server = MockServer::start().await;
    let provider = Uuid::new_v4();
    let winner = Uuid::new_v4();

    // first read is clean; the other process commits before our insert
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .up_to_n_times(1)
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(winner, &Uuid::new_v4().to_string(), Some(&provider.to_string()), at("09:00"), 30, "scheduled"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(409).set_body_json(json!({
            "code": "23P01",
            "message": "conflicting key value violates exclusion constraint \"appointments_no_provider_overlap\""
        })))
        .expect(1)
        .mount(&server)
        .await;

    let service = AppointmentBookingService::new(Arc::new(store_for(&server)), ProviderLocks::new(), StdDuration::from_secs(2));
    let result = service
        .create_appointment(BookAppointmentRequest {
            clinic_id: None,
            patient_id: Uuid::new_v4(),
            provider_id: Some(provider),
            scheduled_start: at("09:00"),
            duration_minutes: 30,
            priority: None,
            notes: None,
        })
        .await;

    assert_matches!(result, Err(AppointmentError::Conflict { appointment_id }) if appointment_id == winner);
}

#[tokio::test]
async fn test_backend_error_is_remote_unavailable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503).set_body_json(MockSupabaseResponses::error_response("down", "503")))
        .mount(&server)
        .await;

    let result = store_for(&server).list(&AppointmentSearchQuery::default()).await;
    assert_matches!(result, Err(AppointmentError::RemoteUnavailable(_)));
}

#[tokio::test]
async fn test_conflicting_booking_never_reaches_insert() {
    let server = MockServer::start().await;
    let provider = Uuid::new_v4();
    let existing = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            MockSupabaseResponses::appointment_row(existing, &Uuid::new_v4().to_string(), Some(&provider.to_string()), at("09:00"), 60, "confirmed"),
        ])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([])))
        .expect(0)
        .mount(&server)
        .await;

    let service = AppointmentBookingService::new(Arc::new(store_for(&server)), ProviderLocks::new(), StdDuration::from_secs(2));
    let result = service
        .create_appointment(BookAppointmentRequest {
            clinic_id: None,
            patient_id: Uuid::new_v4(),
            provider_id: Some(provider),
            scheduled_start: at("09:15"),
            duration_minutes: 30,
            priority: None,
            notes: None,
        })
        .await;

    assert_matches!(result, Err(AppointmentError::Conflict { appointment_id }) if appointment_id == existing);
}

#[tokio::test]
async fn test_insert_writes_scheduled_row() {
    let server = MockServer::start().await;
    let provider = Uuid::new_v4();
    let patient = Uuid::new_v4();
    let created = Uuid::new_v4();

    Mock::given(method("GET"))
        .and(path("/rest/v1/appointments"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
        .mount(&server)
        .await;
    Mock::given(method("POST"))
        .and(path("/rest/v1/appointments"))
        .and(header("prefer", "return=representation"))
        .and(body_partial_json(json!({
            "status": "scheduled",
            "scheduled_end": "2025-03-03T09:30:00+00:00"
        })))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!([
            MockSupabaseResponses::appointment_row(created, &patient.to_string(), Some(&provider.to_string()), at("09:00"), 30, "scheduled"),
        ])))
        .expect(1)
        .mount(&server)
        .await;

    let service = AppointmentBookingService::new(Arc::new(store_for(&server)), ProviderLocks::new(), StdDuration::from_secs(2));
    let appointment = service
        .create_appointment(BookAppointmentRequest {
            clinic_id: None,
            patient_id: patient,
            provider_id: Some(provider),
            scheduled_start: at("09:00"),
            duration_minutes: 30,
            priority: None,
            notes: None,
        })
        .await
        .unwrap();

    assert_eq!(appointment.id, created);
}
