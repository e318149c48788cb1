//! Handler flows that need a real PostgreSQL. Each test gets a fresh
//! database from `#[sqlx::test]`, migrated with the embedded schema.
//!
//! Run with `DATABASE_URL=postgres://... cargo test -- --ignored`.

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use chelal_server::auth::TokenType;
use chelal_server::handlers::inventory::LOW_STOCK_NOTIFICATION;
use chelal_server::{create_app, AppConfig, ChelalServer};
use chrono::{Duration, NaiveDate, Utc};
use serde_json::{json, Value};
use sqlx::PgPool;
use tower::ServiceExt;

fn server_for(pool: PgPool) -> ChelalServer {
    let mut config = AppConfig::default();
    config.auth.jwt_secret = "database-test-secret".to_string();
    config.pharmacy.low_stock_threshold = 10;
    ChelalServer::new_with_pool(config, pool)
}

fn token_for(server: &ChelalServer, user_id: i64, role: &str) -> String {
    server
        .jwt
        .issue(user_id, "tester", Some(role), TokenType::Access)
        .expect("token")
}

async fn send(app: Router, method: Method, uri: &str, bearer: &str, body: Option<Value>) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", bearer));
    let request = match body {
        Some(body) => request
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string())),
        None => request.body(Body::empty()),
    }
    .unwrap();

    let response = app.oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
}

async fn add_user(pool: &PgPool, username: &str, role: Option<&str>, active: bool) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO users (username, password_hash, role_id, is_active)
        VALUES ($1, 'not-a-real-hash', (SELECT id FROM roles WHERE name = $2), $3)
        RETURNING id
        "#,
    )
    .bind(username)
    .bind(role)
    .bind(active)
    .fetch_one(pool)
    .await
    .unwrap()
}

async fn add_patient(pool: &PgPool) -> i64 {
    sqlx::query_scalar(
        r#"
        INSERT INTO patients (unique_id, first_name, last_name, date_of_birth, gender)
        VALUES ('K7Q2M9XA', 'Amina', 'Wanjiru', '1988-04-12', 'Female')
        RETURNING id
        "#,
    )
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Patient, encounter and prescription written by `doctor_id`.
async fn add_prescription(pool: &PgPool, doctor_id: i64) -> i64 {
    let patient_id = add_patient(pool).await;
    let encounter_id: i64 = sqlx::query_scalar(
        "INSERT INTO encounters (patient_id, doctor_id, notes) VALUES ($1, $2, 'Fever') RETURNING id",
    )
    .bind(patient_id)
    .bind(doctor_id)
    .fetch_one(pool)
    .await
    .unwrap();

    sqlx::query_scalar(
        r#"
        INSERT INTO prescriptions (encounter_id, medication_name, dosage, frequency)
        VALUES ($1, 'Amoxicillin', '500mg', 'TDS')
        RETURNING id
        "#,
    )
    .bind(encounter_id)
    .fetch_one(pool)
    .await
    .unwrap()
}

/// Item with one batch per `(batch_number, days_to_expiry, quantity)`.
async fn add_item(pool: &PgPool, name: &str, batches: &[(&str, i64, i32)]) -> i64 {
    let total: i64 = batches.iter().map(|(_, _, qty)| i64::from(*qty)).sum();
    let item_id: i64 = sqlx::query_scalar(
        "INSERT INTO inventory_items (name, total_quantity) VALUES ($1, $2) RETURNING id",
    )
    .bind(name)
    .bind(total)
    .fetch_one(pool)
    .await
    .unwrap();

    let today = Utc::now().date_naive();
    for (number, days, qty) in batches {
        sqlx::query(
            r#"
            INSERT INTO stock_batches
                (inventory_item_id, batch_number, expiry_date, initial_quantity, current_quantity)
            VALUES ($1, $2, $3, $4, $4)
            "#,
        )
        .bind(item_id)
        .bind(*number)
        .bind(today + Duration::days(*days))
        .bind(*qty)
        .execute(pool)
        .await
        .unwrap();
    }
    item_id
}

async fn batch_quantity(pool: &PgPool, batch_number: &str) -> i32 {
    sqlx::query_scalar("SELECT current_quantity FROM stock_batches WHERE batch_number = $1")
        .bind(batch_number)
        .fetch_one(pool)
        .await
        .unwrap()
}

async fn count(pool: &PgPool, sql: &str) -> i64 {
    sqlx::query_scalar(sql).fetch_one(pool).await.unwrap()
}

#[sqlx::test(migrator = "database_layer::MIGRATOR")]
#[ignore = "needs DATABASE_URL"]
async fn dispense_draws_from_the_earliest_expiring_batch(pool: PgPool) {
    let doctor = add_user(&pool, "dr.otieno", Some("Doctor"), true).await;
    let pharmacist = add_user(&pool, "rx.kamau", Some("Pharmacist"), true).await;
    let prescription = add_prescription(&pool, doctor).await;
    let item = add_item(&pool, "Amoxicillin 500mg", &[("AMX-LATE", 90, 50), ("AMX-SOON", 30, 5)]).await;

    let server = server_for(pool.clone());
    let bearer = token_for(&server, pharmacist, "Pharmacist");
    let (status, body) = send(
        create_app(server),
        Method::POST,
        &format!("/api/inventory/{}/dispense", item),
        &bearer,
        Some(json!({ "prescription_id": prescription, "quantity": 3 })),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["batch"], "AMX-SOON");
    assert_eq!(body["data"]["remaining"], 2);
    assert_eq!(body["data"]["item_total"], 52);

    assert_eq!(batch_quantity(&pool, "AMX-SOON").await, 2);
    assert_eq!(batch_quantity(&pool, "AMX-LATE").await, 50);
    let dispensed_by: Option<i64> = sqlx::query_scalar("SELECT dispensed_by FROM dispensing_logs")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(dispensed_by, Some(pharmacist));
}

#[sqlx::test(migrator = "database_layer::MIGRATOR")]
#[ignore = "needs DATABASE_URL"]
async fn insufficient_stock_leaves_batches_and_logs_untouched(pool: PgPool) {
    let doctor = add_user(&pool, "dr.otieno", Some("Doctor"), true).await;
    let pharmacist = add_user(&pool, "rx.kamau", Some("Pharmacist"), true).await;
    let prescription = add_prescription(&pool, doctor).await;
    let item = add_item(&pool, "Metformin 850mg", &[("MET-A", 30, 5), ("MET-B", 60, 8)]).await;

    let server = server_for(pool.clone());
    let bearer = token_for(&server, pharmacist, "Pharmacist");
    let (status, body) = send(
        create_app(server),
        Method::POST,
        &format!("/api/inventory/{}/dispense", item),
        &bearer,
        Some(json!({ "prescription_id": prescription, "quantity": 9 })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error_type"], "insufficient_stock");
    assert_eq!(batch_quantity(&pool, "MET-A").await, 5);
    assert_eq!(batch_quantity(&pool, "MET-B").await, 8);
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM dispensing_logs").await, 0);
    assert_eq!(
        count(&pool, "SELECT total_quantity FROM inventory_items").await,
        13
    );
}

#[sqlx::test(migrator = "database_layer::MIGRATOR")]
#[ignore = "needs DATABASE_URL"]
async fn low_stock_alert_reaches_active_admins_and_pharmacists(pool: PgPool) {
    let doctor = add_user(&pool, "dr.otieno", Some("Doctor"), true).await;
    let pharmacist = add_user(&pool, "rx.kamau", Some("Pharmacist"), true).await;
    let admin = add_user(&pool, "admin", Some("Admin"), true).await;
    add_user(&pool, "rx.retired", Some("Pharmacist"), false).await;
    add_user(&pool, "nurse.achieng", Some("Nurse"), true).await;
    add_user(&pool, "no.role", None, true).await;
    let prescription = add_prescription(&pool, doctor).await;
    let item = add_item(&pool, "Paracetamol 500mg", &[("PCM-1", 120, 12)]).await;

    let server = server_for(pool.clone());
    let bearer = token_for(&server, pharmacist, "Pharmacist");
    let (status, body) = send(
        create_app(server),
        Method::POST,
        &format!("/api/inventory/{}/dispense", item),
        &bearer,
        Some(json!({ "prescription_id": prescription, "quantity": 5 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["item_total"], 7);

    let recipients: Vec<i64> =
        sqlx::query_scalar("SELECT user_id FROM notifications WHERE type = $1 ORDER BY user_id")
            .bind(LOW_STOCK_NOTIFICATION)
            .fetch_all(&pool)
            .await
            .unwrap();
    let mut expected = vec![pharmacist, admin];
    expected.sort_unstable();
    assert_eq!(recipients, expected);
}

#[sqlx::test(migrator = "database_layer::MIGRATOR")]
#[ignore = "needs DATABASE_URL"]
async fn appointment_doctor_must_hold_the_doctor_role(pool: PgPool) {
    let receptionist = add_user(&pool, "front.desk", Some("Receptionist"), true).await;
    let nurse = add_user(&pool, "nurse.achieng", Some("Nurse"), true).await;
    let doctor = add_user(&pool, "dr.otieno", Some("Doctor"), true).await;
    let patient = add_patient(&pool).await;
    let date = NaiveDate::from_ymd_opt(2026, 11, 2).unwrap();

    let server = server_for(pool.clone());
    let bearer = token_for(&server, receptionist, "Receptionist");
    let booking = |doctor_id: i64| {
        json!({ "patient_id": patient, "doctor_id": doctor_id, "date": date, "time": "09:30:00" })
    };

    let (status, body) = send(
        create_app(server.clone()),
        Method::POST,
        "/api/appointments",
        &bearer,
        Some(booking(nurse)),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "Selected user is not a doctor.");
    assert_eq!(count(&pool, "SELECT COUNT(*) FROM appointments").await, 0);

    let (status, body) = send(
        create_app(server),
        Method::POST,
        "/api/appointments",
        &bearer,
        Some(booking(doctor)),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    assert_eq!(body["data"]["status"], "scheduled");
}

#[sqlx::test(migrator = "database_layer::MIGRATOR")]
#[ignore = "needs DATABASE_URL"]
async fn approving_a_role_change_moves_the_user_and_closes_the_request(pool: PgPool) {
    let admin = add_user(&pool, "admin", Some("Admin"), true).await;
    let requester = add_user(&pool, "new.staff", Some("Patient"), true).await;
    let request_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO role_change_requests (user_id, requested_role_id, reason)
        VALUES ($1, (SELECT id FROM roles WHERE name = 'Nurse'), 'Joined the ward team')
        RETURNING id
        "#,
    )
    .bind(requester)
    .fetch_one(&pool)
    .await
    .unwrap();

    let server = server_for(pool.clone());
    let bearer = token_for(&server, admin, "Admin");
    let uri = format!("/api/role-change-requests/{}/approve", request_id);
    let (status, body) = send(create_app(server.clone()), Method::POST, &uri, &bearer, None).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "approved");
    assert_eq!(body["data"]["reviewed_by"], admin);

    let role: String = sqlx::query_scalar(
        "SELECT r.name FROM users u JOIN roles r ON r.id = u.role_id WHERE u.id = $1",
    )
    .bind(requester)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(role, "Nurse");
    assert_eq!(
        count(&pool, "SELECT COUNT(*) FROM notifications WHERE type = 'role_change'").await,
        1
    );

    let (status, _) = send(create_app(server), Method::POST, &uri, &bearer, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[sqlx::test(migrator = "database_layer::MIGRATOR")]
#[ignore = "needs DATABASE_URL"]
async fn rejecting_a_role_change_keeps_the_current_role(pool: PgPool) {
    let admin = add_user(&pool, "admin", Some("Admin"), true).await;
    let requester = add_user(&pool, "new.staff", Some("Patient"), true).await;
    let request_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO role_change_requests (user_id, requested_role_id, reason)
        VALUES ($1, (SELECT id FROM roles WHERE name = 'Admin'), 'Please')
        RETURNING id
        "#,
    )
    .bind(requester)
    .fetch_one(&pool)
    .await
    .unwrap();

    let server = server_for(pool.clone());
    let bearer = token_for(&server, admin, "Admin");
    let (status, body) = send(
        create_app(server),
        Method::POST,
        &format!("/api/role-change-requests/{}/reject", request_id),
        &bearer,
        Some(json!({ "review_notes": "Not eligible" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["data"]["status"], "rejected");

    let role: String = sqlx::query_scalar(
        "SELECT r.name FROM users u JOIN roles r ON r.id = u.role_id WHERE u.id = $1",
    )
    .bind(requester)
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(role, "Patient");
}
