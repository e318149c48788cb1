//! Dashboard and report endpoints
//!
//! Everything here is an aggregate query; no rows are written.

use axum::{extract::State, Json};
use chrono::{NaiveDate, Utc};
use pharmacy_service::StockBatch;
use rust_decimal::Decimal;
use serde::Serialize;
use sqlx::{FromRow, PgPool};
use utoipa::ToSchema;

use crate::auth::policy;
use crate::error::{api_success, ApiResponse, ApiResult};
use crate::handlers::appointments::Appointment;
use crate::handlers::inventory::near_expiry_batches;
use crate::handlers::medications::{below_reorder_level, Medication};
use crate::middleware::AuthContext;
use crate::server::ChelalServer;

const UPCOMING_APPOINTMENTS: i64 = 5;
const TOP_MEDICATIONS: i64 = 10;

#[derive(Debug, Serialize, ToSchema)]
pub struct SystemHealth {
    #[schema(example = "ok")]
    pub status: String,
    pub database: bool,
    pub version: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct Dashboard {
    pub total_patients: i64,
    pub today_appointments: i64,
    pub pending_bills: i64,
    #[schema(value_type = String)]
    pub total_revenue: Decimal,
    pub recent_appointments: Vec<Appointment>,
    pub system_health: SystemHealth,
    pub near_expiry_batches: Vec<StockBatch>,
    pub below_reorder_medications: Vec<Medication>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DashboardStats {
    pub total_patients: i64,
    pub total_appointments: i64,
    pub total_bills: i64,
    #[schema(value_type = String)]
    pub total_revenue: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PatientCountReport {
    pub patient_count: i64,
    pub report_date: NaiveDate,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AppointmentsToday {
    pub appointments: Vec<Appointment>,
    pub count: usize,
    pub date: NaiveDate,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct DoctorAppointmentCount {
    pub doctor_name: String,
    pub appointment_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AppointmentsByDoctor {
    pub appointments_by_doctor: Vec<DoctorAppointmentCount>,
}

#[derive(Debug, Serialize, FromRow, ToSchema)]
pub struct MedicationCount {
    pub medication_name: String,
    pub count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TopMedications {
    pub top_medications: Vec<MedicationCount>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BillingStats {
    #[schema(value_type = String)]
    pub total_revenue: Decimal,
    pub pending_bills_count: i64,
    #[schema(value_type = String)]
    pub pending_bills_amount: Decimal,
    #[schema(value_type = String)]
    pub collections_today: Decimal,
    pub report_date: NaiveDate,
}

async fn count(pool: &PgPool, sql: &str) -> ApiResult<i64> {
    Ok(sqlx::query_scalar::<_, i64>(sql).fetch_one(pool).await?)
}

async fn money(pool: &PgPool, sql: &str) -> ApiResult<Decimal> {
    Ok(sqlx::query_scalar::<_, Decimal>(sql).fetch_one(pool).await?)
}

async fn total_revenue(pool: &PgPool) -> ApiResult<Decimal> {
    money(pool, "SELECT COALESCE(SUM(amount), 0) FROM payments").await
}

async fn todays_appointments(pool: &PgPool) -> ApiResult<Vec<Appointment>> {
    Ok(sqlx::query_as::<_, Appointment>(
        "SELECT * FROM appointments WHERE date = CURRENT_DATE ORDER BY time",
    )
    .fetch_all(pool)
    .await?)
}

#[utoipa::path(
    get,
    path = "/api/dashboard",
    tag = "reports",
    responses(
        (status = 200, description = "Dashboard aggregates", body = Dashboard),
        (status = 401, description = "Missing or invalid token")
    ),
    security(("bearer_auth" = []))
)]
pub async fn dashboard(
    State(server): State<ChelalServer>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<Dashboard>>> {
    auth.require(&policy::REPORTS)?;
    let pool = &server.db_pool;

    let recent_appointments = sqlx::query_as::<_, Appointment>(
        r#"
        SELECT * FROM appointments
        WHERE date >= CURRENT_DATE AND status = 'scheduled'
        ORDER BY date, time
        LIMIT $1
        "#,
    )
    .bind(UPCOMING_APPOINTMENTS)
    .fetch_all(pool)
    .await?;

    let database = database_layer::is_healthy(pool).await;
    let dashboard = Dashboard {
        total_patients: count(pool, "SELECT COUNT(*) FROM patients").await?,
        today_appointments: count(pool, "SELECT COUNT(*) FROM appointments WHERE date = CURRENT_DATE").await?,
        pending_bills: count(pool, "SELECT COUNT(*) FROM bills WHERE NOT is_paid").await?,
        total_revenue: total_revenue(pool).await?,
        recent_appointments,
        system_health: SystemHealth {
            status: if database { "ok" } else { "degraded" }.to_string(),
            database,
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        near_expiry_batches: near_expiry_batches(&server, server.config.pharmacy.near_expiry_days).await?,
        below_reorder_medications: below_reorder_level(pool).await?,
    };
    Ok(Json(api_success(dashboard)))
}

/// `GET /dashboard-stats`
pub async fn dashboard_stats(
    State(server): State<ChelalServer>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<DashboardStats>>> {
    auth.require(&policy::REPORTS)?;
    let pool = &server.db_pool;

    Ok(Json(api_success(DashboardStats {
        total_patients: count(pool, "SELECT COUNT(*) FROM patients").await?,
        total_appointments: count(pool, "SELECT COUNT(*) FROM appointments").await?,
        total_bills: count(pool, "SELECT COUNT(*) FROM bills").await?,
        total_revenue: total_revenue(pool).await?,
    })))
}

/// `GET /report/patient-count`
pub async fn patient_count(
    State(server): State<ChelalServer>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<PatientCountReport>>> {
    auth.require(&policy::REPORTS)?;
    Ok(Json(api_success(PatientCountReport {
        patient_count: count(&server.db_pool, "SELECT COUNT(*) FROM patients").await?,
        report_date: Utc::now().date_naive(),
    })))
}

/// `GET /report/appointments-today`
pub async fn appointments_today(
    State(server): State<ChelalServer>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<AppointmentsToday>>> {
    auth.require(&policy::REPORTS)?;
    let appointments = todays_appointments(&server.db_pool).await?;
    Ok(Json(api_success(AppointmentsToday {
        count: appointments.len(),
        appointments,
        date: Utc::now().date_naive(),
    })))
}

/// `GET /report/appointments-by-doctor`
pub async fn appointments_by_doctor(
    State(server): State<ChelalServer>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<AppointmentsByDoctor>>> {
    auth.require(&policy::REPORTS)?;

    let appointments_by_doctor = sqlx::query_as::<_, DoctorAppointmentCount>(
        r#"
        SELECT
            COALESCE(NULLIF(TRIM(u.first_name || ' ' || u.last_name), ''), u.username) AS doctor_name,
            COUNT(a.id) AS appointment_count
        FROM appointments a
        JOIN users u ON u.id = a.doctor_id
        GROUP BY u.id, u.first_name, u.last_name, u.username
        ORDER BY appointment_count DESC, doctor_name
        "#,
    )
    .fetch_all(&server.db_pool)
    .await?;
    Ok(Json(api_success(AppointmentsByDoctor { appointments_by_doctor })))
}

/// `GET /report/top-prescribed-medications`
pub async fn top_prescribed_medications(
    State(server): State<ChelalServer>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<TopMedications>>> {
    auth.require(&policy::REPORTS)?;

    let top_medications = sqlx::query_as::<_, MedicationCount>(
        r#"
        SELECT medication_name, COUNT(*) AS count
        FROM prescriptions
        GROUP BY medication_name
        ORDER BY count DESC, medication_name
        LIMIT $1
        "#,
    )
    .bind(TOP_MEDICATIONS)
    .fetch_all(&server.db_pool)
    .await?;
    Ok(Json(api_success(TopMedications { top_medications })))
}

/// `GET /report/billing-stats`
pub async fn billing_stats(
    State(server): State<ChelalServer>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<BillingStats>>> {
    auth.require(&policy::REPORTS)?;
    let pool = &server.db_pool;

    Ok(Json(api_success(BillingStats {
        total_revenue: total_revenue(pool).await?,
        pending_bills_count: count(pool, "SELECT COUNT(*) FROM bills WHERE NOT is_paid").await?,
        pending_bills_amount: money(
            pool,
            "SELECT COALESCE(SUM(total_amount), 0) FROM bills WHERE NOT is_paid",
        )
        .await?,
        collections_today: money(
            pool,
            "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE payment_date::date = CURRENT_DATE",
        )
        .await?,
        report_date: Utc::now().date_naive(),
    })))
}
