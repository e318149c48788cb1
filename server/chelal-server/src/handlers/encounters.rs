use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{policy, RoleName};
use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::handlers::common::{fetch_one, fetch_page, Resource};
use crate::handlers::lab_orders::{self, CreateLabOrderRequest, LabOrder, LabOrderDetail};
use crate::handlers::users::ensure_doctor;
use crate::handlers::vitals::{self, Vital, VitalsReadings};
use crate::middleware::{ApiJson, ApiPath, ApiQuery, AuthContext, Viewer};
use crate::server::ChelalServer;
use crate::types::PaginationParams;
use crate::validation::RequestValidation;
use crate::validate_required;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Encounter {
    pub id: i64,
    pub patient_id: i64,
    pub appointment_id: Option<i64>,
    pub doctor_id: i64,
    pub notes: String,
    pub diagnosis: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource for Encounter {
    const TABLE: &'static str = "encounters";
    const LABEL: &'static str = "Encounter";
    const POLICY: policy::Policy = policy::ENCOUNTERS;
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateEncounterRequest {
    pub patient_id: i64,
    pub appointment_id: Option<i64>,
    /// Defaults to the caller when the caller is a doctor
    pub doctor_id: Option<i64>,
    pub notes: String,
    #[serde(default)]
    pub diagnosis: String,
}

impl RequestValidation for CreateEncounterRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.notes, "notes are required");
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateEncounterRequest {
    pub appointment_id: Option<i64>,
    pub doctor_id: Option<i64>,
    pub notes: Option<String>,
    pub diagnosis: Option<String>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct EncounterListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub patient_id: Option<i64>,
    pub doctor_id: Option<i64>,
}

pub async fn list_encounters(
    State(server): State<ChelalServer>,
    viewer: Viewer,
    ApiQuery(params): ApiQuery<EncounterListParams>,
) -> ApiResult<Json<ApiResponse<Vec<Encounter>>>> {
    viewer.require(&Encounter::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };

    let (rows, total) =
        fetch_page::<Encounter, _>(&server.db_pool, &pagination, ("created_at", "DESC"), |q| {
            q.filter_eq("patient_id", params.patient_id)
                .filter_eq("doctor_id", params.doctor_id);
        })
        .await?;
    Ok(Json(pagination.wrap_response(rows, total)))
}

pub async fn create_encounter(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateEncounterRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Encounter>>)> {
    auth.require(&Encounter::POLICY)?;
    req.validate()?;

    let doctor_id = match req.doctor_id {
        Some(id) => id,
        None if auth.has_role(RoleName::Doctor) => auth.user_id,
        None => return Err(ApiError::validation("doctor_id is required")),
    };
    ensure_doctor(&server.db_pool, doctor_id).await?;

    let encounter = sqlx::query_as::<_, Encounter>(
        r#"
        INSERT INTO encounters (patient_id, appointment_id, doctor_id, notes, diagnosis)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(req.patient_id)
    .bind(req.appointment_id)
    .bind(doctor_id)
    .bind(&req.notes)
    .bind(&req.diagnosis)
    .fetch_one(&server.db_pool)
    .await?;

    tracing::info!(encounter_id = encounter.id, patient_id = req.patient_id, doctor_id, "Encounter opened");
    Ok((StatusCode::CREATED, Json(api_success(encounter))))
}

pub async fn update_encounter(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateEncounterRequest>,
) -> ApiResult<Json<ApiResponse<Encounter>>> {
    auth.require(&Encounter::POLICY)?;
    if let Some(notes) = &req.notes {
        validate_required!(notes, "notes are required");
    }
    if let Some(doctor_id) = req.doctor_id {
        ensure_doctor(&server.db_pool, doctor_id).await?;
    }

    let encounter = sqlx::query_as::<_, Encounter>(
        r#"
        UPDATE encounters SET
            appointment_id = COALESCE($2, appointment_id),
            doctor_id = COALESCE($3, doctor_id),
            notes = COALESCE($4, notes),
            diagnosis = COALESCE($5, diagnosis),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.appointment_id)
    .bind(req.doctor_id)
    .bind(&req.notes)
    .bind(&req.diagnosis)
    .fetch_optional(&server.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found(Encounter::LABEL))?;

    Ok(Json(api_success(encounter)))
}

// ============================================================================
// NESTED: /encounters/:id/vitals, /encounters/:id/lab-orders
// ============================================================================

pub async fn encounter_vitals(
    State(server): State<ChelalServer>,
    viewer: Viewer,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<Vec<Vital>>>> {
    viewer.require(&Vital::POLICY)?;
    fetch_one::<Encounter>(&server.db_pool, id).await?;

    let rows = sqlx::query_as::<_, Vital>(
        "SELECT * FROM vitals WHERE encounter_id = $1 ORDER BY recorded_at DESC, id DESC",
    )
    .bind(id)
    .fetch_all(&server.db_pool)
    .await?;
    Ok(Json(api_success(rows)))
}

pub async fn record_encounter_vitals(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<VitalsReadings>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Vital>>)> {
    auth.require(&Vital::POLICY)?;
    req.validate()?;
    fetch_one::<Encounter>(&server.db_pool, id).await?;

    let vital = vitals::insert_vitals(&server.db_pool, id, &req, auth.user_id).await?;
    Ok((StatusCode::CREATED, Json(api_success(vital))))
}

pub async fn encounter_lab_orders(
    State(server): State<ChelalServer>,
    viewer: Viewer,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<Vec<LabOrder>>>> {
    viewer.require(&LabOrder::POLICY)?;
    fetch_one::<Encounter>(&server.db_pool, id).await?;

    let orders = lab_orders::orders_for_encounter(&server.db_pool, id).await?;
    Ok(Json(api_success(orders)))
}

pub async fn order_encounter_lab_tests(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<CreateLabOrderRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<LabOrderDetail>>)> {
    auth.require(&LabOrder::POLICY)?;
    req.validate()?;
    fetch_one::<Encounter>(&server.db_pool, id).await?;

    let detail = lab_orders::insert_lab_order(&server.db_pool, id, &req, auth.user_id).await?;
    Ok((StatusCode::CREATED, Json(api_success(detail))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notes_are_required() {
        let req: CreateEncounterRequest =
            serde_json::from_str(r#"{"patient_id": 1, "doctor_id": 2, "notes": ""}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
