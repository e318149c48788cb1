use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, NaiveDate, Utc};
use rand::{distributions::Alphanumeric, Rng};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::auth::policy;
use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::handlers::common::{fetch_one, fetch_page, Resource};
use crate::handlers::vitals::Vital;
use crate::middleware::{ApiJson, ApiPath, ApiQuery, AuthContext, Viewer};
use crate::server::ChelalServer;
use crate::services::AuditAction;
use crate::types::PaginationParams;
use crate::validation::RequestValidation;
use crate::{validate_length, validate_required};

pub const UNIQUE_ID_LENGTH: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Patient {
    pub id: i64,
    /// Hospital number printed on cards and wristbands
    #[schema(example = "K7Q2M9XD")]
    pub unique_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    pub contact_info: String,
    pub address: String,
    /// Comma-separated allergy notes
    #[schema(example = "penicillin, sulfa drugs")]
    pub known_allergies: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Patient {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

impl Resource for Patient {
    const TABLE: &'static str = "patients";
    const LABEL: &'static str = "Patient";
    const POLICY: policy::Policy = policy::PATIENTS;
    const AUDIT_AS: Option<&'static str> = Some("patient");
}

/// Eight upper-case alphanumerics.
pub fn generate_unique_id() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(UNIQUE_ID_LENGTH)
        .map(|byte| char::from(byte).to_ascii_uppercase())
        .collect()
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePatientRequest {
    /// Generated when omitted or blank
    pub unique_id: Option<String>,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub gender: String,
    #[serde(default)]
    pub contact_info: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub known_allergies: String,
}

impl RequestValidation for CreatePatientRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.first_name, "first_name is required");
        validate_length!(self.first_name, 1, 100, "first_name must be at most 100 characters");
        validate_required!(self.last_name, "last_name is required");
        validate_length!(self.last_name, 1, 100, "last_name must be at most 100 characters");
        validate_required!(self.gender, "gender is required");
        validate_length!(self.gender, 1, 10, "gender must be at most 10 characters");
        validate_date_of_birth(self.date_of_birth)?;
        if let Some(unique_id) = &self.unique_id {
            validate_length!(unique_id, 0, 32, "unique_id must be at most 32 characters");
        }
        Ok(())
    }
}

fn validate_date_of_birth(date_of_birth: NaiveDate) -> Result<(), ApiError> {
    if date_of_birth > Utc::now().date_naive() {
        return Err(ApiError::validation("date_of_birth cannot be in the future"));
    }
    Ok(())
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePatientRequest {
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub date_of_birth: Option<NaiveDate>,
    pub gender: Option<String>,
    pub contact_info: Option<String>,
    pub address: Option<String>,
    pub known_allergies: Option<String>,
}

impl RequestValidation for UpdatePatientRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(first_name) = &self.first_name {
            validate_required!(first_name, "first_name cannot be blank");
        }
        if let Some(last_name) = &self.last_name {
            validate_required!(last_name, "last_name cannot be blank");
        }
        if let Some(gender) = &self.gender {
            validate_length!(gender, 1, 10, "gender must be at most 10 characters");
        }
        if let Some(date_of_birth) = self.date_of_birth {
            validate_date_of_birth(date_of_birth)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PatientListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    /// Matches names, hospital number or contact details
    pub search: Option<String>,
    pub gender: Option<String>,
}

pub async fn list_patients(
    State(server): State<ChelalServer>,
    viewer: Viewer,
    ApiQuery(params): ApiQuery<PatientListParams>,
) -> ApiResult<Json<ApiResponse<Vec<Patient>>>> {
    viewer.require(&Patient::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };

    let (patients, total) =
        fetch_page::<Patient, _>(&server.db_pool, &pagination, ("last_name, first_name", "ASC"), |q| {
            q.filter_eq("gender", params.gender.clone()).search(
                &["first_name", "last_name", "unique_id", "contact_info"],
                params.search.as_deref(),
            );
        })
        .await?;

    Ok(Json(pagination.wrap_response(patients, total)))
}

pub async fn create_patient(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreatePatientRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Patient>>)> {
    auth.require(&Patient::POLICY)?;
    req.validate()?;

    let unique_id = req
        .unique_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .unwrap_or_else(generate_unique_id);

    let patient = sqlx::query_as::<_, Patient>(
        r#"
        INSERT INTO patients (
            unique_id, first_name, last_name, date_of_birth, gender,
            contact_info, address, known_allergies
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(&unique_id)
    .bind(req.first_name.trim())
    .bind(req.last_name.trim())
    .bind(req.date_of_birth)
    .bind(req.gender.trim())
    .bind(&req.contact_info)
    .bind(&req.address)
    .bind(&req.known_allergies)
    .fetch_one(&server.db_pool)
    .await?;

    server
        .audit()
        .record(
            Some(auth.user_id),
            AuditAction::Create,
            "patient",
            patient.id,
            format!("Registered patient {}", patient.full_name()),
            Some(serde_json::json!({ "unique_id": patient.unique_id })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(api_success(patient))))
}

pub async fn update_patient(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdatePatientRequest>,
) -> ApiResult<Json<ApiResponse<Patient>>> {
    auth.require(&Patient::POLICY)?;
    req.validate()?;

    let patient = sqlx::query_as::<_, Patient>(
        r#"
        UPDATE patients SET
            first_name = COALESCE($2, first_name),
            last_name = COALESCE($3, last_name),
            date_of_birth = COALESCE($4, date_of_birth),
            gender = COALESCE($5, gender),
            contact_info = COALESCE($6, contact_info),
            address = COALESCE($7, address),
            known_allergies = COALESCE($8, known_allergies),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.first_name.as_deref().map(str::trim))
    .bind(req.last_name.as_deref().map(str::trim))
    .bind(req.date_of_birth)
    .bind(req.gender.as_deref().map(str::trim))
    .bind(&req.contact_info)
    .bind(&req.address)
    .bind(&req.known_allergies)
    .fetch_optional(&server.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found(Patient::LABEL))?;

    server
        .audit()
        .record(Some(auth.user_id), AuditAction::Edit, "patient", id, "Updated patient record", None)
        .await;

    Ok(Json(api_success(patient)))
}

/// `GET /patients/:id/vitals`: every encounter's vitals, newest first.
pub async fn patient_vitals(
    State(server): State<ChelalServer>,
    viewer: Viewer,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<Vec<Vital>>>> {
    viewer.require(&Vital::POLICY)?;
    fetch_one::<Patient>(&server.db_pool, id).await?;

    let history = sqlx::query_as::<_, Vital>(
        r#"
        SELECT v.*
        FROM vitals v
        JOIN encounters e ON e.id = v.encounter_id
        WHERE e.patient_id = $1
        ORDER BY v.recorded_at DESC, v.id DESC
        "#,
    )
    .bind(id)
    .fetch_all(&server.db_pool)
    .await?;

    Ok(Json(api_success(history)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_upper_alphanumeric() {
        for _ in 0..50 {
            let id = generate_unique_id();
            assert_eq!(id.len(), UNIQUE_ID_LENGTH);
            assert!(id
                .chars()
                .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit()));
        }
    }

    #[test]
    fn future_birth_dates_are_rejected() {
        let tomorrow = Utc::now().date_naive() + chrono::Duration::days(1);
        let req: CreatePatientRequest = serde_json::from_value(serde_json::json!({
            "first_name": "Amina",
            "last_name": "Wekesa",
            "date_of_birth": tomorrow,
            "gender": "F"
        }))
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn minimal_patient_is_valid() {
        let req: CreatePatientRequest = serde_json::from_str(
            r#"{"first_name": "Amina", "last_name": "Wekesa", "date_of_birth": "1990-04-02", "gender": "F"}"#,
        )
        .unwrap();
        assert!(req.validate().is_ok());
        assert!(req.unique_id.is_none());
    }
}
