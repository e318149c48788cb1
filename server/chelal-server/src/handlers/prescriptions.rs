use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::auth::policy;
use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::handlers::common::{fetch_page, Resource};
use crate::middleware::{ApiJson, ApiPath, ApiQuery, AuthContext, Viewer};
use crate::server::ChelalServer;
use crate::services::AuditAction;
use crate::types::PaginationParams;
use crate::validation::RequestValidation;
use crate::{validate_length, validate_required};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Prescription {
    pub id: i64,
    pub encounter_id: i64,
    #[schema(example = "Amoxicillin 500mg")]
    pub medication_name: String,
    #[schema(example = "1 capsule")]
    pub dosage: String,
    #[schema(example = "3 times daily")]
    pub frequency: String,
    pub duration: String,
    pub instructions: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource for Prescription {
    const TABLE: &'static str = "prescriptions";
    const LABEL: &'static str = "Prescription";
    const POLICY: policy::Policy = policy::PRESCRIPTIONS;
    const AUDIT_AS: Option<&'static str> = Some("prescription");
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePrescriptionRequest {
    pub encounter_id: i64,
    pub medication_name: String,
    pub dosage: String,
    pub frequency: String,
    #[serde(default)]
    pub duration: String,
    #[serde(default)]
    pub instructions: String,
}

impl RequestValidation for CreatePrescriptionRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.medication_name, "medication_name is required");
        validate_length!(self.medication_name, 1, 255, "medication_name must be at most 255 characters");
        validate_required!(self.dosage, "dosage is required");
        validate_length!(self.dosage, 1, 100, "dosage must be at most 100 characters");
        validate_required!(self.frequency, "frequency is required");
        validate_length!(self.frequency, 1, 100, "frequency must be at most 100 characters");
        validate_length!(self.duration, 0, 100, "duration must be at most 100 characters");
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePrescriptionRequest {
    pub medication_name: Option<String>,
    pub dosage: Option<String>,
    pub frequency: Option<String>,
    pub duration: Option<String>,
    pub instructions: Option<String>,
}

impl RequestValidation for UpdatePrescriptionRequest {
    fn validate(&self) -> Result<(), ApiError> {
        for (value, label) in [
            (&self.medication_name, "medication_name"),
            (&self.dosage, "dosage"),
            (&self.frequency, "frequency"),
        ] {
            if value.as_deref().is_some_and(|v| v.trim().is_empty()) {
                return Err(ApiError::validation(format!("{} cannot be blank", label)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct PrescriptionListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub encounter_id: Option<i64>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AllergyCheckRequest {
    pub patient_id: i64,
    pub medication_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AllergyCheckResponse {
    pub alert: bool,
    pub message: String,
}

/// Whether `medication` appears in the patient's allergy notes. Matching is
/// a case-insensitive substring test against each comma-separated entry.
pub fn allergy_matches(known_allergies: &str, medication: &str) -> bool {
    let medication = medication.trim().to_lowercase();
    if medication.is_empty() {
        return false;
    }
    known_allergies
        .split(',')
        .map(|entry| entry.trim().to_lowercase())
        .filter(|entry| !entry.is_empty())
        .any(|entry| entry.contains(&medication) || medication.contains(&entry))
}

pub async fn list_prescriptions(
    State(server): State<ChelalServer>,
    viewer: Viewer,
    ApiQuery(params): ApiQuery<PrescriptionListParams>,
) -> ApiResult<Json<ApiResponse<Vec<Prescription>>>> {
    viewer.require(&Prescription::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };

    let (rows, total) =
        fetch_page::<Prescription, _>(&server.db_pool, &pagination, ("created_at", "DESC"), |q| {
            q.filter_eq("encounter_id", params.encounter_id)
                .filter_ilike("medication_name", params.search.as_deref());
        })
        .await?;
    Ok(Json(pagination.wrap_response(rows, total)))
}

pub async fn create_prescription(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreatePrescriptionRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Prescription>>)> {
    auth.require(&Prescription::POLICY)?;
    req.validate()?;

    let prescription = sqlx::query_as::<_, Prescription>(
        r#"
        INSERT INTO prescriptions (encounter_id, medication_name, dosage, frequency, duration, instructions)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(req.encounter_id)
    .bind(req.medication_name.trim())
    .bind(req.dosage.trim())
    .bind(req.frequency.trim())
    .bind(req.duration.trim())
    .bind(&req.instructions)
    .fetch_one(&server.db_pool)
    .await?;

    server
        .audit()
        .record(
            Some(auth.user_id),
            AuditAction::Create,
            "prescription",
            prescription.id,
            format!("Prescribed {}", prescription.medication_name),
            Some(serde_json::json!({ "encounter_id": prescription.encounter_id })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(api_success(prescription))))
}

pub async fn update_prescription(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdatePrescriptionRequest>,
) -> ApiResult<Json<ApiResponse<Prescription>>> {
    auth.require(&Prescription::POLICY)?;
    req.validate()?;

    let prescription = sqlx::query_as::<_, Prescription>(
        r#"
        UPDATE prescriptions SET
            medication_name = COALESCE($2, medication_name),
            dosage = COALESCE($3, dosage),
            frequency = COALESCE($4, frequency),
            duration = COALESCE($5, duration),
            instructions = COALESCE($6, instructions),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.medication_name.as_deref().map(str::trim))
    .bind(req.dosage.as_deref().map(str::trim))
    .bind(req.frequency.as_deref().map(str::trim))
    .bind(req.duration.as_deref().map(str::trim))
    .bind(&req.instructions)
    .fetch_optional(&server.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found(Prescription::LABEL))?;

    server
        .audit()
        .record(Some(auth.user_id), AuditAction::Edit, "prescription", id, "Updated prescription", None)
        .await;

    Ok(Json(api_success(prescription)))
}

/// Read-only despite the verb: any role that may read prescriptions may ask.
#[utoipa::path(
    post,
    path = "/api/prescriptions/check-allergy",
    tag = "clinical",
    request_body = AllergyCheckRequest,
    responses(
        (status = 200, description = "Allergy check result", body = AllergyCheckResponse),
        (status = 404, description = "Patient not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn check_allergy(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<AllergyCheckRequest>,
) -> ApiResult<Json<ApiResponse<AllergyCheckResponse>>> {
    auth.require_for(&Prescription::POLICY, &axum::http::Method::GET)?;

    let allergies: String = sqlx::query_scalar("SELECT known_allergies FROM patients WHERE id = $1")
        .bind(req.patient_id)
        .fetch_optional(&server.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found("Patient"))?;

    let response = if allergy_matches(&allergies, &req.medication_name) {
        tracing::warn!(patient_id = req.patient_id, medication = %req.medication_name, "Allergy alert");
        AllergyCheckResponse {
            alert: true,
            message: format!("Patient is allergic to {}!", req.medication_name.trim()),
        }
    } else {
        AllergyCheckResponse {
            alert: false,
            message: "No known allergy.".to_string(),
        }
    };
    Ok(Json(api_success(response)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allergy_match_is_case_insensitive() {
        assert!(allergy_matches("Penicillin, Sulfa", "penicillin"));
        assert!(allergy_matches("penicillin", "PENICILLIN"));
        assert!(allergy_matches("  aspirin ,", "Aspirin"));
    }

    #[test]
    fn no_match_without_overlap() {
        assert!(!allergy_matches("penicillin, sulfa", "ibuprofen"));
        assert!(!allergy_matches("", "penicillin"));
        assert!(!allergy_matches("penicillin", "   "));
    }

    #[test]
    fn create_requires_dosage_and_frequency() {
        let req: CreatePrescriptionRequest = serde_json::from_str(
            r#"{"encounter_id": 1, "medication_name": "Amoxicillin", "dosage": "", "frequency": "bd"}"#,
        )
        .unwrap();
        assert!(req.validate().is_err());
    }
}
