use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use utoipa::{IntoParams, ToSchema};

use crate::auth::policy;
use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::handlers::common::{fetch_page, Resource};
use crate::middleware::{ApiJson, ApiPath, ApiQuery, AuthContext, Viewer};
use crate::server::ChelalServer;
use crate::types::PaginationParams;
use crate::validation::{validate_optional, RequestValidation};
use crate::validate_range;

/// One set of bedside observations taken during an encounter.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Vital {
    pub id: i64,
    pub encounter_id: i64,
    pub systolic_bp: Option<i32>,
    pub diastolic_bp: Option<i32>,
    pub heart_rate: Option<i32>,
    pub respiratory_rate: Option<i32>,
    /// Degrees Celsius
    #[schema(value_type = Option<String>, example = "36.8")]
    pub temperature: Option<Decimal>,
    pub oxygen_saturation: Option<i32>,
    #[schema(value_type = Option<String>)]
    pub weight_kg: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub height_cm: Option<Decimal>,
    pub notes: String,
    pub recorded_by: Option<i64>,
    pub recorded_at: DateTime<Utc>,
}

impl Resource for Vital {
    const TABLE: &'static str = "vitals";
    const LABEL: &'static str = "Vitals";
    const POLICY: policy::Policy = policy::VITALS;
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct VitalsReadings {
    pub systolic_bp: Option<i32>,
    pub diastolic_bp: Option<i32>,
    pub heart_rate: Option<i32>,
    pub respiratory_rate: Option<i32>,
    #[schema(value_type = Option<String>)]
    pub temperature: Option<Decimal>,
    pub oxygen_saturation: Option<i32>,
    #[schema(value_type = Option<String>)]
    pub weight_kg: Option<Decimal>,
    #[schema(value_type = Option<String>)]
    pub height_cm: Option<Decimal>,
    pub notes: Option<String>,
}

impl RequestValidation for VitalsReadings {
    fn validate(&self) -> Result<(), ApiError> {
        validate_optional(&self.systolic_bp, |v| {
            validate_range!(*v, 40, 300, "systolic_bp must be between 40 and 300");
            Ok(())
        })?;
        validate_optional(&self.diastolic_bp, |v| {
            validate_range!(*v, 20, 200, "diastolic_bp must be between 20 and 200");
            Ok(())
        })?;
        validate_optional(&self.heart_rate, |v| {
            validate_range!(*v, 20, 300, "heart_rate must be between 20 and 300");
            Ok(())
        })?;
        validate_optional(&self.respiratory_rate, |v| {
            validate_range!(*v, 4, 80, "respiratory_rate must be between 4 and 80");
            Ok(())
        })?;
        validate_optional(&self.oxygen_saturation, |v| {
            validate_range!(*v, 0, 100, "oxygen_saturation must be a percentage");
            Ok(())
        })?;
        validate_optional(&self.temperature, |v| {
            validate_range!(
                *v,
                Decimal::new(250, 1),
                Decimal::new(450, 1),
                "temperature must be between 25.0 and 45.0"
            );
            Ok(())
        })?;
        for (value, label) in [(&self.weight_kg, "weight_kg"), (&self.height_cm, "height_cm")] {
            if value.is_some_and(|v| v <= Decimal::ZERO) {
                return Err(ApiError::validation(format!("{} must be positive", label)));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateVitalsRequest {
    pub encounter_id: i64,
    #[serde(flatten)]
    pub readings: VitalsReadings,
}

impl RequestValidation for CreateVitalsRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.encounter_id < 1 {
            return Err(ApiError::validation("encounter_id is required"));
        }
        self.readings.validate()
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct VitalsListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub encounter_id: Option<i64>,
}

/// Insert a validated set of readings. Shared with the nested encounter route.
pub async fn insert_vitals(
    pool: &PgPool,
    encounter_id: i64,
    readings: &VitalsReadings,
    recorded_by: i64,
) -> ApiResult<Vital> {
    let vital = sqlx::query_as::<_, Vital>(
        r#"
        INSERT INTO vitals (
            encounter_id, systolic_bp, diastolic_bp, heart_rate, respiratory_rate,
            temperature, oxygen_saturation, weight_kg, height_cm, notes, recorded_by
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
        RETURNING *
        "#,
    )
    .bind(encounter_id)
    .bind(readings.systolic_bp)
    .bind(readings.diastolic_bp)
    .bind(readings.heart_rate)
    .bind(readings.respiratory_rate)
    .bind(readings.temperature)
    .bind(readings.oxygen_saturation)
    .bind(readings.weight_kg)
    .bind(readings.height_cm)
    .bind(readings.notes.clone().unwrap_or_default())
    .bind(recorded_by)
    .fetch_one(pool)
    .await?;

    tracing::info!(vital_id = vital.id, encounter_id, recorded_by, "Vitals recorded");
    Ok(vital)
}

pub async fn list_vitals(
    State(server): State<ChelalServer>,
    viewer: Viewer,
    ApiQuery(params): ApiQuery<VitalsListParams>,
) -> ApiResult<Json<ApiResponse<Vec<Vital>>>> {
    viewer.require(&Vital::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };

    let (rows, total) =
        fetch_page::<Vital, _>(&server.db_pool, &pagination, ("recorded_at", "DESC"), |q| {
            q.filter_eq("encounter_id", params.encounter_id);
        })
        .await?;
    Ok(Json(pagination.wrap_response(rows, total)))
}

pub async fn create_vitals(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateVitalsRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Vital>>)> {
    auth.require(&Vital::POLICY)?;
    req.validate()?;

    let vital = insert_vitals(&server.db_pool, req.encounter_id, &req.readings, auth.user_id).await?;
    Ok((StatusCode::CREATED, Json(api_success(vital))))
}

pub async fn update_vitals(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<VitalsReadings>,
) -> ApiResult<Json<ApiResponse<Vital>>> {
    auth.require(&Vital::POLICY)?;
    req.validate()?;

    let vital = sqlx::query_as::<_, Vital>(
        r#"
        UPDATE vitals SET
            systolic_bp = COALESCE($2, systolic_bp),
            diastolic_bp = COALESCE($3, diastolic_bp),
            heart_rate = COALESCE($4, heart_rate),
            respiratory_rate = COALESCE($5, respiratory_rate),
            temperature = COALESCE($6, temperature),
            oxygen_saturation = COALESCE($7, oxygen_saturation),
            weight_kg = COALESCE($8, weight_kg),
            height_cm = COALESCE($9, height_cm),
            notes = COALESCE($10, notes)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.systolic_bp)
    .bind(req.diastolic_bp)
    .bind(req.heart_rate)
    .bind(req.respiratory_rate)
    .bind(req.temperature)
    .bind(req.oxygen_saturation)
    .bind(req.weight_kg)
    .bind(req.height_cm)
    .bind(&req.notes)
    .fetch_optional(&server.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found(Vital::LABEL))?;

    Ok(Json(api_success(vital)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_encounter_is_a_validation_error() {
        let req = CreateVitalsRequest {
            encounter_id: 0,
            readings: VitalsReadings::default(),
        };
        let err = req.validate().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn implausible_readings_are_rejected() {
        let readings = VitalsReadings {
            oxygen_saturation: Some(104),
            ..Default::default()
        };
        assert!(readings.validate().is_err());

        let readings = VitalsReadings {
            temperature: Some(Decimal::new(371, 1)),
            heart_rate: Some(72),
            ..Default::default()
        };
        assert!(readings.validate().is_ok());
    }

    #[test]
    fn flattened_body_parses() {
        let req: CreateVitalsRequest =
            serde_json::from_str(r#"{"encounter_id": 3, "heart_rate": 80, "temperature": "37.2"}"#)
                .unwrap();
        assert_eq!(req.encounter_id, 3);
        assert_eq!(req.readings.heart_rate, Some(80));
    }
}
