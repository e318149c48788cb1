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
use crate::middleware::{ApiJson, ApiPath, ApiQuery, AuthContext};
use crate::server::ChelalServer;
use crate::types::PaginationParams;
use crate::validation::RequestValidation;
use crate::{validate_length, validate_required};

/// Formulary entry
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Medication {
    pub id: i64,
    pub name: String,
    pub generic_name: String,
    pub description: String,
    #[schema(example = "tablet")]
    pub unit: String,
    pub current_stock: i32,
    pub reorder_level: i32,
    pub updated_at: DateTime<Utc>,
}

impl Medication {
    pub fn needs_reorder(&self) -> bool {
        self.current_stock <= self.reorder_level
    }
}

impl Resource for Medication {
    const TABLE: &'static str = "medications";
    const LABEL: &'static str = "Medication";
    const POLICY: policy::Policy = policy::MEDICATIONS;
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MedicationRequest {
    pub name: Option<String>,
    pub generic_name: Option<String>,
    pub description: Option<String>,
    pub unit: Option<String>,
    pub current_stock: Option<i32>,
    pub reorder_level: Option<i32>,
}

impl RequestValidation for MedicationRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(name) = &self.name {
            validate_required!(name, "name is required");
            validate_length!(name, 1, 255, "name must be at most 255 characters");
        }
        if self.current_stock.is_some_and(|v| v < 0) {
            return Err(ApiError::validation("current_stock cannot be negative"));
        }
        if self.reorder_level.is_some_and(|v| v < 0) {
            return Err(ApiError::validation("reorder_level cannot be negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct MedicationListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub search: Option<String>,
}

pub async fn list_medications(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiQuery(params): ApiQuery<MedicationListParams>,
) -> ApiResult<Json<ApiResponse<Vec<Medication>>>> {
    auth.require(&Medication::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };

    let (rows, total) = fetch_page::<Medication, _>(&server.db_pool, &pagination, ("name", "ASC"), |q| {
        q.search(&["name", "generic_name"], params.search.as_deref());
    })
    .await?;
    Ok(Json(pagination.wrap_response(rows, total)))
}

pub async fn create_medication(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<MedicationRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Medication>>)> {
    auth.require(&Medication::POLICY)?;
    req.validate()?;
    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .ok_or_else(|| ApiError::validation("name is required"))?;

    let medication = sqlx::query_as::<_, Medication>(
        r#"
        INSERT INTO medications (name, generic_name, description, unit, current_stock, reorder_level)
        VALUES ($1, COALESCE($2, ''), COALESCE($3, ''), COALESCE($4, 'tablet'), COALESCE($5, 0), COALESCE($6, 10))
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(&req.generic_name)
    .bind(&req.description)
    .bind(&req.unit)
    .bind(req.current_stock)
    .bind(req.reorder_level)
    .fetch_one(&server.db_pool)
    .await?;

    Ok((StatusCode::CREATED, Json(api_success(medication))))
}

pub async fn update_medication(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<MedicationRequest>,
) -> ApiResult<Json<ApiResponse<Medication>>> {
    auth.require(&Medication::POLICY)?;
    req.validate()?;

    let medication = sqlx::query_as::<_, Medication>(
        r#"
        UPDATE medications SET
            name = COALESCE($2, name),
            generic_name = COALESCE($3, generic_name),
            description = COALESCE($4, description),
            unit = COALESCE($5, unit),
            current_stock = COALESCE($6, current_stock),
            reorder_level = COALESCE($7, reorder_level),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.generic_name)
    .bind(&req.description)
    .bind(&req.unit)
    .bind(req.current_stock)
    .bind(req.reorder_level)
    .fetch_optional(&server.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found(Medication::LABEL))?;

    Ok(Json(api_success(medication)))
}

/// Catalogue entries at or below their reorder level.
pub async fn below_reorder_level(pool: &sqlx::PgPool) -> ApiResult<Vec<Medication>> {
    Ok(sqlx::query_as::<_, Medication>(
        "SELECT * FROM medications WHERE current_stock <= reorder_level ORDER BY current_stock, name",
    )
    .fetch_all(pool)
    .await?)
}

/// `GET /medications/below-reorder`
pub async fn list_below_reorder(
    State(server): State<ChelalServer>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<Vec<Medication>>>> {
    auth.require(&Medication::POLICY)?;
    Ok(Json(api_success(below_reorder_level(&server.db_pool).await?)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reorder_threshold_is_inclusive() {
        let medication = Medication {
            id: 1,
            name: "Paracetamol".into(),
            generic_name: "acetaminophen".into(),
            description: String::new(),
            unit: "tablet".into(),
            current_stock: 10,
            reorder_level: 10,
            updated_at: Utc::now(),
        };
        assert!(medication.needs_reorder());
        assert!(!Medication {
            current_stock: 11,
            ..medication
        }
        .needs_reorder());
    }

    #[test]
    fn negative_stock_is_rejected() {
        let req: MedicationRequest =
            serde_json::from_str(r#"{"name": "Paracetamol", "current_stock": -1}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
