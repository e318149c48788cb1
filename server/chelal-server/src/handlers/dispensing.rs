//! Dispensing logs
//!
//! Rows are written by the dispense flow on inventory items, or entered
//! manually here. They are never edited or removed through the API.

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
use crate::middleware::{ApiJson, ApiQuery, AuthContext, Viewer};
use crate::server::ChelalServer;
use crate::types::PaginationParams;
use crate::validation::RequestValidation;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct DispensingLog {
    pub id: i64,
    pub prescription_id: i64,
    pub stock_batch_id: i64,
    pub quantity_dispensed: i32,
    pub dispensed_by: Option<i64>,
    pub dispensed_at: DateTime<Utc>,
}

impl Resource for DispensingLog {
    const TABLE: &'static str = "dispensing_logs";
    const LABEL: &'static str = "Dispensing log";
    const POLICY: policy::Policy = policy::DISPENSING;
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateDispensingLogRequest {
    pub prescription_id: i64,
    pub stock_batch_id: i64,
    pub quantity_dispensed: i32,
}

impl RequestValidation for CreateDispensingLogRequest {
    fn validate(&self) -> Result<(), ApiError> {
        pharmacy_service::validate_dispense_quantity(self.quantity_dispensed)?;
        if self.prescription_id < 1 || self.stock_batch_id < 1 {
            return Err(ApiError::validation(
                "prescription_id and stock_batch_id are required",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct DispensingListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub prescription_id: Option<i64>,
    pub stock_batch_id: Option<i64>,
}

pub async fn list_dispensing_logs(
    State(server): State<ChelalServer>,
    viewer: Viewer,
    ApiQuery(params): ApiQuery<DispensingListParams>,
) -> ApiResult<Json<ApiResponse<Vec<DispensingLog>>>> {
    viewer.require(&DispensingLog::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };

    let (rows, total) =
        fetch_page::<DispensingLog, _>(&server.db_pool, &pagination, ("dispensed_at", "DESC"), |q| {
            q.filter_eq("prescription_id", params.prescription_id)
                .filter_eq("stock_batch_id", params.stock_batch_id);
        })
        .await?;
    Ok(Json(pagination.wrap_response(rows, total)))
}

/// Manual log entry. Stock levels are not touched.
pub async fn create_dispensing_log(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateDispensingLogRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<DispensingLog>>)> {
    auth.require(&DispensingLog::POLICY)?;
    req.validate()?;

    let log = sqlx::query_as::<_, DispensingLog>(
        r#"
        INSERT INTO dispensing_logs (prescription_id, stock_batch_id, quantity_dispensed, dispensed_by)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(req.prescription_id)
    .bind(req.stock_batch_id)
    .bind(req.quantity_dispensed)
    .bind(auth.user_id)
    .fetch_one(&server.db_pool)
    .await?;

    tracing::info!(
        dispensing_log_id = log.id,
        prescription_id = log.prescription_id,
        user_id = auth.user_id,
        "Manual dispensing entry"
    );
    Ok((StatusCode::CREATED, Json(api_success(log))))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manual_entries_need_a_positive_quantity() {
        let req = CreateDispensingLogRequest {
            prescription_id: 1,
            stock_batch_id: 2,
            quantity_dispensed: 0,
        };
        assert!(req.validate().is_err());
        assert!(CreateDispensingLogRequest {
            quantity_dispensed: 3,
            ..req
        }
        .validate()
        .is_ok());
    }
}
