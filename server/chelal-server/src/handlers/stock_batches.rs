use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::NaiveDate;
use pharmacy_service::StockBatch;
use rust_decimal::Decimal;
use serde::Deserialize;
use utoipa::{IntoParams, ToSchema};

use crate::auth::policy;
use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::handlers::common::{fetch_page, Resource};
use crate::handlers::inventory::{alert_if_low, recompute_item_total};
use crate::middleware::{ApiJson, ApiPath, ApiQuery, AuthContext, Viewer};
use crate::server::ChelalServer;
use crate::types::PaginationParams;
use crate::validation::RequestValidation;
use crate::{validate_length, validate_required};

impl Resource for StockBatch {
    const TABLE: &'static str = "stock_batches";
    const LABEL: &'static str = "Stock batch";
    const POLICY: policy::Policy = policy::STOCK_BATCHES;
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBatchRequest {
    pub inventory_item_id: i64,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub quantity: i32,
    #[serde(default)]
    #[schema(value_type = String, example = "2.50")]
    pub cost_price_per_unit: Decimal,
    pub received_date: Option<NaiveDate>,
}

impl RequestValidation for CreateBatchRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.batch_number, "batch_number is required");
        validate_length!(self.batch_number, 1, 100, "batch_number must be at most 100 characters");
        if self.quantity < 1 {
            return Err(ApiError::validation("quantity must be at least 1"));
        }
        if self.cost_price_per_unit < Decimal::ZERO {
            return Err(ApiError::validation("cost_price_per_unit cannot be negative"));
        }
        if self.received_date.is_some_and(|received| received > self.expiry_date) {
            return Err(ApiError::validation("received_date cannot be after expiry_date"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBatchRequest {
    pub batch_number: Option<String>,
    pub expiry_date: Option<NaiveDate>,
    /// Stock count correction
    pub current_quantity: Option<i32>,
    #[schema(value_type = Option<String>)]
    pub cost_price_per_unit: Option<Decimal>,
}

impl RequestValidation for UpdateBatchRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(batch_number) = &self.batch_number {
            validate_required!(batch_number, "batch_number cannot be blank");
        }
        if self.current_quantity.is_some_and(|q| q < 0) {
            return Err(ApiError::validation("current_quantity cannot be negative"));
        }
        if self.cost_price_per_unit.is_some_and(|c| c < Decimal::ZERO) {
            return Err(ApiError::validation("cost_price_per_unit cannot be negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BatchListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub inventory_item_id: Option<i64>,
}

/// Rewrite the item total after a batch write and raise a low-stock alert
/// when it drops under the threshold.
async fn refresh_item(server: &ChelalServer, inventory_item_id: i64) -> ApiResult<()> {
    let mut tx = database_layer::begin(&server.db_pool).await?;
    let total = recompute_item_total(&mut *tx, inventory_item_id).await?;
    let name: Option<String> = sqlx::query_scalar("SELECT name FROM inventory_items WHERE id = $1")
        .bind(inventory_item_id)
        .fetch_optional(&mut *tx)
        .await?;
    tx.commit().await?;

    if let (Some(total), Some(name)) = (total, name) {
        tracing::debug!(inventory_item_id, total, "Item total recomputed");
        alert_if_low(server, &name, total).await;
    }
    Ok(())
}

pub async fn list_batches(
    State(server): State<ChelalServer>,
    viewer: Viewer,
    ApiQuery(params): ApiQuery<BatchListParams>,
) -> ApiResult<Json<ApiResponse<Vec<StockBatch>>>> {
    viewer.require(&StockBatch::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };

    let (rows, total) =
        fetch_page::<StockBatch, _>(&server.db_pool, &pagination, ("expiry_date", "ASC"), |q| {
            q.filter_eq("inventory_item_id", params.inventory_item_id);
        })
        .await?;
    Ok(Json(pagination.wrap_response(rows, total)))
}

pub async fn create_batch(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateBatchRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<StockBatch>>)> {
    auth.require(&StockBatch::POLICY)?;
    req.validate()?;

    let batch = sqlx::query_as::<_, StockBatch>(
        r#"
        INSERT INTO stock_batches (
            inventory_item_id, batch_number, expiry_date, initial_quantity,
            current_quantity, cost_price_per_unit, received_date
        )
        VALUES ($1, $2, $3, $4, $4, $5, COALESCE($6, CURRENT_DATE))
        RETURNING *
        "#,
    )
    .bind(req.inventory_item_id)
    .bind(req.batch_number.trim())
    .bind(req.expiry_date)
    .bind(req.quantity)
    .bind(req.cost_price_per_unit)
    .bind(req.received_date)
    .fetch_one(&server.db_pool)
    .await?;

    tracing::info!(
        batch_id = batch.id,
        inventory_item_id = batch.inventory_item_id,
        quantity = batch.initial_quantity,
        expiry_date = %batch.expiry_date,
        "Stock batch received"
    );
    refresh_item(&server, batch.inventory_item_id).await?;
    Ok((StatusCode::CREATED, Json(api_success(batch))))
}

pub async fn update_batch(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateBatchRequest>,
) -> ApiResult<Json<ApiResponse<StockBatch>>> {
    auth.require(&StockBatch::POLICY)?;
    req.validate()?;

    let batch = sqlx::query_as::<_, StockBatch>(
        r#"
        UPDATE stock_batches SET
            batch_number = COALESCE($2, batch_number),
            expiry_date = COALESCE($3, expiry_date),
            current_quantity = COALESCE($4, current_quantity),
            cost_price_per_unit = COALESCE($5, cost_price_per_unit)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.batch_number.as_deref().map(str::trim))
    .bind(req.expiry_date)
    .bind(req.current_quantity)
    .bind(req.cost_price_per_unit)
    .fetch_optional(&server.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found(StockBatch::LABEL))?;

    refresh_item(&server, batch.inventory_item_id).await?;
    Ok(Json(api_success(batch)))
}

pub async fn delete_batch(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    auth.require(&StockBatch::POLICY)?;

    let item_id: i64 = sqlx::query_scalar("DELETE FROM stock_batches WHERE id = $1 RETURNING inventory_item_id")
        .bind(id)
        .fetch_optional(&server.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found(StockBatch::LABEL))?;

    tracing::info!(batch_id = id, inventory_item_id = item_id, "Stock batch removed");
    refresh_item(&server, item_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(quantity: i32) -> CreateBatchRequest {
        serde_json::from_value(serde_json::json!({
            "inventory_item_id": 1,
            "batch_number": "AMX-0425",
            "expiry_date": "2026-04-30",
            "quantity": quantity,
            "cost_price_per_unit": "1.20"
        }))
        .unwrap()
    }

    #[test]
    fn received_batches_need_stock() {
        assert!(request(0).validate().is_err());
        assert!(request(20).validate().is_ok());
    }

    #[test]
    fn received_after_expiry_is_rejected() {
        let mut req = request(5);
        req.received_date = NaiveDate::from_ymd_opt(2026, 5, 1);
        assert!(req.validate().is_err());
    }
}
