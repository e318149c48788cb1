//! Pharmacy inventory
//!
//! Items hold two counters. `total_quantity` is derived: it always equals the
//! sum of the item's batch remainders and is rewritten after every batch
//! change. `quantity` is a free counter for stock that is not tracked by
//! batch, moved only by `adjust-stock`.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use pharmacy_service::{
    is_low_stock, low_stock_message, near_expiry, stock_valuation, validate_dispense_quantity,
    StockBatch, MAX_NEAR_EXPIRY_DAYS,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgExecutor};
use std::collections::BTreeMap;
use tracing::{info, warn};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{policy, RoleName};
use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::handlers::common::{fetch_one, fetch_page, Resource};
use crate::handlers::prescriptions::Prescription;
use crate::middleware::{ApiJson, ApiPath, ApiQuery, AuthContext, Viewer};
use crate::server::ChelalServer;
use crate::types::PaginationParams;
use crate::validation::RequestValidation;
use crate::{validate_length, validate_required};

pub const LOW_STOCK_NOTIFICATION: &str = "low_stock";
const LOW_STOCK_RECIPIENTS: [RoleName; 2] = [RoleName::Pharmacist, RoleName::Admin];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct InventoryItem {
    pub id: i64,
    pub name: String,
    pub generic_name: String,
    pub category: String,
    pub unit: String,
    /// Untracked stock, moved by stock adjustments
    pub quantity: i32,
    /// Sum of batch remainders
    pub total_quantity: i64,
    pub reorder_level: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource for InventoryItem {
    const TABLE: &'static str = "inventory_items";
    const LABEL: &'static str = "Inventory item";
    const POLICY: policy::Policy = policy::INVENTORY;
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct InventoryItemRequest {
    pub name: Option<String>,
    pub generic_name: Option<String>,
    pub category: Option<String>,
    pub unit: Option<String>,
    pub quantity: Option<i32>,
    pub reorder_level: Option<i32>,
}

impl RequestValidation for InventoryItemRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(name) = &self.name {
            validate_required!(name, "name is required");
            validate_length!(name, 1, 255, "name must be at most 255 characters");
        }
        if self.reorder_level.is_some_and(|v| v < 0) {
            return Err(ApiError::validation("reorder_level cannot be negative"));
        }
        if self.quantity.is_some_and(|v| v < 0) {
            return Err(ApiError::validation("quantity cannot be negative"));
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct InventoryListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub category: Option<String>,
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AdjustStockRequest {
    /// Signed change to the untracked quantity
    pub amount: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AdjustStockResponse {
    pub status: String,
    pub new_quantity: i32,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DispenseRequest {
    pub prescription_id: i64,
    pub quantity: i32,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct DispenseResponse {
    #[schema(example = "dispensed")]
    pub status: String,
    /// Batch number the units came from
    pub batch: String,
    /// Units left in that batch
    pub remaining: i32,
    /// Item total across all batches
    pub item_total: i64,
    pub dispensing_log_id: i64,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct NearExpiryParams {
    /// Look-ahead window in days; defaults to the configured window
    pub days: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ItemValuation {
    pub inventory_item_id: i64,
    pub name: String,
    pub total_quantity: i64,
    #[schema(value_type = String)]
    pub value: Decimal,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct StockValuation {
    #[schema(value_type = String, example = "15230.50")]
    pub total_value: Decimal,
    pub items: Vec<ItemValuation>,
}

// ============================================================================
// SHARED STOCK OPERATIONS
// ============================================================================

/// Rewrite `total_quantity` from the item's batches. Returns the new total,
/// or `None` when the item does not exist.
pub async fn recompute_item_total<'e>(
    executor: impl PgExecutor<'e>,
    inventory_item_id: i64,
) -> ApiResult<Option<i64>> {
    Ok(sqlx::query_scalar(
        r#"
        UPDATE inventory_items SET
            total_quantity = COALESCE(
                (SELECT SUM(current_quantity) FROM stock_batches WHERE inventory_item_id = $1),
                0
            ),
            updated_at = NOW()
        WHERE id = $1
        RETURNING total_quantity
        "#,
    )
    .bind(inventory_item_id)
    .fetch_optional(executor)
    .await?)
}

/// Fan out a low-stock notification when `total` is under the configured
/// threshold. Failures are logged; the stock change has already committed.
pub async fn alert_if_low(server: &ChelalServer, item_name: &str, total: i64) {
    if !is_low_stock(total, server.config.pharmacy.low_stock_threshold) {
        return;
    }

    let message = low_stock_message(item_name, total);
    match server
        .notifications()
        .notify_roles(&LOW_STOCK_RECIPIENTS, "Low stock", &message, LOW_STOCK_NOTIFICATION)
        .await
    {
        Ok(recipients) => info!(item = item_name, total, recipients, "Low stock alert sent"),
        Err(e) => warn!(error = %e, item = item_name, total, "Low stock alert failed"),
    }
}

async fn stocked_batches(server: &ChelalServer) -> ApiResult<Vec<StockBatch>> {
    Ok(sqlx::query_as::<_, StockBatch>(
        "SELECT * FROM stock_batches WHERE current_quantity > 0 ORDER BY expiry_date, id",
    )
    .fetch_all(&server.db_pool)
    .await?)
}

/// Batches with stock that expire within `days`, soonest first.
pub async fn near_expiry_batches(server: &ChelalServer, days: i64) -> ApiResult<Vec<StockBatch>> {
    let batches = stocked_batches(server).await?;
    let today = Utc::now().date_naive();
    Ok(near_expiry(&batches, today, days).into_iter().cloned().collect())
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn list_items(
    State(server): State<ChelalServer>,
    viewer: Viewer,
    ApiQuery(params): ApiQuery<InventoryListParams>,
) -> ApiResult<Json<ApiResponse<Vec<InventoryItem>>>> {
    viewer.require(&InventoryItem::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };

    let (rows, total) =
        fetch_page::<InventoryItem, _>(&server.db_pool, &pagination, ("name", "ASC"), |q| {
            q.filter_eq("category", params.category.clone())
                .search(&["name", "generic_name"], params.search.as_deref());
        })
        .await?;
    Ok(Json(pagination.wrap_response(rows, total)))
}

pub async fn create_item(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<InventoryItemRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<InventoryItem>>)> {
    auth.require(&InventoryItem::POLICY)?;
    req.validate()?;
    let name = req
        .name
        .as_deref()
        .map(str::trim)
        .ok_or_else(|| ApiError::validation("name is required"))?;

    let item = sqlx::query_as::<_, InventoryItem>(
        r#"
        INSERT INTO inventory_items (name, generic_name, category, unit, quantity, reorder_level)
        VALUES ($1, COALESCE($2, ''), COALESCE($3, ''), COALESCE($4, 'tablet'), COALESCE($5, 0), COALESCE($6, 10))
        RETURNING *
        "#,
    )
    .bind(name)
    .bind(&req.generic_name)
    .bind(&req.category)
    .bind(&req.unit)
    .bind(req.quantity)
    .bind(req.reorder_level)
    .fetch_one(&server.db_pool)
    .await?;

    info!(inventory_item_id = item.id, name = %item.name, "Inventory item created");
    Ok((StatusCode::CREATED, Json(api_success(item))))
}

pub async fn update_item(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<InventoryItemRequest>,
) -> ApiResult<Json<ApiResponse<InventoryItem>>> {
    auth.require(&InventoryItem::POLICY)?;
    req.validate()?;

    let item = sqlx::query_as::<_, InventoryItem>(
        r#"
        UPDATE inventory_items SET
            name = COALESCE($2, name),
            generic_name = COALESCE($3, generic_name),
            category = COALESCE($4, category),
            unit = COALESCE($5, unit),
            quantity = COALESCE($6, quantity),
            reorder_level = COALESCE($7, reorder_level),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.generic_name)
    .bind(&req.category)
    .bind(&req.unit)
    .bind(req.quantity)
    .bind(req.reorder_level)
    .fetch_optional(&server.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found(InventoryItem::LABEL))?;

    Ok(Json(api_success(item)))
}

/// `GET /inventory/:id/batches` in dispensing order
pub async fn item_batches(
    State(server): State<ChelalServer>,
    viewer: Viewer,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<Vec<StockBatch>>>> {
    viewer.require(&InventoryItem::POLICY)?;
    fetch_one::<InventoryItem>(&server.db_pool, id).await?;

    let batches = sqlx::query_as::<_, StockBatch>(
        "SELECT * FROM stock_batches WHERE inventory_item_id = $1 ORDER BY expiry_date, id",
    )
    .bind(id)
    .fetch_all(&server.db_pool)
    .await?;
    Ok(Json(api_success(batches)))
}

/// `POST /inventory/:id/adjust-stock`
pub async fn adjust_stock(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<AdjustStockRequest>,
) -> ApiResult<Json<ApiResponse<AdjustStockResponse>>> {
    auth.require(&InventoryItem::POLICY)?;

    let adjusted: Option<(String, i32)> = sqlx::query_as(
        r#"
        UPDATE inventory_items
        SET quantity = quantity + $2, updated_at = NOW()
        WHERE id = $1 AND quantity + $2 >= 0
        RETURNING name, quantity
        "#,
    )
    .bind(id)
    .bind(req.amount)
    .fetch_optional(&server.db_pool)
    .await?;

    let (name, new_quantity) = match adjusted {
        Some(row) => row,
        None => {
            fetch_one::<InventoryItem>(&server.db_pool, id).await?;
            return Err(ApiError::validation("Adjustment would make the quantity negative"));
        }
    };

    info!(inventory_item_id = id, amount = req.amount, new_quantity, by = auth.user_id, "Stock adjusted");
    alert_if_low(&server, &name, i64::from(new_quantity)).await;

    Ok(Json(api_success(AdjustStockResponse {
        status: "stock adjusted".to_string(),
        new_quantity,
    })))
}

/// `POST /inventory/:id/dispense`
///
/// Draws the full quantity from the single batch chosen by FEFO. Everything
/// up to the commit runs in one transaction with the item's batches locked,
/// so concurrent dispenses of the same item serialize.
#[utoipa::path(
    post,
    path = "/api/inventory/{id}/dispense",
    tag = "pharmacy",
    params(("id" = i64, Path, description = "Inventory item id")),
    request_body = DispenseRequest,
    responses(
        (status = 200, description = "Dispensed", body = DispenseResponse),
        (status = 400, description = "Invalid quantity or insufficient stock"),
        (status = 403, description = "Caller is not a pharmacist"),
        (status = 404, description = "Prescription or item not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn dispense(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<DispenseRequest>,
) -> ApiResult<Json<ApiResponse<DispenseResponse>>> {
    auth.require(&InventoryItem::POLICY)?;
    validate_dispense_quantity(req.quantity)?;

    let mut tx = database_layer::begin(&server.db_pool).await?;

    sqlx::query_scalar::<_, i64>("SELECT id FROM prescriptions WHERE id = $1")
        .bind(req.prescription_id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found(Prescription::LABEL))?;

    let item = sqlx::query_as::<_, InventoryItem>("SELECT * FROM inventory_items WHERE id = $1 FOR UPDATE")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found(InventoryItem::LABEL))?;

    let mut batches = sqlx::query_as::<_, StockBatch>(
        r#"
        SELECT * FROM stock_batches
        WHERE inventory_item_id = $1
        ORDER BY expiry_date, id
        FOR UPDATE
        "#,
    )
    .bind(id)
    .fetch_all(&mut *tx)
    .await?;

    // Insufficient stock returns here and the transaction rolls back on drop.
    let plan = pharmacy_service::dispense(&mut batches, id, req.quantity, Utc::now().date_naive())?;

    sqlx::query("UPDATE stock_batches SET current_quantity = current_quantity - $2 WHERE id = $1")
        .bind(plan.batch_id)
        .bind(plan.quantity)
        .execute(&mut *tx)
        .await?;

    sqlx::query("UPDATE inventory_items SET total_quantity = $2, updated_at = NOW() WHERE id = $1")
        .bind(id)
        .bind(plan.item_total)
        .execute(&mut *tx)
        .await?;

    let log_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO dispensing_logs (prescription_id, stock_batch_id, quantity_dispensed, dispensed_by)
        VALUES ($1, $2, $3, $4)
        RETURNING id
        "#,
    )
    .bind(req.prescription_id)
    .bind(plan.batch_id)
    .bind(plan.quantity)
    .bind(auth.user_id)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;

    info!(
        inventory_item_id = id,
        prescription_id = req.prescription_id,
        batch_id = plan.batch_id,
        quantity = plan.quantity,
        item_total = plan.item_total,
        dispensed_by = auth.user_id,
        "Medication dispensed"
    );
    alert_if_low(&server, &item.name, plan.item_total).await;

    Ok(Json(api_success(DispenseResponse {
        status: "dispensed".to_string(),
        batch: plan.batch_number,
        remaining: plan.remaining,
        item_total: plan.item_total,
        dispensing_log_id: log_id,
    })))
}

/// `GET /inventory/near-expiry?days=`
pub async fn list_near_expiry(
    State(server): State<ChelalServer>,
    viewer: Viewer,
    ApiQuery(params): ApiQuery<NearExpiryParams>,
) -> ApiResult<Json<ApiResponse<Vec<StockBatch>>>> {
    viewer.require(&InventoryItem::POLICY)?;
    let days = params.days.unwrap_or(server.config.pharmacy.near_expiry_days);
    if !(0..=MAX_NEAR_EXPIRY_DAYS).contains(&days) {
        return Err(ApiError::validation(format!(
            "days must be between 0 and {}",
            MAX_NEAR_EXPIRY_DAYS
        )));
    }
    Ok(Json(api_success(near_expiry_batches(&server, days).await?)))
}

/// `GET /inventory/stock-valuation`: cost of stock on hand per item.
pub async fn stock_valuation_report(
    State(server): State<ChelalServer>,
    viewer: Viewer,
) -> ApiResult<Json<ApiResponse<StockValuation>>> {
    viewer.require(&InventoryItem::POLICY)?;

    let names: BTreeMap<i64, String> =
        sqlx::query_as::<_, (i64, String)>("SELECT id, name FROM inventory_items")
            .fetch_all(&server.db_pool)
            .await?
            .into_iter()
            .collect();

    let mut by_item: BTreeMap<i64, Vec<StockBatch>> = BTreeMap::new();
    for batch in stocked_batches(&server).await? {
        by_item.entry(batch.inventory_item_id).or_default().push(batch);
    }

    let items: Vec<ItemValuation> = by_item
        .iter()
        .map(|(item_id, batches)| ItemValuation {
            inventory_item_id: *item_id,
            name: names.get(item_id).cloned().unwrap_or_default(),
            total_quantity: pharmacy_service::total_remaining(batches),
            value: stock_valuation(batches),
        })
        .collect();
    let total_value: Decimal = items.iter().map(|item| item.value).sum();

    Ok(Json(api_success(StockValuation { total_value, items })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_reorder_level_is_rejected() {
        let req: InventoryItemRequest =
            serde_json::from_str(r#"{"name": "Amoxicillin 500mg", "reorder_level": -5}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn partial_update_is_valid() {
        let req: InventoryItemRequest = serde_json::from_str(r#"{"category": "antibiotics"}"#).unwrap();
        assert!(req.validate().is_ok());
    }

    #[test]
    fn dispense_response_shape() {
        let body = serde_json::to_value(DispenseResponse {
            status: "dispensed".into(),
            batch: "B-2025-03".into(),
            remaining: 15,
            item_total: 18,
            dispensing_log_id: 4,
        })
        .unwrap();
        assert_eq!(body["status"], "dispensed");
        assert_eq!(body["batch"], "B-2025-03");
        assert_eq!(body["item_total"], 18);
    }
}
