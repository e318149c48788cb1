//! Laboratory orders
//!
//! An order belongs to an encounter and carries one item per requested
//! test. Results are posted per item; the order completes once every item
//! has a result.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use database_layer::PgTransaction;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use utoipa::{IntoParams, ToSchema};

use crate::auth::policy;
use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::handlers::common::{fetch_one, fetch_page, Resource};
use crate::middleware::{ApiJson, ApiPath, ApiQuery, AuthContext};
use crate::server::ChelalServer;
use crate::types::PaginationParams;
use crate::validation::RequestValidation;
use crate::{validate_length, validate_one_of, validate_required};

pub const STATUSES: [&str; 4] = ["ordered", "in_progress", "completed", "cancelled"];
pub const PRIORITIES: [&str; 3] = ["routine", "urgent", "stat"];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LabOrder {
    pub id: i64,
    pub encounter_id: i64,
    pub ordered_by: Option<i64>,
    #[schema(example = "ordered")]
    pub status: String,
    #[schema(example = "routine")]
    pub priority: String,
    pub notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Resource for LabOrder {
    const TABLE: &'static str = "lab_orders";
    const LABEL: &'static str = "Lab order";
    const POLICY: policy::Policy = policy::LAB_ORDERS;
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LabOrderItem {
    pub id: i64,
    pub lab_order_id: i64,
    #[schema(example = "Full blood count")]
    pub test_name: String,
    pub result_value: Option<String>,
    pub unit: String,
    pub reference_range: String,
    pub resulted_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LabOrderDetail {
    #[serde(flatten)]
    pub order: LabOrder,
    pub items: Vec<LabOrderItem>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewLabTest {
    pub test_name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub reference_range: String,
}

impl RequestValidation for NewLabTest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.test_name, "test_name is required");
        validate_length!(self.test_name, 1, 255, "test_name must be at most 255 characters");
        Ok(())
    }
}

/// Body for both `POST /lab-orders` and `POST /encounters/:id/lab-orders`.
/// The nested route takes the encounter from the path.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateLabOrderRequest {
    pub encounter_id: Option<i64>,
    pub priority: Option<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub tests: Vec<NewLabTest>,
}

impl RequestValidation for CreateLabOrderRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(priority) = &self.priority {
            validate_one_of!(priority, PRIORITIES, "priority must be routine, urgent or stat");
        }
        self.tests.iter().try_for_each(|test| test.validate())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddLabTestsRequest {
    pub items: Vec<NewLabTest>,
}

impl RequestValidation for AddLabTestsRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.items.is_empty() {
            return Err(ApiError::validation("items must not be empty"));
        }
        self.items.iter().try_for_each(|test| test.validate())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateLabOrderRequest {
    pub status: Option<String>,
    pub priority: Option<String>,
    pub notes: Option<String>,
}

impl RequestValidation for UpdateLabOrderRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(status) = &self.status {
            validate_one_of!(status, STATUSES, "Invalid lab order status");
        }
        if let Some(priority) = &self.priority {
            validate_one_of!(priority, PRIORITIES, "priority must be routine, urgent or stat");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LabResult {
    pub item_id: i64,
    pub result_value: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RecordResultsRequest {
    pub results: Vec<LabResult>,
}

impl RequestValidation for RecordResultsRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if self.results.is_empty() {
            return Err(ApiError::validation("results must not be empty"));
        }
        for result in &self.results {
            validate_required!(result.result_value, "result_value is required");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct LabOrderListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub encounter_id: Option<i64>,
    pub status: Option<String>,
}

async fn order_items(pool: &PgPool, order_id: i64) -> ApiResult<Vec<LabOrderItem>> {
    Ok(sqlx::query_as::<_, LabOrderItem>(
        "SELECT * FROM lab_order_items WHERE lab_order_id = $1 ORDER BY id",
    )
    .bind(order_id)
    .fetch_all(pool)
    .await?)
}

async fn insert_tests(
    tx: &mut PgTransaction,
    order_id: i64,
    tests: &[NewLabTest],
) -> ApiResult<Vec<LabOrderItem>> {
    let mut items = Vec::with_capacity(tests.len());
    for test in tests {
        let item = sqlx::query_as::<_, LabOrderItem>(
            r#"
            INSERT INTO lab_order_items (lab_order_id, test_name, unit, reference_range)
            VALUES ($1, $2, $3, $4)
            RETURNING *
            "#,
        )
        .bind(order_id)
        .bind(test.test_name.trim())
        .bind(&test.unit)
        .bind(&test.reference_range)
        .fetch_one(&mut **tx)
        .await?;
        items.push(item);
    }
    Ok(items)
}

/// Create an order with its tests in one transaction.
pub async fn insert_lab_order(
    pool: &PgPool,
    encounter_id: i64,
    req: &CreateLabOrderRequest,
    ordered_by: i64,
) -> ApiResult<LabOrderDetail> {
    let mut tx = database_layer::begin(pool).await?;

    let order = sqlx::query_as::<_, LabOrder>(
        r#"
        INSERT INTO lab_orders (encounter_id, ordered_by, priority, notes)
        VALUES ($1, $2, COALESCE($3, 'routine'), $4)
        RETURNING *
        "#,
    )
    .bind(encounter_id)
    .bind(ordered_by)
    .bind(&req.priority)
    .bind(&req.notes)
    .fetch_one(&mut *tx)
    .await?;

    let items = insert_tests(&mut tx, order.id, &req.tests).await?;

    tx.commit().await?;
    tracing::info!(lab_order_id = order.id, encounter_id, tests = items.len(), "Lab order placed");
    Ok(LabOrderDetail { order, items })
}

pub async fn list_lab_orders(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiQuery(params): ApiQuery<LabOrderListParams>,
) -> ApiResult<Json<ApiResponse<Vec<LabOrder>>>> {
    auth.require(&LabOrder::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };

    let (rows, total) =
        fetch_page::<LabOrder, _>(&server.db_pool, &pagination, ("created_at", "DESC"), |q| {
            q.filter_eq("encounter_id", params.encounter_id)
                .filter_eq("status", params.status.clone());
        })
        .await?;
    Ok(Json(pagination.wrap_response(rows, total)))
}

pub async fn get_lab_order(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<LabOrderDetail>>> {
    auth.require(&LabOrder::POLICY)?;
    let order = fetch_one::<LabOrder>(&server.db_pool, id).await?;
    let items = order_items(&server.db_pool, id).await?;
    Ok(Json(api_success(LabOrderDetail { order, items })))
}

pub async fn create_lab_order(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateLabOrderRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<LabOrderDetail>>)> {
    auth.require(&LabOrder::POLICY)?;
    req.validate()?;
    let encounter_id = req
        .encounter_id
        .ok_or_else(|| ApiError::validation("encounter_id is required"))?;

    let detail = insert_lab_order(&server.db_pool, encounter_id, &req, auth.user_id).await?;
    Ok((StatusCode::CREATED, Json(api_success(detail))))
}

pub async fn update_lab_order(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateLabOrderRequest>,
) -> ApiResult<Json<ApiResponse<LabOrder>>> {
    auth.require(&LabOrder::POLICY)?;
    req.validate()?;

    let order = sqlx::query_as::<_, LabOrder>(
        r#"
        UPDATE lab_orders SET
            status = COALESCE($2, status),
            priority = COALESCE($3, priority),
            notes = COALESCE($4, notes),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&req.status)
    .bind(&req.priority)
    .bind(&req.notes)
    .fetch_optional(&server.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found(LabOrder::LABEL))?;

    Ok(Json(api_success(order)))
}

/// `POST /lab-orders/:id/items`
pub async fn add_lab_tests(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<AddLabTestsRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Vec<LabOrderItem>>>)> {
    auth.require(&LabOrder::POLICY)?;
    req.validate()?;
    let order = fetch_one::<LabOrder>(&server.db_pool, id).await?;
    if order.status == "completed" || order.status == "cancelled" {
        return Err(ApiError::conflict(format!("Lab order is {}", order.status)));
    }

    let mut tx = database_layer::begin(&server.db_pool).await?;
    let items = insert_tests(&mut tx, id, &req.items).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(api_success(items))))
}

/// `PUT /lab-orders/:id/results`
pub async fn record_results(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<RecordResultsRequest>,
) -> ApiResult<Json<ApiResponse<LabOrderDetail>>> {
    auth.require(&LabOrder::POLICY)?;
    req.validate()?;

    let mut tx = database_layer::begin(&server.db_pool).await?;
    for result in &req.results {
        let updated = sqlx::query(
            r#"
            UPDATE lab_order_items
            SET result_value = $3, resulted_at = NOW()
            WHERE id = $1 AND lab_order_id = $2
            "#,
        )
        .bind(result.item_id)
        .bind(id)
        .bind(result.result_value.trim())
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(ApiError::not_found("Lab order item"));
        }
    }

    let order = sqlx::query_as::<_, LabOrder>(
        r#"
        UPDATE lab_orders SET
            status = CASE
                WHEN NOT EXISTS (
                    SELECT 1 FROM lab_order_items
                    WHERE lab_order_id = $1 AND result_value IS NULL
                ) THEN 'completed'
                ELSE 'in_progress'
            END,
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found(LabOrder::LABEL))?;
    tx.commit().await?;

    tracing::info!(lab_order_id = id, status = %order.status, "Lab results recorded");
    let items = order_items(&server.db_pool, id).await?;
    Ok(Json(api_success(LabOrderDetail { order, items })))
}

/// Orders for one encounter, oldest first.
pub async fn orders_for_encounter(pool: &PgPool, encounter_id: i64) -> ApiResult<Vec<LabOrder>> {
    Ok(sqlx::query_as::<_, LabOrder>(
        "SELECT * FROM lab_orders WHERE encounter_id = $1 ORDER BY created_at, id",
    )
    .bind(encounter_id)
    .fetch_all(pool)
    .await?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_must_be_known() {
        let req: CreateLabOrderRequest =
            serde_json::from_str(r#"{"encounter_id": 1, "priority": "asap"}"#).unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn blank_test_names_are_rejected() {
        let req: CreateLabOrderRequest = serde_json::from_str(
            r#"{"encounter_id": 1, "tests": [{"test_name": "Malaria RDT"}, {"test_name": " "}]}"#,
        )
        .unwrap();
        assert!(req.validate().is_err());
    }

    #[test]
    fn results_need_values() {
        let req = RecordResultsRequest { results: vec![] };
        assert!(req.validate().is_err());
        let req = RecordResultsRequest {
            results: vec![LabResult {
                item_id: 1,
                result_value: "negative".into(),
            }],
        };
        assert!(req.validate().is_ok());
    }
}
