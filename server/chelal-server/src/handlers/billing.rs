//! Bills, bill items and payments
//!
//! A bill's total follows its items and `is_paid` follows its payments.
//! Every write that touches either runs in one transaction together with
//! the reconciliation of the parent bill.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use billing_service::{LineItem, PaymentMethod, PaymentStatus};
use chrono::{DateTime, Utc};
use database_layer::PgTransaction;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{policy, RoleName};
use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::handlers::common::{fetch_page, Resource};
use crate::middleware::{ApiJson, ApiPath, ApiQuery, AuthContext};
use crate::server::ChelalServer;
use crate::services::AuditAction;
use crate::types::PaginationParams;
use crate::validation::RequestValidation;
use crate::{validate_length, validate_required};

/// Roles allowed to see bills at all.
const BILL_VIEWERS: [RoleName; 4] = [
    RoleName::Admin,
    RoleName::Doctor,
    RoleName::Nurse,
    RoleName::Receptionist,
];

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Bill {
    pub id: i64,
    pub patient_id: i64,
    pub encounter_id: Option<i64>,
    pub date_issued: DateTime<Utc>,
    #[schema(value_type = String, example = "150.00")]
    pub total_amount: Decimal,
    pub is_paid: bool,
    pub notes: String,
}

impl Resource for Bill {
    const TABLE: &'static str = "bills";
    const LABEL: &'static str = "Bill";
    const POLICY: policy::Policy = policy::BILLING;
    const AUDIT_AS: Option<&'static str> = Some("bill");
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct BillItem {
    pub id: i64,
    pub bill_id: i64,
    #[schema(example = "Consultation")]
    pub description: String,
    #[schema(value_type = String, example = "50.00")]
    pub amount: Decimal,
    pub quantity: i32,
}

impl BillItem {
    fn line(&self) -> LineItem {
        LineItem::new(self.amount, self.quantity)
    }
}

impl Resource for BillItem {
    const TABLE: &'static str = "bill_items";
    const LABEL: &'static str = "Bill item";
    const POLICY: policy::Policy = policy::BILLING;
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Payment {
    pub id: i64,
    pub bill_id: i64,
    #[schema(value_type = String, example = "50.00")]
    pub amount: Decimal,
    pub payment_date: DateTime<Utc>,
    #[schema(example = "Cash")]
    pub method: String,
    pub reference: String,
    pub received_by: Option<i64>,
}

impl Resource for Payment {
    const TABLE: &'static str = "payments";
    const LABEL: &'static str = "Payment";
    const POLICY: policy::Policy = policy::BILLING;
    const AUDIT_AS: Option<&'static str> = Some("payment");
}

#[derive(Debug, Serialize, ToSchema)]
pub struct BillDetail {
    #[serde(flatten)]
    pub bill: Bill,
    pub items: Vec<BillItem>,
    pub payments: Vec<Payment>,
    pub status: PaymentStatus,
}

/// A recorded payment and the settlement state of its bill afterwards.
#[derive(Debug, Serialize, ToSchema)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub status: PaymentStatus,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewBillItem {
    pub description: String,
    #[schema(value_type = String)]
    pub amount: Decimal,
    #[serde(default = "default_quantity")]
    pub quantity: i32,
}

fn default_quantity() -> i32 {
    1
}

impl RequestValidation for NewBillItem {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.description, "description is required");
        validate_length!(self.description, 1, 255, "description must be at most 255 characters");
        billing_service::validate_line_amount(self.amount)?;
        billing_service::validate_quantity(self.quantity)?;
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBillRequest {
    pub patient_id: i64,
    pub encounter_id: Option<i64>,
    /// Used only when the bill is created without items
    #[schema(value_type = Option<String>)]
    pub total_amount: Option<Decimal>,
    #[serde(default)]
    pub notes: String,
    #[serde(default)]
    pub items: Vec<NewBillItem>,
}

impl RequestValidation for CreateBillRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(total) = self.total_amount {
            billing_service::validate_line_amount(total)?;
        }
        self.items.iter().try_for_each(|item| item.validate())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBillRequest {
    pub encounter_id: Option<i64>,
    #[schema(value_type = Option<String>)]
    pub total_amount: Option<Decimal>,
    pub notes: Option<String>,
}

/// A bill with items has its total derived from them, so only an itemless
/// bill accepts a manual total.
fn check_manual_total(total: Option<Decimal>, item_count: i64) -> ApiResult<()> {
    match total {
        Some(_) if item_count > 0 => Err(ApiError::validation(
            "total_amount is computed from bill items and cannot be set on a bill that has items.",
        )),
        _ => Ok(()),
    }
}

impl RequestValidation for UpdateBillRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(total) = self.total_amount {
            billing_service::validate_line_amount(total)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateBillItemRequest {
    pub bill_id: i64,
    #[serde(flatten)]
    pub item: NewBillItem,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateBillItemRequest {
    pub description: Option<String>,
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    pub quantity: Option<i32>,
}

impl RequestValidation for UpdateBillItemRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(description) = &self.description {
            validate_required!(description, "description cannot be blank");
        }
        if let Some(amount) = self.amount {
            billing_service::validate_line_amount(amount)?;
        }
        if let Some(quantity) = self.quantity {
            billing_service::validate_quantity(quantity)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct NewPayment {
    #[schema(value_type = String, example = "50.00")]
    pub amount: Decimal,
    #[schema(example = "Cash")]
    pub method: String,
    #[serde(default)]
    pub reference: String,
}

impl NewPayment {
    /// Validated payment method.
    fn payment_method(&self) -> ApiResult<PaymentMethod> {
        billing_service::validate_amount(self.amount)?;
        validate_length!(self.reference, 0, 100, "reference must be at most 100 characters");
        Ok(self.method.parse::<PaymentMethod>()?)
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreatePaymentRequest {
    pub bill_id: i64,
    #[serde(flatten)]
    pub payment: NewPayment,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePaymentRequest {
    #[schema(value_type = Option<String>)]
    pub amount: Option<Decimal>,
    pub method: Option<String>,
    pub reference: Option<String>,
}

impl UpdatePaymentRequest {
    fn payment_method(&self) -> ApiResult<Option<PaymentMethod>> {
        if let Some(amount) = self.amount {
            billing_service::validate_amount(amount)?;
        }
        Ok(self
            .method
            .as_deref()
            .map(str::parse::<PaymentMethod>)
            .transpose()?)
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BillListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub patient_id: Option<i64>,
    pub is_paid: Option<bool>,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct BillChildParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub bill_id: Option<i64>,
}

fn can_view_bills(auth: &AuthContext) -> bool {
    BILL_VIEWERS.into_iter().any(|role| auth.has_role(role))
}

/// Recompute the bill total from its items.
async fn recompute_total(tx: &mut PgTransaction, bill_id: i64) -> ApiResult<()> {
    let items = sqlx::query_as::<_, BillItem>("SELECT * FROM bill_items WHERE bill_id = $1")
        .bind(bill_id)
        .fetch_all(&mut **tx)
        .await?;
    let lines: Vec<LineItem> = items.iter().map(BillItem::line).collect();
    let total = billing_service::bill_total(&lines);

    sqlx::query("UPDATE bills SET total_amount = $2 WHERE id = $1")
        .bind(bill_id)
        .bind(total)
        .execute(&mut **tx)
        .await?;
    tracing::debug!(bill_id, %total, items = lines.len(), "Bill total recomputed");
    Ok(())
}

async fn lock_bill(tx: &mut PgTransaction, bill_id: i64) -> ApiResult<()> {
    sqlx::query_scalar::<_, i64>("SELECT id FROM bills WHERE id = $1 FOR UPDATE")
        .bind(bill_id)
        .fetch_optional(&mut **tx)
        .await?
        .map(|_| ())
        .ok_or_else(|| ApiError::not_found(Bill::LABEL))
}

/// Settle `is_paid` against the stored total and return the result.
async fn reconcile_payments(tx: &mut PgTransaction, bill_id: i64) -> ApiResult<PaymentStatus> {
    let total: Decimal = sqlx::query_scalar("SELECT total_amount FROM bills WHERE id = $1 FOR UPDATE")
        .bind(bill_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or_else(|| ApiError::not_found(Bill::LABEL))?;
    let payments: Vec<Decimal> = sqlx::query_scalar("SELECT amount FROM payments WHERE bill_id = $1")
        .bind(bill_id)
        .fetch_all(&mut **tx)
        .await?;

    let status = billing_service::payment_status(total, payments);
    sqlx::query("UPDATE bills SET is_paid = $2 WHERE id = $1")
        .bind(bill_id)
        .bind(status.is_paid)
        .execute(&mut **tx)
        .await?;
    Ok(status)
}

async fn insert_item(tx: &mut PgTransaction, bill_id: i64, item: &NewBillItem) -> ApiResult<BillItem> {
    Ok(sqlx::query_as::<_, BillItem>(
        r#"
        INSERT INTO bill_items (bill_id, description, amount, quantity)
        VALUES ($1, $2, $3, $4)
        RETURNING *
        "#,
    )
    .bind(bill_id)
    .bind(item.description.trim())
    .bind(item.amount)
    .bind(item.quantity)
    .fetch_one(&mut **tx)
    .await?)
}

async fn insert_payment(
    tx: &mut PgTransaction,
    bill_id: i64,
    payment: &NewPayment,
    method: PaymentMethod,
    received_by: i64,
) -> ApiResult<Payment> {
    Ok(sqlx::query_as::<_, Payment>(
        r#"
        INSERT INTO payments (bill_id, amount, method, reference, received_by)
        VALUES ($1, $2, $3, $4, $5)
        RETURNING *
        "#,
    )
    .bind(bill_id)
    .bind(payment.amount)
    .bind(method.as_str())
    .bind(payment.reference.trim())
    .bind(received_by)
    .fetch_one(&mut **tx)
    .await?)
}

async fn bill_detail(server: &ChelalServer, bill: Bill) -> ApiResult<BillDetail> {
    let items = sqlx::query_as::<_, BillItem>("SELECT * FROM bill_items WHERE bill_id = $1 ORDER BY id")
        .bind(bill.id)
        .fetch_all(&server.db_pool)
        .await?;
    let payments = bill_payments(server, bill.id).await?;
    let status = billing_service::payment_status(bill.total_amount, payments.iter().map(|p| p.amount));
    Ok(BillDetail {
        bill,
        items,
        payments,
        status,
    })
}

async fn bill_payments(server: &ChelalServer, bill_id: i64) -> ApiResult<Vec<Payment>> {
    Ok(
        sqlx::query_as::<_, Payment>("SELECT * FROM payments WHERE bill_id = $1 ORDER BY payment_date")
            .bind(bill_id)
            .fetch_all(&server.db_pool)
            .await?,
    )
}

async fn fetch_bill(server: &ChelalServer, id: i64) -> ApiResult<Bill> {
    sqlx::query_as::<_, Bill>("SELECT * FROM bills WHERE id = $1")
        .bind(id)
        .fetch_optional(&server.db_pool)
        .await?
        .ok_or_else(|| ApiError::not_found(Bill::LABEL))
}

async fn audit_payment(server: &ChelalServer, auth: &AuthContext, action: AuditAction, payment: &Payment) {
    server
        .audit()
        .record(
            Some(auth.user_id),
            action,
            "payment",
            payment.id,
            format!("Payment of {} on bill {}", payment.amount, payment.bill_id),
            Some(serde_json::json!({ "bill_id": payment.bill_id, "method": payment.method })),
        )
        .await;
}

// ---- bills ----

pub async fn list_bills(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiQuery(params): ApiQuery<BillListParams>,
) -> ApiResult<Json<ApiResponse<Vec<Bill>>>> {
    auth.require(&Bill::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };
    let visible = can_view_bills(&auth);

    let (rows, total) = fetch_page::<Bill, _>(&server.db_pool, &pagination, ("date_issued", "DESC"), |q| {
        if !visible {
            q.filter_raw("1 = 0");
        }
        q.filter_eq("patient_id", params.patient_id)
            .filter_eq("is_paid", params.is_paid);
    })
    .await?;
    Ok(Json(pagination.wrap_response(rows, total)))
}

pub async fn get_bill(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<BillDetail>>> {
    auth.require(&Bill::POLICY)?;
    if !can_view_bills(&auth) {
        return Err(ApiError::not_found(Bill::LABEL));
    }
    let bill = fetch_bill(&server, id).await?;
    Ok(Json(api_success(bill_detail(&server, bill).await?)))
}

pub async fn create_bill(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateBillRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Bill>>)> {
    auth.require(&Bill::POLICY)?;
    req.validate()?;

    let mut tx = database_layer::begin(&server.db_pool).await?;
    let bill_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO bills (patient_id, encounter_id, total_amount, notes)
        VALUES ($1, $2, COALESCE($3, 0), $4)
        RETURNING id
        "#,
    )
    .bind(req.patient_id)
    .bind(req.encounter_id)
    .bind(req.total_amount)
    .bind(&req.notes)
    .fetch_one(&mut *tx)
    .await?;

    for item in &req.items {
        insert_item(&mut tx, bill_id, item).await?;
    }
    if !req.items.is_empty() {
        recompute_total(&mut tx, bill_id).await?;
    }
    reconcile_payments(&mut tx, bill_id).await?;
    let bill = sqlx::query_as::<_, Bill>("SELECT * FROM bills WHERE id = $1")
        .bind(bill_id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(bill_id, patient_id = bill.patient_id, total = %bill.total_amount, "Bill issued");
    server
        .audit()
        .record(
            Some(auth.user_id),
            AuditAction::Create,
            "bill",
            bill.id,
            format!("Bill issued for {}", bill.total_amount),
            Some(serde_json::json!({ "patient_id": bill.patient_id })),
        )
        .await;

    Ok((StatusCode::CREATED, Json(api_success(bill))))
}

pub async fn update_bill(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateBillRequest>,
) -> ApiResult<Json<ApiResponse<Bill>>> {
    auth.require(&Bill::POLICY)?;
    req.validate()?;

    let mut tx = database_layer::begin(&server.db_pool).await?;
    lock_bill(&mut tx, id).await?;
    if req.total_amount.is_some() {
        let item_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM bill_items WHERE bill_id = $1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        check_manual_total(req.total_amount, item_count)?;
    }

    sqlx::query(
        r#"
        UPDATE bills SET
            encounter_id = COALESCE($2, encounter_id),
            total_amount = COALESCE($3, total_amount),
            notes = COALESCE($4, notes)
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(req.encounter_id)
    .bind(req.total_amount)
    .bind(&req.notes)
    .execute(&mut *tx)
    .await?;
    reconcile_payments(&mut tx, id).await?;
    let bill = sqlx::query_as::<_, Bill>("SELECT * FROM bills WHERE id = $1")
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;
    tx.commit().await?;

    server
        .audit()
        .record(Some(auth.user_id), AuditAction::Edit, "bill", id, "Updated bill", None)
        .await;
    Ok(Json(api_success(bill)))
}

/// `GET /bills/:id/payments`
pub async fn list_bill_payments(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<Vec<Payment>>>> {
    auth.require(&Payment::POLICY)?;
    fetch_bill(&server, id).await?;
    Ok(Json(api_success(bill_payments(&server, id).await?)))
}

/// `POST /bills/:id/payments`
#[utoipa::path(
    post,
    path = "/api/bills/{id}/payments",
    tag = "billing",
    params(("id" = i64, Path, description = "Bill id")),
    request_body = NewPayment,
    responses(
        (status = 201, description = "Payment recorded and bill reconciled", body = PaymentReceipt),
        (status = 400, description = "Invalid amount or payment method"),
        (status = 404, description = "Bill not found")
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_bill_payment(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<NewPayment>,
) -> ApiResult<(StatusCode, Json<ApiResponse<PaymentReceipt>>)> {
    auth.require(&Payment::POLICY)?;
    let method = req.payment_method()?;
    record_payment(&server, &auth, id, &req, method).await
}

async fn record_payment(
    server: &ChelalServer,
    auth: &AuthContext,
    bill_id: i64,
    req: &NewPayment,
    method: PaymentMethod,
) -> ApiResult<(StatusCode, Json<ApiResponse<PaymentReceipt>>)> {
    let mut tx = database_layer::begin(&server.db_pool).await?;
    // Lock the bill first so concurrent payments reconcile in order.
    reconcile_payments(&mut tx, bill_id).await?;
    let payment = insert_payment(&mut tx, bill_id, req, method, auth.user_id).await?;
    let status = reconcile_payments(&mut tx, bill_id).await?;
    tx.commit().await?;

    tracing::info!(
        bill_id,
        payment_id = payment.id,
        amount = %payment.amount,
        is_paid = status.is_paid,
        "Payment recorded"
    );
    audit_payment(server, auth, AuditAction::Create, &payment).await;
    Ok((StatusCode::CREATED, Json(api_success(PaymentReceipt { payment, status }))))
}

// ---- bill items ----

pub async fn list_bill_items(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiQuery(params): ApiQuery<BillChildParams>,
) -> ApiResult<Json<ApiResponse<Vec<BillItem>>>> {
    auth.require(&BillItem::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };

    let (rows, total) = fetch_page::<BillItem, _>(&server.db_pool, &pagination, ("id", "ASC"), |q| {
        q.filter_eq("bill_id", params.bill_id);
    })
    .await?;
    Ok(Json(pagination.wrap_response(rows, total)))
}

pub async fn create_bill_item(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateBillItemRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<BillItem>>)> {
    auth.require(&BillItem::POLICY)?;
    req.item.validate()?;

    let mut tx = database_layer::begin(&server.db_pool).await?;
    let item = insert_item(&mut tx, req.bill_id, &req.item).await?;
    recompute_total(&mut tx, req.bill_id).await?;
    reconcile_payments(&mut tx, req.bill_id).await?;
    tx.commit().await?;

    Ok((StatusCode::CREATED, Json(api_success(item))))
}

pub async fn update_bill_item(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateBillItemRequest>,
) -> ApiResult<Json<ApiResponse<BillItem>>> {
    auth.require(&BillItem::POLICY)?;
    req.validate()?;

    let mut tx = database_layer::begin(&server.db_pool).await?;
    let item = sqlx::query_as::<_, BillItem>(
        r#"
        UPDATE bill_items SET
            description = COALESCE($2, description),
            amount = COALESCE($3, amount),
            quantity = COALESCE($4, quantity)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.description.as_deref().map(str::trim))
    .bind(req.amount)
    .bind(req.quantity)
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found(BillItem::LABEL))?;
    recompute_total(&mut tx, item.bill_id).await?;
    reconcile_payments(&mut tx, item.bill_id).await?;
    tx.commit().await?;

    Ok(Json(api_success(item)))
}

pub async fn delete_bill_item(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    auth.require(&BillItem::POLICY)?;

    let mut tx = database_layer::begin(&server.db_pool).await?;
    let bill_id: i64 = sqlx::query_scalar("DELETE FROM bill_items WHERE id = $1 RETURNING bill_id")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found(BillItem::LABEL))?;
    recompute_total(&mut tx, bill_id).await?;
    reconcile_payments(&mut tx, bill_id).await?;
    tx.commit().await?;

    Ok(StatusCode::NO_CONTENT)
}

// ---- payments ----

pub async fn list_payments(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiQuery(params): ApiQuery<BillChildParams>,
) -> ApiResult<Json<ApiResponse<Vec<Payment>>>> {
    auth.require(&Payment::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };

    let (rows, total) =
        fetch_page::<Payment, _>(&server.db_pool, &pagination, ("payment_date", "DESC"), |q| {
            q.filter_eq("bill_id", params.bill_id);
        })
        .await?;
    Ok(Json(pagination.wrap_response(rows, total)))
}

pub async fn create_payment(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreatePaymentRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<PaymentReceipt>>)> {
    auth.require(&Payment::POLICY)?;
    let method = req.payment.payment_method()?;
    record_payment(&server, &auth, req.bill_id, &req.payment, method).await
}

pub async fn update_payment(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdatePaymentRequest>,
) -> ApiResult<Json<ApiResponse<PaymentReceipt>>> {
    auth.require(&Payment::POLICY)?;
    let method = req.payment_method()?;

    let mut tx = database_layer::begin(&server.db_pool).await?;
    let payment = sqlx::query_as::<_, Payment>(
        r#"
        UPDATE payments SET
            amount = COALESCE($2, amount),
            method = COALESCE($3, method),
            reference = COALESCE($4, reference)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.amount)
    .bind(method.map(|m| m.as_str()))
    .bind(req.reference.as_deref().map(str::trim))
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::not_found(Payment::LABEL))?;
    let status = reconcile_payments(&mut tx, payment.bill_id).await?;
    tx.commit().await?;

    audit_payment(&server, &auth, AuditAction::Edit, &payment).await;
    Ok(Json(api_success(PaymentReceipt { payment, status })))
}

pub async fn delete_payment(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    auth.require(&Payment::POLICY)?;

    let mut tx = database_layer::begin(&server.db_pool).await?;
    let payment = sqlx::query_as::<_, Payment>("DELETE FROM payments WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| ApiError::not_found(Payment::LABEL))?;
    let status = reconcile_payments(&mut tx, payment.bill_id).await?;
    tx.commit().await?;

    tracing::info!(
        bill_id = payment.bill_id,
        payment_id = id,
        is_paid = status.is_paid,
        "Payment removed"
    );
    audit_payment(&server, &auth, AuditAction::Delete, &payment).await;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Method;
    use rust_decimal_macros::dec;

    #[test]
    fn manual_total_only_on_itemless_bills() {
        assert!(check_manual_total(Some(dec!(120.00)), 0).is_ok());
        assert!(check_manual_total(None, 3).is_ok());

        let err = check_manual_total(Some(dec!(120.00)), 3).unwrap_err();
        assert_eq!(err.error_type(), "validation_error");
    }

    #[test]
    fn pharmacists_and_patients_see_no_bills() {
        let caller = |role: &str| AuthContext::new(1, "u", Some(role), Method::GET);
        assert!(can_view_bills(&caller("Receptionist")));
        assert!(can_view_bills(&caller("nurse")));
        assert!(!can_view_bills(&caller("Pharmacist")));
        assert!(!can_view_bills(&caller("Patient")));
    }

    #[test]
    fn payment_methods_are_checked() {
        let payment = NewPayment {
            amount: dec!(20.00),
            method: "bank transfer".into(),
            reference: String::new(),
        };
        assert_eq!(payment.payment_method().unwrap(), PaymentMethod::BankTransfer);

        let cheque = NewPayment {
            method: "Cheque".into(),
            ..payment
        };
        assert!(cheque.payment_method().is_err());
    }

    #[test]
    fn zero_payments_are_rejected() {
        let payment = NewPayment {
            amount: Decimal::ZERO,
            method: "Cash".into(),
            reference: String::new(),
        };
        let err = payment.payment_method().unwrap_err();
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn items_default_to_quantity_one() {
        let req: CreateBillRequest = serde_json::from_str(
            r#"{"patient_id": 3, "items": [{"description": "Consultation", "amount": "50.00"}]}"#,
        )
        .unwrap();
        assert_eq!(req.items.first().map(|i| i.quantity), Some(1));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn negative_line_amounts_are_rejected() {
        let req: CreateBillRequest = serde_json::from_str(
            r#"{"patient_id": 3, "items": [{"description": "Refund", "amount": "-5.00"}]}"#,
        )
        .unwrap();
        assert!(req.validate().is_err());
    }
}
