//! Shared CRUD plumbing
//!
//! A table-backed type implements [`Resource`] once and gets generic
//! `get_one` / `delete_one` handlers plus paging helpers for its list
//! handler. Create and update stay per-resource since their validation
//! differs.

use axum::extract::State;
use axum::{http::StatusCode, Json};
use serde::Serialize;
use sqlx::postgres::PgRow;
use sqlx::PgPool;

use crate::auth::Policy;
use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::middleware::{ApiPath, AuthContext, Viewer};
use crate::server::ChelalServer;
use crate::services::AuditAction;
use crate::types::PaginationParams;
use crate::utils::PaginatedQuery;

pub trait Resource:
    for<'r> sqlx::FromRow<'r, PgRow> + Serialize + Send + Sync + Unpin + 'static
{
    const TABLE: &'static str;
    /// Relation read by `fetch_one`/`fetch_page`; a view when rows need joined columns
    const SOURCE: &'static str = Self::TABLE;
    /// Human-readable name used in "not found" messages
    const LABEL: &'static str;
    const POLICY: Policy;
    /// Object type recorded in the audit trail. `None` disables auditing.
    const AUDIT_AS: Option<&'static str> = None;
}

pub async fn fetch_one<T: Resource>(pool: &PgPool, id: i64) -> ApiResult<T> {
    sqlx::query_as::<_, T>(&format!("SELECT * FROM {} WHERE id = $1", T::SOURCE))
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| ApiError::not_found(T::LABEL))
}

/// One page of `T` plus the total row count under the same filters.
pub async fn fetch_page<T, F>(
    pool: &PgPool,
    params: &PaginationParams,
    order: (&str, &str),
    filters: F,
) -> ApiResult<(Vec<T>, i64)>
where
    T: Resource,
    F: Fn(&mut PaginatedQuery<'static>) + Send + Sync,
{
    let mut count = PaginatedQuery::new(format!("SELECT COUNT(*) FROM {}", T::SOURCE));
    filters(&mut count);
    let total: i64 = count.build_query_scalar().fetch_one(pool).await?;

    let mut select = PaginatedQuery::new(format!("SELECT * FROM {}", T::SOURCE));
    filters(&mut select);
    select.order_by(order.0, order.1).paginate(params);
    let rows = select.build_query_as::<T>().fetch_all(pool).await?;

    Ok((rows, total))
}

/// Hard delete. Child rows follow the schema's cascade rules.
pub async fn delete_row<T: Resource>(pool: &PgPool, id: i64) -> ApiResult<()> {
    let rows_affected = sqlx::query(&format!("DELETE FROM {} WHERE id = $1", T::TABLE))
        .bind(id)
        .execute(pool)
        .await?
        .rows_affected();

    if rows_affected == 0 {
        return Err(ApiError::not_found(T::LABEL));
    }
    Ok(())
}

/// `GET /<resource>/:id`
pub async fn get_one<T: Resource>(
    State(server): State<ChelalServer>,
    viewer: Viewer,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<T>>> {
    viewer.require(&T::POLICY)?;
    let item = fetch_one::<T>(&server.db_pool, id).await?;
    Ok(Json(api_success(item)))
}

/// `DELETE /<resource>/:id`
pub async fn delete_one<T: Resource>(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    auth.require(&T::POLICY)?;
    delete_row::<T>(&server.db_pool, id).await?;

    if let Some(object_type) = T::AUDIT_AS {
        server
            .audit()
            .record(
                Some(auth.user_id),
                AuditAction::Delete,
                object_type,
                id,
                format!("Deleted {} {}", T::LABEL, id),
                None,
            )
            .await;
    }
    Ok(StatusCode::NO_CONTENT)
}
