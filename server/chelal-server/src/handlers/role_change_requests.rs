//! Role change requests
//!
//! Users ask for a different role; an admin approves or rejects. A user has
//! at most one pending request at a time.

use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::auth::{policy, RoleName};
use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::handlers::common::{fetch_page, Resource};
use crate::handlers::users::{apply_role, ensure_role_exists, record_role_change, set_user_role, User};
use crate::middleware::{ApiJson, ApiPath, ApiQuery, AuthContext};
use crate::server::ChelalServer;
use crate::types::PaginationParams;
use crate::validate_required;
use crate::validation::RequestValidation;

pub const PENDING: &str = "pending";
const NOTIFICATION_TYPE: &str = "role_change";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Approve,
    Reject,
}

impl Decision {
    fn status(&self) -> &'static str {
        match self {
            Decision::Approve => "approved",
            Decision::Reject => "rejected",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct RoleChangeRequest {
    pub id: i64,
    pub user_id: i64,
    pub requested_role_id: i64,
    pub reason: String,
    #[schema(example = "pending")]
    pub status: String,
    pub reviewed_by: Option<i64>,
    pub review_notes: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl RoleChangeRequest {
    pub fn is_pending(&self) -> bool {
        self.status == PENDING
    }
}

impl Resource for RoleChangeRequest {
    const TABLE: &'static str = "role_change_requests";
    const LABEL: &'static str = "Role change request";
    const POLICY: policy::Policy = policy::ROLE_CHANGE_REQUESTS;
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateRoleChangeRequest {
    pub requested_role_id: i64,
    pub reason: String,
}

impl RequestValidation for CreateRoleChangeRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.reason, "reason is required");
        Ok(())
    }
}

#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct ReviewRequest {
    #[serde(default)]
    pub review_notes: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub user_id: i64,
    pub role_id: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AssignRoleResponse {
    pub message: String,
    pub user: User,
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct RoleChangeListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub status: Option<String>,
}

async fn fetch_visible(server: &ChelalServer, auth: &AuthContext, id: i64) -> ApiResult<RoleChangeRequest> {
    sqlx::query_as::<_, RoleChangeRequest>("SELECT * FROM role_change_requests WHERE id = $1")
        .bind(id)
        .fetch_optional(&server.db_pool)
        .await?
        .filter(|r| auth.is_admin() || r.user_id == auth.user_id)
        .ok_or_else(|| ApiError::not_found(RoleChangeRequest::LABEL))
}

pub async fn list_requests(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiQuery(params): ApiQuery<RoleChangeListParams>,
) -> ApiResult<Json<ApiResponse<Vec<RoleChangeRequest>>>> {
    auth.require(&RoleChangeRequest::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };
    let own = (!auth.is_admin()).then_some(auth.user_id);

    let (rows, total) =
        fetch_page::<RoleChangeRequest, _>(&server.db_pool, &pagination, ("created_at", "DESC"), |q| {
            q.filter_eq("user_id", own)
                .filter_eq("status", params.status.clone());
        })
        .await?;
    Ok(Json(pagination.wrap_response(rows, total)))
}

pub async fn get_request(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<RoleChangeRequest>>> {
    auth.require(&RoleChangeRequest::POLICY)?;
    Ok(Json(api_success(fetch_visible(&server, &auth, id).await?)))
}

pub async fn create_request(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateRoleChangeRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<RoleChangeRequest>>)> {
    auth.require(&RoleChangeRequest::POLICY)?;
    req.validate()?;
    let requested = ensure_role_exists(&server.db_pool, req.requested_role_id).await?;

    let pending: bool = sqlx::query_scalar(
        "SELECT EXISTS (SELECT 1 FROM role_change_requests WHERE user_id = $1 AND status = 'pending')",
    )
    .bind(auth.user_id)
    .fetch_one(&server.db_pool)
    .await?;
    if pending {
        return Err(ApiError::conflict("You already have a pending role change request."));
    }

    let request = sqlx::query_as::<_, RoleChangeRequest>(
        r#"
        INSERT INTO role_change_requests (user_id, requested_role_id, reason)
        VALUES ($1, $2, $3)
        RETURNING *
        "#,
    )
    .bind(auth.user_id)
    .bind(req.requested_role_id)
    .bind(req.reason.trim())
    .fetch_one(&server.db_pool)
    .await?;

    let message = format!("{} requested the {} role", auth.username, requested);
    if let Err(e) = server
        .notifications()
        .notify_roles(&[RoleName::Admin], "Role change request", &message, NOTIFICATION_TYPE)
        .await
    {
        tracing::warn!(error = %e, request_id = request.id, "Admin notification failed");
    }

    Ok((StatusCode::CREATED, Json(api_success(request))))
}

async fn review(
    server: &ChelalServer,
    auth: &AuthContext,
    id: i64,
    decision: Decision,
    notes: &str,
) -> ApiResult<RoleChangeRequest> {
    auth.require(&policy::ADMIN_ONLY)?;

    let current = fetch_visible(server, auth, id).await?;
    if !current.is_pending() {
        return Err(ApiError::conflict(format!(
            "Request has already been {}.",
            current.status
        )));
    }

    // The status flip and the role update commit together. The status guard
    // makes a concurrent review lose cleanly.
    let mut tx = database_layer::begin(&server.db_pool).await?;
    let request = sqlx::query_as::<_, RoleChangeRequest>(
        r#"
        UPDATE role_change_requests SET
            status = $2,
            reviewed_by = $3,
            review_notes = $4,
            updated_at = NOW()
        WHERE id = $1 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(decision.status())
    .bind(auth.user_id)
    .bind(notes.trim())
    .fetch_optional(&mut *tx)
    .await?
    .ok_or_else(|| ApiError::conflict("Request is no longer pending."))?;

    let role = match decision {
        Decision::Approve => {
            set_user_role(&mut tx, request.user_id, request.requested_role_id).await?
        }
        Decision::Reject => ensure_role_exists(&mut *tx, request.requested_role_id).await?,
    };
    tx.commit().await?;

    if decision == Decision::Approve {
        let (user_id, role_id) = (request.user_id, request.requested_role_id);
        record_role_change(server, auth.user_id, user_id, role_id, &role).await;
    }
    let message = format!("Your request for the {} role was {}.", role, decision.status());
    if let Err(e) = server
        .notifications()
        .notify(request.user_id, "Role change request", &message, NOTIFICATION_TYPE, None)
        .await
    {
        tracing::warn!(error = %e, request_id = id, "Requester notification failed");
    }

    tracing::info!(
        request_id = id,
        user_id = request.user_id,
        reviewed_by = auth.user_id,
        status = decision.status(),
        "Role change request reviewed"
    );
    Ok(request)
}

/// `POST /role-change-requests/:id/approve`
pub async fn approve_request(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    body: Option<ApiJson<ReviewRequest>>,
) -> ApiResult<Json<ApiResponse<RoleChangeRequest>>> {
    let notes = body.map(|ApiJson(b)| b).unwrap_or_default().review_notes;
    let request = review(&server, &auth, id, Decision::Approve, &notes).await?;
    Ok(Json(api_success(request)))
}

/// `POST /role-change-requests/:id/reject`
pub async fn reject_request(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    body: Option<ApiJson<ReviewRequest>>,
) -> ApiResult<Json<ApiResponse<RoleChangeRequest>>> {
    let notes = body.map(|ApiJson(b)| b).unwrap_or_default().review_notes;
    let request = review(&server, &auth, id, Decision::Reject, &notes).await?;
    Ok(Json(api_success(request)))
}

/// `POST /role-change-requests/assign-role`
pub async fn assign_role(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<AssignRoleRequest>,
) -> ApiResult<Json<ApiResponse<AssignRoleResponse>>> {
    auth.require(&policy::ADMIN_ONLY)?;
    let user = apply_role(&server, auth.user_id, req.user_id, req.role_id).await?;
    Ok(Json(api_success(AssignRoleResponse {
        message: format!("Role assigned successfully to {}", user.username),
        user,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decisions_map_to_stored_statuses() {
        assert_eq!(Decision::Approve.status(), "approved");
        assert_eq!(Decision::Reject.status(), "rejected");
    }

    #[test]
    fn reason_is_required() {
        let req = CreateRoleChangeRequest {
            requested_role_id: 2,
            reason: " ".into(),
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn review_notes_are_optional() {
        let req: ReviewRequest = serde_json::from_str("{}").unwrap();
        assert!(req.review_notes.is_empty());
    }
}
