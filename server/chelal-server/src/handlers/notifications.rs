//! In-app notifications
//!
//! Any authenticated user reads and manages only their own notifications.

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

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Notification {
    pub id: i64,
    pub user_id: i64,
    pub title: String,
    pub message: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    #[schema(example = "low_stock")]
    pub notification_type: String,
    pub is_read: bool,
    pub related_appointment_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl Resource for Notification {
    const TABLE: &'static str = "notifications";
    const LABEL: &'static str = "Notification";
    const POLICY: policy::Policy = policy::NOTIFICATIONS;
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateNotificationRequest {
    /// Recipient; defaults to the caller. Only admins may address someone else.
    pub user_id: Option<i64>,
    pub title: Option<String>,
    pub message: String,
    #[serde(rename = "type", default)]
    pub notification_type: String,
    pub related_appointment_id: Option<i64>,
}

impl RequestValidation for CreateNotificationRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.message, "message is required");
        if let Some(title) = &self.title {
            validate_length!(title, 1, 255, "title must be between 1 and 255 characters");
        }
        validate_length!(self.notification_type, 0, 50, "type must be at most 50 characters");
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct NotificationListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub is_read: Option<bool>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UnreadCount {
    pub unread_count: i64,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MarkedRead {
    pub updated: u64,
}

pub async fn list_notifications(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiQuery(params): ApiQuery<NotificationListParams>,
) -> ApiResult<Json<ApiResponse<Vec<Notification>>>> {
    auth.require(&Notification::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };
    let user_id = auth.user_id;

    let (rows, total) =
        fetch_page::<Notification, _>(&server.db_pool, &pagination, ("created_at", "DESC"), |q| {
            q.add_base_filter("user_id", user_id)
                .filter_eq("is_read", params.is_read);
        })
        .await?;
    Ok(Json(pagination.wrap_response(rows, total)))
}

pub async fn get_notification(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<Notification>>> {
    auth.require(&Notification::POLICY)?;

    let notification =
        sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1 AND user_id = $2")
            .bind(id)
            .bind(auth.user_id)
            .fetch_optional(&server.db_pool)
            .await?
            .ok_or_else(|| ApiError::not_found(Notification::LABEL))?;
    Ok(Json(api_success(notification)))
}

pub async fn create_notification(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateNotificationRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Notification>>)> {
    auth.require(&Notification::POLICY)?;
    req.validate()?;

    let recipient = match req.user_id {
        Some(user_id) if user_id != auth.user_id => {
            auth.require(&policy::ADMIN_ONLY)?;
            user_id
        }
        _ => auth.user_id,
    };
    let title = req.title.as_deref().map(str::trim).unwrap_or("Notification");

    let id = server
        .notifications()
        .notify(
            recipient,
            title,
            req.message.trim(),
            &req.notification_type,
            req.related_appointment_id,
        )
        .await?;
    let notification = sqlx::query_as::<_, Notification>("SELECT * FROM notifications WHERE id = $1")
        .bind(id)
        .fetch_one(&server.db_pool)
        .await?;
    Ok((StatusCode::CREATED, Json(api_success(notification))))
}

pub async fn delete_notification(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<StatusCode> {
    auth.require(&Notification::POLICY)?;

    let deleted = sqlx::query("DELETE FROM notifications WHERE id = $1 AND user_id = $2")
        .bind(id)
        .bind(auth.user_id)
        .execute(&server.db_pool)
        .await?
        .rows_affected();
    if deleted == 0 {
        return Err(ApiError::not_found(Notification::LABEL));
    }
    Ok(StatusCode::NO_CONTENT)
}

/// `POST /notifications/:id/mark-read`
pub async fn mark_read(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<Notification>>> {
    auth.require(&Notification::POLICY)?;

    let notification = sqlx::query_as::<_, Notification>(
        "UPDATE notifications SET is_read = TRUE WHERE id = $1 AND user_id = $2 RETURNING *",
    )
    .bind(id)
    .bind(auth.user_id)
    .fetch_optional(&server.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found(Notification::LABEL))?;
    Ok(Json(api_success(notification)))
}

/// `POST /notifications/mark-all-read`
pub async fn mark_all_read(
    State(server): State<ChelalServer>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<MarkedRead>>> {
    auth.require(&Notification::POLICY)?;

    let updated = sqlx::query("UPDATE notifications SET is_read = TRUE WHERE user_id = $1 AND NOT is_read")
        .bind(auth.user_id)
        .execute(&server.db_pool)
        .await?
        .rows_affected();
    tracing::debug!(user_id = auth.user_id, updated, "Notifications marked read");
    Ok(Json(api_success(MarkedRead { updated })))
}

/// `GET /notifications/unread-count`
pub async fn unread_count(
    State(server): State<ChelalServer>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<UnreadCount>>> {
    auth.require(&Notification::POLICY)?;

    let unread_count: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND NOT is_read")
            .bind(auth.user_id)
            .fetch_one(&server.db_pool)
            .await?;
    Ok(Json(api_success(UnreadCount { unread_count })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_field_uses_the_wire_name() {
        let req: CreateNotificationRequest =
            serde_json::from_str(r#"{"message": "Stock low", "type": "low_stock"}"#).unwrap();
        assert_eq!(req.notification_type, "low_stock");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn blank_message_is_rejected() {
        let req: CreateNotificationRequest = serde_json::from_str(r#"{"message": "  "}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
