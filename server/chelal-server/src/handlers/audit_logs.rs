//! Read-only view of the audit trail. Admin only.

use axum::{
    extract::State,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::FromRow;
use utoipa::{IntoParams, ToSchema};

use crate::auth::policy;
use crate::error::{ApiError, ApiResponse, ApiResult};
use crate::handlers::common::{fetch_page, Resource};
use crate::middleware::{ApiQuery, AuthContext};
use crate::server::ChelalServer;
use crate::services::AuditAction;
use crate::types::PaginationParams;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct AuditLog {
    pub id: i64,
    pub user_id: Option<i64>,
    #[schema(example = "create")]
    pub action: String,
    pub object_type: Option<String>,
    pub object_id: Option<String>,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[schema(value_type = Option<Object>)]
    pub details: Option<JsonValue>,
}

impl Resource for AuditLog {
    const TABLE: &'static str = "audit_logs";
    const LABEL: &'static str = "Audit log";
    const POLICY: policy::Policy = policy::AUDIT_LOGS;
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct AuditLogParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub action: Option<AuditAction>,
    pub object_type: Option<String>,
    pub user_id: Option<i64>,
}

pub async fn list_audit_logs(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiQuery(params): ApiQuery<AuditLogParams>,
) -> ApiResult<Json<ApiResponse<Vec<AuditLog>>>> {
    auth.require(&AuditLog::POLICY)?;
    if params.object_type.as_deref().is_some_and(|t| t.len() > 64) {
        return Err(ApiError::validation("object_type must be at most 64 characters"));
    }
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };

    let (rows, total) =
        fetch_page::<AuditLog, _>(&server.db_pool, &pagination, ("timestamp", "DESC"), |q| {
            q.filter_eq("action", params.action.map(|a| a.as_str()))
                .filter_eq("object_type", params.object_type.clone())
                .filter_eq("user_id", params.user_id);
        })
        .await?;
    Ok(Json(pagination.wrap_response(rows, total)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_filter_accepts_lowercase_names() {
        let params: AuditLogParams =
            serde_json::from_str(r#"{"action": "login", "user_id": 4}"#).unwrap();
        assert_eq!(params.action, Some(AuditAction::Login));
        assert!(serde_json::from_str::<AuditLogParams>(r#"{"action": "purge"}"#).is_err());
    }
}
