use axum::{
    extract::State,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, PgPool};
use tracing::warn;
use utoipa::ToSchema;

use crate::auth::policy;
use crate::error::{ApiResponse, ApiResult};
use crate::handlers::common::{fetch_page, Resource};
use crate::middleware::{ApiQuery, AuthContext};
use crate::server::ChelalServer;
use crate::types::PaginationParams;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct LoginActivity {
    pub id: i64,
    pub user_id: i64,
    pub timestamp: DateTime<Utc>,
    pub ip_address: Option<String>,
    pub user_agent: String,
    #[schema(example = "success")]
    pub status: String,
}

impl Resource for LoginActivity {
    const TABLE: &'static str = "login_activities";
    const LABEL: &'static str = "Login activity";
    const POLICY: policy::Policy = policy::PROFILE;
}

/// Best effort: a failed insert is logged and the login proceeds.
pub async fn record_login_activity(
    pool: &PgPool,
    user_id: i64,
    ip_address: Option<&str>,
    user_agent: &str,
    success: bool,
) {
    let status = if success { "success" } else { "failure" };
    let result = sqlx::query(
        "INSERT INTO login_activities (user_id, ip_address, user_agent, status) VALUES ($1, $2, $3, $4)",
    )
    .bind(user_id)
    .bind(ip_address)
    .bind(user_agent)
    .bind(status)
    .execute(pool)
    .await;

    if let Err(e) = result {
        warn!(error = %e, user_id, status, "Failed to record login activity");
    }
}

/// `GET /login-activity`: the caller's own sign-in history, newest first.
pub async fn list_login_activity(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
) -> ApiResult<Json<ApiResponse<Vec<LoginActivity>>>> {
    auth.require(&LoginActivity::POLICY)?;
    let user_id = auth.user_id;

    let (rows, total) =
        fetch_page::<LoginActivity, _>(&server.db_pool, &pagination, ("timestamp", "DESC"), |q| {
            q.add_base_filter("user_id", user_id);
        })
        .await?;

    Ok(Json(pagination.wrap_response(rows, total)))
}
