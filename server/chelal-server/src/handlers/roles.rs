use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use utoipa::ToSchema;

use crate::auth::policy;
use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::handlers::common::{fetch_page, Resource};
use crate::middleware::{ApiJson, ApiPath, ApiQuery, AuthContext, Viewer};
use crate::server::ChelalServer;
use crate::types::PaginationParams;
use crate::validation::RequestValidation;
use crate::{validate_length, validate_required};

#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct Role {
    pub id: i64,
    #[schema(example = "Pharmacist")]
    pub name: String,
    pub description: String,
}

impl Resource for Role {
    const TABLE: &'static str = "roles";
    const LABEL: &'static str = "Role";
    const POLICY: policy::Policy = policy::ROLES;
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RoleRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

impl RoleRequest {
    fn validate_for_create(&self) -> Result<(), ApiError> {
        match &self.name {
            Some(_) => self.validate(),
            None => Err(ApiError::validation("name is required")),
        }
    }
}

impl RequestValidation for RoleRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(name) = &self.name {
            validate_required!(name, "name is required");
            validate_length!(name, 1, 50, "name must be at most 50 characters");
        }
        Ok(())
    }
}

pub async fn list_roles(
    State(server): State<ChelalServer>,
    viewer: Viewer,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
) -> ApiResult<Json<ApiResponse<Vec<Role>>>> {
    viewer.require(&Role::POLICY)?;
    let (roles, total) =
        fetch_page::<Role, _>(&server.db_pool, &pagination, ("name", "ASC"), |_| {}).await?;
    Ok(Json(pagination.wrap_response(roles, total)))
}

pub async fn create_role(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<RoleRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<Role>>)> {
    auth.require(&Role::POLICY)?;
    req.validate_for_create()?;

    let role = sqlx::query_as::<_, Role>(
        "INSERT INTO roles (name, description) VALUES ($1, $2) RETURNING *",
    )
    .bind(req.name.as_deref().map(str::trim))
    .bind(req.description.unwrap_or_default())
    .fetch_one(&server.db_pool)
    .await?;

    tracing::info!(role_id = role.id, name = %role.name, "Role created");
    Ok((StatusCode::CREATED, Json(api_success(role))))
}

pub async fn update_role(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<RoleRequest>,
) -> ApiResult<Json<ApiResponse<Role>>> {
    auth.require(&Role::POLICY)?;
    req.validate()?;

    sqlx::query_as::<_, Role>(
        r#"
        UPDATE roles SET
            name = COALESCE($2, name),
            description = COALESCE($3, description)
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(req.name.as_deref().map(str::trim))
    .bind(&req.description)
    .fetch_optional(&server.db_pool)
    .await?
    .map(|role| Json(api_success(role)))
    .ok_or_else(|| ApiError::not_found(Role::LABEL))
}
