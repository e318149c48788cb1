use axum::{
    extract::State,
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use database_layer::PgTransaction;
use sqlx::{FromRow, PgExecutor, PgPool};
use utoipa::{IntoParams, ToSchema};

use crate::auth::{hash_password, policy, RoleName};
use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::handlers::common::{fetch_one, fetch_page, Resource};
use crate::middleware::{ApiJson, ApiPath, ApiQuery, AuthContext, Viewer};
use crate::server::ChelalServer;
use crate::services::AuditAction;
use crate::types::PaginationParams;
use crate::validation::RequestValidation;
use crate::{validate_email, validate_length, validate_required};

// ============================================================================
// DATA STRUCTURES
// ============================================================================

/// User account as exposed by the API. The password hash never leaves the
/// database layer.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow, ToSchema)]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    pub role_id: Option<i64>,
    pub role_name: Option<String>,
    pub is_active: bool,
    pub is_staff: bool,
    #[schema(example = "en")]
    pub language_preference: String,
    #[schema(value_type = Object)]
    pub preferences: serde_json::Value,
    pub profile_image: Option<String>,
    pub two_factor_enabled: bool,
    pub date_joined: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
}

impl User {
    pub fn full_name(&self) -> String {
        let full = format!("{} {}", self.first_name, self.last_name);
        let trimmed = full.trim();
        if trimmed.is_empty() {
            self.username.clone()
        } else {
            trimmed.to_string()
        }
    }
}

impl Resource for User {
    const TABLE: &'static str = "users";
    const SOURCE: &'static str = "user_accounts";
    const LABEL: &'static str = "User";
    const POLICY: policy::Policy = policy::USERS;
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub password: String,
    pub role_id: Option<i64>,
    #[serde(default)]
    pub is_staff: bool,
}

impl RequestValidation for CreateUserRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.username, "username is required");
        validate_length!(self.username, 1, 150, "username must be at most 150 characters");
        if !self.email.is_empty() {
            validate_email!(self.email, "email is not a valid address");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateUserRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub role_id: Option<i64>,
    pub is_active: Option<bool>,
    pub is_staff: Option<bool>,
    pub language_preference: Option<String>,
}

impl RequestValidation for UpdateUserRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(email) = &self.email {
            if !email.is_empty() {
                validate_email!(email, "email is not a valid address");
            }
        }
        if let Some(lang) = &self.language_preference {
            super::profile::validate_language(lang)?;
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct UserListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub role_id: Option<i64>,
    pub is_active: Option<bool>,
    /// Matches username, e-mail or names
    pub search: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct ResetPasswordRequest {
    pub new_password: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub role_id: i64,
}

// ============================================================================
// SHARED LOOKUPS
// ============================================================================

/// Whether `user_id` exists and holds `role`.
pub async fn user_has_role(pool: &PgPool, user_id: i64, role: RoleName) -> ApiResult<bool> {
    let role_name: Option<Option<String>> =
        sqlx::query_scalar("SELECT role_name FROM user_accounts WHERE id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(role_name.flatten().is_some_and(|name| role.matches(&name)))
}

/// 400 unless `doctor_id` names a user holding the Doctor role.
pub async fn ensure_doctor(pool: &PgPool, doctor_id: i64) -> ApiResult<()> {
    if user_has_role(pool, doctor_id, RoleName::Doctor).await? {
        Ok(())
    } else {
        Err(ApiError::validation("Selected user is not a doctor."))
    }
}

pub async fn ensure_role_exists<'e>(executor: impl PgExecutor<'e>, role_id: i64) -> ApiResult<String> {
    sqlx::query_scalar("SELECT name FROM roles WHERE id = $1")
        .bind(role_id)
        .fetch_optional(executor)
        .await?
        .ok_or_else(|| ApiError::validation(format!("Role {} does not exist.", role_id)))
}

// ============================================================================
// HANDLERS
// ============================================================================

pub async fn list_users(
    State(server): State<ChelalServer>,
    viewer: Viewer,
    ApiQuery(params): ApiQuery<UserListParams>,
) -> ApiResult<Json<ApiResponse<Vec<User>>>> {
    viewer.require(&policy::USERS)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };

    let (users, total) = fetch_page::<User, _>(&server.db_pool, &pagination, ("username", "ASC"), |q| {
        q.filter_eq("role_id", params.role_id)
            .filter_eq("is_active", params.is_active)
            .search(
                &["username", "email", "first_name", "last_name"],
                params.search.as_deref(),
            );
    })
    .await?;

    Ok(Json(pagination.wrap_response(users, total)))
}

/// `GET /users/me`
pub async fn me(
    State(server): State<ChelalServer>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<User>>> {
    let user = fetch_one::<User>(&server.db_pool, auth.user_id).await?;
    Ok(Json(api_success(user)))
}

pub async fn create_user(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<User>>)> {
    auth.require(&policy::USERS)?;
    req.validate()?;
    if let Some(role_id) = req.role_id {
        ensure_role_exists(&server.db_pool, role_id).await?;
    }

    let password_hash = hash_password(&req.password).await?;
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (username, email, first_name, last_name, password_hash, role_id, is_staff)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(req.username.trim())
    .bind(req.email.trim())
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&password_hash)
    .bind(req.role_id)
    .bind(req.is_staff)
    .fetch_one(&server.db_pool)
    .await?;

    server
        .audit()
        .record(Some(auth.user_id), AuditAction::Create, "user", id, format!("Created user {}", req.username), None)
        .await;

    let user = fetch_one::<User>(&server.db_pool, id).await?;
    Ok((StatusCode::CREATED, Json(api_success(user))))
}

pub async fn update_user(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> ApiResult<Json<ApiResponse<User>>> {
    auth.require(&policy::USERS)?;
    req.validate()?;
    if let Some(role_id) = req.role_id {
        ensure_role_exists(&server.db_pool, role_id).await?;
    }

    let updated = sqlx::query(
        r#"
        UPDATE users SET
            email = COALESCE($2, email),
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            role_id = COALESCE($5, role_id),
            is_active = COALESCE($6, is_active),
            is_staff = COALESCE($7, is_staff),
            language_preference = COALESCE($8, language_preference)
        WHERE id = $1
        "#,
    )
    .bind(id)
    .bind(req.email.as_deref().map(str::trim))
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(req.role_id)
    .bind(req.is_active)
    .bind(req.is_staff)
    .bind(&req.language_preference)
    .execute(&server.db_pool)
    .await?
    .rows_affected();

    if updated == 0 {
        return Err(ApiError::not_found(User::LABEL));
    }

    server
        .audit()
        .record(Some(auth.user_id), AuditAction::Edit, "user", id, "Updated user", None)
        .await;

    let user = fetch_one::<User>(&server.db_pool, id).await?;
    Ok(Json(api_success(user)))
}

async fn set_active(server: &ChelalServer, auth: &AuthContext, id: i64, active: bool) -> ApiResult<User> {
    auth.require(&policy::ADMIN_ONLY)?;
    if id == auth.user_id && !active {
        return Err(ApiError::bad_request("You cannot deactivate your own account."));
    }

    let updated = sqlx::query("UPDATE users SET is_active = $2 WHERE id = $1")
        .bind(id)
        .bind(active)
        .execute(&server.db_pool)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(ApiError::not_found(User::LABEL));
    }

    tracing::info!(user_id = id, active, by = auth.user_id, "User activation changed");
    fetch_one::<User>(&server.db_pool, id).await
}

pub async fn activate_user(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<User>>> {
    Ok(Json(api_success(set_active(&server, &auth, id, true).await?)))
}

pub async fn deactivate_user(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
) -> ApiResult<Json<ApiResponse<User>>> {
    Ok(Json(api_success(set_active(&server, &auth, id, false).await?)))
}

pub async fn reset_password(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<ResetPasswordRequest>,
) -> ApiResult<Json<ApiResponse<serde_json::Value>>> {
    auth.require(&policy::ADMIN_ONLY)?;
    let password_hash = hash_password(&req.new_password).await?;

    let updated = sqlx::query("UPDATE users SET password_hash = $2 WHERE id = $1")
        .bind(id)
        .bind(&password_hash)
        .execute(&server.db_pool)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(ApiError::not_found(User::LABEL));
    }

    server
        .audit()
        .record(Some(auth.user_id), AuditAction::Edit, "user", id, "Password reset by administrator", None)
        .await;

    Ok(Json(api_success(serde_json::json!({ "status": "password reset" }))))
}

/// Point `user_id` at `role_id` inside the caller's transaction and return
/// the role name. Nothing is audited until the caller commits.
pub async fn set_user_role(tx: &mut PgTransaction, user_id: i64, role_id: i64) -> ApiResult<String> {
    let role_name = ensure_role_exists(&mut **tx, role_id).await?;

    let updated = sqlx::query("UPDATE users SET role_id = $2 WHERE id = $1")
        .bind(user_id)
        .bind(role_id)
        .execute(&mut **tx)
        .await?
        .rows_affected();
    if updated == 0 {
        return Err(ApiError::not_found(User::LABEL));
    }
    Ok(role_name)
}

pub async fn record_role_change(server: &ChelalServer, actor: i64, user_id: i64, role_id: i64, role_name: &str) {
    server
        .audit()
        .record(
            Some(actor),
            AuditAction::Edit,
            "user",
            user_id,
            format!("Role set to {}", role_name),
            Some(serde_json::json!({ "role_id": role_id })),
        )
        .await;
}

/// Set a user's role directly, outside any review.
pub async fn apply_role(server: &ChelalServer, actor: i64, user_id: i64, role_id: i64) -> ApiResult<User> {
    let mut tx = database_layer::begin(&server.db_pool).await?;
    let role_name = set_user_role(&mut tx, user_id, role_id).await?;
    tx.commit().await?;

    record_role_change(server, actor, user_id, role_id, &role_name).await;
    fetch_one::<User>(&server.db_pool, user_id).await
}

pub async fn assign_role(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<AssignRoleRequest>,
) -> ApiResult<Json<ApiResponse<User>>> {
    auth.require(&policy::ADMIN_ONLY)?;
    let user = apply_role(&server, auth.user_id, id, req.role_id).await?;
    Ok(Json(api_success(user)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_username_is_rejected() {
        let req = CreateUserRequest {
            username: "  ".into(),
            email: String::new(),
            first_name: String::new(),
            last_name: String::new(),
            password: "secret1".into(),
            role_id: None,
            is_staff: false,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn update_checks_language() {
        let req = UpdateUserRequest {
            email: None,
            first_name: None,
            last_name: None,
            role_id: None,
            is_active: None,
            is_staff: None,
            language_preference: Some("de".into()),
        };
        assert!(req.validate().is_err());
    }
}
