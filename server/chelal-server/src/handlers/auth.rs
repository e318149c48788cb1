use axum::{
    extract::State,
    http::{header::USER_AGENT, HeaderMap, StatusCode},
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use tracing::{info, warn};
use utoipa::ToSchema;

use crate::auth::{hash_password, verify_password, TokenPair, TokenType};
use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::handlers::common::fetch_one;
use crate::handlers::login_activity::record_login_activity;
use crate::handlers::users::{ensure_role_exists, User};
use crate::middleware::ApiJson;
use crate::server::ChelalServer;
use crate::services::AuditAction;
use crate::validation::RequestValidation;
use crate::{validate_email, validate_length, validate_required};

const INVALID_CREDENTIALS: &str = "No active account found with the given credentials";

// ============================================================================
// DATA STRUCTURES
// ============================================================================

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    /// Username or e-mail address
    #[schema(example = "dr.otieno")]
    pub username: String,
    pub password: String,
}

impl RequestValidation for LoginRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.username, "Must include username and password");
        validate_field_present(&self.password)
    }
}

fn validate_field_present(password: &str) -> Result<(), ApiError> {
    if password.is_empty() {
        return Err(ApiError::validation("Must include username and password"));
    }
    Ok(())
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    #[serde(flatten)]
    pub tokens: TokenPair,
    pub user: User,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RefreshRequest {
    pub refresh: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
    pub password: String,
    /// Role id; omitted means no role
    pub role: Option<i64>,
}

impl RequestValidation for RegisterRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.username, "username is required");
        validate_length!(self.username, 1, 150, "username must be at most 150 characters");
        if !self.email.is_empty() {
            validate_email!(self.email, "email is not a valid address");
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RegisterResponse {
    pub user: User,
    pub message: String,
}

#[derive(Debug, FromRow)]
struct Credentials {
    id: i64,
    username: String,
    password_hash: String,
    is_active: bool,
    role_name: Option<String>,
}

/// Client address as reported by the fronting proxy.
fn client_ip(headers: &HeaderMap) -> Option<String> {
    headers
        .get("x-forwarded-for")
        .or_else(|| headers.get("x-real-ip"))
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|ip| ip.trim().chars().take(45).collect())
}

fn user_agent(headers: &HeaderMap) -> String {
    headers
        .get(USER_AGENT)
        .and_then(|h| h.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

// ============================================================================
// HANDLERS
// ============================================================================

/// Exchange username-or-email and password for a token pair
#[utoipa::path(
    post,
    path = "/api/auth/login",
    tag = "authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Authenticated", body = LoginResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(server): State<ChelalServer>,
    headers: HeaderMap,
    ApiJson(req): ApiJson<LoginRequest>,
) -> ApiResult<Json<ApiResponse<LoginResponse>>> {
    req.validate()?;
    let identifier = req.username.trim();

    // Username match wins over e-mail match.
    let credentials = sqlx::query_as::<_, Credentials>(
        r#"
        SELECT id, username, password_hash, is_active, role_name
        FROM user_accounts
        WHERE username = $1 OR LOWER(email) = LOWER($1)
        ORDER BY (username = $1) DESC, id
        LIMIT 1
        "#,
    )
    .bind(identifier)
    .fetch_optional(&server.db_pool)
    .await?;

    let Some(credentials) = credentials else {
        warn!(identifier, "Login attempt for unknown account");
        return Err(ApiError::authentication(INVALID_CREDENTIALS));
    };

    let ip = client_ip(&headers);
    let agent = user_agent(&headers);
    let password_ok = verify_password(&req.password, &credentials.password_hash).await?;

    if !password_ok || !credentials.is_active {
        record_login_activity(&server.db_pool, credentials.id, ip.as_deref(), &agent, false).await;
        warn!(user_id = credentials.id, "Failed login");
        return Err(ApiError::authentication(INVALID_CREDENTIALS));
    }

    let tokens = server.jwt.issue_pair(
        credentials.id,
        &credentials.username,
        credentials.role_name.as_deref(),
    )?;

    sqlx::query("UPDATE users SET last_login = NOW() WHERE id = $1")
        .bind(credentials.id)
        .execute(&server.db_pool)
        .await?;
    record_login_activity(&server.db_pool, credentials.id, ip.as_deref(), &agent, true).await;
    server
        .audit()
        .record(
            Some(credentials.id),
            AuditAction::Login,
            "user",
            credentials.id,
            format!("{} logged in", credentials.username),
            ip.as_ref().map(|ip| serde_json::json!({ "ip_address": ip })),
        )
        .await;

    info!(user_id = credentials.id, "User logged in");
    let user = fetch_one::<User>(&server.db_pool, credentials.id).await?;
    Ok(Json(api_success(LoginResponse { tokens, user })))
}

/// Trade a refresh token for a new pair. The role is re-read so role
/// changes take effect on the next refresh.
#[utoipa::path(
    post,
    path = "/api/auth/refresh",
    tag = "authentication",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New token pair", body = TokenPair),
        (status = 401, description = "Invalid or expired refresh token")
    )
)]
pub async fn refresh(
    State(server): State<ChelalServer>,
    ApiJson(req): ApiJson<RefreshRequest>,
) -> ApiResult<Json<ApiResponse<TokenPair>>> {
    let claims = server.jwt.validate(&req.refresh, TokenType::Refresh)?;
    let user_id = claims.user_id()?;

    let user = fetch_one::<User>(&server.db_pool, user_id)
        .await
        .map_err(|_| ApiError::authentication("User not found"))?;
    if !user.is_active {
        return Err(ApiError::authentication("User is inactive"));
    }

    let tokens = server
        .jwt
        .issue_pair(user.id, &user.username, user.role_name.as_deref())?;
    Ok(Json(api_success(tokens)))
}

#[utoipa::path(
    post,
    path = "/api/register",
    tag = "authentication",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User registered", body = RegisterResponse),
        (status = 400, description = "Invalid registration data"),
        (status = 409, description = "Username already taken")
    )
)]
pub async fn register(
    State(server): State<ChelalServer>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<RegisterResponse>>)> {
    req.validate()?;
    if let Some(role_id) = req.role {
        ensure_role_exists(&server.db_pool, role_id).await?;
    }

    let password_hash = hash_password(&req.password).await?;
    let id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO users (username, email, first_name, last_name, password_hash, role_id)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING id
        "#,
    )
    .bind(req.username.trim())
    .bind(req.email.trim())
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&password_hash)
    .bind(req.role)
    .fetch_one(&server.db_pool)
    .await?;

    info!(user_id = id, "User registered");
    let user = fetch_one::<User>(&server.db_pool, id).await?;
    Ok((
        StatusCode::CREATED,
        Json(api_success(RegisterResponse {
            user,
            message: "User registered successfully".to_string(),
        })),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn forwarded_for_uses_first_hop() {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-for", HeaderValue::from_static("10.0.0.7, 172.16.0.1"));
        assert_eq!(client_ip(&headers).as_deref(), Some("10.0.0.7"));
        assert_eq!(client_ip(&HeaderMap::new()), None);
    }

    #[test]
    fn login_requires_both_fields() {
        let req = LoginRequest {
            username: "nurse1".into(),
            password: String::new(),
        };
        assert!(req.validate().is_err());
    }
}
