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
pub struct SystemSetting {
    pub id: i64,
    #[schema(example = "hospital_name")]
    pub key: String,
    pub value: String,
    pub description: String,
    #[schema(example = "general")]
    pub category: String,
    pub is_public: bool,
    pub updated_at: DateTime<Utc>,
}

impl Resource for SystemSetting {
    const TABLE: &'static str = "system_settings";
    const LABEL: &'static str = "System setting";
    const POLICY: policy::Policy = policy::SYSTEM_SETTINGS;
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateSettingRequest {
    pub key: String,
    pub value: String,
    #[serde(default)]
    pub description: String,
    pub category: Option<String>,
    #[serde(default)]
    pub is_public: bool,
}

fn valid_key(key: &str) -> bool {
    key.chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

impl RequestValidation for CreateSettingRequest {
    fn validate(&self) -> Result<(), ApiError> {
        validate_required!(self.key, "key is required");
        validate_length!(self.key, 1, 100, "key must be at most 100 characters");
        if !valid_key(self.key.trim()) {
            return Err(ApiError::validation(
                "key may contain only letters, digits, '_', '.' and '-'",
            ));
        }
        if let Some(category) = &self.category {
            validate_length!(category, 1, 50, "category must be between 1 and 50 characters");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateSettingRequest {
    pub value: Option<String>,
    pub description: Option<String>,
    pub category: Option<String>,
    pub is_public: Option<bool>,
}

impl RequestValidation for UpdateSettingRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(category) = &self.category {
            validate_length!(category, 1, 50, "category must be between 1 and 50 characters");
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, IntoParams)]
pub struct SettingListParams {
    pub page: Option<u32>,
    pub page_size: Option<u32>,
    pub category: Option<String>,
}

pub async fn list_settings(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiQuery(params): ApiQuery<SettingListParams>,
) -> ApiResult<Json<ApiResponse<Vec<SystemSetting>>>> {
    auth.require(&SystemSetting::POLICY)?;
    let pagination = PaginationParams {
        page: params.page,
        page_size: params.page_size,
    };

    let (rows, total) =
        fetch_page::<SystemSetting, _>(&server.db_pool, &pagination, ("key", "ASC"), |q| {
            q.filter_eq("category", params.category.clone());
        })
        .await?;
    Ok(Json(pagination.wrap_response(rows, total)))
}

/// `GET /system-settings/public`
pub async fn public_settings(
    State(server): State<ChelalServer>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<Vec<SystemSetting>>>> {
    auth.require(&policy::PROFILE)?;

    let settings =
        sqlx::query_as::<_, SystemSetting>("SELECT * FROM system_settings WHERE is_public ORDER BY category, key")
            .fetch_all(&server.db_pool)
            .await?;
    Ok(Json(api_success(settings)))
}

pub async fn create_setting(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<CreateSettingRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse<SystemSetting>>)> {
    auth.require(&SystemSetting::POLICY)?;
    req.validate()?;

    let setting = sqlx::query_as::<_, SystemSetting>(
        r#"
        INSERT INTO system_settings (key, value, description, category, is_public)
        VALUES ($1, $2, $3, COALESCE($4, 'general'), $5)
        RETURNING *
        "#,
    )
    .bind(req.key.trim())
    .bind(&req.value)
    .bind(&req.description)
    .bind(req.category.as_deref().map(str::trim))
    .bind(req.is_public)
    .fetch_one(&server.db_pool)
    .await?;

    tracing::info!(key = %setting.key, user_id = auth.user_id, "System setting created");
    Ok((StatusCode::CREATED, Json(api_success(setting))))
}

pub async fn update_setting(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiPath(id): ApiPath<i64>,
    ApiJson(req): ApiJson<UpdateSettingRequest>,
) -> ApiResult<Json<ApiResponse<SystemSetting>>> {
    auth.require(&SystemSetting::POLICY)?;
    req.validate()?;

    let setting = sqlx::query_as::<_, SystemSetting>(
        r#"
        UPDATE system_settings SET
            value = COALESCE($2, value),
            description = COALESCE($3, description),
            category = COALESCE($4, category),
            is_public = COALESCE($5, is_public),
            updated_at = NOW()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(&req.value)
    .bind(&req.description)
    .bind(req.category.as_deref().map(str::trim))
    .bind(req.is_public)
    .fetch_optional(&server.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found(SystemSetting::LABEL))?;

    tracing::info!(key = %setting.key, user_id = auth.user_id, "System setting updated");
    Ok(Json(api_success(setting)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_identifier_like() {
        assert!(valid_key("pharmacy.low_stock-threshold"));
        assert!(!valid_key("hospital name"));
        assert!(!valid_key("key;drop"));
    }

    #[test]
    fn create_requires_a_key() {
        let req: CreateSettingRequest = serde_json::from_str(r#"{"key": " ", "value": "x"}"#).unwrap();
        assert!(req.validate().is_err());
    }
}
