use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::auth::policy;
use crate::error::{api_success, ApiError, ApiResponse, ApiResult};
use crate::handlers::common::fetch_one;
use crate::handlers::users::User;
use crate::middleware::{ApiJson, AuthContext};
use crate::server::ChelalServer;
use crate::validation::RequestValidation;
use crate::validate_email;

pub const LANGUAGES: [&str; 3] = ["en", "fr", "sw"];

pub fn validate_language(lang: &str) -> Result<(), ApiError> {
    if LANGUAGES.contains(&lang) {
        Ok(())
    } else {
        Err(ApiError::validation(format!(
            "language_preference must be one of {}",
            LANGUAGES.join(", ")
        )))
    }
}

/// Fields a user may change on their own account
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image: Option<String>,
    pub two_factor_enabled: Option<bool>,
}

impl RequestValidation for UpdateProfileRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(email) = &self.email {
            validate_email!(email, "email is not a valid address");
        }
        Ok(())
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct Preferences {
    pub language_preference: String,
    #[schema(value_type = Object)]
    pub preferences: serde_json::Value,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePreferencesRequest {
    pub language_preference: Option<String>,
    #[schema(value_type = Option<Object>)]
    pub preferences: Option<serde_json::Value>,
}

impl RequestValidation for UpdatePreferencesRequest {
    fn validate(&self) -> Result<(), ApiError> {
        if let Some(lang) = &self.language_preference {
            validate_language(lang)?;
        }
        if let Some(prefs) = &self.preferences {
            if !prefs.is_object() {
                return Err(ApiError::validation("preferences must be a JSON object"));
            }
        }
        Ok(())
    }
}

pub async fn get_profile(
    State(server): State<ChelalServer>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<User>>> {
    auth.require(&policy::PROFILE)?;
    let user = fetch_one::<User>(&server.db_pool, auth.user_id).await?;
    Ok(Json(api_success(user)))
}

pub async fn update_profile(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<UpdateProfileRequest>,
) -> ApiResult<Json<ApiResponse<User>>> {
    auth.require(&policy::PROFILE)?;
    req.validate()?;

    sqlx::query(
        r#"
        UPDATE users SET
            email = COALESCE($2, email),
            first_name = COALESCE($3, first_name),
            last_name = COALESCE($4, last_name),
            profile_image = COALESCE($5, profile_image),
            two_factor_enabled = COALESCE($6, two_factor_enabled)
        WHERE id = $1
        "#,
    )
    .bind(auth.user_id)
    .bind(req.email.as_deref().map(str::trim))
    .bind(&req.first_name)
    .bind(&req.last_name)
    .bind(&req.profile_image)
    .bind(req.two_factor_enabled)
    .execute(&server.db_pool)
    .await?;

    let user = fetch_one::<User>(&server.db_pool, auth.user_id).await?;
    Ok(Json(api_success(user)))
}

pub async fn get_preferences(
    State(server): State<ChelalServer>,
    auth: AuthContext,
) -> ApiResult<Json<ApiResponse<Preferences>>> {
    auth.require(&policy::PROFILE)?;
    let user = fetch_one::<User>(&server.db_pool, auth.user_id).await?;
    Ok(Json(api_success(Preferences {
        language_preference: user.language_preference,
        preferences: user.preferences,
    })))
}

pub async fn update_preferences(
    State(server): State<ChelalServer>,
    auth: AuthContext,
    ApiJson(req): ApiJson<UpdatePreferencesRequest>,
) -> ApiResult<Json<ApiResponse<Preferences>>> {
    auth.require(&policy::PROFILE)?;
    req.validate()?;

    let (language_preference, preferences): (String, serde_json::Value) = sqlx::query_as(
        r#"
        UPDATE users SET
            language_preference = COALESCE($2, language_preference),
            preferences = COALESCE($3, preferences)
        WHERE id = $1
        RETURNING language_preference, preferences
        "#,
    )
    .bind(auth.user_id)
    .bind(&req.language_preference)
    .bind(&req.preferences)
    .fetch_optional(&server.db_pool)
    .await?
    .ok_or_else(|| ApiError::not_found("User"))?;

    Ok(Json(api_success(Preferences {
        language_preference,
        preferences,
    })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn supported_languages() {
        assert!(validate_language("sw").is_ok());
        assert!(validate_language("EN").is_err());
        assert!(validate_language("de").is_err());
    }

    #[test]
    fn preferences_must_be_an_object() {
        let req = UpdatePreferencesRequest {
            language_preference: None,
            preferences: Some(serde_json::json!([1, 2])),
        };
        assert!(req.validate().is_err());

        let req = UpdatePreferencesRequest {
            language_preference: Some("fr".into()),
            preferences: Some(serde_json::json!({"theme": "dark"})),
        };
        assert!(req.validate().is_ok());
    }
}
