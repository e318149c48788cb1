use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use billing_service::BillingError;
use database_layer::{ConstraintViolation, DatabaseError};
use pharmacy_service::PharmacyError;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{error, warn};
use uuid::Uuid;

/// JSON body of every error response. `error_id` is also logged so a
/// report from a client can be matched to the server log line.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorResponse {
    pub error_id: String,
    pub error_type: String,
    pub message: String,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestions: Option<Vec<String>>,
}

/// `{success, data, metadata}` envelope for successful responses.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResponseMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<PaginationInfo>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_count: Option<i64>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct PaginationInfo {
    pub page: u32,
    pub page_size: u32,
    pub total_pages: u32,
    pub has_next: bool,
    pub has_previous: bool,
}

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    Authentication { message: String },

    /// Role gate denial. The message is fixed for every denial reason.
    #[error("{message}")]
    Authorization { message: String },

    #[error("{resource_type} not found.")]
    NotFound { resource_type: String },

    #[error("{message}")]
    Conflict { message: String },

    #[error("{message}")]
    InsufficientStock { message: String },

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error("{message}")]
    Internal { message: String },

    #[error("{message}")]
    BadRequest { message: String },

    #[error("{message}")]
    Configuration { message: String },
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn authentication(message: impl Into<String>) -> Self {
        Self::Authentication {
            message: message.into(),
        }
    }

    pub fn authorization(message: impl Into<String>) -> Self {
        Self::Authorization {
            message: message.into(),
        }
    }

    pub fn not_found(resource_type: impl Into<String>) -> Self {
        Self::NotFound {
            resource_type: resource_type.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// HTTP status and machine-readable `error_type` for each variant.
    fn classify(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation { .. } => (StatusCode::BAD_REQUEST, "validation_error"),
            Self::BadRequest { .. } => (StatusCode::BAD_REQUEST, "bad_request"),
            Self::InsufficientStock { .. } => (StatusCode::BAD_REQUEST, "insufficient_stock"),
            Self::Authentication { .. } => (StatusCode::UNAUTHORIZED, "authentication_error"),
            Self::Authorization { .. } => (StatusCode::FORBIDDEN, "authorization_error"),
            Self::NotFound { .. } => (StatusCode::NOT_FOUND, "not_found"),
            Self::Conflict { .. } => (StatusCode::CONFLICT, "conflict"),
            Self::Database(db) => match db.constraint_violation() {
                Some(ConstraintViolation::Unique) => (StatusCode::CONFLICT, "conflict"),
                Some(_) => (StatusCode::BAD_REQUEST, "constraint_violation"),
                None if db.is_unavailable() => {
                    (StatusCode::SERVICE_UNAVAILABLE, "database_unavailable")
                }
                None => (StatusCode::INTERNAL_SERVER_ERROR, "database_error"),
            },
            Self::Internal { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error"),
            Self::Configuration { .. } => {
                (StatusCode::INTERNAL_SERVER_ERROR, "configuration_error")
            }
        }
    }

    pub fn status_code(&self) -> StatusCode {
        self.classify().0
    }

    pub fn error_type(&self) -> &'static str {
        self.classify().1
    }

    fn hints(&self) -> Option<Vec<String>> {
        let hints: &[&str] = match self {
            Self::Validation { .. } => &["Correct the highlighted fields and resubmit"],
            Self::Authentication { .. } => &[
                "Sign in again to obtain a new access token",
                "Use the refresh token if the access token has expired",
            ],
            Self::Authorization { .. } => &["Ask an administrator to review your role"],
            Self::InsufficientStock { .. } => {
                &["Receive a new stock batch or dispense a smaller quantity"]
            }
            Self::Database(db) if db.is_unavailable() => &["Retry shortly"],
            _ => return None,
        };
        Some(hints.iter().map(|h| (*h).to_string()).collect())
    }

    /// Client-facing text. Driver and internal detail stay in the logs.
    fn public_message(&self) -> String {
        match self {
            Self::Database(db) => match db.constraint_violation() {
                Some(ConstraintViolation::Unique) => {
                    "A record with the same unique value already exists.".into()
                }
                Some(ConstraintViolation::ForeignKey) => {
                    "A referenced record is missing or still in use.".into()
                }
                Some(ConstraintViolation::Check) => "A value is outside the allowed range.".into(),
                Some(ConstraintViolation::NotNull) => "A required value is missing.".into(),
                None if db.is_unavailable() => "The database is temporarily unavailable.".into(),
                None => "The request could not be completed.".into(),
            },
            Self::Internal { .. } | Self::Configuration { .. } => {
                "An unexpected error occurred.".into()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_id = Uuid::new_v4().to_string();
        let (status, error_type) = self.classify();

        if status.is_server_error() {
            error!(
                %error_id,
                error_type,
                status = status.as_u16(),
                error = %self,
                "Request failed"
            );
        } else {
            warn!(
                %error_id,
                error_type,
                status = status.as_u16(),
                error = %self,
                "Request rejected"
            );
        }

        let body = ApiErrorResponse {
            error_id,
            error_type: error_type.to_string(),
            message: self.public_message(),
            timestamp: chrono::Utc::now(),
            suggestions: self.hints(),
        };

        (status, Json(body)).into_response()
    }
}

pub fn api_success<T>(data: T) -> ApiResponse<T> {
    ApiResponse {
        success: true,
        data,
        metadata: None,
    }
}

pub fn api_success_with_meta<T>(data: T, metadata: ResponseMetadata) -> ApiResponse<T> {
    ApiResponse {
        success: true,
        data,
        metadata: Some(metadata),
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::Database(DatabaseError::SqlxError(err))
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::bad_request(rejection.body_text())
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(error: anyhow::Error) -> Self {
        ApiError::internal(format!("{:#}", error))
    }
}

impl From<PharmacyError> for ApiError {
    fn from(error: PharmacyError) -> Self {
        match error {
            PharmacyError::InsufficientStock { .. } => ApiError::InsufficientStock {
                message: error.to_string(),
            },
            PharmacyError::InvalidQuantity(_) | PharmacyError::Validation(_) => {
                ApiError::validation(error.to_string())
            }
        }
    }
}

impl From<BillingError> for ApiError {
    fn from(error: BillingError) -> Self {
        ApiError::validation(error.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes() {
        assert_eq!(ApiError::validation("x").status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::authentication("x").status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::authorization("x").status_code(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::not_found("Patient").status_code(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::conflict("x").status_code(), StatusCode::CONFLICT);
        assert_eq!(
            ApiError::from(sqlx::Error::PoolTimedOut).status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            ApiError::from(sqlx::Error::RowNotFound).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn insufficient_stock_is_a_client_error_with_fixed_message() {
        let err = ApiError::from(PharmacyError::InsufficientStock {
            inventory_item_id: 4,
            requested: 21,
        });
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(err.to_string(), "No batch with enough stock and valid expiry.");
    }

    #[test]
    fn not_found_message_names_the_resource() {
        assert_eq!(
            ApiError::not_found("Prescription").to_string(),
            "Prescription not found."
        );
    }

    #[test]
    fn validation_message_is_passed_through_verbatim() {
        assert_eq!(
            ApiError::validation("encounter_id is required").to_string(),
            "encounter_id is required"
        );
    }

    #[test]
    fn database_detail_is_not_exposed() {
        let err = ApiError::from(sqlx::Error::RowNotFound);
        assert_eq!(err.error_type(), "database_error");
        assert_eq!(err.public_message(), "The request could not be completed.");
    }

    #[test]
    fn billing_errors_become_validation_errors() {
        let err = ApiError::from(BillingError::InvalidAmount("negative".into()));
        assert_eq!(err.error_type(), "validation_error");
    }
}
