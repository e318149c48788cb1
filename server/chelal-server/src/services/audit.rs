//! Append-only audit trail
//!
//! Rows in `audit_logs` are only ever inserted. A failed insert is logged
//! and swallowed so auditing never fails the request that triggered it.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use sqlx::PgPool;
use std::fmt;
use tracing::{debug, warn};
use utoipa::ToSchema;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum AuditAction {
    View,
    Edit,
    Create,
    Delete,
    Login,
    Logout,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditAction::View => "view",
            AuditAction::Edit => "edit",
            AuditAction::Create => "create",
            AuditAction::Delete => "delete",
            AuditAction::Login => "login",
            AuditAction::Logout => "logout",
        }
    }
}

impl fmt::Display for AuditAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub struct AuditService {
    db_pool: PgPool,
}

impl AuditService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Append one audit row.
    pub async fn record(
        &self,
        actor: Option<i64>,
        action: AuditAction,
        object_type: &str,
        object_id: impl fmt::Display,
        description: impl Into<String>,
        details: Option<JsonValue>,
    ) {
        let object_id = object_id.to_string();
        let description = description.into();

        let result = sqlx::query(
            r#"
            INSERT INTO audit_logs (user_id, action, object_type, object_id, description, details)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(actor)
        .bind(action.as_str())
        .bind(object_type)
        .bind(&object_id)
        .bind(&description)
        .bind(details)
        .execute(&self.db_pool)
        .await;

        match result {
            Ok(_) => debug!(
                user_id = ?actor,
                action = %action,
                object_type,
                object_id = %object_id,
                "Audit entry recorded"
            ),
            Err(e) => warn!(
                error = %e,
                action = %action,
                object_type,
                object_id = %object_id,
                "Failed to record audit entry"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn actions_serialize_lowercase() {
        assert_eq!(serde_json::to_string(&AuditAction::Login).unwrap(), "\"login\"");
        assert_eq!(AuditAction::Edit.to_string(), "edit");
    }
}
