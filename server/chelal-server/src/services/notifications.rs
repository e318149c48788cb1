use crate::auth::RoleName;
use crate::error::ApiResult;
use sqlx::PgPool;
use tracing::info;

/// In-app notification fan-out
pub struct NotificationService {
    db_pool: PgPool,
}

impl NotificationService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Notify a single user. Returns the new notification id.
    pub async fn notify(
        &self,
        user_id: i64,
        title: &str,
        message: &str,
        notification_type: &str,
        related_appointment_id: Option<i64>,
    ) -> ApiResult<i64> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO notifications (user_id, title, message, type, related_appointment_id)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(title)
        .bind(message)
        .bind(notification_type)
        .bind(related_appointment_id)
        .fetch_one(&self.db_pool)
        .await?;

        info!(user_id, notification_id = id, notification_type, "Notification created");
        Ok(id)
    }

    /// Notify every active user holding one of `roles`. Returns how many
    /// notifications were written.
    pub async fn notify_roles(
        &self,
        roles: &[RoleName],
        title: &str,
        message: &str,
        notification_type: &str,
    ) -> ApiResult<u64> {
        let role_names: Vec<String> = roles.iter().map(|r| r.as_str().to_lowercase()).collect();

        let written = sqlx::query(
            r#"
            INSERT INTO notifications (user_id, title, message, type)
            SELECT u.id, $2, $3, $4
            FROM users u
            JOIN roles r ON r.id = u.role_id
            WHERE u.is_active AND LOWER(r.name) = ANY($1)
            "#,
        )
        .bind(&role_names)
        .bind(title)
        .bind(message)
        .bind(notification_type)
        .execute(&self.db_pool)
        .await?
        .rows_affected();

        info!(recipients = written, notification_type, "Role notification fan-out");
        Ok(written)
    }
}
