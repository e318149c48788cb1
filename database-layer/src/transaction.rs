// Transaction helpers
use crate::error::{DatabaseError, DatabaseResult};
use sqlx::{PgPool, Postgres, Transaction};
use tracing::debug;

pub type PgTransaction = Transaction<'static, Postgres>;

/// Begin a new transaction on the pool.
///
/// The transaction rolls back when dropped without `commit`, so an early
/// `?` return leaves the database untouched.
pub async fn begin(pool: &PgPool) -> DatabaseResult<PgTransaction> {
    debug!("Beginning transaction");

    pool.begin()
        .await
        .map_err(|e| match e {
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => {
                DatabaseError::ConnectionFailed(e.to_string())
            }
            other => DatabaseError::QueryFailed(format!("Failed to begin transaction: {}", other)),
        })
}
