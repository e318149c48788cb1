use thiserror::Error;

#[derive(Error, Debug)]
pub enum DatabaseError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Query failed: {0}")]
    QueryFailed(String),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("Database error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Integrity constraint classes that callers map to client errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintViolation {
    Unique,
    ForeignKey,
    Check,
    NotNull,
}

impl DatabaseError {
    /// Which constraint a failed statement tripped, if any.
    pub fn constraint_violation(&self) -> Option<ConstraintViolation> {
        match self {
            DatabaseError::SqlxError(err) => constraint_violation(err),
            _ => None,
        }
    }

    /// True when the pool could not hand out a connection.
    pub fn is_unavailable(&self) -> bool {
        match self {
            DatabaseError::ConnectionFailed(_) => true,
            DatabaseError::SqlxError(err) => matches!(
                err,
                sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_)
            ),
            _ => false,
        }
    }
}

/// Classify a sqlx error by the Postgres SQLSTATE class it carries.
pub fn constraint_violation(err: &sqlx::Error) -> Option<ConstraintViolation> {
    let sqlx::Error::Database(db_err) = err else {
        return None;
    };

    if db_err.is_unique_violation() {
        Some(ConstraintViolation::Unique)
    } else if db_err.is_foreign_key_violation() {
        Some(ConstraintViolation::ForeignKey)
    } else if db_err.is_check_violation() {
        Some(ConstraintViolation::Check)
    } else if db_err.code().as_deref() == Some("23502") {
        Some(ConstraintViolation::NotNull)
    } else {
        None
    }
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_not_found_is_not_a_constraint_violation() {
        let err = DatabaseError::SqlxError(sqlx::Error::RowNotFound);
        assert_eq!(err.constraint_violation(), None);
        assert!(!err.is_unavailable());
    }

    #[test]
    fn pool_timeout_is_unavailable() {
        assert!(DatabaseError::SqlxError(sqlx::Error::PoolTimedOut).is_unavailable());
        assert!(DatabaseError::ConnectionFailed("refused".into()).is_unavailable());
        assert!(!DatabaseError::QueryFailed("syntax".into()).is_unavailable());
    }
}
