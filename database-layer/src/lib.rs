//! Database layer for the Chelal HMS backend
//!
//! Owns the PostgreSQL connection pool, the embedded schema migrations and
//! the error type every repository call returns.

pub mod connection;
pub mod error;
pub mod migration;
pub mod transaction;

pub use connection::{is_healthy, DatabasePool, PoolSettings};
pub use error::{constraint_violation, ConstraintViolation, DatabaseError, DatabaseResult};
pub use migration::{run_migrations, MIGRATOR};
pub use transaction::{begin, PgTransaction};
