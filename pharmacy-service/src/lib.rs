//! Pharmacy stock rules
//!
//! Pure functions over stock batches, kept free of I/O so the server can run
//! them inside a database transaction and tests can run them directly:
//! - First-Expiry-First-Out batch selection for dispensing
//! - Item totals recomputed from batch remainders
//! - Low-stock and near-expiry detection

pub mod error;
pub mod fefo;
pub mod models;
pub mod stock;

pub use error::*;
pub use fefo::*;
pub use models::*;
pub use stock::*;
