//! Billing rules for the hospital backend
//!
//! Provides:
//! - Line and bill totals from bill items
//! - Payment reconciliation (`is_paid` iff payments cover the total)
//! - Payment method and amount validation

pub mod error;
pub mod models;
pub mod reconciliation;

pub use error::*;
pub use models::*;
pub use reconciliation::*;
