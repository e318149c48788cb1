use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PharmacyError {
    /// No single batch of the item covers the request with unexpired stock.
    #[error("No batch with enough stock and valid expiry.")]
    InsufficientStock { inventory_item_id: i64, requested: i32 },

    #[error("Quantity must be a positive whole number, got {0}")]
    InvalidQuantity(i32),

    #[error("Validation error: {0}")]
    Validation(String),
}

pub type PharmacyResult<T> = Result<T, PharmacyError>;
