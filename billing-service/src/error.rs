use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BillingError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Unknown payment method: {0}")]
    UnknownPaymentMethod(String),
}

pub type BillingResult<T> = Result<T, BillingError>;
