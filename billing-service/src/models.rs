use crate::error::BillingError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use utoipa::ToSchema;

/// How a payment was received
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PaymentMethod {
    Cash,
    Card,
    Insurance,
    #[serde(rename = "Bank Transfer")]
    BankTransfer,
}

impl PaymentMethod {
    pub const ALL: [PaymentMethod; 4] = [
        PaymentMethod::Cash,
        PaymentMethod::Card,
        PaymentMethod::Insurance,
        PaymentMethod::BankTransfer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cash => "Cash",
            PaymentMethod::Card => "Card",
            PaymentMethod::Insurance => "Insurance",
            PaymentMethod::BankTransfer => "Bank Transfer",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = BillingError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        PaymentMethod::ALL
            .into_iter()
            .find(|method| method.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| BillingError::UnknownPaymentMethod(s.to_string()))
    }
}

/// A priced line on a bill
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineItem {
    pub amount: Decimal,
    pub quantity: i32,
}

impl LineItem {
    pub fn new(amount: Decimal, quantity: i32) -> Self {
        Self { amount, quantity }
    }
}

/// Settlement state of a bill after reconciliation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
pub struct PaymentStatus {
    pub is_paid: bool,
    #[schema(value_type = String)]
    pub amount_paid: Decimal,
    /// Outstanding amount, never negative
    #[schema(value_type = String)]
    pub balance: Decimal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payment_method_round_trips_through_display_labels() {
        for method in PaymentMethod::ALL {
            assert_eq!(method.as_str().parse::<PaymentMethod>().unwrap(), method);
        }
        assert_eq!("bank transfer".parse::<PaymentMethod>().unwrap(), PaymentMethod::BankTransfer);
        assert!("Cheque".parse::<PaymentMethod>().is_err());
    }

    #[test]
    fn payment_method_serializes_with_spaces() {
        let json = serde_json::to_string(&PaymentMethod::BankTransfer).unwrap();
        assert_eq!(json, "\"Bank Transfer\"");
    }
}
