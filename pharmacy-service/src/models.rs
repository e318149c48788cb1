use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A received lot of one inventory item with its own expiry date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[cfg_attr(feature = "sqlx", derive(sqlx::FromRow))]
pub struct StockBatch {
    pub id: i64,
    pub inventory_item_id: i64,
    pub batch_number: String,
    pub expiry_date: NaiveDate,
    pub initial_quantity: i32,
    pub current_quantity: i32,
    #[schema(value_type = String, example = "2.50")]
    pub cost_price_per_unit: Decimal,
    pub received_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl StockBatch {
    /// A freshly received batch with its full quantity on hand.
    pub fn new(
        id: i64,
        inventory_item_id: i64,
        batch_number: impl Into<String>,
        expiry_date: NaiveDate,
        quantity: i32,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            inventory_item_id,
            batch_number: batch_number.into(),
            expiry_date,
            initial_quantity: quantity,
            current_quantity: quantity,
            cost_price_per_unit: Decimal::ZERO,
            received_date: now.date_naive(),
            created_at: now,
        }
    }

    pub fn with_cost(mut self, cost_price_per_unit: Decimal) -> Self {
        self.cost_price_per_unit = cost_price_per_unit;
        self
    }

    /// Expired batches are those whose expiry date is strictly before `today`.
    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date < today
    }

    pub fn can_cover(&self, quantity: i32) -> bool {
        self.current_quantity >= quantity
    }

    /// Cost of the stock still on hand.
    pub fn valuation(&self) -> Decimal {
        self.cost_price_per_unit * Decimal::from(self.current_quantity)
    }
}

/// Result of a successful dispense against one batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct DispensePlan {
    pub batch_id: i64,
    pub batch_number: String,
    pub quantity: i32,
    /// Units left in the chosen batch afterwards.
    pub remaining: i32,
    /// Item total across all its batches afterwards.
    pub item_total: i64,
}
