use crate::models::StockBatch;
use chrono::{Duration, NaiveDate};
use rust_decimal::Decimal;

/// Item totals below this raise a low-stock notification.
pub const LOW_STOCK_THRESHOLD: i64 = 10;

/// Default look-ahead window for near-expiry reports, in days.
pub const NEAR_EXPIRY_DAYS: i64 = 30;

/// Largest look-ahead a caller may ask for (about a century).
pub const MAX_NEAR_EXPIRY_DAYS: i64 = 36_500;

pub fn total_remaining<'a>(batches: impl IntoIterator<Item = &'a StockBatch>) -> i64 {
    batches
        .into_iter()
        .map(|batch| i64::from(batch.current_quantity))
        .sum()
}

pub fn is_low_stock(total: i64, threshold: i64) -> bool {
    total < threshold
}

pub fn low_stock_message(item_name: &str, total: i64) -> String {
    format!("Low stock alert: {} ({} left)", item_name, total)
}

/// Batches with stock on hand that expire on or before `today + days`.
/// Already expired stock is included; it still has to be pulled.
/// A window past the calendar range saturates at the last representable date.
pub fn near_expiry(batches: &[StockBatch], today: NaiveDate, days: i64) -> Vec<&StockBatch> {
    let horizon = Duration::try_days(days)
        .and_then(|window| today.checked_add_signed(window))
        .unwrap_or(if days < 0 { NaiveDate::MIN } else { NaiveDate::MAX });
    batches
        .iter()
        .filter(|batch| batch.current_quantity > 0 && batch.expiry_date <= horizon)
        .collect()
}

/// Sum of cost price times remaining quantity.
pub fn stock_valuation<'a>(batches: impl IntoIterator<Item = &'a StockBatch>) -> Decimal {
    batches.into_iter().map(StockBatch::valuation).sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 15).unwrap()
    }

    #[test]
    fn total_is_sum_of_remainders() {
        let batches = vec![
            StockBatch::new(1, 1, "A", today(), 4),
            StockBatch::new(2, 1, "B", today(), 0),
            StockBatch::new(3, 1, "C", today(), 11),
        ];
        assert_eq!(total_remaining(&batches), 15);
        assert_eq!(total_remaining(&Vec::<StockBatch>::new()), 0);
    }

    #[test]
    fn low_stock_is_strictly_below_threshold() {
        assert!(is_low_stock(9, LOW_STOCK_THRESHOLD));
        assert!(!is_low_stock(10, LOW_STOCK_THRESHOLD));
        assert!(is_low_stock(0, LOW_STOCK_THRESHOLD));
    }

    #[test]
    fn near_expiry_window() {
        let batches = vec![
            StockBatch::new(1, 1, "soon", today() + Duration::days(5), 10),
            StockBatch::new(2, 1, "later", today() + Duration::days(45), 10),
            StockBatch::new(3, 1, "empty", today() + Duration::days(1), 0),
            StockBatch::new(4, 1, "expired", today() - Duration::days(2), 3),
        ];
        let ids: Vec<i64> = near_expiry(&batches, today(), NEAR_EXPIRY_DAYS)
            .iter()
            .map(|batch| batch.id)
            .collect();
        assert_eq!(ids, vec![1, 4]);
    }

    #[test]
    fn huge_window_saturates_instead_of_overflowing() {
        let batches = vec![
            StockBatch::new(1, 1, "far", NaiveDate::MAX, 2),
            StockBatch::new(2, 1, "soon", today() + Duration::days(3), 2),
        ];
        assert_eq!(near_expiry(&batches, today(), 100_000_000).len(), 2);
        assert_eq!(near_expiry(&batches, today(), i64::MAX).len(), 2);
        assert!(near_expiry(&batches, today(), i64::MIN).is_empty());
    }

    #[test]
    fn valuation_uses_remaining_quantity() {
        let mut used = StockBatch::new(1, 1, "A", today(), 10).with_cost(dec!(2.50));
        used.current_quantity = 4;
        let fresh = StockBatch::new(2, 1, "B", today(), 3).with_cost(dec!(1.10));
        assert_eq!(stock_valuation([&used, &fresh]), dec!(13.30));
    }

    #[test]
    fn message_names_item_and_count() {
        assert_eq!(
            low_stock_message("Amoxicillin 500mg", 7),
            "Low stock alert: Amoxicillin 500mg (7 left)"
        );
    }
}
