//! First-Expiry-First-Out batch selection
//!
//! A dispense draws the whole quantity from exactly one batch. A batch is
//! eligible when it belongs to the requested item, holds at least the
//! requested quantity and has not expired. Among eligible batches the one
//! with the earliest expiry date wins; ties keep input order, so callers
//! pass batches sorted by `(expiry_date, id)`.

use crate::error::{PharmacyError, PharmacyResult};
use crate::models::{DispensePlan, StockBatch};
use crate::stock::total_remaining;
use chrono::NaiveDate;
use tracing::debug;

pub fn validate_dispense_quantity(quantity: i32) -> PharmacyResult<()> {
    if quantity < 1 {
        return Err(PharmacyError::InvalidQuantity(quantity));
    }
    Ok(())
}

/// Pick the batch a dispense of `quantity` units would draw from.
pub fn select_fefo_batch(
    batches: &[StockBatch],
    inventory_item_id: i64,
    quantity: i32,
    today: NaiveDate,
) -> Option<&StockBatch> {
    batches
        .iter()
        .filter(|batch| batch.inventory_item_id == inventory_item_id)
        .filter(|batch| batch.can_cover(quantity))
        .filter(|batch| !batch.is_expired(today))
        .min_by_key(|batch| batch.expiry_date)
}

/// Decrement the FEFO batch in place and report the new totals.
///
/// `batches` must hold every batch of the item so the returned total is the
/// item's true stock. Nothing is modified on error.
pub fn dispense(
    batches: &mut [StockBatch],
    inventory_item_id: i64,
    quantity: i32,
    today: NaiveDate,
) -> PharmacyResult<DispensePlan> {
    validate_dispense_quantity(quantity)?;

    let batch_id = select_fefo_batch(batches, inventory_item_id, quantity, today)
        .map(|batch| batch.id)
        .ok_or(PharmacyError::InsufficientStock {
            inventory_item_id,
            requested: quantity,
        })?;

    let batch = batches
        .iter_mut()
        .find(|batch| batch.id == batch_id)
        .ok_or(PharmacyError::InsufficientStock {
            inventory_item_id,
            requested: quantity,
        })?;
    batch.current_quantity -= quantity;

    let remaining = batch.current_quantity;
    let batch_number = batch.batch_number.clone();
    let item_total = total_remaining(
        batches
            .iter()
            .filter(|batch| batch.inventory_item_id == inventory_item_id),
    );

    debug!(
        inventory_item_id,
        batch_id,
        quantity,
        remaining,
        item_total,
        "FEFO batch decremented"
    );

    Ok(DispensePlan {
        batch_id,
        batch_number,
        quantity,
        remaining,
        item_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 3, 1).unwrap()
    }

    fn batch(id: i64, days: i64, quantity: i32) -> StockBatch {
        StockBatch::new(id, 1, format!("B-{id}"), today() + Duration::days(days), quantity)
    }

    #[test]
    fn picks_earliest_expiry_that_covers_request() {
        let batches = vec![batch(1, 30, 50), batch(2, 10, 50), batch(3, 20, 50)];
        let chosen = select_fefo_batch(&batches, 1, 5, today()).unwrap();
        assert_eq!(chosen.id, 2);
    }

    #[test]
    fn skips_batches_too_small_for_the_request() {
        // +10 days holds 3 units, +30 days holds 20: a request for 5 can only
        // come from the later batch.
        let batches = vec![batch(1, 10, 3), batch(2, 30, 20)];
        let chosen = select_fefo_batch(&batches, 1, 5, today()).unwrap();
        assert_eq!(chosen.id, 2);
    }

    #[test]
    fn does_not_split_across_batches() {
        // 3 + 20 = 23 units on hand, but no single batch covers 21.
        let mut batches = vec![batch(1, 10, 3), batch(2, 30, 20)];
        let err = dispense(&mut batches, 1, 21, today()).unwrap_err();
        assert_eq!(
            err,
            PharmacyError::InsufficientStock {
                inventory_item_id: 1,
                requested: 21
            }
        );
        assert_eq!(batches[0].current_quantity, 3);
        assert_eq!(batches[1].current_quantity, 20);
    }

    #[test]
    fn expired_batches_are_ineligible() {
        let batches = vec![batch(1, -1, 100), batch(2, 5, 100)];
        assert_eq!(select_fefo_batch(&batches, 1, 10, today()).unwrap().id, 2);

        let only_expired = vec![batch(1, -1, 100)];
        assert!(select_fefo_batch(&only_expired, 1, 10, today()).is_none());
    }

    #[test]
    fn batch_expiring_today_is_still_eligible() {
        let batches = vec![batch(1, 0, 10)];
        assert_eq!(select_fefo_batch(&batches, 1, 10, today()).unwrap().id, 1);
    }

    #[test]
    fn equal_expiry_keeps_input_order() {
        let batches = vec![batch(7, 10, 10), batch(3, 10, 10)];
        assert_eq!(select_fefo_batch(&batches, 1, 1, today()).unwrap().id, 7);
    }

    #[test]
    fn ignores_other_items() {
        let mut other = batch(1, 1, 100);
        other.inventory_item_id = 2;
        let batches = vec![other, batch(2, 40, 100)];
        assert_eq!(select_fefo_batch(&batches, 1, 1, today()).unwrap().id, 2);
    }

    #[test]
    fn dispense_decrements_and_recomputes_total() {
        let mut batches = vec![batch(1, 10, 3), batch(2, 30, 20)];
        let plan = dispense(&mut batches, 1, 5, today()).unwrap();

        assert_eq!(plan.batch_id, 2);
        assert_eq!(plan.batch_number, "B-2");
        assert_eq!(plan.remaining, 15);
        assert_eq!(plan.item_total, 18);
        assert_eq!(batches[1].current_quantity, 15);
    }

    #[test]
    fn rejects_non_positive_quantities() {
        let mut batches = vec![batch(1, 10, 3)];
        assert_eq!(
            dispense(&mut batches, 1, 0, today()).unwrap_err(),
            PharmacyError::InvalidQuantity(0)
        );
        assert_eq!(
            dispense(&mut batches, 1, -4, today()).unwrap_err(),
            PharmacyError::InvalidQuantity(-4)
        );
    }
}
