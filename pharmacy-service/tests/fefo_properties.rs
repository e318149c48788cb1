use chrono::{Duration, NaiveDate};
use pharmacy_service::{dispense, select_fefo_batch, total_remaining, PharmacyError, StockBatch};
use proptest::prelude::*;

fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 1, 10).unwrap()
}

fn batches_strategy() -> impl Strategy<Value = Vec<StockBatch>> {
    prop::collection::vec((-30i64..90, 0i32..60, 1i64..3), 0..12).prop_map(|specs| {
        specs
            .into_iter()
            .enumerate()
            .map(|(index, (days, quantity, item))| {
                StockBatch::new(
                    index as i64 + 1,
                    item,
                    format!("LOT-{index}"),
                    today() + Duration::days(days),
                    quantity,
                )
            })
            .collect()
    })
}

fn eligible(batch: &StockBatch, item: i64, quantity: i32) -> bool {
    batch.inventory_item_id == item && batch.current_quantity >= quantity && batch.expiry_date >= today()
}

proptest! {
    #[test]
    fn chosen_batch_has_minimum_eligible_expiry(batches in batches_strategy(), quantity in 1i32..70) {
        match select_fefo_batch(&batches, 1, quantity, today()) {
            Some(chosen) => {
                prop_assert!(eligible(chosen, 1, quantity));
                for other in batches.iter().filter(|b| eligible(b, 1, quantity)) {
                    prop_assert!(chosen.expiry_date <= other.expiry_date);
                }
            }
            None => {
                prop_assert!(!batches.iter().any(|b| eligible(b, 1, quantity)));
            }
        }
    }

    #[test]
    fn item_total_matches_sum_of_batches_after_dispense(batches in batches_strategy(), quantity in 1i32..70) {
        let mut batches = batches;
        let before: Vec<StockBatch> = batches.clone();
        let item_before = total_remaining(before.iter().filter(|b| b.inventory_item_id == 1));

        match dispense(&mut batches, 1, quantity, today()) {
            Ok(plan) => {
                let item_after = total_remaining(batches.iter().filter(|b| b.inventory_item_id == 1));
                prop_assert_eq!(plan.item_total, item_after);
                prop_assert_eq!(item_after, item_before - i64::from(quantity));
                prop_assert!(plan.remaining >= 0);
            }
            Err(PharmacyError::InsufficientStock { .. }) => {
                prop_assert_eq!(&batches, &before);
            }
            Err(other) => prop_assert!(false, "unexpected error {:?}", other),
        }
    }

    #[test]
    fn other_items_are_never_touched(batches in batches_strategy(), quantity in 1i32..70) {
        let mut batches = batches;
        let untouched: Vec<StockBatch> = batches.iter().filter(|b| b.inventory_item_id != 1).cloned().collect();
        let _ = dispense(&mut batches, 1, quantity, today());
        let after: Vec<StockBatch> = batches.iter().filter(|b| b.inventory_item_id != 1).cloned().collect();
        prop_assert_eq!(untouched, after);
    }
}

#[test]
fn two_batch_scenario_draws_from_the_batch_that_covers_the_request() {
    let mut batches = vec![
        StockBatch::new(1, 1, "EARLY", today() + Duration::days(10), 3),
        StockBatch::new(2, 1, "LATE", today() + Duration::days(30), 20),
    ];

    let plan = dispense(&mut batches, 1, 5, today()).unwrap();
    assert_eq!(plan.batch_number, "LATE");
    assert_eq!(plan.remaining, 15);
    assert_eq!(plan.item_total, 18);
    assert_eq!(batches[0].current_quantity, 3);
}

#[test]
fn two_batch_scenario_fails_when_no_single_batch_covers_the_request() {
    let mut batches = vec![
        StockBatch::new(1, 1, "EARLY", today() + Duration::days(10), 3),
        StockBatch::new(2, 1, "LATE", today() + Duration::days(30), 20),
    ];

    // 23 units on hand in total, but the largest batch holds 20.
    let err = dispense(&mut batches, 1, 21, today()).unwrap_err();
    assert!(matches!(err, PharmacyError::InsufficientStock { requested: 21, .. }));
    assert_eq!(total_remaining(&batches), 23);
}
