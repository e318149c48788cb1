use billing_service::{bill_total, is_settled, payment_status, LineItem};
use proptest::prelude::*;
use rust_decimal::Decimal;

fn cents() -> impl Strategy<Value = Decimal> {
    (0i64..1_000_000).prop_map(|c| Decimal::new(c, 2))
}

proptest! {
    #[test]
    fn is_paid_iff_payments_cover_total(total in cents(), payments in prop::collection::vec(cents(), 0..8)) {
        let sum: Decimal = payments.iter().copied().sum();
        let status = payment_status(total, payments.iter().copied());

        prop_assert_eq!(status.is_paid, sum >= total);
        prop_assert_eq!(is_settled(total, payments.iter().copied()), sum >= total);
        prop_assert!(status.balance >= Decimal::ZERO);
        prop_assert_eq!(status.amount_paid, sum);
    }

    #[test]
    fn each_payment_never_unsettles_a_bill(total in cents(), payments in prop::collection::vec(cents(), 1..8)) {
        // Payments are positive, so once settled a bill stays settled as
        // more payments arrive.
        let mut settled = false;
        for n in 1..=payments.len() {
            let now = is_settled(total, payments.iter().take(n).copied());
            prop_assert!(!(settled && !now));
            settled = now;
        }
    }

    #[test]
    fn bill_total_is_order_independent(lines in prop::collection::vec((cents(), 0i32..20), 0..10)) {
        let items: Vec<LineItem> = lines.iter().map(|(amount, qty)| LineItem::new(*amount, *qty)).collect();
        let mut reversed = items.clone();
        reversed.reverse();
        prop_assert_eq!(bill_total(&items), bill_total(&reversed));
    }
}
