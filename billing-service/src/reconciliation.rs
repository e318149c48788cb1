use crate::error::{BillingError, BillingResult};
use crate::models::{LineItem, PaymentStatus};
use rust_decimal::Decimal;
use tracing::debug;

/// Money columns carry two decimal places.
pub const MONEY_SCALE: u32 = 2;

pub fn line_total(item: &LineItem) -> Decimal {
    item.amount * Decimal::from(item.quantity)
}

/// Bill total as the sum of its line totals.
pub fn bill_total<'a>(items: impl IntoIterator<Item = &'a LineItem>) -> Decimal {
    items.into_iter().map(line_total).sum::<Decimal>().round_dp(MONEY_SCALE)
}

pub fn amount_paid(payments: impl IntoIterator<Item = Decimal>) -> Decimal {
    payments.into_iter().sum()
}

/// A bill is paid exactly when its payments sum to at least its total.
pub fn is_settled(total: Decimal, payments: impl IntoIterator<Item = Decimal>) -> bool {
    amount_paid(payments) >= total
}

pub fn payment_status(total: Decimal, payments: impl IntoIterator<Item = Decimal>) -> PaymentStatus {
    let paid = amount_paid(payments);
    let status = PaymentStatus {
        is_paid: paid >= total,
        amount_paid: paid,
        balance: (total - paid).max(Decimal::ZERO),
    };
    debug!(%total, amount_paid = %paid, is_paid = status.is_paid, "Bill reconciled");
    status
}

/// Payment amounts must be positive with at most two decimal places.
pub fn validate_amount(amount: Decimal) -> BillingResult<()> {
    if amount <= Decimal::ZERO {
        return Err(BillingError::InvalidAmount(format!(
            "amount must be greater than zero, got {}",
            amount
        )));
    }
    validate_scale(amount)
}

/// Line amounts may be zero (waived items) but not negative.
pub fn validate_line_amount(amount: Decimal) -> BillingResult<()> {
    if amount < Decimal::ZERO {
        return Err(BillingError::InvalidAmount(format!(
            "amount cannot be negative, got {}",
            amount
        )));
    }
    validate_scale(amount)
}

pub fn validate_quantity(quantity: i32) -> BillingResult<()> {
    if quantity < 0 {
        return Err(BillingError::Validation(format!(
            "quantity cannot be negative, got {}",
            quantity
        )));
    }
    Ok(())
}

fn validate_scale(amount: Decimal) -> BillingResult<()> {
    if amount.normalize().scale() > MONEY_SCALE {
        return Err(BillingError::InvalidAmount(format!(
            "amount {} has more than {} decimal places",
            amount, MONEY_SCALE
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn bill_total_sums_line_totals() {
        let items = [
            LineItem::new(dec!(150.00), 1),
            LineItem::new(dec!(12.50), 4),
            LineItem::new(dec!(0), 3),
        ];
        assert_eq!(bill_total(&items), dec!(200.00));
        assert_eq!(bill_total(&Vec::<LineItem>::new()), Decimal::ZERO);
    }

    #[test]
    fn exact_payment_settles_the_bill() {
        assert!(is_settled(dec!(100.00), [dec!(60.00), dec!(40.00)]));
        assert!(!is_settled(dec!(100.00), [dec!(99.99)]));
        assert!(is_settled(dec!(0), []));
    }

    #[test]
    fn overpayment_leaves_zero_balance() {
        let status = payment_status(dec!(80), [dec!(50), dec!(50)]);
        assert!(status.is_paid);
        assert_eq!(status.amount_paid, dec!(100));
        assert_eq!(status.balance, Decimal::ZERO);
    }

    #[test]
    fn partial_payment_reports_balance() {
        let status = payment_status(dec!(250.00), [dec!(100.00)]);
        assert!(!status.is_paid);
        assert_eq!(status.balance, dec!(150.00));
    }

    #[test]
    fn payment_amount_rules() {
        assert!(validate_amount(dec!(10.25)).is_ok());
        assert!(validate_amount(dec!(10.250)).is_ok());
        assert!(validate_amount(dec!(0)).is_err());
        assert!(validate_amount(dec!(-5)).is_err());
        assert!(validate_amount(dec!(1.005)).is_err());
    }

    #[test]
    fn line_amount_allows_zero() {
        assert!(validate_line_amount(dec!(0)).is_ok());
        assert!(validate_line_amount(dec!(-0.01)).is_err());
        assert!(validate_quantity(0).is_ok());
        assert!(validate_quantity(-1).is_err());
    }
}
