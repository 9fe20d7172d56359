//! Sale totals over multi-currency lines and payments.

use super::{round_money, ExchangeRates, PricingError, PricingResult};
use crate::models::{Discount, Sale, SaleItem, SaleTotals};

/// Reject lines, discounts and payments that cannot be priced.
pub fn validate_sale(sale: &Sale) -> PricingResult<()> {
    for item in &sale.items {
        if item.quantity.is_nan() || item.quantity <= 0.0 {
            return Err(PricingError::InvalidQuantity {
                item: item.name.clone(),
                quantity: item.quantity,
            });
        }
        if item.unit_price.is_nan() || item.unit_price < 0.0 {
            return Err(PricingError::InvalidPrice {
                item: item.name.clone(),
                price: item.unit_price,
            });
        }
        if !(0.0..=100.0).contains(&item.discount_percent) {
            return Err(PricingError::InvalidDiscount(format!(
                "{}% on {}",
                item.discount_percent, item.name
            )));
        }
    }

    match sale.discount {
        Discount::Percent(p) if !(0.0..=100.0).contains(&p) => {
            return Err(PricingError::InvalidDiscount(format!("{}% on sale", p)));
        }
        Discount::Amount(a) if a.is_nan() || a < 0.0 => {
            return Err(PricingError::InvalidDiscount(format!("{} on sale", a)));
        }
        _ => {}
    }

    for payment in &sale.payments {
        if payment.amount.is_nan() || payment.amount <= 0.0 {
            return Err(PricingError::InvalidPayment(payment.amount));
        }
    }
    Ok(())
}

/// Discounted line amount in `currency`, rounded to cents.
pub fn line_amount(item: &SaleItem, currency: &str, rates: &ExchangeRates) -> PricingResult<f64> {
    let gross = item.quantity * item.unit_price * (1.0 - item.discount_percent / 100.0);
    Ok(round_money(rates.convert(gross, &item.currency, currency)?))
}

/// Totals of `sale` in its own currency.
pub fn compute_totals(sale: &Sale, rates: &ExchangeRates) -> PricingResult<SaleTotals> {
    validate_sale(sale)?;

    let mut subtotal = 0.0;
    for item in &sale.items {
        subtotal += line_amount(item, &sale.currency, rates)?;
    }
    let subtotal = round_money(subtotal);

    let discount = match sale.discount {
        Discount::None => 0.0,
        Discount::Percent(p) => round_money(subtotal * p / 100.0),
        Discount::Amount(a) => round_money(a.min(subtotal)),
    };
    let total = round_money(subtotal - discount);

    let mut paid = 0.0;
    for payment in &sale.payments {
        paid += rates.convert(payment.amount, &payment.currency, &sale.currency)?;
    }
    let paid = round_money(paid);

    Ok(SaleTotals {
        subtotal,
        discount,
        total,
        paid,
        balance: round_money((total - paid).max(0.0)),
        change: round_money((paid - total).max(0.0)),
    })
}

/// The stored totals of `sale` expressed in another currency.
pub fn totals_in(sale: &Sale, currency: &str, rates: &ExchangeRates) -> PricingResult<SaleTotals> {
    let convert = |amount: f64| -> PricingResult<f64> {
        Ok(round_money(rates.convert(amount, &sale.currency, currency)?))
    };
    let t = &sale.totals;
    Ok(SaleTotals {
        subtotal: convert(t.subtotal)?,
        discount: convert(t.discount)?,
        total: convert(t.total)?,
        paid: convert(t.paid)?,
        balance: convert(t.balance)?,
        change: convert(t.change)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Payment, SaleKind};
    use proptest::prelude::*;

    fn rates() -> ExchangeRates {
        ExchangeRates::new("USD")
            .with_rate("LBP", 1.0 / 89_500.0)
            .with_rate("EUR", 1.10)
    }

    fn item(name: &str, quantity: f64, unit_price: f64, currency: &str) -> SaleItem {
        SaleItem {
            item_id: format!("id-{}", name),
            name: name.into(),
            quantity,
            unit_price,
            currency: currency.into(),
            discount_percent: 0.0,
        }
    }

    fn sale_with(items: Vec<SaleItem>) -> Sale {
        let mut sale = Sale::new(SaleKind::Sale, "USD".into());
        sale.items = items;
        sale
    }

    #[test]
    fn test_single_currency_totals() {
        let mut sale = sale_with(vec![
            item("Paracetamol", 2.0, 1.25, "USD"),
            item("Bandage", 1.0, 3.0, "USD"),
        ]);
        sale.payments.push(Payment::cash(10.0, "USD"));

        let totals = compute_totals(&sale, &rates()).unwrap();
        assert_eq!(totals.subtotal, 5.5);
        assert_eq!(totals.total, 5.5);
        assert_eq!(totals.paid, 10.0);
        assert_eq!(totals.balance, 0.0);
        assert_eq!(totals.change, 4.5);
    }

    #[test]
    fn test_mixed_currency_lines_and_payments() {
        let mut sale = sale_with(vec![
            item("Syrup", 1.0, 179_000.0, "LBP"), // 2.00 USD
            item("Cream", 1.0, 10.0, "EUR"),      // 11.00 USD
        ]);
        sale.payments.push(Payment::cash(447_500.0, "LBP")); // 5.00 USD

        let totals = compute_totals(&sale, &rates()).unwrap();
        assert_eq!(totals.subtotal, 13.0);
        assert_eq!(totals.paid, 5.0);
        assert_eq!(totals.balance, 8.0);
        assert_eq!(totals.change, 0.0);
    }

    #[test]
    fn test_line_and_sale_discounts() {
        let mut line = item("Vitamin D", 4.0, 5.0, "USD");
        line.discount_percent = 25.0;
        let mut sale = sale_with(vec![line]);
        sale.discount = Discount::Percent(10.0);

        let totals = compute_totals(&sale, &rates()).unwrap();
        assert_eq!(totals.subtotal, 15.0);
        assert_eq!(totals.discount, 1.5);
        assert_eq!(totals.total, 13.5);
    }

    #[test]
    fn test_amount_discount_capped_at_subtotal() {
        let mut sale = sale_with(vec![item("Gauze", 1.0, 2.0, "USD")]);
        sale.discount = Discount::Amount(5.0);

        let totals = compute_totals(&sale, &rates()).unwrap();
        assert_eq!(totals.discount, 2.0);
        assert_eq!(totals.total, 0.0);
    }

    #[test]
    fn test_validation() {
        let r = rates();
        let sale = sale_with(vec![item("Zero", 0.0, 1.0, "USD")]);
        assert!(matches!(
            compute_totals(&sale, &r),
            Err(PricingError::InvalidQuantity { .. })
        ));

        let sale = sale_with(vec![item("Negative", 1.0, -1.0, "USD")]);
        assert!(matches!(
            compute_totals(&sale, &r),
            Err(PricingError::InvalidPrice { .. })
        ));

        let mut discounted = item("Over", 1.0, 1.0, "USD");
        discounted.discount_percent = 101.0;
        assert!(matches!(
            compute_totals(&sale_with(vec![discounted]), &r),
            Err(PricingError::InvalidDiscount(_))
        ));

        let mut sale = sale_with(vec![item("Ok", 1.0, 1.0, "USD")]);
        sale.payments.push(Payment::cash(0.0, "USD"));
        assert_eq!(
            compute_totals(&sale, &r),
            Err(PricingError::InvalidPayment(0.0))
        );

        let sale = sale_with(vec![item("Pounds", 1.0, 1.0, "GBP")]);
        assert_eq!(
            compute_totals(&sale, &r),
            Err(PricingError::UnknownCurrency("GBP".into()))
        );
    }

    #[test]
    fn test_totals_in_other_currency() {
        let mut sale = sale_with(vec![item("Mask", 2.0, 1.0, "USD")]);
        sale.totals = compute_totals(&sale, &rates()).unwrap();

        let lbp = totals_in(&sale, "LBP", &rates()).unwrap();
        assert!((lbp.total - 179_000.0).abs() < 0.01);
        assert_eq!(lbp.paid, 0.0);
    }

    #[test]
    fn test_empty_sale_is_zero() {
        let totals = compute_totals(&sale_with(Vec::new()), &rates()).unwrap();
        assert_eq!(totals, SaleTotals::default());
    }

    proptest! {
        #[test]
        fn prop_balance_and_change_are_exclusive(
            lines in prop::collection::vec((1u32..20, 0u32..10_000, 0u32..=100), 0..8),
            paid_cents in 0u32..200_000,
        ) {
            let items = lines
                .iter()
                .enumerate()
                .map(|(i, (qty, cents, disc))| {
                    let mut it = item(&format!("i{}", i), *qty as f64, *cents as f64 / 100.0, "USD");
                    it.discount_percent = *disc as f64;
                    it
                })
                .collect();
            let mut sale = sale_with(items);
            if paid_cents > 0 {
                sale.payments.push(Payment::cash(paid_cents as f64 / 100.0, "USD"));
            }

            let t = compute_totals(&sale, &rates()).unwrap();
            prop_assert!(t.total >= 0.0);
            prop_assert!(t.total <= t.subtotal);
            prop_assert!(t.balance == 0.0 || t.change == 0.0);
            // total == paid + balance - change, up to a cent of rounding
            prop_assert!((t.total - (t.paid + t.balance - t.change)).abs() < 0.011);
        }
    }
}
