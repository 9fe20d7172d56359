//! Sales summary over a date range.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{SalesDesk, SalesResult};
use crate::models::{Sale, SaleKind, SaleStatus};
use crate::pricing::{line_amount, round_money, ExchangeRates, PricingResult};

/// Quantity and revenue of one inventory item.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ItemSales {
    pub item_id: String,
    pub name: String,
    pub quantity: f64,
    /// Line revenue in the base currency, before sale-level discounts
    pub revenue: f64,
}

/// Completed sales between two dates, amounts in the base currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SalesReport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub currency: String,
    pub completed: usize,
    pub voided: usize,
    pub subtotal: f64,
    pub discounts: f64,
    pub total: f64,
    /// Unpaid balances left on credit sales
    pub outstanding: f64,
    pub items: Vec<ItemSales>,
    /// Completed and voided sales in the range, oldest first
    pub sales: Vec<Sale>,
}

impl SalesReport {
    /// Summarize `sales`; open sales and quotations are ignored.
    pub fn build(
        from: NaiveDate,
        to: NaiveDate,
        sales: Vec<Sale>,
        rates: &ExchangeRates,
    ) -> PricingResult<Self> {
        let mut report = SalesReport {
            from,
            to,
            currency: rates.base.clone(),
            completed: 0,
            voided: 0,
            subtotal: 0.0,
            discounts: 0.0,
            total: 0.0,
            outstanding: 0.0,
            items: Vec::new(),
            sales: Vec::new(),
        };
        let mut items: BTreeMap<String, ItemSales> = BTreeMap::new();

        for sale in sales {
            if sale.kind != SaleKind::Sale {
                continue;
            }
            match sale.status {
                SaleStatus::Open => continue,
                SaleStatus::Voided => report.voided += 1,
                SaleStatus::Completed => {
                    report.completed += 1;
                    let base = &rates.base;
                    report.subtotal += rates.convert(sale.totals.subtotal, &sale.currency, base)?;
                    report.discounts += rates.convert(sale.totals.discount, &sale.currency, base)?;
                    report.total += rates.convert(sale.totals.total, &sale.currency, base)?;
                    report.outstanding += rates.convert(sale.totals.balance, &sale.currency, base)?;

                    for line in &sale.items {
                        let revenue = line_amount(line, base, rates)?;
                        let entry = items.entry(line.item_id.clone()).or_insert_with(|| ItemSales {
                            item_id: line.item_id.clone(),
                            name: line.name.clone(),
                            quantity: 0.0,
                            revenue: 0.0,
                        });
                        entry.quantity += line.quantity;
                        entry.revenue += revenue;
                    }
                }
            }
            report.sales.push(sale);
        }

        report.subtotal = round_money(report.subtotal);
        report.discounts = round_money(report.discounts);
        report.total = round_money(report.total);
        report.outstanding = round_money(report.outstanding);

        report.items = items
            .into_values()
            .map(|mut item| {
                item.revenue = round_money(item.revenue);
                item
            })
            .collect();
        report
            .items
            .sort_by(|a, b| b.revenue.total_cmp(&a.revenue).then_with(|| a.name.cmp(&b.name)));
        Ok(report)
    }
}

impl<'a> SalesDesk<'a> {
    /// Report over sales created on `from ..= to`.
    pub fn report(&self, from: NaiveDate, to: NaiveDate) -> SalesResult<SalesReport> {
        let start = format!("{}T00:00:00", from.format("%Y-%m-%d"));
        let end_day = to.succ_opt().unwrap_or(to);
        let end = format!("{}T00:00:00", end_day.format("%Y-%m-%d"));

        let sales = self
            .db
            .list_sales(&start, &end, Some(SaleKind::Sale), None)?;
        let report = SalesReport::build(from, to, sales, self.rates)?;
        debug!(%from, %to, completed = report.completed, total = report.total, "built sales report");
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{SaleItem, SaleTotals};

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, d).unwrap()
    }

    fn completed(currency: &str, item: (&str, f64, f64), total: f64) -> Sale {
        let mut sale = Sale::new(SaleKind::Sale, currency.into());
        sale.status = SaleStatus::Completed;
        sale.items.push(SaleItem {
            item_id: item.0.into(),
            name: item.0.to_uppercase(),
            quantity: item.1,
            unit_price: item.2,
            currency: currency.into(),
            discount_percent: 0.0,
        });
        sale.totals = SaleTotals {
            subtotal: total,
            total,
            paid: total,
            ..SaleTotals::default()
        };
        sale
    }

    #[test]
    fn test_build_converts_to_base() {
        let rates = ExchangeRates::new("USD").with_rate("EUR", 1.5);
        let mut voided = completed("USD", ("a", 1.0, 100.0), 100.0);
        voided.status = SaleStatus::Voided;
        let mut open = completed("USD", ("a", 1.0, 100.0), 100.0);
        open.status = SaleStatus::Open;

        let sales = vec![
            completed("USD", ("a", 2.0, 5.0), 10.0),
            completed("EUR", ("a", 1.0, 10.0), 10.0),
            completed("USD", ("b", 1.0, 3.0), 3.0),
            voided,
            open,
        ];
        let report = SalesReport::build(day(1), day(31), sales, &rates).unwrap();

        assert_eq!(report.completed, 3);
        assert_eq!(report.voided, 1);
        assert_eq!(report.total, 28.0);
        assert_eq!(report.sales.len(), 4);
        assert_eq!(report.items.len(), 2);
        assert_eq!(report.items[0].item_id, "a");
        assert_eq!(report.items[0].quantity, 3.0);
        assert_eq!(report.items[0].revenue, 25.0);
    }
}
