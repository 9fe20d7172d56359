//! CSV exports of sales and expenses.

use super::escape_csv;
use crate::models::Expense;
use crate::sales::SalesReport;

/// One row per completed or voided sale in the report, amounts in the sale
/// currency.
pub fn sales_csv(report: &SalesReport) -> String {
    let mut csv = String::new();

    csv.push_str(
        "receipt_number,completed_at,status,customer,currency,subtotal,discount,total,paid,balance\n",
    );

    for sale in &report.sales {
        let t = &sale.totals;
        csv.push_str(&format!(
            "{},{},{},{},{},{:.2},{:.2},{:.2},{:.2},{:.2}\n",
            sale.receipt_number.map(|n| n.to_string()).unwrap_or_default(),
            escape_csv(sale.completed_at.as_deref().unwrap_or(&sale.created_at)),
            sale.status.as_str(),
            escape_csv(sale.customer_name.as_deref().unwrap_or("")),
            escape_csv(&sale.currency),
            t.subtotal,
            t.discount,
            t.total,
            t.paid,
            t.balance,
        ));
    }

    csv
}

/// Per-item quantities and revenue of a sales report, in the base currency.
pub fn sales_items_csv(report: &SalesReport) -> String {
    let mut csv = String::from("item_id,name,quantity,revenue,currency\n");
    for item in &report.items {
        csv.push_str(&format!(
            "{},{},{},{:.2},{}\n",
            escape_csv(&item.item_id),
            escape_csv(&item.name),
            item.quantity,
            item.revenue,
            escape_csv(&report.currency),
        ));
    }
    csv
}

/// One row per expense, in its own currency.
pub fn expenses_csv(expenses: &[Expense]) -> String {
    let mut csv = String::from("date,category,description,amount,currency,paid_to\n");

    for expense in expenses {
        csv.push_str(&format!(
            "{},{},{},{:.2},{},{}\n",
            expense.date.format("%Y-%m-%d"),
            escape_csv(&expense.category),
            escape_csv(expense.description.as_deref().unwrap_or("")),
            expense.amount,
            escape_csv(&expense.currency),
            escape_csv(expense.paid_to.as_deref().unwrap_or("")),
        ));
    }

    csv
}
