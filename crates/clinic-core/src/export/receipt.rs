//! Sale receipts and quotations.

use serde::{Deserialize, Serialize};

use super::{
    centered, clinic_header_html, clinic_lines, display_timestamp, escape_html, format_money,
    html_document,
};
use crate::config::ClinicProfile;
use crate::models::{Discount, Payment, Sale, SaleKind, SaleStatus, SaleTotals};
use crate::pricing::{line_amount, totals_in, ExchangeRates, PricingResult};

const WIDTH: usize = 40;

/// One printed line, with its amount in the sale currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReceiptLine {
    pub name: String,
    pub quantity: f64,
    pub unit_price: f64,
    pub currency: String,
    pub discount_percent: f64,
    pub amount: f64,
}

/// Everything a printed receipt shows, resolved ahead of rendering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Receipt {
    pub clinic: ClinicProfile,
    pub title: String,
    pub date: String,
    pub customer: Option<String>,
    pub currency: String,
    pub lines: Vec<ReceiptLine>,
    pub discount_label: Option<String>,
    pub totals: SaleTotals,
    /// Totals restated in other currencies
    pub alternate_totals: Vec<(String, SaleTotals)>,
    pub payments: Vec<Payment>,
    pub voided: bool,
    pub notes: Option<String>,
    pub footer: Option<String>,
}

impl Receipt {
    /// Resolve line amounts and alternate-currency totals for `sale`.
    ///
    /// Currencies equal to the sale currency or unknown to `rates` are skipped.
    pub fn build(
        clinic: &ClinicProfile,
        sale: &Sale,
        customer: Option<String>,
        rates: &ExchangeRates,
        alternate_currencies: &[String],
        footer: Option<String>,
    ) -> PricingResult<Self> {
        let mut lines = Vec::with_capacity(sale.items.len());
        for item in &sale.items {
            lines.push(ReceiptLine {
                name: item.name.clone(),
                quantity: item.quantity,
                unit_price: item.unit_price,
                currency: item.currency.clone(),
                discount_percent: item.discount_percent,
                amount: line_amount(item, &sale.currency, rates)?,
            });
        }

        let mut alternate_totals = Vec::new();
        for code in alternate_currencies {
            let code = code.trim().to_uppercase();
            if code == sale.currency || !rates.knows(&code) {
                continue;
            }
            alternate_totals.push((code.clone(), totals_in(sale, &code, rates)?));
        }

        let title = match (sale.kind, sale.receipt_number) {
            (SaleKind::Quotation, _) => "Quotation".to_string(),
            (SaleKind::Sale, Some(n)) => format!("Receipt #{}", n),
            (SaleKind::Sale, None) => "Pro forma".to_string(),
        };

        let discount_label = match sale.discount {
            Discount::None => None,
            Discount::Percent(p) => Some(format!("Discount ({}%)", p)),
            Discount::Amount(_) => Some("Discount".to_string()),
        };

        Ok(Self {
            clinic: clinic.clone(),
            title,
            date: display_timestamp(sale.completed_at.as_deref().unwrap_or(&sale.created_at)),
            customer: customer.or_else(|| sale.customer_name.clone()),
            currency: sale.currency.clone(),
            lines,
            discount_label,
            totals: sale.totals,
            alternate_totals,
            payments: sale.payments.clone(),
            voided: sale.status == SaleStatus::Voided,
            notes: sale.notes.clone(),
            footer,
        })
    }

    /// Fixed-width text for thermal printers.
    pub fn to_text(&self) -> String {
        let rule = "-".repeat(WIDTH);
        let mut out = Vec::new();

        for line in clinic_lines(&self.clinic) {
            out.push(centered(&line, WIDTH));
        }
        out.push(rule.clone());
        out.push(self.title.clone());
        if self.voided {
            out.push("*** VOID ***".to_string());
        }
        out.push(format!("Date: {}", self.date));
        if let Some(customer) = &self.customer {
            out.push(format!("Customer: {}", customer));
        }
        out.push(rule.clone());

        for line in &self.lines {
            out.push(line.name.clone());
            let mut detail = format!(
                "  {} x {}",
                line.quantity,
                format_money(line.unit_price, &line.currency)
            );
            if line.discount_percent > 0.0 {
                detail.push_str(&format!(" -{}%", line.discount_percent));
            }
            out.push(row(&detail, &format!("{:.2}", line.amount)));
        }
        out.push(rule.clone());

        let t = &self.totals;
        out.push(row("Subtotal", &format!("{:.2}", t.subtotal)));
        if let Some(label) = &self.discount_label {
            out.push(row(label, &format!("-{:.2}", t.discount)));
        }
        out.push(row("TOTAL", &format_money(t.total, &self.currency)));
        if t.paid > 0.0 {
            out.push(row("Paid", &format!("{:.2}", t.paid)));
        }
        if t.balance > 0.0 {
            out.push(row("Balance due", &format!("{:.2}", t.balance)));
        }
        if t.change > 0.0 {
            out.push(row("Change", &format!("{:.2}", t.change)));
        }

        for (code, totals) in &self.alternate_totals {
            out.push(row(&format!("Total in {}", code), &format!("{:.2}", totals.total)));
        }

        if !self.payments.is_empty() {
            out.push(rule.clone());
            out.push("Payments:".to_string());
            for payment in &self.payments {
                out.push(format!(
                    "  {} {}",
                    payment.method,
                    format_money(payment.amount, &payment.currency)
                ));
            }
        }

        if let Some(notes) = &self.notes {
            out.push(rule.clone());
            out.push(notes.clone());
        }
        if let Some(footer) = &self.footer {
            out.push(rule);
            out.push(centered(footer, WIDTH));
        }

        let mut text = out.join("\n");
        text.push('\n');
        text
    }

    pub fn to_html(&self) -> String {
        let mut body = clinic_header_html(&self.clinic);

        body.push_str(&format!("<h2>{}</h2>\n", escape_html(&self.title)));
        if self.voided {
            body.push_str("<p class=\"void\"><strong>VOID</strong></p>\n");
        }
        body.push_str(&format!("<p>Date: {}</p>\n", escape_html(&self.date)));
        if let Some(customer) = &self.customer {
            body.push_str(&format!("<p>Customer: {}</p>\n", escape_html(customer)));
        }

        body.push_str(
            "<table>\n<tr><th>Item</th><th>Qty</th><th>Unit price</th><th>Disc.</th>\
             <th>Amount</th></tr>\n",
        );
        for line in &self.lines {
            body.push_str(&format!(
                "<tr><td>{}</td><td class=\"num\">{}</td><td class=\"num\">{}</td>\
                 <td class=\"num\">{}</td><td class=\"num\">{:.2}</td></tr>\n",
                escape_html(&line.name),
                line.quantity,
                escape_html(&format_money(line.unit_price, &line.currency)),
                if line.discount_percent > 0.0 {
                    format!("{}%", line.discount_percent)
                } else {
                    String::new()
                },
                line.amount,
            ));
        }
        body.push_str("</table>\n");

        let t = &self.totals;
        let mut totals = vec![("Subtotal".to_string(), format!("{:.2}", t.subtotal))];
        if let Some(label) = &self.discount_label {
            totals.push((label.clone(), format!("-{:.2}", t.discount)));
        }
        totals.push(("Total".to_string(), format_money(t.total, &self.currency)));
        if t.paid > 0.0 {
            totals.push(("Paid".to_string(), format!("{:.2}", t.paid)));
        }
        if t.balance > 0.0 {
            totals.push(("Balance due".to_string(), format!("{:.2}", t.balance)));
        }
        if t.change > 0.0 {
            totals.push(("Change".to_string(), format!("{:.2}", t.change)));
        }
        for (code, alt) in &self.alternate_totals {
            totals.push((format!("Total in {}", code), format!("{:.2}", alt.total)));
        }

        body.push_str("<table class=\"totals\">\n");
        for (label, value) in totals {
            body.push_str(&format!(
                "<tr><th>{}</th><td class=\"num\">{}</td></tr>\n",
                escape_html(&label),
                escape_html(&value)
            ));
        }
        body.push_str("</table>\n");

        if !self.payments.is_empty() {
            body.push_str("<h3>Payments</h3>\n<ul>\n");
            for payment in &self.payments {
                body.push_str(&format!(
                    "<li>{} {}</li>\n",
                    escape_html(&payment.method),
                    escape_html(&format_money(payment.amount, &payment.currency))
                ));
            }
            body.push_str("</ul>\n");
        }
        if let Some(notes) = &self.notes {
            body.push_str(&format!("<p>{}</p>\n", escape_html(notes)));
        }
        if let Some(footer) = &self.footer {
            body.push_str(&format!("<footer>{}</footer>\n", escape_html(footer)));
        }

        html_document(&self.title, &body)
    }
}

/// Label on the left, value right-aligned to the receipt width.
fn row(label: &str, value: &str) -> String {
    let used = label.chars().count() + value.chars().count();
    let pad = WIDTH.saturating_sub(used).max(1);
    format!("{}{}{}", label, " ".repeat(pad), value)
}
