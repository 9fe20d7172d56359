//! Sale and quotation models.

use serde::{Deserialize, Serialize};

/// Whether a document is a binding sale or a price quotation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SaleKind {
    Sale,
    Quotation,
}

impl SaleKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleKind::Sale => "sale",
            SaleKind::Quotation => "quotation",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "sale" => Some(SaleKind::Sale),
            "quotation" => Some(SaleKind::Quotation),
            _ => None,
        }
    }
}

/// Sale lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SaleStatus {
    /// Being edited / awaiting payment. Quotations stay open.
    Open,
    /// Stock deducted and receipt issued
    Completed,
    /// Reversed after completion
    Voided,
}

impl SaleStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SaleStatus::Open => "open",
            SaleStatus::Completed => "completed",
            SaleStatus::Voided => "voided",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(SaleStatus::Open),
            "completed" => Some(SaleStatus::Completed),
            "voided" => Some(SaleStatus::Voided),
            _ => None,
        }
    }
}

/// A line on a sale or quotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleItem {
    /// Inventory item ID
    pub item_id: String,
    /// Item name at time of sale (for receipts)
    pub name: String,
    pub quantity: f64,
    pub unit_price: f64,
    /// Currency of `unit_price`
    pub currency: String,
    /// Line discount, 0 - 100
    pub discount_percent: f64,
}

/// Sale-level discount.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Discount {
    #[default]
    None,
    /// Percentage of the subtotal, 0 - 100
    Percent(f64),
    /// Fixed amount in the sale currency
    Amount(f64),
}

/// A payment tendered against a sale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Payment {
    pub amount: f64,
    pub currency: String,
    /// e.g. "cash", "card"
    pub method: String,
    pub received_at: String,
}

impl Payment {
    pub fn cash(amount: f64, currency: &str) -> Self {
        Self {
            amount,
            currency: currency.to_string(),
            method: "cash".into(),
            received_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Computed totals, all in the sale currency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Default)]
pub struct SaleTotals {
    /// Sum of discounted lines
    pub subtotal: f64,
    /// Sale-level discount applied
    pub discount: f64,
    /// Amount due
    pub total: f64,
    /// Payments received
    pub paid: f64,
    /// Still owed
    pub balance: f64,
    /// Change to return
    pub change: f64,
}

/// A sale or quotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Sale {
    pub id: String,
    pub kind: SaleKind,
    pub status: SaleStatus,
    pub patient_id: Option<String>,
    /// Walk-in customer name
    pub customer_name: Option<String>,
    /// Currency the sale is priced in
    pub currency: String,
    pub items: Vec<SaleItem>,
    pub discount: Discount,
    pub payments: Vec<Payment>,
    pub totals: SaleTotals,
    /// Sequential receipt number, assigned on completion
    pub receipt_number: Option<i64>,
    /// Quotation this sale was converted from
    pub quotation_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub completed_at: Option<String>,
    pub voided_at: Option<String>,
}

impl Sale {
    pub fn new(kind: SaleKind, currency: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            status: SaleStatus::Open,
            patient_id: None,
            customer_name: None,
            currency,
            items: Vec::new(),
            discount: Discount::None,
            payments: Vec::new(),
            totals: SaleTotals::default(),
            receipt_number: None,
            quotation_id: None,
            notes: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
            voided_at: None,
        }
    }

    /// Serialize to canonical JSON for ledger hashing.
    pub fn to_canonical_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Input for creating a sale or quotation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SaleDraft {
    pub currency: String,
    pub patient_id: Option<String>,
    pub customer_name: Option<String>,
    pub lines: Vec<DraftLine>,
    pub discount: Discount,
    pub notes: Option<String>,
}

/// A requested line; price and name are filled from inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DraftLine {
    pub item_id: String,
    pub quantity: f64,
    #[serde(default)]
    pub discount_percent: f64,
}

impl SaleDraft {
    pub fn new(currency: &str) -> Self {
        Self {
            currency: currency.to_string(),
            patient_id: None,
            customer_name: None,
            lines: Vec::new(),
            discount: Discount::None,
            notes: None,
        }
    }

    pub fn line(mut self, item_id: &str, quantity: f64) -> Self {
        self.lines.push(DraftLine {
            item_id: item_id.to_string(),
            quantity,
            discount_percent: 0.0,
        });
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discount_serde_shape() {
        let json = serde_json::to_string(&Discount::Percent(10.0)).unwrap();
        assert_eq!(json, r#"{"type":"percent","value":10.0}"#);

        let none: Discount = serde_json::from_str(r#"{"type":"none"}"#).unwrap();
        assert_eq!(none, Discount::None);
    }

    #[test]
    fn test_draft_builder() {
        let draft = SaleDraft::new("USD").line("a", 2.0).line("b", 1.0);
        assert_eq!(draft.lines.len(), 2);
        assert_eq!(draft.lines[1].item_id, "b");
    }
}
