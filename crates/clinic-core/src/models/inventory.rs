//! Pharmacy inventory, supplier and purchasing models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Decimal places kept for stock quantities.
pub const STOCK_DECIMALS: i32 = 6;

/// Round a stock quantity so repeated fractional sales do not drift.
pub fn round_quantity(quantity: f64) -> f64 {
    let scale = 10f64.powi(STOCK_DECIMALS);
    (quantity * scale).round() / scale
}

/// A stocked item in the pharmacy inventory.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    /// UUID
    pub id: String,
    /// Trade name (e.g., "Panadol 500mg")
    pub name: String,
    /// Generic / active ingredient name
    pub generic_name: Option<String>,
    /// Dosage form (tablet, syrup, ...)
    pub form: Option<String>,
    /// Strength (e.g., "500mg")
    pub strength: Option<String>,
    pub barcode: Option<String>,
    /// Selling price per unit
    pub unit_price: f64,
    /// Last purchase cost per unit
    pub cost_price: f64,
    /// Currency of both prices
    pub currency: String,
    /// Units on hand
    pub stock: f64,
    /// Low-stock threshold
    pub reorder_level: f64,
    pub expiry_date: Option<NaiveDate>,
    pub supplier_id: Option<String>,
    /// Inactive items are hidden from search and sales
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl InventoryItem {
    /// Create a new item with required fields.
    pub fn new(name: String, unit_price: f64, currency: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            generic_name: None,
            form: None,
            strength: None,
            barcode: None,
            unit_price,
            cost_price: 0.0,
            currency,
            stock: 0.0,
            reorder_level: 0.0,
            expiry_date: None,
            supplier_id: None,
            active: true,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    pub fn is_low_stock(&self) -> bool {
        self.active && self.stock <= self.reorder_level
    }

    /// Check if the item expires on or before `today + days`.
    pub fn expires_within(&self, days: i64, today: NaiveDate) -> bool {
        match self.expiry_date {
            Some(expiry) => expiry <= today + chrono::Duration::days(days),
            None => false,
        }
    }

    pub fn is_expired(&self, today: NaiveDate) -> bool {
        self.expiry_date.map(|e| e < today).unwrap_or(false)
    }
}

/// A supplier the pharmacy purchases from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Supplier {
    pub id: String,
    pub name: String,
    pub contact_person: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub address: Option<String>,
    pub notes: Option<String>,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

impl Supplier {
    pub fn new(name: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            contact_person: None,
            phone: None,
            email: None,
            address: None,
            notes: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            deleted_at: None,
        }
    }
}

/// Purchase order status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PurchaseStatus {
    Ordered,
    Received,
    Cancelled,
}

impl PurchaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PurchaseStatus::Ordered => "ordered",
            PurchaseStatus::Received => "received",
            PurchaseStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ordered" => Some(PurchaseStatus::Ordered),
            "received" => Some(PurchaseStatus::Received),
            "cancelled" => Some(PurchaseStatus::Cancelled),
            _ => None,
        }
    }
}

/// One line of a purchase order.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseLine {
    pub item_id: String,
    pub quantity: f64,
    /// Cost per unit in the order currency
    pub unit_cost: f64,
}

/// A purchase order placed with a supplier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PurchaseOrder {
    pub id: String,
    pub supplier_id: String,
    pub lines: Vec<PurchaseLine>,
    pub currency: String,
    /// Amount paid to the supplier so far, in order currency
    pub amount_paid: f64,
    pub status: PurchaseStatus,
    pub ordered_at: String,
    pub received_at: Option<String>,
}

impl PurchaseOrder {
    pub fn new(supplier_id: String, currency: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            supplier_id,
            lines: Vec::new(),
            currency,
            amount_paid: 0.0,
            status: PurchaseStatus::Ordered,
            ordered_at: chrono::Utc::now().to_rfc3339(),
            received_at: None,
        }
    }

    /// Order total in order currency.
    pub fn total(&self) -> f64 {
        self.lines.iter().map(|l| l.quantity * l.unit_cost).sum()
    }

    /// Amount still owed to the supplier, in order currency.
    pub fn outstanding(&self) -> f64 {
        (self.total() - self.amount_paid).max(0.0)
    }
}
