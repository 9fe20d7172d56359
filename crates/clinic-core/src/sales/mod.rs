//! Quotations, sales, payments and receipts.
//!
//! A sale is priced from inventory when it is opened, collects payments
//! while open, and on completion deducts stock, takes the next receipt
//! number and is written to the ledger, all in one transaction.

mod report;

pub use report::{ItemSales, SalesReport};

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{info, warn};

use crate::db::{Database, DbError, LedgerEntryKind};
use crate::ledger::{Ledger, LedgerError};
use crate::models::{
    round_quantity, DraftLine, Payment, Sale, SaleDraft, SaleItem, SaleKind, SaleStatus,
};
use crate::pricing::{compute_totals, ExchangeRates, PricingError};

/// Sales errors.
#[derive(Error, Debug)]
pub enum SalesError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid sale state: {0}")]
    InvalidState(String),

    #[error("Insufficient stock for {item}: {available} available, {requested} requested")]
    InsufficientStock {
        item: String,
        available: f64,
        requested: f64,
    },

    #[error("Sale has an unpaid balance of {balance} {currency}")]
    Unpaid { balance: f64, currency: String },
}

pub type SalesResult<T> = Result<T, SalesError>;

/// Sales counter bound to one database and one rates table.
pub struct SalesDesk<'a> {
    db: &'a Database,
    rates: &'a ExchangeRates,
}

impl<'a> SalesDesk<'a> {
    pub fn new(db: &'a Database, rates: &'a ExchangeRates) -> Self {
        Self { db, rates }
    }

    /// Store a priced quotation. Stock is not touched.
    pub fn create_quotation(&self, draft: &SaleDraft) -> SalesResult<Sale> {
        let sale = self.price_draft(SaleKind::Quotation, draft)?;
        self.db.insert_sale(&sale)?;
        info!(sale_id = %sale.id, total = sale.totals.total, "created quotation");
        Ok(sale)
    }

    /// Open a sale awaiting payment.
    pub fn open_sale(&self, draft: &SaleDraft) -> SalesResult<Sale> {
        let sale = self.price_draft(SaleKind::Sale, draft)?;
        self.db.insert_sale(&sale)?;
        info!(sale_id = %sale.id, total = sale.totals.total, "opened sale");
        Ok(sale)
    }

    /// Open a sale from a quotation, re-priced at current inventory prices.
    pub fn convert_quotation(&self, quotation_id: &str) -> SalesResult<Sale> {
        let quotation = self.load(quotation_id)?;
        if quotation.kind != SaleKind::Quotation {
            return Err(SalesError::InvalidState(format!(
                "{} is not a quotation",
                quotation_id
            )));
        }

        let draft = SaleDraft {
            currency: quotation.currency.clone(),
            patient_id: quotation.patient_id.clone(),
            customer_name: quotation.customer_name.clone(),
            lines: quotation
                .items
                .iter()
                .map(|item| DraftLine {
                    item_id: item.item_id.clone(),
                    quantity: item.quantity,
                    discount_percent: item.discount_percent,
                })
                .collect(),
            discount: quotation.discount,
            notes: quotation.notes.clone(),
        };

        let mut sale = self.price_draft(SaleKind::Sale, &draft)?;
        sale.quotation_id = Some(quotation.id.clone());
        self.db.insert_sale(&sale)?;
        info!(sale_id = %sale.id, quotation_id, "converted quotation to sale");
        Ok(sale)
    }

    /// Record a payment against an open sale.
    pub fn add_payment(&self, sale_id: &str, payment: Payment) -> SalesResult<Sale> {
        let mut sale = self.load_open_sale(sale_id)?;
        sale.payments.push(payment);
        sale.totals = compute_totals(&sale, self.rates)?;
        self.db.update_sale(&sale)?;
        info!(sale_id, paid = sale.totals.paid, balance = sale.totals.balance, "payment added");
        Ok(sale)
    }

    /// Complete an open sale: deduct stock, number the receipt, log to the ledger.
    ///
    /// An outstanding balance is refused unless `allow_credit` is set.
    pub fn complete_sale(&self, sale_id: &str, allow_credit: bool) -> SalesResult<Sale> {
        let sale = self.db.atomically(|db| {
            let mut sale = self.load_open_sale(sale_id)?;
            if sale.items.is_empty() {
                return Err(SalesError::InvalidState(format!("sale {} has no items", sale_id)));
            }
            sale.totals = compute_totals(&sale, self.rates)?;
            if sale.totals.balance > 0.0 && !allow_credit {
                warn!(sale_id, balance = sale.totals.balance, "refused to complete unpaid sale");
                return Err(SalesError::Unpaid {
                    balance: sale.totals.balance,
                    currency: sale.currency.clone(),
                });
            }

            let needed = quantities_by_item(&sale.items);
            for (item_id, requested) in &needed {
                let item = db
                    .get_inventory_item(item_id)?
                    .ok_or_else(|| SalesError::NotFound(format!("inventory item {}", item_id)))?;
                if round_quantity(item.stock) < *requested {
                    warn!(item = %item.name, stock = item.stock, requested, "insufficient stock");
                    return Err(SalesError::InsufficientStock {
                        item: item.name,
                        available: item.stock,
                        requested: *requested,
                    });
                }
            }
            for (item_id, requested) in &needed {
                db.adjust_stock(item_id, -requested)?;
            }

            sale.receipt_number = Some(db.next_receipt_number()?);
            sale.status = SaleStatus::Completed;
            sale.completed_at = Some(chrono::Utc::now().to_rfc3339());
            db.update_sale(&sale)?;
            Ledger::new(db).append(LedgerEntryKind::Completed, &sale)?;
            Ok(sale)
        })?;

        info!(
            sale_id,
            receipt = ?sale.receipt_number,
            total = sale.totals.total,
            "completed sale"
        );
        Ok(sale)
    }

    /// Reverse a completed sale and put its stock back.
    pub fn void_sale(&self, sale_id: &str, reason: &str) -> SalesResult<Sale> {
        let sale = self.db.atomically(|db| {
            let mut sale = self.load(sale_id)?;
            if sale.status != SaleStatus::Completed {
                return Err(SalesError::InvalidState(format!(
                    "only completed sales can be voided, {} is {}",
                    sale_id,
                    sale.status.as_str()
                )));
            }

            for (item_id, quantity) in quantities_by_item(&sale.items) {
                db.adjust_stock(&item_id, quantity)?;
            }

            sale.status = SaleStatus::Voided;
            sale.voided_at = Some(chrono::Utc::now().to_rfc3339());
            let reason = reason.trim();
            if !reason.is_empty() {
                sale.notes = Some(match sale.notes.take() {
                    Some(notes) => format!("{}\nVoided: {}", notes, reason),
                    None => format!("Voided: {}", reason),
                });
            }
            db.update_sale(&sale)?;
            Ledger::new(db).append(LedgerEntryKind::Voided, &sale)?;
            Ok(sale)
        })?;

        info!(sale_id, receipt = ?sale.receipt_number, "voided sale");
        Ok(sale)
    }

    /// Build a priced, unsaved sale from a draft using current inventory.
    pub fn price_draft(&self, kind: SaleKind, draft: &SaleDraft) -> SalesResult<Sale> {
        let currency = draft.currency.trim().to_uppercase();
        if !self.rates.knows(&currency) {
            return Err(PricingError::UnknownCurrency(draft.currency.clone()).into());
        }

        let mut sale = Sale::new(kind, currency);
        sale.patient_id = draft.patient_id.clone();
        sale.customer_name = draft.customer_name.clone();
        sale.discount = draft.discount;
        sale.notes = draft.notes.clone();

        for line in &draft.lines {
            let item = self
                .db
                .get_inventory_item(&line.item_id)?
                .filter(|item| item.active)
                .ok_or_else(|| SalesError::NotFound(format!("inventory item {}", line.item_id)))?;
            sale.items.push(SaleItem {
                item_id: item.id,
                name: item.name,
                quantity: line.quantity,
                unit_price: item.unit_price,
                currency: item.currency,
                discount_percent: line.discount_percent,
            });
        }

        sale.totals = compute_totals(&sale, self.rates)?;
        Ok(sale)
    }

    fn load(&self, sale_id: &str) -> SalesResult<Sale> {
        self.db
            .get_sale(sale_id)?
            .ok_or_else(|| SalesError::NotFound(format!("sale {}", sale_id)))
    }

    fn load_open_sale(&self, sale_id: &str) -> SalesResult<Sale> {
        let sale = self.load(sale_id)?;
        if sale.kind != SaleKind::Sale || sale.status != SaleStatus::Open {
            return Err(SalesError::InvalidState(format!(
                "{} is a {} {}, not an open sale",
                sale_id,
                sale.status.as_str(),
                sale.kind.as_str()
            )));
        }
        Ok(sale)
    }
}

/// Total quantity per inventory item, rounded to avoid float drift.
fn quantities_by_item(items: &[SaleItem]) -> BTreeMap<String, f64> {
    let mut totals = BTreeMap::new();
    for item in items {
        *totals.entry(item.item_id.clone()).or_insert(0.0) += item.quantity;
    }
    totals.into_iter().map(|(k, v)| (k, round_quantity(v))).collect()
}
