//! Supplier purchase orders and payables.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{Database, DbError};
use crate::models::{PurchaseLine, PurchaseOrder, PurchaseStatus};
use crate::pricing::{round_money, ExchangeRates, PricingError};

/// Purchasing errors.
#[derive(Error, Debug)]
pub enum PurchasingError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid purchase order: {0}")]
    Invalid(String),

    #[error("Purchase order {id} is {status:?}")]
    WrongStatus { id: String, status: PurchaseStatus },

    #[error("Purchase order {id} already has {paid} paid against it")]
    Prepaid { id: String, paid: f64 },
}

pub type PurchasingResult<T> = Result<T, PurchasingError>;

/// What the clinic owes one supplier, in the base currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SupplierBalance {
    pub supplier_id: String,
    pub currency: String,
    /// Value of goods received
    pub received: f64,
    /// Paid against received orders
    pub paid: f64,
    /// Paid in advance against orders not yet received
    pub prepaid: f64,
    /// Received minus everything paid; negative while prepayments exceed
    /// the goods received
    pub balance: f64,
    /// Value of orders not yet received
    pub on_order: f64,
}

/// Purchasing bound to one database and one rates table.
pub struct Purchasing<'a> {
    db: &'a Database,
    rates: &'a ExchangeRates,
}

impl<'a> Purchasing<'a> {
    pub fn new(db: &'a Database, rates: &'a ExchangeRates) -> Self {
        Self { db, rates }
    }

    /// Place an order with a live supplier for known inventory items.
    pub fn create_purchase_order(
        &self,
        supplier_id: &str,
        currency: &str,
        lines: Vec<PurchaseLine>,
    ) -> PurchasingResult<PurchaseOrder> {
        match self.db.get_supplier(supplier_id)? {
            Some(supplier) if supplier.deleted_at.is_none() => {}
            _ => return Err(PurchasingError::NotFound(format!("supplier {}", supplier_id))),
        }
        let currency = currency.trim().to_uppercase();
        if !self.rates.knows(&currency) {
            return Err(PricingError::UnknownCurrency(currency).into());
        }
        if lines.is_empty() {
            return Err(PurchasingError::Invalid("no lines".into()));
        }
        for line in &lines {
            if line.quantity.is_nan() || line.quantity <= 0.0 {
                return Err(PurchasingError::Invalid(format!(
                    "quantity {} for {}",
                    line.quantity, line.item_id
                )));
            }
            if line.unit_cost.is_nan() || line.unit_cost < 0.0 {
                return Err(PurchasingError::Invalid(format!(
                    "unit cost {} for {}",
                    line.unit_cost, line.item_id
                )));
            }
            if self.db.get_inventory_item(&line.item_id)?.is_none() {
                return Err(PurchasingError::NotFound(format!(
                    "inventory item {}",
                    line.item_id
                )));
            }
        }

        let mut order = PurchaseOrder::new(supplier_id.to_string(), currency);
        order.lines = lines;
        self.db.insert_purchase_order(&order)?;
        info!(order_id = %order.id, supplier_id, total = order.total(), "created purchase order");
        Ok(order)
    }

    /// Book the goods into stock and refresh each item's cost price.
    pub fn receive_purchase_order(&self, order_id: &str) -> PurchasingResult<PurchaseOrder> {
        let order = self.db.atomically(|db| {
            let mut order = self.load_ordered(order_id)?;
            for line in &order.lines {
                let item = db.get_inventory_item(&line.item_id)?.ok_or_else(|| {
                    PurchasingError::NotFound(format!("inventory item {}", line.item_id))
                })?;
                db.adjust_stock(&item.id, line.quantity)?;
                let cost = self
                    .rates
                    .convert(line.unit_cost, &order.currency, &item.currency)?;
                db.set_cost_price(&item.id, round_money(cost))?;
            }
            order.status = PurchaseStatus::Received;
            order.received_at = Some(chrono::Utc::now().to_rfc3339());
            db.update_purchase_order(&order)?;
            Ok::<_, PurchasingError>(order)
        })?;

        info!(order_id, lines = order.lines.len(), "received purchase order");
        Ok(order)
    }

    /// Cancel an order nothing has been paid against.
    pub fn cancel_purchase_order(&self, order_id: &str) -> PurchasingResult<PurchaseOrder> {
        let mut order = self.load_ordered(order_id)?;
        if order.amount_paid > 0.0 {
            warn!(order_id, paid = order.amount_paid, "refused to cancel a paid order");
            return Err(PurchasingError::Prepaid {
                id: order.id,
                paid: order.amount_paid,
            });
        }
        order.status = PurchaseStatus::Cancelled;
        self.db.update_purchase_order(&order)?;
        info!(order_id, "cancelled purchase order");
        Ok(order)
    }

    /// Record money paid to the supplier against an order, in order currency.
    pub fn record_supplier_payment(
        &self,
        order_id: &str,
        amount: f64,
    ) -> PurchasingResult<PurchaseOrder> {
        if amount.is_nan() || amount <= 0.0 {
            return Err(PurchasingError::Invalid(format!("payment {}", amount)));
        }
        let mut order = self.load(order_id)?;
        if order.status == PurchaseStatus::Cancelled {
            return Err(PurchasingError::WrongStatus {
                id: order.id,
                status: order.status,
            });
        }
        let paid = round_money(order.amount_paid + amount);
        if paid > round_money(order.total()) {
            warn!(order_id, paid, total = order.total(), "rejected supplier overpayment");
            return Err(PurchasingError::Invalid(format!(
                "payment of {} exceeds the {} outstanding",
                amount,
                round_money(order.outstanding())
            )));
        }
        order.amount_paid = paid;
        self.db.update_purchase_order(&order)?;
        info!(order_id, amount, "recorded supplier payment");
        Ok(order)
    }

    /// Outstanding payables to a supplier.
    pub fn supplier_balance(&self, supplier_id: &str) -> PurchasingResult<SupplierBalance> {
        if self.db.get_supplier(supplier_id)?.is_none() {
            return Err(PurchasingError::NotFound(format!("supplier {}", supplier_id)));
        }

        let mut balance = SupplierBalance {
            supplier_id: supplier_id.to_string(),
            currency: self.rates.base.clone(),
            received: 0.0,
            paid: 0.0,
            prepaid: 0.0,
            balance: 0.0,
            on_order: 0.0,
        };
        for order in self.db.list_purchase_orders(Some(supplier_id), None)? {
            let total = self.rates.to_base(order.total(), &order.currency)?;
            match order.status {
                PurchaseStatus::Received => {
                    balance.received += total;
                    balance.paid += self.rates.to_base(order.amount_paid, &order.currency)?;
                }
                PurchaseStatus::Ordered => {
                    balance.on_order += total;
                    balance.prepaid += self.rates.to_base(order.amount_paid, &order.currency)?;
                }
                PurchaseStatus::Cancelled => {}
            }
        }
        balance.received = round_money(balance.received);
        balance.paid = round_money(balance.paid);
        balance.prepaid = round_money(balance.prepaid);
        balance.on_order = round_money(balance.on_order);
        balance.balance = round_money(balance.received - balance.paid - balance.prepaid);
        Ok(balance)
    }

    fn load(&self, order_id: &str) -> PurchasingResult<PurchaseOrder> {
        self.db
            .get_purchase_order(order_id)?
            .ok_or_else(|| PurchasingError::NotFound(format!("purchase order {}", order_id)))
    }

    fn load_ordered(&self, order_id: &str) -> PurchasingResult<PurchaseOrder> {
        let order = self.load(order_id)?;
        if order.status != PurchaseStatus::Ordered {
            return Err(PurchasingError::WrongStatus {
                id: order.id,
                status: order.status,
            });
        }
        Ok(order)
    }
}
