//! Supplier and purchase order database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{now_rfc3339, Database, DbError, DbResult};
use crate::models::{PurchaseOrder, PurchaseStatus, Supplier};

const SUPPLIER_COLUMNS: &str =
    "id, name, contact_person, phone, email, address, notes, created_at, deleted_at";

const ORDER_COLUMNS: &str =
    "id, supplier_id, lines, currency, amount_paid, status, ordered_at, received_at";

impl Database {
    /// Insert a new supplier.
    pub fn insert_supplier(&self, supplier: &Supplier) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO suppliers (
                id, name, contact_person, phone, email, address, notes, created_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
            "#,
            params![
                supplier.id,
                supplier.name,
                supplier.contact_person,
                supplier.phone,
                supplier.email,
                supplier.address,
                supplier.notes,
                supplier.created_at,
                supplier.deleted_at,
            ],
        )?;
        Ok(())
    }

    /// Update supplier details.
    pub fn update_supplier(&self, supplier: &Supplier) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE suppliers SET
                name = ?2,
                contact_person = ?3,
                phone = ?4,
                email = ?5,
                address = ?6,
                notes = ?7
            WHERE id = ?1
            "#,
            params![
                supplier.id,
                supplier.name,
                supplier.contact_person,
                supplier.phone,
                supplier.email,
                supplier.address,
                supplier.notes,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a supplier by ID.
    pub fn get_supplier(&self, id: &str) -> DbResult<Option<Supplier>> {
        let sql = format!("SELECT {} FROM suppliers WHERE id = ?", SUPPLIER_COLUMNS);
        self.conn
            .query_row(&sql, [id], supplier_from_row)
            .optional()
            .map_err(Into::into)
    }

    /// List live suppliers by name.
    pub fn list_suppliers(&self) -> DbResult<Vec<Supplier>> {
        let sql = format!(
            "SELECT {} FROM suppliers WHERE deleted_at IS NULL ORDER BY name",
            SUPPLIER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], supplier_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Soft-delete a supplier.
    pub fn soft_delete_supplier(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE suppliers SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![id, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Insert a purchase order.
    pub fn insert_purchase_order(&self, order: &PurchaseOrder) -> DbResult<()> {
        let lines_json = serde_json::to_string(&order.lines)?;
        self.conn.execute(
            r#"
            INSERT INTO purchase_orders (
                id, supplier_id, lines, currency, amount_paid, status, ordered_at, received_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
            params![
                order.id,
                order.supplier_id,
                lines_json,
                order.currency,
                order.amount_paid,
                order.status.as_str(),
                order.ordered_at,
                order.received_at,
            ],
        )?;
        Ok(())
    }

    /// Update a purchase order.
    pub fn update_purchase_order(&self, order: &PurchaseOrder) -> DbResult<bool> {
        let lines_json = serde_json::to_string(&order.lines)?;
        let rows_affected = self.conn.execute(
            r#"
            UPDATE purchase_orders SET
                lines = ?2,
                currency = ?3,
                amount_paid = ?4,
                status = ?5,
                received_at = ?6
            WHERE id = ?1
            "#,
            params![
                order.id,
                lines_json,
                order.currency,
                order.amount_paid,
                order.status.as_str(),
                order.received_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a purchase order by ID.
    pub fn get_purchase_order(&self, id: &str) -> DbResult<Option<PurchaseOrder>> {
        let sql = format!("SELECT {} FROM purchase_orders WHERE id = ?", ORDER_COLUMNS);
        self.conn
            .query_row(&sql, [id], OrderRow::from_row)
            .optional()?
            .map(PurchaseOrder::try_from)
            .transpose()
    }

    /// Purchase orders, optionally filtered by supplier and status, newest first.
    pub fn list_purchase_orders(
        &self,
        supplier_id: Option<&str>,
        status: Option<PurchaseStatus>,
    ) -> DbResult<Vec<PurchaseOrder>> {
        let sql = format!(
            r#"
            SELECT {} FROM purchase_orders
            WHERE (?1 IS NULL OR supplier_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY ordered_at DESC
            "#,
            ORDER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![supplier_id, status.map(|s| s.as_str())],
            OrderRow::from_row,
        )?;

        let mut orders = Vec::new();
        for row in rows {
            orders.push(row?.try_into()?);
        }
        Ok(orders)
    }
}

fn supplier_from_row(row: &Row<'_>) -> rusqlite::Result<Supplier> {
    Ok(Supplier {
        id: row.get(0)?,
        name: row.get(1)?,
        contact_person: row.get(2)?,
        phone: row.get(3)?,
        email: row.get(4)?,
        address: row.get(5)?,
        notes: row.get(6)?,
        created_at: row.get(7)?,
        deleted_at: row.get(8)?,
    })
}

/// Intermediate row struct for database mapping.
struct OrderRow {
    id: String,
    supplier_id: String,
    lines: String,
    currency: String,
    amount_paid: f64,
    status: String,
    ordered_at: String,
    received_at: Option<String>,
}

impl OrderRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            supplier_id: row.get(1)?,
            lines: row.get(2)?,
            currency: row.get(3)?,
            amount_paid: row.get(4)?,
            status: row.get(5)?,
            ordered_at: row.get(6)?,
            received_at: row.get(7)?,
        })
    }
}

impl TryFrom<OrderRow> for PurchaseOrder {
    type Error = DbError;

    fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
        Ok(PurchaseOrder {
            lines: serde_json::from_str(&row.lines)?,
            status: PurchaseStatus::parse(&row.status).ok_or_else(|| {
                DbError::InvalidData(format!("purchase status {:?}", row.status))
            })?,
            id: row.id,
            supplier_id: row.supplier_id,
            currency: row.currency,
            amount_paid: row.amount_paid,
            ordered_at: row.ordered_at,
            received_at: row.received_at,
        })
    }
}
