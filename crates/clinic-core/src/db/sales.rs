//! Sale and quotation database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};
use crate::models::{Sale, SaleKind, SaleStatus};

const SALE_COLUMNS: &str = "id, kind, status, patient_id, customer_name, currency, items, \
     discount, payments, totals, receipt_number, quotation_id, notes, created_at, \
     completed_at, voided_at";

impl Database {
    /// Insert a new sale or quotation.
    pub fn insert_sale(&self, sale: &Sale) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO sales (
                id, kind, status, patient_id, customer_name, currency, items,
                discount, payments, totals, receipt_number, quotation_id, notes,
                created_at, completed_at, voided_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                sale.id,
                sale.kind.as_str(),
                sale.status.as_str(),
                sale.patient_id,
                sale.customer_name,
                sale.currency,
                serde_json::to_string(&sale.items)?,
                serde_json::to_string(&sale.discount)?,
                serde_json::to_string(&sale.payments)?,
                serde_json::to_string(&sale.totals)?,
                sale.receipt_number,
                sale.quotation_id,
                sale.notes,
                sale.created_at,
                sale.completed_at,
                sale.voided_at,
            ],
        )?;
        Ok(())
    }

    /// Update everything but the identity and creation time of a sale.
    pub fn update_sale(&self, sale: &Sale) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE sales SET
                status = ?2,
                patient_id = ?3,
                customer_name = ?4,
                currency = ?5,
                items = ?6,
                discount = ?7,
                payments = ?8,
                totals = ?9,
                receipt_number = ?10,
                notes = ?11,
                completed_at = ?12,
                voided_at = ?13
            WHERE id = ?1
            "#,
            params![
                sale.id,
                sale.status.as_str(),
                sale.patient_id,
                sale.customer_name,
                sale.currency,
                serde_json::to_string(&sale.items)?,
                serde_json::to_string(&sale.discount)?,
                serde_json::to_string(&sale.payments)?,
                serde_json::to_string(&sale.totals)?,
                sale.receipt_number,
                sale.notes,
                sale.completed_at,
                sale.voided_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a sale by ID.
    pub fn get_sale(&self, id: &str) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {} FROM sales WHERE id = ?", SALE_COLUMNS);
        self.conn
            .query_row(&sql, [id], SaleRow::from_row)
            .optional()?
            .map(Sale::try_from)
            .transpose()
    }

    /// Get a completed or voided sale by its receipt number.
    pub fn get_sale_by_receipt(&self, receipt_number: i64) -> DbResult<Option<Sale>> {
        let sql = format!("SELECT {} FROM sales WHERE receipt_number = ?", SALE_COLUMNS);
        self.conn
            .query_row(&sql, [receipt_number], SaleRow::from_row)
            .optional()?
            .map(Sale::try_from)
            .transpose()
    }

    /// Sales created in `[from, to)` (RFC 3339 strings), oldest first.
    pub fn list_sales(
        &self,
        from: &str,
        to: &str,
        kind: Option<SaleKind>,
        status: Option<SaleStatus>,
    ) -> DbResult<Vec<Sale>> {
        let sql = format!(
            r#"
            SELECT {} FROM sales
            WHERE created_at >= ?1 AND created_at < ?2
              AND (?3 IS NULL OR kind = ?3)
              AND (?4 IS NULL OR status = ?4)
            ORDER BY created_at
            "#,
            SALE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![from, to, kind.map(|k| k.as_str()), status.map(|s| s.as_str())],
            SaleRow::from_row,
        )?;

        let mut sales = Vec::new();
        for row in rows {
            sales.push(row?.try_into()?);
        }
        Ok(sales)
    }

    /// Next receipt number: one past the highest ever issued.
    pub fn next_receipt_number(&self) -> DbResult<i64> {
        let max: Option<i64> =
            self.conn
                .query_row("SELECT MAX(receipt_number) FROM sales", [], |row| row.get(0))?;
        Ok(max.unwrap_or(0) + 1)
    }
}

/// Intermediate row struct for database mapping.
struct SaleRow {
    id: String,
    kind: String,
    status: String,
    patient_id: Option<String>,
    customer_name: Option<String>,
    currency: String,
    items: String,
    discount: String,
    payments: String,
    totals: String,
    receipt_number: Option<i64>,
    quotation_id: Option<String>,
    notes: Option<String>,
    created_at: String,
    completed_at: Option<String>,
    voided_at: Option<String>,
}

impl SaleRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            kind: row.get(1)?,
            status: row.get(2)?,
            patient_id: row.get(3)?,
            customer_name: row.get(4)?,
            currency: row.get(5)?,
            items: row.get(6)?,
            discount: row.get(7)?,
            payments: row.get(8)?,
            totals: row.get(9)?,
            receipt_number: row.get(10)?,
            quotation_id: row.get(11)?,
            notes: row.get(12)?,
            created_at: row.get(13)?,
            completed_at: row.get(14)?,
            voided_at: row.get(15)?,
        })
    }
}

impl TryFrom<SaleRow> for Sale {
    type Error = DbError;

    fn try_from(row: SaleRow) -> Result<Self, Self::Error> {
        Ok(Sale {
            kind: SaleKind::parse(&row.kind)
                .ok_or_else(|| DbError::InvalidData(format!("sale kind {:?}", row.kind)))?,
            status: SaleStatus::parse(&row.status)
                .ok_or_else(|| DbError::InvalidData(format!("sale status {:?}", row.status)))?,
            items: serde_json::from_str(&row.items)?,
            discount: serde_json::from_str(&row.discount)?,
            payments: serde_json::from_str(&row.payments)?,
            totals: serde_json::from_str(&row.totals)?,
            id: row.id,
            patient_id: row.patient_id,
            customer_name: row.customer_name,
            currency: row.currency,
            receipt_number: row.receipt_number,
            quotation_id: row.quotation_id,
            notes: row.notes,
            created_at: row.created_at,
            completed_at: row.completed_at,
            voided_at: row.voided_at,
        })
    }
}
