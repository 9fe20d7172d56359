//! Inventory database operations.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{format_date, now_rfc3339, parse_optional_date, Database, DbError, DbResult};
use crate::models::{InventoryItem, STOCK_DECIMALS};

const ITEM_COLUMNS: &str = "i.id, i.name, i.generic_name, i.form, i.strength, i.barcode, \
     i.unit_price, i.cost_price, i.currency, i.stock, i.reorder_level, i.expiry_date, \
     i.supplier_id, i.active, i.created_at, i.updated_at";

impl Database {
    /// Insert a new inventory item.
    pub fn insert_inventory_item(&self, item: &InventoryItem) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO inventory_items (
                id, name, generic_name, form, strength, barcode, unit_price,
                cost_price, currency, stock, reorder_level, expiry_date,
                supplier_id, active, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
            "#,
            params![
                item.id,
                item.name,
                item.generic_name,
                item.form,
                item.strength,
                item.barcode,
                item.unit_price,
                item.cost_price,
                item.currency,
                item.stock,
                item.reorder_level,
                item.expiry_date.as_ref().map(format_date),
                item.supplier_id,
                item.active,
                item.created_at,
                item.updated_at,
            ],
        )?;
        Ok(())
    }

    /// Update an inventory item, including its stock level.
    pub fn update_inventory_item(&self, item: &InventoryItem) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE inventory_items SET
                name = ?2,
                generic_name = ?3,
                form = ?4,
                strength = ?5,
                barcode = ?6,
                unit_price = ?7,
                cost_price = ?8,
                currency = ?9,
                stock = ?10,
                reorder_level = ?11,
                expiry_date = ?12,
                supplier_id = ?13,
                active = ?14,
                updated_at = ?15
            WHERE id = ?1
            "#,
            params![
                item.id,
                item.name,
                item.generic_name,
                item.form,
                item.strength,
                item.barcode,
                item.unit_price,
                item.cost_price,
                item.currency,
                item.stock,
                item.reorder_level,
                item.expiry_date.as_ref().map(format_date),
                item.supplier_id,
                item.active,
                now_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get an inventory item by ID.
    pub fn get_inventory_item(&self, id: &str) -> DbResult<Option<InventoryItem>> {
        let sql = format!("SELECT {} FROM inventory_items i WHERE i.id = ?", ITEM_COLUMNS);
        self.conn
            .query_row(&sql, [id], ItemRow::from_row)
            .optional()?
            .map(InventoryItem::try_from)
            .transpose()
    }

    /// Get an inventory item by barcode.
    pub fn get_inventory_item_by_barcode(&self, barcode: &str) -> DbResult<Option<InventoryItem>> {
        let sql = format!(
            "SELECT {} FROM inventory_items i WHERE i.barcode = ? LIMIT 1",
            ITEM_COLUMNS
        );
        self.conn
            .query_row(&sql, [barcode], ItemRow::from_row)
            .optional()?
            .map(InventoryItem::try_from)
            .transpose()
    }

    /// Search active items using FTS5 (BM25 ranking).
    pub fn search_inventory(&self, query: &str, limit: usize) -> DbResult<Vec<InventoryItem>> {
        let escaped_query = escape_fts_query(query);
        if escaped_query.is_empty() {
            return Ok(Vec::new());
        }

        let sql = format!(
            r#"
            SELECT {}, bm25(inventory_items_fts) as rank
            FROM inventory_items i
            JOIN inventory_items_fts fts ON i.rowid = fts.rowid
            WHERE inventory_items_fts MATCH ?
            AND i.active = 1
            ORDER BY rank
            LIMIT ?
            "#,
            ITEM_COLUMNS
        );
        self.query_items(&sql, params![escaped_query, limit as i64])
    }

    /// List items by name.
    pub fn list_inventory_items(&self, active_only: bool) -> DbResult<Vec<InventoryItem>> {
        let sql = format!(
            "SELECT {} FROM inventory_items i WHERE (?1 = 0 OR i.active = 1) ORDER BY i.name",
            ITEM_COLUMNS
        );
        self.query_items(&sql, params![active_only])
    }

    /// Active items at or below their reorder level.
    pub fn list_low_stock_items(&self) -> DbResult<Vec<InventoryItem>> {
        let sql = format!(
            r#"
            SELECT {} FROM inventory_items i
            WHERE i.active = 1 AND i.stock <= i.reorder_level
            ORDER BY i.stock - i.reorder_level, i.name
            "#,
            ITEM_COLUMNS
        );
        self.query_items(&sql, [])
    }

    /// Active, in-stock items expiring on or before `cutoff`, soonest first.
    pub fn list_expiring_items(&self, cutoff: NaiveDate) -> DbResult<Vec<InventoryItem>> {
        let sql = format!(
            r#"
            SELECT {} FROM inventory_items i
            WHERE i.active = 1 AND i.stock > 0
              AND i.expiry_date IS NOT NULL AND i.expiry_date <= ?
            ORDER BY i.expiry_date, i.name
            "#,
            ITEM_COLUMNS
        );
        self.query_items(&sql, [format_date(&cutoff)])
    }

    /// Add `delta` (possibly negative) to an item's stock, rounded to
    /// `STOCK_DECIMALS` places.
    ///
    /// Fails with `Constraint` instead of letting stock go below zero.
    pub fn adjust_stock(&self, id: &str, delta: f64) -> DbResult<f64> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE inventory_items SET stock = round(stock + ?2, ?4), updated_at = ?3
            WHERE id = ?1 AND round(stock + ?2, ?4) >= 0
            "#,
            params![id, delta, now_rfc3339(), STOCK_DECIMALS],
        )?;

        if rows_affected == 0 {
            let current: Option<f64> = self
                .conn
                .query_row(
                    "SELECT stock FROM inventory_items WHERE id = ?",
                    [id],
                    |row| row.get(0),
                )
                .optional()?;
            return match current {
                None => Err(DbError::NotFound(format!("inventory item {}", id))),
                Some(stock) => Err(DbError::Constraint(format!(
                    "insufficient stock for {}: have {}, need {}",
                    id, stock, -delta
                ))),
            };
        }

        let stock = self.conn.query_row(
            "SELECT stock FROM inventory_items WHERE id = ?",
            [id],
            |row| row.get(0),
        )?;
        Ok(stock)
    }

    /// Record a new purchase cost for an item.
    pub fn set_cost_price(&self, id: &str, cost_price: f64) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE inventory_items SET cost_price = ?2, updated_at = ?3 WHERE id = ?1",
            params![id, cost_price, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Mark item as inactive (soft delete).
    pub fn deactivate_inventory_item(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE inventory_items SET active = 0, updated_at = ?2 WHERE id = ?1",
            params![id, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    fn query_items<P: rusqlite::Params>(&self, sql: &str, params: P) -> DbResult<Vec<InventoryItem>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, ItemRow::from_row)?;

        let mut items = Vec::new();
        for row in rows {
            items.push(row?.try_into()?);
        }
        Ok(items)
    }
}

/// Intermediate row struct for database mapping.
struct ItemRow {
    id: String,
    name: String,
    generic_name: Option<String>,
    form: Option<String>,
    strength: Option<String>,
    barcode: Option<String>,
    unit_price: f64,
    cost_price: f64,
    currency: String,
    stock: f64,
    reorder_level: f64,
    expiry_date: Option<String>,
    supplier_id: Option<String>,
    active: bool,
    created_at: String,
    updated_at: String,
}

impl ItemRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            generic_name: row.get(2)?,
            form: row.get(3)?,
            strength: row.get(4)?,
            barcode: row.get(5)?,
            unit_price: row.get(6)?,
            cost_price: row.get(7)?,
            currency: row.get(8)?,
            stock: row.get(9)?,
            reorder_level: row.get(10)?,
            expiry_date: row.get(11)?,
            supplier_id: row.get(12)?,
            active: row.get(13)?,
            created_at: row.get(14)?,
            updated_at: row.get(15)?,
        })
    }
}

impl TryFrom<ItemRow> for InventoryItem {
    type Error = DbError;

    fn try_from(row: ItemRow) -> Result<Self, Self::Error> {
        Ok(InventoryItem {
            expiry_date: parse_optional_date(row.expiry_date)?,
            id: row.id,
            name: row.name,
            generic_name: row.generic_name,
            form: row.form,
            strength: row.strength,
            barcode: row.barcode,
            unit_price: row.unit_price,
            cost_price: row.cost_price,
            currency: row.currency,
            stock: row.stock,
            reorder_level: row.reorder_level,
            supplier_id: row.supplier_id,
            active: row.active,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Escape special FTS5 characters and prepare query for prefix matching.
fn escape_fts_query(query: &str) -> String {
    let cleaned: String = query
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .map(|word| format!("{}*", word))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    fn item(name: &str, stock: f64) -> InventoryItem {
        let mut item = InventoryItem::new(name.into(), 2.0, "USD".into());
        item.stock = stock;
        item
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();

        let mut panadol = item("Panadol 500mg", 100.0);
        panadol.generic_name = Some("paracetamol".into());
        panadol.barcode = Some("6291100000011".into());
        panadol.expiry_date = NaiveDate::from_ymd_opt(2026, 1, 31);
        db.insert_inventory_item(&panadol).unwrap();

        let retrieved = db.get_inventory_item(&panadol.id).unwrap().unwrap();
        assert_eq!(retrieved.name, "Panadol 500mg");
        assert_eq!(retrieved.expiry_date, panadol.expiry_date);

        let by_barcode = db
            .get_inventory_item_by_barcode("6291100000011")
            .unwrap()
            .unwrap();
        assert_eq!(by_barcode.id, panadol.id);
    }

    #[test]
    fn test_search_inventory() {
        let db = setup_db();

        let mut panadol = item("Panadol 500mg", 10.0);
        panadol.generic_name = Some("paracetamol".into());
        db.insert_inventory_item(&panadol).unwrap();
        db.insert_inventory_item(&item("Augmentin 1g", 5.0)).unwrap();

        // By name
        let results = db.search_inventory("panadol", 10).unwrap();
        assert_eq!(results.len(), 1);

        // By generic name
        let results = db.search_inventory("paracet", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, panadol.id);

        // Special characters are ignored
        let results = db.search_inventory("augmentin \"1g", 10).unwrap();
        assert_eq!(results.len(), 1);

        assert!(db.search_inventory("  ", 10).unwrap().is_empty());
    }

    #[test]
    fn test_adjust_stock() {
        let db = setup_db();
        let panadol = item("Panadol", 10.0);
        db.insert_inventory_item(&panadol).unwrap();

        assert_eq!(db.adjust_stock(&panadol.id, -4.0).unwrap(), 6.0);
        assert_eq!(db.adjust_stock(&panadol.id, 10.0).unwrap(), 16.0);

        let err = db.adjust_stock(&panadol.id, -20.0).unwrap_err();
        assert!(matches!(err, DbError::Constraint(_)));
        assert_eq!(
            db.get_inventory_item(&panadol.id).unwrap().unwrap().stock,
            16.0
        );

        let err = db.adjust_stock("missing", 1.0).unwrap_err();
        assert!(matches!(err, DbError::NotFound(_)));
    }

    #[test]
    fn test_fractional_stock_does_not_drift() {
        let db = setup_db();
        let syrup = item("Syrup (L)", 0.3);
        db.insert_inventory_item(&syrup).unwrap();

        assert_eq!(db.adjust_stock(&syrup.id, -0.1).unwrap(), 0.2);
        assert_eq!(db.adjust_stock(&syrup.id, -0.2).unwrap(), 0.0);
        assert!(matches!(
            db.adjust_stock(&syrup.id, -0.000001),
            Err(DbError::Constraint(_))
        ));
    }

    #[test]
    fn test_low_stock_and_expiring() {
        let db = setup_db();

        let mut low = item("Ventolin", 2.0);
        low.reorder_level = 5.0;
        low.expiry_date = NaiveDate::from_ymd_opt(2024, 2, 1);
        db.insert_inventory_item(&low).unwrap();

        let mut fine = item("Brufen", 50.0);
        fine.reorder_level = 5.0;
        fine.expiry_date = NaiveDate::from_ymd_opt(2025, 2, 1);
        db.insert_inventory_item(&fine).unwrap();

        let low_items = db.list_low_stock_items().unwrap();
        assert_eq!(low_items.len(), 1);
        assert_eq!(low_items[0].name, "Ventolin");

        let cutoff = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let expiring = db.list_expiring_items(cutoff).unwrap();
        assert_eq!(expiring.len(), 1);
        assert_eq!(expiring[0].name, "Ventolin");
    }

    #[test]
    fn test_deactivate() {
        let db = setup_db();
        let panadol = item("Panadol", 10.0);
        db.insert_inventory_item(&panadol).unwrap();

        db.deactivate_inventory_item(&panadol.id).unwrap();

        assert!(db.search_inventory("panadol", 10).unwrap().is_empty());
        assert!(db.list_inventory_items(true).unwrap().is_empty());
        assert_eq!(db.list_inventory_items(false).unwrap().len(), 1);
    }
}
