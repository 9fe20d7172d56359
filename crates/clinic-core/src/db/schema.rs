//! SQLite schema definition.

/// Complete database schema for the clinic.
pub const SCHEMA: &str = r#"
-- Enable foreign keys
PRAGMA foreign_keys = ON;

-- ============================================================================
-- People
-- ============================================================================

CREATE TABLE IF NOT EXISTS patients (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    phone TEXT,
    email TEXT,
    date_of_birth TEXT,                          -- YYYY-MM-DD
    gender TEXT,
    address TEXT,
    blood_type TEXT,
    allergies TEXT NOT NULL DEFAULT '[]',        -- JSON array of strings
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_patients_name ON patients(name);
CREATE INDEX IF NOT EXISTS idx_patients_phone ON patients(phone);

CREATE TABLE IF NOT EXISTS doctors (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    specialty TEXT,
    phone TEXT,
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

-- ============================================================================
-- Appointments
-- ============================================================================

CREATE TABLE IF NOT EXISTS appointments (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    doctor_id TEXT NOT NULL REFERENCES doctors(id),
    start_at TEXT NOT NULL,                      -- YYYY-MM-DDTHH:MM:SS, clinic local time
    end_at TEXT NOT NULL,
    reason TEXT,
    status TEXT NOT NULL DEFAULT 'scheduled',    -- scheduled, completed, cancelled, no_show
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    deleted_at TEXT,
    CHECK (end_at > start_at)
);

CREATE INDEX IF NOT EXISTS idx_appointments_doctor ON appointments(doctor_id, start_at);
CREATE INDEX IF NOT EXISTS idx_appointments_patient ON appointments(patient_id, start_at);

-- ============================================================================
-- Prescriptions
-- ============================================================================

CREATE TABLE IF NOT EXISTS prescriptions (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    doctor_id TEXT NOT NULL REFERENCES doctors(id),
    items TEXT NOT NULL DEFAULT '[]',            -- JSON array of PrescriptionItem
    notes TEXT,
    status TEXT NOT NULL DEFAULT 'active',       -- active, dispensed, cancelled
    editing_by TEXT,                             -- single edit lock holder
    editing_since TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now')),
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_prescriptions_patient ON prescriptions(patient_id);

-- ============================================================================
-- Lab orders
-- ============================================================================

CREATE TABLE IF NOT EXISTS lab_orders (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    doctor_id TEXT,
    test_name TEXT NOT NULL,
    lab_name TEXT,
    price REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'ordered',      -- ordered, sample_collected, completed, cancelled
    result TEXT,
    attachments TEXT NOT NULL DEFAULT '[]',      -- JSON array of object keys
    ordered_at TEXT NOT NULL DEFAULT (datetime('now')),
    completed_at TEXT,
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_lab_orders_patient ON lab_orders(patient_id);
CREATE INDEX IF NOT EXISTS idx_lab_orders_status ON lab_orders(status);

-- ============================================================================
-- Inventory and purchasing
-- ============================================================================

CREATE TABLE IF NOT EXISTS suppliers (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    contact_person TEXT,
    phone TEXT,
    email TEXT,
    address TEXT,
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    deleted_at TEXT
);

CREATE TABLE IF NOT EXISTS inventory_items (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    generic_name TEXT,
    form TEXT,
    strength TEXT,
    barcode TEXT,
    unit_price REAL NOT NULL DEFAULT 0,
    cost_price REAL NOT NULL DEFAULT 0,
    currency TEXT NOT NULL,
    stock REAL NOT NULL DEFAULT 0 CHECK (stock >= 0),
    reorder_level REAL NOT NULL DEFAULT 0,
    expiry_date TEXT,                            -- YYYY-MM-DD
    supplier_id TEXT REFERENCES suppliers(id),
    active INTEGER NOT NULL DEFAULT 1,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    updated_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE INDEX IF NOT EXISTS idx_inventory_barcode ON inventory_items(barcode);

-- FTS5 virtual table for item search
CREATE VIRTUAL TABLE IF NOT EXISTS inventory_items_fts USING fts5(
    name,
    generic_name,
    barcode,
    content='inventory_items',
    content_rowid='rowid'
);

-- Triggers to keep FTS5 in sync with main table
CREATE TRIGGER IF NOT EXISTS inventory_items_ai AFTER INSERT ON inventory_items BEGIN
    INSERT INTO inventory_items_fts(rowid, name, generic_name, barcode)
    VALUES (new.rowid, new.name, new.generic_name, new.barcode);
END;

CREATE TRIGGER IF NOT EXISTS inventory_items_ad AFTER DELETE ON inventory_items BEGIN
    INSERT INTO inventory_items_fts(inventory_items_fts, rowid, name, generic_name, barcode)
    VALUES ('delete', old.rowid, old.name, old.generic_name, old.barcode);
END;

CREATE TRIGGER IF NOT EXISTS inventory_items_au AFTER UPDATE ON inventory_items BEGIN
    INSERT INTO inventory_items_fts(inventory_items_fts, rowid, name, generic_name, barcode)
    VALUES ('delete', old.rowid, old.name, old.generic_name, old.barcode);
    INSERT INTO inventory_items_fts(rowid, name, generic_name, barcode)
    VALUES (new.rowid, new.name, new.generic_name, new.barcode);
END;

CREATE TABLE IF NOT EXISTS purchase_orders (
    id TEXT PRIMARY KEY,
    supplier_id TEXT NOT NULL REFERENCES suppliers(id),
    lines TEXT NOT NULL DEFAULT '[]',            -- JSON array of PurchaseLine
    currency TEXT NOT NULL,
    amount_paid REAL NOT NULL DEFAULT 0,
    status TEXT NOT NULL DEFAULT 'ordered',      -- ordered, received, cancelled
    ordered_at TEXT NOT NULL DEFAULT (datetime('now')),
    received_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_purchase_orders_supplier ON purchase_orders(supplier_id);

-- ============================================================================
-- Expenses and referrals
-- ============================================================================

CREATE TABLE IF NOT EXISTS expenses (
    id TEXT PRIMARY KEY,
    category TEXT NOT NULL,
    description TEXT,
    amount REAL NOT NULL CHECK (amount > 0),
    currency TEXT NOT NULL,
    date TEXT NOT NULL,                          -- YYYY-MM-DD
    paid_to TEXT,
    receipt_key TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    deleted_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_expenses_date ON expenses(date);

CREATE TABLE IF NOT EXISTS referral_letters (
    id TEXT PRIMARY KEY,
    patient_id TEXT NOT NULL REFERENCES patients(id),
    doctor_id TEXT NOT NULL REFERENCES doctors(id),
    referred_to TEXT NOT NULL,
    specialty TEXT,
    reason TEXT NOT NULL,
    clinical_summary TEXT,
    urgency TEXT NOT NULL DEFAULT 'routine',
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    deleted_at TEXT
);

-- ============================================================================
-- Sales
-- ============================================================================

CREATE TABLE IF NOT EXISTS sales (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL CHECK (kind IN ('sale', 'quotation')),
    status TEXT NOT NULL DEFAULT 'open',         -- open, completed, voided
    patient_id TEXT,
    customer_name TEXT,
    currency TEXT NOT NULL,
    items TEXT NOT NULL DEFAULT '[]',            -- JSON array of SaleItem
    discount TEXT NOT NULL DEFAULT '{"type":"none"}',
    payments TEXT NOT NULL DEFAULT '[]',         -- JSON array of Payment
    totals TEXT NOT NULL,                        -- JSON SaleTotals
    receipt_number INTEGER UNIQUE,
    quotation_id TEXT,
    notes TEXT,
    created_at TEXT NOT NULL DEFAULT (datetime('now')),
    completed_at TEXT,
    voided_at TEXT
);

CREATE INDEX IF NOT EXISTS idx_sales_created ON sales(created_at);

-- ============================================================================
-- Sales ledger (Append-Only - Immutable after creation)
-- ============================================================================

CREATE TABLE IF NOT EXISTS sales_ledger (
    seq INTEGER PRIMARY KEY,
    entry_kind TEXT NOT NULL CHECK (entry_kind IN ('completed', 'voided')),
    sale_id TEXT NOT NULL,
    payload TEXT NOT NULL,                       -- canonical sale JSON
    prev_hash TEXT NOT NULL,
    entry_hash TEXT NOT NULL UNIQUE,
    created_at TEXT NOT NULL DEFAULT (datetime('now'))
);

CREATE TRIGGER IF NOT EXISTS sales_ledger_no_update BEFORE UPDATE ON sales_ledger
BEGIN
    SELECT RAISE(ABORT, 'Ledger entries are immutable');
END;

CREATE TRIGGER IF NOT EXISTS sales_ledger_no_delete BEFORE DELETE ON sales_ledger
BEGIN
    SELECT RAISE(ABORT, 'Ledger entries are immutable');
END;
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    #[test]
    fn test_schema_valid() {
        let conn = Connection::open_in_memory().unwrap();
        let result = conn.execute_batch(SCHEMA);
        assert!(result.is_ok(), "Schema should be valid SQL: {:?}", result);
    }

    #[test]
    fn test_schema_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();
        assert!(conn.execute_batch(SCHEMA).is_ok());
    }

    #[test]
    fn test_fts_trigger() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO inventory_items (id, name, generic_name, currency) VALUES (?, ?, ?, ?)",
            ["item-1", "Panadol 500mg", "paracetamol", "USD"],
        )
        .unwrap();

        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM inventory_items_fts WHERE inventory_items_fts MATCH 'paracetamol'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_stock_cannot_go_negative() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        let result = conn.execute(
            "INSERT INTO inventory_items (id, name, currency, stock) VALUES ('a', 'A', 'USD', -1)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_ledger_immutable() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(SCHEMA).unwrap();

        conn.execute(
            "INSERT INTO sales_ledger (seq, entry_kind, sale_id, payload, prev_hash, entry_hash)
             VALUES (1, 'completed', 's1', '{}', '', 'h1')",
            [],
        )
        .unwrap();

        let update = conn.execute("UPDATE sales_ledger SET payload = 'x' WHERE seq = 1", []);
        assert!(update.is_err());

        let delete = conn.execute("DELETE FROM sales_ledger WHERE seq = 1", []);
        assert!(delete.is_err());
    }
}
