//! Sales ledger database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{Database, DbError, DbResult};

/// What a ledger entry records.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerEntryKind {
    Completed,
    Voided,
}

impl LedgerEntryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerEntryKind::Completed => "completed",
            LedgerEntryKind::Voided => "voided",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "completed" => Some(LedgerEntryKind::Completed),
            "voided" => Some(LedgerEntryKind::Voided),
            _ => None,
        }
    }
}

/// One row of the append-only sales ledger.
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub seq: i64,
    pub kind: LedgerEntryKind,
    pub sale_id: String,
    /// Canonical JSON of the sale at the time of the entry
    pub payload: String,
    pub prev_hash: String,
    pub entry_hash: String,
    pub created_at: String,
}

const LEDGER_COLUMNS: &str = "seq, entry_kind, sale_id, payload, prev_hash, entry_hash, created_at";

impl Database {
    /// Append a ledger entry. The row is immutable afterwards.
    pub fn insert_ledger_entry(&self, entry: &LedgerEntry) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO sales_ledger (
                seq, entry_kind, sale_id, payload, prev_hash, entry_hash, created_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                entry.seq,
                entry.kind.as_str(),
                entry.sale_id,
                entry.payload,
                entry.prev_hash,
                entry.entry_hash,
                entry.created_at,
            ],
        )?;
        Ok(())
    }

    /// The most recent ledger entry, if any.
    pub fn last_ledger_entry(&self) -> DbResult<Option<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM sales_ledger ORDER BY seq DESC LIMIT 1",
            LEDGER_COLUMNS
        );
        self.conn
            .query_row(&sql, [], LedgerRow::from_row)
            .optional()?
            .map(LedgerEntry::try_from)
            .transpose()
    }

    /// All ledger entries in sequence order.
    pub fn list_ledger_entries(&self) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!("SELECT {} FROM sales_ledger ORDER BY seq", LEDGER_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], LedgerRow::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.try_into()?);
        }
        Ok(entries)
    }

    /// Every ledger row in sequence order, each decoded on its own so one
    /// corrupt row does not hide the rest.
    pub fn list_ledger_entries_by_row(&self) -> DbResult<Vec<(i64, DbResult<LedgerEntry>)>> {
        let sql = format!("SELECT {} FROM sales_ledger ORDER BY seq", LEDGER_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], LedgerRow::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            let row = row?;
            entries.push((row.seq, LedgerEntry::try_from(row)));
        }
        Ok(entries)
    }

    /// Ledger entries that mention a sale.
    pub fn list_ledger_entries_for_sale(&self, sale_id: &str) -> DbResult<Vec<LedgerEntry>> {
        let sql = format!(
            "SELECT {} FROM sales_ledger WHERE sale_id = ? ORDER BY seq",
            LEDGER_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([sale_id], LedgerRow::from_row)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.try_into()?);
        }
        Ok(entries)
    }
}

/// Intermediate row struct for database mapping.
struct LedgerRow {
    seq: i64,
    entry_kind: String,
    sale_id: String,
    payload: String,
    prev_hash: String,
    entry_hash: String,
    created_at: String,
}

impl LedgerRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            seq: row.get(0)?,
            entry_kind: row.get(1)?,
            sale_id: row.get(2)?,
            payload: row.get(3)?,
            prev_hash: row.get(4)?,
            entry_hash: row.get(5)?,
            created_at: row.get(6)?,
        })
    }
}

impl TryFrom<LedgerRow> for LedgerEntry {
    type Error = DbError;

    fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
        Ok(LedgerEntry {
            kind: LedgerEntryKind::parse(&row.entry_kind).ok_or_else(|| {
                DbError::InvalidData(format!("ledger entry kind {:?}", row.entry_kind))
            })?,
            seq: row.seq,
            sale_id: row.sale_id,
            payload: row.payload,
            prev_hash: row.prev_hash,
            entry_hash: row.entry_hash,
            created_at: row.created_at,
        })
    }
}
