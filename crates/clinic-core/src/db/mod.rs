//! Database layer for the clinic.

mod appointments;
mod expenses;
mod inventory;
mod labs;
mod ledger;
mod patients;
mod prescriptions;
mod purchasing;
mod sales;
mod schema;

pub use ledger::*;
pub use schema::*;

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::Connection;
use std::path::Path;
use thiserror::Error;

/// Database errors.
#[derive(Error, Debug)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Constraint violation: {0}")]
    Constraint(String),

    #[error("Invalid stored value: {0}")]
    InvalidData(String),
}

pub type DbResult<T> = Result<T, DbError>;

/// Stored format of appointment times (clinic local time, no offset).
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Stored format of calendar dates.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Database connection wrapper.
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open database at path, creating if needed.
    pub fn open<P: AsRef<Path>>(path: P) -> DbResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        let db = Self { conn };
        db.initialize()?;
        tracing::debug!(path = %path.as_ref().display(), "opened clinic database");
        Ok(db)
    }

    /// Create in-memory database (for testing).
    pub fn open_in_memory() -> DbResult<Self> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.initialize()?;
        Ok(db)
    }

    /// Initialize schema.
    fn initialize(&self) -> DbResult<()> {
        self.conn.execute_batch(SCHEMA)?;
        Ok(())
    }

    /// Get raw connection (for advanced queries).
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Run `f` inside a transaction; commits on `Ok`, rolls back on `Err`.
    ///
    /// Must not be nested.
    pub fn atomically<T, E, F>(&self, f: F) -> Result<T, E>
    where
        F: FnOnce(&Self) -> Result<T, E>,
        E: From<DbError>,
    {
        let tx = self
            .conn
            .unchecked_transaction()
            .map_err(DbError::from)?;
        let value = f(self)?;
        tx.commit().map_err(DbError::from)?;
        Ok(value)
    }
}

pub(crate) fn format_datetime(value: &NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

pub(crate) fn parse_datetime(value: &str) -> DbResult<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, DATETIME_FORMAT)
        .map_err(|e| DbError::InvalidData(format!("datetime {:?}: {}", value, e)))
}

pub(crate) fn format_date(value: &NaiveDate) -> String {
    value.format(DATE_FORMAT).to_string()
}

pub(crate) fn parse_date(value: &str) -> DbResult<NaiveDate> {
    NaiveDate::parse_from_str(value, DATE_FORMAT)
        .map_err(|e| DbError::InvalidData(format!("date {:?}: {}", value, e)))
}

pub(crate) fn parse_optional_date(value: Option<String>) -> DbResult<Option<NaiveDate>> {
    value.as_deref().map(parse_date).transpose()
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
