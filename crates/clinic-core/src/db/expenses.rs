//! Expense database operations.

use chrono::NaiveDate;
use rusqlite::{params, OptionalExtension, Row};

use super::{format_date, now_rfc3339, parse_date, Database, DbError, DbResult};
use crate::models::Expense;

const EXPENSE_COLUMNS: &str =
    "id, category, description, amount, currency, date, paid_to, receipt_key, created_at, deleted_at";

impl Database {
    /// Insert a new expense.
    pub fn insert_expense(&self, expense: &Expense) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO expenses (
                id, category, description, amount, currency, date,
                paid_to, receipt_key, created_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                expense.id,
                expense.category,
                expense.description,
                expense.amount,
                expense.currency,
                format_date(&expense.date),
                expense.paid_to,
                expense.receipt_key,
                expense.created_at,
                expense.deleted_at,
            ],
        )?;
        Ok(())
    }

    /// Update an expense.
    pub fn update_expense(&self, expense: &Expense) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE expenses SET
                category = ?2,
                description = ?3,
                amount = ?4,
                currency = ?5,
                date = ?6,
                paid_to = ?7,
                receipt_key = ?8
            WHERE id = ?1
            "#,
            params![
                expense.id,
                expense.category,
                expense.description,
                expense.amount,
                expense.currency,
                format_date(&expense.date),
                expense.paid_to,
                expense.receipt_key,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get an expense by ID.
    pub fn get_expense(&self, id: &str) -> DbResult<Option<Expense>> {
        let sql = format!("SELECT {} FROM expenses WHERE id = ?", EXPENSE_COLUMNS);
        self.conn
            .query_row(&sql, [id], ExpenseRow::from_row)
            .optional()?
            .map(Expense::try_from)
            .transpose()
    }

    /// Live expenses dated within `[from, to]`, optionally in one category.
    pub fn list_expenses(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        category: Option<&str>,
    ) -> DbResult<Vec<Expense>> {
        let sql = format!(
            r#"
            SELECT {} FROM expenses
            WHERE deleted_at IS NULL
              AND date >= ?1 AND date <= ?2
              AND (?3 IS NULL OR category = ?3)
            ORDER BY date, created_at
            "#,
            EXPENSE_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![format_date(&from), format_date(&to), category],
            ExpenseRow::from_row,
        )?;

        let mut expenses = Vec::new();
        for row in rows {
            expenses.push(row?.try_into()?);
        }
        Ok(expenses)
    }

    /// Soft-delete an expense.
    pub fn soft_delete_expense(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE expenses SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![id, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct ExpenseRow {
    id: String,
    category: String,
    description: Option<String>,
    amount: f64,
    currency: String,
    date: String,
    paid_to: Option<String>,
    receipt_key: Option<String>,
    created_at: String,
    deleted_at: Option<String>,
}

impl ExpenseRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            category: row.get(1)?,
            description: row.get(2)?,
            amount: row.get(3)?,
            currency: row.get(4)?,
            date: row.get(5)?,
            paid_to: row.get(6)?,
            receipt_key: row.get(7)?,
            created_at: row.get(8)?,
            deleted_at: row.get(9)?,
        })
    }
}

impl TryFrom<ExpenseRow> for Expense {
    type Error = DbError;

    fn try_from(row: ExpenseRow) -> Result<Self, Self::Error> {
        Ok(Expense {
            date: parse_date(&row.date)?,
            id: row.id,
            category: row.category,
            description: row.description,
            amount: row.amount,
            currency: row.currency,
            paid_to: row.paid_to,
            receipt_key: row.receipt_key,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        })
    }
}
