//! Expense bookkeeping and summaries.

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::db::{Database, DbError};
use crate::models::Expense;
use crate::pricing::{round_money, ExchangeRates, PricingError, PricingResult};

/// Expense errors.
#[derive(Error, Debug)]
pub enum ExpenseError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid expense: {0}")]
    Invalid(String),
}

pub type ExpenseResult<T> = Result<T, ExpenseError>;

/// Expense totals in the base currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExpenseSummary {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub currency: String,
    pub count: usize,
    pub total: f64,
    pub by_category: BTreeMap<String, f64>,
    /// Keyed by `YYYY-MM`
    pub by_month: BTreeMap<String, f64>,
}

impl ExpenseSummary {
    pub fn build(
        from: NaiveDate,
        to: NaiveDate,
        expenses: &[Expense],
        rates: &ExchangeRates,
    ) -> PricingResult<Self> {
        let mut summary = ExpenseSummary {
            from,
            to,
            currency: rates.base.clone(),
            count: expenses.len(),
            total: 0.0,
            by_category: BTreeMap::new(),
            by_month: BTreeMap::new(),
        };

        for expense in expenses {
            let amount = rates.to_base(expense.amount, &expense.currency)?;
            summary.total += amount;
            *summary
                .by_category
                .entry(expense.category.clone())
                .or_insert(0.0) += amount;
            *summary
                .by_month
                .entry(expense.date.format("%Y-%m").to_string())
                .or_insert(0.0) += amount;
        }

        summary.total = round_money(summary.total);
        summary.by_category.values_mut().for_each(|v| *v = round_money(*v));
        summary.by_month.values_mut().for_each(|v| *v = round_money(*v));
        Ok(summary)
    }
}

/// Expense book bound to one database and one rates table.
pub struct ExpenseBook<'a> {
    db: &'a Database,
    rates: &'a ExchangeRates,
}

impl<'a> ExpenseBook<'a> {
    pub fn new(db: &'a Database, rates: &'a ExchangeRates) -> Self {
        Self { db, rates }
    }

    pub fn record(&self, expense: Expense) -> ExpenseResult<Expense> {
        let expense = self.validate(expense)?;
        self.db.insert_expense(&expense)?;
        info!(expense_id = %expense.id, category = %expense.category, amount = expense.amount, "recorded expense");
        Ok(expense)
    }

    pub fn update(&self, expense: Expense) -> ExpenseResult<Expense> {
        let expense = self.validate(expense)?;
        if !self.db.update_expense(&expense)? {
            return Err(ExpenseError::NotFound(format!("expense {}", expense.id)));
        }
        info!(expense_id = %expense.id, "updated expense");
        Ok(expense)
    }

    pub fn summarize(&self, from: NaiveDate, to: NaiveDate) -> ExpenseResult<ExpenseSummary> {
        let expenses = self.db.list_expenses(from, to, None)?;
        let summary = ExpenseSummary::build(from, to, &expenses, self.rates)?;
        debug!(%from, %to, total = summary.total, "summarized expenses");
        Ok(summary)
    }

    fn validate(&self, mut expense: Expense) -> ExpenseResult<Expense> {
        expense.category = expense.category.trim().to_lowercase();
        expense.currency = expense.currency.trim().to_uppercase();
        if expense.category.is_empty() {
            return Err(ExpenseError::Invalid("category is empty".into()));
        }
        if expense.amount.is_nan() || expense.amount <= 0.0 {
            return Err(ExpenseError::Invalid(format!("amount {}", expense.amount)));
        }
        if !self.rates.knows(&expense.currency) {
            return Err(PricingError::UnknownCurrency(expense.currency).into());
        }
        Ok(expense)
    }
}
