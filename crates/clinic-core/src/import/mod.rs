//! Drug import from spreadsheet exports.
//!
//! Import is two-phase. [`DrugImporter::plan`] reads the CSV, validates each
//! row and decides per row whether it creates a new inventory item or updates
//! an existing one. Nothing is written. [`DrugImporter::apply`] then executes
//! a plan in a single transaction.
//!
//! Bad rows become [`RowError`]s in the plan and never abort the import.

mod csv;
mod matcher;

pub use self::csv::{parse_records, Column, Header, Record};
pub use matcher::{name_key, normalize_name, similarity, ItemMatch, Matcher, FUZZY_THRESHOLD};

use std::collections::HashMap;

use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::db::{Database, DbError};
use crate::models::{round_quantity, InventoryItem};
use crate::pricing::{round_money, ExchangeRates, PricingError};

/// Import errors. Row-level problems are reported in the plan instead.
#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Pricing error: {0}")]
    Pricing(#[from] PricingError),

    #[error("File has no header row")]
    Empty,

    #[error("Missing required column: {0}")]
    MissingColumn(String),

    #[error("Unterminated quoted field starting on line {line}")]
    UnterminatedQuote { line: usize },

    #[error("Planned item no longer exists: {0}")]
    Stale(String),
}

pub type ImportResult<T> = Result<T, ImportError>;

/// A validated spreadsheet row.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportRow {
    /// Line of the first occurrence in the file
    pub line: usize,
    pub name: String,
    pub generic_name: Option<String>,
    pub form: Option<String>,
    pub strength: Option<String>,
    pub barcode: Option<String>,
    pub unit_price: Option<f64>,
    pub cost_price: Option<f64>,
    /// Zero when the file has no quantity
    pub quantity: f64,
    pub expiry_date: Option<NaiveDate>,
    /// Upper-cased, defaults to the base currency
    pub currency: String,
    pub reorder_level: Option<f64>,
    /// Later lines folded into this row
    pub merged_lines: Vec<usize>,
}

impl ImportRow {
    /// Fold a duplicate row in: quantities add, missing fields are filled.
    fn merge(&mut self, other: ImportRow) {
        self.quantity += other.quantity;
        self.merged_lines.push(other.line);
        self.generic_name = self.generic_name.take().or(other.generic_name);
        self.form = self.form.take().or(other.form);
        self.strength = self.strength.take().or(other.strength);
        self.barcode = self.barcode.take().or(other.barcode);
        self.unit_price = self.unit_price.or(other.unit_price);
        self.cost_price = self.cost_price.or(other.cost_price);
        self.expiry_date = self.expiry_date.or(other.expiry_date);
        self.reorder_level = self.reorder_level.or(other.reorder_level);
    }

    fn is_duplicate_of(&self, other: &ImportRow) -> bool {
        match (&self.barcode, &other.barcode) {
            (Some(a), Some(b)) if a == b => true,
            _ => name_key(&self.name) == name_key(&other.name),
        }
    }
}

/// A row that could not be imported.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// What applying a row will do.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ImportAction {
    Create,
    Update {
        item_id: String,
        /// Name of the existing item
        matched_name: String,
        /// Matched by name similarity rather than barcode or exact name
        fuzzy: bool,
        score: f64,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlannedRow {
    pub row: ImportRow,
    pub action: ImportAction,
}

/// The outcome of reading a file, before anything is written.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ImportPlan {
    pub rows: Vec<PlannedRow>,
    pub errors: Vec<RowError>,
    /// Header cells that matched no known column
    pub ignored_columns: Vec<String>,
}

impl ImportPlan {
    pub fn summary(&self) -> ImportSummary {
        let mut summary = ImportSummary {
            errors: self.errors.len(),
            ..ImportSummary::default()
        };
        for planned in &self.rows {
            summary.merged += planned.row.merged_lines.len();
            match planned.action {
                ImportAction::Create => summary.created += 1,
                ImportAction::Update { fuzzy, .. } => {
                    summary.updated += 1;
                    if fuzzy {
                        summary.fuzzy += 1;
                    }
                }
            }
        }
        summary
    }

    /// Updates that rely on a fuzzy name match and deserve a look.
    pub fn fuzzy_rows(&self) -> impl Iterator<Item = &PlannedRow> {
        self.rows
            .iter()
            .filter(|p| matches!(p.action, ImportAction::Update { fuzzy: true, .. }))
    }
}

/// Counts of a plan or an applied import.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub created: usize,
    /// Includes fuzzy updates
    pub updated: usize,
    pub fuzzy: usize,
    /// Duplicate lines folded into earlier rows
    pub merged: usize,
    pub errors: usize,
}

/// How imported quantities affect the stock of existing items.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StockMode {
    /// The file lists a delivery: quantities are added
    #[default]
    Add,
    /// The file is a stock count: quantities replace stock
    Replace,
}

/// Plans and applies drug imports against the inventory.
pub struct DrugImporter<'a> {
    db: &'a Database,
    rates: &'a ExchangeRates,
    threshold: f64,
    stock_mode: StockMode,
}

impl<'a> DrugImporter<'a> {
    pub fn new(db: &'a Database, rates: &'a ExchangeRates) -> Self {
        Self {
            db,
            rates,
            threshold: FUZZY_THRESHOLD,
            stock_mode: StockMode::Add,
        }
    }

    pub fn with_threshold(mut self, threshold: f64) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_stock_mode(mut self, mode: StockMode) -> Self {
        self.stock_mode = mode;
        self
    }

    /// Read CSV text and decide what each row will do.
    pub fn plan(&self, text: &str) -> ImportResult<ImportPlan> {
        let records = parse_records(text)?;
        let (header_record, data) = records.split_first().ok_or(ImportError::Empty)?;
        let header = Header::resolve(header_record)?;

        let mut plan = ImportPlan {
            ignored_columns: header.ignored.clone(),
            ..ImportPlan::default()
        };

        let mut rows: Vec<ImportRow> = Vec::new();
        for record in data {
            match self.read_row(&header, record) {
                Ok(row) => match rows.iter_mut().find(|r| r.is_duplicate_of(&row)) {
                    Some(first) => first.merge(row),
                    None => rows.push(row),
                },
                Err(message) => plan.errors.push(RowError {
                    line: record.line,
                    message,
                }),
            }
        }

        let existing = self.db.list_inventory_items(false)?;
        let matcher = Matcher::new(&existing).with_threshold(self.threshold);
        let mut targeted: HashMap<String, usize> = HashMap::new();
        for row in rows {
            let found = matcher.find(&row.name, row.barcode.as_deref());
            let action = match found {
                ItemMatch::None => ImportAction::Create,
                ItemMatch::Barcode(id) | ItemMatch::ExactName(id) => {
                    update_action(&existing, id, false, 1.0)
                }
                ItemMatch::Fuzzy { item_id, score } => {
                    update_action(&existing, item_id, true, score)
                }
            };

            // One update per inventory item
            if let ImportAction::Update {
                item_id,
                matched_name,
                ..
            } = &action
            {
                if let Some(first_line) = targeted.get(item_id) {
                    warn!(
                        line = row.line,
                        first_line,
                        item = %matched_name,
                        "row matches an item already updated"
                    );
                    plan.errors.push(RowError {
                        line: row.line,
                        message: format!(
                            "{:?} matches {:?}, already updated by line {}",
                            row.name, matched_name, first_line
                        ),
                    });
                    continue;
                }
                targeted.insert(item_id.clone(), row.line);
            }
            plan.rows.push(PlannedRow { row, action });
        }

        let summary = plan.summary();
        debug!(
            created = summary.created,
            updated = summary.updated,
            fuzzy = summary.fuzzy,
            errors = summary.errors,
            "planned drug import"
        );
        Ok(plan)
    }

    /// Execute a plan in one transaction.
    pub fn apply(&self, plan: &ImportPlan) -> ImportResult<ImportSummary> {
        self.db.atomically(|db| {
            for planned in &plan.rows {
                match &planned.action {
                    ImportAction::Create => {
                        let item = self.new_item(&planned.row)?;
                        db.insert_inventory_item(&item)?;
                    }
                    ImportAction::Update { item_id, .. } => {
                        let mut item = db
                            .get_inventory_item(item_id)?
                            .ok_or_else(|| ImportError::Stale(item_id.clone()))?;
                        self.update_item(&mut item, &planned.row)?;
                        db.update_inventory_item(&item)?;
                    }
                }
            }
            Ok::<_, ImportError>(())
        })?;

        let summary = plan.summary();
        info!(
            created = summary.created,
            updated = summary.updated,
            fuzzy = summary.fuzzy,
            skipped = summary.errors,
            "applied drug import"
        );
        Ok(summary)
    }

    fn read_row(&self, header: &Header, record: &Record) -> Result<ImportRow, String> {
        let get = |column: Column| header.get(record, column);

        let name = get(Column::Name).ok_or("missing name")?;
        let currency = match get(Column::Currency) {
            Some(code) => {
                let code = code.to_uppercase();
                if !self.rates.knows(&code) {
                    return Err(format!("unknown currency {}", code));
                }
                code
            }
            None => self.rates.base.clone(),
        };

        let number = |column: Column, label: &str| -> Result<Option<f64>, String> {
            get(column)
                .map(|raw| parse_number(raw).ok_or_else(|| format!("bad {} {:?}", label, raw)))
                .transpose()
        };

        Ok(ImportRow {
            line: record.line,
            name: name.split_whitespace().collect::<Vec<_>>().join(" "),
            generic_name: get(Column::GenericName).map(String::from),
            form: get(Column::Form).map(String::from),
            strength: get(Column::Strength).map(String::from),
            barcode: get(Column::Barcode).map(String::from),
            unit_price: number(Column::UnitPrice, "price")?,
            cost_price: number(Column::CostPrice, "cost")?,
            quantity: number(Column::Quantity, "quantity")?.unwrap_or(0.0),
            expiry_date: get(Column::ExpiryDate)
                .map(|raw| parse_date(raw).ok_or_else(|| format!("bad expiry date {:?}", raw)))
                .transpose()?,
            currency,
            reorder_level: number(Column::ReorderLevel, "reorder level")?,
            merged_lines: Vec::new(),
        })
    }

    fn new_item(&self, row: &ImportRow) -> ImportResult<InventoryItem> {
        let mut item = InventoryItem::new(
            row.name.clone(),
            round_money(row.unit_price.unwrap_or(0.0)),
            row.currency.clone(),
        );
        item.generic_name = row.generic_name.clone();
        item.form = row.form.clone();
        item.strength = row.strength.clone();
        item.barcode = row.barcode.clone();
        item.cost_price = round_money(row.cost_price.unwrap_or(0.0));
        item.stock = row.quantity;
        item.reorder_level = row.reorder_level.unwrap_or(0.0);
        item.expiry_date = row.expiry_date;
        Ok(item)
    }

    /// Prices in the row's currency are converted into the item's currency.
    fn update_item(&self, item: &mut InventoryItem, row: &ImportRow) -> ImportResult<()> {
        if let Some(price) = row.unit_price {
            item.unit_price = round_money(self.rates.convert(price, &row.currency, &item.currency)?);
        }
        if let Some(cost) = row.cost_price {
            item.cost_price = round_money(self.rates.convert(cost, &row.currency, &item.currency)?);
        }
        if row.generic_name.is_some() {
            item.generic_name = row.generic_name.clone();
        }
        if row.form.is_some() {
            item.form = row.form.clone();
        }
        if row.strength.is_some() {
            item.strength = row.strength.clone();
        }
        if item.barcode.is_none() {
            item.barcode = row.barcode.clone();
        }
        if row.expiry_date.is_some() {
            item.expiry_date = row.expiry_date;
        }
        if let Some(level) = row.reorder_level {
            item.reorder_level = level;
        }

        item.stock = match self.stock_mode {
            StockMode::Add => round_quantity(item.stock + row.quantity),
            StockMode::Replace => round_quantity(row.quantity),
        };
        if !item.active {
            warn!(item_id = %item.id, name = %item.name, "reactivating imported item");
            item.active = true;
        }
        Ok(())
    }
}

fn update_action(
    existing: &[InventoryItem],
    item_id: String,
    fuzzy: bool,
    score: f64,
) -> ImportAction {
    let matched_name = existing
        .iter()
        .find(|i| i.id == item_id)
        .map(|i| i.name.clone())
        .unwrap_or_default();
    ImportAction::Update {
        item_id,
        matched_name,
        fuzzy,
        score,
    }
}

/// Parse a non-negative number, tolerating currency symbols and thousands
/// separators ("$1,250.50").
pub fn parse_number(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| !matches!(c, '$' | '€' | '£' | ',' | ' '))
        .collect();
    let value: f64 = cleaned.parse().ok()?;
    if value.is_finite() && value >= 0.0 {
        Some(value)
    } else {
        None
    }
}

/// Parse an expiry date. Month-only dates ("03/2026", "2026-03") mean the
/// last day of that month.
pub fn parse_date(raw: &str) -> Option<NaiveDate> {
    const DAY_FORMATS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y"];
    for format in DAY_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date);
        }
    }

    let first = NaiveDate::parse_from_str(&format!("01/{}", raw), "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(&format!("{}-01", raw), "%Y-%m-%d"))
        .ok()?;
    first.checked_add_months(Months::new(1))?.pred_opt()
}
