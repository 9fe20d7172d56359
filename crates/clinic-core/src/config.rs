//! Clinic configuration.
//!
//! Loaded from a JSON file; every section has defaults so a partial file
//! (or none at all) yields a usable configuration.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Configuration errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),
}

pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClinicConfig {
    pub clinic: ClinicProfile,
    pub currency: CurrencyConfig,
    pub schedule: ScheduleConfig,
    pub prescriptions: PrescriptionConfig,
    pub receipts: ReceiptConfig,
    pub storage: StorageConfig,
}

/// Clinic identity printed on receipts and letters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ClinicProfile {
    pub name: String,
    pub address: Option<String>,
    pub phone: Option<String>,
    pub email: Option<String>,
}

impl Default for ClinicProfile {
    fn default() -> Self {
        Self {
            name: "Clinic".into(),
            address: None,
            phone: None,
            email: None,
        }
    }
}

/// Currency settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct CurrencyConfig {
    /// Base currency code; reports are expressed in it
    pub base: String,
    /// Units of base currency per one unit of the keyed currency
    pub rates: BTreeMap<String, f64>,
    /// Extra currencies shown on receipts
    pub receipt_currencies: Vec<String>,
}

impl Default for CurrencyConfig {
    fn default() -> Self {
        let mut rates = BTreeMap::new();
        rates.insert("USD".to_string(), 1.0);
        Self {
            base: "USD".into(),
            rates,
            receipt_currencies: Vec::new(),
        }
    }
}

/// Working hours used for slot generation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ScheduleConfig {
    pub slot_minutes: i64,
    pub open: NaiveTime,
    pub close: NaiveTime,
    pub break_start: Option<NaiveTime>,
    pub break_end: Option<NaiveTime>,
    pub working_days: Vec<Weekday>,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            slot_minutes: 30,
            open: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(17, 0, 0).unwrap_or_default(),
            break_start: None,
            break_end: None,
            working_days: vec![
                Weekday::Mon,
                Weekday::Tue,
                Weekday::Wed,
                Weekday::Thu,
                Weekday::Fri,
            ],
        }
    }
}

impl ScheduleConfig {
    pub fn is_working_day(&self, day: Weekday) -> bool {
        self.working_days.contains(&day)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrescriptionConfig {
    /// Edit locks older than this are considered abandoned
    pub edit_lock_minutes: i64,
}

impl Default for PrescriptionConfig {
    fn default() -> Self {
        Self {
            edit_lock_minutes: 15,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ReceiptConfig {
    pub footer: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StorageConfig {
    /// Holds `clinic.db` and the `objects/` blob directory
    pub data_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("clinic-data"),
        }
    }
}

impl StorageConfig {
    pub fn database_path(&self) -> PathBuf {
        self.data_dir.join("clinic.db")
    }

    pub fn objects_dir(&self) -> PathBuf {
        self.data_dir.join("objects")
    }
}

impl ClinicConfig {
    /// Load and validate a config file.
    pub fn load<P: AsRef<Path>>(path: P) -> ConfigResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_json(&text)?;
        tracing::debug!(path = %path.display(), "loaded clinic config");
        Ok(config)
    }

    /// Parse and validate config JSON.
    pub fn from_json(text: &str) -> ConfigResult<Self> {
        let mut config: ClinicConfig = serde_json::from_str(text)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Uppercase currency codes and make sure the base rate is present.
    fn normalize(&mut self) {
        self.currency.base = self.currency.base.trim().to_uppercase();
        self.currency.rates = std::mem::take(&mut self.currency.rates)
            .into_iter()
            .map(|(code, rate)| (code.trim().to_uppercase(), rate))
            .collect();
        self.currency
            .rates
            .entry(self.currency.base.clone())
            .or_insert(1.0);
        for code in &mut self.currency.receipt_currencies {
            *code = code.trim().to_uppercase();
        }
    }

    /// Validate config invariants.
    pub fn validate(&self) -> ConfigResult<()> {
        let schedule = &self.schedule;
        if schedule.slot_minutes <= 0 {
            return Err(ConfigError::Invalid(
                "schedule.slot_minutes must be positive".into(),
            ));
        }
        if schedule.open >= schedule.close {
            return Err(ConfigError::Invalid(
                "schedule.open must be before schedule.close".into(),
            ));
        }
        match (schedule.break_start, schedule.break_end) {
            (Some(start), Some(end)) => {
                if start >= end || start < schedule.open || end > schedule.close {
                    return Err(ConfigError::Invalid(
                        "break must lie within working hours".into(),
                    ));
                }
            }
            (None, None) => {}
            _ => {
                return Err(ConfigError::Invalid(
                    "break_start and break_end must be set together".into(),
                ))
            }
        }

        if self.currency.base.is_empty() {
            return Err(ConfigError::Invalid("currency.base is empty".into()));
        }
        match self.currency.rates.get(&self.currency.base) {
            Some(rate) if (*rate - 1.0).abs() < f64::EPSILON => {}
            _ => {
                return Err(ConfigError::Invalid(format!(
                    "rate for base currency {} must be 1.0",
                    self.currency.base
                )))
            }
        }
        if let Some((code, _)) = self
            .currency
            .rates
            .iter()
            .find(|(_, rate)| !rate.is_finite() || **rate <= 0.0)
        {
            return Err(ConfigError::Invalid(format!(
                "rate for {} must be positive",
                code
            )));
        }
        if let Some(code) = self
            .currency
            .receipt_currencies
            .iter()
            .find(|c| !self.currency.rates.contains_key(*c))
        {
            return Err(ConfigError::Invalid(format!(
                "receipt currency {} has no exchange rate",
                code
            )));
        }

        if self.prescriptions.edit_lock_minutes <= 0 {
            return Err(ConfigError::Invalid(
                "prescriptions.edit_lock_minutes must be positive".into(),
            ));
        }
        Ok(())
    }
}
