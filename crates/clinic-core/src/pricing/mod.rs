//! Currency conversion and sale totals.
//!
//! Amounts are `f64` rounded to cents at every stored boundary. Rates are
//! expressed as base-currency units per one unit of the keyed currency.

mod totals;

pub use totals::{compute_totals, line_amount, totals_in, validate_sale};

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config::CurrencyConfig;

/// Pricing errors.
#[derive(Error, Debug, PartialEq)]
pub enum PricingError {
    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Quantity must be positive for {item}: {quantity}")]
    InvalidQuantity { item: String, quantity: f64 },

    #[error("Unit price must not be negative for {item}: {price}")]
    InvalidPrice { item: String, price: f64 },

    #[error("Discount out of range: {0}")]
    InvalidDiscount(String),

    #[error("Payment amount must be positive: {0}")]
    InvalidPayment(f64),
}

pub type PricingResult<T> = Result<T, PricingError>;

/// Round to two decimals, halves away from zero.
pub fn round_money(amount: f64) -> f64 {
    (amount * 100.0).round() / 100.0
}

/// Conversion table anchored on the base currency.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ExchangeRates {
    pub base: String,
    rates: BTreeMap<String, f64>,
}

impl ExchangeRates {
    /// Rates table with only the base currency.
    pub fn new(base: &str) -> Self {
        let base = base.trim().to_uppercase();
        let mut rates = BTreeMap::new();
        rates.insert(base.clone(), 1.0);
        Self { base, rates }
    }

    pub fn from_config(config: &CurrencyConfig) -> Self {
        let mut rates = Self::new(&config.base);
        for (code, rate) in &config.rates {
            rates = rates.with_rate(code, *rate);
        }
        rates
    }

    /// Add or replace the rate of `code` (base units per unit of `code`).
    pub fn with_rate(mut self, code: &str, rate: f64) -> Self {
        let code = code.trim().to_uppercase();
        if code != self.base {
            self.rates.insert(code, rate);
        }
        self
    }

    pub fn knows(&self, code: &str) -> bool {
        self.rates.contains_key(&code.trim().to_uppercase())
    }

    pub fn currencies(&self) -> impl Iterator<Item = &str> {
        self.rates.keys().map(String::as_str)
    }

    fn rate(&self, code: &str) -> PricingResult<f64> {
        self.rates
            .get(&code.trim().to_uppercase())
            .copied()
            .ok_or_else(|| PricingError::UnknownCurrency(code.to_string()))
    }

    /// Convert `amount` from one currency into another. Not rounded.
    pub fn convert(&self, amount: f64, from: &str, to: &str) -> PricingResult<f64> {
        let from_rate = self.rate(from)?;
        let to_rate = self.rate(to)?;
        if from.eq_ignore_ascii_case(to) {
            return Ok(amount);
        }
        Ok(amount * from_rate / to_rate)
    }

    /// Convert into the base currency.
    pub fn to_base(&self, amount: f64, from: &str) -> PricingResult<f64> {
        self.convert(amount, from, &self.base)
    }
}
