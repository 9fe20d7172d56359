//! Expense and referral letter models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A clinic expense.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Expense {
    pub id: String,
    /// Category (e.g., "rent", "salaries", "utilities")
    pub category: String,
    pub description: Option<String>,
    pub amount: f64,
    pub currency: String,
    /// Date the expense was incurred
    pub date: NaiveDate,
    pub paid_to: Option<String>,
    /// Object storage key of a scanned receipt
    pub receipt_key: Option<String>,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

impl Expense {
    pub fn new(category: String, amount: f64, currency: String, date: NaiveDate) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            category: category.trim().to_lowercase(),
            description: None,
            amount,
            currency,
            date,
            paid_to: None,
            receipt_key: None,
            created_at: chrono::Utc::now().to_rfc3339(),
            deleted_at: None,
        }
    }
}

/// Referral urgency.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Urgency {
    Routine,
    Urgent,
}

impl Urgency {
    pub fn as_str(&self) -> &'static str {
        match self {
            Urgency::Routine => "routine",
            Urgency::Urgent => "urgent",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "routine" => Some(Urgency::Routine),
            "urgent" => Some(Urgency::Urgent),
            _ => None,
        }
    }
}

/// A referral letter to an outside specialist or facility.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReferralLetter {
    pub id: String,
    pub patient_id: String,
    /// Referring doctor
    pub doctor_id: String,
    /// Receiving doctor or facility
    pub referred_to: String,
    pub specialty: Option<String>,
    pub reason: String,
    pub clinical_summary: Option<String>,
    pub urgency: Urgency,
    pub created_at: String,
    pub deleted_at: Option<String>,
}

impl ReferralLetter {
    pub fn new(patient_id: String, doctor_id: String, referred_to: String, reason: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            doctor_id,
            referred_to,
            specialty: None,
            reason,
            clinical_summary: None,
            urgency: Urgency::Routine,
            created_at: chrono::Utc::now().to_rfc3339(),
            deleted_at: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expense_category_normalized() {
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let expense = Expense::new("  Utilities ".into(), 120.0, "USD".into(), date);
        assert_eq!(expense.category, "utilities");
    }
}
