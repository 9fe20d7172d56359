//! Prescription models.

use serde::{Deserialize, Serialize};

/// Prescription status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PrescriptionStatus {
    Active,
    Dispensed,
    Cancelled,
}

impl PrescriptionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PrescriptionStatus::Active => "active",
            PrescriptionStatus::Dispensed => "dispensed",
            PrescriptionStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(PrescriptionStatus::Active),
            "dispensed" => Some(PrescriptionStatus::Dispensed),
            "cancelled" => Some(PrescriptionStatus::Cancelled),
            _ => None,
        }
    }
}

/// A single drug line on a prescription.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionItem {
    /// Drug name as written by the doctor
    pub drug_name: String,
    /// Linked inventory item, when the pharmacy stocks it
    pub item_id: Option<String>,
    /// Dosage (e.g., "500mg")
    pub dosage: Option<String>,
    /// Frequency (e.g., "3x daily")
    pub frequency: Option<String>,
    pub duration_days: Option<u32>,
    /// Units to dispense
    pub quantity: f64,
    pub instructions: Option<String>,
}

impl PrescriptionItem {
    pub fn new(drug_name: String, quantity: f64) -> Self {
        Self {
            drug_name,
            item_id: None,
            dosage: None,
            frequency: None,
            duration_days: None,
            quantity,
            instructions: None,
        }
    }
}

/// A prescription written for a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Prescription {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    pub items: Vec<PrescriptionItem>,
    pub notes: Option<String>,
    pub status: PrescriptionStatus,
    /// Holder of the edit lock, if any
    pub editing_by: Option<String>,
    /// When the edit lock was taken (RFC 3339)
    pub editing_since: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl Prescription {
    pub fn new(patient_id: String, doctor_id: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            doctor_id,
            items: Vec::new(),
            notes: None,
            status: PrescriptionStatus::Active,
            editing_by: None,
            editing_since: None,
            created_at: now.clone(),
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Items that can be dispensed from stock.
    pub fn stocked_items(&self) -> impl Iterator<Item = &PrescriptionItem> {
        self.items.iter().filter(|item| item.item_id.is_some())
    }
}

/// Editable fields of a prescription, applied under the edit lock.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PrescriptionChanges {
    pub items: Option<Vec<PrescriptionItem>>,
    pub notes: Option<Option<String>>,
}

impl PrescriptionChanges {
    pub fn apply_to(self, prescription: &mut Prescription) {
        if let Some(items) = self.items {
            prescription.items = items;
        }
        if let Some(notes) = self.notes {
            prescription.notes = notes;
        }
    }
}
