//! Lab order models.

use serde::{Deserialize, Serialize};

/// Lab order status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum LabStatus {
    Ordered,
    SampleCollected,
    Completed,
    Cancelled,
}

impl LabStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LabStatus::Ordered => "ordered",
            LabStatus::SampleCollected => "sample_collected",
            LabStatus::Completed => "completed",
            LabStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "ordered" => Some(LabStatus::Ordered),
            "sample_collected" => Some(LabStatus::SampleCollected),
            "completed" => Some(LabStatus::Completed),
            "cancelled" => Some(LabStatus::Cancelled),
            _ => None,
        }
    }

    /// Allowed forward transitions.
    pub fn can_transition_to(&self, next: LabStatus) -> bool {
        matches!(
            (self, next),
            (LabStatus::Ordered, LabStatus::SampleCollected)
                | (LabStatus::SampleCollected, LabStatus::Completed)
                | (LabStatus::Ordered, LabStatus::Cancelled)
                | (LabStatus::SampleCollected, LabStatus::Cancelled)
        )
    }
}

/// A lab test ordered for a patient.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LabOrder {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: Option<String>,
    /// Test name (e.g., "CBC", "Lipid panel")
    pub test_name: String,
    /// External lab performing the test, if outsourced
    pub lab_name: Option<String>,
    /// Price charged, in base currency
    pub price: f64,
    pub status: LabStatus,
    /// Result summary text
    pub result: Option<String>,
    /// Object storage keys of attached result files
    pub attachments: Vec<String>,
    pub ordered_at: String,
    pub completed_at: Option<String>,
    pub deleted_at: Option<String>,
}

impl LabOrder {
    pub fn new(patient_id: String, test_name: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            doctor_id: None,
            test_name,
            lab_name: None,
            price: 0.0,
            status: LabStatus::Ordered,
            result: None,
            attachments: Vec::new(),
            ordered_at: chrono::Utc::now().to_rfc3339(),
            completed_at: None,
            deleted_at: None,
        }
    }
}
