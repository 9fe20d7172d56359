//! Appointment models.

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

/// Appointment lifecycle status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    /// Booked and upcoming
    Scheduled,
    /// Patient was seen
    Completed,
    /// Cancelled by patient or clinic; frees the slot
    Cancelled,
    /// Patient did not show up
    NoShow,
}

impl AppointmentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppointmentStatus::Scheduled => "scheduled",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::NoShow => "no_show",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "scheduled" => Some(AppointmentStatus::Scheduled),
            "completed" => Some(AppointmentStatus::Completed),
            "cancelled" => Some(AppointmentStatus::Cancelled),
            "no_show" => Some(AppointmentStatus::NoShow),
            _ => None,
        }
    }
}

/// A booked appointment between a patient and a doctor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Appointment {
    pub id: String,
    pub patient_id: String,
    pub doctor_id: String,
    /// Start, clinic local time
    pub start: NaiveDateTime,
    /// End (exclusive), clinic local time
    pub end: NaiveDateTime,
    /// Reason for visit
    pub reason: Option<String>,
    pub status: AppointmentStatus,
    pub notes: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub deleted_at: Option<String>,
}

impl Appointment {
    /// Create a new scheduled appointment.
    pub fn new(
        patient_id: String,
        doctor_id: String,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            patient_id,
            doctor_id,
            start,
            end,
            reason: None,
            status: AppointmentStatus::Scheduled,
            notes: None,
            created_at: now.clone(),
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Whether this appointment occupies its time slot.
    pub fn blocks_schedule(&self) -> bool {
        self.deleted_at.is_none() && self.status != AppointmentStatus::Cancelled
    }

    /// Duration in minutes.
    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_status_round_trip_names() {
        for status in [
            AppointmentStatus::Scheduled,
            AppointmentStatus::Completed,
            AppointmentStatus::Cancelled,
            AppointmentStatus::NoShow,
        ] {
            assert_eq!(AppointmentStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(AppointmentStatus::parse("pending"), None);
    }

    #[test]
    fn test_cancelled_frees_slot() {
        let mut appt = Appointment::new("p".into(), "d".into(), at(9, 0), at(9, 30));
        assert!(appt.blocks_schedule());
        assert_eq!(appt.duration_minutes(), 30);

        appt.status = AppointmentStatus::Cancelled;
        assert!(!appt.blocks_schedule());
    }
}
