//! Patient and doctor models.

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

/// A patient record.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Patient {
    /// UUID, generated on creation
    pub id: String,
    /// Full name
    pub name: String,
    /// Contact phone number
    pub phone: Option<String>,
    /// Contact email
    pub email: Option<String>,
    /// Date of birth
    pub date_of_birth: Option<NaiveDate>,
    /// Gender as recorded at the front desk
    pub gender: Option<String>,
    /// Home address
    pub address: Option<String>,
    /// Blood type (e.g., "O+")
    pub blood_type: Option<String>,
    /// Known allergies
    pub allergies: Vec<String>,
    /// Free-form notes
    pub notes: Option<String>,
    /// Creation timestamp
    pub created_at: String,
    /// Last update timestamp
    pub updated_at: String,
    /// Set when the record is soft-deleted
    pub deleted_at: Option<String>,
}

impl Patient {
    /// Create a new patient with required fields.
    pub fn new(name: String) -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            phone: None,
            email: None,
            date_of_birth: None,
            gender: None,
            address: None,
            blood_type: None,
            allergies: Vec::new(),
            notes: None,
            created_at: now.clone(),
            updated_at: now,
            deleted_at: None,
        }
    }

    /// Age in whole years on the given date.
    pub fn age_on(&self, date: NaiveDate) -> Option<u32> {
        let dob = self.date_of_birth?;
        if date < dob {
            return None;
        }
        let mut years = date.year() - dob.year();
        if (date.month(), date.day()) < (dob.month(), dob.day()) {
            years -= 1;
        }
        u32::try_from(years).ok()
    }

    /// Case-insensitive match against name or phone.
    pub fn matches(&self, query: &str) -> bool {
        let query = query.trim().to_lowercase();
        if query.is_empty() {
            return true;
        }
        self.name.to_lowercase().contains(&query)
            || self
                .phone
                .as_deref()
                .map(|p| p.replace(' ', "").contains(&query.replace(' ', "")))
                .unwrap_or(false)
    }

    /// Check if the patient has a recorded allergy to a drug name.
    pub fn is_allergic_to(&self, drug_name: &str) -> bool {
        let drug = drug_name.to_lowercase();
        self.allergies
            .iter()
            .any(|a| !a.trim().is_empty() && drug.contains(&a.trim().to_lowercase()))
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// A doctor who can hold appointments.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Doctor {
    pub id: String,
    pub name: String,
    pub specialty: Option<String>,
    pub phone: Option<String>,
    /// Inactive doctors keep their history but cannot be booked
    pub active: bool,
    pub created_at: String,
}

impl Doctor {
    pub fn new(name: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            name,
            specialty: None,
            phone: None,
            active: true,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_patient() {
        let patient = Patient::new("Maya Haddad".into());
        assert_eq!(patient.name, "Maya Haddad");
        assert!(!patient.is_deleted());
        assert_eq!(patient.id.len(), 36); // UUID format
    }

    #[test]
    fn test_age_on() {
        let mut patient = Patient::new("Maya".into());
        patient.date_of_birth = NaiveDate::from_ymd_opt(1990, 6, 15);

        let before_birthday = NaiveDate::from_ymd_opt(2024, 6, 14).unwrap();
        let on_birthday = NaiveDate::from_ymd_opt(2024, 6, 15).unwrap();
        assert_eq!(patient.age_on(before_birthday), Some(33));
        assert_eq!(patient.age_on(on_birthday), Some(34));

        let before_birth = NaiveDate::from_ymd_opt(1980, 1, 1).unwrap();
        assert_eq!(patient.age_on(before_birth), None);
    }

    #[test]
    fn test_matches_name_and_phone() {
        let mut patient = Patient::new("Maya Haddad".into());
        patient.phone = Some("03 123 456".into());

        assert!(patient.matches("haddad"));
        assert!(patient.matches("03123"));
        assert!(!patient.matches("karim"));
    }

    #[test]
    fn test_allergy_check() {
        let mut patient = Patient::new("Maya".into());
        patient.allergies = vec!["Penicillin".into()];

        assert!(patient.is_allergic_to("penicillin V 250mg"));
        assert!(!patient.is_allergic_to("Paracetamol"));
    }
}
