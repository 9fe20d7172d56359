//! Patient and doctor database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{format_date, now_rfc3339, parse_optional_date, Database, DbError, DbResult};
use crate::models::{Doctor, Patient};

const PATIENT_COLUMNS: &str = "id, name, phone, email, date_of_birth, gender, address, \
     blood_type, allergies, notes, created_at, updated_at, deleted_at";

impl Database {
    /// Insert a new patient.
    pub fn insert_patient(&self, patient: &Patient) -> DbResult<()> {
        let allergies_json = serde_json::to_string(&patient.allergies)?;
        self.conn.execute(
            r#"
            INSERT INTO patients (
                id, name, phone, email, date_of_birth, gender, address,
                blood_type, allergies, notes, created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13)
            "#,
            params![
                patient.id,
                patient.name,
                patient.phone,
                patient.email,
                patient.date_of_birth.as_ref().map(format_date),
                patient.gender,
                patient.address,
                patient.blood_type,
                allergies_json,
                patient.notes,
                patient.created_at,
                patient.updated_at,
                patient.deleted_at,
            ],
        )?;
        Ok(())
    }

    /// Update an existing patient.
    pub fn update_patient(&self, patient: &Patient) -> DbResult<bool> {
        let allergies_json = serde_json::to_string(&patient.allergies)?;
        let rows_affected = self.conn.execute(
            r#"
            UPDATE patients SET
                name = ?2,
                phone = ?3,
                email = ?4,
                date_of_birth = ?5,
                gender = ?6,
                address = ?7,
                blood_type = ?8,
                allergies = ?9,
                notes = ?10,
                updated_at = ?11
            WHERE id = ?1
            "#,
            params![
                patient.id,
                patient.name,
                patient.phone,
                patient.email,
                patient.date_of_birth.as_ref().map(format_date),
                patient.gender,
                patient.address,
                patient.blood_type,
                allergies_json,
                patient.notes,
                now_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a patient by ID (including soft-deleted).
    pub fn get_patient(&self, id: &str) -> DbResult<Option<Patient>> {
        let sql = format!("SELECT {} FROM patients WHERE id = ?", PATIENT_COLUMNS);
        self.conn
            .query_row(&sql, [id], PatientRow::from_row)
            .optional()?
            .map(Patient::try_from)
            .transpose()
    }

    /// Search live patients by name or phone (substring match).
    pub fn search_patients(&self, query: &str, limit: usize) -> DbResult<Vec<Patient>> {
        let pattern = format!("%{}%", query.trim());
        let sql = format!(
            r#"
            SELECT {} FROM patients
            WHERE deleted_at IS NULL
              AND (name LIKE ?1 OR replace(phone, ' ', '') LIKE replace(?1, ' ', ''))
            ORDER BY name
            LIMIT ?2
            "#,
            PATIENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params![pattern, limit as i64], PatientRow::from_row)?;

        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.try_into()?);
        }
        Ok(patients)
    }

    /// List all live patients.
    pub fn list_patients(&self) -> DbResult<Vec<Patient>> {
        let sql = format!(
            "SELECT {} FROM patients WHERE deleted_at IS NULL ORDER BY name",
            PATIENT_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([], PatientRow::from_row)?;

        let mut patients = Vec::new();
        for row in rows {
            patients.push(row?.try_into()?);
        }
        Ok(patients)
    }

    /// Soft-delete a patient.
    pub fn soft_delete_patient(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE patients SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![id, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Undo a soft delete.
    pub fn restore_patient(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE patients SET deleted_at = NULL, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NOT NULL",
            params![id, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Insert a new doctor.
    pub fn insert_doctor(&self, doctor: &Doctor) -> DbResult<()> {
        self.conn.execute(
            "INSERT INTO doctors (id, name, specialty, phone, active, created_at) VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                doctor.id,
                doctor.name,
                doctor.specialty,
                doctor.phone,
                doctor.active,
                doctor.created_at,
            ],
        )?;
        Ok(())
    }

    /// Get a doctor by ID.
    pub fn get_doctor(&self, id: &str) -> DbResult<Option<Doctor>> {
        self.conn
            .query_row(
                "SELECT id, name, specialty, phone, active, created_at FROM doctors WHERE id = ?",
                [id],
                doctor_from_row,
            )
            .optional()
            .map_err(Into::into)
    }

    /// List doctors, optionally only active ones.
    pub fn list_doctors(&self, active_only: bool) -> DbResult<Vec<Doctor>> {
        let sql = if active_only {
            "SELECT id, name, specialty, phone, active, created_at FROM doctors WHERE active = 1 ORDER BY name"
        } else {
            "SELECT id, name, specialty, phone, active, created_at FROM doctors ORDER BY name"
        };
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map([], doctor_from_row)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    /// Activate or deactivate a doctor.
    pub fn set_doctor_active(&self, id: &str, active: bool) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE doctors SET active = ?2 WHERE id = ?1",
            params![id, active],
        )?;
        Ok(rows_affected > 0)
    }
}

fn doctor_from_row(row: &Row<'_>) -> rusqlite::Result<Doctor> {
    Ok(Doctor {
        id: row.get(0)?,
        name: row.get(1)?,
        specialty: row.get(2)?,
        phone: row.get(3)?,
        active: row.get(4)?,
        created_at: row.get(5)?,
    })
}

/// Intermediate row struct for database mapping.
struct PatientRow {
    id: String,
    name: String,
    phone: Option<String>,
    email: Option<String>,
    date_of_birth: Option<String>,
    gender: Option<String>,
    address: Option<String>,
    blood_type: Option<String>,
    allergies: String,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl PatientRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            name: row.get(1)?,
            phone: row.get(2)?,
            email: row.get(3)?,
            date_of_birth: row.get(4)?,
            gender: row.get(5)?,
            address: row.get(6)?,
            blood_type: row.get(7)?,
            allergies: row.get(8)?,
            notes: row.get(9)?,
            created_at: row.get(10)?,
            updated_at: row.get(11)?,
            deleted_at: row.get(12)?,
        })
    }
}

impl TryFrom<PatientRow> for Patient {
    type Error = DbError;

    fn try_from(row: PatientRow) -> Result<Self, Self::Error> {
        Ok(Patient {
            id: row.id,
            name: row.name,
            phone: row.phone,
            email: row.email,
            date_of_birth: parse_optional_date(row.date_of_birth)?,
            gender: row.gender,
            address: row.address,
            blood_type: row.blood_type,
            allergies: serde_json::from_str(&row.allergies)?,
            notes: row.notes,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn setup_db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn test_insert_and_get() {
        let db = setup_db();

        let mut patient = Patient::new("Maya Haddad".into());
        patient.phone = Some("03 123 456".into());
        patient.date_of_birth = NaiveDate::from_ymd_opt(1990, 6, 15);
        patient.allergies = vec!["penicillin".into()];

        db.insert_patient(&patient).unwrap();

        let retrieved = db.get_patient(&patient.id).unwrap().unwrap();
        assert_eq!(retrieved.name, "Maya Haddad");
        assert_eq!(retrieved.date_of_birth, patient.date_of_birth);
        assert_eq!(retrieved.allergies, vec!["penicillin"]);
    }

    #[test]
    fn test_update_patient() {
        let db = setup_db();

        let mut patient = Patient::new("Maya".into());
        db.insert_patient(&patient).unwrap();

        patient.blood_type = Some("O+".into());
        patient.notes = Some("Prefers mornings".into());
        assert!(db.update_patient(&patient).unwrap());

        let retrieved = db.get_patient(&patient.id).unwrap().unwrap();
        assert_eq!(retrieved.blood_type, Some("O+".into()));
        assert_eq!(retrieved.notes, Some("Prefers mornings".into()));
    }

    #[test]
    fn test_search_patients() {
        let db = setup_db();

        let mut maya = Patient::new("Maya Haddad".into());
        maya.phone = Some("03 123 456".into());
        db.insert_patient(&maya).unwrap();
        db.insert_patient(&Patient::new("Mayssa Aoun".into())).unwrap();
        db.insert_patient(&Patient::new("Karim Saleh".into())).unwrap();

        let results = db.search_patients("May", 10).unwrap();
        assert_eq!(results.len(), 2);

        let results = db.search_patients("03123", 10).unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, maya.id);
    }

    #[test]
    fn test_soft_delete_hides_from_lists() {
        let db = setup_db();

        let patient = Patient::new("Karim".into());
        db.insert_patient(&patient).unwrap();

        assert!(db.soft_delete_patient(&patient.id).unwrap());
        assert!(!db.soft_delete_patient(&patient.id).unwrap());

        assert!(db.list_patients().unwrap().is_empty());
        assert!(db.search_patients("Karim", 10).unwrap().is_empty());

        // Still retrievable directly
        let retrieved = db.get_patient(&patient.id).unwrap().unwrap();
        assert!(retrieved.is_deleted());

        assert!(db.restore_patient(&patient.id).unwrap());
        assert_eq!(db.list_patients().unwrap().len(), 1);
    }

    #[test]
    fn test_doctors() {
        let db = setup_db();

        let mut doctor = Doctor::new("Dr. Khoury".into());
        doctor.specialty = Some("Pediatrics".into());
        db.insert_doctor(&doctor).unwrap();
        db.insert_doctor(&Doctor::new("Dr. Nassar".into())).unwrap();

        assert_eq!(db.list_doctors(true).unwrap().len(), 2);

        db.set_doctor_active(&doctor.id, false).unwrap();
        assert_eq!(db.list_doctors(true).unwrap().len(), 1);
        assert_eq!(db.list_doctors(false).unwrap().len(), 2);

        let retrieved = db.get_doctor(&doctor.id).unwrap().unwrap();
        assert!(!retrieved.active);
        assert_eq!(retrieved.specialty, Some("Pediatrics".into()));
    }
}
