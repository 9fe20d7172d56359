//! Prescription database operations, including the single-editor lock.

use rusqlite::{params, OptionalExtension, Row};

use super::{now_rfc3339, Database, DbError, DbResult};
use crate::models::{Prescription, PrescriptionStatus};

const PRESCRIPTION_COLUMNS: &str = "id, patient_id, doctor_id, items, notes, status, \
     editing_by, editing_since, created_at, updated_at, deleted_at";

impl Database {
    /// Insert a new prescription.
    pub fn insert_prescription(&self, prescription: &Prescription) -> DbResult<()> {
        let items_json = serde_json::to_string(&prescription.items)?;
        self.conn.execute(
            r#"
            INSERT INTO prescriptions (
                id, patient_id, doctor_id, items, notes, status,
                editing_by, editing_since, created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                prescription.id,
                prescription.patient_id,
                prescription.doctor_id,
                items_json,
                prescription.notes,
                prescription.status.as_str(),
                prescription.editing_by,
                prescription.editing_since,
                prescription.created_at,
                prescription.updated_at,
                prescription.deleted_at,
            ],
        )?;
        Ok(())
    }

    /// Update items, notes and status. Lock columns are left untouched.
    pub fn update_prescription(&self, prescription: &Prescription) -> DbResult<bool> {
        let items_json = serde_json::to_string(&prescription.items)?;
        let rows_affected = self.conn.execute(
            r#"
            UPDATE prescriptions SET
                items = ?2,
                notes = ?3,
                status = ?4,
                updated_at = ?5
            WHERE id = ?1
            "#,
            params![
                prescription.id,
                items_json,
                prescription.notes,
                prescription.status.as_str(),
                now_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a prescription by ID.
    pub fn get_prescription(&self, id: &str) -> DbResult<Option<Prescription>> {
        let sql = format!(
            "SELECT {} FROM prescriptions WHERE id = ?",
            PRESCRIPTION_COLUMNS
        );
        self.conn
            .query_row(&sql, [id], PrescriptionRow::from_row)
            .optional()?
            .map(Prescription::try_from)
            .transpose()
    }

    /// Live prescriptions of a patient, newest first.
    pub fn list_prescriptions_for_patient(&self, patient_id: &str) -> DbResult<Vec<Prescription>> {
        let sql = format!(
            r#"
            SELECT {} FROM prescriptions
            WHERE patient_id = ? AND deleted_at IS NULL
            ORDER BY created_at DESC
            "#,
            PRESCRIPTION_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], PrescriptionRow::from_row)?;

        let mut prescriptions = Vec::new();
        for row in rows {
            prescriptions.push(row?.try_into()?);
        }
        Ok(prescriptions)
    }

    /// Take the edit lock if it is free, already ours, or older than `stale_before`.
    ///
    /// Returns `false` when another editor holds a fresh lock.
    pub fn try_acquire_prescription_lock(
        &self,
        id: &str,
        editor: &str,
        now: &str,
        stale_before: &str,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE prescriptions SET
                editing_by = ?2,
                editing_since = ?3
            WHERE id = ?1
              AND deleted_at IS NULL
              AND (editing_by IS NULL OR editing_by = ?2 OR editing_since < ?4)
            "#,
            params![id, editor, now, stale_before],
        )?;
        Ok(rows_affected > 0)
    }

    /// Release the edit lock if held by `editor`.
    pub fn release_prescription_lock(&self, id: &str, editor: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE prescriptions SET editing_by = NULL, editing_since = NULL
            WHERE id = ?1 AND editing_by = ?2
            "#,
            params![id, editor],
        )?;
        Ok(rows_affected > 0)
    }

    /// Set the status and drop the edit lock.
    pub fn set_prescription_status(
        &self,
        id: &str,
        status: PrescriptionStatus,
    ) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE prescriptions SET
                status = ?2,
                editing_by = NULL,
                editing_since = NULL,
                updated_at = ?3
            WHERE id = ?1
            "#,
            params![id, status.as_str(), now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Soft-delete a prescription.
    pub fn soft_delete_prescription(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE prescriptions SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![id, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct PrescriptionRow {
    id: String,
    patient_id: String,
    doctor_id: String,
    items: String,
    notes: Option<String>,
    status: String,
    editing_by: Option<String>,
    editing_since: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl PrescriptionRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            doctor_id: row.get(2)?,
            items: row.get(3)?,
            notes: row.get(4)?,
            status: row.get(5)?,
            editing_by: row.get(6)?,
            editing_since: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            deleted_at: row.get(10)?,
        })
    }
}

impl TryFrom<PrescriptionRow> for Prescription {
    type Error = DbError;

    fn try_from(row: PrescriptionRow) -> Result<Self, Self::Error> {
        Ok(Prescription {
            items: serde_json::from_str(&row.items)?,
            status: PrescriptionStatus::parse(&row.status).ok_or_else(|| {
                DbError::InvalidData(format!("prescription status {:?}", row.status))
            })?,
            id: row.id,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            notes: row.notes,
            editing_by: row.editing_by,
            editing_since: row.editing_since,
            created_at: row.created_at,
            updated_at: row.updated_at,
            deleted_at: row.deleted_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Doctor, Patient, PrescriptionItem};

    fn setup_db() -> (Database, Prescription) {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Maya".into());
        let doctor = Doctor::new("Dr. Khoury".into());
        db.insert_patient(&patient).unwrap();
        db.insert_doctor(&doctor).unwrap();

        let mut rx = Prescription::new(patient.id, doctor.id);
        rx.items
            .push(PrescriptionItem::new("Amoxicillin 500mg".into(), 21.0));
        db.insert_prescription(&rx).unwrap();
        (db, rx)
    }

    #[test]
    fn test_insert_and_get() {
        let (db, rx) = setup_db();

        let retrieved = db.get_prescription(&rx.id).unwrap().unwrap();
        assert_eq!(retrieved.items.len(), 1);
        assert_eq!(retrieved.items[0].quantity, 21.0);
        assert_eq!(retrieved.status, PrescriptionStatus::Active);

        let list = db.list_prescriptions_for_patient(&rx.patient_id).unwrap();
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_lock_is_exclusive() {
        let (db, rx) = setup_db();
        let t0 = "2024-03-04T09:00:00+00:00";
        let stale = "2024-03-04T08:45:00+00:00";

        assert!(db
            .try_acquire_prescription_lock(&rx.id, "alice", t0, stale)
            .unwrap());
        // Re-entrant for the holder
        assert!(db
            .try_acquire_prescription_lock(&rx.id, "alice", t0, stale)
            .unwrap());
        // Refused for someone else
        assert!(!db
            .try_acquire_prescription_lock(&rx.id, "bob", t0, stale)
            .unwrap());

        // Bob cannot release Alice's lock
        assert!(!db.release_prescription_lock(&rx.id, "bob").unwrap());
        assert!(db.release_prescription_lock(&rx.id, "alice").unwrap());
        assert!(db
            .try_acquire_prescription_lock(&rx.id, "bob", t0, stale)
            .unwrap());
    }

    #[test]
    fn test_stale_lock_can_be_taken_over() {
        let (db, rx) = setup_db();

        db.try_acquire_prescription_lock(
            &rx.id,
            "alice",
            "2024-03-04T09:00:00+00:00",
            "2024-03-04T08:45:00+00:00",
        )
        .unwrap();

        // An hour later, alice's lock is older than the stale cutoff
        assert!(db
            .try_acquire_prescription_lock(
                &rx.id,
                "bob",
                "2024-03-04T10:00:00+00:00",
                "2024-03-04T09:45:00+00:00",
            )
            .unwrap());
        let retrieved = db.get_prescription(&rx.id).unwrap().unwrap();
        assert_eq!(retrieved.editing_by, Some("bob".into()));
    }

    #[test]
    fn test_update_keeps_lock() {
        let (db, mut rx) = setup_db();
        db.try_acquire_prescription_lock(
            &rx.id,
            "alice",
            "2024-03-04T09:00:00+00:00",
            "2024-03-04T08:45:00+00:00",
        )
        .unwrap();

        rx.notes = Some("After meals".into());
        db.update_prescription(&rx).unwrap();

        let retrieved = db.get_prescription(&rx.id).unwrap().unwrap();
        assert_eq!(retrieved.notes, Some("After meals".into()));
        assert_eq!(retrieved.editing_by, Some("alice".into()));
    }
}
