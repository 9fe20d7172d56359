//! Appointment database operations.

use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, OptionalExtension, Row};

use super::{format_datetime, now_rfc3339, parse_datetime, Database, DbError, DbResult};
use crate::models::{Appointment, AppointmentStatus};

const APPOINTMENT_COLUMNS: &str = "id, patient_id, doctor_id, start_at, end_at, reason, \
     status, notes, created_at, updated_at, deleted_at";

impl Database {
    /// Insert a new appointment.
    pub fn insert_appointment(&self, appointment: &Appointment) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO appointments (
                id, patient_id, doctor_id, start_at, end_at, reason,
                status, notes, created_at, updated_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                appointment.id,
                appointment.patient_id,
                appointment.doctor_id,
                format_datetime(&appointment.start),
                format_datetime(&appointment.end),
                appointment.reason,
                appointment.status.as_str(),
                appointment.notes,
                appointment.created_at,
                appointment.updated_at,
                appointment.deleted_at,
            ],
        )?;
        Ok(())
    }

    /// Update times, status and notes of an appointment.
    pub fn update_appointment(&self, appointment: &Appointment) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE appointments SET
                start_at = ?2,
                end_at = ?3,
                reason = ?4,
                status = ?5,
                notes = ?6,
                updated_at = ?7
            WHERE id = ?1
            "#,
            params![
                appointment.id,
                format_datetime(&appointment.start),
                format_datetime(&appointment.end),
                appointment.reason,
                appointment.status.as_str(),
                appointment.notes,
                now_rfc3339(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get an appointment by ID.
    pub fn get_appointment(&self, id: &str) -> DbResult<Option<Appointment>> {
        let sql = format!(
            "SELECT {} FROM appointments WHERE id = ?",
            APPOINTMENT_COLUMNS
        );
        self.conn
            .query_row(&sql, [id], AppointmentRow::from_row)
            .optional()?
            .map(Appointment::try_from)
            .transpose()
    }

    /// Live appointments of a doctor that intersect `[from, to)`, by start time.
    pub fn list_appointments_for_doctor(
        &self,
        doctor_id: &str,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> DbResult<Vec<Appointment>> {
        let sql = format!(
            r#"
            SELECT {} FROM appointments
            WHERE doctor_id = ?1 AND deleted_at IS NULL
              AND start_at < ?3 AND end_at > ?2
            ORDER BY start_at
            "#,
            APPOINTMENT_COLUMNS
        );
        self.query_appointments(
            &sql,
            params![doctor_id, format_datetime(from), format_datetime(to)],
        )
    }

    /// Live appointments of a patient that intersect `[from, to)`.
    pub fn list_appointments_for_patient_between(
        &self,
        patient_id: &str,
        from: &NaiveDateTime,
        to: &NaiveDateTime,
    ) -> DbResult<Vec<Appointment>> {
        let sql = format!(
            r#"
            SELECT {} FROM appointments
            WHERE patient_id = ?1 AND deleted_at IS NULL
              AND start_at < ?3 AND end_at > ?2
            ORDER BY start_at
            "#,
            APPOINTMENT_COLUMNS
        );
        self.query_appointments(
            &sql,
            params![patient_id, format_datetime(from), format_datetime(to)],
        )
    }

    /// Full appointment history of a patient, newest first.
    pub fn list_appointments_for_patient(&self, patient_id: &str) -> DbResult<Vec<Appointment>> {
        let sql = format!(
            r#"
            SELECT {} FROM appointments
            WHERE patient_id = ?1 AND deleted_at IS NULL
            ORDER BY start_at DESC
            "#,
            APPOINTMENT_COLUMNS
        );
        self.query_appointments(&sql, params![patient_id])
    }

    /// All live appointments starting on a calendar day.
    pub fn list_appointments_on(
        &self,
        date: NaiveDate,
        status: Option<AppointmentStatus>,
    ) -> DbResult<Vec<Appointment>> {
        let day_start = date.and_hms_opt(0, 0, 0).unwrap_or_default();
        let day_end = day_start + chrono::Duration::days(1);
        let sql = format!(
            r#"
            SELECT {} FROM appointments
            WHERE deleted_at IS NULL
              AND start_at >= ?1 AND start_at < ?2
              AND (?3 IS NULL OR status = ?3)
            ORDER BY start_at, doctor_id
            "#,
            APPOINTMENT_COLUMNS
        );
        self.query_appointments(
            &sql,
            params![
                format_datetime(&day_start),
                format_datetime(&day_end),
                status.map(|s| s.as_str()),
            ],
        )
    }

    /// Soft-delete an appointment.
    pub fn soft_delete_appointment(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE appointments SET deleted_at = ?2, updated_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![id, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    fn query_appointments<P: rusqlite::Params>(
        &self,
        sql: &str,
        params: P,
    ) -> DbResult<Vec<Appointment>> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, AppointmentRow::from_row)?;

        let mut appointments = Vec::new();
        for row in rows {
            appointments.push(row?.try_into()?);
        }
        Ok(appointments)
    }
}

/// Intermediate row struct for database mapping.
struct AppointmentRow {
    id: String,
    patient_id: String,
    doctor_id: String,
    start_at: String,
    end_at: String,
    reason: Option<String>,
    status: String,
    notes: Option<String>,
    created_at: String,
    updated_at: String,
    deleted_at: Option<String>,
}

impl AppointmentRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            doctor_id: row.get(2)?,
            start_at: row.get(3)?,
            end_at: row.get(4)?,
            reason: row.get(5)?,
            status: row.get(6)?,
            notes: row.get(7)?,
            created_at: row.get(8)?,
            updated_at: row.get(9)?,
            deleted_at: row.get(10)?,
        })
    }
}

impl TryFrom<AppointmentRow> for Appointment {
    type Error = DbError;

    fn try_from(row: AppointmentRow) -> Result<Self, Self::Error> {
        Ok(Appointment {
            start: parse_datetime(&row.start_at)?,
            end: parse_datetime(&row.end_at)?,
            status: AppointmentStatus::parse(&row.status).ok_or_else(|| {
                DbError::InvalidData(format!("appointment status {:?}", row.status))
            })?,
            id: row.id,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            reason: row.reason,
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
    use crate::models::{Doctor, Patient};

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn setup_db() -> (Database, Patient, Doctor) {
        let db = Database::open_in_memory().unwrap();
        let patient = Patient::new("Maya".into());
        let doctor = Doctor::new("Dr. Khoury".into());
        db.insert_patient(&patient).unwrap();
        db.insert_doctor(&doctor).unwrap();
        (db, patient, doctor)
    }

    #[test]
    fn test_insert_and_get() {
        let (db, patient, doctor) = setup_db();

        let mut appt = Appointment::new(
            patient.id.clone(),
            doctor.id.clone(),
            at(4, 9, 0),
            at(4, 9, 30),
        );
        appt.reason = Some("Follow-up".into());
        db.insert_appointment(&appt).unwrap();

        let retrieved = db.get_appointment(&appt.id).unwrap().unwrap();
        assert_eq!(retrieved.start, at(4, 9, 0));
        assert_eq!(retrieved.end, at(4, 9, 30));
        assert_eq!(retrieved.status, AppointmentStatus::Scheduled);
        assert_eq!(retrieved.reason, Some("Follow-up".into()));
    }

    #[test]
    fn test_end_before_start_rejected() {
        let (db, patient, doctor) = setup_db();
        let appt = Appointment::new(patient.id, doctor.id, at(4, 10, 0), at(4, 9, 0));
        assert!(db.insert_appointment(&appt).is_err());
    }

    #[test]
    fn test_doctor_window_query() {
        let (db, patient, doctor) = setup_db();

        for (start, end) in [
            (at(4, 9, 0), at(4, 9, 30)),
            (at(4, 10, 0), at(4, 10, 30)),
            (at(5, 9, 0), at(5, 9, 30)),
        ] {
            let appt = Appointment::new(patient.id.clone(), doctor.id.clone(), start, end);
            db.insert_appointment(&appt).unwrap();
        }

        let day = db
            .list_appointments_for_doctor(&doctor.id, &at(4, 0, 0), &at(5, 0, 0))
            .unwrap();
        assert_eq!(day.len(), 2);
        assert!(day[0].start < day[1].start);

        // Window touching the end of an appointment does not include it
        let touching = db
            .list_appointments_for_doctor(&doctor.id, &at(4, 9, 30), &at(4, 10, 0))
            .unwrap();
        assert!(touching.is_empty());
    }

    #[test]
    fn test_list_on_day_with_status() {
        let (db, patient, doctor) = setup_db();

        let mut cancelled =
            Appointment::new(patient.id.clone(), doctor.id.clone(), at(4, 9, 0), at(4, 9, 30));
        cancelled.status = AppointmentStatus::Cancelled;
        db.insert_appointment(&cancelled).unwrap();
        let scheduled =
            Appointment::new(patient.id.clone(), doctor.id.clone(), at(4, 11, 0), at(4, 11, 30));
        db.insert_appointment(&scheduled).unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        assert_eq!(db.list_appointments_on(day, None).unwrap().len(), 2);

        let only_scheduled = db
            .list_appointments_on(day, Some(AppointmentStatus::Scheduled))
            .unwrap();
        assert_eq!(only_scheduled.len(), 1);
        assert_eq!(only_scheduled[0].id, scheduled.id);
    }

    #[test]
    fn test_soft_delete() {
        let (db, patient, doctor) = setup_db();
        let appt = Appointment::new(patient.id.clone(), doctor.id, at(4, 9, 0), at(4, 9, 30));
        db.insert_appointment(&appt).unwrap();

        assert!(db.soft_delete_appointment(&appt.id).unwrap());
        assert!(db.list_appointments_for_patient(&patient.id).unwrap().is_empty());
        assert!(db.get_appointment(&appt.id).unwrap().unwrap().deleted_at.is_some());
    }
}
