//! Lab order and referral letter database operations.

use rusqlite::{params, OptionalExtension, Row};

use super::{now_rfc3339, Database, DbError, DbResult};
use crate::models::{LabOrder, LabStatus, ReferralLetter, Urgency};

const LAB_COLUMNS: &str = "id, patient_id, doctor_id, test_name, lab_name, price, status, \
     result, attachments, ordered_at, completed_at, deleted_at";

const REFERRAL_COLUMNS: &str = "id, patient_id, doctor_id, referred_to, specialty, reason, \
     clinical_summary, urgency, created_at, deleted_at";

impl Database {
    /// Insert a new lab order.
    pub fn insert_lab_order(&self, order: &LabOrder) -> DbResult<()> {
        let attachments_json = serde_json::to_string(&order.attachments)?;
        self.conn.execute(
            r#"
            INSERT INTO lab_orders (
                id, patient_id, doctor_id, test_name, lab_name, price, status,
                result, attachments, ordered_at, completed_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
            "#,
            params![
                order.id,
                order.patient_id,
                order.doctor_id,
                order.test_name,
                order.lab_name,
                order.price,
                order.status.as_str(),
                order.result,
                attachments_json,
                order.ordered_at,
                order.completed_at,
                order.deleted_at,
            ],
        )?;
        Ok(())
    }

    /// Update a lab order.
    pub fn update_lab_order(&self, order: &LabOrder) -> DbResult<bool> {
        let attachments_json = serde_json::to_string(&order.attachments)?;
        let rows_affected = self.conn.execute(
            r#"
            UPDATE lab_orders SET
                test_name = ?2,
                lab_name = ?3,
                price = ?4,
                status = ?5,
                result = ?6,
                attachments = ?7,
                completed_at = ?8
            WHERE id = ?1
            "#,
            params![
                order.id,
                order.test_name,
                order.lab_name,
                order.price,
                order.status.as_str(),
                order.result,
                attachments_json,
                order.completed_at,
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a lab order by ID.
    pub fn get_lab_order(&self, id: &str) -> DbResult<Option<LabOrder>> {
        let sql = format!("SELECT {} FROM lab_orders WHERE id = ?", LAB_COLUMNS);
        self.conn
            .query_row(&sql, [id], LabRow::from_row)
            .optional()?
            .map(LabOrder::try_from)
            .transpose()
    }

    /// Live lab orders, filtered by patient and/or status, newest first.
    pub fn list_lab_orders(
        &self,
        patient_id: Option<&str>,
        status: Option<LabStatus>,
    ) -> DbResult<Vec<LabOrder>> {
        let sql = format!(
            r#"
            SELECT {} FROM lab_orders
            WHERE deleted_at IS NULL
              AND (?1 IS NULL OR patient_id = ?1)
              AND (?2 IS NULL OR status = ?2)
            ORDER BY ordered_at DESC
            "#,
            LAB_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(
            params![patient_id, status.map(|s| s.as_str())],
            LabRow::from_row,
        )?;

        let mut orders = Vec::new();
        for row in rows {
            orders.push(row?.try_into()?);
        }
        Ok(orders)
    }

    /// Soft-delete a lab order.
    pub fn soft_delete_lab_order(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE lab_orders SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![id, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }

    /// Insert a referral letter.
    pub fn insert_referral(&self, letter: &ReferralLetter) -> DbResult<()> {
        self.conn.execute(
            r#"
            INSERT INTO referral_letters (
                id, patient_id, doctor_id, referred_to, specialty, reason,
                clinical_summary, urgency, created_at, deleted_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)
            "#,
            params![
                letter.id,
                letter.patient_id,
                letter.doctor_id,
                letter.referred_to,
                letter.specialty,
                letter.reason,
                letter.clinical_summary,
                letter.urgency.as_str(),
                letter.created_at,
                letter.deleted_at,
            ],
        )?;
        Ok(())
    }

    /// Update a referral letter.
    pub fn update_referral(&self, letter: &ReferralLetter) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            r#"
            UPDATE referral_letters SET
                referred_to = ?2,
                specialty = ?3,
                reason = ?4,
                clinical_summary = ?5,
                urgency = ?6
            WHERE id = ?1
            "#,
            params![
                letter.id,
                letter.referred_to,
                letter.specialty,
                letter.reason,
                letter.clinical_summary,
                letter.urgency.as_str(),
            ],
        )?;
        Ok(rows_affected > 0)
    }

    /// Get a referral letter by ID.
    pub fn get_referral(&self, id: &str) -> DbResult<Option<ReferralLetter>> {
        let sql = format!(
            "SELECT {} FROM referral_letters WHERE id = ?",
            REFERRAL_COLUMNS
        );
        self.conn
            .query_row(&sql, [id], ReferralRow::from_row)
            .optional()?
            .map(ReferralLetter::try_from)
            .transpose()
    }

    /// Live referral letters of a patient, newest first.
    pub fn list_referrals_for_patient(&self, patient_id: &str) -> DbResult<Vec<ReferralLetter>> {
        let sql = format!(
            r#"
            SELECT {} FROM referral_letters
            WHERE patient_id = ? AND deleted_at IS NULL
            ORDER BY created_at DESC
            "#,
            REFERRAL_COLUMNS
        );
        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map([patient_id], ReferralRow::from_row)?;

        let mut letters = Vec::new();
        for row in rows {
            letters.push(row?.try_into()?);
        }
        Ok(letters)
    }

    /// Soft-delete a referral letter.
    pub fn soft_delete_referral(&self, id: &str) -> DbResult<bool> {
        let rows_affected = self.conn.execute(
            "UPDATE referral_letters SET deleted_at = ?2 WHERE id = ?1 AND deleted_at IS NULL",
            params![id, now_rfc3339()],
        )?;
        Ok(rows_affected > 0)
    }
}

/// Intermediate row struct for database mapping.
struct LabRow {
    id: String,
    patient_id: String,
    doctor_id: Option<String>,
    test_name: String,
    lab_name: Option<String>,
    price: f64,
    status: String,
    result: Option<String>,
    attachments: String,
    ordered_at: String,
    completed_at: Option<String>,
    deleted_at: Option<String>,
}

impl LabRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            doctor_id: row.get(2)?,
            test_name: row.get(3)?,
            lab_name: row.get(4)?,
            price: row.get(5)?,
            status: row.get(6)?,
            result: row.get(7)?,
            attachments: row.get(8)?,
            ordered_at: row.get(9)?,
            completed_at: row.get(10)?,
            deleted_at: row.get(11)?,
        })
    }
}

impl TryFrom<LabRow> for LabOrder {
    type Error = DbError;

    fn try_from(row: LabRow) -> Result<Self, Self::Error> {
        Ok(LabOrder {
            status: LabStatus::parse(&row.status)
                .ok_or_else(|| DbError::InvalidData(format!("lab status {:?}", row.status)))?,
            attachments: serde_json::from_str(&row.attachments)?,
            id: row.id,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            test_name: row.test_name,
            lab_name: row.lab_name,
            price: row.price,
            result: row.result,
            ordered_at: row.ordered_at,
            completed_at: row.completed_at,
            deleted_at: row.deleted_at,
        })
    }
}

/// Intermediate row struct for database mapping.
struct ReferralRow {
    id: String,
    patient_id: String,
    doctor_id: String,
    referred_to: String,
    specialty: Option<String>,
    reason: String,
    clinical_summary: Option<String>,
    urgency: String,
    created_at: String,
    deleted_at: Option<String>,
}

impl ReferralRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            patient_id: row.get(1)?,
            doctor_id: row.get(2)?,
            referred_to: row.get(3)?,
            specialty: row.get(4)?,
            reason: row.get(5)?,
            clinical_summary: row.get(6)?,
            urgency: row.get(7)?,
            created_at: row.get(8)?,
            deleted_at: row.get(9)?,
        })
    }
}

impl TryFrom<ReferralRow> for ReferralLetter {
    type Error = DbError;

    fn try_from(row: ReferralRow) -> Result<Self, Self::Error> {
        Ok(ReferralLetter {
            urgency: Urgency::parse(&row.urgency)
                .ok_or_else(|| DbError::InvalidData(format!("urgency {:?}", row.urgency)))?,
            id: row.id,
            patient_id: row.patient_id,
            doctor_id: row.doctor_id,
            referred_to: row.referred_to,
            specialty: row.specialty,
            reason: row.reason,
            clinical_summary: row.clinical_summary,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
        })
    }
}
