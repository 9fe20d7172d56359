//! Prescriptions and the single-editor lock.
//!
//! Only one user may edit a prescription at a time. The lock is a pair of
//! columns taken with a conditional UPDATE; a lock older than the configured
//! number of minutes is treated as abandoned and can be taken over.

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use thiserror::Error;
use tracing::{info, warn};

use crate::db::{Database, DbError};
use crate::models::{
    DraftLine, Prescription, PrescriptionChanges, PrescriptionItem, PrescriptionStatus, SaleDraft,
};

/// Prescription errors.
#[derive(Error, Debug)]
pub enum PrescriptionError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid prescription: {0}")]
    Invalid(String),

    #[error("Prescription is being edited by {holder} since {since}")]
    Locked { holder: String, since: String },

    #[error("{editor} does not hold the edit lock")]
    NotLocked { editor: String },

    #[error("Prescription {id} is {status:?}")]
    WrongStatus {
        id: String,
        status: PrescriptionStatus,
    },
}

pub type PrescriptionResult<T> = Result<T, PrescriptionError>;

fn lock_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Prescription workflow bound to one database.
pub struct PrescriptionDesk<'a> {
    db: &'a Database,
    lock_minutes: i64,
}

impl<'a> PrescriptionDesk<'a> {
    pub fn new(db: &'a Database, lock_minutes: i64) -> Self {
        Self { db, lock_minutes }
    }

    /// Write a new prescription for an existing patient and doctor.
    pub fn create(
        &self,
        patient_id: &str,
        doctor_id: &str,
        items: Vec<PrescriptionItem>,
        notes: Option<String>,
    ) -> PrescriptionResult<Prescription> {
        let patient = self
            .db
            .get_patient(patient_id)?
            .filter(|p| !p.is_deleted())
            .ok_or_else(|| PrescriptionError::NotFound(format!("patient {}", patient_id)))?;
        if self.db.get_doctor(doctor_id)?.is_none() {
            return Err(PrescriptionError::NotFound(format!("doctor {}", doctor_id)));
        }
        self.validate_items(&items)?;

        for item in &items {
            if patient.is_allergic_to(&item.drug_name) {
                warn!(patient_id, drug = %item.drug_name, "prescribing a drug the patient is allergic to");
            }
        }

        let mut prescription = Prescription::new(patient_id.to_string(), doctor_id.to_string());
        prescription.items = items;
        prescription.notes = notes;
        self.db.insert_prescription(&prescription)?;
        info!(prescription_id = %prescription.id, patient_id, "created prescription");
        Ok(prescription)
    }

    pub fn begin_edit(&self, id: &str, editor: &str) -> PrescriptionResult<Prescription> {
        self.begin_edit_at(id, editor, Utc::now())
    }

    /// Take the edit lock as of `now`.
    pub fn begin_edit_at(
        &self,
        id: &str,
        editor: &str,
        now: DateTime<Utc>,
    ) -> PrescriptionResult<Prescription> {
        let prescription = self.load(id)?;
        if prescription.status != PrescriptionStatus::Active {
            return Err(PrescriptionError::WrongStatus {
                id: prescription.id,
                status: prescription.status,
            });
        }

        let acquired = self.db.try_acquire_prescription_lock(
            id,
            editor,
            &lock_timestamp(now),
            &self.stale_before(now),
        )?;
        if !acquired {
            let holder = prescription.editing_by.unwrap_or_default();
            let since = prescription.editing_since.unwrap_or_default();
            warn!(prescription_id = id, editor, %holder, "prescription edit lock refused");
            return Err(PrescriptionError::Locked { holder, since });
        }

        info!(prescription_id = id, editor, "prescription edit started");
        self.load(id)
    }

    pub fn save_edit(
        &self,
        id: &str,
        editor: &str,
        changes: PrescriptionChanges,
    ) -> PrescriptionResult<Prescription> {
        self.save_edit_at(id, editor, changes, Utc::now())
    }

    /// Apply `changes` if `editor` holds a live lock; the lock is refreshed.
    pub fn save_edit_at(
        &self,
        id: &str,
        editor: &str,
        changes: PrescriptionChanges,
        now: DateTime<Utc>,
    ) -> PrescriptionResult<Prescription> {
        let mut prescription = self.load(id)?;
        if prescription.status != PrescriptionStatus::Active {
            return Err(PrescriptionError::WrongStatus {
                id: prescription.id,
                status: prescription.status,
            });
        }
        let holds_lock = prescription.editing_by.as_deref() == Some(editor)
            && prescription
                .editing_since
                .as_deref()
                .is_some_and(|since| since >= self.stale_before(now).as_str());
        if !holds_lock {
            warn!(prescription_id = id, editor, "save without a live edit lock");
            return Err(PrescriptionError::NotLocked {
                editor: editor.to_string(),
            });
        }

        if let Some(items) = &changes.items {
            self.validate_items(items)?;
        }
        changes.apply_to(&mut prescription);

        self.db.atomically(|db| {
            db.update_prescription(&prescription)?;
            db.try_acquire_prescription_lock(
                id,
                editor,
                &lock_timestamp(now),
                &self.stale_before(now),
            )?;
            Ok::<_, PrescriptionError>(())
        })?;

        info!(prescription_id = id, editor, "prescription saved");
        self.load(id)
    }

    /// Release the lock. Returns whether `editor` was holding it.
    pub fn end_edit(&self, id: &str, editor: &str) -> PrescriptionResult<bool> {
        self.load(id)?;
        let released = self.db.release_prescription_lock(id, editor)?;
        if released {
            info!(prescription_id = id, editor, "prescription edit ended");
        }
        Ok(released)
    }

    /// Cancel on behalf of `by`. Refused while someone else holds a live lock.
    pub fn cancel(&self, id: &str, by: Option<&str>) -> PrescriptionResult<Prescription> {
        self.set_status_at(id, by, PrescriptionStatus::Cancelled, Utc::now())
    }

    pub fn cancel_at(
        &self,
        id: &str,
        by: Option<&str>,
        now: DateTime<Utc>,
    ) -> PrescriptionResult<Prescription> {
        self.set_status_at(id, by, PrescriptionStatus::Cancelled, now)
    }

    pub fn mark_dispensed(&self, id: &str, by: Option<&str>) -> PrescriptionResult<Prescription> {
        self.set_status_at(id, by, PrescriptionStatus::Dispensed, Utc::now())
    }

    /// Sale draft for the stocked lines of an active prescription.
    pub fn dispense_draft(&self, id: &str, currency: &str) -> PrescriptionResult<SaleDraft> {
        let prescription = self.load(id)?;
        if prescription.status != PrescriptionStatus::Active {
            return Err(PrescriptionError::WrongStatus {
                id: prescription.id,
                status: prescription.status,
            });
        }

        let mut draft = SaleDraft::new(currency);
        draft.patient_id = Some(prescription.patient_id.clone());
        draft.notes = Some(format!("Prescription {}", prescription.id));
        draft.lines = prescription
            .stocked_items()
            .filter_map(|item| {
                item.item_id.as_ref().map(|item_id| DraftLine {
                    item_id: item_id.clone(),
                    quantity: item.quantity,
                    discount_percent: 0.0,
                })
            })
            .collect();
        if draft.lines.is_empty() {
            return Err(PrescriptionError::Invalid(format!(
                "prescription {} has no stocked items",
                id
            )));
        }
        Ok(draft)
    }

    /// While a live lock is held only its holder may change the status. The
    /// lock is cleared with the change.
    fn set_status_at(
        &self,
        id: &str,
        by: Option<&str>,
        status: PrescriptionStatus,
        now: DateTime<Utc>,
    ) -> PrescriptionResult<Prescription> {
        let mut prescription = self.load(id)?;
        if prescription.status != PrescriptionStatus::Active {
            return Err(PrescriptionError::WrongStatus {
                id: prescription.id,
                status: prescription.status,
            });
        }
        self.check_lock(&prescription, by, now)?;

        prescription.status = status;
        prescription.editing_by = None;
        prescription.editing_since = None;
        self.db.set_prescription_status(id, status)?;
        info!(prescription_id = id, status = status.as_str(), "prescription status changed");
        Ok(prescription)
    }

    /// Soft-delete on behalf of `by`. Refused while someone else holds a live lock.
    pub fn delete(&self, id: &str, by: Option<&str>) -> PrescriptionResult<()> {
        self.delete_at(id, by, Utc::now())
    }

    pub fn delete_at(
        &self,
        id: &str,
        by: Option<&str>,
        now: DateTime<Utc>,
    ) -> PrescriptionResult<()> {
        let prescription = self.load(id)?;
        self.check_lock(&prescription, by, now)?;
        self.db.soft_delete_prescription(id)?;
        info!(prescription_id = id, "deleted prescription");
        Ok(())
    }

    /// `Locked` unless the lock is free, stale or held by `by`.
    fn check_lock(
        &self,
        prescription: &Prescription,
        by: Option<&str>,
        now: DateTime<Utc>,
    ) -> PrescriptionResult<()> {
        if let (Some(holder), Some(since)) = (&prescription.editing_by, &prescription.editing_since)
        {
            let live = since.as_str() >= self.stale_before(now).as_str();
            if live && by != Some(holder.as_str()) {
                warn!(prescription_id = %prescription.id, %holder, "refused while being edited");
                return Err(PrescriptionError::Locked {
                    holder: holder.clone(),
                    since: since.clone(),
                });
            }
        }
        Ok(())
    }

    fn stale_before(&self, now: DateTime<Utc>) -> String {
        lock_timestamp(now - Duration::minutes(self.lock_minutes))
    }

    fn validate_items(&self, items: &[PrescriptionItem]) -> PrescriptionResult<()> {
        for item in items {
            if item.drug_name.trim().is_empty() {
                return Err(PrescriptionError::Invalid("drug name is empty".into()));
            }
            if item.quantity.is_nan() || item.quantity <= 0.0 {
                return Err(PrescriptionError::Invalid(format!(
                    "quantity {} for {}",
                    item.quantity, item.drug_name
                )));
            }
            if let Some(item_id) = &item.item_id {
                if self.db.get_inventory_item(item_id)?.is_none() {
                    return Err(PrescriptionError::NotFound(format!(
                        "inventory item {}",
                        item_id
                    )));
                }
            }
        }
        Ok(())
    }

    fn load(&self, id: &str) -> PrescriptionResult<Prescription> {
        self.db
            .get_prescription(id)?
            .filter(|p| p.deleted_at.is_none())
            .ok_or_else(|| PrescriptionError::NotFound(format!("prescription {}", id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Doctor, InventoryItem, Patient};
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 4, h, m, 0).unwrap()
    }

    fn setup() -> (Database, Prescription, InventoryItem) {
        let db = Database::open_in_memory().unwrap();
        let mut patient = Patient::new("Maya".into());
        patient.allergies = vec!["penicillin".into()];
        let doctor = Doctor::new("Dr. Khoury".into());
        db.insert_patient(&patient).unwrap();
        db.insert_doctor(&doctor).unwrap();
        let stock = InventoryItem::new("Ibuprofen 400mg".into(), 0.3, "USD".into());
        db.insert_inventory_item(&stock).unwrap();

        let mut stocked = PrescriptionItem::new("Ibuprofen 400mg".into(), 20.0);
        stocked.item_id = Some(stock.id.clone());
        let external = PrescriptionItem::new("Physiotherapy".into(), 1.0);

        let desk = PrescriptionDesk::new(&db, 15);
        let rx = desk
            .create(&patient.id, &doctor.id, vec![stocked, external], None)
            .unwrap();
        (db, rx, stock)
    }

    #[test]
    fn test_second_editor_gets_conflict() {
        let (db, rx, _) = setup();
        let desk = PrescriptionDesk::new(&db, 15);

        let locked = desk.begin_edit_at(&rx.id, "alice", at(9, 0)).unwrap();
        assert_eq!(locked.editing_by.as_deref(), Some("alice"));

        let err = desk.begin_edit_at(&rx.id, "bob", at(9, 5)).unwrap_err();
        assert!(matches!(err, PrescriptionError::Locked { holder, .. } if holder == "alice"));

        let changes = PrescriptionChanges {
            notes: Some(Some("Take with food".into())),
            ..Default::default()
        };
        assert!(matches!(
            desk.save_edit_at(&rx.id, "bob", changes.clone(), at(9, 5)),
            Err(PrescriptionError::NotLocked { .. })
        ));

        let saved = desk.save_edit_at(&rx.id, "alice", changes, at(9, 6)).unwrap();
        assert_eq!(saved.notes.as_deref(), Some("Take with food"));
        assert_eq!(saved.editing_since.as_deref(), Some("2024-03-04T09:06:00Z"));

        assert!(desk.end_edit(&rx.id, "alice").unwrap());
        assert!(desk.begin_edit_at(&rx.id, "bob", at(9, 7)).is_ok());
    }

    #[test]
    fn test_stale_lock_taken_over() {
        let (db, rx, _) = setup();
        let desk = PrescriptionDesk::new(&db, 15);

        desk.begin_edit_at(&rx.id, "alice", at(9, 0)).unwrap();
        let taken = desk.begin_edit_at(&rx.id, "bob", at(9, 20)).unwrap();
        assert_eq!(taken.editing_by.as_deref(), Some("bob"));

        // Alice's stale session can no longer save
        assert!(matches!(
            desk.save_edit_at(&rx.id, "alice", PrescriptionChanges::default(), at(9, 21)),
            Err(PrescriptionError::NotLocked { .. })
        ));
    }

    #[test]
    fn test_expired_lock_cannot_save() {
        let (db, rx, _) = setup();
        let desk = PrescriptionDesk::new(&db, 15);
        desk.begin_edit_at(&rx.id, "alice", at(9, 0)).unwrap();
        assert!(matches!(
            desk.save_edit_at(&rx.id, "alice", PrescriptionChanges::default(), at(9, 30)),
            Err(PrescriptionError::NotLocked { .. })
        ));
    }

    #[test]
    fn test_invalid_changes_rejected() {
        let (db, rx, _) = setup();
        let desk = PrescriptionDesk::new(&db, 15);
        desk.begin_edit_at(&rx.id, "alice", at(9, 0)).unwrap();

        let changes = PrescriptionChanges {
            items: Some(vec![PrescriptionItem::new("Ibuprofen".into(), 0.0)]),
            ..Default::default()
        };
        assert!(matches!(
            desk.save_edit_at(&rx.id, "alice", changes, at(9, 1)),
            Err(PrescriptionError::Invalid(_))
        ));
        assert_eq!(db.get_prescription(&rx.id).unwrap().unwrap().items.len(), 2);
    }

    #[test]
    fn test_dispense_draft_uses_stocked_items() {
        let (db, rx, stock) = setup();
        let desk = PrescriptionDesk::new(&db, 15);

        let draft = desk.dispense_draft(&rx.id, "USD").unwrap();
        assert_eq!(draft.lines.len(), 1);
        assert_eq!(draft.lines[0].item_id, stock.id);
        assert_eq!(draft.lines[0].quantity, 20.0);
        assert_eq!(draft.patient_id.as_deref(), Some(rx.patient_id.as_str()));

        desk.mark_dispensed(&rx.id, None).unwrap();
        assert!(matches!(
            desk.dispense_draft(&rx.id, "USD"),
            Err(PrescriptionError::WrongStatus { .. })
        ));
        assert!(matches!(
            desk.begin_edit_at(&rx.id, "alice", at(9, 0)),
            Err(PrescriptionError::WrongStatus { .. })
        ));
    }

    #[test]
    fn test_cancel_refused_while_someone_else_edits() {
        let (db, rx, _) = setup();
        let desk = PrescriptionDesk::new(&db, 15);
        desk.begin_edit_at(&rx.id, "alice", at(9, 0)).unwrap();

        let err = desk.cancel_at(&rx.id, None, at(9, 5)).unwrap_err();
        assert!(matches!(err, PrescriptionError::Locked { holder, .. } if holder == "alice"));
        let err = desk.cancel_at(&rx.id, Some("bob"), at(9, 5)).unwrap_err();
        assert!(matches!(err, PrescriptionError::Locked { .. }));
        assert_eq!(
            db.get_prescription(&rx.id).unwrap().unwrap().status,
            PrescriptionStatus::Active
        );

        let changes = PrescriptionChanges {
            notes: Some(Some("edited".into())),
            ..Default::default()
        };
        let saved = desk.save_edit_at(&rx.id, "alice", changes, at(9, 6)).unwrap();
        assert_eq!(saved.notes.as_deref(), Some("edited"));
        assert_eq!(saved.status, PrescriptionStatus::Active);
    }

    #[test]
    fn test_lock_holder_may_cancel_and_lock_is_released() {
        let (db, rx, _) = setup();
        let desk = PrescriptionDesk::new(&db, 15);
        desk.begin_edit_at(&rx.id, "alice", at(9, 0)).unwrap();

        let cancelled = desk.cancel_at(&rx.id, Some("alice"), at(9, 1)).unwrap();
        assert_eq!(cancelled.status, PrescriptionStatus::Cancelled);

        let stored = db.get_prescription(&rx.id).unwrap().unwrap();
        assert_eq!(stored.status, PrescriptionStatus::Cancelled);
        assert!(stored.editing_by.is_none());
        assert!(stored.editing_since.is_none());
    }

    #[test]
    fn test_stale_lock_does_not_block_cancel() {
        let (db, rx, _) = setup();
        let desk = PrescriptionDesk::new(&db, 15);
        desk.begin_edit_at(&rx.id, "alice", at(9, 0)).unwrap();
        assert!(desk.cancel_at(&rx.id, Some("bob"), at(9, 30)).is_ok());
    }

    #[test]
    fn test_save_rejected_once_no_longer_active() {
        let (db, rx, _) = setup();
        let desk = PrescriptionDesk::new(&db, 15);
        desk.begin_edit_at(&rx.id, "alice", at(9, 0)).unwrap();
        desk.cancel_at(&rx.id, Some("alice"), at(9, 1)).unwrap();

        let changes = PrescriptionChanges {
            notes: Some(Some("edited".into())),
            ..Default::default()
        };
        assert!(matches!(
            desk.save_edit_at(&rx.id, "alice", changes, at(9, 2)),
            Err(PrescriptionError::WrongStatus {
                status: PrescriptionStatus::Cancelled,
                ..
            })
        ));
        assert!(db.get_prescription(&rx.id).unwrap().unwrap().notes.is_none());
    }

    #[test]
    fn test_delete_respects_lock() {
        let (db, rx, _) = setup();
        let desk = PrescriptionDesk::new(&db, 15);
        desk.begin_edit_at(&rx.id, "alice", at(9, 0)).unwrap();

        assert!(matches!(
            desk.delete_at(&rx.id, Some("bob"), at(9, 1)),
            Err(PrescriptionError::Locked { .. })
        ));
        desk.delete_at(&rx.id, Some("alice"), at(9, 2)).unwrap();

        assert!(db.get_prescription(&rx.id).unwrap().unwrap().deleted_at.is_some());
        assert!(matches!(
            desk.begin_edit_at(&rx.id, "alice", at(9, 3)),
            Err(PrescriptionError::NotFound(_))
        ));
        assert!(db.list_prescriptions_for_patient(&rx.patient_id).unwrap().is_empty());
    }

    #[test]
    fn test_create_requires_patient() {
        let (db, rx, _) = setup();
        let desk = PrescriptionDesk::new(&db, 15);
        assert!(matches!(
            desk.create("nobody", &rx.doctor_id, Vec::new(), None),
            Err(PrescriptionError::NotFound(_))
        ));
    }
}
