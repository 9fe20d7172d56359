//! Clinic Core Library
//!
//! Local-first record keeping for a small clinic with an attached pharmacy.
//!
//! # Architecture
//!
//! ```text
//!   Front desk                Pharmacy                     Back office
//!       │                        │                             │
//!  patients, doctors      inventory ◄── drug import       expenses, suppliers
//!       │                        │          (CSV)               │
//!  appointments ──► prescriptions ──► sale / quotation ◄── purchase orders
//!  (slot checks)     (edit lock)          │
//!                                 pricing (multi-currency)
//!                                          │
//!                          ┌───────────────▼───────────────┐
//!                          │        Sales Ledger           │
//!                          │  entry = hash(prev | sale)    │
//!                          └───────────────┬───────────────┘
//!                                          │
//!                              receipts, reports (CSV)
//! ```
//!
//! Records live in SQLite; uploaded lab results and scanned receipts live in
//! a content-addressed object store.
//!
//! # Modules
//!
//! - [`db`]: SQLite database layer with FTS5 search
//! - [`models`]: Domain records (Patient, Appointment, Sale, etc.)
//! - [`scheduling`]: Slot generation and conflict-checked booking
//! - [`pricing`]: Exchange rates and sale totals
//! - [`sales`]: Quotations, sales, payments, voids and reports
//! - [`ledger`]: Hash-chained audit log of completed sales
//! - [`prescriptions`], [`labs`], [`purchasing`], [`expenses`]: Workflows
//! - [`import`]: Drug import from spreadsheet exports
//! - [`export`]: Receipts, letters and CSV reports
//! - [`storage`]: Object storage for uploaded files

pub mod config;
pub mod db;
pub mod expenses;
pub mod export;
pub mod import;
pub mod labs;
pub mod ledger;
pub mod models;
pub mod prescriptions;
pub mod pricing;
pub mod purchasing;
pub mod sales;
pub mod scheduling;
pub mod storage;

// Re-export commonly used types
pub use config::ClinicConfig;
pub use db::Database;
pub use import::{DrugImporter, ImportPlan, ImportSummary, StockMode};
pub use ledger::{Ledger, Verification};
pub use models::{
    Appointment, AppointmentStatus, Discount, Doctor, Expense, InventoryItem, LabOrder,
    LabStatus, Patient, Payment, Prescription, PrescriptionItem, PurchaseOrder, ReferralLetter,
    Sale, SaleDraft, Supplier,
};
pub use pricing::ExchangeRates;
pub use scheduling::{BookingRequest, Scheduler, TimeSlot};
pub use storage::{FsObjectStore, MemoryObjectStore, ObjectStore};

use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveDateTime, Utc};
use tracing::{debug, info};

use crate::expenses::{ExpenseBook, ExpenseSummary};
use crate::export::Receipt;
use crate::labs::{LabDesk, LabRequest};
use crate::models::{PrescriptionChanges, PurchaseLine, PurchaseStatus};
use crate::prescriptions::PrescriptionDesk;
use crate::purchasing::{Purchasing, SupplierBalance};
use crate::sales::{SalesDesk, SalesReport};

// =========================================================================
// Error Type
// =========================================================================

#[derive(Debug, thiserror::Error)]
pub enum ClinicError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Config error: {0}")]
    Config(String),
}

pub type ClinicResult<T> = Result<T, ClinicError>;

impl From<db::DbError> for ClinicError {
    fn from(e: db::DbError) -> Self {
        match e {
            db::DbError::NotFound(what) => ClinicError::NotFound(what),
            db::DbError::Constraint(_) => ClinicError::Conflict(e.to_string()),
            db::DbError::Json(_) => ClinicError::Serialization(e.to_string()),
            _ => ClinicError::Database(e.to_string()),
        }
    }
}

impl From<serde_json::Error> for ClinicError {
    fn from(e: serde_json::Error) -> Self {
        ClinicError::Serialization(e.to_string())
    }
}

impl From<config::ConfigError> for ClinicError {
    fn from(e: config::ConfigError) -> Self {
        ClinicError::Config(e.to_string())
    }
}

impl From<storage::StorageError> for ClinicError {
    fn from(e: storage::StorageError) -> Self {
        match e {
            storage::StorageError::NotFound(key) => ClinicError::NotFound(format!("object {}", key)),
            storage::StorageError::InvalidKey(_) => ClinicError::InvalidInput(e.to_string()),
            _ => ClinicError::Storage(e.to_string()),
        }
    }
}

impl From<pricing::PricingError> for ClinicError {
    fn from(e: pricing::PricingError) -> Self {
        ClinicError::InvalidInput(e.to_string())
    }
}

impl From<ledger::LedgerError> for ClinicError {
    fn from(e: ledger::LedgerError) -> Self {
        match e {
            ledger::LedgerError::Database(e) => e.into(),
            ledger::LedgerError::Json(e) => e.into(),
        }
    }
}

impl From<scheduling::SchedulingError> for ClinicError {
    fn from(e: scheduling::SchedulingError) -> Self {
        use scheduling::SchedulingError as E;
        match e {
            E::Database(e) => e.into(),
            E::NotFound(what) => ClinicError::NotFound(what),
            E::DoctorBusy(_) | E::PatientBusy(_) => ClinicError::Conflict(e.to_string()),
            _ => ClinicError::InvalidInput(e.to_string()),
        }
    }
}

impl From<sales::SalesError> for ClinicError {
    fn from(e: sales::SalesError) -> Self {
        use sales::SalesError as E;
        match e {
            E::Database(e) => e.into(),
            E::Pricing(e) => e.into(),
            E::Ledger(e) => e.into(),
            E::NotFound(what) => ClinicError::NotFound(what),
            _ => ClinicError::Conflict(e.to_string()),
        }
    }
}

impl From<purchasing::PurchasingError> for ClinicError {
    fn from(e: purchasing::PurchasingError) -> Self {
        use purchasing::PurchasingError as E;
        match e {
            E::Database(e) => e.into(),
            E::Pricing(e) => e.into(),
            E::NotFound(what) => ClinicError::NotFound(what),
            E::Invalid(_) => ClinicError::InvalidInput(e.to_string()),
            E::WrongStatus { .. } | E::Prepaid { .. } => ClinicError::Conflict(e.to_string()),
        }
    }
}

impl From<prescriptions::PrescriptionError> for ClinicError {
    fn from(e: prescriptions::PrescriptionError) -> Self {
        use prescriptions::PrescriptionError as E;
        match e {
            E::Database(e) => e.into(),
            E::NotFound(what) => ClinicError::NotFound(what),
            E::Invalid(_) => ClinicError::InvalidInput(e.to_string()),
            _ => ClinicError::Conflict(e.to_string()),
        }
    }
}

impl From<labs::LabError> for ClinicError {
    fn from(e: labs::LabError) -> Self {
        use labs::LabError as E;
        match e {
            E::Database(e) => e.into(),
            E::Storage(e) => e.into(),
            E::NotFound(what) => ClinicError::NotFound(what),
            E::Invalid(_) => ClinicError::InvalidInput(e.to_string()),
            E::InvalidTransition { .. } => ClinicError::Conflict(e.to_string()),
        }
    }
}

impl From<expenses::ExpenseError> for ClinicError {
    fn from(e: expenses::ExpenseError) -> Self {
        use expenses::ExpenseError as E;
        match e {
            E::Database(e) => e.into(),
            E::Pricing(e) => e.into(),
            E::NotFound(what) => ClinicError::NotFound(what),
            E::Invalid(_) => ClinicError::InvalidInput(e.to_string()),
        }
    }
}

impl From<import::ImportError> for ClinicError {
    fn from(e: import::ImportError) -> Self {
        use import::ImportError as E;
        match e {
            E::Database(e) => e.into(),
            E::Pricing(e) => e.into(),
            E::Stale(_) => ClinicError::Conflict(e.to_string()),
            _ => ClinicError::InvalidInput(e.to_string()),
        }
    }
}

impl<T> From<std::sync::PoisonError<T>> for ClinicError {
    fn from(e: std::sync::PoisonError<T>) -> Self {
        ClinicError::Database(format!("Lock poisoned: {}", e))
    }
}

fn not_found(what: &str, id: &str) -> ClinicError {
    ClinicError::NotFound(format!("{} {}", what, id))
}

fn require_text(field: &str, value: &str) -> ClinicResult<()> {
    if value.trim().is_empty() {
        return Err(ClinicError::InvalidInput(format!("{} is empty", field)));
    }
    Ok(())
}

// =========================================================================
// Main API Object
// =========================================================================

/// Thread-safe entry point over the database, configuration and object store.
pub struct ClinicCore {
    db: Arc<Mutex<Database>>,
    config: ClinicConfig,
    rates: ExchangeRates,
    store: Arc<dyn ObjectStore>,
}

impl ClinicCore {
    /// Open (or create) the database and object store under the configured
    /// data directory.
    pub fn open(config: ClinicConfig) -> ClinicResult<Self> {
        config.validate()?;
        let data_dir = &config.storage.data_dir;
        std::fs::create_dir_all(data_dir).map_err(|e| {
            ClinicError::Storage(format!("creating {}: {}", data_dir.display(), e))
        })?;

        let db = Database::open(config.storage.database_path())?;
        let store = FsObjectStore::open(config.storage.objects_dir())?;
        info!(data_dir = %data_dir.display(), "opened clinic");
        Ok(Self::with_parts(config, db, Arc::new(store)))
    }

    /// In-memory database and object store (for testing).
    pub fn open_in_memory(config: ClinicConfig) -> ClinicResult<Self> {
        config.validate()?;
        let db = Database::open_in_memory()?;
        Ok(Self::with_parts(config, db, Arc::new(MemoryObjectStore::new())))
    }

    pub fn with_parts(config: ClinicConfig, db: Database, store: Arc<dyn ObjectStore>) -> Self {
        let rates = ExchangeRates::from_config(&config.currency);
        Self {
            db: Arc::new(Mutex::new(db)),
            config,
            rates,
            store,
        }
    }

    pub fn config(&self) -> &ClinicConfig {
        &self.config
    }

    pub fn rates(&self) -> &ExchangeRates {
        &self.rates
    }

    // =========================================================================
    // Patient Operations
    // =========================================================================

    /// Register a new patient.
    pub fn create_patient(&self, patient: Patient) -> ClinicResult<Patient> {
        require_text("patient name", &patient.name)?;
        let db = self.db.lock()?;
        db.insert_patient(&patient)?;
        info!(patient_id = %patient.id, "registered patient");
        Ok(patient)
    }

    pub fn update_patient(&self, mut patient: Patient) -> ClinicResult<Patient> {
        require_text("patient name", &patient.name)?;
        patient.updated_at = Utc::now().to_rfc3339();
        let db = self.db.lock()?;
        if !db.update_patient(&patient)? {
            return Err(not_found("patient", &patient.id));
        }
        Ok(patient)
    }

    /// Get a patient by ID, including soft-deleted ones.
    pub fn get_patient(&self, id: &str) -> ClinicResult<Patient> {
        let db = self.db.lock()?;
        db.get_patient(id)?.ok_or_else(|| not_found("patient", id))
    }

    /// Search live patients by name or phone.
    pub fn search_patients(&self, query: &str, limit: usize) -> ClinicResult<Vec<Patient>> {
        let db = self.db.lock()?;
        let patients = db.search_patients(query, limit)?;
        debug!(query, found = patients.len(), "searched patients");
        Ok(patients)
    }

    pub fn list_patients(&self) -> ClinicResult<Vec<Patient>> {
        let db = self.db.lock()?;
        Ok(db.list_patients()?)
    }

    /// Soft-delete a patient. History stays readable.
    pub fn delete_patient(&self, id: &str) -> ClinicResult<()> {
        let db = self.db.lock()?;
        if !db.soft_delete_patient(id)? {
            return Err(not_found("patient", id));
        }
        info!(patient_id = id, "deleted patient");
        Ok(())
    }

    pub fn restore_patient(&self, id: &str) -> ClinicResult<()> {
        let db = self.db.lock()?;
        if !db.restore_patient(id)? {
            return Err(not_found("deleted patient", id));
        }
        Ok(())
    }

    // =========================================================================
    // Doctor Operations
    // =========================================================================

    pub fn add_doctor(&self, doctor: Doctor) -> ClinicResult<Doctor> {
        require_text("doctor name", &doctor.name)?;
        let db = self.db.lock()?;
        db.insert_doctor(&doctor)?;
        info!(doctor_id = %doctor.id, "added doctor");
        Ok(doctor)
    }

    pub fn get_doctor(&self, id: &str) -> ClinicResult<Doctor> {
        let db = self.db.lock()?;
        db.get_doctor(id)?.ok_or_else(|| not_found("doctor", id))
    }

    pub fn list_doctors(&self, active_only: bool) -> ClinicResult<Vec<Doctor>> {
        let db = self.db.lock()?;
        Ok(db.list_doctors(active_only)?)
    }

    pub fn set_doctor_active(&self, id: &str, active: bool) -> ClinicResult<()> {
        let db = self.db.lock()?;
        if !db.set_doctor_active(id, active)? {
            return Err(not_found("doctor", id));
        }
        Ok(())
    }

    // =========================================================================
    // Appointment Operations
    // =========================================================================

    pub fn book_appointment(&self, request: BookingRequest) -> ClinicResult<Appointment> {
        let db = self.db.lock()?;
        Ok(Scheduler::new(&db, &self.config.schedule).book(request)?)
    }

    pub fn reschedule_appointment(
        &self,
        id: &str,
        start: NaiveDateTime,
        end: NaiveDateTime,
    ) -> ClinicResult<Appointment> {
        let db = self.db.lock()?;
        Ok(Scheduler::new(&db, &self.config.schedule).reschedule(id, start, end)?)
    }

    pub fn cancel_appointment(&self, id: &str) -> ClinicResult<Appointment> {
        let db = self.db.lock()?;
        Ok(Scheduler::new(&db, &self.config.schedule).cancel(id)?)
    }

    /// Remove a booking entirely; its slot becomes free again.
    pub fn delete_appointment(&self, id: &str) -> ClinicResult<()> {
        let db = self.db.lock()?;
        if !db.soft_delete_appointment(id)? {
            return Err(not_found("appointment", id));
        }
        info!(appointment_id = id, "deleted appointment");
        Ok(())
    }

    pub fn complete_appointment(&self, id: &str) -> ClinicResult<Appointment> {
        let db = self.db.lock()?;
        Ok(Scheduler::new(&db, &self.config.schedule).complete(id)?)
    }

    pub fn mark_no_show(&self, id: &str) -> ClinicResult<Appointment> {
        let db = self.db.lock()?;
        Ok(Scheduler::new(&db, &self.config.schedule).mark_no_show(id)?)
    }

    /// Free slots of a doctor on a day.
    pub fn available_slots(&self, doctor_id: &str, date: NaiveDate) -> ClinicResult<Vec<TimeSlot>> {
        let db = self.db.lock()?;
        Ok(Scheduler::new(&db, &self.config.schedule).available_slots(doctor_id, date)?)
    }

    pub fn find_nearest_slot(
        &self,
        doctor_id: &str,
        preferred: NaiveDateTime,
        flexibility_minutes: i64,
    ) -> ClinicResult<Option<TimeSlot>> {
        let db = self.db.lock()?;
        Ok(Scheduler::new(&db, &self.config.schedule).find_nearest_slot(
            doctor_id,
            preferred,
            flexibility_minutes,
        )?)
    }

    pub fn get_appointment(&self, id: &str) -> ClinicResult<Appointment> {
        let db = self.db.lock()?;
        db.get_appointment(id)?
            .ok_or_else(|| not_found("appointment", id))
    }

    /// All live appointments on a day, optionally with one status.
    pub fn appointments_on(
        &self,
        date: NaiveDate,
        status: Option<AppointmentStatus>,
    ) -> ClinicResult<Vec<Appointment>> {
        let db = self.db.lock()?;
        Ok(db.list_appointments_on(date, status)?)
    }

    pub fn appointments_for_patient(&self, patient_id: &str) -> ClinicResult<Vec<Appointment>> {
        let db = self.db.lock()?;
        Ok(db.list_appointments_for_patient(patient_id)?)
    }

    // =========================================================================
    // Prescription Operations
    // =========================================================================

    fn prescription_desk<'a>(&self, db: &'a Database) -> PrescriptionDesk<'a> {
        PrescriptionDesk::new(db, self.config.prescriptions.edit_lock_minutes)
    }

    pub fn create_prescription(
        &self,
        patient_id: &str,
        doctor_id: &str,
        items: Vec<PrescriptionItem>,
        notes: Option<String>,
    ) -> ClinicResult<Prescription> {
        let db = self.db.lock()?;
        Ok(self
            .prescription_desk(&db)
            .create(patient_id, doctor_id, items, notes)?)
    }

    pub fn get_prescription(&self, id: &str) -> ClinicResult<Prescription> {
        let db = self.db.lock()?;
        db.get_prescription(id)?
            .ok_or_else(|| not_found("prescription", id))
    }

    pub fn prescriptions_for_patient(&self, patient_id: &str) -> ClinicResult<Vec<Prescription>> {
        let db = self.db.lock()?;
        Ok(db.list_prescriptions_for_patient(patient_id)?)
    }

    /// Take the edit lock of a prescription.
    pub fn begin_prescription_edit(&self, id: &str, editor: &str) -> ClinicResult<Prescription> {
        require_text("editor", editor)?;
        let db = self.db.lock()?;
        Ok(self.prescription_desk(&db).begin_edit(id, editor)?)
    }

    pub fn save_prescription_edit(
        &self,
        id: &str,
        editor: &str,
        changes: PrescriptionChanges,
    ) -> ClinicResult<Prescription> {
        let db = self.db.lock()?;
        Ok(self.prescription_desk(&db).save_edit(id, editor, changes)?)
    }

    /// Release the edit lock. False when `editor` did not hold it.
    pub fn end_prescription_edit(&self, id: &str, editor: &str) -> ClinicResult<bool> {
        let db = self.db.lock()?;
        Ok(self.prescription_desk(&db).end_edit(id, editor)?)
    }

    /// Cancel on behalf of `by`; refused while another user is editing.
    pub fn cancel_prescription(&self, id: &str, by: Option<&str>) -> ClinicResult<Prescription> {
        let db = self.db.lock()?;
        Ok(self.prescription_desk(&db).cancel(id, by)?)
    }

    /// Soft-delete on behalf of `by`; refused while another user is editing.
    pub fn delete_prescription(&self, id: &str, by: Option<&str>) -> ClinicResult<()> {
        let db = self.db.lock()?;
        Ok(self.prescription_desk(&db).delete(id, by)?)
    }

    /// Open a sale for the stocked lines of a prescription and mark it
    /// dispensed, in one transaction.
    pub fn dispense_prescription(
        &self,
        id: &str,
        currency: Option<&str>,
        by: Option<&str>,
    ) -> ClinicResult<Sale> {
        let currency = currency.unwrap_or(self.rates.base.as_str());
        let db = self.db.lock()?;
        let sale = db.atomically(|db| {
            let desk = self.prescription_desk(db);
            let draft = desk.dispense_draft(id, currency)?;
            let sale = SalesDesk::new(db, &self.rates).open_sale(&draft)?;
            desk.mark_dispensed(id, by)?;
            Ok::<_, ClinicError>(sale)
        })?;
        info!(prescription_id = id, sale_id = %sale.id, "dispensed prescription");
        Ok(sale)
    }

    /// Printable prescription.
    pub fn prescription_html(&self, id: &str) -> ClinicResult<String> {
        let db = self.db.lock()?;
        let prescription = db
            .get_prescription(id)?
            .ok_or_else(|| not_found("prescription", id))?;
        let patient = db
            .get_patient(&prescription.patient_id)?
            .ok_or_else(|| not_found("patient", &prescription.patient_id))?;
        let doctor = db
            .get_doctor(&prescription.doctor_id)?
            .ok_or_else(|| not_found("doctor", &prescription.doctor_id))?;
        Ok(export::prescription_html(
            &self.config.clinic,
            &prescription,
            &patient,
            &doctor,
        ))
    }

    // =========================================================================
    // Lab Operations
    // =========================================================================

    pub fn order_lab(&self, request: LabRequest) -> ClinicResult<LabOrder> {
        let db = self.db.lock()?;
        Ok(LabDesk::new(&db, self.store.as_ref()).order(request)?)
    }

    pub fn advance_lab(
        &self,
        id: &str,
        to: LabStatus,
        result: Option<String>,
    ) -> ClinicResult<LabOrder> {
        let db = self.db.lock()?;
        Ok(LabDesk::new(&db, self.store.as_ref()).advance(id, to, result)?)
    }

    /// Store a result file (scan, PDF) and link it to the order.
    pub fn attach_lab_result(
        &self,
        id: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> ClinicResult<LabOrder> {
        let db = self.db.lock()?;
        Ok(LabDesk::new(&db, self.store.as_ref()).attach_result_file(id, bytes, content_type)?)
    }

    pub fn lab_result_file(&self, id: &str, key: &str) -> ClinicResult<Vec<u8>> {
        let db = self.db.lock()?;
        Ok(LabDesk::new(&db, self.store.as_ref()).result_file(id, key)?)
    }

    pub fn lab_orders(
        &self,
        patient_id: Option<&str>,
        status: Option<LabStatus>,
    ) -> ClinicResult<Vec<LabOrder>> {
        let db = self.db.lock()?;
        Ok(db.list_lab_orders(patient_id, status)?)
    }

    pub fn delete_lab_order(&self, id: &str) -> ClinicResult<()> {
        let db = self.db.lock()?;
        if !db.soft_delete_lab_order(id)? {
            return Err(not_found("lab order", id));
        }
        info!(lab_order_id = id, "deleted lab order");
        Ok(())
    }

    // =========================================================================
    // Supplier and Purchasing Operations
    // =========================================================================

    pub fn add_supplier(&self, supplier: Supplier) -> ClinicResult<Supplier> {
        require_text("supplier name", &supplier.name)?;
        let db = self.db.lock()?;
        db.insert_supplier(&supplier)?;
        info!(supplier_id = %supplier.id, "added supplier");
        Ok(supplier)
    }

    pub fn list_suppliers(&self) -> ClinicResult<Vec<Supplier>> {
        let db = self.db.lock()?;
        Ok(db.list_suppliers()?)
    }

    pub fn get_supplier(&self, id: &str) -> ClinicResult<Supplier> {
        let db = self.db.lock()?;
        db.get_supplier(id)?
            .filter(|s| s.deleted_at.is_none())
            .ok_or_else(|| not_found("supplier", id))
    }

    pub fn update_supplier(&self, supplier: Supplier) -> ClinicResult<Supplier> {
        require_text("supplier name", &supplier.name)?;
        let db = self.db.lock()?;
        match db.get_supplier(&supplier.id)? {
            Some(existing) if existing.deleted_at.is_none() => {}
            _ => return Err(not_found("supplier", &supplier.id)),
        }
        db.update_supplier(&supplier)?;
        info!(supplier_id = %supplier.id, "updated supplier");
        Ok(supplier)
    }

    pub fn delete_supplier(&self, id: &str) -> ClinicResult<()> {
        let db = self.db.lock()?;
        if !db.soft_delete_supplier(id)? {
            return Err(not_found("supplier", id));
        }
        Ok(())
    }

    pub fn create_purchase_order(
        &self,
        supplier_id: &str,
        currency: &str,
        lines: Vec<PurchaseLine>,
    ) -> ClinicResult<PurchaseOrder> {
        let db = self.db.lock()?;
        Ok(Purchasing::new(&db, &self.rates).create_purchase_order(supplier_id, currency, lines)?)
    }

    /// Mark an order received and add its quantities to stock.
    pub fn receive_purchase_order(&self, id: &str) -> ClinicResult<PurchaseOrder> {
        let db = self.db.lock()?;
        Ok(Purchasing::new(&db, &self.rates).receive_purchase_order(id)?)
    }

    pub fn cancel_purchase_order(&self, id: &str) -> ClinicResult<PurchaseOrder> {
        let db = self.db.lock()?;
        Ok(Purchasing::new(&db, &self.rates).cancel_purchase_order(id)?)
    }

    pub fn record_supplier_payment(&self, order_id: &str, amount: f64) -> ClinicResult<PurchaseOrder> {
        let db = self.db.lock()?;
        Ok(Purchasing::new(&db, &self.rates).record_supplier_payment(order_id, amount)?)
    }

    pub fn supplier_balance(&self, supplier_id: &str) -> ClinicResult<SupplierBalance> {
        let db = self.db.lock()?;
        Ok(Purchasing::new(&db, &self.rates).supplier_balance(supplier_id)?)
    }

    pub fn purchase_orders(
        &self,
        supplier_id: Option<&str>,
        status: Option<PurchaseStatus>,
    ) -> ClinicResult<Vec<PurchaseOrder>> {
        let db = self.db.lock()?;
        Ok(db.list_purchase_orders(supplier_id, status)?)
    }

    // =========================================================================
    // Inventory Operations
    // =========================================================================

    pub fn add_inventory_item(&self, mut item: InventoryItem) -> ClinicResult<InventoryItem> {
        self.check_item(&mut item)?;
        let db = self.db.lock()?;
        db.insert_inventory_item(&item)?;
        info!(item_id = %item.id, name = %item.name, "added inventory item");
        Ok(item)
    }

    pub fn update_inventory_item(&self, mut item: InventoryItem) -> ClinicResult<InventoryItem> {
        self.check_item(&mut item)?;
        let db = self.db.lock()?;
        if !db.update_inventory_item(&item)? {
            return Err(not_found("inventory item", &item.id));
        }
        Ok(item)
    }

    fn check_item(&self, item: &mut InventoryItem) -> ClinicResult<()> {
        require_text("item name", &item.name)?;
        item.currency = item.currency.trim().to_uppercase();
        if !self.rates.knows(&item.currency) {
            return Err(pricing::PricingError::UnknownCurrency(item.currency.clone()).into());
        }
        for (field, value) in [
            ("unit price", item.unit_price),
            ("cost price", item.cost_price),
            ("stock", item.stock),
            ("reorder level", item.reorder_level),
        ] {
            if value.is_nan() || value < 0.0 {
                return Err(ClinicError::InvalidInput(format!("{} {}", field, value)));
            }
        }
        Ok(())
    }

    pub fn get_inventory_item(&self, id: &str) -> ClinicResult<InventoryItem> {
        let db = self.db.lock()?;
        db.get_inventory_item(id)?
            .ok_or_else(|| not_found("inventory item", id))
    }

    pub fn search_inventory(&self, query: &str, limit: usize) -> ClinicResult<Vec<InventoryItem>> {
        let db = self.db.lock()?;
        Ok(db.search_inventory(query, limit)?)
    }

    pub fn list_inventory(&self, active_only: bool) -> ClinicResult<Vec<InventoryItem>> {
        let db = self.db.lock()?;
        Ok(db.list_inventory_items(active_only)?)
    }

    pub fn low_stock_items(&self) -> ClinicResult<Vec<InventoryItem>> {
        let db = self.db.lock()?;
        Ok(db.list_low_stock_items()?)
    }

    /// In-stock items expiring within `days` of `today`.
    pub fn expiring_items(&self, today: NaiveDate, days: i64) -> ClinicResult<Vec<InventoryItem>> {
        let db = self.db.lock()?;
        Ok(db.list_expiring_items(today + chrono::Duration::days(days))?)
    }

    /// Manual stock correction. Returns the new stock level.
    pub fn adjust_stock(&self, id: &str, delta: f64) -> ClinicResult<f64> {
        let db = self.db.lock()?;
        let stock = db.adjust_stock(id, delta)?;
        info!(item_id = id, delta, stock, "adjusted stock");
        Ok(stock)
    }

    pub fn deactivate_inventory_item(&self, id: &str) -> ClinicResult<()> {
        let db = self.db.lock()?;
        if !db.deactivate_inventory_item(id)? {
            return Err(not_found("inventory item", id));
        }
        Ok(())
    }

    // =========================================================================
    // Drug Import Operations
    // =========================================================================

    /// Read a CSV export and plan the import without writing anything.
    pub fn plan_drug_import(&self, csv: &str, mode: StockMode) -> ClinicResult<ImportPlan> {
        let db = self.db.lock()?;
        Ok(DrugImporter::new(&db, &self.rates)
            .with_stock_mode(mode)
            .plan(csv)?)
    }

    pub fn apply_drug_import(&self, plan: &ImportPlan, mode: StockMode) -> ClinicResult<ImportSummary> {
        let db = self.db.lock()?;
        Ok(DrugImporter::new(&db, &self.rates)
            .with_stock_mode(mode)
            .apply(plan)?)
    }

    // =========================================================================
    // Expense Operations
    // =========================================================================

    pub fn record_expense(&self, expense: Expense) -> ClinicResult<Expense> {
        let db = self.db.lock()?;
        Ok(ExpenseBook::new(&db, &self.rates).record(expense)?)
    }

    pub fn update_expense(&self, expense: Expense) -> ClinicResult<Expense> {
        let db = self.db.lock()?;
        Ok(ExpenseBook::new(&db, &self.rates).update(expense)?)
    }

    pub fn delete_expense(&self, id: &str) -> ClinicResult<()> {
        let db = self.db.lock()?;
        if !db.soft_delete_expense(id)? {
            return Err(not_found("expense", id));
        }
        Ok(())
    }

    pub fn list_expenses(
        &self,
        from: NaiveDate,
        to: NaiveDate,
        category: Option<&str>,
    ) -> ClinicResult<Vec<Expense>> {
        let db = self.db.lock()?;
        Ok(db.list_expenses(from, to, category)?)
    }

    pub fn expense_summary(&self, from: NaiveDate, to: NaiveDate) -> ClinicResult<ExpenseSummary> {
        let db = self.db.lock()?;
        Ok(ExpenseBook::new(&db, &self.rates).summarize(from, to)?)
    }

    /// Store a scanned receipt and link it to the expense.
    pub fn attach_expense_receipt(
        &self,
        id: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> ClinicResult<Expense> {
        let db = self.db.lock()?;
        let mut expense = db.get_expense(id)?.ok_or_else(|| not_found("expense", id))?;
        let key = self.store.put(bytes, content_type)?;
        expense.receipt_key = Some(key);
        db.update_expense(&expense)?;
        info!(expense_id = id, "attached expense receipt");
        Ok(expense)
    }

    pub fn expenses_csv(&self, from: NaiveDate, to: NaiveDate) -> ClinicResult<String> {
        let expenses = self.list_expenses(from, to, None)?;
        Ok(export::expenses_csv(&expenses))
    }

    // =========================================================================
    // Sales Operations
    // =========================================================================

    pub fn create_quotation(&self, draft: &SaleDraft) -> ClinicResult<Sale> {
        let db = self.db.lock()?;
        Ok(SalesDesk::new(&db, &self.rates).create_quotation(draft)?)
    }

    pub fn open_sale(&self, draft: &SaleDraft) -> ClinicResult<Sale> {
        let db = self.db.lock()?;
        Ok(SalesDesk::new(&db, &self.rates).open_sale(draft)?)
    }

    pub fn convert_quotation(&self, quotation_id: &str) -> ClinicResult<Sale> {
        let db = self.db.lock()?;
        Ok(SalesDesk::new(&db, &self.rates).convert_quotation(quotation_id)?)
    }

    pub fn add_payment(&self, sale_id: &str, payment: Payment) -> ClinicResult<Sale> {
        let db = self.db.lock()?;
        Ok(SalesDesk::new(&db, &self.rates).add_payment(sale_id, payment)?)
    }

    /// Complete a sale: stock is decremented, a receipt number assigned and
    /// the sale appended to the ledger.
    pub fn complete_sale(&self, sale_id: &str, allow_credit: bool) -> ClinicResult<Sale> {
        let db = self.db.lock()?;
        Ok(SalesDesk::new(&db, &self.rates).complete_sale(sale_id, allow_credit)?)
    }

    pub fn void_sale(&self, sale_id: &str, reason: &str) -> ClinicResult<Sale> {
        let db = self.db.lock()?;
        Ok(SalesDesk::new(&db, &self.rates).void_sale(sale_id, reason)?)
    }

    pub fn get_sale(&self, id: &str) -> ClinicResult<Sale> {
        let db = self.db.lock()?;
        db.get_sale(id)?.ok_or_else(|| not_found("sale", id))
    }

    pub fn get_sale_by_receipt(&self, receipt_number: i64) -> ClinicResult<Sale> {
        let db = self.db.lock()?;
        db.get_sale_by_receipt(receipt_number)?
            .ok_or_else(|| not_found("receipt", &receipt_number.to_string()))
    }

    pub fn sales_report(&self, from: NaiveDate, to: NaiveDate) -> ClinicResult<SalesReport> {
        let db = self.db.lock()?;
        Ok(SalesDesk::new(&db, &self.rates).report(from, to)?)
    }

    pub fn sales_csv(&self, from: NaiveDate, to: NaiveDate) -> ClinicResult<String> {
        let report = self.sales_report(from, to)?;
        Ok(export::sales_csv(&report))
    }

    /// Receipt of a sale or quotation, ready to render.
    pub fn receipt(&self, sale_id: &str) -> ClinicResult<Receipt> {
        let db = self.db.lock()?;
        let sale = db.get_sale(sale_id)?.ok_or_else(|| not_found("sale", sale_id))?;
        let customer = match &sale.patient_id {
            Some(patient_id) => db.get_patient(patient_id)?.map(|p| p.name),
            None => None,
        }
        .or_else(|| sale.customer_name.clone());
        Ok(Receipt::build(
            &self.config.clinic,
            &sale,
            customer,
            &self.rates,
            &self.config.currency.receipt_currencies,
            self.config.receipts.footer.clone(),
        )?)
    }

    pub fn receipt_text(&self, sale_id: &str) -> ClinicResult<String> {
        Ok(self.receipt(sale_id)?.to_text())
    }

    pub fn receipt_html(&self, sale_id: &str) -> ClinicResult<String> {
        Ok(self.receipt(sale_id)?.to_html())
    }

    // =========================================================================
    // Referral Operations
    // =========================================================================

    pub fn create_referral(&self, letter: ReferralLetter) -> ClinicResult<ReferralLetter> {
        require_text("referred to", &letter.referred_to)?;
        require_text("reason", &letter.reason)?;
        let db = self.db.lock()?;
        match db.get_patient(&letter.patient_id)? {
            Some(patient) if !patient.is_deleted() => {}
            _ => return Err(not_found("patient", &letter.patient_id)),
        }
        db.get_doctor(&letter.doctor_id)?
            .ok_or_else(|| not_found("doctor", &letter.doctor_id))?;
        db.insert_referral(&letter)?;
        info!(referral_id = %letter.id, urgency = letter.urgency.as_str(), "created referral");
        Ok(letter)
    }

    pub fn update_referral(&self, letter: ReferralLetter) -> ClinicResult<ReferralLetter> {
        require_text("referred to", &letter.referred_to)?;
        require_text("reason", &letter.reason)?;
        let db = self.db.lock()?;
        if !db.update_referral(&letter)? {
            return Err(not_found("referral", &letter.id));
        }
        Ok(letter)
    }

    pub fn get_referral(&self, id: &str) -> ClinicResult<ReferralLetter> {
        let db = self.db.lock()?;
        db.get_referral(id)?.ok_or_else(|| not_found("referral", id))
    }

    pub fn referrals_for_patient(&self, patient_id: &str) -> ClinicResult<Vec<ReferralLetter>> {
        let db = self.db.lock()?;
        Ok(db.list_referrals_for_patient(patient_id)?)
    }

    pub fn delete_referral(&self, id: &str) -> ClinicResult<()> {
        let db = self.db.lock()?;
        if !db.soft_delete_referral(id)? {
            return Err(not_found("referral", id));
        }
        Ok(())
    }

    fn referral_parts(&self, id: &str) -> ClinicResult<(ReferralLetter, Patient, Doctor)> {
        let db = self.db.lock()?;
        let letter = db.get_referral(id)?.ok_or_else(|| not_found("referral", id))?;
        let patient = db
            .get_patient(&letter.patient_id)?
            .ok_or_else(|| not_found("patient", &letter.patient_id))?;
        let doctor = db
            .get_doctor(&letter.doctor_id)?
            .ok_or_else(|| not_found("doctor", &letter.doctor_id))?;
        Ok((letter, patient, doctor))
    }

    pub fn referral_text(&self, id: &str) -> ClinicResult<String> {
        let (letter, patient, doctor) = self.referral_parts(id)?;
        Ok(export::referral_text(&self.config.clinic, &letter, &patient, &doctor))
    }

    pub fn referral_html(&self, id: &str) -> ClinicResult<String> {
        let (letter, patient, doctor) = self.referral_parts(id)?;
        Ok(export::referral_html(&self.config.clinic, &letter, &patient, &doctor))
    }

    // =========================================================================
    // Ledger Operations
    // =========================================================================

    /// Walk the sales ledger and recompute every hash.
    pub fn verify_ledger(&self) -> ClinicResult<Verification> {
        let db = self.db.lock()?;
        Ok(Ledger::new(&db).verify()?)
    }

    pub fn ledger_entries_for_sale(&self, sale_id: &str) -> ClinicResult<Vec<db::LedgerEntry>> {
        let db = self.db.lock()?;
        Ok(db.list_ledger_entries_for_sale(sale_id)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{DraftLine, Urgency};

    fn core() -> ClinicCore {
        let mut config = ClinicConfig::default();
        config.clinic.name = "Cedar Clinic".into();
        config.currency.rates.insert("LBP".into(), 1.0 / 89_500.0);
        config.currency.receipt_currencies = vec!["LBP".into()];
        config.receipts.footer = Some("Thank you".into());
        ClinicCore::open_in_memory(config).unwrap()
    }

    fn stocked_item(core: &ClinicCore, name: &str, price: f64, stock: f64) -> InventoryItem {
        let mut item = InventoryItem::new(name.into(), price, "usd".into());
        item.stock = stock;
        core.add_inventory_item(item).unwrap()
    }

    #[test]
    fn test_patient_lifecycle() {
        let core = core();
        let patient = core.create_patient(Patient::new("Rami Khoury".into())).unwrap();
        assert_eq!(core.search_patients("khoury", 10).unwrap().len(), 1);

        core.delete_patient(&patient.id).unwrap();
        assert!(core.list_patients().unwrap().is_empty());
        assert!(core.get_patient(&patient.id).unwrap().is_deleted());
        assert!(matches!(
            core.delete_patient(&patient.id),
            Err(ClinicError::NotFound(_))
        ));

        core.restore_patient(&patient.id).unwrap();
        assert_eq!(core.list_patients().unwrap().len(), 1);
    }

    #[test]
    fn test_blank_names_rejected() {
        let core = core();
        assert!(matches!(
            core.create_patient(Patient::new("  ".into())),
            Err(ClinicError::InvalidInput(_))
        ));
        assert!(matches!(
            core.add_inventory_item(InventoryItem::new("Gauze".into(), 1.0, "GBP".into())),
            Err(ClinicError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_booking_conflict_maps_to_conflict() {
        let core = core();
        let patient = core.create_patient(Patient::new("A".into())).unwrap();
        let other = core.create_patient(Patient::new("B".into())).unwrap();
        let doctor = core.add_doctor(Doctor::new("Nour".into())).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();

        let request = |patient_id: &str| BookingRequest {
            patient_id: patient_id.into(),
            doctor_id: doctor.id.clone(),
            start,
            end: start + chrono::Duration::minutes(30),
            reason: None,
        };
        core.book_appointment(request(&patient.id)).unwrap();
        assert!(matches!(
            core.book_appointment(request(&other.id)),
            Err(ClinicError::Conflict(_))
        ));
    }

    #[test]
    fn test_deleted_appointment_frees_the_slot() {
        let core = core();
        let patient = core.create_patient(Patient::new("A".into())).unwrap();
        let other = core.create_patient(Patient::new("B".into())).unwrap();
        let doctor = core.add_doctor(Doctor::new("Nour".into())).unwrap();
        let start = NaiveDate::from_ymd_opt(2024, 3, 4)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        let request = |patient_id: &str| BookingRequest {
            patient_id: patient_id.into(),
            doctor_id: doctor.id.clone(),
            start,
            end: start + chrono::Duration::minutes(30),
            reason: None,
        };

        let first = core.book_appointment(request(&patient.id)).unwrap();
        core.delete_appointment(&first.id).unwrap();
        assert!(matches!(
            core.get_appointment(&first.id),
            Ok(appt) if appt.deleted_at.is_some()
        ));
        assert!(matches!(
            core.delete_appointment(&first.id),
            Err(ClinicError::NotFound(_))
        ));
        assert!(core.book_appointment(request(&other.id)).is_ok());
    }

    #[test]
    fn test_supplier_update_and_delete() {
        let core = core();
        let mut supplier = core.add_supplier(Supplier::new("Mediphar".into())).unwrap();

        supplier.phone = Some("+961 1 123456".into());
        core.update_supplier(supplier.clone()).unwrap();
        assert_eq!(
            core.get_supplier(&supplier.id).unwrap().phone.as_deref(),
            Some("+961 1 123456")
        );

        supplier.name = "  ".into();
        assert!(matches!(
            core.update_supplier(supplier.clone()),
            Err(ClinicError::InvalidInput(_))
        ));

        core.delete_supplier(&supplier.id).unwrap();
        assert!(matches!(
            core.get_supplier(&supplier.id),
            Err(ClinicError::NotFound(_))
        ));
        supplier.name = "Mediphar SAL".into();
        assert!(matches!(
            core.update_supplier(supplier),
            Err(ClinicError::NotFound(_))
        ));
    }

    #[test]
    fn test_delete_lab_order_and_prescription() {
        let core = core();
        let patient = core.create_patient(Patient::new("Lina".into())).unwrap();
        let doctor = core.add_doctor(Doctor::new("Karam".into())).unwrap();

        let order = core
            .order_lab(LabRequest {
                patient_id: patient.id.clone(),
                doctor_id: Some(doctor.id.clone()),
                test_name: "CBC".into(),
                lab_name: None,
                price: 15.0,
            })
            .unwrap();
        core.delete_lab_order(&order.id).unwrap();
        assert!(core.lab_orders(Some(&patient.id), None).unwrap().is_empty());
        assert!(matches!(
            core.delete_lab_order(&order.id),
            Err(ClinicError::NotFound(_))
        ));

        let rx = core
            .create_prescription(
                &patient.id,
                &doctor.id,
                vec![PrescriptionItem::new("Rest".into(), 1.0)],
                None,
            )
            .unwrap();
        core.begin_prescription_edit(&rx.id, "alice").unwrap();
        assert!(matches!(
            core.delete_prescription(&rx.id, Some("bob")),
            Err(ClinicError::Conflict(_))
        ));
        core.delete_prescription(&rx.id, Some("alice")).unwrap();
        assert!(core.prescriptions_for_patient(&patient.id).unwrap().is_empty());
    }

    #[test]
    fn test_sale_receipt_shows_patient_and_alternate_currency() {
        let core = core();
        let patient = core.create_patient(Patient::new("Maya Saad".into())).unwrap();
        let item = stocked_item(&core, "Panadol 500mg", 2.0, 10.0);

        let mut draft = SaleDraft::new("USD").line(&item.id, 2.0);
        draft.patient_id = Some(patient.id.clone());
        let sale = core.open_sale(&draft).unwrap();
        core.add_payment(&sale.id, Payment::cash(4.0, "USD")).unwrap();
        let sale = core.complete_sale(&sale.id, false).unwrap();

        let text = core.receipt_text(&sale.id).unwrap();
        assert!(text.contains("Cedar Clinic"));
        assert!(text.contains("Receipt #1"));
        assert!(text.contains("Customer: Maya Saad"));
        assert!(text.contains("Total in LBP"));
        assert!(text.contains("Thank you"));
        assert_eq!(core.get_inventory_item(&item.id).unwrap().stock, 8.0);
        assert!(core.verify_ledger().unwrap().is_intact());
    }

    #[test]
    fn test_dispense_prescription() {
        let core = core();
        let patient = core.create_patient(Patient::new("Lina".into())).unwrap();
        let doctor = core.add_doctor(Doctor::new("Karam".into())).unwrap();
        let item = stocked_item(&core, "Amoxicillin 500mg", 0.5, 100.0);

        let mut stocked = PrescriptionItem::new("Amoxicillin 500mg".into(), 21.0);
        stocked.item_id = Some(item.id.clone());
        let rx = core
            .create_prescription(&patient.id, &doctor.id, vec![stocked], None)
            .unwrap();

        let sale = core.dispense_prescription(&rx.id, None, None).unwrap();
        assert_eq!(sale.items.len(), 1);
        assert_eq!(sale.totals.total, 10.5);
        assert_eq!(
            core.get_prescription(&rx.id).unwrap().status,
            models::PrescriptionStatus::Dispensed
        );
        // A second dispense is refused and opens no sale
        assert!(matches!(
            core.dispense_prescription(&rx.id, None, None),
            Err(ClinicError::Conflict(_))
        ));
    }

    #[test]
    fn test_dispense_refused_while_prescription_is_edited() {
        let core = core();
        let patient = core.create_patient(Patient::new("Lina".into())).unwrap();
        let doctor = core.add_doctor(Doctor::new("Karam".into())).unwrap();
        let item = stocked_item(&core, "Amoxicillin 500mg", 0.5, 100.0);

        let mut stocked = PrescriptionItem::new("Amoxicillin 500mg".into(), 21.0);
        stocked.item_id = Some(item.id.clone());
        let rx = core
            .create_prescription(&patient.id, &doctor.id, vec![stocked], None)
            .unwrap();
        core.begin_prescription_edit(&rx.id, "alice").unwrap();

        assert!(matches!(
            core.dispense_prescription(&rx.id, None, Some("bob")),
            Err(ClinicError::Conflict(_))
        ));
        assert!(matches!(
            core.cancel_prescription(&rx.id, None),
            Err(ClinicError::Conflict(_))
        ));
        assert_eq!(
            core.get_prescription(&rx.id).unwrap().status,
            models::PrescriptionStatus::Active
        );

        let sale = core.dispense_prescription(&rx.id, None, Some("alice")).unwrap();
        assert_eq!(sale.items.len(), 1);
        let rx = core.get_prescription(&rx.id).unwrap();
        assert_eq!(rx.status, models::PrescriptionStatus::Dispensed);
        assert!(rx.editing_by.is_none());
    }

    #[test]
    fn test_dispense_without_stocked_items_rolls_back() {
        let core = core();
        let patient = core.create_patient(Patient::new("Lina".into())).unwrap();
        let doctor = core.add_doctor(Doctor::new("Karam".into())).unwrap();
        let rx = core
            .create_prescription(
                &patient.id,
                &doctor.id,
                vec![PrescriptionItem::new("Rest".into(), 1.0)],
                None,
            )
            .unwrap();

        assert!(matches!(
            core.dispense_prescription(&rx.id, None, None),
            Err(ClinicError::InvalidInput(_))
        ));
        assert_eq!(
            core.get_prescription(&rx.id).unwrap().status,
            models::PrescriptionStatus::Active
        );
    }

    #[test]
    fn test_referral_print() {
        let core = core();
        let patient = core.create_patient(Patient::new("Omar".into())).unwrap();
        let doctor = core.add_doctor(Doctor::new("Karam".into())).unwrap();

        let mut letter = ReferralLetter::new(
            patient.id.clone(),
            doctor.id.clone(),
            "Dr. Haddad".into(),
            "Chest pain".into(),
        );
        letter.urgency = Urgency::Urgent;
        let letter = core.create_referral(letter).unwrap();

        assert_eq!(core.referrals_for_patient(&patient.id).unwrap().len(), 1);
        let text = core.referral_text(&letter.id).unwrap();
        assert!(text.starts_with("Cedar Clinic"));
        assert!(text.contains("URGENT REFERRAL"));
        assert!(core.referral_html(&letter.id).unwrap().contains("Chest pain"));

        let orphan = ReferralLetter::new("nobody".into(), doctor.id, "X".into(), "Y".into());
        assert!(matches!(
            core.create_referral(orphan),
            Err(ClinicError::NotFound(_))
        ));
    }

    #[test]
    fn test_expense_receipt_attachment() {
        let core = core();
        let date = NaiveDate::from_ymd_opt(2024, 5, 1).unwrap();
        let expense = core
            .record_expense(Expense::new("rent".into(), 500.0, "USD".into(), date))
            .unwrap();

        let updated = core
            .attach_expense_receipt(&expense.id, b"scan", "image/png")
            .unwrap();
        let key = updated.receipt_key.unwrap();
        assert_eq!(core.store.get(&key).unwrap(), b"scan".to_vec());

        let csv = core.expenses_csv(date, date).unwrap();
        assert!(csv.contains("2024-05-01,rent,,500.00,USD,"));
    }

    #[test]
    fn test_import_through_facade() {
        let core = core();
        let plan = core
            .plan_drug_import("name,qty,price\nCetirizine 10mg,30,4\n", StockMode::Add)
            .unwrap();
        let summary = core.apply_drug_import(&plan, StockMode::Add).unwrap();
        assert_eq!(summary.created, 1);
        assert_eq!(core.search_inventory("cetirizine", 5).unwrap().len(), 1);
    }

    #[test]
    fn test_insufficient_stock_is_conflict() {
        let core = core();
        let item = stocked_item(&core, "Syrup", 3.0, 1.0);
        let sale = core
            .open_sale(&SaleDraft {
                lines: vec![DraftLine {
                    item_id: item.id.clone(),
                    quantity: 2.0,
                    discount_percent: 0.0,
                }],
                ..SaleDraft::new("USD")
            })
            .unwrap();
        assert!(matches!(
            core.complete_sale(&sale.id, true),
            Err(ClinicError::Conflict(_))
        ));
    }
}
