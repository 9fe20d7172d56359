//! Lab orders and their result files.

use thiserror::Error;
use tracing::{info, warn};

use crate::db::{Database, DbError};
use crate::models::{LabOrder, LabStatus};
use crate::storage::{ObjectStore, StorageError};

/// Lab errors.
#[derive(Error, Debug)]
pub enum LabError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid lab order: {0}")]
    Invalid(String),

    #[error("Cannot move lab order from {from:?} to {to:?}")]
    InvalidTransition { from: LabStatus, to: LabStatus },
}

pub type LabResult<T> = Result<T, LabError>;

/// Fields for a new lab order.
#[derive(Debug, Clone, Default)]
pub struct LabRequest {
    pub patient_id: String,
    pub doctor_id: Option<String>,
    pub test_name: String,
    pub lab_name: Option<String>,
    pub price: f64,
}

/// Lab workflow bound to a database and an object store.
pub struct LabDesk<'a> {
    db: &'a Database,
    store: &'a dyn ObjectStore,
}

impl<'a> LabDesk<'a> {
    pub fn new(db: &'a Database, store: &'a dyn ObjectStore) -> Self {
        Self { db, store }
    }

    pub fn order(&self, request: LabRequest) -> LabResult<LabOrder> {
        if request.test_name.trim().is_empty() {
            return Err(LabError::Invalid("test name is empty".into()));
        }
        if request.price.is_nan() || request.price < 0.0 {
            return Err(LabError::Invalid(format!("price {}", request.price)));
        }
        self.db
            .get_patient(&request.patient_id)?
            .filter(|p| !p.is_deleted())
            .ok_or_else(|| LabError::NotFound(format!("patient {}", request.patient_id)))?;
        if let Some(doctor_id) = &request.doctor_id {
            if self.db.get_doctor(doctor_id)?.is_none() {
                return Err(LabError::NotFound(format!("doctor {}", doctor_id)));
            }
        }

        let mut order = LabOrder::new(request.patient_id, request.test_name.trim().to_string());
        order.doctor_id = request.doctor_id;
        order.lab_name = request.lab_name;
        order.price = request.price;
        self.db.insert_lab_order(&order)?;
        info!(lab_order_id = %order.id, test = %order.test_name, "ordered lab test");
        Ok(order)
    }

    /// Move an order along its lifecycle; `result` is recorded on completion.
    pub fn advance(
        &self,
        id: &str,
        to: LabStatus,
        result: Option<String>,
    ) -> LabResult<LabOrder> {
        let mut order = self.load(id)?;
        if !order.status.can_transition_to(to) {
            warn!(lab_order_id = id, from = order.status.as_str(), to = to.as_str(), "rejected lab transition");
            return Err(LabError::InvalidTransition {
                from: order.status,
                to,
            });
        }

        order.status = to;
        if to == LabStatus::Completed {
            order.completed_at = Some(chrono::Utc::now().to_rfc3339());
            if result.is_some() {
                order.result = result;
            }
        }
        self.db.update_lab_order(&order)?;
        info!(lab_order_id = id, status = to.as_str(), "lab order advanced");
        Ok(order)
    }

    /// Store a result file and link it to the order.
    pub fn attach_result_file(
        &self,
        id: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> LabResult<LabOrder> {
        let mut order = self.load(id)?;
        if order.status == LabStatus::Cancelled {
            return Err(LabError::InvalidTransition {
                from: order.status,
                to: order.status,
            });
        }

        let key = self.store.put(bytes, content_type)?;
        if !order.attachments.contains(&key) {
            order.attachments.push(key.clone());
            self.db.update_lab_order(&order)?;
        }
        info!(lab_order_id = id, %key, size = bytes.len(), "attached lab result file");
        Ok(order)
    }

    /// Bytes of a file attached to the order.
    pub fn result_file(&self, id: &str, key: &str) -> LabResult<Vec<u8>> {
        let order = self.load(id)?;
        if !order.attachments.iter().any(|k| k == key) {
            return Err(LabError::NotFound(format!("attachment {} on {}", key, id)));
        }
        Ok(self.store.get(key)?)
    }

    fn load(&self, id: &str) -> LabResult<LabOrder> {
        self.db
            .get_lab_order(id)?
            .filter(|o| o.deleted_at.is_none())
            .ok_or_else(|| LabError::NotFound(format!("lab order {}", id)))
    }
}
