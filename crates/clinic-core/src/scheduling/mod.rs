//! Appointment scheduling.
//!
//! Slots are generated from the clinic's working hours and filtered against
//! booked appointments. Two intervals overlap when each starts before the
//! other ends, so back-to-back appointments are allowed.

mod scheduler;
mod slots;

pub use scheduler::{BookingRequest, Scheduler};
pub use slots::{available_slots, generate_daily_slots, TimeSlot};

use chrono::NaiveDateTime;
use thiserror::Error;

use crate::db::DbError;
use crate::models::AppointmentStatus;

/// Scheduling errors.
#[derive(Error, Debug)]
pub enum SchedulingError {
    #[error("Database error: {0}")]
    Database(#[from] DbError),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid time range: {start} - {end}")]
    InvalidRange {
        start: NaiveDateTime,
        end: NaiveDateTime,
    },

    #[error("Outside working hours: {0}")]
    OutsideWorkingHours(String),

    #[error("Doctor {0} is not accepting appointments")]
    DoctorInactive(String),

    #[error("Doctor already booked by appointment {0}")]
    DoctorBusy(String),

    #[error("Patient already booked by appointment {0}")]
    PatientBusy(String),

    #[error("Cannot move appointment from {from:?} to {to:?}")]
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
}

pub type SchedulingResult<T> = Result<T, SchedulingError>;
