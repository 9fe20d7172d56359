//! Domain models for the clinic.

mod appointment;
mod expense;
mod inventory;
mod lab;
mod patient;
mod prescription;
mod sale;

pub use appointment::*;
pub use expense::*;
pub use inventory::*;
pub use lab::*;
pub use patient::*;
pub use prescription::*;
pub use sale::*;
