//! Appointment booking integration tests.

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime};
use clinic_core::config::ScheduleConfig;
use clinic_core::db::Database;
use clinic_core::models::{AppointmentStatus, Doctor, Patient};
use clinic_core::scheduling::{BookingRequest, Scheduler, SchedulingError, TimeSlot};

fn monday() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
}

fn at(h: u32, m: u32) -> NaiveDateTime {
    monday().and_hms_opt(h, m, 0).unwrap()
}

fn schedule() -> ScheduleConfig {
    ScheduleConfig {
        break_start: NaiveTime::from_hms_opt(12, 0, 0),
        break_end: NaiveTime::from_hms_opt(13, 0, 0),
        ..ScheduleConfig::default()
    }
}

struct Clinic {
    db: Database,
    doctor: String,
    patients: Vec<String>,
}

fn clinic(patients: usize) -> Clinic {
    let db = Database::open_in_memory().unwrap();
    let doctor = Doctor::new("Karam".into());
    db.insert_doctor(&doctor).unwrap();
    let patients = (0..patients)
        .map(|i| {
            let patient = Patient::new(format!("Patient {}", i));
            db.insert_patient(&patient).unwrap();
            patient.id
        })
        .collect();
    Clinic {
        db,
        doctor: doctor.id,
        patients,
    }
}

fn request(clinic: &Clinic, patient: usize, start: NaiveDateTime, minutes: i64) -> BookingRequest {
    BookingRequest {
        patient_id: clinic.patients[patient].clone(),
        doctor_id: clinic.doctor.clone(),
        start,
        end: start + Duration::minutes(minutes),
        reason: None,
    }
}

#[test]
fn test_full_day_booking() {
    let clinic = clinic(14);
    let schedule = schedule();
    let scheduler = Scheduler::new(&clinic.db, &schedule);

    // 9-12 and 13-17 at 30 minutes
    let slots = scheduler.available_slots(&clinic.doctor, monday()).unwrap();
    assert_eq!(slots.len(), 14);
    assert!(slots.iter().all(|s| s.start.time() < NaiveTime::from_hms_opt(12, 0, 0).unwrap()
        || s.start.time() >= NaiveTime::from_hms_opt(13, 0, 0).unwrap()));

    for (i, slot) in slots.iter().enumerate() {
        scheduler.book(request(&clinic, i, slot.start, 30)).unwrap();
    }
    assert!(scheduler.available_slots(&clinic.doctor, monday()).unwrap().is_empty());
    assert_eq!(clinic.db.list_appointments_on(monday(), None).unwrap().len(), 14);
}

#[test]
fn test_cancelled_slot_is_freed() {
    let clinic = clinic(2);
    let schedule = schedule();
    let scheduler = Scheduler::new(&clinic.db, &schedule);

    let first = scheduler.book(request(&clinic, 0, at(10, 0), 30)).unwrap();
    let err = scheduler
        .book(request(&clinic, 1, at(10, 15), 30))
        .unwrap_err();
    assert!(matches!(err, SchedulingError::DoctorBusy(id) if id == first.id));

    scheduler.cancel(&first.id).unwrap();
    let second = scheduler.book(request(&clinic, 1, at(10, 0), 30)).unwrap();
    assert_eq!(second.status, AppointmentStatus::Scheduled);

    let cancelled = clinic
        .db
        .list_appointments_on(monday(), Some(AppointmentStatus::Cancelled))
        .unwrap();
    assert_eq!(cancelled.len(), 1);
}

#[test]
fn test_touching_appointments_allowed() {
    let clinic = clinic(2);
    let schedule = schedule();
    let scheduler = Scheduler::new(&clinic.db, &schedule);

    scheduler.book(request(&clinic, 0, at(9, 0), 30)).unwrap();
    scheduler.book(request(&clinic, 1, at(9, 30), 30)).unwrap();
}

#[test]
fn test_patient_cannot_be_double_booked() {
    let clinic = clinic(1);
    let other = Doctor::new("Nour".into());
    clinic.db.insert_doctor(&other).unwrap();
    let schedule = schedule();
    let scheduler = Scheduler::new(&clinic.db, &schedule);

    scheduler.book(request(&clinic, 0, at(11, 0), 30)).unwrap();
    let mut with_other = request(&clinic, 0, at(11, 0), 30);
    with_other.doctor_id = other.id;
    assert!(matches!(
        scheduler.book(with_other),
        Err(SchedulingError::PatientBusy(_))
    ));
}

#[test]
fn test_reschedule_and_nearest_slot() {
    let clinic = clinic(2);
    let schedule = schedule();
    let scheduler = Scheduler::new(&clinic.db, &schedule);

    let a = scheduler.book(request(&clinic, 0, at(14, 0), 30)).unwrap();
    scheduler.book(request(&clinic, 1, at(14, 30), 30)).unwrap();

    // 14:00 and 14:30 are taken; 13:30 and 15:00 tie, the earlier wins
    let nearest = scheduler
        .find_nearest_slot(&clinic.doctor, at(14, 15), 60)
        .unwrap();
    assert_eq!(nearest, Some(TimeSlot::new(at(13, 30), at(14, 0))));

    let moved = scheduler.reschedule(&a.id, at(15, 0), at(15, 30)).unwrap();
    assert_eq!(moved.start, at(15, 0));
    let slots = scheduler.available_slots(&clinic.doctor, monday()).unwrap();
    assert!(slots.contains(&TimeSlot::new(at(14, 0), at(14, 30))));
    assert!(!slots.contains(&TimeSlot::new(at(15, 0), at(15, 30))));
}

#[test]
fn test_completed_appointment_is_final() {
    let clinic = clinic(1);
    let schedule = schedule();
    let scheduler = Scheduler::new(&clinic.db, &schedule);

    let appointment = scheduler.book(request(&clinic, 0, at(9, 0), 30)).unwrap();
    scheduler.complete(&appointment.id).unwrap();
    assert!(matches!(
        scheduler.cancel(&appointment.id),
        Err(SchedulingError::InvalidTransition { .. })
    ));
    assert!(matches!(
        scheduler.reschedule(&appointment.id, at(10, 0), at(10, 30)),
        Err(SchedulingError::InvalidTransition { .. })
    ));
}

#[test]
fn test_weekend_and_after_hours_rejected() {
    let clinic = clinic(1);
    let schedule = schedule();
    let scheduler = Scheduler::new(&clinic.db, &schedule);

    let saturday = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
    assert!(scheduler.available_slots(&clinic.doctor, saturday).unwrap().is_empty());
    assert!(matches!(
        scheduler.book(request(&clinic, 0, saturday.and_hms_opt(10, 0, 0).unwrap(), 30)),
        Err(SchedulingError::OutsideWorkingHours(_))
    ));
    assert!(matches!(
        scheduler.book(request(&clinic, 0, at(16, 45), 30)),
        Err(SchedulingError::OutsideWorkingHours(_))
    ));
    assert!(matches!(
        scheduler.book(request(&clinic, 0, at(10, 0), 0)),
        Err(SchedulingError::InvalidRange { .. })
    ));
}
