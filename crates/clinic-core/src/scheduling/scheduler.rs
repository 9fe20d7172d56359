//! Booking and appointment lifecycle.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::slots::{available_slots, TimeSlot};
use super::{SchedulingError, SchedulingResult};
use crate::config::ScheduleConfig;
use crate::db::Database;
use crate::models::{Appointment, AppointmentStatus};

/// A request to book an appointment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct BookingRequest {
    pub patient_id: String,
    pub doctor_id: String,
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
    pub reason: Option<String>,
}

/// Books appointments against the clinic's working hours.
pub struct Scheduler<'a> {
    db: &'a Database,
    schedule: &'a ScheduleConfig,
}

impl<'a> Scheduler<'a> {
    pub fn new(db: &'a Database, schedule: &'a ScheduleConfig) -> Self {
        Self { db, schedule }
    }

    /// Validate and store a new appointment.
    pub fn book(&self, request: BookingRequest) -> SchedulingResult<Appointment> {
        let slot = TimeSlot::new(request.start, request.end);
        self.check_range(&slot)?;

        let doctor = self
            .db
            .get_doctor(&request.doctor_id)?
            .ok_or_else(|| SchedulingError::NotFound(format!("doctor {}", request.doctor_id)))?;
        if !doctor.active {
            return Err(SchedulingError::DoctorInactive(doctor.id));
        }
        match self.db.get_patient(&request.patient_id)? {
            Some(patient) if !patient.is_deleted() => {}
            _ => {
                return Err(SchedulingError::NotFound(format!(
                    "patient {}",
                    request.patient_id
                )))
            }
        }

        let mut appointment =
            Appointment::new(request.patient_id, request.doctor_id, slot.start, slot.end);
        appointment.reason = request.reason;

        self.db.atomically(|db| {
            self.check_free(db, &appointment, None)?;
            db.insert_appointment(&appointment)?;
            Ok::<_, SchedulingError>(())
        })?;

        info!(
            appointment_id = %appointment.id,
            doctor_id = %appointment.doctor_id,
            start = %appointment.start,
            "booked appointment"
        );
        Ok(appointment)
    }

    /// Move a scheduled appointment to a new time.
    pub fn reschedule(
        &self,
        id: &str,
        new_start: NaiveDateTime,
        new_end: NaiveDateTime,
    ) -> SchedulingResult<Appointment> {
        let mut appointment = self.load(id)?;
        if appointment.status != AppointmentStatus::Scheduled {
            return Err(SchedulingError::InvalidTransition {
                from: appointment.status,
                to: AppointmentStatus::Scheduled,
            });
        }

        let slot = TimeSlot::new(new_start, new_end);
        self.check_range(&slot)?;
        appointment.start = slot.start;
        appointment.end = slot.end;

        self.db.atomically(|db| {
            self.check_free(db, &appointment, Some(id))?;
            db.update_appointment(&appointment)?;
            Ok::<_, SchedulingError>(())
        })?;

        info!(appointment_id = %id, start = %new_start, "rescheduled appointment");
        Ok(appointment)
    }

    pub fn cancel(&self, id: &str) -> SchedulingResult<Appointment> {
        self.transition(id, AppointmentStatus::Cancelled)
    }

    pub fn complete(&self, id: &str) -> SchedulingResult<Appointment> {
        self.transition(id, AppointmentStatus::Completed)
    }

    pub fn mark_no_show(&self, id: &str) -> SchedulingResult<Appointment> {
        self.transition(id, AppointmentStatus::NoShow)
    }

    /// Free slots of a doctor on one day.
    pub fn available_slots(&self, doctor_id: &str, date: NaiveDate) -> SchedulingResult<Vec<TimeSlot>> {
        let day_start = date.and_time(chrono::NaiveTime::MIN);
        let day_end = day_start + Duration::days(1);
        let booked = self
            .db
            .list_appointments_for_doctor(doctor_id, &day_start, &day_end)?;
        let free = available_slots(&booked, date, self.schedule);
        debug!(doctor_id, %date, free = free.len(), "computed available slots");
        Ok(free)
    }

    /// The free slot starting closest to `preferred`, at most
    /// `flexibility_minutes` away. Ties go to the earlier slot.
    pub fn find_nearest_slot(
        &self,
        doctor_id: &str,
        preferred: NaiveDateTime,
        flexibility_minutes: i64,
    ) -> SchedulingResult<Option<TimeSlot>> {
        let flexibility = Duration::minutes(flexibility_minutes.max(0));
        let earliest = preferred - flexibility;
        let latest = preferred + flexibility;

        let mut best: Option<(i64, TimeSlot)> = None;
        let mut day = earliest.date();
        while day <= latest.date() {
            for slot in self.available_slots(doctor_id, day)? {
                if slot.start < earliest || slot.start > latest {
                    continue;
                }
                let distance = (slot.start - preferred).num_seconds().abs();
                let better = match &best {
                    None => true,
                    Some((d, s)) => distance < *d || (distance == *d && slot.start < s.start),
                };
                if better {
                    best = Some((distance, slot));
                }
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        Ok(best.map(|(_, slot)| slot))
    }

    fn transition(&self, id: &str, to: AppointmentStatus) -> SchedulingResult<Appointment> {
        let mut appointment = self.load(id)?;
        if appointment.status != AppointmentStatus::Scheduled {
            warn!(appointment_id = %id, from = ?appointment.status, to = ?to, "rejected status change");
            return Err(SchedulingError::InvalidTransition {
                from: appointment.status,
                to,
            });
        }
        appointment.status = to;
        self.db.update_appointment(&appointment)?;
        info!(appointment_id = %id, status = to.as_str(), "appointment status changed");
        Ok(appointment)
    }

    fn load(&self, id: &str) -> SchedulingResult<Appointment> {
        match self.db.get_appointment(id)? {
            Some(appointment) if appointment.deleted_at.is_none() => Ok(appointment),
            _ => Err(SchedulingError::NotFound(format!("appointment {}", id))),
        }
    }

    /// End after start, inside opening hours of a working day, clear of the break.
    fn check_range(&self, slot: &TimeSlot) -> SchedulingResult<()> {
        if slot.end <= slot.start {
            return Err(SchedulingError::InvalidRange {
                start: slot.start,
                end: slot.end,
            });
        }

        let date = slot.start.date();
        if !self.schedule.is_working_day(date.weekday()) {
            return Err(SchedulingError::OutsideWorkingHours(format!(
                "{} is not a working day",
                date.weekday()
            )));
        }
        if slot.start < date.and_time(self.schedule.open)
            || slot.end > date.and_time(self.schedule.close)
        {
            return Err(SchedulingError::OutsideWorkingHours(format!(
                "{} - {} is outside {} - {}",
                slot.start.time(),
                slot.end.time(),
                self.schedule.open,
                self.schedule.close
            )));
        }
        if let (Some(start), Some(end)) = (self.schedule.break_start, self.schedule.break_end) {
            if slot.overlaps(&TimeSlot::new(date.and_time(start), date.and_time(end))) {
                return Err(SchedulingError::OutsideWorkingHours(format!(
                    "{} - {} overlaps the break",
                    slot.start.time(),
                    slot.end.time()
                )));
            }
        }
        Ok(())
    }

    /// Neither the doctor nor the patient may be double-booked.
    fn check_free(
        &self,
        db: &Database,
        appointment: &Appointment,
        exclude: Option<&str>,
    ) -> SchedulingResult<()> {
        let clashes = |booked: Vec<Appointment>| {
            booked
                .into_iter()
                .find(|a| a.blocks_schedule() && Some(a.id.as_str()) != exclude)
        };

        let doctor_booked = db.list_appointments_for_doctor(
            &appointment.doctor_id,
            &appointment.start,
            &appointment.end,
        )?;
        if let Some(existing) = clashes(doctor_booked) {
            warn!(doctor_id = %appointment.doctor_id, existing = %existing.id, "doctor slot conflict");
            return Err(SchedulingError::DoctorBusy(existing.id));
        }

        let patient_booked = db.list_appointments_for_patient_between(
            &appointment.patient_id,
            &appointment.start,
            &appointment.end,
        )?;
        if let Some(existing) = clashes(patient_booked) {
            warn!(patient_id = %appointment.patient_id, existing = %existing.id, "patient slot conflict");
            return Err(SchedulingError::PatientBusy(existing.id));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Doctor, Patient};
    use chrono::NaiveTime;

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 3, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    struct Fixture {
        db: Database,
        schedule: ScheduleConfig,
        patient: Patient,
        doctor: Doctor,
    }

    impl Fixture {
        fn new() -> Self {
            let db = Database::open_in_memory().unwrap();
            let patient = Patient::new("Maya".into());
            let doctor = Doctor::new("Dr. Khoury".into());
            db.insert_patient(&patient).unwrap();
            db.insert_doctor(&doctor).unwrap();
            Self {
                db,
                schedule: ScheduleConfig::default(),
                patient,
                doctor,
            }
        }

        fn scheduler(&self) -> Scheduler<'_> {
            Scheduler::new(&self.db, &self.schedule)
        }

        fn request(&self, start: NaiveDateTime, end: NaiveDateTime) -> BookingRequest {
            BookingRequest {
                patient_id: self.patient.id.clone(),
                doctor_id: self.doctor.id.clone(),
                start,
                end,
                reason: None,
            }
        }
    }

    #[test]
    fn test_book_and_conflict() {
        let f = Fixture::new();
        let scheduler = f.scheduler();

        let first = scheduler.book(f.request(at(4, 9, 0), at(4, 9, 30))).unwrap();
        assert_eq!(first.status, AppointmentStatus::Scheduled);

        // Same doctor, overlapping, different patient
        let other = Patient::new("Omar".into());
        f.db.insert_patient(&other).unwrap();
        let mut clash = f.request(at(4, 9, 15), at(4, 9, 45));
        clash.patient_id = other.id.clone();
        let err = scheduler.book(clash).unwrap_err();
        assert!(matches!(err, SchedulingError::DoctorBusy(id) if id == first.id));

        // Back-to-back is fine
        let mut next = f.request(at(4, 9, 30), at(4, 10, 0));
        next.patient_id = other.id;
        assert!(scheduler.book(next).is_ok());
    }

    #[test]
    fn test_patient_cannot_be_double_booked() {
        let f = Fixture::new();
        let scheduler = f.scheduler();
        scheduler.book(f.request(at(4, 10, 0), at(4, 10, 30))).unwrap();

        let second_doctor = Doctor::new("Dr. Haddad".into());
        f.db.insert_doctor(&second_doctor).unwrap();
        let mut request = f.request(at(4, 10, 0), at(4, 10, 30));
        request.doctor_id = second_doctor.id;
        assert!(matches!(
            scheduler.book(request),
            Err(SchedulingError::PatientBusy(_))
        ));
    }

    #[test]
    fn test_rejects_bad_ranges() {
        let f = Fixture::new();
        let scheduler = f.scheduler();

        assert!(matches!(
            scheduler.book(f.request(at(4, 10, 0), at(4, 10, 0))),
            Err(SchedulingError::InvalidRange { .. })
        ));
        assert!(matches!(
            scheduler.book(f.request(at(4, 8, 0), at(4, 8, 30))),
            Err(SchedulingError::OutsideWorkingHours(_))
        ));
        // Saturday
        assert!(matches!(
            scheduler.book(f.request(at(9, 10, 0), at(9, 10, 30))),
            Err(SchedulingError::OutsideWorkingHours(_))
        ));
    }

    #[test]
    fn test_inactive_doctor_and_unknown_patient() {
        let f = Fixture::new();
        let scheduler = f.scheduler();

        let mut unknown = f.request(at(4, 9, 0), at(4, 9, 30));
        unknown.patient_id = "nobody".into();
        assert!(matches!(scheduler.book(unknown), Err(SchedulingError::NotFound(_))));

        f.db.set_doctor_active(&f.doctor.id, false).unwrap();
        assert!(matches!(
            scheduler.book(f.request(at(4, 9, 0), at(4, 9, 30))),
            Err(SchedulingError::DoctorInactive(_))
        ));
    }

    #[test]
    fn test_cancel_frees_slot_and_blocks_further_transitions() {
        let f = Fixture::new();
        let scheduler = f.scheduler();
        let appt = scheduler.book(f.request(at(4, 9, 0), at(4, 9, 30))).unwrap();

        scheduler.cancel(&appt.id).unwrap();
        assert!(matches!(
            scheduler.complete(&appt.id),
            Err(SchedulingError::InvalidTransition { .. })
        ));

        // The slot can be booked again
        assert!(scheduler.book(f.request(at(4, 9, 0), at(4, 9, 30))).is_ok());
    }

    #[test]
    fn test_reschedule_ignores_itself() {
        let f = Fixture::new();
        let scheduler = f.scheduler();
        let appt = scheduler.book(f.request(at(4, 9, 0), at(4, 9, 30))).unwrap();

        // Overlaps only its own old time
        let moved = scheduler
            .reschedule(&appt.id, at(4, 9, 15), at(4, 9, 45))
            .unwrap();
        assert_eq!(moved.start, at(4, 9, 15));

        let stored = f.db.get_appointment(&appt.id).unwrap().unwrap();
        assert_eq!(stored.end, at(4, 9, 45));
    }

    #[test]
    fn test_available_slots_excludes_booked() {
        let f = Fixture::new();
        let scheduler = f.scheduler();
        scheduler.book(f.request(at(4, 9, 0), at(4, 9, 30))).unwrap();

        let day = NaiveDate::from_ymd_opt(2024, 3, 4).unwrap();
        let free = scheduler.available_slots(&f.doctor.id, day).unwrap();
        assert_eq!(free.len(), 15);
        assert_eq!(free[0].start, at(4, 9, 30));
    }

    #[test]
    fn test_find_nearest_slot() {
        let f = Fixture::new();
        let scheduler = f.scheduler();
        scheduler.book(f.request(at(4, 10, 0), at(4, 10, 30))).unwrap();

        // 10:00 is taken; 9:30 and 10:30 are equally far, earlier wins
        let slot = scheduler
            .find_nearest_slot(&f.doctor.id, at(4, 10, 0), 60)
            .unwrap()
            .unwrap();
        assert_eq!(slot.start, at(4, 9, 30));

        // Nothing within 10 minutes of a taken slot
        assert!(scheduler
            .find_nearest_slot(&f.doctor.id, at(4, 10, 0), 10)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_break_rejected() {
        let mut f = Fixture::new();
        f.schedule.break_start = NaiveTime::from_hms_opt(12, 0, 0);
        f.schedule.break_end = NaiveTime::from_hms_opt(13, 0, 0);
        let scheduler = f.scheduler();
        assert!(matches!(
            scheduler.book(f.request(at(4, 12, 30), at(4, 13, 0))),
            Err(SchedulingError::OutsideWorkingHours(_))
        ));
    }
}
