//! Time slot generation and availability.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

use crate::config::ScheduleConfig;
use crate::models::Appointment;

/// A half-open interval `[start, end)` on the clinic's local clock.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
pub struct TimeSlot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl TimeSlot {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Self {
        Self { start, end }
    }

    /// Touching intervals do not overlap.
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn duration_minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

impl From<&Appointment> for TimeSlot {
    fn from(appointment: &Appointment) -> Self {
        Self::new(appointment.start, appointment.end)
    }
}

/// Consecutive slots of `slot_minutes` between opening and closing time.
///
/// Slots intersecting the break are skipped. Non-working days have no slots.
pub fn generate_daily_slots(date: NaiveDate, schedule: &ScheduleConfig) -> Vec<TimeSlot> {
    if !schedule.is_working_day(date.weekday()) || schedule.slot_minutes <= 0 {
        return Vec::new();
    }

    let length = Duration::minutes(schedule.slot_minutes);
    let close = date.and_time(schedule.close);
    let lunch = match (schedule.break_start, schedule.break_end) {
        (Some(start), Some(end)) => Some(TimeSlot::new(date.and_time(start), date.and_time(end))),
        _ => None,
    };

    let mut slots = Vec::new();
    let mut current = date.and_time(schedule.open);
    while current + length <= close {
        let slot = TimeSlot::new(current, current + length);
        if !lunch.is_some_and(|b| b.overlaps(&slot)) {
            slots.push(slot);
        }
        current += length;
    }
    slots
}

/// Generated slots of `date` that no schedule-blocking appointment overlaps.
pub fn available_slots(
    booked: &[Appointment],
    date: NaiveDate,
    schedule: &ScheduleConfig,
) -> Vec<TimeSlot> {
    let taken: Vec<TimeSlot> = booked
        .iter()
        .filter(|a| a.blocks_schedule())
        .map(TimeSlot::from)
        .collect();

    generate_daily_slots(date, schedule)
        .into_iter()
        .filter(|slot| !taken.iter().any(|t| t.overlaps(slot)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AppointmentStatus;
    use chrono::NaiveTime;
    use proptest::prelude::*;

    fn monday() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 4).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveDateTime {
        monday().and_hms_opt(h, m, 0).unwrap()
    }

    fn booked(start: NaiveDateTime, end: NaiveDateTime) -> Appointment {
        Appointment::new("p".into(), "d".into(), start, end)
    }

    #[test]
    fn test_default_day_has_sixteen_slots() {
        let slots = generate_daily_slots(monday(), &ScheduleConfig::default());
        assert_eq!(slots.len(), 16);
        assert_eq!(slots[0], TimeSlot::new(at(9, 0), at(9, 30)));
        assert_eq!(slots[15].end, at(17, 0));
    }

    #[test]
    fn test_break_is_skipped() {
        let schedule = ScheduleConfig {
            break_start: NaiveTime::from_hms_opt(12, 0, 0),
            break_end: NaiveTime::from_hms_opt(13, 0, 0),
            ..ScheduleConfig::default()
        };
        let slots = generate_daily_slots(monday(), &schedule);
        assert_eq!(slots.len(), 14);
        assert!(slots.iter().all(|s| s.start < at(12, 0) || s.start >= at(13, 0)));
    }

    #[test]
    fn test_weekend_has_no_slots() {
        let saturday = NaiveDate::from_ymd_opt(2024, 3, 9).unwrap();
        assert!(generate_daily_slots(saturday, &ScheduleConfig::default()).is_empty());
    }

    #[test]
    fn test_partial_trailing_slot_dropped() {
        let schedule = ScheduleConfig {
            slot_minutes: 45,
            close: NaiveTime::from_hms_opt(10, 0, 0).unwrap(),
            ..ScheduleConfig::default()
        };
        let slots = generate_daily_slots(monday(), &schedule);
        assert_eq!(slots, vec![TimeSlot::new(at(9, 0), at(9, 45))]);
    }

    #[test]
    fn test_booked_slots_removed() {
        let schedule = ScheduleConfig::default();
        // Straddles two slots
        let appointments = vec![booked(at(9, 15), at(9, 45))];
        let free = available_slots(&appointments, monday(), &schedule);
        assert_eq!(free.len(), 14);
        assert_eq!(free[0].start, at(10, 0));
    }

    #[test]
    fn test_cancelled_appointment_frees_slot() {
        let mut cancelled = booked(at(9, 0), at(9, 30));
        cancelled.status = AppointmentStatus::Cancelled;
        let free = available_slots(&[cancelled], monday(), &ScheduleConfig::default());
        assert_eq!(free.len(), 16);
    }

    #[test]
    fn test_touching_slots_do_not_overlap() {
        let a = TimeSlot::new(at(9, 0), at(9, 30));
        let b = TimeSlot::new(at(9, 30), at(10, 0));
        assert!(!a.overlaps(&b));
        assert!(!b.overlaps(&a));
        assert!(a.overlaps(&TimeSlot::new(at(9, 29), at(9, 31))));
    }

    proptest! {
        #[test]
        fn prop_overlap_is_symmetric(a in 0i64..600, la in 1i64..120, b in 0i64..600, lb in 1i64..120) {
            let base = at(8, 0);
            let x = TimeSlot::new(base + Duration::minutes(a), base + Duration::minutes(a + la));
            let y = TimeSlot::new(base + Duration::minutes(b), base + Duration::minutes(b + lb));
            prop_assert_eq!(x.overlaps(&y), y.overlaps(&x));
            // Overlap iff the intervals share at least one minute
            let shared = (a.max(b)) < (a + la).min(b + lb);
            prop_assert_eq!(x.overlaps(&y), shared);
        }

        #[test]
        fn prop_available_slots_never_overlap_bookings(starts in prop::collection::vec(0i64..480, 0..6), len in 5i64..90) {
            let appointments: Vec<Appointment> = starts
                .iter()
                .map(|s| booked(at(9, 0) + Duration::minutes(*s), at(9, 0) + Duration::minutes(s + len)))
                .collect();
            let free = available_slots(&appointments, monday(), &ScheduleConfig::default());
            for slot in &free {
                for appt in &appointments {
                    prop_assert!(!slot.overlaps(&TimeSlot::from(appt)));
                }
            }
        }
    }
}
