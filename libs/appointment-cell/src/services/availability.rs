// libs/appointment-cell/src/services/availability.rs
use std::collections::HashSet;

use chrono::{Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};

use crate::models::{Appointment, SLOT_MINUTES};

/// Daily booking window. Both ends are bookable ticks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpeningHours {
    pub first_slot: NaiveTime,
    pub last_slot: NaiveTime,
    pub slot_minutes: u32,
}

impl Default for OpeningHours {
    fn default() -> Self {
        Self {
            first_slot: NaiveTime::from_hms_opt(9, 0, 0).unwrap_or_default(),
            last_slot: NaiveTime::from_hms_opt(20, 30, 0).unwrap_or_default(),
            slot_minutes: SLOT_MINUTES,
        }
    }
}

impl OpeningHours {
    /// Every tick from `first_slot` to `last_slot` inclusive, ascending.
    pub fn ticks(&self) -> Vec<NaiveTime> {
        let step = Duration::minutes(i64::from(self.slot_minutes.max(1)));
        let mut ticks = Vec::new();
        let mut current = self.first_slot;

        while current <= self.last_slot {
            ticks.push(current);
            let (next, wrapped) = current.overflowing_add_signed(step);
            if wrapped != 0 {
                break;
            }
            current = next;
        }

        ticks
    }

    /// Whether `time` sits on the grid inside the window.
    pub fn contains(&self, time: NaiveTime) -> bool {
        if time < self.first_slot || time > self.last_slot || time.nanosecond() != 0 || time.second() != 0 {
            return false;
        }
        let offset = (time - self.first_slot).num_minutes();
        offset % i64::from(self.slot_minutes.max(1)) == 0
    }

    pub fn available_slots(
        &self,
        date: NaiveDate,
        appointments: &[Appointment],
        now: NaiveDateTime,
    ) -> Vec<NaiveTime> {
        let occupied: HashSet<NaiveTime> = appointments
            .iter()
            .filter(|a| a.date == date && a.occupies_slot())
            .map(|a| a.time)
            .collect();

        self.ticks()
            .into_iter()
            .filter(|tick| date.and_time(*tick) > now)
            .filter(|tick| !occupied.contains(tick))
            .collect()
    }
}

/// Bookable times on `date` given the clinic's appointments and the clinic's
/// current wall-clock time. Occupancy is global across hospitals.
pub fn compute_available_slots(
    date: NaiveDate,
    appointments: &[Appointment],
    now: NaiveDateTime,
) -> Vec<NaiveTime> {
    OpeningHours::default().available_slots(date, appointments, now)
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    use crate::models::{AppointmentStatus, VisitReason};

    fn date() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 6, 10).unwrap()
    }

    fn at(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn appointment(date: NaiveDate, time: NaiveTime, status: AppointmentStatus, hospital: &str) -> Appointment {
        Appointment {
            id: Uuid::new_v4(),
            hospital_id: hospital.to_string(),
            patient_id: Uuid::new_v4(),
            date,
            time,
            status,
            reason: Some(VisitReason::FirstVisit),
            service_name: None,
            notes: None,
            created_at: None,
        }
    }

    #[test]
    fn test_empty_day_has_24_slots() {
        let slots = compute_available_slots(date(), &[], date().and_time(at(8, 0)));

        assert_eq!(slots.len(), 24);
        assert_eq!(slots.first(), Some(&at(9, 0)));
        assert_eq!(slots.last(), Some(&at(20, 30)));
    }

    #[test]
    fn test_slots_are_on_grid_and_strictly_future() {
        let now = date().and_time(at(13, 15));
        let slots = compute_available_slots(date(), &[], now);

        assert_eq!(slots.first(), Some(&at(13, 30)));
        for slot in &slots {
            assert!(date().and_time(*slot) > now);
            assert_eq!(slot.minute() % 30, 0);
            assert!(*slot >= at(9, 0) && *slot <= at(20, 30));
        }
    }

    #[test]
    fn test_tick_equal_to_now_is_excluded() {
        let slots = compute_available_slots(date(), &[], date().and_time(at(10, 0)));
        assert_eq!(slots.first(), Some(&at(10, 30)));
    }

    #[test]
    fn test_exhausted_day_is_empty() {
        let booked: Vec<Appointment> = OpeningHours::default()
            .ticks()
            .into_iter()
            .map(|t| appointment(date(), t, AppointmentStatus::Confirmed, "centro"))
            .collect();

        assert!(compute_available_slots(date(), &booked, date().and_time(at(7, 0))).is_empty());
    }

    #[test]
    fn test_occupancy_is_global_across_hospitals() {
        let existing = vec![
            appointment(date(), at(9, 0), AppointmentStatus::Confirmed, "centro"),
            appointment(date(), at(9, 30), AppointmentStatus::InProgress, "norte"),
            appointment(date(), at(10, 0), AppointmentStatus::Blocked, "centro"),
        ];

        let slots = compute_available_slots(date(), &existing, date().and_time(at(8, 0)));

        assert_eq!(slots.len(), 21);
        for a in &existing {
            assert!(!slots.contains(&a.time));
        }
    }

    #[test]
    fn test_cancelled_appointment_frees_slot() {
        let existing = vec![appointment(date(), at(14, 0), AppointmentStatus::Cancelled, "centro")];
        let slots = compute_available_slots(date(), &existing, date().and_time(at(8, 0)));

        assert!(slots.contains(&at(14, 0)));
        assert_eq!(slots.len(), 24);
    }

    #[test]
    fn test_other_dates_do_not_occupy() {
        let tomorrow = date().succ_opt().unwrap();
        let existing = vec![appointment(tomorrow, at(9, 0), AppointmentStatus::Confirmed, "centro")];

        assert_eq!(compute_available_slots(date(), &existing, date().and_time(at(8, 0))).len(), 24);
    }

    #[test]
    fn test_past_date_is_empty() {
        let yesterday = date().pred_opt().unwrap();
        assert!(compute_available_slots(yesterday, &[], date().and_time(at(8, 0))).is_empty());
    }

    #[test]
    fn test_calculation_is_idempotent() {
        let existing = vec![appointment(date(), at(11, 0), AppointmentStatus::Confirmed, "centro")];
        let now = date().and_time(at(8, 0));

        assert_eq!(
            compute_available_slots(date(), &existing, now),
            compute_available_slots(date(), &existing, now)
        );
    }

    #[test]
    fn test_grid_membership() {
        let hours = OpeningHours::default();
        assert!(hours.contains(at(9, 0)));
        assert!(hours.contains(at(20, 30)));
        assert!(!hours.contains(at(8, 30)));
        assert!(!hours.contains(at(21, 0)));
        assert!(!hours.contains(at(9, 15)));
        assert!(!hours.contains(NaiveTime::from_hms_opt(9, 0, 30).unwrap()));
    }
}
