// libs/appointment-cell/src/services/clock.rs
use chrono::{FixedOffset, NaiveDateTime, Utc};

/// Source of "now" as clinic wall-clock time.
pub trait Clock: Send + Sync {
    fn now(&self) -> NaiveDateTime;
}

/// Real time shifted by the clinic's fixed UTC offset.
#[derive(Debug, Clone, Copy)]
pub struct ClinicClock {
    offset: FixedOffset,
}

impl ClinicClock {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }
}

impl Clock for ClinicClock {
    fn now(&self) -> NaiveDateTime {
        Utc::now().with_timezone(&self.offset).naive_local()
    }
}

/// Frozen clock for tests and replays.
#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub NaiveDateTime);

impl Clock for FixedClock {
    fn now(&self) -> NaiveDateTime {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};

    #[test]
    fn test_clinic_clock_applies_offset() {
        let offset = FixedOffset::west_opt(3 * 3600).unwrap();
        let clinic_now = ClinicClock::new(offset).now();
        let utc_now = Utc::now().naive_utc();

        let drift = (utc_now - clinic_now) - Duration::hours(3);
        assert!(drift.num_seconds().abs() < 5);
    }

    #[test]
    fn test_fixed_clock_is_frozen() {
        let instant = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap().and_hms_opt(10, 0, 0).unwrap();
        let clock = FixedClock(instant);
        assert_eq!(clock.now(), instant);
        assert_eq!(clock.now(), clock.now());
    }
}
