//! Clinic wall-clock time.
//!
//! The clinic operates on a fixed UTC+8 offset, applied uniformly to every
//! displayed timestamp and to the "today" boundary used when fetching the
//! day's queue.

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};

/// Offset of clinic-local time from UTC, in hours.
pub const CLINIC_UTC_OFFSET_HOURS: i32 = 8;

/// Converts a UTC instant to clinic-local time.
pub fn clinic_time(utc: DateTime<Utc>) -> DateTime<FixedOffset> {
    let offset = FixedOffset::east_opt(CLINIC_UTC_OFFSET_HOURS * 3600)
        .expect("UTC+8 is a representable offset");
    utc.with_timezone(&offset)
}

/// The clinic-local calendar date for a UTC instant.
///
/// Queue fetches are keyed on this date, not the UTC date: late-evening
/// UTC instants already belong to the clinic's next day.
pub fn clinic_today(utc: DateTime<Utc>) -> NaiveDate {
    clinic_time(utc).date_naive()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn clinic_time_is_utc_plus_eight() {
        let utc = Utc.with_ymd_and_hms(2024, 3, 10, 6, 30, 0).unwrap();
        let local = clinic_time(utc);
        assert_eq!(local.to_rfc3339(), "2024-03-10T14:30:00+08:00");
    }

    #[test]
    fn clinic_date_rolls_over_before_utc_midnight() {
        let utc = Utc.with_ymd_and_hms(2024, 3, 10, 17, 0, 0).unwrap();
        assert_eq!(
            clinic_today(utc),
            NaiveDate::from_ymd_opt(2024, 3, 11).unwrap()
        );

        let earlier = Utc.with_ymd_and_hms(2024, 3, 10, 15, 59, 0).unwrap();
        assert_eq!(
            clinic_today(earlier),
            NaiveDate::from_ymd_opt(2024, 3, 10).unwrap()
        );
    }
}
