//! The 24h window a daily synthesis draws its input from: everything
//! published up to and including `date`'s end-of-day, going back 24h.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

pub fn bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let end = Utc.from_utc_datetime(&(date + Duration::days(1)).and_hms_opt(0, 0, 0).unwrap());
    let start = end - Duration::hours(24);
    (start, end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn window_spans_24h_ending_at_next_midnight() {
        let date = NaiveDate::from_ymd_opt(2026, 3, 5).unwrap();
        let (start, end) = bounds(date);
        assert_eq!(end - start, Duration::hours(24));
        assert_eq!(end, Utc.with_ymd_and_hms(2026, 3, 6, 0, 0, 0).unwrap());
    }
}
