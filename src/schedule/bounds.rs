use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

/// Absolute bounds of a shift held on `date` between two wall-clock times.
/// An end at or before the start means the shift runs past midnight.
pub fn shift_bounds(
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
) -> (DateTime<Utc>, DateTime<Utc>) {
    let starts_at = date.and_time(start).and_utc();
    let mut ends_at = date.and_time(end).and_utc();
    if ends_at <= starts_at {
        ends_at += Duration::days(1);
    }
    (starts_at, ends_at)
}
