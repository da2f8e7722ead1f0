//! Local calendar day window

use chrono::{DateTime, Local, NaiveDate, NaiveTime, TimeZone, Utc};

/// `[midnight today, midnight tomorrow)` in the server's local time zone.
pub fn local_day_window() -> (DateTime<Utc>, DateTime<Utc>) {
    day_window(Local::now())
}

/// Day window around `now` in `now`'s own time zone, expressed in UTC.
pub fn day_window<Tz: TimeZone>(now: DateTime<Tz>) -> (DateTime<Utc>, DateTime<Utc>) {
    let tz = now.timezone();
    let today = now.date_naive();
    let tomorrow = today.succ_opt().unwrap_or(NaiveDate::MAX);
    (start_of_day(&tz, today), start_of_day(&tz, tomorrow))
}

/// First existing local instant of `date`.
///
/// Midnight can fall in a DST gap in a few zones; the day then starts at the
/// first hour that exists.
fn start_of_day<Tz: TimeZone>(tz: &Tz, date: NaiveDate) -> DateTime<Utc> {
    (0..24)
        .filter_map(|hour| NaiveTime::from_hms_opt(hour, 0, 0))
        .find_map(|time| tz.from_local_datetime(&date.and_time(time)).earliest())
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| date.and_time(NaiveTime::MIN).and_utc())
}
