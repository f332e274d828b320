//! The store does business in Western Indonesia Time (UTC+7). Order codes and daily reconciliation use the local
//! calendar date, while everything is stored in UTC.
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Timelike, Utc};

pub const BUSINESS_UTC_OFFSET_HOURS: i32 = 7;

fn to_business_time(now: DateTime<Utc>) -> DateTime<Utc> {
    now + Duration::hours(i64::from(BUSINESS_UTC_OFFSET_HOURS))
}

pub fn business_date(now: DateTime<Utc>) -> NaiveDate {
    to_business_time(now).date_naive()
}

pub fn business_hour(now: DateTime<Utc>) -> u32 {
    to_business_time(now).hour()
}

/// The UTC instants `[start, end)` covering the given business day.
pub fn business_day_bounds(date: NaiveDate) -> (DateTime<Utc>, DateTime<Utc>) {
    let local_midnight = date.and_time(NaiveTime::default());
    let start = local_midnight.and_utc() - Duration::hours(i64::from(BUSINESS_UTC_OFFSET_HOURS));
    (start, start + Duration::days(1))
}
