use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};
use sha2::{Digest, Sha512};

/// Midtrans reports local times in Western Indonesian Time.
const WIB_OFFSET_SECS: i32 = 7 * 3600;

/// The notification signature: the hex SHA-512 of `order_id + status_code + gross_amount + server_key`.
pub fn midtrans_signature(order_id: &str, status_code: &str, gross_amount: &str, server_key: &str) -> String {
    let mut hasher = Sha512::new();
    hasher.update(order_id.as_bytes());
    hasher.update(status_code.as_bytes());
    hasher.update(gross_amount.as_bytes());
    hasher.update(server_key.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Compares two strings without stopping at the first difference.
pub(crate) fn constant_time_eq(a: &str, b: &str) -> bool {
    a.len() == b.len() && a.bytes().zip(b.bytes()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

/// Parses a Midtrans `YYYY-MM-DD HH:MM:SS` timestamp, which is in WIB.
pub fn parse_midtrans_time(value: &str) -> Option<DateTime<Utc>> {
    let naive = NaiveDateTime::parse_from_str(value.trim(), "%Y-%m-%d %H:%M:%S").ok()?;
    let wib = FixedOffset::east_opt(WIB_OFFSET_SECS)?;
    wib.from_local_datetime(&naive).single().map(|t| t.with_timezone(&Utc))
}

/// Midtrans amounts are decimal strings such as `115000.00`. Only whole rupiah are accepted.
pub(crate) fn parse_gross_amount(value: &str) -> Option<i64> {
    let (whole, fraction) = value.split_once('.').unwrap_or((value, ""));
    if !fraction.chars().all(|c| c == '0') {
        return None;
    }
    whole.parse().ok()
}
