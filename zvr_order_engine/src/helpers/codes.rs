use chrono::{DateTime, Utc};
use rand::Rng;

use crate::{
    db_types::{OrderCode, RefundCode},
    helpers::business_date,
};

fn random_hex(len: usize) -> String {
    let mut rng = rand::thread_rng();
    (0..len).map(|_| format!("{:X}", rng.gen_range(0..16u8))).collect()
}

/// `ZVR-YYYYMMDD-XXXXXXXX`, dated by the business calendar. Collisions are handled by the caller retrying the insert.
pub fn new_order_code(now: DateTime<Utc>) -> OrderCode {
    let date = business_date(now).format("%Y%m%d");
    OrderCode(format!("ZVR-{date}-{}", random_hex(8)))
}

/// `RFD-YYYYMMDD-XXXX`
pub fn new_refund_code(now: DateTime<Utc>) -> RefundCode {
    let date = business_date(now).format("%Y%m%d");
    RefundCode(format!("RFD-{date}-{}", random_hex(4)))
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    #[test]
    fn order_code_format() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 20, 0, 0).unwrap();
        let code = new_order_code(now);
        assert!(code.as_str().starts_with("ZVR-20240602-"), "{code}");
        assert_eq!(code.as_str().len(), OrderCode::LENGTH);
        assert!(OrderCode::is_well_formed(code.as_str()));
    }

    #[test]
    fn refund_code_format() {
        let now = Utc.with_ymd_and_hms(2024, 6, 1, 8, 0, 0).unwrap();
        let code = new_refund_code(now);
        assert!(code.as_str().starts_with("RFD-20240601-"));
        assert_eq!(code.as_str().len(), 17);
        assert!(code.as_str()[13..].chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_lowercase()));
    }
}
