mod backoff;
mod business_day;
mod clock;
mod codes;
mod refund_breakdown;

pub use backoff::{sync_backoff, MAX_SYNC_ATTEMPTS};
pub use business_day::{business_date, business_day_bounds, business_hour, BUSINESS_UTC_OFFSET_HOURS};
pub use clock::{Clock, SystemClock};
pub use codes::{new_order_code, new_refund_code};
pub use refund_breakdown::{derive_breakdown, BreakdownRequest, RefundBreakdown};
