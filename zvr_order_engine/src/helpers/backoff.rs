use chrono::Duration;

/// Gateway polls give up on a payment after this many consecutive failures.
pub const MAX_SYNC_ATTEMPTS: i64 = 5;

const BASE_DELAY_SECS: i64 = 60;
const MAX_DELAY_SECS: i64 = 3600;

/// Delay before the next gateway poll after `attempt` consecutive failures (1-based): 1, 2, 4, 8... minutes, capped at
/// one hour.
pub fn sync_backoff(attempt: i64) -> Duration {
    let exponent = (attempt.max(1) - 1).min(16) as u32;
    let secs = BASE_DELAY_SECS.saturating_mul(2_i64.saturating_pow(exponent));
    Duration::seconds(secs.min(MAX_DELAY_SECS))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn doubles_then_caps() {
        assert_eq!(sync_backoff(0), Duration::seconds(60));
        assert_eq!(sync_backoff(1), Duration::seconds(60));
        assert_eq!(sync_backoff(2), Duration::seconds(120));
        assert_eq!(sync_backoff(4), Duration::seconds(480));
        assert_eq!(sync_backoff(7), Duration::seconds(3600));
        assert_eq!(sync_backoff(100), Duration::seconds(3600));
    }
}
