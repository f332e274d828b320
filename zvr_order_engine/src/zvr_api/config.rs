use std::time::Duration as StdDuration;

use chrono::Duration;

/// Settings of the order flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderFlowConfig {
    /// Unpaid orders older than this are expired by the sweep.
    pub order_ttl: Duration,
    /// Orders expired per sweep tick.
    pub expiry_batch_size: i64,
}

impl Default for OrderFlowConfig {
    fn default() -> Self {
        Self { order_ttl: Duration::hours(24), expiry_batch_size: 100 }
    }
}

/// Settings of the background jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JobConfig {
    /// Open payments not updated for this long are polled by the sync sweep.
    pub payment_stale_threshold: Duration,
    /// Time allowed past a payment's gateway `expiry_time` before it is expired locally.
    pub payment_expiry_grace: Duration,
    pub sync_batch_size: i64,
    /// The daily reconciliation runs between these business-day hours, `[start, end)`.
    pub reconcile_window_start_hour: u32,
    pub reconcile_window_end_hour: u32,
    /// A reconciliation left RUNNING for longer than this is assumed dead and may be restarted.
    pub reconcile_stale_after: Duration,
    /// How long a job lease lasts if its holder never releases it.
    pub lock_ttl: Duration,
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            payment_stale_threshold: Duration::minutes(15),
            payment_expiry_grace: Duration::minutes(5),
            sync_batch_size: 50,
            reconcile_window_start_hour: 1,
            reconcile_window_end_hour: 4,
            reconcile_stale_after: Duration::hours(1),
            lock_ttl: Duration::minutes(10),
        }
    }
}

impl JobConfig {
    pub fn in_reconcile_window(&self, business_hour: u32) -> bool {
        (self.reconcile_window_start_hour..self.reconcile_window_end_hour).contains(&business_hour)
    }
}

/// Deadlines for calls to the external collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GatewayDeadlines {
    pub charge: StdDuration,
    pub refund: StdDuration,
    pub status: StdDuration,
    pub shipping: StdDuration,
    pub mail: StdDuration,
}

impl Default for GatewayDeadlines {
    fn default() -> Self {
        Self {
            charge: StdDuration::from_secs(10),
            refund: StdDuration::from_secs(30),
            status: StdDuration::from_secs(5),
            shipping: StdDuration::from_secs(10),
            mail: StdDuration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn reconcile_window() {
        let config = JobConfig::default();
        assert!(!config.in_reconcile_window(0));
        assert!(config.in_reconcile_window(1));
        assert!(config.in_reconcile_window(3));
        assert!(!config.in_reconcile_window(4));
    }
}
