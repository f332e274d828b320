use chrono::{DateTime, Duration, NaiveDate, Utc};

use crate::{
    db_types::ReconciliationLog,
    errors::EngineError,
    traits::{data_objects::ReconciliationTotals, OrderManagement},
};

#[allow(async_fn_in_trait)]
pub trait JobManagement: OrderManagement {
    /// Takes the named lease for `ttl` if it is free or has lapsed. Returns false if another holder has it.
    async fn try_acquire_job_lock(&self, name: &str, holder: &str, ttl: Duration) -> Result<bool, EngineError>;

    async fn release_job_lock(&self, name: &str, holder: &str) -> Result<(), EngineError>;

    /// Inserts a RUNNING reconciliation row for the date, or restarts a FAILED one. Returns `None` if the date has
    /// already been reconciled or a run started after `stale_before` is still in progress.
    async fn start_reconciliation(
        &self,
        date: NaiveDate,
        stale_before: DateTime<Utc>,
    ) -> Result<Option<ReconciliationLog>, EngineError>;

    /// Aggregates orders, payments and refunds over `[start, end)`.
    async fn compute_reconciliation(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> Result<ReconciliationTotals, EngineError>;

    async fn finish_reconciliation(
        &self,
        id: i64,
        totals: &ReconciliationTotals,
    ) -> Result<ReconciliationLog, EngineError>;

    async fn fail_reconciliation(&self, id: i64, error: &str) -> Result<ReconciliationLog, EngineError>;

    async fn fetch_reconciliation(&self, date: NaiveDate) -> Result<Option<ReconciliationLog>, EngineError>;
}
