use std::fmt::Debug;

use chrono::{Duration, NaiveDate};
use log::*;
use rand::Rng;

use crate::{
    collaborators::{Mailer, PaymentGateway},
    db_types::{PaymentStatus, ReconciliationLog, SyncSource},
    errors::EngineError,
    helpers::{business_date, business_day_bounds, business_hour, MAX_SYNC_ATTEMPTS},
    traits::{JobManagement, PaymentChange, PaymentManagement},
    zvr_api::{
        config::JobConfig,
        job_objects::{JobOutcome, SyncSummary},
        order_flow_api::OrderFlowApi,
        order_objects::ExpirySummary,
        payment_api::PaymentApi,
    },
};

pub const EXPIRY_JOB: &str = "order_expiry_sweep";
pub const PAYMENT_SYNC_JOB: &str = "payment_sync_sweep";
pub const RECONCILIATION_JOB: &str = "daily_reconciliation";

/// `JobsApi` runs the three background jobs: the order expiry sweep, the payment sync sweep and the daily
/// reconciliation.
///
/// Each job takes a named lease in the database before doing anything, so at most one instance of a job runs at a
/// time across every process sharing the database. A job whose lease is held elsewhere returns
/// [`JobOutcome::Skipped`] immediately.
pub struct JobsApi<B, G, M> {
    db: B,
    orders: OrderFlowApi<B>,
    payments: PaymentApi<B, G, M>,
    config: JobConfig,
    holder: String,
}

impl<B, G, M> Debug for JobsApi<B, G, M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "JobsApi ({}, {:?})", self.holder, self.config)
    }
}

impl<B, G, M> JobsApi<B, G, M>
where
    B: JobManagement + PaymentManagement,
    G: PaymentGateway,
    M: Mailer,
{
    pub fn new(db: B, orders: OrderFlowApi<B>, payments: PaymentApi<B, G, M>, config: JobConfig) -> Self {
        let holder = format!("worker-{:08x}", rand::thread_rng().gen::<u32>());
        Self { db, orders, payments, config, holder }
    }

    pub fn config(&self) -> &JobConfig {
        &self.config
    }

    async fn acquire(&self, job: &str) -> Result<bool, EngineError> {
        let acquired = self.db.try_acquire_job_lock(job, &self.holder, self.config.lock_ttl).await?;
        if !acquired {
            debug!("🕰️ {job} is already running elsewhere");
        }
        Ok(acquired)
    }

    async fn release(&self, job: &str) {
        if let Err(e) = self.db.release_job_lock(job, &self.holder).await {
            warn!("🕰️ Could not release the {job} lease: {e}. It lapses after {}", self.config.lock_ttl);
        }
    }

    /// Expires unpaid orders past their TTL.
    pub async fn run_expiry_sweep(&self) -> Result<JobOutcome<ExpirySummary>, EngineError> {
        if !self.acquire(EXPIRY_JOB).await? {
            return Ok(JobOutcome::Skipped(format!("{EXPIRY_JOB} is running elsewhere")));
        }
        let result = self.orders.expire_stale_orders().await;
        self.release(EXPIRY_JOB).await;
        result.map(JobOutcome::Completed)
    }

    /// Polls the gateway for open payments that have not been updated within the stale threshold. Payments the
    /// gateway still reports as pending, or that cannot be polled, are expired locally once their expiry time has
    /// passed.
    pub async fn run_payment_sync_sweep(&self) -> Result<JobOutcome<SyncSummary>, EngineError> {
        if !self.acquire(PAYMENT_SYNC_JOB).await? {
            return Ok(JobOutcome::Skipped(format!("{PAYMENT_SYNC_JOB} is running elsewhere")));
        }
        let result = self.sync_stale_payments().await;
        self.release(PAYMENT_SYNC_JOB).await;
        result.map(JobOutcome::Completed)
    }

    async fn sync_stale_payments(&self) -> Result<SyncSummary, EngineError> {
        let cutoff = self.db.now() - self.config.payment_stale_threshold;
        let stale = self.db.fetch_stale_payments(cutoff, MAX_SYNC_ATTEMPTS, self.config.sync_batch_size).await?;
        let mut summary = SyncSummary::default();
        for payment in stale {
            summary.checked += 1;
            let still_pending = match self.payments.sync(&payment, SyncSource::Job).await {
                Ok(result) => {
                    match result.change {
                        PaymentChange::Applied { .. } => summary.applied += 1,
                        PaymentChange::LateSettlement => summary.late_settlements += 1,
                        _ => {},
                    }
                    result.payment.status == PaymentStatus::Pending
                },
                Err(e) => {
                    debug!("🕰️ Sync of payment {} failed: {e}", payment.external_id);
                    summary.failed += 1;
                    true
                },
            };
            if still_pending {
                match self.payments.expire_payment(payment.id, self.config.payment_expiry_grace).await {
                    Ok(r) if matches!(r.change, PaymentChange::Applied { .. }) => summary.expired += 1,
                    Ok(_) => {},
                    Err(e) => warn!("🕰️ Could not expire payment {}: {e}", payment.external_id),
                }
            }
        }
        if summary.checked > 0 {
            info!("🕰️ Payment sync sweep: {summary:?}");
        }
        Ok(summary)
    }

    /// True if the current business-day hour falls in the reconciliation window.
    pub fn in_reconcile_window(&self) -> bool {
        self.config.in_reconcile_window(business_hour(self.db.now()))
    }

    /// Reconciles `date`, by default the previous business day. A date that has already been reconciled is skipped;
    /// a failed run is retried.
    pub async fn run_daily_reconciliation(
        &self,
        date: Option<NaiveDate>,
    ) -> Result<JobOutcome<ReconciliationLog>, EngineError> {
        let date = date.unwrap_or_else(|| business_date(self.db.now()) - Duration::days(1));
        if !self.acquire(RECONCILIATION_JOB).await? {
            return Ok(JobOutcome::Skipped(format!("{RECONCILIATION_JOB} is running elsewhere")));
        }
        let result = self.reconcile(date).await;
        self.release(RECONCILIATION_JOB).await;
        result
    }

    async fn reconcile(&self, date: NaiveDate) -> Result<JobOutcome<ReconciliationLog>, EngineError> {
        let stale_before = self.db.now() - self.config.reconcile_stale_after;
        let Some(run) = self.db.start_reconciliation(date, stale_before).await? else {
            debug!("🕰️ Reconciliation for {date} is already done or in progress");
            return Ok(JobOutcome::Skipped(format!("{date} is already reconciled or in progress")));
        };
        let (start, end) = business_day_bounds(date);
        match self.db.compute_reconciliation(start, end).await {
            Ok(totals) => {
                let log = self.db.finish_reconciliation(run.id, &totals).await?;
                if log.mismatch_count > 0 {
                    warn!("🕰️ Reconciliation for {date} found {} mismatch(es)", log.mismatch_count);
                }
                info!("🕰️ Reconciliation for {date} complete. Net revenue {}", log.net_revenue);
                Ok(JobOutcome::Completed(log))
            },
            Err(e) => {
                error!("🕰️ Reconciliation for {date} failed: {e}");
                self.db.fail_reconciliation(run.id, &e.to_string()).await?;
                Err(e)
            },
        }
    }
}
