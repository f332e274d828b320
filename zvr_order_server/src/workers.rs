//! Background workers. Each one ticks a job in [`JobsApi`] on a fixed interval. The jobs take a lease in the database,
//! so running several server instances against one database is safe: only one of them does the work on each tick.
use std::{sync::Arc, time::Duration};

use log::*;
use tokio::task::JoinHandle;
use zvr_order_engine::{job_objects::JobOutcome, JobsApi, SqliteDatabase};

use crate::integrations::{MailerClient, MidtransGateway};

pub type ServerJobs = JobsApi<SqliteDatabase, MidtransGateway, MailerClient>;

const EXPIRY_INTERVAL: Duration = Duration::from_secs(60);
const PAYMENT_SYNC_INTERVAL: Duration = Duration::from_secs(15 * 60);
const RECONCILIATION_INTERVAL: Duration = Duration::from_secs(15 * 60);

/// Starts the order expiry worker. Do not await the returned JoinHandle, as it will run indefinitely.
pub fn start_expiry_worker(jobs: Arc<ServerJobs>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(EXPIRY_INTERVAL);
        info!("🕰️ Order expiry worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running order expiry job");
            match jobs.run_expiry_sweep().await {
                Ok(JobOutcome::Completed(summary)) => {
                    if !summary.expired.is_empty() {
                        info!("🕰️ {} orders expired", summary.expired.len());
                        debug!("🕰️ Expired orders: {}", code_list(&summary.expired));
                    }
                    if summary.errors > 0 {
                        warn!("🕰️ {} orders could not be expired on this tick", summary.errors);
                    }
                },
                Ok(JobOutcome::Skipped(reason)) => debug!("🕰️ Order expiry skipped. {reason}"),
                Err(e) => error!("🕰️ Error running order expiry job: {e}"),
            }
        }
    })
}

/// Starts the payment sync worker, which picks up gateway status changes whose webhook never arrived.
pub fn start_payment_sync_worker(jobs: Arc<ServerJobs>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(PAYMENT_SYNC_INTERVAL);
        info!("🕰️ Payment sync worker started");
        loop {
            timer.tick().await;
            trace!("🕰️ Running payment sync job");
            match jobs.run_payment_sync_sweep().await {
                Ok(JobOutcome::Completed(summary)) => {
                    if summary.failed > 0 {
                        warn!("🕰️ {} of {} payments could not be synced", summary.failed, summary.checked);
                    }
                },
                Ok(JobOutcome::Skipped(reason)) => debug!("🕰️ Payment sync skipped. {reason}"),
                Err(e) => error!("🕰️ Error running payment sync job: {e}"),
            }
        }
    })
}

/// Starts the daily reconciliation worker. It wakes regularly but only reconciles inside the configured window; the
/// previous business day is reconciled once.
pub fn start_reconciliation_worker(jobs: Arc<ServerJobs>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(RECONCILIATION_INTERVAL);
        info!("🕰️ Reconciliation worker started");
        loop {
            timer.tick().await;
            if !jobs.in_reconcile_window() {
                trace!("🕰️ Outside the reconciliation window");
                continue;
            }
            match jobs.run_daily_reconciliation(None).await {
                Ok(JobOutcome::Completed(log)) => {
                    info!("🕰️ Reconciled {}. {} mismatches", log.reconciliation_date, log.mismatch_count)
                },
                Ok(JobOutcome::Skipped(reason)) => debug!("🕰️ Reconciliation skipped. {reason}"),
                Err(e) => error!("🕰️ Error running daily reconciliation: {e}"),
            }
        }
    })
}

fn code_list<T: std::fmt::Display>(codes: &[T]) -> String {
    codes.iter().map(|c| c.to_string()).collect::<Vec<String>>().join(", ")
}
