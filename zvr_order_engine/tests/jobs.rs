use chrono::{Duration, NaiveDate};
use zvr_order_engine::{
    helpers::Clock,
    db_types::{OrderStatusType, PaymentStatus, ReconciliationStatus, RefundReason, RefundType, Rupiah, SyncSource},
    test_utils::catalog::product_stock,
    traits::NewRefund,
    zvr_api::jobs_api::{EXPIRY_JOB, PAYMENT_SYNC_JOB},
    JobManagement,
};

use crate::support::{admin, TestSystem};

mod support;

#[tokio::test]
async fn unpaid_orders_expire_after_a_day() {
    let sys = TestSystem::new().await;
    let shirt = sys.seed_shirt().await;
    let order = sys.place_order(shirt).await;
    assert_eq!(product_stock(&sys.db, shirt).await, 8);

    sys.clock.advance(Duration::hours(23));
    let summary = sys.jobs.run_expiry_sweep().await.unwrap().completed().unwrap();
    assert!(summary.expired.is_empty());
    assert_eq!(sys.order(&order.order_code).await.status, OrderStatusType::Pending);

    sys.clock.advance(Duration::hours(1) + Duration::seconds(1));
    let summary = sys.jobs.run_expiry_sweep().await.unwrap().completed().unwrap();
    assert_eq!(summary.expired, vec![order.order_code.clone()]);
    let expired = sys.order(&order.order_code).await;
    assert_eq!(expired.status, OrderStatusType::Expired);
    assert!(!expired.stock_reserved);
    assert_eq!(product_stock(&sys.db, shirt).await, 10);
    assert!(sys.mailer.sent().is_empty());

    // Nothing left to do on the next tick
    let summary = sys.jobs.run_expiry_sweep().await.unwrap().completed().unwrap();
    assert!(summary.expired.is_empty());
    assert_eq!(product_stock(&sys.db, shirt).await, 10);
    sys.tear_down().await;
}

#[tokio::test]
async fn paid_orders_never_expire() {
    let sys = TestSystem::new().await;
    let shirt = sys.seed_shirt().await;
    let order = sys.paid_order(shirt).await;
    sys.clock.advance(Duration::days(3));
    let summary = sys.jobs.run_expiry_sweep().await.unwrap().completed().unwrap();
    assert!(summary.expired.is_empty());
    assert_eq!(sys.order(&order.order_code).await.status, OrderStatusType::Paid);
    sys.tear_down().await;
}

#[tokio::test]
async fn held_leases_skip_the_run() {
    let sys = TestSystem::new().await;
    let shirt = sys.seed_shirt().await;
    let order = sys.place_order(shirt).await;
    sys.clock.advance(Duration::hours(25));

    assert!(sys.db.try_acquire_job_lock(EXPIRY_JOB, "worker-elsewhere", Duration::minutes(10)).await.unwrap());
    let outcome = sys.jobs.run_expiry_sweep().await.unwrap();
    assert!(outcome.is_skipped());
    assert_eq!(sys.order(&order.order_code).await.status, OrderStatusType::Pending);
    // Other jobs have their own lease
    assert!(!sys.jobs.run_payment_sync_sweep().await.unwrap().is_skipped());

    // The lease lapses if its holder never releases it
    sys.clock.advance(Duration::minutes(11));
    let summary = sys.jobs.run_expiry_sweep().await.unwrap().completed().unwrap();
    assert_eq!(summary.expired.len(), 1);
    assert!(sys.db.try_acquire_job_lock(EXPIRY_JOB, "worker-elsewhere", Duration::minutes(10)).await.unwrap());
    sys.tear_down().await;
}

#[tokio::test]
async fn sync_sweep_resolves_missed_settlements() {
    let sys = TestSystem::new().await;
    let shirt = sys.seed_shirt().await;
    let order = sys.place_order(shirt).await;
    let external_id = sys.open_payment(&order.order_code).await;
    sys.gateway.set_status(&external_id, "settlement", Some("tx-missed"));

    sys.clock.advance(Duration::minutes(10));
    let summary = sys.jobs.run_payment_sync_sweep().await.unwrap().completed().unwrap();
    assert_eq!(summary.checked, 0);

    sys.clock.advance(Duration::minutes(6));
    let summary = sys.jobs.run_payment_sync_sweep().await.unwrap().completed().unwrap();
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.applied, 1);
    assert_eq!(summary.expired, 0);

    let payment = sys.payments.payment_for_order(&order.order_code).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Success);
    assert_eq!(payment.transaction_id.as_deref(), Some("tx-missed"));
    assert_eq!(sys.order(&order.order_code).await.status, OrderStatusType::Paid);
    let logs = sys.payments.sync_logs(false).await.unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].source, SyncSource::Job);
    assert!(logs[0].has_mismatch);
    assert!(logs[0].resolved);
    assert_eq!(sys.mailer.sent().len(), 1);

    sys.clock.advance(Duration::minutes(20));
    let summary = sys.jobs.run_payment_sync_sweep().await.unwrap().completed().unwrap();
    assert_eq!(summary.checked, 0);
    sys.tear_down().await;
}

#[tokio::test]
async fn sync_sweep_expires_abandoned_payments() {
    let sys = TestSystem::new().await;
    let shirt = sys.seed_shirt().await;
    let expiry = sys.clock.now() + Duration::minutes(15);
    sys.gateway.set_expiry_time(expiry);
    let order = sys.place_order(shirt).await;
    let external_id = sys.open_payment(&order.order_code).await;
    sys.gateway.set_status(&external_id, "pending", None);

    // Stale, but still inside the grace period after the gateway expiry time
    sys.clock.advance(Duration::minutes(16));
    let summary = sys.jobs.run_payment_sync_sweep().await.unwrap().completed().unwrap();
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.expired, 0);
    assert_eq!(sys.order(&order.order_code).await.status, OrderStatusType::Pending);

    sys.clock.advance(Duration::minutes(20));
    let summary = sys.jobs.run_payment_sync_sweep().await.unwrap().completed().unwrap();
    assert_eq!(summary.checked, 1);
    assert_eq!(summary.expired, 1);
    let payment = sys.payments.payment_for_order(&order.order_code).await.unwrap().unwrap();
    assert_eq!(payment.status, PaymentStatus::Expired);
    assert_eq!(sys.order(&order.order_code).await.status, OrderStatusType::Expired);
    assert_eq!(product_stock(&sys.db, shirt).await, 10);
    sys.tear_down().await;
}

#[tokio::test]
async fn sync_sweep_lease() {
    let sys = TestSystem::new().await;
    assert!(sys.db.try_acquire_job_lock(PAYMENT_SYNC_JOB, "worker-elsewhere", Duration::minutes(10)).await.unwrap());
    assert!(sys.jobs.run_payment_sync_sweep().await.unwrap().is_skipped());
    sys.db.release_job_lock(PAYMENT_SYNC_JOB, "worker-elsewhere").await.unwrap();
    assert!(!sys.jobs.run_payment_sync_sweep().await.unwrap().is_skipped());
    sys.tear_down().await;
}

#[tokio::test]
async fn daily_reconciliation() {
    let sys = TestSystem::new().await;
    let shirt = sys.seed_shirt().await;
    let paid = sys.paid_order(shirt).await;
    let refund = NewRefund {
        order_code: paid.order_code.clone(),
        refund_type: RefundType::ShippingOnly,
        reason: RefundReason::LateDelivery,
        reason_detail: None,
        idempotency_key: "recon-1".into(),
        shipping_refund: None,
        items_refund: None,
        items: vec![],
        requested_by: admin(),
    };
    let refund = sys.refunds.create_refund(refund).await.unwrap().refund;
    sys.refunds.process_refund(refund.id, &admin()).await.unwrap();
    // Paid by bank transfer with no gateway payment on record
    let manual = sys.place_order(shirt).await;
    sys.orders.mark_paid(&manual.order_code, &admin(), "bank transfer").await.unwrap();
    sys.place_order(shirt).await;

    sys.clock.advance(Duration::days(1));
    let date = NaiveDate::from_ymd_opt(2024, 6, 3).unwrap();
    let log = sys.jobs.run_daily_reconciliation(None).await.unwrap().completed().unwrap();
    assert_eq!(log.reconciliation_date, date);
    assert_eq!(log.status, ReconciliationStatus::Completed);
    assert_eq!(log.orders_created, 3);
    assert_eq!(log.orders_paid, 2);
    assert_eq!(log.order_revenue, Rupiah::from(230_000));
    assert_eq!(log.payments_settled, Rupiah::from(115_000));
    assert_eq!(log.refunds_completed, Rupiah::from(15_000));
    assert_eq!(log.net_revenue, Rupiah::from(100_000));
    assert_eq!(log.mismatch_count, 1);
    assert!(log.details.as_deref().unwrap_or_default().contains(manual.order_code.as_str()));
    assert!(log.finished_at.is_some());

    let again = sys.jobs.run_daily_reconciliation(Some(date)).await.unwrap();
    assert!(again.is_skipped());
    let stored = sys.db.fetch_reconciliation(date).await.unwrap().unwrap();
    assert_eq!(stored.id, log.id);
    sys.tear_down().await;
}

#[tokio::test]
async fn quiet_days_reconcile_to_zero() {
    let sys = TestSystem::new().await;
    let date = NaiveDate::from_ymd_opt(2024, 5, 20).unwrap();
    let log = sys.jobs.run_daily_reconciliation(Some(date)).await.unwrap().completed().unwrap();
    assert_eq!(log.orders_created, 0);
    assert_eq!(log.net_revenue, Rupiah::from(0));
    assert_eq!(log.mismatch_count, 0);
    sys.tear_down().await;
}
