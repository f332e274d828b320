use chrono::{DateTime, NaiveDate, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{ReconciliationLog, Rupiah},
    sqlite::db::sync_log,
    traits::ReconciliationTotals,
};

/// Inserts a RUNNING row for the date. A FAILED row, or a RUNNING row started before `stale_before`, is restarted.
/// Returns `None` if the date is COMPLETED or a run is in progress.
pub async fn start(
    date: NaiveDate,
    now: DateTime<Utc>,
    stale_before: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<ReconciliationLog>, sqlx::Error> {
    let log = sqlx::query_as(
        r#"
            INSERT INTO reconciliation_log (reconciliation_date, status, started_at) VALUES ($1, 'RUNNING', $2)
            ON CONFLICT (reconciliation_date) DO UPDATE SET
                status = 'RUNNING',
                started_at = excluded.started_at,
                finished_at = NULL,
                error = NULL
            WHERE reconciliation_log.status = 'FAILED'
               OR (reconciliation_log.status = 'RUNNING' AND reconciliation_log.started_at < $3)
            RETURNING *
        "#,
    )
    .bind(date)
    .bind(now)
    .bind(stale_before)
    .fetch_optional(conn)
    .await?;
    Ok(log)
}

pub async fn fetch(date: NaiveDate, conn: &mut SqliteConnection) -> Result<Option<ReconciliationLog>, sqlx::Error> {
    let log = sqlx::query_as("SELECT * FROM reconciliation_log WHERE reconciliation_date = $1")
        .bind(date)
        .fetch_optional(conn)
        .await?;
    Ok(log)
}

pub async fn finish(
    id: i64,
    totals: &ReconciliationTotals,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ReconciliationLog, sqlx::Error> {
    let details = serde_json::json!({ "mismatches": totals.mismatches }).to_string();
    let log = sqlx::query_as(
        r#"
            UPDATE reconciliation_log SET
                status = 'COMPLETED',
                orders_created = $1,
                orders_paid = $2,
                order_revenue = $3,
                payments_settled = $4,
                refunds_completed = $5,
                net_revenue = $6,
                mismatch_count = $7,
                details = $8,
                finished_at = $9
            WHERE id = $10
            RETURNING *
        "#,
    )
    .bind(totals.orders_created)
    .bind(totals.orders_paid)
    .bind(totals.order_revenue)
    .bind(totals.payments_settled)
    .bind(totals.refunds_completed)
    .bind(totals.net_revenue)
    .bind(totals.mismatches.len() as i64)
    .bind(details)
    .bind(now)
    .bind(id)
    .fetch_one(conn)
    .await?;
    Ok(log)
}

pub async fn fail(
    id: i64,
    error: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ReconciliationLog, sqlx::Error> {
    let log = sqlx::query_as(
        "UPDATE reconciliation_log SET status = 'FAILED', error = $1, finished_at = $2 WHERE id = $3 RETURNING *",
    )
    .bind(error)
    .bind(now)
    .bind(id)
    .fetch_one(conn)
    .await?;
    Ok(log)
}

async fn count_between(
    sql: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    let value = sqlx::query_scalar(sql).bind(start).bind(end).fetch_one(conn).await?;
    Ok(value)
}

async fn labels_between(
    sql: &str,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Vec<String>, sqlx::Error> {
    let labels = sqlx::query_scalar(sql).bind(start).bind(end).fetch_all(conn).await?;
    Ok(labels)
}

/// Daily totals over `[start, end)` and every discrepancy between orders, payments and refunds in that window.
pub async fn compute(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<ReconciliationTotals, sqlx::Error> {
    let orders_created =
        count_between("SELECT COUNT(*) FROM orders WHERE created_at >= $1 AND created_at < $2", start, end, conn)
            .await?;
    let orders_paid =
        count_between("SELECT COUNT(*) FROM orders WHERE paid_at >= $1 AND paid_at < $2", start, end, conn).await?;
    let order_revenue = count_between(
        "SELECT COALESCE(SUM(total_amount), 0) FROM orders WHERE paid_at >= $1 AND paid_at < $2",
        start,
        end,
        conn,
    )
    .await?;
    let payments_settled = count_between(
        "SELECT COALESCE(SUM(amount), 0) FROM payments WHERE status = 'SUCCESS' AND paid_at >= $1 AND paid_at < $2",
        start,
        end,
        conn,
    )
    .await?;
    let refunds_completed = count_between(
        r#"
            SELECT COALESCE(SUM(refund_amount), 0) FROM refunds
            WHERE status = 'COMPLETED' AND completed_at >= $1 AND completed_at < $2
        "#,
        start,
        end,
        conn,
    )
    .await?;

    let mut mismatches = Vec::new();
    let unpaid = labels_between(
        r#"
            SELECT 'order ' || o.order_code || ' is paid without a settled payment' FROM orders o
            WHERE o.paid_at >= $1 AND o.paid_at < $2
              AND NOT EXISTS (SELECT 1 FROM payments p WHERE p.order_id = o.id AND p.status = 'SUCCESS')
        "#,
        start,
        end,
        conn,
    )
    .await?;
    mismatches.extend(unpaid);
    let orphaned = labels_between(
        r#"
            SELECT 'payment ' || p.external_id || ' settled but order ' || o.order_code || ' is ' || o.status
            FROM payments p JOIN orders o ON o.id = p.order_id
            WHERE p.status = 'SUCCESS' AND p.paid_at >= $1 AND p.paid_at < $2 AND o.paid_at IS NULL
        "#,
        start,
        end,
        conn,
    )
    .await?;
    mismatches.extend(orphaned);
    let wrong_amount = labels_between(
        r#"
            SELECT 'payment ' || p.external_id || ' amount ' || p.amount || ' differs from order total ' || o.total_amount
            FROM payments p JOIN orders o ON o.id = p.order_id
            WHERE p.status = 'SUCCESS' AND p.paid_at >= $1 AND p.paid_at < $2 AND p.amount <> o.total_amount
        "#,
        start,
        end,
        conn,
    )
    .await?;
    mismatches.extend(wrong_amount);
    let unresolved = sync_log::count_unresolved_between(start, end, conn).await?;
    if unresolved > 0 {
        mismatches.push(format!("{unresolved} unresolved payment sync mismatches"));
    }

    let payments_settled = Rupiah::from(payments_settled);
    let refunds_completed = Rupiah::from(refunds_completed);
    Ok(ReconciliationTotals {
        orders_created,
        orders_paid,
        order_revenue: Rupiah::from(order_revenue),
        payments_settled,
        refunds_completed,
        net_revenue: payments_settled - refunds_completed,
        mismatches,
    })
}
