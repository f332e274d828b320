use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{NewSyncLog, PaymentSyncLog, SyncSource};

pub async fn insert_sync_log(
    source: SyncSource,
    log: &NewSyncLog,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<PaymentSyncLog, sqlx::Error> {
    let entry = sqlx::query_as(
        r#"
            INSERT INTO payment_sync_log (
                payment_id,
                order_id,
                source,
                local_status,
                gateway_status,
                has_mismatch,
                resolved,
                error,
                created_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            RETURNING *
        "#,
    )
    .bind(log.payment_id)
    .bind(log.order_id)
    .bind(source)
    .bind(&log.local_status)
    .bind(&log.gateway_status)
    .bind(log.has_mismatch)
    .bind(log.resolved)
    .bind(&log.error)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(entry)
}

/// Most recent first. With `unresolved_only`, returns mismatches and errors that no later sync has resolved.
pub async fn fetch_sync_logs(
    unresolved_only: bool,
    conn: &mut SqliteConnection,
) -> Result<Vec<PaymentSyncLog>, sqlx::Error> {
    let sql = if unresolved_only {
        "SELECT * FROM payment_sync_log WHERE resolved = 0 AND (has_mismatch = 1 OR error IS NOT NULL) ORDER BY id DESC"
    } else {
        "SELECT * FROM payment_sync_log ORDER BY id DESC"
    };
    let logs = sqlx::query_as(sql).fetch_all(conn).await?;
    Ok(logs)
}

pub async fn fetch_for_payment(payment_id: i64, conn: &mut SqliteConnection) -> Result<Vec<PaymentSyncLog>, sqlx::Error> {
    let logs = sqlx::query_as("SELECT * FROM payment_sync_log WHERE payment_id = $1 ORDER BY id")
        .bind(payment_id)
        .fetch_all(conn)
        .await?;
    Ok(logs)
}

/// Marks earlier mismatches and errors of the payment as resolved once a sync has brought it in line.
pub async fn resolve_for_payment(payment_id: i64, conn: &mut SqliteConnection) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE payment_sync_log SET resolved = 1 WHERE payment_id = $1 AND resolved = 0 AND (has_mismatch = 1 OR error IS NOT NULL)",
    )
    .bind(payment_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

pub async fn count_unresolved_between(
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<i64, sqlx::Error> {
    let count = sqlx::query_scalar(
        r#"
            SELECT COUNT(*) FROM payment_sync_log
            WHERE has_mismatch = 1 AND resolved = 0 AND created_at >= $1 AND created_at < $2
        "#,
    )
    .bind(start)
    .bind(end)
    .fetch_one(conn)
    .await?;
    Ok(count)
}
