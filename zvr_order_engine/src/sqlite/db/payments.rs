use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::{
    collaborators::ChargeResponse,
    db_types::{OrderCode, Payment, PaymentMethod, PaymentStatus, Rupiah},
};

/// The gateway id for the `attempt`th payment of an order. The first attempt uses the order code itself.
pub fn external_id_for(code: &OrderCode, attempt: i64) -> String {
    if attempt <= 1 {
        code.to_string()
    } else {
        format!("{code}-P{attempt}")
    }
}

pub async fn count_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let count = sqlx::query_scalar("SELECT COUNT(*) FROM payments WHERE order_id = $1")
        .bind(order_id)
        .fetch_one(conn)
        .await?;
    Ok(count)
}

/// Inserts a PENDING payment. Fails with a unique violation if the order already has an open payment.
pub async fn insert_payment(
    order_id: i64,
    external_id: &str,
    method: PaymentMethod,
    amount: Rupiah,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payment, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
            INSERT INTO payments (order_id, external_id, method, status, amount, created_at, updated_at)
            VALUES ($1, $2, $3, 'PENDING', $4, $5, $5)
            RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(external_id)
    .bind(method)
    .bind(amount)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(payment)
}

pub async fn fetch_payment(id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(payment)
}

pub async fn fetch_by_external_id(
    external_id: &str,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE external_id = $1")
        .bind(external_id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

pub async fn fetch_open_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Option<Payment>, sqlx::Error> {
    let payment =
        sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 AND status IN ('PENDING', 'PROCESSING')")
            .bind(order_id)
            .fetch_optional(conn)
            .await?;
    Ok(payment)
}

pub async fn fetch_latest_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment = sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 ORDER BY id DESC LIMIT 1")
        .bind(order_id)
        .fetch_optional(conn)
        .await?;
    Ok(payment)
}

/// The most recent SUCCESS payment of the order, which refunds are issued against.
pub async fn fetch_settled_for_order(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Payment>, sqlx::Error> {
    let payment =
        sqlx::query_as("SELECT * FROM payments WHERE order_id = $1 AND status = 'SUCCESS' ORDER BY id DESC LIMIT 1")
            .bind(order_id)
            .fetch_optional(conn)
            .await?;
    Ok(payment)
}

pub async fn attach_charge(
    id: i64,
    charge: &ChargeResponse,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payment, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
            UPDATE payments SET
                transaction_id = $1,
                va_number = $2,
                qr_code_url = $3,
                expiry_time = $4,
                raw_response = $5,
                updated_at = $6
            WHERE id = $7
            RETURNING *
        "#,
    )
    .bind(&charge.transaction_id)
    .bind(&charge.va_number)
    .bind(&charge.qr_code_url)
    .bind(charge.expiry_time)
    .bind(&charge.raw)
    .bind(now)
    .bind(id)
    .fetch_one(conn)
    .await?;
    Ok(payment)
}

/// Fields written when the gateway reports on a payment.
#[derive(Debug, Clone, Default)]
pub struct PaymentStatusUpdate<'a> {
    pub transaction_id: Option<&'a str>,
    pub fraud_status: Option<&'a str>,
    pub raw_response: Option<&'a str>,
    pub paid_at: Option<DateTime<Utc>>,
}

/// Sets the status and any gateway fields provided. Existing gateway fields are kept when the update has none. A
/// successful update also clears the sync backoff.
pub async fn update_status(
    id: i64,
    status: PaymentStatus,
    update: &PaymentStatusUpdate<'_>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Payment, sqlx::Error> {
    let payment: Payment = sqlx::query_as(
        r#"
            UPDATE payments SET
                status = $1,
                transaction_id = COALESCE($2, transaction_id),
                fraud_status = COALESCE($3, fraud_status),
                raw_response = COALESCE($4, raw_response),
                paid_at = COALESCE(paid_at, $5),
                sync_retry_count = 0,
                next_sync_at = NULL,
                updated_at = $6
            WHERE id = $7
            RETURNING *
        "#,
    )
    .bind(status)
    .bind(update.transaction_id)
    .bind(update.fraud_status)
    .bind(update.raw_response)
    .bind(update.paid_at)
    .bind(now)
    .bind(id)
    .fetch_one(conn)
    .await?;
    debug!("🗃️ Payment {} is now {status}", payment.external_id);
    Ok(payment)
}

/// Closes every open payment of the order with the given status. Used when the order itself is annulled.
pub async fn close_open_payments(
    order_id: i64,
    status: PaymentStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<u64, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE payments SET status = $1, updated_at = $2 WHERE order_id = $3 AND status IN ('PENDING', 'PROCESSING')",
    )
    .bind(status)
    .bind(now)
    .bind(order_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected())
}

/// Counts a failed poll. `updated_at` is left alone so the payment stays stale.
pub async fn record_sync_failure(
    id: i64,
    next_sync_at: Option<DateTime<Utc>>,
    conn: &mut SqliteConnection,
) -> Result<Payment, sqlx::Error> {
    let payment = sqlx::query_as(
        r#"
            UPDATE payments SET
                sync_retry_count = sync_retry_count + 1,
                next_sync_at = $1
            WHERE id = $2
            RETURNING *
        "#,
    )
    .bind(next_sync_at)
    .bind(id)
    .fetch_one(conn)
    .await?;
    Ok(payment)
}

pub async fn fetch_stale(
    updated_before: DateTime<Utc>,
    now: DateTime<Utc>,
    max_attempts: i64,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Payment>, sqlx::Error> {
    let payments = sqlx::query_as(
        r#"
            SELECT * FROM payments
            WHERE status IN ('PENDING', 'PROCESSING')
              AND updated_at < $1
              AND (next_sync_at IS NULL OR next_sync_at <= $2)
              AND sync_retry_count < $3
            ORDER BY updated_at ASC, id ASC
            LIMIT $4
        "#,
    )
    .bind(updated_before)
    .bind(now)
    .bind(max_attempts)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(payments)
}
