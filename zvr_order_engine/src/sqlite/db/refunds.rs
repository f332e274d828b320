use chrono::{DateTime, Utc};
use log::*;
use serde_json::{json, Value};
use sqlx::SqliteConnection;

use crate::db_types::{Refund, RefundCode, RefundItem, RefundReason, RefundStatus, RefundType, Rupiah};

/// A validated refund, with its amounts derived, ready to be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundRecord {
    pub order_id: i64,
    pub payment_id: Option<i64>,
    pub refund_type: RefundType,
    pub reason: RefundReason,
    pub reason_detail: Option<String>,
    pub original_amount: Rupiah,
    pub refund_amount: Rupiah,
    pub shipping_refund: Rupiah,
    pub items_refund: Rupiah,
    pub idempotency_key: String,
    pub requested_by: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundItemRecord {
    pub order_item_id: i64,
    pub product_id: i64,
    pub variant_id: Option<i64>,
    pub quantity: i64,
    pub refund_amount: Rupiah,
}

pub async fn insert_refund(
    code: &RefundCode,
    refund: &RefundRecord,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Refund, sqlx::Error> {
    let refund = sqlx::query_as(
        r#"
            INSERT INTO refunds (
                refund_code,
                order_id,
                payment_id,
                refund_type,
                reason,
                reason_detail,
                original_amount,
                refund_amount,
                shipping_refund,
                items_refund,
                status,
                idempotency_key,
                requested_by,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, 'PENDING', $11, $12, $13, $13)
            RETURNING *
        "#,
    )
    .bind(code)
    .bind(refund.order_id)
    .bind(refund.payment_id)
    .bind(refund.refund_type)
    .bind(refund.reason)
    .bind(&refund.reason_detail)
    .bind(refund.original_amount)
    .bind(refund.refund_amount)
    .bind(refund.shipping_refund)
    .bind(refund.items_refund)
    .bind(&refund.idempotency_key)
    .bind(&refund.requested_by)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(refund)
}

pub async fn insert_refund_item(
    refund_id: i64,
    item: &RefundItemRecord,
    conn: &mut SqliteConnection,
) -> Result<RefundItem, sqlx::Error> {
    let item = sqlx::query_as(
        r#"
            INSERT INTO refund_items (refund_id, order_item_id, product_id, variant_id, quantity, refund_amount)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING *
        "#,
    )
    .bind(refund_id)
    .bind(item.order_item_id)
    .bind(item.product_id)
    .bind(item.variant_id)
    .bind(item.quantity)
    .bind(item.refund_amount)
    .fetch_one(conn)
    .await?;
    Ok(item)
}

pub async fn fetch_refund(id: i64, conn: &mut SqliteConnection) -> Result<Option<Refund>, sqlx::Error> {
    let refund = sqlx::query_as("SELECT * FROM refunds WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(refund)
}

pub async fn fetch_by_code(code: &RefundCode, conn: &mut SqliteConnection) -> Result<Option<Refund>, sqlx::Error> {
    let refund =
        sqlx::query_as("SELECT * FROM refunds WHERE refund_code = $1").bind(code).fetch_optional(conn).await?;
    Ok(refund)
}

pub async fn fetch_by_idempotency_key(key: &str, conn: &mut SqliteConnection) -> Result<Option<Refund>, sqlx::Error> {
    let refund =
        sqlx::query_as("SELECT * FROM refunds WHERE idempotency_key = $1").bind(key).fetch_optional(conn).await?;
    Ok(refund)
}

pub async fn fetch_items(refund_id: i64, conn: &mut SqliteConnection) -> Result<Vec<RefundItem>, sqlx::Error> {
    let items = sqlx::query_as("SELECT * FROM refund_items WHERE refund_id = $1 ORDER BY id")
        .bind(refund_id)
        .fetch_all(conn)
        .await?;
    Ok(items)
}

pub async fn fetch_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<Refund>, sqlx::Error> {
    let refunds = sqlx::query_as("SELECT * FROM refunds WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(refunds)
}

/// Total of the order's refunds that count toward its refunded balance, i.e. everything except REJECTED and
/// CANCELLED.
pub async fn committed_total_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Rupiah, sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        r#"
            SELECT COALESCE(SUM(refund_amount), 0) FROM refunds
            WHERE order_id = $1 AND status NOT IN ('REJECTED', 'CANCELLED')
        "#,
    )
    .bind(order_id)
    .fetch_one(conn)
    .await?;
    Ok(Rupiah::from(total))
}

/// Total of the order's COMPLETED refunds.
pub async fn completed_total_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Rupiah, sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        "SELECT COALESCE(SUM(refund_amount), 0) FROM refunds WHERE order_id = $1 AND status = 'COMPLETED'",
    )
    .bind(order_id)
    .fetch_one(conn)
    .await?;
    Ok(Rupiah::from(total))
}

/// Units of an order item already claimed by refunds that count toward the order's refunded balance.
pub async fn claimed_quantity(order_item_id: i64, conn: &mut SqliteConnection) -> Result<i64, sqlx::Error> {
    let qty: i64 = sqlx::query_scalar(
        r#"
            SELECT COALESCE(SUM(ri.quantity), 0)
            FROM refund_items ri JOIN refunds r ON r.id = ri.refund_id
            WHERE ri.order_item_id = $1 AND r.status NOT IN ('REJECTED', 'CANCELLED')
        "#,
    )
    .bind(order_item_id)
    .fetch_one(conn)
    .await?;
    Ok(qty)
}

/// Amount of an order item already claimed by refunds that count toward the order's refunded balance.
pub async fn claimed_amount(order_item_id: i64, conn: &mut SqliteConnection) -> Result<Rupiah, sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        r#"
            SELECT COALESCE(SUM(ri.refund_amount), 0)
            FROM refund_items ri JOIN refunds r ON r.id = ri.refund_id
            WHERE ri.order_item_id = $1 AND r.status NOT IN ('REJECTED', 'CANCELLED')
        "#,
    )
    .bind(order_item_id)
    .fetch_one(conn)
    .await?;
    Ok(Rupiah::from(total))
}

/// Shipping already claimed by the order's refunds, excluding REJECTED and CANCELLED ones.
pub async fn committed_shipping_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Rupiah, sqlx::Error> {
    let total: i64 = sqlx::query_scalar(
        r#"
            SELECT COALESCE(SUM(shipping_refund), 0) FROM refunds
            WHERE order_id = $1 AND status NOT IN ('REJECTED', 'CANCELLED')
        "#,
    )
    .bind(order_id)
    .fetch_one(conn)
    .await?;
    Ok(Rupiah::from(total))
}

pub async fn set_status(
    id: i64,
    status: RefundStatus,
    processed_by: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Refund, sqlx::Error> {
    let refund = sqlx::query_as(
        r#"
            UPDATE refunds SET
                status = $1,
                processed_by = COALESCE($2, processed_by),
                processed_at = CASE WHEN $1 = 'PROCESSING' THEN $3 ELSE processed_at END,
                updated_at = $3
            WHERE id = $4
            RETURNING *
        "#,
    )
    .bind(status)
    .bind(processed_by)
    .bind(now)
    .bind(id)
    .fetch_one(conn)
    .await?;
    Ok(refund)
}

/// Appends a gateway response to the refund's response history. Earlier entries are never rewritten.
pub fn append_response(history: Option<&str>, response: &str, now: DateTime<Utc>) -> String {
    let mut entries = history
        .and_then(|h| serde_json::from_str::<Value>(h).ok())
        .and_then(|v| match v {
            Value::Array(entries) => Some(entries),
            _ => None,
        })
        .unwrap_or_default();
    let body = serde_json::from_str::<Value>(response).unwrap_or_else(|_| Value::String(response.to_string()));
    entries.push(json!({ "received_at": now.to_rfc3339(), "response": body }));
    Value::Array(entries).to_string()
}

pub async fn mark_completed(
    id: i64,
    gateway_refund_id: Option<&str>,
    gateway_response: Option<&str>,
    processed_by: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Refund, sqlx::Error> {
    let refund: Refund = sqlx::query_as(
        r#"
            UPDATE refunds SET
                status = 'COMPLETED',
                gateway_refund_id = COALESCE($1, gateway_refund_id),
                gateway_response = COALESCE($2, gateway_response),
                processed_by = $3,
                processed_at = COALESCE(processed_at, $4),
                completed_at = $4,
                last_error = NULL,
                last_error_transient = 0,
                updated_at = $4
            WHERE id = $5
            RETURNING *
        "#,
    )
    .bind(gateway_refund_id)
    .bind(gateway_response)
    .bind(processed_by)
    .bind(now)
    .bind(id)
    .fetch_one(conn)
    .await?;
    info!("🗃️ Refund {} completed for {}", refund.refund_code, refund.refund_amount);
    Ok(refund)
}

#[allow(clippy::too_many_arguments)]
pub async fn record_failure(
    id: i64,
    status: RefundStatus,
    error: &str,
    transient: bool,
    gateway_response: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Refund, sqlx::Error> {
    let refund = sqlx::query_as(
        r#"
            UPDATE refunds SET
                status = $1,
                last_error = $2,
                last_error_transient = $3,
                gateway_response = COALESCE($4, gateway_response),
                updated_at = $5
            WHERE id = $6
            RETURNING *
        "#,
    )
    .bind(status)
    .bind(error)
    .bind(transient)
    .bind(gateway_response)
    .bind(now)
    .bind(id)
    .fetch_one(conn)
    .await?;
    Ok(refund)
}

pub async fn mark_item_restored(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE refund_items SET stock_restored = 1, stock_restored_at = $1 WHERE id = $2 AND stock_restored = 0")
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}
