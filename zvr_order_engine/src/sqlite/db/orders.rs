use chrono::{DateTime, Utc};
use log::*;
use sqlx::SqliteConnection;

use crate::db_types::{NewOrder, Order, OrderCode, OrderRefundStatus, OrderStatusType, Rupiah};

/// Monetary fields of a new order, computed from the snapshotted item prices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderTotals {
    pub subtotal: Rupiah,
    pub shipping_cost: Rupiah,
    pub tax: Rupiah,
    pub discount: Rupiah,
    pub total_amount: Rupiah,
}

impl OrderTotals {
    /// Returns `None` if the tax rate is negative, or the discount exceeds the gross amount.
    pub fn calculate(subtotal: Rupiah, shipping_cost: Rupiah, tax_rate_bps: i64, discount: Rupiah) -> Option<Self> {
        if tax_rate_bps < 0 {
            return None;
        }
        let tax = subtotal.apply_basis_points(tax_rate_bps);
        let gross = subtotal.checked_add(shipping_cost)?.checked_add(tax)?;
        let total_amount = gross.checked_sub(discount)?;
        if total_amount.is_negative() {
            return None;
        }
        Some(Self { subtotal, shipping_cost, tax, discount, total_amount })
    }
}

pub async fn insert_order(
    code: &OrderCode,
    order: &NewOrder,
    totals: &OrderTotals,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            INSERT INTO orders (
                order_code,
                user_id,
                customer_name,
                customer_email,
                customer_phone,
                shipping_address,
                courier,
                courier_service,
                subtotal,
                shipping_cost,
                tax,
                discount,
                total_amount,
                status,
                stock_reserved,
                created_at,
                updated_at
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, 'PENDING', 1, $14, $14)
            RETURNING *;
        "#,
    )
    .bind(code)
    .bind(order.user_id)
    .bind(&order.customer.name)
    .bind(&order.customer.email)
    .bind(&order.customer.phone)
    .bind(&order.shipping_address)
    .bind(&order.courier)
    .bind(&order.courier_service)
    .bind(totals.subtotal)
    .bind(totals.shipping_cost)
    .bind(totals.tax)
    .bind(totals.discount)
    .bind(totals.total_amount)
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// Takes the order lock and returns the freshly read row, or `None` if there is no such order.
pub async fn lock_order_by_code(code: &OrderCode, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        "UPDATE orders SET lock_version = lock_version + 1 WHERE order_code = $1 RETURNING *",
    )
    .bind(code)
    .fetch_optional(conn)
    .await?;
    trace!("🗃️ Order lock taken on {code}");
    Ok(order)
}

pub async fn lock_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("UPDATE orders SET lock_version = lock_version + 1 WHERE id = $1 RETURNING *")
        .bind(id)
        .fetch_optional(conn)
        .await?;
    trace!("🗃️ Order lock taken on order #{id}");
    Ok(order)
}

/// Takes the lock on the order a payment belongs to. `None` if the payment does not exist.
pub async fn lock_order_for_payment(
    payment_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET lock_version = lock_version + 1
            WHERE id = (SELECT order_id FROM payments WHERE id = $1)
            RETURNING *
        "#,
    )
    .bind(payment_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

/// Takes the lock on the order a refund belongs to. `None` if the refund does not exist.
pub async fn lock_order_for_refund(refund_id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET lock_version = lock_version + 1
            WHERE id = (SELECT order_id FROM refunds WHERE id = $1)
            RETURNING *
        "#,
    )
    .bind(refund_id)
    .fetch_optional(conn)
    .await?;
    Ok(order)
}

pub async fn fetch_order_by_code(code: &OrderCode, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE order_code = $1").bind(code).fetch_optional(conn).await?;
    Ok(order)
}

pub async fn fetch_order_by_id(id: i64, conn: &mut SqliteConnection) -> Result<Option<Order>, sqlx::Error> {
    let order = sqlx::query_as("SELECT * FROM orders WHERE id = $1").bind(id).fetch_optional(conn).await?;
    Ok(order)
}

/// Writes the new status. `timestamp_column` must come from the state machine's column table.
pub async fn update_status(
    id: i64,
    status: OrderStatusType,
    timestamp_column: Option<&'static str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let sql = match timestamp_column {
        Some(col) => format!("UPDATE orders SET status = $1, updated_at = $2, {col} = $2 WHERE id = $3 RETURNING *"),
        None => "UPDATE orders SET status = $1, updated_at = $2 WHERE id = $3 RETURNING *".to_string(),
    };
    let order: Order = sqlx::query_as(&sql).bind(status).bind(now).bind(id).fetch_one(conn).await?;
    debug!("🗃️ Order {} is now {status}", order.order_code);
    Ok(order)
}

pub async fn clear_stock_reserved(id: i64, now: DateTime<Utc>, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE orders SET stock_reserved = 0, updated_at = $1 WHERE id = $2")
        .bind(now)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn set_resi(
    id: i64,
    resi: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let order = sqlx::query_as("UPDATE orders SET resi = $1, updated_at = $2 WHERE id = $3 RETURNING *")
        .bind(resi)
        .bind(now)
        .bind(id)
        .fetch_one(conn)
        .await?;
    Ok(order)
}

pub async fn resi_in_use(resi: &str, except_order: i64, conn: &mut SqliteConnection) -> Result<bool, sqlx::Error> {
    let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM orders WHERE resi = $1 AND id <> $2")
        .bind(resi)
        .bind(except_order)
        .fetch_one(conn)
        .await?;
    Ok(count > 0)
}

/// Records a completed refund against the order.
pub async fn record_refund(
    id: i64,
    refund_amount: Rupiah,
    refund_status: OrderRefundStatus,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Order, sqlx::Error> {
    let order = sqlx::query_as(
        r#"
            UPDATE orders SET
                refund_amount = $1,
                refund_status = $2,
                refunded_at = $3,
                updated_at = $3
            WHERE id = $4
            RETURNING *
        "#,
    )
    .bind(refund_amount)
    .bind(refund_status)
    .bind(now)
    .bind(id)
    .fetch_one(conn)
    .await?;
    Ok(order)
}

/// PENDING orders created before the cutoff, oldest first.
pub async fn fetch_pending_created_before(
    cutoff: DateTime<Utc>,
    limit: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<Order>, sqlx::Error> {
    let orders = sqlx::query_as(
        r#"
            SELECT * FROM orders
            WHERE status = 'PENDING' AND created_at < $1
            ORDER BY created_at ASC, id ASC
            LIMIT $2
        "#,
    )
    .bind(cutoff)
    .bind(limit)
    .fetch_all(conn)
    .await?;
    Ok(orders)
}
