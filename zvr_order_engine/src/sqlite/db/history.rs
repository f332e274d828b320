//! Append-only status history for orders and refunds. Rows can only be appended and read; the schema rejects updates
//! and deletes with triggers.
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::{
    db_types::{Actor, StatusHistoryEntry},
    sqlite::db::clip_reason,
};

pub async fn append_order_history(
    order_id: i64,
    from_status: Option<&str>,
    to_status: &str,
    actor: &Actor,
    reason: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<StatusHistoryEntry, sqlx::Error> {
    let entry = sqlx::query_as(
        r#"
            INSERT INTO order_status_history (order_id, from_status, to_status, actor, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, from_status, to_status, actor, reason, created_at
        "#,
    )
    .bind(order_id)
    .bind(from_status)
    .bind(to_status)
    .bind(actor.to_string())
    .bind(clip_reason(reason))
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(entry)
}

pub async fn fetch_order_history(
    order_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<StatusHistoryEntry>, sqlx::Error> {
    let entries = sqlx::query_as(
        r#"
            SELECT id, from_status, to_status, actor, reason, created_at
            FROM order_status_history
            WHERE order_id = $1
            ORDER BY id
        "#,
    )
    .bind(order_id)
    .fetch_all(conn)
    .await?;
    Ok(entries)
}

pub async fn append_refund_history(
    refund_id: i64,
    from_status: Option<&str>,
    to_status: &str,
    actor: &Actor,
    reason: Option<&str>,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<StatusHistoryEntry, sqlx::Error> {
    let entry = sqlx::query_as(
        r#"
            INSERT INTO refund_status_history (refund_id, from_status, to_status, actor, reason, created_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id, from_status, to_status, actor, reason, created_at
        "#,
    )
    .bind(refund_id)
    .bind(from_status)
    .bind(to_status)
    .bind(actor.to_string())
    .bind(clip_reason(reason))
    .bind(now)
    .fetch_one(conn)
    .await?;
    Ok(entry)
}

pub async fn fetch_refund_history(
    refund_id: i64,
    conn: &mut SqliteConnection,
) -> Result<Vec<StatusHistoryEntry>, sqlx::Error> {
    let entries = sqlx::query_as(
        r#"
            SELECT id, from_status, to_status, actor, reason, created_at
            FROM refund_status_history
            WHERE refund_id = $1
            ORDER BY id
        "#,
    )
    .bind(refund_id)
    .fetch_all(conn)
    .await?;
    Ok(entries)
}
