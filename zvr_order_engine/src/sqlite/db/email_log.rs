use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

use crate::db_types::{EmailLog, EmailStatus};

/// Inserts a PENDING row for `(order_id, template_key)`. Returns `None` if one already exists, in which case the email
/// must not be sent again.
pub async fn claim(
    order_id: i64,
    template_key: &str,
    recipient: &str,
    now: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<Option<EmailLog>, sqlx::Error> {
    let entry = sqlx::query_as(
        r#"
            INSERT INTO email_log (order_id, template_key, recipient, status, created_at)
            VALUES ($1, $2, $3, 'PENDING', $4)
            ON CONFLICT (order_id, template_key) DO NOTHING
            RETURNING *
        "#,
    )
    .bind(order_id)
    .bind(template_key)
    .bind(recipient)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(entry)
}

pub async fn update_status(
    id: i64,
    status: EmailStatus,
    error: Option<&str>,
    conn: &mut SqliteConnection,
) -> Result<(), sqlx::Error> {
    sqlx::query("UPDATE email_log SET status = $1, error = $2 WHERE id = $3")
        .bind(status)
        .bind(error)
        .bind(id)
        .execute(conn)
        .await?;
    Ok(())
}

pub async fn fetch_for_order(order_id: i64, conn: &mut SqliteConnection) -> Result<Vec<EmailLog>, sqlx::Error> {
    let entries = sqlx::query_as("SELECT * FROM email_log WHERE order_id = $1 ORDER BY id")
        .bind(order_id)
        .fetch_all(conn)
        .await?;
    Ok(entries)
}
