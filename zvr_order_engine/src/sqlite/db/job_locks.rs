//! Named leases that keep each background job single-flight across processes sharing the database.
use chrono::{DateTime, Utc};
use sqlx::SqliteConnection;

/// Takes the lease if it is free or expired. Returns true if `holder` now owns it until `until`.
pub async fn try_acquire(
    name: &str,
    holder: &str,
    now: DateTime<Utc>,
    until: DateTime<Utc>,
    conn: &mut SqliteConnection,
) -> Result<bool, sqlx::Error> {
    let acquired: Option<String> = sqlx::query_scalar(
        r#"
            INSERT INTO job_locks (name, holder, locked_until) VALUES ($1, $2, $3)
            ON CONFLICT (name) DO UPDATE SET
                holder = excluded.holder,
                locked_until = excluded.locked_until
            WHERE job_locks.locked_until <= $4
            RETURNING name
        "#,
    )
    .bind(name)
    .bind(holder)
    .bind(until)
    .bind(now)
    .fetch_optional(conn)
    .await?;
    Ok(acquired.is_some())
}

pub async fn release(name: &str, holder: &str, conn: &mut SqliteConnection) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM job_locks WHERE name = $1 AND holder = $2").bind(name).bind(holder).execute(conn).await?;
    Ok(())
}
