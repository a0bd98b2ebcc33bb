//! Durable side of the daily rate budget. The conditional UPDATE is the
//! atomic check-and-increment that makes the daily cap correct even when
//! several processes share the store file.

use crate::db::{StoreError, StorePool};

/// Attempt to consume one unit of today's budget. Returns `false` when `day`
/// has already reached `cap`.
pub async fn try_increment_daily(
    pool: &StorePool,
    day: &str,
    cap: u32,
) -> Result<bool, StoreError> {
    sqlx::query("INSERT INTO rate_budget (day, count) VALUES (?, 0) ON CONFLICT(day) DO NOTHING")
        .bind(day)
        .execute(pool)
        .await?;

    let result = sqlx::query("UPDATE rate_budget SET count = count + 1 WHERE day = ? AND count < ?")
        .bind(day)
        .bind(cap as i64)
        .execute(pool)
        .await?;

    Ok(result.rows_affected() > 0)
}

/// How many acquisitions have been recorded for `day`.
pub async fn daily_count(pool: &StorePool, day: &str) -> Result<u32, StoreError> {
    let row: Option<(i64,)> = sqlx::query_as("SELECT count FROM rate_budget WHERE day = ?")
        .bind(day)
        .fetch_optional(pool)
        .await?;
    Ok(row.map(|(c,)| c.max(0) as u32).unwrap_or(0))
}
