use std::path::Path;
use std::str::FromStr;

use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use thiserror::Error;

pub type StorePool = Pool<Sqlite>;

/// Bumped whenever the shape of a cached value changes; entries written under
/// an older version are treated as absent on read.
pub const SCHEMA_VERSION: i64 = 1;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("corrupt cache entry: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Open (creating if necessary) the shared on-disk store that holds both the
/// lookup cache and the daily rate budget. WAL mode so concurrent pipeline
/// processes can share the file.
pub async fn open_store(path: &Path) -> Result<StorePool, StoreError> {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await?;

    sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous = NORMAL").execute(&pool).await?;
    sqlx::query("PRAGMA busy_timeout = 5000").execute(&pool).await?;

    run_migrations(&pool).await?;
    Ok(pool)
}

/// In-memory store for tests. Single connection so every query sees the same
/// database.
pub async fn open_store_in_memory() -> Result<StorePool, StoreError> {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    run_migrations(&pool).await?;
    Ok(pool)
}

async fn run_migrations(pool: &StorePool) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS lookup_cache (
            query_key      TEXT PRIMARY KEY,
            field_kind     TEXT NOT NULL,
            value          TEXT NOT NULL,
            confidence     REAL NOT NULL,
            obtained_at    INTEGER NOT NULL,
            ttl_secs       INTEGER NOT NULL,
            schema_version INTEGER NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS rate_budget (
            day   TEXT PRIMARY KEY,
            count INTEGER NOT NULL DEFAULT 0
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn open_store_creates_file_and_tables() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linea.db");
        let pool = open_store(&path).await.unwrap();
        assert!(path.exists());

        // Both tables queryable.
        sqlx::query("SELECT COUNT(*) FROM lookup_cache")
            .fetch_one(&pool)
            .await
            .unwrap();
        sqlx::query("SELECT COUNT(*) FROM rate_budget")
            .fetch_one(&pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn reopen_preserves_rows() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("linea.db");
        {
            let pool = open_store(&path).await.unwrap();
            sqlx::query("INSERT INTO rate_budget (day, count) VALUES ('2026-01-01', 3)")
                .execute(&pool)
                .await
                .unwrap();
            pool.close().await;
        }
        let pool = open_store(&path).await.unwrap();
        let (count,): (i64,) =
            sqlx::query_as("SELECT count FROM rate_budget WHERE day = '2026-01-01'")
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_eq!(count, 3);
    }
}
