//! Database initialization
//!
//! Opens (or creates) the SQLite warehouse and applies connection-level
//! pragmas. Schema creation is script driven: callers pass the SQL text to
//! [`apply_schema_script`], which must be idempotent.

use crate::{Error, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions},
    SqlitePool,
};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, info};

/// Connection pool sizing for file-backed databases
const MAX_CONNECTIONS: u32 = 5;

/// Turn a connection target into a sqlx URL
///
/// Accepts either a `sqlite:` URL (used verbatim) or a filesystem path,
/// which is opened read-write-create.
pub fn connection_url(target: &str) -> String {
    if target.starts_with("sqlite:") {
        target.to_string()
    } else {
        format!("sqlite://{}?mode=rwc", target)
    }
}

fn is_in_memory(url: &str) -> bool {
    url.contains(":memory:") || url.contains("mode=memory")
}

/// Initialize database connection pool [creates the file when missing]
pub async fn init_database(target: &str, busy_timeout_ms: u64) -> Result<SqlitePool> {
    let db_url = connection_url(target);

    if !target.starts_with("sqlite:") {
        let db_path = Path::new(target);
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        if db_path.exists() {
            info!("Opened existing database: {}", db_path.display());
        } else {
            info!("Initialized new database: {}", db_path.display());
        }
    }

    debug!("Connecting to database: {}", db_url);

    // An in-memory database lives only as long as its connection, and every
    // pooled connection would get a private one.
    let options = if is_in_memory(&db_url) {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>)
    } else {
        SqlitePoolOptions::new().max_connections(MAX_CONNECTIONS)
    };

    // Pragmas go on the connect options so every pooled connection gets them
    let mut connect_options = SqliteConnectOptions::from_str(&db_url)?
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(busy_timeout_ms));
    // WAL allows concurrent readers with one writer
    if !is_in_memory(&db_url) {
        connect_options = connect_options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool = options.connect_with(connect_options).await?;

    info!("Database busy timeout set to {} ms", busy_timeout_ms);

    Ok(pool)
}

/// Execute a multi-statement schema script in one transaction
pub async fn apply_schema_script(pool: &SqlitePool, script: &str) -> Result<()> {
    if script.trim().is_empty() {
        return Err(Error::InvalidInput("Schema script is empty".to_string()));
    }

    let mut tx = pool.begin().await?;
    sqlx::raw_sql(script).execute(&mut *tx).await?;
    tx.commit().await?;

    info!("Schema created/ensured");
    Ok(())
}

/// Read a schema script from disk and apply it
pub async fn apply_schema_file(pool: &SqlitePool, path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(Error::NotFound(format!(
            "Schema file {}",
            path.display()
        )));
    }
    let script = std::fs::read_to_string(path)?;
    apply_schema_script(pool, &script).await
}

/// Check whether a table exists
pub async fn table_exists(pool: &SqlitePool, table_name: &str) -> Result<bool> {
    let exists: bool = sqlx::query_scalar(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
    )
    .bind(table_name)
    .fetch_one(pool)
    .await?;

    Ok(exists)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connection_url_from_path() {
        assert_eq!(
            connection_url("data/warehouse.db"),
            "sqlite://data/warehouse.db?mode=rwc"
        );
    }

    #[test]
    fn test_connection_url_passthrough() {
        assert_eq!(connection_url("sqlite::memory:"), "sqlite::memory:");
    }

    #[tokio::test]
    async fn test_in_memory_pool_keeps_state() {
        let pool = init_database("sqlite::memory:", 250).await.unwrap();
        apply_schema_script(&pool, "CREATE TABLE IF NOT EXISTS t (x INTEGER);")
            .await
            .unwrap();
        assert!(table_exists(&pool, "t").await.unwrap());
        assert!(!table_exists(&pool, "missing").await.unwrap());
    }

    #[tokio::test]
    async fn test_empty_script_rejected() {
        let pool = init_database("sqlite::memory:", 250).await.unwrap();
        let result = apply_schema_script(&pool, "   \n").await;
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }
}
