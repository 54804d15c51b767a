//! Row-count and key queries used for reporting and verification

use lbw_common::Result;
use sqlx::SqlitePool;

use super::validate_relation_name;

/// Number of rows in a relation
pub async fn row_count(pool: &SqlitePool, relation: &str) -> Result<u64> {
    validate_relation_name(relation)?;
    let count: i64 = sqlx::query_scalar(&format!("SELECT COUNT(*) FROM {}", relation))
        .fetch_one(pool)
        .await?;
    Ok(count as u64)
}

/// Current maximum surrogate key of a warehouse relation (0 when empty)
pub async fn max_key(pool: &SqlitePool, relation: &str, key_column: &str) -> Result<i64> {
    validate_relation_name(relation)?;
    validate_relation_name(key_column)?;
    let max: i64 = sqlx::query_scalar(&format!(
        "SELECT COALESCE(MAX({}), 0) FROM {}",
        key_column, relation
    ))
    .fetch_one(pool)
    .await?;
    Ok(max)
}
