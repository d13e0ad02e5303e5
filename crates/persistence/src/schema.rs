//! ScyllaDB schema creation

use crate::error::PersistenceError;
use scylla::Session;

/// Create the keyspace if it doesn't exist
pub async fn create_keyspace(
    session: &Session,
    keyspace: &str,
    replication_factor: u8,
) -> Result<(), PersistenceError> {
    let query = format!(
        "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': {}}}",
        keyspace, replication_factor
    );

    session
        .query_unpaged(query, &[])
        .await
        .map_err(|e| PersistenceError::SchemaError(format!("Failed to create keyspace: {}", e)))?;

    Ok(())
}

/// Create all required tables
///
/// Timestamps are stored as epoch milliseconds (BIGINT). The full record is
/// kept as JSON next to the columns the service filters on.
pub async fn create_tables(session: &Session, keyspace: &str) -> Result<(), PersistenceError> {
    let analyses_table = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.call_analyses (
            call_id TEXT,
            result_json TEXT,
            push_state TEXT,
            push_attempts INT,
            last_push_error TEXT,
            created_at BIGINT,
            updated_at BIGINT,
            PRIMARY KEY (call_id)
        )
    "#,
        keyspace
    );

    session
        .query_unpaged(analyses_table, &[])
        .await
        .map_err(|e| {
            PersistenceError::SchemaError(format!("Failed to create call_analyses table: {}", e))
        })?;

    // Recovery sweeps select by state
    let state_index = format!(
        "CREATE INDEX IF NOT EXISTS call_analyses_push_state ON {}.call_analyses (push_state)",
        keyspace
    );

    session
        .query_unpaged(state_index, &[])
        .await
        .map_err(|e| {
            PersistenceError::SchemaError(format!("Failed to create push_state index: {}", e))
        })?;

    Ok(())
}
