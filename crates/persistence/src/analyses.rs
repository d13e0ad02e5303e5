//! ScyllaDB-backed analysis store
//!
//! First-write-wins and the terminal push states are enforced with
//! lightweight transactions (`IF NOT EXISTS`, `IF push_state = ...`), so the
//! guarantees hold across service instances.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use scylla::QueryResult;
use voice_webhook_core::{CallAnalysisResult, PushState};

use crate::store::{AnalysisStore, InsertOutcome, PushUpdate, StoredAnalysis};
use crate::{PersistenceError, ScyllaClient};

/// Table holding one row per call
const TABLE: &str = "call_analyses";

const COLUMNS: &str =
    "call_id, result_json, push_state, push_attempts, last_push_error, created_at, updated_at";

type AnalysisRow = (String, String, String, i32, Option<String>, i64, i64);

#[derive(Clone)]
pub struct ScyllaAnalysisStore {
    client: ScyllaClient,
}

impl ScyllaAnalysisStore {
    pub fn new(client: ScyllaClient) -> Self {
        Self { client }
    }

    fn parse_row(row: AnalysisRow) -> Result<StoredAnalysis, PersistenceError> {
        let (call_id, result_json, push_state, push_attempts, last_push_error, created_at, updated_at) =
            row;

        let result: CallAnalysisResult = serde_json::from_str(&result_json)?;
        let push_state = PushState::parse(&push_state).ok_or_else(|| {
            PersistenceError::InvalidData(format!(
                "unknown push_state {:?} for call {}",
                push_state, call_id
            ))
        })?;

        Ok(StoredAnalysis {
            result,
            push_state,
            push_attempts: push_attempts.max(0) as u32,
            last_push_error,
            created_at: DateTime::from_timestamp_millis(created_at).unwrap_or_else(Utc::now),
            updated_at: DateTime::from_timestamp_millis(updated_at).unwrap_or_else(Utc::now),
        })
    }

    fn parse_rows(result: QueryResult) -> Result<Vec<StoredAnalysis>, PersistenceError> {
        let mut records = Vec::new();
        if let Some(rows) = result.rows {
            for row in rows {
                let typed: AnalysisRow = row
                    .into_typed()
                    .map_err(|e| PersistenceError::InvalidData(e.to_string()))?;
                records.push(Self::parse_row(typed)?);
            }
        }
        Ok(records)
    }

    /// Read the `[applied]` flag of a lightweight transaction
    fn was_applied(result: &QueryResult) -> Result<bool, PersistenceError> {
        result
            .rows
            .as_ref()
            .and_then(|rows| rows.first())
            .and_then(|row| row.columns.first())
            .and_then(|col| col.as_ref())
            .and_then(|value| value.as_boolean())
            .ok_or_else(|| PersistenceError::InvalidData("missing [applied] column".to_string()))
    }
}

#[async_trait]
impl AnalysisStore for ScyllaAnalysisStore {
    async fn insert_if_absent(
        &self,
        result: &CallAnalysisResult,
    ) -> Result<InsertOutcome, PersistenceError> {
        let record = StoredAnalysis::pending(result.clone());
        let query = format!(
            "INSERT INTO {} ({}) VALUES (?, ?, ?, ?, ?, ?, ?) IF NOT EXISTS",
            self.client.table(TABLE),
            COLUMNS
        );

        let outcome = self
            .client
            .session()
            .query_unpaged(
                query,
                (
                    record.call_id(),
                    serde_json::to_string(&record.result)?,
                    record.push_state.as_str(),
                    record.push_attempts as i32,
                    record.last_push_error.clone(),
                    record.created_at.timestamp_millis(),
                    record.updated_at.timestamp_millis(),
                ),
            )
            .await?;

        if Self::was_applied(&outcome)? {
            tracing::debug!(call_id = %result.call_id, "Analysis persisted to ScyllaDB");
            return Ok(InsertOutcome::Inserted(record));
        }

        let existing = self.get(&result.call_id).await?.ok_or_else(|| {
            PersistenceError::InvalidData(format!(
                "insert for {} not applied but no record found",
                result.call_id
            ))
        })?;
        Ok(InsertOutcome::Existing(existing))
    }

    async fn get(&self, call_id: &str) -> Result<Option<StoredAnalysis>, PersistenceError> {
        let query = format!(
            "SELECT {} FROM {} WHERE call_id = ?",
            COLUMNS,
            self.client.table(TABLE)
        );

        let result = self.client.session().query_unpaged(query, (call_id,)).await?;
        Ok(Self::parse_rows(result)?.into_iter().next())
    }

    async fn update_push(&self, call_id: &str, update: PushUpdate) -> Result<bool, PersistenceError> {
        let query = format!(
            "UPDATE {} SET push_state = ?, push_attempts = ?, last_push_error = ?, updated_at = ? \
             WHERE call_id = ? IF push_state = ?",
            self.client.table(TABLE)
        );

        let outcome = self
            .client
            .session()
            .query_unpaged(
                query,
                (
                    update.state.as_str(),
                    update.attempts as i32,
                    update.last_error,
                    Utc::now().timestamp_millis(),
                    call_id,
                    PushState::PushPending.as_str(),
                ),
            )
            .await?;

        if Self::was_applied(&outcome)? {
            return Ok(true);
        }

        match self.get(call_id).await? {
            Some(_) => Ok(false),
            None => Err(PersistenceError::NotFound(call_id.to_string())),
        }
    }

    async fn list_by_state(
        &self,
        state: PushState,
        limit: usize,
    ) -> Result<Vec<StoredAnalysis>, PersistenceError> {
        let query = format!(
            "SELECT {} FROM {} WHERE push_state = ? LIMIT ?",
            COLUMNS,
            self.client.table(TABLE)
        );

        let limit = i32::try_from(limit).unwrap_or(i32::MAX);
        let result = self
            .client
            .session()
            .query_unpaged(query, (state.as_str(), limit))
            .await?;

        let mut records = Self::parse_rows(result)?;
        records.sort_by_key(|r| r.created_at);
        Ok(records)
    }

    async fn health_check(&self) -> Result<(), PersistenceError> {
        self.client.ping().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_webhook_core::CallMetrics;

    #[test]
    fn test_parse_row() {
        let result = CallAnalysisResult::new(CallMetrics::new("c1"), None).with_error("transcript too short");
        let row: AnalysisRow = (
            "c1".to_string(),
            serde_json::to_string(&result).unwrap(),
            "push_failed".to_string(),
            3,
            Some("HTTP 503".to_string()),
            1_700_000_000_000,
            1_700_000_060_000,
        );

        let record = ScyllaAnalysisStore::parse_row(row).unwrap();
        assert_eq!(record.result, result);
        assert_eq!(record.push_state, PushState::PushFailed);
        assert_eq!(record.push_attempts, 3);
        assert_eq!(record.updated_at.timestamp_millis(), 1_700_000_060_000);
    }

    #[test]
    fn test_parse_row_rejects_unknown_state() {
        let result = CallAnalysisResult::new(CallMetrics::new("c1"), None);
        let row: AnalysisRow = (
            "c1".to_string(),
            serde_json::to_string(&result).unwrap(),
            "lost".to_string(),
            0,
            None,
            0,
            0,
        );
        assert!(matches!(
            ScyllaAnalysisStore::parse_row(row),
            Err(PersistenceError::InvalidData(_))
        ));
    }
}
