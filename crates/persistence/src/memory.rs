//! In-process analysis store
//!
//! Suitable for development and tests; contents are lost on restart.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use voice_webhook_core::{CallAnalysisResult, PushState};

use crate::store::{AnalysisStore, InsertOutcome, PushUpdate, StoredAnalysis};
use crate::PersistenceError;

#[derive(Default)]
pub struct InMemoryAnalysisStore {
    records: RwLock<HashMap<String, StoredAnalysis>>,
}

impl InMemoryAnalysisStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.read().is_empty()
    }
}

#[async_trait]
impl AnalysisStore for InMemoryAnalysisStore {
    async fn insert_if_absent(
        &self,
        result: &CallAnalysisResult,
    ) -> Result<InsertOutcome, PersistenceError> {
        let mut records = self.records.write();
        if let Some(existing) = records.get(&result.call_id) {
            return Ok(InsertOutcome::Existing(existing.clone()));
        }

        let record = StoredAnalysis::pending(result.clone());
        records.insert(result.call_id.clone(), record.clone());
        Ok(InsertOutcome::Inserted(record))
    }

    async fn get(&self, call_id: &str) -> Result<Option<StoredAnalysis>, PersistenceError> {
        Ok(self.records.read().get(call_id).cloned())
    }

    async fn update_push(&self, call_id: &str, update: PushUpdate) -> Result<bool, PersistenceError> {
        let mut records = self.records.write();
        let record = records
            .get_mut(call_id)
            .ok_or_else(|| PersistenceError::NotFound(call_id.to_string()))?;

        if record.push_state.is_terminal() {
            return Ok(false);
        }

        record.push_state = update.state;
        record.push_attempts = update.attempts;
        record.last_push_error = update.last_error;
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn list_by_state(
        &self,
        state: PushState,
        limit: usize,
    ) -> Result<Vec<StoredAnalysis>, PersistenceError> {
        let mut matching: Vec<StoredAnalysis> = self
            .records
            .read()
            .values()
            .filter(|r| r.push_state == state)
            .cloned()
            .collect();
        matching.sort_by_key(|r| r.created_at);
        matching.truncate(limit);
        Ok(matching)
    }

    async fn health_check(&self) -> Result<(), PersistenceError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use voice_webhook_core::CallMetrics;

    fn result(call_id: &str) -> CallAnalysisResult {
        CallAnalysisResult::new(CallMetrics::new(call_id), None)
    }

    #[tokio::test]
    async fn test_first_write_wins() {
        let store = InMemoryAnalysisStore::new();

        let first = store.insert_if_absent(&result("c1")).await.unwrap();
        assert!(first.is_inserted());
        assert_eq!(first.record().push_state, PushState::PushPending);

        let second = store
            .insert_if_absent(&result("c1").with_error("different"))
            .await
            .unwrap();
        assert!(!second.is_inserted());
        assert!(second.record().result.analysis_error.is_none());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_push_state_is_terminal() {
        let store = InMemoryAnalysisStore::new();
        store.insert_if_absent(&result("c1")).await.unwrap();

        let applied = store
            .update_push(
                "c1",
                PushUpdate {
                    state: PushState::PushFailed,
                    attempts: 3,
                    last_error: Some("HTTP 503".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(applied);

        let applied = store
            .update_push(
                "c1",
                PushUpdate {
                    state: PushState::Pushed,
                    attempts: 4,
                    last_error: None,
                },
            )
            .await
            .unwrap();
        assert!(!applied);

        let record = store.get("c1").await.unwrap().unwrap();
        assert_eq!(record.push_state, PushState::PushFailed);
        assert_eq!(record.push_attempts, 3);
        assert_eq!(record.last_push_error.as_deref(), Some("HTTP 503"));
    }

    #[tokio::test]
    async fn test_update_missing_record() {
        let store = InMemoryAnalysisStore::new();
        let err = store
            .update_push(
                "ghost",
                PushUpdate {
                    state: PushState::Pushed,
                    attempts: 1,
                    last_error: None,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, PersistenceError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_list_by_state() {
        let store = InMemoryAnalysisStore::new();
        for id in ["a", "b", "c"] {
            store.insert_if_absent(&result(id)).await.unwrap();
        }
        store
            .update_push(
                "b",
                PushUpdate {
                    state: PushState::Pushed,
                    attempts: 1,
                    last_error: None,
                },
            )
            .await
            .unwrap();

        let pending = store.list_by_state(PushState::PushPending, 10).await.unwrap();
        let ids: Vec<&str> = pending.iter().map(|r| r.call_id()).collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&"b"));

        assert_eq!(store.list_by_state(PushState::PushPending, 1).await.unwrap().len(), 1);
    }
}
