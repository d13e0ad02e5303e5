//! Analysis store abstraction
//!
//! One record per `call_id`. The analysis payload is written once and never
//! replaced; only the push bookkeeping changes afterwards, and only while the
//! record is still `push_pending`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use voice_webhook_core::{CallAnalysisResult, PushState};

use crate::PersistenceError;

/// A persisted analysis record with its delivery bookkeeping
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredAnalysis {
    pub result: CallAnalysisResult,
    pub push_state: PushState,
    /// Push attempts made so far
    pub push_attempts: u32,
    pub last_push_error: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl StoredAnalysis {
    pub fn pending(result: CallAnalysisResult) -> Self {
        let now = Utc::now();
        Self {
            result,
            push_state: PushState::PushPending,
            push_attempts: 0,
            last_push_error: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn call_id(&self) -> &str {
        &self.result.call_id
    }
}

/// Outcome of [`AnalysisStore::insert_if_absent`]
#[derive(Debug, Clone, PartialEq)]
pub enum InsertOutcome {
    Inserted(StoredAnalysis),
    /// A record already existed; it is returned unchanged
    Existing(StoredAnalysis),
}

impl InsertOutcome {
    pub fn record(&self) -> &StoredAnalysis {
        match self {
            InsertOutcome::Inserted(r) | InsertOutcome::Existing(r) => r,
        }
    }

    pub fn is_inserted(&self) -> bool {
        matches!(self, InsertOutcome::Inserted(_))
    }
}

/// Push bookkeeping update
#[derive(Debug, Clone, PartialEq)]
pub struct PushUpdate {
    pub state: PushState,
    pub attempts: u32,
    pub last_error: Option<String>,
}

/// Analysis store trait
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Persist a new record in `push_pending`, unless one exists for the call
    async fn insert_if_absent(
        &self,
        result: &CallAnalysisResult,
    ) -> Result<InsertOutcome, PersistenceError>;

    async fn get(&self, call_id: &str) -> Result<Option<StoredAnalysis>, PersistenceError>;

    /// Apply push bookkeeping while the record is `push_pending`
    ///
    /// Returns `false` when the record had already reached a terminal state.
    async fn update_push(&self, call_id: &str, update: PushUpdate) -> Result<bool, PersistenceError>;

    /// Records currently in `state`, oldest first, at most `limit`
    async fn list_by_state(
        &self,
        state: PushState,
        limit: usize,
    ) -> Result<Vec<StoredAnalysis>, PersistenceError>;

    /// Cheap reachability probe for readiness checks
    async fn health_check(&self) -> Result<(), PersistenceError>;
}
