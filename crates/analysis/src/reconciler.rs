//! Result reconciler
//!
//! Pushes persisted results to the platform. Records are always in the store
//! before the first push attempt, so a crash mid-push leaves a `push_pending`
//! record that [`Reconciler::recover_pending`] picks up later.

use std::sync::Arc;
use std::time::Duration;
use voice_webhook_config::ReconcilerConfig;
use voice_webhook_core::{PipelineError, PushState};
use voice_webhook_persistence::{AnalysisStore, PersistenceError, PushUpdate, StoredAnalysis};
use voice_webhook_platform::PlatformClient;

use crate::IdempotencyIndex;

/// Bounded exponential backoff for platform pushes
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts, first one included
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(10),
        }
    }
}

impl From<&ReconcilerConfig> for RetryPolicy {
    fn from(config: &ReconcilerConfig) -> Self {
        Self {
            max_attempts: config.max_push_attempts,
            initial_backoff: Duration::from_millis(config.initial_backoff_ms),
            max_backoff: Duration::from_millis(config.max_backoff_ms),
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `failed_attempts` failures
    pub fn backoff_for(&self, failed_attempts: u32) -> Duration {
        let exponent = failed_attempts.saturating_sub(1).min(16);
        self.initial_backoff
            .saturating_mul(1u32 << exponent)
            .min(self.max_backoff)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    Pushed { attempts: u32 },
    /// Marked `push_failed`; needs manual intervention
    Failed { attempts: u32, reason: String },
    /// Nothing to do, the record had already settled
    AlreadyTerminal(PushState),
    /// Another task is pushing this record
    InFlight,
}

/// Tally of a recovery sweep
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    pub scanned: usize,
    pub pushed: usize,
    pub failed: usize,
    pub skipped: usize,
}

pub struct Reconciler {
    store: Arc<dyn AnalysisStore>,
    platform: Arc<dyn PlatformClient>,
    policy: RetryPolicy,
    in_flight: IdempotencyIndex,
}

impl Reconciler {
    pub fn new(store: Arc<dyn AnalysisStore>, platform: Arc<dyn PlatformClient>, policy: RetryPolicy) -> Self {
        Self {
            store,
            platform,
            policy,
            in_flight: IdempotencyIndex::new(),
        }
    }

    pub fn store(&self) -> &Arc<dyn AnalysisStore> {
        &self.store
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Push a stored record, retrying transient failures with backoff
    ///
    /// Attempts already recorded on the record count against the budget.
    pub async fn push(&self, record: &StoredAnalysis) -> Result<PushOutcome, PersistenceError> {
        if record.push_state.is_terminal() {
            return Ok(PushOutcome::AlreadyTerminal(record.push_state));
        }

        let call_id = record.call_id();
        let Some(_claim) = self.in_flight.try_claim(call_id) else {
            tracing::debug!(call_id = %call_id, "Push already in flight");
            return Ok(PushOutcome::InFlight);
        };

        let mut attempts = record.push_attempts;
        let mut last_error = record.last_push_error.clone();

        while attempts < self.policy.max_attempts {
            if attempts > record.push_attempts {
                tokio::time::sleep(self.policy.backoff_for(attempts)).await;
            }
            attempts += 1;

            match self.platform.push_analysis(call_id, &record.result).await {
                Ok(()) => {
                    let update = PushUpdate {
                        state: PushState::Pushed,
                        attempts,
                        last_error: None,
                    };
                    if !self.store.update_push(call_id, update).await? {
                        tracing::debug!(call_id = %call_id, "Record settled concurrently");
                    }
                    metrics::counter!("platform_pushes_total", "outcome" => "pushed").increment(1);
                    tracing::info!(call_id = %call_id, attempts, "Analysis pushed to platform");
                    return Ok(PushOutcome::Pushed { attempts });
                },
                Err(e) => {
                    let retryable = e.is_retryable();
                    tracing::warn!(
                        call_id = %call_id,
                        attempt = attempts,
                        max_attempts = self.policy.max_attempts,
                        retryable,
                        error = %e,
                        "Platform push failed"
                    );
                    metrics::counter!("platform_pushes_total", "outcome" => "retry").increment(1);
                    last_error = Some(e.to_string());

                    if !retryable {
                        break;
                    }
                    let update = PushUpdate {
                        state: PushState::PushPending,
                        attempts,
                        last_error: last_error.clone(),
                    };
                    self.store.update_push(call_id, update).await?;
                },
            }
        }

        let reason = last_error.unwrap_or_else(|| "retry budget exhausted".to_string());
        let update = PushUpdate {
            state: PushState::PushFailed,
            attempts,
            last_error: Some(reason.clone()),
        };
        self.store.update_push(call_id, update).await?;

        let failure = PipelineError::ReconciliationPushFailed {
            call_id: call_id.to_string(),
            reason: reason.clone(),
        };
        metrics::counter!("platform_pushes_total", "outcome" => "failed").increment(1);
        tracing::error!(call_id = %call_id, attempts, error = %failure, "Giving up on push; record marked push_failed");

        Ok(PushOutcome::Failed { attempts, reason })
    }

    /// Re-push records left in `push_pending`, oldest first
    pub async fn recover_pending(&self, limit: usize) -> Result<RecoveryReport, PersistenceError> {
        let pending = self.store.list_by_state(PushState::PushPending, limit).await?;
        let mut report = RecoveryReport {
            scanned: pending.len(),
            ..Default::default()
        };

        for record in &pending {
            match self.push(record).await {
                Ok(PushOutcome::Pushed { .. }) => report.pushed += 1,
                Ok(PushOutcome::Failed { .. }) => report.failed += 1,
                Ok(_) => report.skipped += 1,
                Err(e) => {
                    tracing::error!(call_id = %record.call_id(), error = %e, "Recovery push aborted");
                    report.skipped += 1;
                },
            }
        }

        if report.scanned > 0 {
            tracing::info!(
                scanned = report.scanned,
                pushed = report.pushed,
                failed = report.failed,
                skipped = report.skipped,
                "Push recovery sweep finished"
            );
        }
        Ok(report)
    }
}
