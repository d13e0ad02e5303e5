//! End-of-call pipeline
//!
//! Redelivered reports are settled first-write-wins: once a record exists for
//! a `call_id`, later reports are acknowledged as duplicates without another
//! extraction or push, even when their content differs.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::Instrument;
use voice_webhook_core::{CallAnalysisResult, EndOfCallReport, TranscriptAnalysis};
use voice_webhook_persistence::{AnalysisStore, InsertOutcome, PersistenceError, StoredAnalysis};

use crate::{AnalysisError, AnalysisOutcome, IdempotencyIndex, PushOutcome, Reconciler, TranscriptAnalyzer};

/// Background push started for an accepted record
pub type PushHandle = JoinHandle<Result<PushOutcome, PersistenceError>>;

#[derive(Debug)]
pub enum EndOfCallOutcome {
    /// Persisted; the push continues in the background
    Accepted { record: StoredAnalysis, push: PushHandle },
    /// Already handled, or being handled by a concurrent delivery
    Duplicate { record: Option<StoredAnalysis> },
}

impl EndOfCallOutcome {
    pub fn is_duplicate(&self) -> bool {
        matches!(self, EndOfCallOutcome::Duplicate { .. })
    }

    pub fn status(&self) -> &'static str {
        match self {
            EndOfCallOutcome::Accepted { .. } => "accepted",
            EndOfCallOutcome::Duplicate { .. } => "duplicate",
        }
    }

    pub fn record(&self) -> Option<&StoredAnalysis> {
        match self {
            EndOfCallOutcome::Accepted { record, .. } => Some(record),
            EndOfCallOutcome::Duplicate { record } => record.as_ref(),
        }
    }
}

pub struct CallPipeline {
    analyzer: Option<Arc<TranscriptAnalyzer>>,
    reconciler: Arc<Reconciler>,
    claims: IdempotencyIndex,
}

impl CallPipeline {
    /// `analyzer` is `None` when extraction is disabled; metrics are still recorded
    pub fn new(analyzer: Option<TranscriptAnalyzer>, reconciler: Arc<Reconciler>) -> Self {
        Self {
            analyzer: analyzer.map(Arc::new),
            reconciler,
            claims: IdempotencyIndex::new(),
        }
    }

    pub fn reconciler(&self) -> &Arc<Reconciler> {
        &self.reconciler
    }

    pub fn store(&self) -> &Arc<dyn AnalysisStore> {
        self.reconciler.store()
    }

    pub fn analysis_enabled(&self) -> bool {
        self.analyzer.is_some()
    }

    /// Analyze, persist and schedule the push for one end-of-call report
    ///
    /// Returns once the record is durable. Persistence failures are returned
    /// so the caller can ask the platform to redeliver.
    pub async fn handle_end_of_call(
        &self,
        call_id: &str,
        event_timestamp: Option<DateTime<Utc>>,
        report: &EndOfCallReport,
    ) -> Result<EndOfCallOutcome, AnalysisError> {
        if let Some(existing) = self.store().get(call_id).await? {
            return Ok(self.duplicate(existing, report));
        }

        let Some(_claim) = self.claims.try_claim(call_id) else {
            tracing::info!(call_id = %call_id, "End-of-call report already being processed");
            metrics::counter!("webhook_duplicates_total").increment(1);
            return Ok(EndOfCallOutcome::Duplicate { record: None });
        };

        // A concurrent delivery may have finished between the lookup and the claim
        if let Some(existing) = self.store().get(call_id).await? {
            return Ok(self.duplicate(existing, report));
        }

        let result = self.build_result(call_id, event_timestamp, report).await;
        let record = match self.store().insert_if_absent(&result).await? {
            InsertOutcome::Inserted(record) => record,
            InsertOutcome::Existing(existing) => return Ok(self.duplicate(existing, report)),
        };
        tracing::info!(
            call_id = %call_id,
            analyzed = record.result.has_analysis(),
            "Call analysis persisted"
        );

        let push = self.spawn_push(record.clone());
        Ok(EndOfCallOutcome::Accepted { record, push })
    }

    fn duplicate(&self, existing: StoredAnalysis, report: &EndOfCallReport) -> EndOfCallOutcome {
        let call_id = existing.call_id().to_string();
        if existing.result.call_metrics != report.metrics {
            tracing::warn!(
                call_id = %call_id,
                "Redelivered report differs from the stored one; keeping the first"
            );
        } else {
            tracing::info!(call_id = %call_id, push_state = %existing.push_state, "Duplicate end-of-call report");
        }
        metrics::counter!("webhook_duplicates_total").increment(1);
        EndOfCallOutcome::Duplicate { record: Some(existing) }
    }

    async fn build_result(
        &self,
        call_id: &str,
        event_timestamp: Option<DateTime<Utc>>,
        report: &EndOfCallReport,
    ) -> CallAnalysisResult {
        let (analysis, error) = self.run_analysis(call_id, report).await;

        let mut metrics = report.metrics.clone();
        metrics.call_id = call_id.to_string();

        let mut result = CallAnalysisResult::new(metrics, analysis).with_event_timestamp(event_timestamp);
        result.analysis_error = error;
        result
    }

    async fn run_analysis(
        &self,
        call_id: &str,
        report: &EndOfCallReport,
    ) -> (Option<TranscriptAnalysis>, Option<String>) {
        let Some(analyzer) = &self.analyzer else {
            return (None, Some("analysis disabled".to_string()));
        };

        match analyzer.analyze(call_id, report).await {
            Ok(AnalysisOutcome::Completed(analysis)) => (Some(analysis), None),
            Ok(AnalysisOutcome::Skipped(reason)) => (None, Some(reason)),
            Err(e) => {
                tracing::warn!(call_id = %call_id, kind = e.kind(), error = %e, "Persisting metrics without analysis");
                (None, Some(e.to_string()))
            },
        }
    }

    fn spawn_push(&self, record: StoredAnalysis) -> PushHandle {
        let reconciler = Arc::clone(&self.reconciler);
        let span = tracing::info_span!("platform_push", call_id = %record.call_id());
        tokio::spawn(
            async move {
                let outcome = reconciler.push(&record).await;
                if let Err(e) = &outcome {
                    tracing::error!(error = %e, "Could not record push progress; recovery will retry");
                }
                outcome
            }
            .instrument(span),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{report, FakeLlm, FakePlatform, VALID_ANALYSIS};
    use crate::{AnalyzerConfig, RetryPolicy, TRANSCRIPT_TOO_SHORT};
    use std::time::Duration;
    use voice_webhook_core::{PushState, Speaker, TranscriptEntry};
    use voice_webhook_persistence::InMemoryAnalysisStore;

    struct Harness {
        pipeline: Arc<CallPipeline>,
        llm: Arc<FakeLlm>,
        platform: Arc<FakePlatform>,
        store: Arc<InMemoryAnalysisStore>,
    }

    fn harness(llm: FakeLlm, platform: FakePlatform) -> Harness {
        let llm = Arc::new(llm);
        let platform = Arc::new(platform);
        let store = Arc::new(InMemoryAnalysisStore::new());
        let policy = RetryPolicy {
            max_attempts: 3,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(2),
        };
        let reconciler = Arc::new(Reconciler::new(store.clone(), platform.clone(), policy));
        let analyzer = TranscriptAnalyzer::new(llm.clone(), AnalyzerConfig::default()).unwrap();
        Harness {
            pipeline: Arc::new(CallPipeline::new(Some(analyzer), reconciler)),
            llm,
            platform,
            store,
        }
    }

    async fn settle(outcome: EndOfCallOutcome) -> Option<PushOutcome> {
        match outcome {
            EndOfCallOutcome::Accepted { push, .. } => Some(push.await.unwrap().unwrap()),
            EndOfCallOutcome::Duplicate { .. } => None,
        }
    }

    #[tokio::test]
    async fn test_report_is_analyzed_persisted_and_pushed() {
        let h = harness(FakeLlm::always(VALID_ANALYSIS), FakePlatform::ok());
        let outcome = h.pipeline.handle_end_of_call("c1", None, &report("c1")).await.unwrap();
        assert_eq!(outcome.status(), "accepted");

        assert_eq!(settle(outcome).await, Some(PushOutcome::Pushed { attempts: 1 }));
        let stored = h.store.get("c1").await.unwrap().unwrap();
        assert!(stored.result.has_analysis());
        assert_eq!(stored.result.call_metrics.duration_seconds, 120.0);
        assert_eq!(stored.push_state, PushState::Pushed);
    }

    #[tokio::test]
    async fn test_duplicate_report_extracts_and_pushes_once() {
        let h = harness(FakeLlm::always(VALID_ANALYSIS), FakePlatform::ok());

        let first = h.pipeline.handle_end_of_call("c2", None, &report("c2")).await.unwrap();
        settle(first).await;
        let second = h.pipeline.handle_end_of_call("c2", None, &report("c2")).await.unwrap();

        assert!(second.is_duplicate());
        assert_eq!(second.record().unwrap().push_state, PushState::Pushed);
        assert_eq!(h.llm.calls(), 1);
        assert_eq!(h.platform.pushed_ids(), vec!["c2".to_string()]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_duplicates_extract_once() {
        let h = harness(
            FakeLlm::always(VALID_ANALYSIS).with_delay(Duration::from_millis(50)),
            FakePlatform::ok(),
        );

        let mut handles = Vec::new();
        for _ in 0..8 {
            let pipeline = Arc::clone(&h.pipeline);
            handles.push(tokio::spawn(async move {
                pipeline.handle_end_of_call("c3", None, &report("c3")).await.unwrap()
            }));
        }

        let mut accepted = 0;
        for handle in handles {
            let outcome = handle.await.unwrap();
            if !outcome.is_duplicate() {
                accepted += 1;
            }
            settle(outcome).await;
        }

        assert_eq!(accepted, 1);
        assert_eq!(h.llm.calls(), 1);
        assert_eq!(h.platform.pushes(), 1);
    }

    #[tokio::test]
    async fn test_failed_extraction_keeps_metrics() {
        let h = harness(FakeLlm::always("{\"oops\": true}"), FakePlatform::ok());
        let outcome = h.pipeline.handle_end_of_call("c4", None, &report("c4")).await.unwrap();
        settle(outcome).await;

        let stored = h.store.get("c4").await.unwrap().unwrap();
        assert!(stored.result.transcript_analysis.is_none());
        assert!(stored.result.analysis_error.unwrap().contains("Analysis extraction failed"));
        assert_eq!(stored.result.call_metrics.cost, 0.12);
        assert_eq!(stored.push_state, PushState::Pushed);
        assert_eq!(h.llm.calls(), 2);
    }

    #[tokio::test]
    async fn test_short_transcript_records_reason() {
        let h = harness(FakeLlm::always(VALID_ANALYSIS), FakePlatform::ok());
        let mut short = report("c5");
        short.transcript = vec![TranscriptEntry::new(Speaker::User, "Bye")];

        let outcome = h.pipeline.handle_end_of_call("c5", None, &short).await.unwrap();
        let record = outcome.record().unwrap().clone();
        settle(outcome).await;

        assert_eq!(record.result.analysis_error.as_deref(), Some(TRANSCRIPT_TOO_SHORT));
        assert_eq!(h.llm.calls(), 0);
    }

    #[tokio::test]
    async fn test_push_exhaustion_is_retrievable() {
        let h = harness(FakeLlm::always(VALID_ANALYSIS), FakePlatform::failing(usize::MAX, 503));
        let outcome = h.pipeline.handle_end_of_call("c6", None, &report("c6")).await.unwrap();
        assert!(matches!(settle(outcome).await, Some(PushOutcome::Failed { attempts: 3, .. })));

        let stored = h.pipeline.store().get("c6").await.unwrap().unwrap();
        assert_eq!(stored.push_state, PushState::PushFailed);
        assert!(stored.result.has_analysis());
    }

    #[tokio::test]
    async fn test_redelivery_with_different_content_keeps_first() {
        let h = harness(FakeLlm::always(VALID_ANALYSIS), FakePlatform::ok());
        settle(h.pipeline.handle_end_of_call("c7", None, &report("c7")).await.unwrap()).await;

        let mut corrected = report("c7");
        corrected.metrics.duration_seconds = 300.0;
        let outcome = h.pipeline.handle_end_of_call("c7", None, &corrected).await.unwrap();

        assert!(outcome.is_duplicate());
        assert_eq!(outcome.record().unwrap().result.call_metrics.duration_seconds, 120.0);
    }

    #[tokio::test]
    async fn test_disabled_analysis() {
        let store = Arc::new(InMemoryAnalysisStore::new());
        let platform = Arc::new(FakePlatform::ok());
        let reconciler = Arc::new(Reconciler::new(store.clone(), platform, RetryPolicy::default()));
        let pipeline = CallPipeline::new(None, reconciler);
        assert!(!pipeline.analysis_enabled());

        let outcome = pipeline.handle_end_of_call("c8", None, &report("c8")).await.unwrap();
        let record = outcome.record().unwrap();
        assert_eq!(record.result.analysis_error.as_deref(), Some("analysis disabled"));
    }
}
