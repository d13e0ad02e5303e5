//! Application context
//!
//! Everything a handler needs, constructed once at startup and shared by
//! cheap clones.

use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use voice_webhook_analysis::{AnalyzerConfig, CallPipeline, Reconciler, RetryPolicy, TranscriptAnalyzer};
use voice_webhook_config::Settings;
use voice_webhook_persistence::AnalysisStore;
use voice_webhook_platform::{PlatformClient, VapiClient};
use voice_webhook_tools::{create_registry, FunctionCallDispatcher};

use crate::ServerError;

#[derive(Clone)]
pub struct AppContext {
    pub settings: Arc<Settings>,
    pub dispatcher: Arc<FunctionCallDispatcher>,
    pub pipeline: Arc<CallPipeline>,
    pub platform: Arc<dyn PlatformClient>,
    /// Set when the Prometheus recorder is installed
    pub metrics: Option<PrometheusHandle>,
}

impl AppContext {
    pub fn new(
        settings: Settings,
        dispatcher: FunctionCallDispatcher,
        pipeline: CallPipeline,
        platform: Arc<dyn PlatformClient>,
    ) -> Self {
        Self {
            settings: Arc::new(settings),
            dispatcher: Arc::new(dispatcher),
            pipeline: Arc::new(pipeline),
            platform,
            metrics: None,
        }
    }

    /// Build every component from settings: store, platform client, model backend
    pub async fn from_settings(settings: Settings) -> Result<Self, ServerError> {
        let store = voice_webhook_persistence::init(&settings.persistence).await?;
        let platform: Arc<dyn PlatformClient> = Arc::new(VapiClient::new(&settings.platform)?);
        Self::with_collaborators(settings, store, platform)
    }

    /// Build from settings around an existing store and platform client
    pub fn with_collaborators(
        settings: Settings,
        store: Arc<dyn AnalysisStore>,
        platform: Arc<dyn PlatformClient>,
    ) -> Result<Self, ServerError> {
        let analyzer = if settings.analysis.enabled {
            let backend = voice_webhook_llm::create_backend(&settings.llm)?;
            Some(TranscriptAnalyzer::new(backend, AnalyzerConfig::from(&settings.analysis))?)
        } else {
            tracing::warn!("Transcript analysis disabled; only call metrics will be recorded");
            None
        };
        Ok(Self::with_analyzer(settings, store, platform, analyzer))
    }

    /// Build with an explicit analyzer, e.g. one backed by a custom model client
    pub fn with_analyzer(
        settings: Settings,
        store: Arc<dyn AnalysisStore>,
        platform: Arc<dyn PlatformClient>,
        analyzer: Option<TranscriptAnalyzer>,
    ) -> Self {
        let registry = create_registry(&settings.dispatch);
        let dispatcher = FunctionCallDispatcher::new(Arc::new(registry));

        let reconciler = Reconciler::new(
            store,
            Arc::clone(&platform),
            RetryPolicy::from(&settings.reconciler),
        );
        let pipeline = CallPipeline::new(analyzer, Arc::new(reconciler));

        Self::new(settings, dispatcher, pipeline, platform)
    }

    pub fn with_metrics(mut self, handle: Option<PrometheusHandle>) -> Self {
        self.metrics = handle;
        self
    }

    pub fn store(&self) -> &Arc<dyn AnalysisStore> {
        self.pipeline.store()
    }
}
