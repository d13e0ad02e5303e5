//! Persistence for call analysis records
//!
//! Provides:
//! - The [`AnalysisStore`] abstraction with push bookkeeping
//! - An in-memory store for development and tests
//! - A ScyllaDB store for durable, multi-instance deployments

pub mod analyses;
pub mod client;
pub mod error;
pub mod memory;
pub mod schema;
pub mod store;

pub use analyses::ScyllaAnalysisStore;
pub use client::{ScyllaClient, ScyllaConfig};
pub use error::PersistenceError;
pub use memory::InMemoryAnalysisStore;
pub use store::{AnalysisStore, InsertOutcome, PushUpdate, StoredAnalysis};

use std::sync::Arc;
use voice_webhook_config::{PersistenceConfig, StoreBackend};

/// Initialize the store selected by configuration
pub async fn init(config: &PersistenceConfig) -> Result<Arc<dyn AnalysisStore>, PersistenceError> {
    match config.backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory analysis store; records do not survive restarts");
            Ok(Arc::new(InMemoryAnalysisStore::new()))
        },
        StoreBackend::Scylla => {
            let client = ScyllaClient::connect_with_schema(ScyllaConfig::from(config)).await?;
            Ok(Arc::new(ScyllaAnalysisStore::new(client)))
        },
    }
}
