//! Background tasks for the webhook server.
//!
//! Includes:
//! - Re-pushing analysis records left in `push_pending`.

use std::sync::Arc;
use tokio::time::{sleep, Duration};
use voice_webhook_analysis::Reconciler;
use voice_webhook_config::ReconcilerConfig;

/// Records re-pushed per sweep
pub const RECOVERY_BATCH: usize = 100;

/// Runs push recovery: once at startup (if enabled), then on an interval.
///
/// An interval of zero disables the periodic sweep.
pub async fn start_recovery_task(reconciler: Arc<Reconciler>, config: ReconcilerConfig) {
    if config.resume_on_startup {
        sweep(&reconciler).await;
    }

    if config.recovery_interval_seconds == 0 {
        tracing::info!("periodic push recovery disabled (interval=0)");
        return;
    }

    let interval = Duration::from_secs(config.recovery_interval_seconds);
    tracing::info!(interval_seconds = config.recovery_interval_seconds, "starting push recovery task");

    loop {
        sleep(interval).await;
        sweep(&reconciler).await;
    }
}

async fn sweep(reconciler: &Reconciler) {
    match reconciler.recover_pending(RECOVERY_BATCH).await {
        Ok(report) if report.failed > 0 => {
            tracing::warn!(failed = report.failed, "records marked push_failed during recovery");
        },
        Ok(_) => {},
        Err(e) => tracing::error!("push recovery sweep failed: {}", e),
    }
}
