//! Voice Webhook Server Entry Point

use anyhow::Context;
use std::net::SocketAddr;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use voice_webhook_config::{load_settings, Settings};
use voice_webhook_server::{background, create_router, init_metrics, AppContext};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Priority: env vars > config/{env}.yaml > config/default.yaml > defaults
    let env = std::env::var("VOICE_WEBHOOK_ENV").ok();
    let settings = load_settings(env.as_deref()).context("failed to load configuration")?;

    init_tracing(&settings);

    tracing::info!("Starting Voice Webhook Server v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        environment = ?settings.environment,
        config_path = env.as_deref().unwrap_or("default"),
        "Configuration loaded"
    );

    // Missing credentials abort before the listener binds
    settings
        .require_credentials()
        .context("required credentials are missing")?;

    let metrics_handle = if settings.observability.metrics_enabled {
        let handle = init_metrics().map_err(anyhow::Error::msg)?;
        tracing::info!("Initialized Prometheus metrics at /metrics");
        Some(handle)
    } else {
        None
    };

    let ctx = AppContext::from_settings(settings.clone())
        .await
        .context("failed to initialize application context")?
        .with_metrics(metrics_handle);

    tracing::info!(
        store = ?settings.persistence.backend,
        analysis = ctx.pipeline.analysis_enabled(),
        tools = ctx.dispatcher.registry().len(),
        webhook_path = %settings.server.webhook_path,
        "Initialized application context"
    );

    tokio::spawn(background::start_recovery_task(
        ctx.pipeline.reconciler().clone(),
        settings.reconciler.clone(),
    ));

    let app = create_router(ctx);

    let addr: SocketAddr = format!("{}:{}", settings.server.host, settings.server.port)
        .parse()
        .context("invalid server.host/server.port")?;
    tracing::info!("Listening on {}", addr);
    if let Some(url) = &settings.server.public_url {
        tracing::info!("Platform webhook URL: {}{}", url.trim_end_matches('/'), settings.server.webhook_path);
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown...");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown...");
        }
    }
}

fn env_filter(config: &Settings) -> tracing_subscriber::EnvFilter {
    tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = &config.observability.log_level;
        format!("voice_webhook={},tower_http=debug", level).into()
    })
}

/// Initialize tracing (with optional OpenTelemetry when feature enabled)
#[cfg(feature = "telemetry")]
fn init_tracing(config: &Settings) {
    use opentelemetry::trace::TracerProvider as _;
    use opentelemetry_otlp::WithExportConfig;

    let subscriber = tracing_subscriber::registry().with(env_filter(config));
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    if let Some(otlp_endpoint) = &config.observability.otlp_endpoint {
        let exporter = opentelemetry_otlp::SpanExporter::builder()
            .with_tonic()
            .with_endpoint(otlp_endpoint)
            .build();
        match exporter {
            Ok(exporter) => {
                let provider = opentelemetry_sdk::trace::TracerProvider::builder()
                    .with_batch_exporter(exporter, opentelemetry_sdk::runtime::Tokio)
                    .with_resource(opentelemetry_sdk::Resource::new(vec![
                        opentelemetry::KeyValue::new("service.name", "voice-webhook"),
                        opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
                    ]))
                    .build();
                let tracer = provider.tracer("voice-webhook");
                opentelemetry::global::set_tracer_provider(provider);

                let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                subscriber.with(fmt_layer).with(otel_layer).init();
                tracing::info!(endpoint = %otlp_endpoint, "OpenTelemetry tracing enabled");
                return;
            },
            Err(e) => eprintln!("Failed to initialize OpenTelemetry: {}. Falling back.", e),
        }
    }
    subscriber.with(fmt_layer).init();
}

/// Initialize tracing (console only - telemetry feature disabled)
#[cfg(not(feature = "telemetry"))]
fn init_tracing(config: &Settings) {
    let subscriber = tracing_subscriber::registry().with(env_filter(config));
    let fmt_layer = if config.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
