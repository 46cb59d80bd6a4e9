use anyhow::{Context, Result};
use tracing_subscriber::EnvFilter;

mod capture;
mod config;
mod engine;
mod http;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "affectd starting");

    let config = config::Config::from_env();
    tracing::info!(
        listen = %config.listen_addr,
        model_dir = %config.model_dir.display(),
        threshold = config.detection_threshold,
        timeout = ?config.inference_timeout,
        capture_dir = ?config.capture_dir,
        "configuration loaded"
    );

    let engine = engine::EngineHandle::new(engine::EngineSettings {
        threshold: config.detection_threshold,
        timeout: config.inference_timeout,
        capture_dir: config.capture_dir.clone(),
    });

    // Serve immediately; /predict answers 503 until loading completes.
    engine.spawn_loader(config.detector_model_path(), config.classifier_model_path())?;

    let app = http::router(engine, config.max_body_bytes);
    let listener = tokio::net::TcpListener::bind(&config.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.listen_addr))?;

    tracing::info!(addr = %config.listen_addr, "affectd ready");

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    tracing::info!("affectd shutting down");
    Ok(())
}
