use std::sync::Arc;

use anyhow::Context;
use bridge::RemoteDetector;
use common::setup_logging;
use gateway::config::{Config, get_configuration};
use gateway::state::AppState;
use inference::rendering::{load_font, probe_system_font};
use inference::{InferenceService, LabelMap, PostProcessor};
use model::anchors::AnchorConfig;
use model::{ComputeDevice, DecodeConfig, Detector, assemble};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = get_configuration().context("failed to load configuration")?;
    setup_logging(config.log_level.clone(), config.environment.clone());

    let state = build_state(&config).await?;

    let addr = format!("{}:{}", config.app.host, config.app.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {addr}"))?;
    tracing::info!(addr = %addr, "gateway listening");

    axum::serve(listener, gateway::app(state)).await?;

    Ok(())
}

async fn build_state(config: &Config) -> anyhow::Result<AppState> {
    let labels = match &config.app.label_map_path {
        Some(path) => LabelMap::from_file(path)
            .with_context(|| format!("failed to load label map {}", path.display()))?,
        None => LabelMap::default(),
    };

    let architecture = assemble(labels.num_classes());
    let anchors = AnchorConfig::ssd300();
    let device = ComputeDevice::detect();
    let detector = Detector::load(
        &architecture,
        &anchors,
        &config.app.checkpoint_path,
        device,
        DecodeConfig::default(),
    )
    .context("failed to load detector checkpoint")?;

    // A configured font must load; with none configured the service
    // falls back to whatever the host offers.
    let font = match &config.app.font_path {
        Some(path) => Some(
            load_font(path).with_context(|| format!("failed to load font {}", path.display()))?,
        ),
        None => probe_system_font(),
    };

    tokio::fs::create_dir_all(&config.app.uploads_dir)
        .await
        .with_context(|| {
            format!(
                "failed to create uploads directory {}",
                config.app.uploads_dir.display()
            )
        })?;

    let remote = RemoteDetector::new(
        config.remote.base_url.clone(),
        config.remote.model_id.clone(),
        config.remote.api_key.clone(),
    )
    .context("failed to build remote detector client")?;

    Ok(AppState {
        inference: Arc::new(InferenceService::new(Arc::new(detector))),
        post: Arc::new(PostProcessor::new(labels, font)),
        remote: Arc::new(remote),
        uploads_dir: config.app.uploads_dir.clone(),
    })
}
