use ffmpeg_next as ffmpeg;
use log::{error, info};
use reqwest::Client as ReqwestClient;
use std::sync::Arc;
use std::time::Duration;

use ambient_rs::app::FrameApp;
use ambient_rs::config::{load_config_or_default, DEFAULT_CONFIG_PATH};
use ambient_rs::cycle::CycleEngine;
use ambient_rs::errors::{AppError, MediaError};
use ambient_rs::info_client::HttpInfoSource;
use ambient_rs::media_pipeline::HttpImageLoader;
use ambient_rs::model::CycleState;
use ambient_rs::overlay::{OverlaySettings, SceneOverlay};
use ambient_rs::renderer::CrossfadeRenderer;
use ambient_rs::resolver::ResolveOptions;
use ambient_rs::scene::SceneHandle;
use ambient_rs::video::FfmpegVideoSurface;

const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> Result<(), AppError> {
    env_logger::init(); // Initialize logger
    info!("Starting ambient_rs...");

    let config_path = std::env::args().nth(1).unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = load_config_or_default(&config_path)?;
    info!("Using info service at {}", config.info_url);

    ffmpeg::init().map_err(MediaError::from)?;
    ffmpeg::format::network::init();

    let http_client = ReqwestClient::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .map_err(|e| AppError::Generic(format!("Failed to build HTTP client: {}", e)))?;

    let scene = SceneHandle::new();
    let settings =
        Arc::new(OverlaySettings::new(config.show_overlay, config.show_detailed_metadata));
    let overlay = Arc::new(SceneOverlay::new(scene.clone()));
    let engine = CycleEngine::new(
        Arc::new(HttpInfoSource::new(http_client.clone())),
        config.info_url.clone(),
        ResolveOptions { use_video_best_fit: config.use_video_best_fit },
        CrossfadeRenderer::new(scene.clone(), Arc::new(HttpImageLoader::new(http_client))),
        Box::new(FfmpegVideoSurface::new(scene.clone())),
        overlay.clone(),
        settings.clone(),
    );
    tokio::spawn(engine.run(CycleState::default()));

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("ambient_rs")
            .with_inner_size([1280.0, 720.0])
            .with_fullscreen(config.fullscreen),
        ..Default::default()
    };
    let scene_rx = scene.subscribe();
    eframe::run_native(
        "ambient_rs",
        options,
        Box::new(move |cc| Box::new(FrameApp::new(cc, scene_rx, settings, overlay))),
    )
    .map_err(|e| {
        error!("Window error: {}", e);
        AppError::Generic(e.to_string())
    })
}
